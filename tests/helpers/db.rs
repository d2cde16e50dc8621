use parley::settings::Database as DbCfg;
use parley::storage::{self, SqlStore};
use std::sync::Arc;
use tempfile::NamedTempFile;

/// Test database with automatic cleanup
pub struct TestDb {
    store: Arc<SqlStore>,
    _temp_file: NamedTempFile,
}

impl TestDb {
    /// Create a new test database with migrations applied
    pub async fn new() -> Self {
        // Create temporary SQLite database file
        let temp_file = NamedTempFile::new().expect("Failed to create temp file");
        let db_path = temp_file.path().to_str().expect("Invalid temp file path");
        let cfg = DbCfg {
            url: format!("sqlite://{}?mode=rwc", db_path),
        };

        // Connect and run migrations
        let connection = storage::init(&cfg)
            .await
            .expect("Failed to initialise test database");

        Self {
            store: Arc::new(SqlStore::new(connection)),
            _temp_file: temp_file,
        }
    }

    pub fn store(&self) -> Arc<SqlStore> {
        self.store.clone()
    }
}

use clap::Parser;
use miette::Result;
use parley::authz::loader::{apply_policy, load_policies};
use parley::authz::resolver::GrantResolver;
use parley::authz::service::AuthorizationService;
use parley::authz::store::ensure_superuser_role;
use parley::events::BroadcastPublisher;
use parley::storage::SqlStore;
use parley::{jobs, settings, storage, web};
use std::sync::Arc;
use tracing_subscriber::{fmt, EnvFilter};

/// Buffered events per subscriber before slow listeners start lagging
const EVENT_CHANNEL_CAPACITY: usize = 256;

#[derive(Parser, Debug)]
#[command(
    name = "parley",
    version,
    about = "Authorization service for workflow inquiries"
)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml")]
    config: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    // logging
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(env_filter).init();

    let cli = Cli::parse();

    // load settings
    let settings = settings::Settings::load(&cli.config)?;
    tracing::info!(?settings, "Loaded configuration");

    // init storage (database + migrations)
    let db = storage::init(&settings.database).await?;
    let store = Arc::new(SqlStore::new(db));

    if ensure_superuser_role(store.as_ref(), &settings.rbac.superuser_role).await? {
        tracing::info!(role = %settings.rbac.superuser_role, "Created superuser role");
    }

    if let Some(dir) = &settings.rbac.policies_dir {
        let policy = load_policies(dir)?;
        apply_policy(&policy, store.as_ref(), store.as_ref()).await?;
    }

    if !settings.rbac.enabled {
        tracing::warn!("RBAC is disabled; only per-inquiry responder restrictions apply");
    }

    let resolver = GrantResolver::new(store.clone(), store.clone())
        .with_superuser_role(settings.rbac.superuser_role.clone())
        .with_enabled(settings.rbac.enabled);
    let events = Arc::new(BroadcastPublisher::new(EVENT_CHANNEL_CAPACITY));
    let service = Arc::new(
        AuthorizationService::new(resolver, store, events)
            .with_default_ttl(settings.inquiry.default_ttl_minutes),
    );

    // keep the scheduler alive for the lifetime of the server
    let _scheduler = jobs::init_scheduler(service.clone(), &settings.inquiry.expiry_schedule).await?;

    web::serve(settings, service).await?;
    Ok(())
}

use parley::authz::resolver::GrantResolver;
use parley::authz::service::AuthorizationService;
use parley::authz::store::MemoryRbacStore;
use parley::events::{BroadcastPublisher, InquiryEvent};
use parley::inquiry::store::MemoryInquiryStore;
use parley::inquiry::Inquiry;
use std::sync::Arc;
use tokio::sync::broadcast;

use super::builders::{seed_rbac, InquiryBuilder};
use super::db::TestDb;

/// Seeded RBAC tables plus one pending inquiry restricted to `role_respond`.
pub struct Fixture {
    pub service: Arc<AuthorizationService>,
    pub inquiry: Inquiry,
    pub events: broadcast::Receiver<InquiryEvent>,
    _db: Option<TestDb>,
}

impl Fixture {
    /// Backed by the in-memory stores
    pub async fn in_memory() -> Self {
        let rbac = Arc::new(MemoryRbacStore::new());
        seed_rbac(rbac.as_ref(), rbac.as_ref()).await;

        let publisher = Arc::new(BroadcastPublisher::new(64));
        let events = publisher.subscribe();
        let service = Arc::new(AuthorizationService::new(
            GrantResolver::new(rbac.clone(), rbac),
            Arc::new(MemoryInquiryStore::new()),
            publisher,
        ));

        Self::finish(service, events, None).await
    }

    /// Backed by a temporary SQLite database
    pub async fn sql() -> Self {
        let db = TestDb::new().await;
        let store = db.store();
        seed_rbac(store.as_ref(), store.as_ref()).await;

        let publisher = Arc::new(BroadcastPublisher::new(64));
        let events = publisher.subscribe();
        let service = Arc::new(AuthorizationService::new(
            GrantResolver::new(store.clone(), store.clone()),
            store,
            publisher,
        ));

        Self::finish(service, events, Some(db)).await
    }

    async fn finish(
        service: Arc<AuthorizationService>,
        events: broadcast::Receiver<InquiryEvent>,
        db: Option<TestDb>,
    ) -> Self {
        let inquiry = InquiryBuilder::new()
            .with_roles(&["role_respond"])
            .create(&service)
            .await;
        Self {
            service,
            inquiry,
            events,
            _db: db,
        }
    }

    pub fn id(&self) -> &str {
        &self.inquiry.id
    }
}

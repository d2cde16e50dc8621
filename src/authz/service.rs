//! Per-operation composition of the grant resolver and the instance gate.
//!
//! | operation | RBAC permission            | instance gate |
//! |-----------|----------------------------|---------------|
//! | view      | `inquiry_view` on the id   | no            |
//! | list      | `inquiry_list` on `*`      | no            |
//! | respond   | `inquiry_respond` on the id| yes           |
//!
//! Respond additionally owns the pending -> responded compare-and-set.

use chrono::Utc;
use serde_json::Value;
use std::sync::Arc;
use tracing::{info, warn};

use crate::authz::errors::InquiryError;
use crate::authz::gate;
use crate::authz::resolver::GrantResolver;
use crate::authz::types::{PermissionType, ResourceType, ResourceUid};
use crate::authz::Subject;
use crate::errors::StoreError;
use crate::events::{EventPublisher, InquiryEvent};
use crate::inquiry::store::InquiryStore;
use crate::inquiry::types::{
    Inquiry, InquiryContext, InquiryFilter, InquiryStatus, NewInquiry, Resolution, Transition,
};

pub const AUDIT_TARGET: &str = "parley::audit";
pub const DEFAULT_TTL_MINUTES: i64 = 1440;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    View,
    List,
    Respond,
    Create,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::View => "view",
            Operation::List => "list",
            Operation::Respond => "respond",
            Operation::Create => "create",
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum DenialReason {
    PermissionDenied,
    GateDenied,
    AlreadyResolved,
}

impl DenialReason {
    fn as_str(&self) -> &'static str {
        match self {
            DenialReason::PermissionDenied => "permission_denied",
            DenialReason::GateDenied => "gate_denied",
            DenialReason::AlreadyResolved => "already_resolved",
        }
    }
}

fn audit(subject: &Subject, operation: Operation, inquiry: Option<&str>, reason: DenialReason) {
    warn!(
        target: AUDIT_TARGET,
        user = %subject.name,
        operation = operation.as_str(),
        inquiry = inquiry.unwrap_or("-"),
        reason = reason.as_str(),
        "inquiry request denied"
    );
}

pub struct AuthorizationService {
    resolver: GrantResolver,
    inquiries: Arc<dyn InquiryStore>,
    events: Arc<dyn EventPublisher>,
    default_ttl: i64,
}

impl AuthorizationService {
    pub fn new(
        resolver: GrantResolver,
        inquiries: Arc<dyn InquiryStore>,
        events: Arc<dyn EventPublisher>,
    ) -> Self {
        Self {
            resolver,
            inquiries,
            events,
            default_ttl: DEFAULT_TTL_MINUTES,
        }
    }

    /// TTL in minutes applied to inquiries created without one.
    pub fn with_default_ttl(mut self, minutes: i64) -> Self {
        self.default_ttl = minutes;
        self
    }

    pub fn resolver(&self) -> &GrantResolver {
        &self.resolver
    }

    pub fn inquiry_store(&self) -> &dyn InquiryStore {
        self.inquiries.as_ref()
    }

    pub async fn subject(&self, user: &str) -> Result<Subject, InquiryError> {
        Ok(self.resolver.subject(user).await?)
    }

    async fn require(
        &self,
        subject: &Subject,
        operation: Operation,
        resource_uid: &ResourceUid,
        permission: PermissionType,
    ) -> Result<(), InquiryError> {
        let allowed = self
            .resolver
            .resolve_for(subject, ResourceType::Inquiry, resource_uid, permission)
            .await?;
        if allowed {
            return Ok(());
        }

        let inquiry = match resource_uid {
            ResourceUid::Specific(id) => Some(id.as_str()),
            ResourceUid::Wildcard => None,
        };
        audit(subject, operation, inquiry, DenialReason::PermissionDenied);
        Err(InquiryError::PermissionDenied {
            user: subject.name.clone(),
            permission: permission.to_string(),
        })
    }

    /// View access is governed purely by RBAC.
    pub async fn authorize_view(
        &self,
        subject: &Subject,
        inquiry: &Inquiry,
    ) -> Result<(), InquiryError> {
        self.require(
            subject,
            Operation::View,
            &ResourceUid::specific(&inquiry.id),
            PermissionType::InquiryView,
        )
        .await
    }

    /// Collection-level check: the whole listing is allowed or denied.
    pub async fn authorize_list(&self, subject: &Subject) -> Result<(), InquiryError> {
        self.require(
            subject,
            Operation::List,
            &ResourceUid::Wildcard,
            PermissionType::InquiryList,
        )
        .await
    }

    /// Requires both the RBAC grant and the inquiry's own responder gate.
    pub async fn authorize_respond(
        &self,
        subject: &Subject,
        inquiry: &Inquiry,
    ) -> Result<(), InquiryError> {
        self.require(
            subject,
            Operation::Respond,
            &ResourceUid::specific(&inquiry.id),
            PermissionType::InquiryRespond,
        )
        .await?;

        if !gate::permits(subject, inquiry) {
            audit(
                subject,
                Operation::Respond,
                Some(&inquiry.id),
                DenialReason::GateDenied,
            );
            return Err(InquiryError::GateDenied {
                user: subject.name.clone(),
                inquiry: inquiry.id.clone(),
            });
        }
        Ok(())
    }

    async fn load(&self, id: &str) -> Result<Inquiry, InquiryError> {
        self.inquiries
            .get(id)
            .await?
            .ok_or_else(|| InquiryError::UnknownResource(id.to_string()))
    }

    pub async fn get_inquiry(&self, user: &str, id: &str) -> Result<Inquiry, InquiryError> {
        let subject = self.subject(user).await?;
        let inquiry = self.load(id).await?;
        self.authorize_view(&subject, &inquiry).await?;
        Ok(inquiry)
    }

    pub async fn list_inquiries(
        &self,
        user: &str,
        filter: &InquiryFilter,
    ) -> Result<Vec<Inquiry>, InquiryError> {
        let subject = self.subject(user).await?;
        self.authorize_list(&subject).await?;
        Ok(self.inquiries.list(filter).await?)
    }

    /// Answer a pending inquiry.
    ///
    /// A non-pending (or already expired) inquiry is rejected with
    /// `AlreadyResolved` before any authorization check. The final
    /// transition is a compare-and-set, so a concurrent responder that got
    /// through the checks at the same time still loses cleanly.
    pub async fn respond(
        &self,
        user: &str,
        id: &str,
        response: Value,
    ) -> Result<Inquiry, InquiryError> {
        let subject = self.subject(user).await?;
        let inquiry = self.load(id).await?;
        let now = Utc::now().timestamp();

        let current = if inquiry.is_pending() && inquiry.is_expired(now) {
            InquiryStatus::TimedOut
        } else {
            inquiry.status
        };
        if current != InquiryStatus::Pending {
            audit(
                &subject,
                Operation::Respond,
                Some(id),
                DenialReason::AlreadyResolved,
            );
            return Err(InquiryError::AlreadyResolved {
                id: id.to_string(),
                status: current,
            });
        }

        self.authorize_respond(&subject, &inquiry).await?;

        let resolution = Resolution::Responded {
            response,
            by: subject.name.clone(),
            at: now,
        };
        match self.inquiries.resolve(id, resolution).await? {
            Transition::Applied(updated) => {
                info!(inquiry = %id, user = %subject.name, "inquiry responded");
                self.events.publish(InquiryEvent::Responded {
                    id: id.to_string(),
                    user: subject.name,
                });
                Ok(updated)
            }
            Transition::Rejected(status) => {
                audit(
                    &subject,
                    Operation::Respond,
                    Some(id),
                    DenialReason::AlreadyResolved,
                );
                Err(InquiryError::AlreadyResolved {
                    id: id.to_string(),
                    status,
                })
            }
            Transition::Missing => Err(InquiryError::UnknownResource(id.to_string())),
        }
    }

    /// Record a new pending inquiry on behalf of the workflow engine.
    ///
    /// Only the superuser identity may create inquiries while RBAC is on.
    /// The creator and its resolved roles are captured in the context.
    pub async fn create_inquiry(
        &self,
        creator: &str,
        new: NewInquiry,
    ) -> Result<Inquiry, InquiryError> {
        let subject = self.subject(creator).await?;
        if self.resolver.is_enabled() && !subject.is_superuser() {
            audit(&subject, Operation::Create, None, DenialReason::PermissionDenied);
            return Err(InquiryError::PermissionDenied {
                user: subject.name.clone(),
                permission: self.resolver.superuser_role().to_string(),
            });
        }

        if matches!(new.ttl, Some(ttl) if ttl <= 0) {
            return Err(InquiryError::InvalidInput(
                "ttl must be a positive number of minutes".to_string(),
            ));
        }

        let context = InquiryContext::new(subject.name.clone(), subject.roles.clone())
            .with_action_ref(new.action_ref.as_deref());
        let inquiry = Inquiry::from_new(
            uuid::Uuid::new_v4().to_string(),
            new,
            self.default_ttl,
            context,
            Utc::now().timestamp(),
        );
        if !self.inquiries.insert(inquiry.clone()).await? {
            return Err(StoreError::Conflict(inquiry.id).into());
        }

        info!(
            inquiry = %inquiry.id,
            user = %subject.name,
            ttl = inquiry.ttl,
            restricted = inquiry.is_restricted(),
            "inquiry created"
        );
        self.events.publish(InquiryEvent::Created {
            id: inquiry.id.clone(),
            user: subject.name,
        });
        Ok(inquiry)
    }

    /// Time out every pending inquiry whose TTL elapsed before `now`.
    /// Returns how many transitions this call applied.
    pub async fn expire_due(&self, now: i64) -> Result<u64, StoreError> {
        let due = self.inquiries.pending_expired(now).await?;
        let mut expired = 0;
        for inquiry in due {
            if let Transition::Applied(_) = self
                .inquiries
                .resolve(&inquiry.id, Resolution::TimedOut)
                .await?
            {
                expired += 1;
                self.events
                    .publish(InquiryEvent::TimedOut { id: inquiry.id });
            }
        }
        Ok(expired)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::authz::store::{assign_role, MemoryRbacStore, RoleStore};
    use crate::authz::types::{PermissionGrant, Role};
    use crate::events::{BroadcastPublisher, NoopPublisher};
    use crate::inquiry::store::MemoryInquiryStore;
    use serde_json::json;
    use std::collections::BTreeSet;

    async fn grant_role(store: &MemoryRbacStore, role: &str, perms: &[PermissionType]) {
        let grant = PermissionGrant::new(
            format!("{role}#0"),
            ResourceType::Inquiry,
            ResourceUid::Wildcard,
            perms.iter().copied(),
        )
        .unwrap();
        store.upsert_grant(grant).await.unwrap();
        store
            .upsert_role(Role::new(role).with_grant(format!("{role}#0")))
            .await
            .unwrap();
    }

    async fn make_service(events: Arc<dyn EventPublisher>) -> AuthorizationService {
        let rbac = Arc::new(MemoryRbacStore::new());
        rbac.upsert_role(Role::new("admin")).await.unwrap();
        grant_role(&rbac, "role_get", &[PermissionType::InquiryView]).await;
        grant_role(&rbac, "role_list", &[PermissionType::InquiryList]).await;
        grant_role(&rbac, "role_respond", &[PermissionType::InquiryRespond]).await;
        grant_role(&rbac, "role_respond_2", &[PermissionType::InquiryRespond]).await;

        for (user, role) in [
            ("admin", "admin"),
            ("user_get", "role_get"),
            ("user_list", "role_list"),
            ("user_respond", "role_respond"),
            ("user_respond_paramtest", "role_respond_2"),
        ] {
            assign_role(rbac.as_ref(), rbac.as_ref(), user, role)
                .await
                .unwrap();
        }

        let resolver = GrantResolver::new(rbac.clone(), rbac);
        AuthorizationService::new(resolver, Arc::new(MemoryInquiryStore::new()), events)
    }

    fn restricted(roles: &[&str]) -> NewInquiry {
        NewInquiry {
            roles: roles.iter().map(|r| r.to_string()).collect::<BTreeSet<_>>(),
            schema: json!({ "type": "object" }),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_create_records_context() {
        let svc = make_service(Arc::new(NoopPublisher)).await;
        let inq = svc
            .create_inquiry("admin", restricted(&["role_respond"]))
            .await
            .unwrap();

        assert_eq!(inq.status, InquiryStatus::Pending);
        assert_eq!(inq.ttl, DEFAULT_TTL_MINUTES);
        assert_eq!(inq.context.user, "admin");
        assert_eq!(inq.context.rbac.roles, vec!["admin".to_string()]);
    }

    #[tokio::test]
    async fn test_create_requires_superuser() {
        let svc = make_service(Arc::new(NoopPublisher)).await;
        let err = svc
            .create_inquiry("user_respond", NewInquiry::default())
            .await
            .unwrap_err();
        assert!(err.is_forbidden());
    }

    #[tokio::test]
    async fn test_create_rejects_bad_ttl() {
        let svc = make_service(Arc::new(NoopPublisher)).await;
        let err = svc
            .create_inquiry(
                "admin",
                NewInquiry {
                    ttl: Some(0),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, InquiryError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_view_and_list_are_independent() {
        let svc = make_service(Arc::new(NoopPublisher)).await;
        let inq = svc.create_inquiry("admin", restricted(&[])).await.unwrap();

        assert!(svc.get_inquiry("user_get", &inq.id).await.is_ok());
        assert!(matches!(
            svc.get_inquiry("user_list", &inq.id).await,
            Err(InquiryError::PermissionDenied { .. })
        ));

        assert_eq!(
            svc.list_inquiries("user_list", &InquiryFilter::default())
                .await
                .unwrap()
                .len(),
            1
        );
        assert!(matches!(
            svc.list_inquiries("user_get", &InquiryFilter::default()).await,
            Err(InquiryError::PermissionDenied { .. })
        ));
    }

    #[tokio::test]
    async fn test_view_ignores_instance_gate() {
        let svc = make_service(Arc::new(NoopPublisher)).await;
        let inq = svc
            .create_inquiry("admin", restricted(&["role_respond"]))
            .await
            .unwrap();
        // user_get is not in the allow-list but only needs view
        assert!(svc.get_inquiry("user_get", &inq.id).await.is_ok());
    }

    #[tokio::test]
    async fn test_respond_requires_both_layers() {
        let svc = make_service(Arc::new(NoopPublisher)).await;
        let inq = svc
            .create_inquiry("admin", restricted(&["role_respond"]))
            .await
            .unwrap();

        // RBAC layer fails
        let err = svc
            .respond("user_list", &inq.id, json!({ "continue": true }))
            .await
            .unwrap_err();
        assert!(matches!(err, InquiryError::PermissionDenied { .. }));

        // RBAC passes, gate fails
        let err = svc
            .respond("user_respond_paramtest", &inq.id, json!({ "continue": true }))
            .await
            .unwrap_err();
        assert!(matches!(err, InquiryError::GateDenied { .. }));

        let updated = svc
            .respond("user_respond", &inq.id, json!({ "continue": true }))
            .await
            .unwrap();
        assert_eq!(updated.status, InquiryStatus::Responded);
        assert_eq!(updated.response, Some(json!({ "continue": true })));
        assert_eq!(updated.responded_by.as_deref(), Some("user_respond"));
    }

    #[tokio::test]
    async fn test_second_respond_is_already_resolved() {
        let svc = make_service(Arc::new(NoopPublisher)).await;
        let inq = svc
            .create_inquiry("admin", restricted(&["role_respond"]))
            .await
            .unwrap();

        svc.respond("user_respond", &inq.id, json!({ "continue": true }))
            .await
            .unwrap();

        // Gate would deny this user, but the status check comes first
        let err = svc
            .respond("user_respond_paramtest", &inq.id, json!({ "continue": false }))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            InquiryError::AlreadyResolved { status: InquiryStatus::Responded, .. }
        ));

        let again = svc
            .respond("user_respond", &inq.id, json!({ "continue": false }))
            .await
            .unwrap_err();
        assert!(matches!(again, InquiryError::AlreadyResolved { .. }));
    }

    #[tokio::test]
    async fn test_unknown_inquiry() {
        let svc = make_service(Arc::new(NoopPublisher)).await;
        assert!(matches!(
            svc.get_inquiry("user_get", "missing").await,
            Err(InquiryError::UnknownResource(_))
        ));
        assert!(matches!(
            svc.respond("user_respond", "missing", json!({})).await,
            Err(InquiryError::UnknownResource(_))
        ));
    }

    #[tokio::test]
    async fn test_superuser_bypasses_gate() {
        let svc = make_service(Arc::new(NoopPublisher)).await;
        let inq = svc
            .create_inquiry("admin", restricted(&["role_respond"]))
            .await
            .unwrap();
        assert!(svc.respond("admin", &inq.id, json!({})).await.is_ok());
    }

    #[tokio::test]
    async fn test_expired_inquiry_rejects_respond() {
        let svc = make_service(Arc::new(NoopPublisher)).await;
        let inq = Inquiry::from_new(
            "overdue".to_string(),
            restricted(&[]),
            10,
            InquiryContext::new("admin", BTreeSet::new()),
            Utc::now().timestamp() - 10 * 60 - 1,
        );
        assert!(svc.inquiry_store().insert(inq.clone()).await.unwrap());

        let err = svc
            .respond("user_respond", &inq.id, json!({}))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            InquiryError::AlreadyResolved { status: InquiryStatus::TimedOut, .. }
        ));
    }

    #[tokio::test]
    async fn test_expire_due_publishes() {
        let publisher = Arc::new(BroadcastPublisher::new(16));
        let mut rx = publisher.subscribe();
        let svc = make_service(publisher.clone()).await;

        let inq = svc
            .create_inquiry(
                "admin",
                NewInquiry {
                    ttl: Some(5),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert!(matches!(rx.recv().await.unwrap(), InquiryEvent::Created { .. }));

        assert_eq!(svc.expire_due(inq.created_at).await.unwrap(), 0);
        assert_eq!(svc.expire_due(inq.expires_at()).await.unwrap(), 1);
        assert_eq!(svc.expire_due(inq.expires_at()).await.unwrap(), 0);
        assert_eq!(
            rx.recv().await.unwrap(),
            InquiryEvent::TimedOut { id: inq.id.clone() }
        );

        let stored = svc.inquiry_store().get(&inq.id).await.unwrap().unwrap();
        assert_eq!(stored.status, InquiryStatus::TimedOut);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_respond_single_winner() {
        let svc = Arc::new(make_service(Arc::new(NoopPublisher)).await);
        let inq = svc.create_inquiry("admin", restricted(&[])).await.unwrap();

        let mut handles = Vec::new();
        for user in ["user_respond", "user_respond_paramtest"] {
            let svc = svc.clone();
            let id = inq.id.clone();
            handles.push(tokio::spawn(async move {
                svc.respond(user, &id, json!({ "by": user })).await
            }));
        }

        let mut ok = 0;
        let mut conflicts = 0;
        for h in handles {
            match h.await.unwrap() {
                Ok(_) => ok += 1,
                Err(InquiryError::AlreadyResolved { .. }) => conflicts += 1,
                Err(e) => panic!("unexpected error: {e}"),
            }
        }
        assert_eq!((ok, conflicts), (1, 1));
    }
}

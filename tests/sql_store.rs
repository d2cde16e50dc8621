//! Compare-and-set behaviour of the SQL inquiry store under contention.

mod helpers;

use helpers::{Fixture, TestDb};
use parley::authz::errors::InquiryError;
use parley::inquiry::store::InquiryStore;
use parley::inquiry::types::{Inquiry, InquiryContext, NewInquiry, Resolution, Transition};
use parley::inquiry::InquiryStatus;
use serde_json::json;
use std::collections::BTreeSet;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_respond_single_winner() {
    let fx = Fixture::sql().await;

    // both callers pass RBAC and the gate for an unrestricted inquiry
    let open = helpers::InquiryBuilder::new().create(&fx.service).await;

    let mut handles = Vec::new();
    for user in ["user_respond", "user_respond_paramtest", "admin"] {
        let service = fx.service.clone();
        let id = open.id.clone();
        handles.push(tokio::spawn(async move {
            service.respond(user, &id, json!({ "by": user })).await
        }));
    }

    let mut winners = Vec::new();
    let mut conflicts = 0;
    for h in handles {
        match h.await.unwrap() {
            Ok(inquiry) => winners.push(inquiry),
            Err(InquiryError::AlreadyResolved { .. }) => conflicts += 1,
            Err(e) => panic!("unexpected error: {e}"),
        }
    }
    assert_eq!(winners.len(), 1);
    assert_eq!(conflicts, 2);

    let stored = fx.service.get_inquiry("admin", &open.id).await.unwrap();
    assert_eq!(stored.status, InquiryStatus::Responded);
    assert_eq!(stored.responded_by, winners[0].responded_by);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_timeout_and_response_race() {
    let db = TestDb::new().await;
    let store = db.store();

    let inquiry = Inquiry::from_new(
        "i-race".to_string(),
        NewInquiry::default(),
        1,
        InquiryContext::new("admin", BTreeSet::new()),
        0,
    );
    store.insert(inquiry).await.unwrap();

    let responder = {
        let store = store.clone();
        tokio::spawn(async move {
            store
                .resolve(
                    "i-race",
                    Resolution::Responded {
                        response: json!({ "continue": true }),
                        by: "user_respond".into(),
                        at: 30,
                    },
                )
                .await
                .unwrap()
        })
    };
    let sweeper = {
        let store = store.clone();
        tokio::spawn(async move { store.resolve("i-race", Resolution::TimedOut).await.unwrap() })
    };

    let outcomes = [responder.await.unwrap(), sweeper.await.unwrap()];
    let applied = outcomes
        .iter()
        .filter(|t| matches!(t, Transition::Applied(_)))
        .count();
    assert_eq!(applied, 1);
    assert!(outcomes
        .iter()
        .any(|t| matches!(t, Transition::Rejected(_))));
}

#[tokio::test]
async fn test_expire_due_on_sql() {
    let fx = Fixture::sql().await;
    let short = helpers::InquiryBuilder::new()
        .with_ttl(1)
        .create(&fx.service)
        .await;

    let expired = fx.service.expire_due(short.expires_at()).await.unwrap();
    // the fixture inquiry has a one day TTL and stays pending
    assert_eq!(expired, 1);

    let err = fx
        .service
        .respond("user_respond", &short.id, json!({ "continue": true }))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        InquiryError::AlreadyResolved { status: InquiryStatus::TimedOut, .. }
    ));

    let pending = fx.service.get_inquiry("admin", fx.id()).await.unwrap();
    assert_eq!(pending.status, InquiryStatus::Pending);
}

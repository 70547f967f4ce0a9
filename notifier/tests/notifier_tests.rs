use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;
use domain::driver::Driver;
use domain::ids::{OrgId, RouteId, UserId, WarehouseId};
use domain::notification::NotificationType;
use domain::route::Route;
use notifier::{Notifier, PushOutcome, PushTransport};
use store::{MemoryStore, Store};

struct RecordingTransport {
    outcome: PushOutcome,
    calls: Mutex<Vec<String>>,
}

impl RecordingTransport {
    fn new(outcome: PushOutcome) -> Self {
        Self {
            outcome,
            calls: Mutex::new(Vec::new()),
        }
    }

    fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl PushTransport for RecordingTransport {
    async fn push(&self, token: &str, _title: &str, _body: &str) -> PushOutcome {
        self.calls.lock().unwrap().push(token.to_string());
        self.outcome
    }
}

fn seed_driver(store: &MemoryStore, org_id: OrgId, fcm_token: Option<&str>) -> UserId {
    let user_id = UserId::new();
    store.seed_driver(Driver {
        id: user_id,
        org_id,
        weekly_cap: 4,
        is_flagged: false,
        flag_warning_date: None,
        preferred_locale: "en".to_string(),
        fcm_token: fcm_token.map(|t| t.to_string()),
        created_at: Utc::now(),
    });
    user_id
}

#[tokio::test]
async fn send_drops_silently_when_recipient_not_in_org() {
    let store = Arc::new(MemoryStore::new());
    let transport = Arc::new(RecordingTransport::new(PushOutcome::Delivered));
    let notifier = Notifier::new(store.clone(), transport.clone());

    let org_id = OrgId::new();
    let stranger = UserId::new();

    notifier
        .send(
            org_id,
            stranger,
            NotificationType::Manual,
            "hello",
            "world",
            serde_json::json!({}),
            None,
            Utc::now(),
        )
        .await
        .unwrap();

    assert_eq!(transport.call_count(), 0);
}

#[tokio::test]
async fn send_pushes_to_driver_with_token() {
    let store = Arc::new(MemoryStore::new());
    let transport = Arc::new(RecordingTransport::new(PushOutcome::Delivered));
    let notifier = Notifier::new(store.clone(), transport.clone());

    let org_id = OrgId::new();
    let recipient = seed_driver(&store, org_id, Some("tok-123"));

    notifier
        .send(
            org_id,
            recipient,
            NotificationType::ShiftReminder,
            "shift soon",
            "arrive by 7am",
            serde_json::json!({}),
            None,
            Utc::now(),
        )
        .await
        .unwrap();

    assert_eq!(transport.call_count(), 1);
}

#[tokio::test]
async fn send_skips_push_when_driver_has_no_token() {
    let store = Arc::new(MemoryStore::new());
    let transport = Arc::new(RecordingTransport::new(PushOutcome::Delivered));
    let notifier = Notifier::new(store.clone(), transport.clone());

    let org_id = OrgId::new();
    let recipient = seed_driver(&store, org_id, None);

    notifier
        .send(
            org_id,
            recipient,
            NotificationType::ShiftReminder,
            "shift soon",
            "arrive by 7am",
            serde_json::json!({}),
            None,
            Utc::now(),
        )
        .await
        .unwrap();

    assert_eq!(transport.call_count(), 0);
}

#[tokio::test]
async fn invalid_token_outcome_clears_stored_token() {
    let store = Arc::new(MemoryStore::new());
    let transport = Arc::new(RecordingTransport::new(PushOutcome::InvalidToken));
    let notifier = Notifier::new(store.clone(), transport.clone());

    let org_id = OrgId::new();
    let recipient = seed_driver(&store, org_id, Some("stale-token"));

    notifier
        .send(
            org_id,
            recipient,
            NotificationType::Manual,
            "hi",
            "there",
            serde_json::json!({}),
            None,
            Utc::now(),
        )
        .await
        .unwrap();

    let driver = store.get_driver(recipient, org_id).await.unwrap().unwrap();
    assert!(driver.fcm_token.is_none());
}

#[tokio::test]
async fn transient_and_terminal_outcomes_do_not_clear_token() {
    for outcome in [PushOutcome::Transient, PushOutcome::TerminalOther] {
        let store = Arc::new(MemoryStore::new());
        let transport = Arc::new(RecordingTransport::new(outcome));
        let notifier = Notifier::new(store.clone(), transport.clone());

        let org_id = OrgId::new();
        let recipient = seed_driver(&store, org_id, Some("still-good"));

        notifier
            .send(
                org_id,
                recipient,
                NotificationType::Manual,
                "hi",
                "there",
                serde_json::json!({}),
                None,
                Utc::now(),
            )
            .await
            .unwrap();

        let driver = store.get_driver(recipient, org_id).await.unwrap().unwrap();
        assert_eq!(driver.fcm_token.as_deref(), Some("still-good"));
    }
}

#[tokio::test]
async fn send_bulk_reaches_every_recipient() {
    let store = Arc::new(MemoryStore::new());
    let transport = Arc::new(RecordingTransport::new(PushOutcome::Delivered));
    let notifier = Notifier::new(store.clone(), transport.clone());

    let org_id = OrgId::new();
    let recipients: Vec<UserId> = (0..25)
        .map(|i| seed_driver(&store, org_id, Some(&format!("tok-{i}"))))
        .collect();

    notifier
        .send_bulk(
            org_id,
            recipients.clone(),
            NotificationType::EmergencyRouteAvailable,
            "pickup available".to_string(),
            "bid now".to_string(),
            serde_json::json!({}),
            Utc::now(),
        )
        .await;

    assert_eq!(transport.call_count(), recipients.len());
}

#[tokio::test]
async fn send_manager_alert_returns_false_when_no_manager_assigned() {
    let store = Arc::new(MemoryStore::new());
    let transport = Arc::new(RecordingTransport::new(PushOutcome::Delivered));
    let notifier = Notifier::new(store.clone(), transport.clone());

    let org_id = OrgId::new();
    let route_id = RouteId::new();
    store.seed_route(Route {
        id: route_id,
        warehouse_id: WarehouseId::new(),
        name: "north loop".to_string(),
        start_time: "07:00".to_string(),
        primary_manager_id: None,
    });

    let sent = notifier
        .send_manager_alert(
            org_id,
            route_id,
            NotificationType::RouteUnfilled,
            "route unfilled",
            "needs coverage",
            serde_json::json!({}),
            Utc::now(),
        )
        .await
        .unwrap();

    assert!(!sent);
    assert_eq!(transport.call_count(), 0);
}

#[tokio::test]
async fn send_manager_alert_reaches_assigned_manager() {
    let store = Arc::new(MemoryStore::new());
    let transport = Arc::new(RecordingTransport::new(PushOutcome::Delivered));
    let notifier = Notifier::new(store.clone(), transport.clone());

    let org_id = OrgId::new();
    let manager_id = seed_driver(&store, org_id, Some("manager-token"));
    let route_id = RouteId::new();
    store.seed_route(Route {
        id: route_id,
        warehouse_id: WarehouseId::new(),
        name: "north loop".to_string(),
        start_time: "07:00".to_string(),
        primary_manager_id: Some(manager_id),
    });

    let sent = notifier
        .send_manager_alert(
            org_id,
            route_id,
            NotificationType::RouteUnfilled,
            "route unfilled",
            "needs coverage",
            serde_json::json!({}),
            Utc::now(),
        )
        .await
        .unwrap();

    assert!(sent);
    assert_eq!(transport.call_count(), 1);
}

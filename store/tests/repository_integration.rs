use chrono::{NaiveDate, Utc};
use domain::assignment::{AssignedBy, AssignmentStatus, CancelType};
use domain::bidding::{BidWindowMode, BidWindowTrigger};
use domain::ids::{OrgId, RouteId, UserId, WarehouseId};
use store::{CreateBidWindowOutcome, Db, InstantAssignOutcome, NewAssignment, NewBidWindow, Store};
use store::sqlx_store::SqlxStore;
use tokio::task::JoinSet;
use uuid::Uuid;

/// Isolated in-memory SQLite database per test, named uniquely so parallel
/// tests never collide on table state.
async fn setup_db() -> Db {
    let name = Uuid::new_v4().to_string();
    let url = format!("sqlite:file:{}?mode=memory&cache=shared", name);
    let db = Db::connect(&url, 5).await.unwrap();
    db.migrate().await.unwrap();
    db
}

async fn seed_route(db: &Db, org_id: OrgId) -> (WarehouseId, RouteId) {
    let warehouse_id = WarehouseId::new();
    let route_id = RouteId::new();
    sqlx::query("INSERT INTO organizations (id, name, created_at) VALUES (?, 'Acme', ?)")
        .bind(org_id.0.to_string())
        .bind(Utc::now().to_rfc3339())
        .execute(&*db.pool)
        .await
        .unwrap();
    sqlx::query("INSERT INTO warehouses (id, org_id, name, timezone) VALUES (?, ?, 'DFW1', 'America/Chicago')")
        .bind(warehouse_id.0.to_string())
        .bind(org_id.0.to_string())
        .execute(&*db.pool)
        .await
        .unwrap();
    sqlx::query("INSERT INTO routes (id, warehouse_id, name, start_time) VALUES (?, ?, 'R1', '07:00')")
        .bind(route_id.0.to_string())
        .bind(warehouse_id.0.to_string())
        .execute(&*db.pool)
        .await
        .unwrap();
    (warehouse_id, route_id)
}

#[tokio::test]
async fn insert_and_fetch_assignment_round_trip() {
    let db = setup_db().await;
    let store = SqlxStore::new(db.clone());
    let org_id = OrgId::new();
    let (warehouse_id, route_id) = seed_route(&db, org_id).await;

    let user_id = UserId::new();
    let id = store
        .insert_assignment(NewAssignment {
            warehouse_id,
            route_id,
            date: NaiveDate::from_ymd_opt(2026, 8, 3).unwrap(),
            user_id: Some(user_id),
            status: AssignmentStatus::Scheduled,
            assigned_by: Some(AssignedBy::Algorithm),
            assigned_at: Some(Utc::now()),
        })
        .await
        .unwrap();

    let assignment = store.get_assignment(id, Some(org_id)).await.unwrap().unwrap();
    assert_eq!(assignment.user_id, Some(user_id));
    assert_eq!(assignment.status, AssignmentStatus::Scheduled);
}

#[tokio::test]
async fn active_assignment_per_user_date_is_enforced() {
    let db = setup_db().await;
    let store = SqlxStore::new(db.clone());
    let org_id = OrgId::new();
    let (warehouse_id, route_id) = seed_route(&db, org_id).await;
    let user_id = UserId::new();
    let date = NaiveDate::from_ymd_opt(2026, 8, 3).unwrap();

    store
        .insert_assignment(NewAssignment {
            warehouse_id,
            route_id,
            date,
            user_id: Some(user_id),
            status: AssignmentStatus::Scheduled,
            assigned_by: Some(AssignedBy::Algorithm),
            assigned_at: Some(Utc::now()),
        })
        .await
        .unwrap();

    let second = store
        .insert_assignment(NewAssignment {
            warehouse_id,
            route_id,
            date,
            user_id: Some(user_id),
            status: AssignmentStatus::Scheduled,
            assigned_by: Some(AssignedBy::Algorithm),
            assigned_at: Some(Utc::now()),
        })
        .await;

    assert!(second.is_err(), "second active assignment for the same user/date must be rejected");
}

#[tokio::test]
async fn confirm_assignment_is_guarded_against_double_confirm() {
    let db = setup_db().await;
    let store = SqlxStore::new(db.clone());
    let org_id = OrgId::new();
    let (warehouse_id, route_id) = seed_route(&db, org_id).await;
    let user_id = UserId::new();

    let id = store
        .insert_assignment(NewAssignment {
            warehouse_id,
            route_id,
            date: NaiveDate::from_ymd_opt(2026, 8, 3).unwrap(),
            user_id: Some(user_id),
            status: AssignmentStatus::Scheduled,
            assigned_by: Some(AssignedBy::Algorithm),
            assigned_at: Some(Utc::now()),
        })
        .await
        .unwrap();

    assert!(store.confirm_assignment(id, Utc::now()).await.unwrap());
    assert!(!store.confirm_assignment(id, Utc::now()).await.unwrap());
}

#[tokio::test]
async fn cancel_assignment_is_idempotent() {
    let db = setup_db().await;
    let store = SqlxStore::new(db.clone());
    let org_id = OrgId::new();
    let (warehouse_id, route_id) = seed_route(&db, org_id).await;
    let user_id = UserId::new();

    let id = store
        .insert_assignment(NewAssignment {
            warehouse_id,
            route_id,
            date: NaiveDate::from_ymd_opt(2026, 8, 3).unwrap(),
            user_id: Some(user_id),
            status: AssignmentStatus::Scheduled,
            assigned_by: Some(AssignedBy::Algorithm),
            assigned_at: Some(Utc::now()),
        })
        .await
        .unwrap();

    assert!(store
        .cancel_assignment(id, Utc::now(), CancelType::Early)
        .await
        .unwrap());
    assert!(!store
        .cancel_assignment(id, Utc::now(), CancelType::Late)
        .await
        .unwrap());
}

#[tokio::test]
async fn create_bid_window_twice_for_same_assignment_reports_already_exists() {
    let db = setup_db().await;
    let store = SqlxStore::new(db.clone());
    let org_id = OrgId::new();
    let (warehouse_id, route_id) = seed_route(&db, org_id).await;

    let assignment_id = store
        .insert_assignment(NewAssignment {
            warehouse_id,
            route_id,
            date: NaiveDate::from_ymd_opt(2026, 8, 3).unwrap(),
            user_id: None,
            status: AssignmentStatus::Unfilled,
            assigned_by: None,
            assigned_at: None,
        })
        .await
        .unwrap();

    let now = Utc::now();
    let new = NewBidWindow {
        assignment_id,
        mode: BidWindowMode::Competitive,
        trigger: BidWindowTrigger::Cancellation,
        pay_bonus_percent: 0,
        opens_at: now,
        closes_at: now + chrono::Duration::hours(12),
    };

    let first = store.create_bid_window(new.clone()).await.unwrap();
    assert!(matches!(first, CreateBidWindowOutcome::Created(_)));

    let second = store.create_bid_window(new).await.unwrap();
    assert_eq!(second, CreateBidWindowOutcome::AlreadyExists);
}

#[tokio::test]
async fn concurrent_instant_assign_has_exactly_one_winner() {
    let db = setup_db().await;
    let store = std::sync::Arc::new(SqlxStore::new(db.clone()));
    let org_id = OrgId::new();
    let (warehouse_id, route_id) = seed_route(&db, org_id).await;

    let assignment_id = store
        .insert_assignment(NewAssignment {
            warehouse_id,
            route_id,
            date: NaiveDate::from_ymd_opt(2026, 8, 3).unwrap(),
            user_id: None,
            status: AssignmentStatus::Unfilled,
            assigned_by: None,
            assigned_at: None,
        })
        .await
        .unwrap();

    let now = Utc::now();
    let window_id = match store
        .create_bid_window(NewBidWindow {
            assignment_id,
            mode: BidWindowMode::Instant,
            trigger: BidWindowTrigger::AutoDrop,
            pay_bonus_percent: 0,
            opens_at: now,
            closes_at: now + chrono::Duration::hours(12),
        })
        .await
        .unwrap()
    {
        CreateBidWindowOutcome::Created(id) => id,
        CreateBidWindowOutcome::AlreadyExists => panic!("unexpected existing window"),
    };

    let mut set = JoinSet::new();
    for _ in 0..8 {
        let store = std::sync::Arc::clone(&store);
        let user_id = UserId::new();
        set.spawn(async move { store.instant_assign(window_id, user_id, Utc::now()).await });
    }

    let mut assigned = 0;
    while let Some(res) = set.join_next().await {
        if matches!(res.unwrap().unwrap(), InstantAssignOutcome::Assigned) {
            assigned += 1;
        }
    }

    assert_eq!(assigned, 1, "exactly one bidder should win the instant-assign race");
}

use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use domain::driver::{Driver, DriverMetrics, DriverPreferences};
use domain::ids::{OrgId, RouteId, UserId, WarehouseId};
use domain::route::Route;
use scheduler::ScheduleGenerator;
use store::{MemoryStore, Store};

fn route(warehouse_id: WarehouseId) -> Route {
    Route {
        id: RouteId::new(),
        warehouse_id,
        name: "R1".to_string(),
        start_time: "07:00".to_string(),
        primary_manager_id: None,
    }
}

fn driver(org_id: OrgId) -> Driver {
    Driver {
        id: UserId::new(),
        org_id,
        weekly_cap: 4,
        is_flagged: false,
        flag_warning_date: None,
        preferred_locale: "en".to_string(),
        fcm_token: None,
        created_at: Utc::now(),
    }
}

#[tokio::test]
async fn fills_every_day_from_the_top_ranked_candidate() {
    let store = Arc::new(MemoryStore::new());
    let org_id = OrgId::new();
    let warehouse_id = WarehouseId::new();
    let r = route(warehouse_id);
    store.seed_route(r.clone());

    let d1 = driver(org_id);
    let d2 = driver(org_id);
    store.seed_driver(d1.clone());
    store.seed_driver(d2.clone());
    store.seed_driver_preferences(DriverPreferences {
        user_id: d1.id,
        preferred_days: (0..7).collect(),
        preferred_routes: vec![r.id],
    });
    store.seed_driver_preferences(DriverPreferences {
        user_id: d2.id,
        preferred_days: (0..7).collect(),
        preferred_routes: vec![r.id],
    });
    store.seed_driver_metrics(
        d1.id,
        DriverMetrics {
            completion_rate: 0.99,
            attendance_rate: 0.99,
            ..Default::default()
        },
    );

    let gen = ScheduleGenerator::new(store.clone());
    let monday = NaiveDate::from_ymd_opt(2026, 8, 3).unwrap();
    let result = gen.generate_week(org_id, monday, Utc::now()).await.unwrap();

    assert_eq!(result.created, 7);
    assert_eq!(result.unfilled, 0);
    assert!(result.errors.is_empty());

    let week_assignments = store
        .list_week_assignments(org_id, monday, monday + chrono::Duration::days(7))
        .await
        .unwrap();
    assert_eq!(week_assignments.len(), 7);
    assert!(week_assignments.iter().all(|a| a.user_id == Some(d1.id)));
}

#[tokio::test]
async fn unfilled_when_no_candidate_prefers_the_route() {
    let store = Arc::new(MemoryStore::new());
    let org_id = OrgId::new();
    let warehouse_id = WarehouseId::new();
    let r = route(warehouse_id);
    store.seed_route(r.clone());

    let d1 = driver(org_id);
    store.seed_driver(d1.clone());
    store.seed_driver_preferences(DriverPreferences {
        user_id: d1.id,
        preferred_days: vec![],
        preferred_routes: vec![],
    });

    let gen = ScheduleGenerator::new(store.clone());
    let monday = NaiveDate::from_ymd_opt(2026, 8, 3).unwrap();
    let result = gen.generate_week(org_id, monday, Utc::now()).await.unwrap();

    assert_eq!(result.created, 0);
    assert_eq!(result.unfilled, 7);
}

#[tokio::test]
async fn rerun_is_idempotent() {
    let store = Arc::new(MemoryStore::new());
    let org_id = OrgId::new();
    let warehouse_id = WarehouseId::new();
    let r = route(warehouse_id);
    store.seed_route(r.clone());

    let d1 = driver(org_id);
    store.seed_driver(d1.clone());
    store.seed_driver_preferences(DriverPreferences {
        user_id: d1.id,
        preferred_days: (0..7).collect(),
        preferred_routes: vec![r.id],
    });

    let gen = ScheduleGenerator::new(store.clone());
    let monday = NaiveDate::from_ymd_opt(2026, 8, 3).unwrap();
    let first = gen.generate_week(org_id, monday, Utc::now()).await.unwrap();
    let second = gen.generate_week(org_id, monday, Utc::now()).await.unwrap();

    assert_eq!(second.created, 0);
    assert_eq!(second.skipped, first.created + first.unfilled);
}

#[tokio::test]
async fn weekly_cap_stops_the_same_driver_from_taking_every_day() {
    let store = Arc::new(MemoryStore::new());
    let org_id = OrgId::new();
    let warehouse_id = WarehouseId::new();
    let r = route(warehouse_id);
    store.seed_route(r.clone());

    let mut d1 = driver(org_id);
    d1.weekly_cap = 2;
    store.seed_driver(d1.clone());
    store.seed_driver_preferences(DriverPreferences {
        user_id: d1.id,
        preferred_days: (0..7).collect(),
        preferred_routes: vec![r.id],
    });

    let gen = ScheduleGenerator::new(store.clone());
    let monday = NaiveDate::from_ymd_opt(2026, 8, 3).unwrap();
    let result = gen.generate_week(org_id, monday, Utc::now()).await.unwrap();

    assert_eq!(result.created, 2);
    assert_eq!(result.unfilled, 5);
}

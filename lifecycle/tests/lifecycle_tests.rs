use std::sync::Arc;

use broadcaster::Broadcaster;
use chrono::{DateTime, NaiveDate, Utc};
use common::policy::DispatchPolicy;
use common::{FixedClock, TenantClock};
use domain::assignment::{AssignedBy, AssignmentStatus, CancelType};
use domain::driver::Driver;
use domain::ids::{OrgId, RouteId, UserId, WarehouseId};
use domain::route::Route;
use lifecycle::LifecycleService;
use store::{MemoryStore, NewAssignment, Store};

fn route(warehouse_id: WarehouseId) -> Route {
    Route {
        id: RouteId::new(),
        warehouse_id,
        name: "R1".to_string(),
        start_time: "09:00".to_string(),
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

fn service(
    store: Arc<MemoryStore>,
    now: DateTime<Utc>,
) -> LifecycleService<FixedClock> {
    let tenant = TenantClock::new(chrono_tz::UTC, FixedClock::new(now));
    LifecycleService::new(store, tenant, DispatchPolicy::default())
}

#[tokio::test]
async fn confirm_outside_the_window_is_refused_without_mutation() {
    let store = Arc::new(MemoryStore::new());
    let org_id = OrgId::new();
    let warehouse_id = WarehouseId::new();
    let r = route(warehouse_id);
    store.seed_route(r.clone());
    let d = driver(org_id);
    store.seed_driver(d.clone());

    let date = NaiveDate::from_ymd_opt(2026, 3, 8).unwrap();
    let now: DateTime<Utc> = "2026-02-20T00:00:00Z".parse().unwrap();
    let assignment_id = store
        .insert_assignment(NewAssignment {
            warehouse_id,
            route_id: r.id,
            date,
            user_id: Some(d.id),
            status: AssignmentStatus::Scheduled,
            assigned_by: Some(AssignedBy::Algorithm),
            assigned_at: Some(now),
        })
        .await
        .unwrap();

    let svc = service(store.clone(), now);
    let broadcaster = Broadcaster::new();
    let err = svc
        .confirm_shift(assignment_id, org_id, &broadcaster, now)
        .await
        .unwrap_err();
    assert!(err.to_string().contains("state_changed"));

    let assignment = store.get_assignment(assignment_id, Some(org_id)).await.unwrap().unwrap();
    assert!(assignment.confirmed_at.is_none());
}

#[tokio::test]
async fn confirm_inside_the_window_succeeds_and_bumps_metrics() {
    let store = Arc::new(MemoryStore::new());
    let org_id = OrgId::new();
    let warehouse_id = WarehouseId::new();
    let r = route(warehouse_id);
    store.seed_route(r.clone());
    let d = driver(org_id);
    store.seed_driver(d.clone());

    let date = NaiveDate::from_ymd_opt(2026, 3, 8).unwrap();
    let assigned_at: DateTime<Utc> = "2026-02-20T00:00:00Z".parse().unwrap();
    let assignment_id = store
        .insert_assignment(NewAssignment {
            warehouse_id,
            route_id: r.id,
            date,
            user_id: Some(d.id),
            status: AssignmentStatus::Scheduled,
            assigned_by: Some(AssignedBy::Algorithm),
            assigned_at: Some(assigned_at),
        })
        .await
        .unwrap();

    let now: DateTime<Utc> = "2026-03-02T12:00:00Z".parse().unwrap();
    let svc = service(store.clone(), now);
    let broadcaster = Broadcaster::new();
    svc.confirm_shift(assignment_id, org_id, &broadcaster, now)
        .await
        .unwrap();

    let assignment = store.get_assignment(assignment_id, Some(org_id)).await.unwrap().unwrap();
    assert!(assignment.confirmed_at.is_some());
    let metrics = store.get_driver_metrics(d.id).await.unwrap();
    assert_eq!(metrics.confirmed_shifts, 1);
}

#[tokio::test]
async fn cancel_before_deadline_is_early_after_is_late() {
    let store = Arc::new(MemoryStore::new());
    let org_id = OrgId::new();
    let warehouse_id = WarehouseId::new();
    let r = route(warehouse_id);
    store.seed_route(r.clone());
    let d = driver(org_id);
    store.seed_driver(d.clone());

    let date = NaiveDate::from_ymd_opt(2026, 3, 8).unwrap();
    let assigned_at: DateTime<Utc> = "2026-02-20T00:00:00Z".parse().unwrap();
    let early_id = store
        .insert_assignment(NewAssignment {
            warehouse_id,
            route_id: r.id,
            date,
            user_id: Some(d.id),
            status: AssignmentStatus::Scheduled,
            assigned_by: Some(AssignedBy::Algorithm),
            assigned_at: Some(assigned_at),
        })
        .await
        .unwrap();

    let before_deadline: DateTime<Utc> = "2026-03-01T00:00:00Z".parse().unwrap();
    let svc = service(store.clone(), before_deadline);
    let broadcaster = Broadcaster::new();
    let cancel_type = svc
        .cancel_assignment(early_id, org_id, &broadcaster, before_deadline)
        .await
        .unwrap();
    assert_eq!(cancel_type, CancelType::Early);
    let metrics = store.get_driver_metrics(d.id).await.unwrap();
    assert_eq!(metrics.late_cancels, 0);

    let d2 = driver(org_id);
    store.seed_driver(d2.clone());
    let late_id = store
        .insert_assignment(NewAssignment {
            warehouse_id,
            route_id: r.id,
            date,
            user_id: Some(d2.id),
            status: AssignmentStatus::Scheduled,
            assigned_by: Some(AssignedBy::Algorithm),
            assigned_at: Some(assigned_at),
        })
        .await
        .unwrap();

    let after_deadline: DateTime<Utc> = "2026-03-07T00:00:00Z".parse().unwrap();
    let svc = service(store.clone(), after_deadline);
    let broadcaster = Broadcaster::new();
    let cancel_type = svc
        .cancel_assignment(late_id, org_id, &broadcaster, after_deadline)
        .await
        .unwrap();
    assert_eq!(cancel_type, CancelType::Late);
    let metrics = store.get_driver_metrics(d2.id).await.unwrap();
    assert_eq!(metrics.late_cancels, 1);
    assert_eq!(metrics.total_shifts, 1);
}

#[tokio::test]
async fn full_lifecycle_arrive_start_complete_updates_metrics() {
    let store = Arc::new(MemoryStore::new());
    let org_id = OrgId::new();
    let warehouse_id = WarehouseId::new();
    let r = route(warehouse_id);
    store.seed_route(r.clone());
    let d = driver(org_id);
    store.seed_driver(d.clone());

    let today = NaiveDate::from_ymd_opt(2026, 3, 8).unwrap();
    let assigned_at: DateTime<Utc> = "2026-02-20T00:00:00Z".parse().unwrap();
    let assignment_id = store
        .insert_assignment(NewAssignment {
            warehouse_id,
            route_id: r.id,
            date: today,
            user_id: Some(d.id),
            status: AssignmentStatus::Scheduled,
            assigned_by: Some(AssignedBy::Algorithm),
            assigned_at: Some(assigned_at),
        })
        .await
        .unwrap();

    let broadcaster = Broadcaster::new();

    let confirm_at: DateTime<Utc> = "2026-03-02T00:00:00Z".parse().unwrap();
    let svc = service(store.clone(), confirm_at);
    svc.confirm_shift(assignment_id, org_id, &broadcaster, confirm_at)
        .await
        .unwrap();

    let arrive_at: DateTime<Utc> = "2026-03-08T08:30:00Z".parse().unwrap();
    let svc = service(store.clone(), arrive_at);
    svc.record_arrival(assignment_id, org_id, &broadcaster, arrive_at)
        .await
        .unwrap();
    let metrics = store.get_driver_metrics(d.id).await.unwrap();
    assert_eq!(metrics.arrived_on_time_shifts, 1);

    svc.start_shift(assignment_id, org_id, &broadcaster, arrive_at)
        .await
        .unwrap();
    svc.complete_shift(assignment_id, org_id, &broadcaster, 98, 2, 1, arrive_at)
        .await
        .unwrap();

    let metrics = store.get_driver_metrics(d.id).await.unwrap();
    assert_eq!(metrics.total_shifts, 1);
    assert_eq!(metrics.completed_shifts, 1);
    assert_eq!(metrics.high_delivery_shifts, 1);
    assert!((metrics.attendance_rate - 1.0).abs() < 1e-9);
}

#[tokio::test]
async fn auto_drop_sweep_only_touches_stale_unconfirmed_assignments() {
    let store = Arc::new(MemoryStore::new());
    let org_id = OrgId::new();
    let warehouse_id = WarehouseId::new();
    let r = route(warehouse_id);
    store.seed_route(r.clone());
    let d = driver(org_id);
    store.seed_driver(d.clone());

    let date = NaiveDate::from_ymd_opt(2026, 3, 8).unwrap();
    let assigned_at: DateTime<Utc> = "2026-02-20T00:00:00Z".parse().unwrap();
    let assignment_id = store
        .insert_assignment(NewAssignment {
            warehouse_id,
            route_id: r.id,
            date,
            user_id: Some(d.id),
            status: AssignmentStatus::Scheduled,
            assigned_by: Some(AssignedBy::Algorithm),
            assigned_at: Some(assigned_at),
        })
        .await
        .unwrap();

    let past_deadline: DateTime<Utc> = "2026-03-07T00:00:00Z".parse().unwrap();
    let svc = service(store.clone(), past_deadline);
    let dropped = svc.sweep_auto_drop(org_id, past_deadline).await.unwrap();

    assert_eq!(dropped.len(), 1);
    assert_eq!(dropped[0].assignment_id, assignment_id);
    let assignment = store.get_assignment(assignment_id, Some(org_id)).await.unwrap().unwrap();
    assert_eq!(assignment.status, AssignmentStatus::Cancelled);
    assert_eq!(assignment.cancel_type, Some(CancelType::AutoDrop));
    let metrics = store.get_driver_metrics(d.id).await.unwrap();
    assert_eq!(metrics.auto_drops, 1);

    let rerun = svc.sweep_auto_drop(org_id, past_deadline).await.unwrap();
    assert!(rerun.is_empty());
}

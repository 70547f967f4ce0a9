use std::sync::Arc;

use broadcaster::Broadcaster;
use chrono::{DateTime, NaiveDate, Utc};
use common::policy::DispatchPolicy;
use common::FixedClock;
use domain::assignment::{AssignedBy, AssignmentStatus};
use domain::bidding::{BidWindowMode, BidWindowTrigger};
use domain::driver::{Driver, DriverMetrics};
use domain::ids::{OrgId, RouteId, UserId, WarehouseId};
use domain::route::Route;
use notifier::transport::LoggingPushTransport;
use notifier::Notifier;
use store::{MemoryStore, NewAssignment, NewBidWindow, Store};

use cron::CronJobs;

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
        created_at: "2025-01-01T00:00:00Z".parse().unwrap(),
    }
}

fn jobs(store: Arc<MemoryStore>, now: DateTime<Utc>) -> CronJobs<Arc<FixedClock>> {
    let clock = Arc::new(FixedClock::new(now));
    let notifier = Arc::new(Notifier::new(store.clone(), Arc::new(LoggingPushTransport)));
    let broadcaster = Arc::new(Broadcaster::new());
    CronJobs::new(store, notifier, broadcaster, chrono_tz::UTC, clock, DispatchPolicy::default())
}

#[tokio::test]
async fn send_shift_reminders_is_idempotent_across_runs() {
    let store = Arc::new(MemoryStore::new());
    let org_id = OrgId::new();
    let warehouse_id = WarehouseId::new();
    let r = route(warehouse_id);
    store.seed_route(r.clone());

    let d = driver(org_id);
    store.seed_driver(d.clone());
    store.seed_driver_metrics(d.id, DriverMetrics::default());

    let today = NaiveDate::from_ymd_opt(2026, 3, 20).unwrap();
    let now: DateTime<Utc> = "2026-03-20T06:00:00Z".parse().unwrap();
    store
        .insert_assignment(NewAssignment {
            warehouse_id,
            route_id: r.id,
            date: today,
            user_id: Some(d.id),
            status: AssignmentStatus::Scheduled,
            assigned_by: Some(AssignedBy::Algorithm),
            assigned_at: Some(now),
        })
        .await
        .unwrap();

    let j = jobs(store.clone(), now);
    let first = j.send_shift_reminders(today, now).await.unwrap();
    assert_eq!(first.sent, 1);
    assert!(first.errors.is_empty());

    let second = j.send_shift_reminders(today, now).await.unwrap();
    assert_eq!(second.sent, 1);
    assert_eq!(store.notifications_len(), 1);
}

#[tokio::test]
async fn auto_drop_unconfirmed_cancels_and_opens_a_rebid_window() {
    let store = Arc::new(MemoryStore::new());
    let org_id = OrgId::new();
    let warehouse_id = WarehouseId::new();
    let r = route(warehouse_id);
    store.seed_route(r.clone());

    let d = driver(org_id);
    store.seed_driver(d.clone());
    store.seed_driver_metrics(d.id, DriverMetrics::default());

    // Confirmation deadline (48h before a 09:00 shift) has long passed and
    // the driver never confirmed.
    let date = NaiveDate::from_ymd_opt(2026, 3, 20).unwrap();
    let now: DateTime<Utc> = "2026-03-19T12:00:00Z".parse().unwrap();
    let assignment_id = store
        .insert_assignment(NewAssignment {
            warehouse_id,
            route_id: r.id,
            date,
            user_id: Some(d.id),
            status: AssignmentStatus::Scheduled,
            assigned_by: Some(AssignedBy::Algorithm),
            assigned_at: Some("2026-03-01T00:00:00Z".parse().unwrap()),
        })
        .await
        .unwrap();

    let j = jobs(store.clone(), now);
    let result = j.auto_drop_unconfirmed(now).await.unwrap();
    assert_eq!(result.dropped, 1);
    assert_eq!(result.rebid_windows_opened, 1);

    let assignment = store.get_assignment(assignment_id, Some(org_id)).await.unwrap().unwrap();
    assert_eq!(assignment.status, AssignmentStatus::Cancelled);
}

#[tokio::test]
async fn close_bid_windows_closes_an_expired_window_with_no_bids() {
    let store = Arc::new(MemoryStore::new());
    let org_id = OrgId::new();
    let warehouse_id = WarehouseId::new();
    let r = route(warehouse_id);
    store.seed_route(r.clone());

    let date = NaiveDate::from_ymd_opt(2026, 3, 20).unwrap();
    let assignment_id = store
        .insert_assignment(NewAssignment {
            warehouse_id,
            route_id: r.id,
            date,
            user_id: None,
            status: AssignmentStatus::Unfilled,
            assigned_by: None,
            assigned_at: None,
        })
        .await
        .unwrap();

    let opens_at: DateTime<Utc> = "2026-03-18T00:00:00Z".parse().unwrap();
    let closes_at: DateTime<Utc> = "2026-03-18T06:00:00Z".parse().unwrap();
    store
        .create_bid_window(NewBidWindow {
            assignment_id,
            mode: BidWindowMode::Instant,
            trigger: BidWindowTrigger::Cancellation,
            pay_bonus_percent: 0,
            opens_at,
            closes_at,
        })
        .await
        .unwrap();

    let now: DateTime<Utc> = "2026-03-18T07:00:00Z".parse().unwrap();
    let j = jobs(store.clone(), now);
    let result = j.close_bid_windows(now).await.unwrap();
    assert_eq!(result.windows_seen, 1);
    assert_eq!(result.closed_without_winner, 1);
    assert_eq!(result.resolved, 0);

    // A second pass finds nothing left expired-and-open.
    let rerun = j.close_bid_windows(now).await.unwrap();
    assert_eq!(rerun.windows_seen, 0);
}

#[tokio::test]
async fn run_daily_health_evaluation_scores_every_driver_with_shifts() {
    let store = Arc::new(MemoryStore::new());
    let org_id = OrgId::new();
    let d = driver(org_id);
    store.seed_driver(d.clone());
    store.seed_driver_metrics(
        d.id,
        DriverMetrics {
            total_shifts: 10,
            completed_shifts: 10,
            attendance_rate: 1.0,
            completion_rate: 1.0,
            confirmed_shifts: 10,
            arrived_on_time_shifts: 10,
            high_delivery_shifts: 10,
            ..Default::default()
        },
    );

    let today = NaiveDate::from_ymd_opt(2026, 3, 20).unwrap();
    let now: DateTime<Utc> = "2026-03-20T12:00:00Z".parse().unwrap();
    let j = jobs(store.clone(), now);
    let result = j.run_daily_health_evaluation(today, now).await.unwrap();

    assert_eq!(result.drivers_evaluated, 1);
    assert_eq!(result.failures, 0);
}

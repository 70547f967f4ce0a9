use std::sync::Arc;

use broadcaster::Broadcaster;
use chrono::{DateTime, NaiveDate, Utc};
use common::policy::DispatchPolicy;
use common::{FixedClock, TenantClock};
use domain::assignment::{AssignedBy, AssignmentStatus};
use domain::bidding::{BidWindowMode, BidWindowTrigger};
use domain::driver::Driver;
use domain::ids::{OrgId, RouteId, UserId, WarehouseId};
use domain::route::Route;
use notifier::transport::LoggingPushTransport;
use notifier::Notifier;
use store::{MemoryStore, NewAssignment, Store};

use bidding::{BiddingService, CreateBidWindowOptions, CreateOutcome};

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

fn service(store: Arc<MemoryStore>, now: DateTime<Utc>) -> BiddingService<FixedClock> {
    let tenant = TenantClock::new(chrono_tz::UTC, FixedClock::new(now));
    let notifier = Arc::new(Notifier::new(store.clone(), Arc::new(LoggingPushTransport)));
    BiddingService::new(store, tenant, notifier, DispatchPolicy::default())
}

#[tokio::test]
async fn competitive_window_with_no_bids_transitions_to_instant_on_resolve() {
    let store = Arc::new(MemoryStore::new());
    let org_id = OrgId::new();
    let warehouse_id = WarehouseId::new();
    let r = route(warehouse_id);
    store.seed_route(r.clone());

    let date = NaiveDate::from_ymd_opt(2026, 3, 20).unwrap();
    let now: DateTime<Utc> = "2026-03-01T00:00:00Z".parse().unwrap();
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

    let svc = service(store.clone(), now);
    let broadcaster = Broadcaster::new();
    let outcome = svc
        .create_bid_window(
            assignment_id,
            org_id,
            CreateBidWindowOptions {
                requested_mode: None,
                allow_past_shift: false,
                trigger: BidWindowTrigger::Cancellation,
            },
            &broadcaster,
            now,
        )
        .await
        .unwrap();
    let CreateOutcome::Created(window_id) = outcome else {
        panic!("expected a new window");
    };

    let detail = svc.get_bid_window_detail(window_id, Some(org_id)).await.unwrap().unwrap();
    assert_eq!(detail.window.mode, BidWindowMode::Competitive);
    assert!(detail.bids.is_empty());

    let resolved = svc.resolve_bid_window(window_id, org_id, &broadcaster, now).await.unwrap();
    assert!(matches!(resolved, store::ResolveOutcome::NotOpen));

    let detail = svc.get_bid_window_detail(window_id, Some(org_id)).await.unwrap().unwrap();
    assert_eq!(detail.window.mode, BidWindowMode::Instant);
}

#[tokio::test]
async fn resolve_picks_highest_scored_bidder_without_a_same_day_conflict() {
    let store = Arc::new(MemoryStore::new());
    let org_id = OrgId::new();
    let warehouse_id = WarehouseId::new();
    let r = route(warehouse_id);
    store.seed_route(r.clone());

    let date = NaiveDate::from_ymd_opt(2026, 3, 20).unwrap();
    let now: DateTime<Utc> = "2026-03-19T00:00:00Z".parse().unwrap();
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

    let strong = driver(org_id);
    store.seed_driver(strong.clone());
    store.seed_driver_metrics(strong.id, domain::driver::DriverMetrics::default());

    let weak = driver(org_id);
    store.seed_driver(weak.clone());
    store.seed_driver_metrics(weak.id, domain::driver::DriverMetrics::default());

    let svc = service(store.clone(), now);
    let broadcaster = Broadcaster::new();
    let outcome = svc
        .create_bid_window(
            assignment_id,
            org_id,
            CreateBidWindowOptions {
                requested_mode: Some(BidWindowMode::Instant),
                allow_past_shift: false,
                trigger: BidWindowTrigger::Cancellation,
            },
            &broadcaster,
            now,
        )
        .await
        .unwrap();
    let CreateOutcome::Created(window_id) = outcome else {
        panic!("expected a new window");
    };

    svc.place_bid(window_id, weak.id, org_id, now).await.unwrap();
    svc.place_bid(window_id, strong.id, org_id, now).await.unwrap();

    // Give the "strong" bidder more route familiarity so they outscore the
    // other bid placed at the same instant.
    store
        .increment_route_completion(strong.id, r.id, now)
        .await
        .unwrap();

    let resolved = svc.resolve_bid_window(window_id, org_id, &broadcaster, now).await.unwrap();
    match resolved {
        store::ResolveOutcome::Resolved { winner } => assert_eq!(winner, strong.id),
        other => panic!("expected a resolved winner, got {other:?}"),
    }

    let assignment = store.get_assignment(assignment_id, Some(org_id)).await.unwrap().unwrap();
    assert_eq!(assignment.user_id, Some(strong.id));
}

#[tokio::test]
async fn instant_assign_refuses_a_second_driver_on_the_same_date() {
    let store = Arc::new(MemoryStore::new());
    let org_id = OrgId::new();
    let warehouse_id = WarehouseId::new();
    let r = route(warehouse_id);
    store.seed_route(r.clone());

    let date = NaiveDate::from_ymd_opt(2026, 3, 20).unwrap();
    let now: DateTime<Utc> = "2026-03-19T12:00:00Z".parse().unwrap();
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

    let d = driver(org_id);
    store.seed_driver(d.clone());
    store.seed_driver_metrics(d.id, domain::driver::DriverMetrics::default());

    let other_route = route(warehouse_id);
    store.seed_route(other_route.clone());
    store
        .insert_assignment(NewAssignment {
            warehouse_id,
            route_id: other_route.id,
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
    let outcome = svc
        .create_bid_window(
            assignment_id,
            org_id,
            CreateBidWindowOptions {
                requested_mode: Some(BidWindowMode::Instant),
                allow_past_shift: false,
                trigger: BidWindowTrigger::Cancellation,
            },
            &broadcaster,
            now,
        )
        .await
        .unwrap();
    let CreateOutcome::Created(window_id) = outcome else {
        panic!("expected a new window");
    };

    let err = svc.instant_assign(window_id, d.id, org_id, now).await.unwrap_err();
    assert!(err.to_string().contains("already have a shift"));
}

#[tokio::test]
async fn no_show_sweep_opens_an_emergency_window_and_bumps_no_shows() {
    let store = Arc::new(MemoryStore::new());
    let org_id = OrgId::new();
    let warehouse_id = WarehouseId::new();
    let r = route(warehouse_id);
    store.seed_route(r.clone());

    let d = driver(org_id);
    store.seed_driver(d.clone());
    store.seed_driver_metrics(d.id, domain::driver::DriverMetrics::default());

    let today = NaiveDate::from_ymd_opt(2026, 3, 20).unwrap();
    let confirm_at: DateTime<Utc> = "2026-03-15T00:00:00Z".parse().unwrap();
    let assignment_id = store
        .insert_assignment(NewAssignment {
            warehouse_id,
            route_id: r.id,
            date: today,
            user_id: Some(d.id),
            status: AssignmentStatus::Scheduled,
            assigned_by: Some(AssignedBy::Algorithm),
            assigned_at: Some(confirm_at),
        })
        .await
        .unwrap();
    store.confirm_assignment(assignment_id, confirm_at).await.unwrap();

    let after_shift_start: DateTime<Utc> = "2026-03-20T10:00:00Z".parse().unwrap();
    let svc = service(store.clone(), after_shift_start);
    let broadcaster = Broadcaster::new();
    let result = svc.detect_no_shows(org_id, &broadcaster, after_shift_start).await.unwrap();

    assert_eq!(result.detected, 1);
    let metrics = store.get_driver_metrics(d.id).await.unwrap();
    assert_eq!(metrics.no_shows, 1);

    // A second run within the same hour is a no-op: the emergency window
    // created above is still open.
    let rerun = svc.detect_no_shows(org_id, &broadcaster, after_shift_start).await.unwrap();
    assert_eq!(rerun.detected, 0);
    assert_eq!(rerun.skipped_already_open, 1);
}

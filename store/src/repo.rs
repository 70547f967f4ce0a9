use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use domain::assignment::{Assignment, CancelType, Shift};
use domain::audit::ActorType;
use domain::bidding::{Bid, BidStatus, BidWindow};
use domain::driver::{Driver, DriverMetrics, DriverPreferences, RouteCompletion};
use domain::health::{DriverHealthSnapshot, DriverHealthState};
use domain::ids::{
    AssignmentId, BidWindowId, OrgId, RouteId, UserId, WarehouseId,
};
use domain::notification::Notification;
use domain::route::Route;
use serde_json::Value;

use crate::types::{
    CreateBidWindowOutcome, InstantAssignOutcome, NewAssignment, NewBidWindow, ResolveOutcome,
    ScoredBid, TransitionOutcome,
};

/// The typed query/transaction boundary every component depends on.
/// Each method that mutates state manages its own transaction and row
/// locks internally and returns a domain-level outcome rather than a raw
/// `rows_affected` count, the same shape as this codebase's
/// `SessionRepository` trait (`reserve_execution`/`commit_batch`): callers
/// never see a SQL type, and a concurrent loser gets a clean result value
/// instead of a propagated error.
#[async_trait]
pub trait Store: Send + Sync {
    // -- reference data -----------------------------------------------
    /// Every tenant with a row in `organizations`, the set the cron
    /// scheduler iterates once per pass so a periodic job never needs an
    /// org id handed to it from outside.
    async fn list_organizations(&self) -> anyhow::Result<Vec<OrgId>>;
    async fn list_routes(&self, org_id: OrgId) -> anyhow::Result<Vec<Route>>;
    async fn get_route(&self, route_id: RouteId, org_id: OrgId) -> anyhow::Result<Option<Route>>;
    async fn get_route_manager(
        &self,
        route_id: RouteId,
        org_id: OrgId,
    ) -> anyhow::Result<Option<UserId>>;
    async fn can_manager_access_warehouse(
        &self,
        user_id: UserId,
        warehouse_id: WarehouseId,
        org_id: OrgId,
    ) -> anyhow::Result<bool>;

    // -- drivers --------------------------------------------------------
    async fn list_non_flagged_drivers(&self, org_id: OrgId) -> anyhow::Result<Vec<Driver>>;
    async fn get_driver(&self, user_id: UserId, org_id: OrgId) -> anyhow::Result<Option<Driver>>;
    async fn get_driver_preferences(
        &self,
        user_id: UserId,
    ) -> anyhow::Result<Option<DriverPreferences>>;
    async fn get_driver_metrics(&self, user_id: UserId) -> anyhow::Result<DriverMetrics>;
    async fn update_driver_metrics(
        &self,
        user_id: UserId,
        metrics: DriverMetrics,
    ) -> anyhow::Result<()>;
    async fn get_route_completion(
        &self,
        user_id: UserId,
        route_id: RouteId,
    ) -> anyhow::Result<RouteCompletion>;
    async fn increment_route_completion(
        &self,
        user_id: UserId,
        route_id: RouteId,
        now: DateTime<Utc>,
    ) -> anyhow::Result<()>;
    async fn set_driver_flag(
        &self,
        user_id: UserId,
        is_flagged: bool,
        flag_warning_date: Option<DateTime<Utc>>,
        weekly_cap: i32,
    ) -> anyhow::Result<()>;
    async fn clear_driver_token_if_matches(
        &self,
        user_id: UserId,
        token: &str,
    ) -> anyhow::Result<()>;

    // -- assignments ------------------------------------------------------
    async fn list_week_assignments(
        &self,
        org_id: OrgId,
        week_start: NaiveDate,
        week_end_exclusive: NaiveDate,
    ) -> anyhow::Result<Vec<Assignment>>;
    async fn insert_assignment(&self, new: NewAssignment) -> anyhow::Result<AssignmentId>;
    async fn get_assignment(
        &self,
        id: AssignmentId,
        org_id: Option<OrgId>,
    ) -> anyhow::Result<Option<Assignment>>;
    async fn get_shift(&self, assignment_id: AssignmentId) -> anyhow::Result<Option<Shift>>;
    async fn confirm_assignment(
        &self,
        id: AssignmentId,
        now: DateTime<Utc>,
    ) -> anyhow::Result<bool>;
    async fn cancel_assignment(
        &self,
        id: AssignmentId,
        now: DateTime<Utc>,
        cancel_type: CancelType,
    ) -> anyhow::Result<bool>;
    async fn record_arrival(&self, id: AssignmentId, now: DateTime<Utc>) -> anyhow::Result<bool>;
    async fn start_shift(&self, id: AssignmentId, now: DateTime<Utc>) -> anyhow::Result<bool>;
    async fn complete_shift(
        &self,
        id: AssignmentId,
        now: DateTime<Utc>,
        parcels_delivered: i64,
        parcels_returned: i64,
        excepted_returns: i64,
    ) -> anyhow::Result<bool>;
    async fn weekly_assignment_count(
        &self,
        user_id: UserId,
        week_start: NaiveDate,
        week_end_exclusive: NaiveDate,
    ) -> anyhow::Result<i64>;
    async fn same_day_conflict(
        &self,
        user_id: UserId,
        date: NaiveDate,
        excluding_assignment: Option<AssignmentId>,
    ) -> anyhow::Result<bool>;
    async fn coerce_unfilled(&self, id: AssignmentId, now: DateTime<Utc>) -> anyhow::Result<()>;
    async fn delete_partial_shift(&self, assignment_id: AssignmentId) -> anyhow::Result<()>;

    /// Today's confirmed assignments (joined with their route) with no
    /// `arrivedAt` yet, used by no-show detection.
    async fn list_todays_confirmed_unarrived(
        &self,
        org_id: OrgId,
        today: NaiveDate,
    ) -> anyhow::Result<Vec<(Assignment, Route)>>;

    /// `status=scheduled, confirmedAt=null` assignments whose confirmation
    /// deadline has passed, used by the auto-drop sweep.
    async fn list_stale_unconfirmed(
        &self,
        org_id: OrgId,
        now: DateTime<Utc>,
    ) -> anyhow::Result<Vec<Assignment>>;

    /// Today's scheduled-but-not-started assignments, used for shift
    /// reminders.
    async fn list_todays_scheduled_not_started(
        &self,
        org_id: OrgId,
        today: NaiveDate,
    ) -> anyhow::Result<Vec<Assignment>>;

    async fn list_other_active_today(
        &self,
        org_id: OrgId,
        today: NaiveDate,
        excluding_assignment: AssignmentId,
    ) -> anyhow::Result<Vec<UserId>>;

    // -- bid windows / bids ------------------------------------------------
    async fn create_bid_window(
        &self,
        new: NewBidWindow,
    ) -> anyhow::Result<CreateBidWindowOutcome>;
    async fn get_bid_window(
        &self,
        id: BidWindowId,
        org_id: Option<OrgId>,
    ) -> anyhow::Result<Option<(BidWindow, Assignment)>>;
    async fn list_pending_bids(&self, window_id: BidWindowId) -> anyhow::Result<Vec<Bid>>;
    async fn place_bid(
        &self,
        window_id: BidWindowId,
        user_id: UserId,
        now: DateTime<Utc>,
    ) -> anyhow::Result<Bid>;
    async fn resolve_bid_window(
        &self,
        window_id: BidWindowId,
        scored_candidates: &[ScoredBid],
        now: DateTime<Utc>,
    ) -> anyhow::Result<ResolveOutcome>;
    async fn close_without_winner(&self, window_id: BidWindowId) -> anyhow::Result<()>;
    async fn transition_to_instant(
        &self,
        window_id: BidWindowId,
        now: DateTime<Utc>,
        new_closes_at: DateTime<Utc>,
    ) -> anyhow::Result<TransitionOutcome>;
    async fn instant_assign(
        &self,
        window_id: BidWindowId,
        user_id: UserId,
        now: DateTime<Utc>,
    ) -> anyhow::Result<InstantAssignOutcome>;
    async fn manual_assign(
        &self,
        assignment_id: AssignmentId,
        user_id: UserId,
        now: DateTime<Utc>,
    ) -> anyhow::Result<()>;
    async fn get_expired_bid_windows(
        &self,
        org_id: OrgId,
        now: DateTime<Utc>,
    ) -> anyhow::Result<Vec<BidWindowId>>;

    // -- health -------------------------------------------------------------
    async fn get_health_state(&self, user_id: UserId) -> anyhow::Result<DriverHealthState>;
    async fn update_health_state_guarded(
        &self,
        user_id: UserId,
        expected_last_reset_at: Option<DateTime<Utc>>,
        new_state: DriverHealthState,
    ) -> anyhow::Result<bool>;
    async fn reset_health_on_no_show(
        &self,
        user_id: UserId,
        now: DateTime<Utc>,
    ) -> anyhow::Result<()>;
    async fn upsert_health_snapshot(&self, snapshot: DriverHealthSnapshot) -> anyhow::Result<()>;
    async fn list_driver_ids_with_shifts(&self, org_id: OrgId) -> anyhow::Result<Vec<UserId>>;

    // -- notifications / audit ----------------------------------------------
    async fn insert_notification(&self, notification: Notification) -> anyhow::Result<()>;
    async fn record_audit(
        &self,
        entity_type: &str,
        entity_id: String,
        action: &str,
        actor_type: ActorType,
        actor_id: Option<UserId>,
        changes: Value,
        now: DateTime<Utc>,
    ) -> anyhow::Result<()>;
}

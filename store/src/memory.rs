//! In-process `Store` implementation for tests, grounded in this
//! codebase's `InMemorySessionStore` test double (a `Mutex`-guarded
//! `HashMap` standing in for the SQL-backed repository so higher-level
//! components can be unit tested without a database).

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use domain::assignment::{AssignedBy, Assignment, AssignmentStatus, CancelType, Shift};
use domain::audit::ActorType;
use domain::bidding::{Bid, BidStatus, BidWindow, BidWindowStatus};
use domain::driver::{Driver, DriverMetrics, DriverPreferences, RouteCompletion};
use domain::health::{DriverHealthSnapshot, DriverHealthState};
use domain::ids::*;
use domain::notification::Notification;
use domain::route::Route;
use serde_json::Value;

use crate::repo::Store;
use crate::types::{
    CreateBidWindowOutcome, InstantAssignOutcome, NewAssignment, NewBidWindow, ResolveOutcome,
    ScoredBid, TransitionOutcome,
};

#[derive(Default)]
struct Inner {
    routes: HashMap<RouteId, Route>,
    drivers: HashMap<UserId, Driver>,
    driver_preferences: HashMap<UserId, DriverPreferences>,
    driver_metrics: HashMap<UserId, DriverMetrics>,
    route_completions: HashMap<(UserId, RouteId), RouteCompletion>,
    assignments: HashMap<AssignmentId, Assignment>,
    shifts: HashMap<AssignmentId, Shift>,
    bid_windows: HashMap<BidWindowId, BidWindow>,
    bids: HashMap<BidId, Bid>,
    health_state: HashMap<UserId, DriverHealthState>,
    health_snapshots: Vec<DriverHealthSnapshot>,
    notifications: Vec<Notification>,
    audit: Vec<(String, String, String)>,
}

#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed_route(&self, route: Route) {
        self.inner.lock().unwrap().routes.insert(route.id, route);
    }

    pub fn seed_driver(&self, driver: Driver) {
        self.inner.lock().unwrap().drivers.insert(driver.id, driver);
    }

    pub fn seed_driver_preferences(&self, prefs: DriverPreferences) {
        self.inner
            .lock()
            .unwrap()
            .driver_preferences
            .insert(prefs.user_id, prefs);
    }

    pub fn seed_driver_metrics(&self, user_id: UserId, metrics: DriverMetrics) {
        self.inner.lock().unwrap().driver_metrics.insert(user_id, metrics);
    }

    pub fn notifications_len(&self) -> usize {
        self.inner.lock().unwrap().notifications.len()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn list_organizations(&self) -> anyhow::Result<Vec<OrgId>> {
        let g = self.inner.lock().unwrap();
        let mut orgs: Vec<OrgId> = g.drivers.values().map(|d| d.org_id).collect();
        orgs.sort();
        orgs.dedup();
        Ok(orgs)
    }

    async fn list_routes(&self, _org_id: OrgId) -> anyhow::Result<Vec<Route>> {
        Ok(self.inner.lock().unwrap().routes.values().cloned().collect())
    }

    async fn get_route(&self, route_id: RouteId, _org_id: OrgId) -> anyhow::Result<Option<Route>> {
        Ok(self.inner.lock().unwrap().routes.get(&route_id).cloned())
    }

    async fn get_route_manager(
        &self,
        route_id: RouteId,
        org_id: OrgId,
    ) -> anyhow::Result<Option<UserId>> {
        Ok(self
            .get_route(route_id, org_id)
            .await?
            .and_then(|r| r.primary_manager_id))
    }

    async fn can_manager_access_warehouse(
        &self,
        _user_id: UserId,
        _warehouse_id: WarehouseId,
        _org_id: OrgId,
    ) -> anyhow::Result<bool> {
        Ok(true)
    }

    async fn list_non_flagged_drivers(&self, _org_id: OrgId) -> anyhow::Result<Vec<Driver>> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .drivers
            .values()
            .filter(|d| !d.is_flagged)
            .cloned()
            .collect())
    }

    async fn get_driver(&self, user_id: UserId, _org_id: OrgId) -> anyhow::Result<Option<Driver>> {
        Ok(self.inner.lock().unwrap().drivers.get(&user_id).cloned())
    }

    async fn get_driver_preferences(
        &self,
        user_id: UserId,
    ) -> anyhow::Result<Option<DriverPreferences>> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .driver_preferences
            .get(&user_id)
            .cloned())
    }

    async fn get_driver_metrics(&self, user_id: UserId) -> anyhow::Result<DriverMetrics> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .driver_metrics
            .get(&user_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn update_driver_metrics(
        &self,
        user_id: UserId,
        metrics: DriverMetrics,
    ) -> anyhow::Result<()> {
        self.inner.lock().unwrap().driver_metrics.insert(user_id, metrics);
        Ok(())
    }

    async fn get_route_completion(
        &self,
        user_id: UserId,
        route_id: RouteId,
    ) -> anyhow::Result<RouteCompletion> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .route_completions
            .get(&(user_id, route_id))
            .cloned()
            .unwrap_or(RouteCompletion {
                user_id,
                route_id,
                completion_count: 0,
                last_completed_at: None,
            }))
    }

    async fn increment_route_completion(
        &self,
        user_id: UserId,
        route_id: RouteId,
        now: DateTime<Utc>,
    ) -> anyhow::Result<()> {
        let mut g = self.inner.lock().unwrap();
        let entry = g
            .route_completions
            .entry((user_id, route_id))
            .or_insert(RouteCompletion {
                user_id,
                route_id,
                completion_count: 0,
                last_completed_at: None,
            });
        entry.completion_count += 1;
        entry.last_completed_at = Some(now);
        Ok(())
    }

    async fn set_driver_flag(
        &self,
        user_id: UserId,
        is_flagged: bool,
        flag_warning_date: Option<DateTime<Utc>>,
        weekly_cap: i32,
    ) -> anyhow::Result<()> {
        if let Some(d) = self.inner.lock().unwrap().drivers.get_mut(&user_id) {
            d.is_flagged = is_flagged;
            d.flag_warning_date = flag_warning_date;
            d.weekly_cap = weekly_cap;
        }
        Ok(())
    }

    async fn clear_driver_token_if_matches(
        &self,
        user_id: UserId,
        token: &str,
    ) -> anyhow::Result<()> {
        if let Some(d) = self.inner.lock().unwrap().drivers.get_mut(&user_id) {
            if d.fcm_token.as_deref() == Some(token) {
                d.fcm_token = None;
            }
        }
        Ok(())
    }

    async fn list_week_assignments(
        &self,
        _org_id: OrgId,
        week_start: NaiveDate,
        week_end_exclusive: NaiveDate,
    ) -> anyhow::Result<Vec<Assignment>> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .assignments
            .values()
            .filter(|a| {
                a.date >= week_start
                    && a.date < week_end_exclusive
                    && a.status != AssignmentStatus::Cancelled
            })
            .cloned()
            .collect())
    }

    async fn insert_assignment(&self, new: NewAssignment) -> anyhow::Result<AssignmentId> {
        let mut g = self.inner.lock().unwrap();
        if new.status != AssignmentStatus::Cancelled {
            if let Some(user_id) = new.user_id {
                let conflict = g.assignments.values().any(|a| {
                    a.user_id == Some(user_id)
                        && a.date == new.date
                        && a.status != AssignmentStatus::Cancelled
                });
                if conflict {
                    anyhow::bail!("unique violation: uq_assignments_active_user_date");
                }
            }
        }
        let id = AssignmentId::new();
        g.assignments.insert(
            id,
            Assignment {
                id,
                warehouse_id: new.warehouse_id,
                route_id: new.route_id,
                date: new.date,
                user_id: new.user_id,
                status: new.status,
                confirmed_at: None,
                cancelled_at: None,
                cancel_type: None,
                assigned_by: new.assigned_by,
                assigned_at: new.assigned_at,
            },
        );
        Ok(id)
    }

    async fn get_assignment(
        &self,
        id: AssignmentId,
        _org_id: Option<OrgId>,
    ) -> anyhow::Result<Option<Assignment>> {
        Ok(self.inner.lock().unwrap().assignments.get(&id).cloned())
    }

    async fn get_shift(&self, assignment_id: AssignmentId) -> anyhow::Result<Option<Shift>> {
        Ok(self.inner.lock().unwrap().shifts.get(&assignment_id).cloned())
    }

    async fn confirm_assignment(
        &self,
        id: AssignmentId,
        now: DateTime<Utc>,
    ) -> anyhow::Result<bool> {
        let mut g = self.inner.lock().unwrap();
        if let Some(a) = g.assignments.get_mut(&id) {
            if a.status == AssignmentStatus::Scheduled && a.confirmed_at.is_none() {
                a.confirmed_at = Some(now);
                return Ok(true);
            }
        }
        Ok(false)
    }

    async fn cancel_assignment(
        &self,
        id: AssignmentId,
        now: DateTime<Utc>,
        cancel_type: CancelType,
    ) -> anyhow::Result<bool> {
        let mut g = self.inner.lock().unwrap();
        if let Some(a) = g.assignments.get_mut(&id) {
            if a.status != AssignmentStatus::Cancelled {
                a.status = AssignmentStatus::Cancelled;
                a.cancelled_at = Some(now);
                a.cancel_type = Some(cancel_type);
                return Ok(true);
            }
        }
        Ok(false)
    }

    async fn record_arrival(&self, id: AssignmentId, now: DateTime<Utc>) -> anyhow::Result<bool> {
        let mut g = self.inner.lock().unwrap();
        let eligible = g
            .assignments
            .get(&id)
            .map(|a| matches!(a.status, AssignmentStatus::Scheduled | AssignmentStatus::Active))
            .unwrap_or(false);
        if !eligible {
            return Ok(false);
        }
        let shift = g.shifts.entry(id).or_insert(Shift {
            arrived_at: None,
            started_at: None,
            completed_at: None,
            parcels_start: None,
            parcels_delivered: None,
            parcels_returned: None,
            excepted_returns: None,
            exception_notes: None,
        });
        if shift.arrived_at.is_some() {
            return Ok(false);
        }
        shift.arrived_at = Some(now);
        if let Some(a) = g.assignments.get_mut(&id) {
            a.status = AssignmentStatus::Active;
        }
        Ok(true)
    }

    async fn start_shift(&self, id: AssignmentId, now: DateTime<Utc>) -> anyhow::Result<bool> {
        let mut g = self.inner.lock().unwrap();
        if let Some(s) = g.shifts.get_mut(&id) {
            if s.arrived_at.is_some() && s.parcels_start.is_none() {
                s.parcels_start = Some(0);
                s.started_at = Some(now);
                return Ok(true);
            }
        }
        Ok(false)
    }

    async fn complete_shift(
        &self,
        id: AssignmentId,
        now: DateTime<Utc>,
        parcels_delivered: i64,
        parcels_returned: i64,
        excepted_returns: i64,
    ) -> anyhow::Result<bool> {
        let mut g = self.inner.lock().unwrap();
        let completable = g
            .shifts
            .get(&id)
            .map(|s| s.parcels_start.is_some() && s.completed_at.is_none())
            .unwrap_or(false);
        if !completable {
            return Ok(false);
        }
        if let Some(s) = g.shifts.get_mut(&id) {
            s.completed_at = Some(now);
            s.parcels_delivered = Some(parcels_delivered);
            s.parcels_returned = Some(parcels_returned);
            s.excepted_returns = Some(excepted_returns);
        }
        if let Some(a) = g.assignments.get_mut(&id) {
            a.status = AssignmentStatus::Completed;
        }
        Ok(true)
    }

    async fn weekly_assignment_count(
        &self,
        user_id: UserId,
        week_start: NaiveDate,
        week_end_exclusive: NaiveDate,
    ) -> anyhow::Result<i64> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .assignments
            .values()
            .filter(|a| {
                a.user_id == Some(user_id)
                    && a.date >= week_start
                    && a.date < week_end_exclusive
                    && a.status != AssignmentStatus::Cancelled
            })
            .count() as i64)
    }

    async fn same_day_conflict(
        &self,
        user_id: UserId,
        date: NaiveDate,
        excluding_assignment: Option<AssignmentId>,
    ) -> anyhow::Result<bool> {
        Ok(self.inner.lock().unwrap().assignments.values().any(|a| {
            a.user_id == Some(user_id)
                && a.date == date
                && a.status != AssignmentStatus::Cancelled
                && Some(a.id) != excluding_assignment
        }))
    }

    async fn coerce_unfilled(&self, id: AssignmentId, _now: DateTime<Utc>) -> anyhow::Result<()> {
        if let Some(a) = self.inner.lock().unwrap().assignments.get_mut(&id) {
            a.status = AssignmentStatus::Unfilled;
            a.user_id = None;
        }
        Ok(())
    }

    async fn delete_partial_shift(&self, assignment_id: AssignmentId) -> anyhow::Result<()> {
        let mut g = self.inner.lock().unwrap();
        if g.shifts.get(&assignment_id).map(|s| s.completed_at.is_none()).unwrap_or(false) {
            g.shifts.remove(&assignment_id);
        }
        Ok(())
    }

    async fn list_todays_confirmed_unarrived(
        &self,
        _org_id: OrgId,
        today: NaiveDate,
    ) -> anyhow::Result<Vec<(Assignment, Route)>> {
        let g = self.inner.lock().unwrap();
        Ok(g.assignments
            .values()
            .filter(|a| {
                a.date == today
                    && a.status == AssignmentStatus::Scheduled
                    && a.confirmed_at.is_some()
                    && g.shifts.get(&a.id).and_then(|s| s.arrived_at).is_none()
            })
            .filter_map(|a| g.routes.get(&a.route_id).map(|r| (a.clone(), r.clone())))
            .collect())
    }

    async fn list_stale_unconfirmed(
        &self,
        _org_id: OrgId,
        _now: DateTime<Utc>,
    ) -> anyhow::Result<Vec<Assignment>> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .assignments
            .values()
            .filter(|a| a.status == AssignmentStatus::Scheduled && a.confirmed_at.is_none())
            .cloned()
            .collect())
    }

    async fn list_todays_scheduled_not_started(
        &self,
        _org_id: OrgId,
        today: NaiveDate,
    ) -> anyhow::Result<Vec<Assignment>> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .assignments
            .values()
            .filter(|a| a.date == today && a.status == AssignmentStatus::Scheduled)
            .cloned()
            .collect())
    }

    async fn list_other_active_today(
        &self,
        _org_id: OrgId,
        today: NaiveDate,
        excluding_assignment: AssignmentId,
    ) -> anyhow::Result<Vec<UserId>> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .assignments
            .values()
            .filter(|a| {
                a.date == today
                    && matches!(a.status, AssignmentStatus::Scheduled | AssignmentStatus::Active)
                    && a.id != excluding_assignment
            })
            .filter_map(|a| a.user_id)
            .collect())
    }

    async fn create_bid_window(
        &self,
        new: NewBidWindow,
    ) -> anyhow::Result<CreateBidWindowOutcome> {
        let mut g = self.inner.lock().unwrap();
        let exists = g
            .bid_windows
            .values()
            .any(|w| w.assignment_id == new.assignment_id && w.status == BidWindowStatus::Open);
        if exists {
            return Ok(CreateBidWindowOutcome::AlreadyExists);
        }
        let id = BidWindowId::new();
        g.bid_windows.insert(
            id,
            BidWindow {
                id,
                assignment_id: new.assignment_id,
                mode: new.mode,
                trigger: new.trigger,
                pay_bonus_percent: new.pay_bonus_percent,
                opens_at: new.opens_at,
                closes_at: new.closes_at,
                status: BidWindowStatus::Open,
                winner_id: None,
            },
        );
        Ok(CreateBidWindowOutcome::Created(id))
    }

    async fn get_bid_window(
        &self,
        id: BidWindowId,
        _org_id: Option<OrgId>,
    ) -> anyhow::Result<Option<(BidWindow, Assignment)>> {
        let g = self.inner.lock().unwrap();
        let Some(window) = g.bid_windows.get(&id).cloned() else {
            return Ok(None);
        };
        Ok(g.assignments.get(&window.assignment_id).cloned().map(|a| (window, a)))
    }

    async fn list_pending_bids(&self, window_id: BidWindowId) -> anyhow::Result<Vec<Bid>> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .bids
            .values()
            .filter(|b| b.bid_window_id == window_id && b.status == BidStatus::Pending)
            .cloned()
            .collect())
    }

    async fn place_bid(
        &self,
        window_id: BidWindowId,
        user_id: UserId,
        now: DateTime<Utc>,
    ) -> anyhow::Result<Bid> {
        let mut g = self.inner.lock().unwrap();
        if let Some(existing) = g
            .bids
            .values()
            .find(|b| b.bid_window_id == window_id && b.user_id == user_id && b.status == BidStatus::Pending)
            .cloned()
        {
            return Ok(existing);
        }
        let id = BidId::new();
        let bid = Bid {
            id,
            bid_window_id: window_id,
            user_id,
            score: None,
            bid_at: now,
            status: BidStatus::Pending,
            resolved_at: None,
        };
        g.bids.insert(id, bid.clone());
        Ok(bid)
    }

    async fn resolve_bid_window(
        &self,
        window_id: BidWindowId,
        scored_candidates: &[ScoredBid],
        now: DateTime<Utc>,
    ) -> anyhow::Result<ResolveOutcome> {
        let mut g = self.inner.lock().unwrap();
        let Some(window) = g.bid_windows.get(&window_id).cloned() else {
            return Ok(ResolveOutcome::NotOpen);
        };
        if window.status != BidWindowStatus::Open {
            return Ok(ResolveOutcome::NotOpen);
        }

        for candidate in scored_candidates {
            let conflict = g.assignments.values().any(|a| {
                a.user_id == Some(candidate.user_id)
                    && g.bid_windows.get(&window_id).map(|w| {
                        g.assignments.get(&w.assignment_id).map(|wa| wa.date) == Some(a.date)
                    }).unwrap_or(false)
                    && a.status != AssignmentStatus::Cancelled
                    && a.id != window.assignment_id
            });
            if conflict {
                continue;
            }

            if let Some(a) = g.assignments.get_mut(&window.assignment_id) {
                a.user_id = Some(candidate.user_id);
                a.status = AssignmentStatus::Scheduled;
                a.assigned_by = Some(AssignedBy::Bid);
                a.assigned_at = Some(now);
            }
            if let Some(w) = g.bid_windows.get_mut(&window_id) {
                w.status = BidWindowStatus::Resolved;
                w.winner_id = Some(candidate.user_id);
            }
            for bid in g.bids.values_mut() {
                if bid.bid_window_id == window_id && bid.status == BidStatus::Pending {
                    bid.resolved_at = Some(now);
                    bid.status = if bid.id == candidate.bid_id {
                        bid.score = Some(candidate.score);
                        BidStatus::Won
                    } else {
                        BidStatus::Lost
                    };
                }
            }
            return Ok(ResolveOutcome::Resolved { winner: candidate.user_id });
        }

        Ok(ResolveOutcome::AllConflicted)
    }

    async fn close_without_winner(&self, window_id: BidWindowId) -> anyhow::Result<()> {
        if let Some(w) = self.inner.lock().unwrap().bid_windows.get_mut(&window_id) {
            if w.status == BidWindowStatus::Open {
                w.status = BidWindowStatus::Closed;
            }
        }
        Ok(())
    }

    async fn transition_to_instant(
        &self,
        window_id: BidWindowId,
        _now: DateTime<Utc>,
        new_closes_at: DateTime<Utc>,
    ) -> anyhow::Result<TransitionOutcome> {
        let mut g = self.inner.lock().unwrap();
        if let Some(w) = g.bid_windows.get_mut(&window_id) {
            if w.status == BidWindowStatus::Open && w.mode == domain::bidding::BidWindowMode::Competitive {
                w.mode = domain::bidding::BidWindowMode::Instant;
                w.closes_at = new_closes_at;
                return Ok(TransitionOutcome::Transitioned);
            }
        }
        Ok(TransitionOutcome::Refused)
    }

    async fn instant_assign(
        &self,
        window_id: BidWindowId,
        user_id: UserId,
        now: DateTime<Utc>,
    ) -> anyhow::Result<InstantAssignOutcome> {
        let mut g = self.inner.lock().unwrap();
        let Some(window) = g.bid_windows.get(&window_id).cloned() else {
            return Ok(InstantAssignOutcome::WindowNotOpen);
        };
        if window.status != BidWindowStatus::Open {
            return Ok(InstantAssignOutcome::WindowNotOpen);
        }

        let Some(assignment_date) = g.assignments.get(&window.assignment_id).map(|a| a.date) else {
            return Ok(InstantAssignOutcome::WindowNotOpen);
        };
        let conflict = g.assignments.values().any(|a| {
            a.user_id == Some(user_id)
                && a.date == assignment_date
                && a.status != AssignmentStatus::Cancelled
                && a.id != window.assignment_id
        });
        if conflict {
            return Ok(InstantAssignOutcome::AlreadyHasShiftThatDate);
        }

        if let Some(a) = g.assignments.get_mut(&window.assignment_id) {
            a.user_id = Some(user_id);
            a.status = AssignmentStatus::Scheduled;
            a.assigned_by = Some(AssignedBy::Bid);
            a.assigned_at = Some(now);
        }
        let bid_id = BidId::new();
        g.bids.insert(
            bid_id,
            Bid {
                id: bid_id,
                bid_window_id: window_id,
                user_id,
                score: None,
                bid_at: now,
                status: BidStatus::Won,
                resolved_at: Some(now),
            },
        );
        if let Some(w) = g.bid_windows.get_mut(&window_id) {
            w.status = BidWindowStatus::Resolved;
            w.winner_id = Some(user_id);
        }
        for bid in g.bids.values_mut() {
            if bid.bid_window_id == window_id && bid.status == BidStatus::Pending {
                bid.status = BidStatus::Lost;
                bid.resolved_at = Some(now);
            }
        }
        g.shifts.remove(&window.assignment_id);
        Ok(InstantAssignOutcome::Assigned)
    }

    async fn manual_assign(
        &self,
        assignment_id: AssignmentId,
        user_id: UserId,
        now: DateTime<Utc>,
    ) -> anyhow::Result<()> {
        let mut g = self.inner.lock().unwrap();
        if let Some(a) = g.assignments.get_mut(&assignment_id) {
            a.user_id = Some(user_id);
            a.status = AssignmentStatus::Scheduled;
            a.assigned_by = Some(AssignedBy::Manager);
            a.assigned_at = Some(now);
        }
        for w in g.bid_windows.values_mut() {
            if w.assignment_id == assignment_id && w.status == BidWindowStatus::Open {
                w.status = BidWindowStatus::Resolved;
                w.winner_id = None;
            }
        }
        Ok(())
    }

    async fn get_expired_bid_windows(
        &self,
        _org_id: OrgId,
        now: DateTime<Utc>,
    ) -> anyhow::Result<Vec<BidWindowId>> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .bid_windows
            .values()
            .filter(|w| w.status == BidWindowStatus::Open && w.closes_at <= now)
            .map(|w| w.id)
            .collect())
    }

    async fn get_health_state(&self, user_id: UserId) -> anyhow::Result<DriverHealthState> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .health_state
            .get(&user_id)
            .cloned()
            .unwrap_or_else(|| DriverHealthState::new(user_id)))
    }

    async fn update_health_state_guarded(
        &self,
        user_id: UserId,
        expected_last_reset_at: Option<DateTime<Utc>>,
        new_state: DriverHealthState,
    ) -> anyhow::Result<bool> {
        let mut g = self.inner.lock().unwrap();
        let current = g
            .health_state
            .get(&user_id)
            .and_then(|s| s.last_score_reset_at);
        if current != expected_last_reset_at {
            return Ok(false);
        }
        g.health_state.insert(user_id, new_state);
        Ok(true)
    }

    async fn reset_health_on_no_show(
        &self,
        user_id: UserId,
        now: DateTime<Utc>,
    ) -> anyhow::Result<()> {
        let mut g = self.inner.lock().unwrap();
        let mut state = g
            .health_state
            .get(&user_id)
            .cloned()
            .unwrap_or_else(|| DriverHealthState::new(user_id));
        state.current_score = 0;
        state.stars = 0;
        state.streak_weeks = 0;
        state.assignment_pool_eligible = false;
        state.requires_manager_intervention = true;
        state.last_score_reset_at = Some(now);
        g.health_state.insert(user_id, state);
        Ok(())
    }

    async fn upsert_health_snapshot(&self, snapshot: DriverHealthSnapshot) -> anyhow::Result<()> {
        let mut g = self.inner.lock().unwrap();
        g.health_snapshots
            .retain(|s| !(s.user_id == snapshot.user_id && s.evaluated_at == snapshot.evaluated_at));
        g.health_snapshots.push(snapshot);
        Ok(())
    }

    async fn list_driver_ids_with_shifts(&self, _org_id: OrgId) -> anyhow::Result<Vec<UserId>> {
        let g = self.inner.lock().unwrap();
        Ok(g.driver_metrics
            .iter()
            .filter(|(_, m)| m.total_shifts >= 1)
            .map(|(id, _)| *id)
            .collect())
    }

    async fn insert_notification(&self, notification: Notification) -> anyhow::Result<()> {
        let mut g = self.inner.lock().unwrap();
        if let Some(key) = &notification.dedupe_key {
            let duplicate = g.notifications.iter().any(|n| {
                n.org_id == notification.org_id
                    && n.recipient_user_id == notification.recipient_user_id
                    && n.dedupe_key.as_deref() == Some(key.as_str())
            });
            if duplicate {
                return Ok(());
            }
        }
        g.notifications.push(notification);
        Ok(())
    }

    async fn record_audit(
        &self,
        entity_type: &str,
        entity_id: String,
        action: &str,
        _actor_type: ActorType,
        _actor_id: Option<UserId>,
        _changes: Value,
        _now: DateTime<Utc>,
    ) -> anyhow::Result<()> {
        self.inner
            .lock()
            .unwrap()
            .audit
            .push((entity_type.to_string(), entity_id, action.to_string()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::assignment::AssignmentStatus;

    #[tokio::test]
    async fn insert_assignment_rejects_same_day_double_booking() {
        let store = MemoryStore::new();
        let user_id = UserId::new();
        let warehouse_id = WarehouseId::new();
        let route_id = RouteId::new();
        let date = NaiveDate::from_ymd_opt(2026, 8, 3).unwrap();

        store
            .insert_assignment(NewAssignment {
                warehouse_id,
                route_id,
                date,
                user_id: Some(user_id),
                status: AssignmentStatus::Scheduled,
                assigned_by: None,
                assigned_at: None,
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
                assigned_by: None,
                assigned_at: None,
            })
            .await;

        assert!(second.is_err());
    }
}

//! I/O shell for bid-window creation, resolution, and the no-show sweep.
//! Mirrors `health/src/evaluator.rs`'s shape: the pure math lives in
//! `scoring.rs`, this module does nothing but gather state, call the
//! store's guarded transaction methods, and fire the notifications each
//! step implies.

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use common::policy::DispatchPolicy;
use common::{Clock, TenantClock};
use domain::assignment::{derive_shift_progress, AssignmentStatus};
use domain::audit::ActorType;
use domain::bidding::{BidWindow, BidWindowMode, BidWindowStatus, BidWindowTrigger};
use domain::driver::Driver;
use domain::ids::{AssignmentId, BidId, BidWindowId, OrgId, RouteId, UserId};
use domain::notification::NotificationType;
use notifier::Notifier;
use store::{
    CreateBidWindowOutcome, InstantAssignOutcome, NewBidWindow, ResolveOutcome, ScoredBid, Store,
    TransitionOutcome,
};
use tracing::warn;

use crate::scoring::{calculate_bid_score, select_mode, ModeSelectionError};

/// Row-lock/conflict retries on `resolveBidWindow` before giving up;
/// same discipline as the health evaluator's CAS retry bound, scoped to
/// "all scored candidates conflicted, re-fetch the pending bids and try
/// once more" rather than an optimistic-write race.
const MAX_RESOLVE_ATTEMPTS: usize = 3;

#[derive(Debug, Clone, PartialEq)]
pub enum BiddingError {
    NotFound,
    NotOpen,
    ShiftInPast,
    Forbidden(&'static str),
    /// "You already have a shift on this date."
    AlreadyHasShiftThatDate,
    /// "Route already assigned." — lost a race to another winner.
    RouteAlreadyAssigned,
}

impl std::fmt::Display for BiddingError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BiddingError::NotFound => write!(f, "not found"),
            BiddingError::NotOpen => write!(f, "not_open"),
            BiddingError::ShiftInPast => write!(f, "shift already passed"),
            BiddingError::Forbidden(reason) => write!(f, "{reason}"),
            BiddingError::AlreadyHasShiftThatDate => write!(f, "You already have a shift on this date"),
            BiddingError::RouteAlreadyAssigned => write!(f, "Route already assigned"),
        }
    }
}

impl std::error::Error for BiddingError {}

#[derive(Debug, Clone, Copy)]
pub struct CreateBidWindowOptions {
    pub requested_mode: Option<BidWindowMode>,
    pub allow_past_shift: bool,
    pub trigger: BidWindowTrigger,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateOutcome {
    Created(BidWindowId),
    AlreadyExists,
}

#[derive(Debug, Clone)]
pub struct BidWindowDetail {
    pub window: BidWindow,
    pub bids: Vec<domain::bidding::Bid>,
}

#[derive(Debug, Clone, Default)]
pub struct NoShowSweepResult {
    pub detected: i64,
    pub skipped_already_open: i64,
    pub errors: Vec<String>,
}

pub struct BiddingService<C: Clock> {
    store: Arc<dyn Store>,
    tenant: TenantClock<C>,
    notifier: Arc<Notifier>,
    policy: DispatchPolicy,
}

impl<C: Clock> BiddingService<C> {
    pub fn new(
        store: Arc<dyn Store>,
        tenant: TenantClock<C>,
        notifier: Arc<Notifier>,
        policy: DispatchPolicy,
    ) -> Self {
        Self {
            store,
            tenant,
            notifier,
            policy,
        }
    }

    async fn shift_start(&self, route_id: RouteId, date: NaiveDate, org_id: OrgId) -> anyhow::Result<DateTime<Utc>> {
        let route = self
            .store
            .get_route(route_id, org_id)
            .await?
            .ok_or(BiddingError::NotFound)?;
        let (h, m) = route.start_time_parts();
        Ok(self.tenant.local_datetime_at(date, h, m)?)
    }

    /// Step 4.8.1: role=driver, !flagged, same org, under weekly cap.
    async fn eligible_recipients(&self, org_id: OrgId, date: NaiveDate) -> anyhow::Result<Vec<UserId>> {
        let week_start = TenantClock::<C>::week_start(date);
        let week_end = TenantClock::<C>::add_days(week_start, 7);
        let drivers = self.store.list_non_flagged_drivers(org_id).await?;
        let mut out = Vec::new();
        for d in drivers {
            let count = self.store.weekly_assignment_count(d.id, week_start, week_end).await?;
            if count < d.weekly_cap as i64 {
                out.push(d.id);
            }
        }
        Ok(out)
    }

    /// Steps 1-3 of `createBidWindow`.
    pub async fn create_bid_window(
        &self,
        assignment_id: AssignmentId,
        org_id: OrgId,
        opts: CreateBidWindowOptions,
        broadcaster: &broadcaster::Broadcaster,
        now: DateTime<Utc>,
    ) -> anyhow::Result<CreateOutcome> {
        let assignment = self
            .store
            .get_assignment(assignment_id, Some(org_id))
            .await?
            .ok_or(BiddingError::NotFound)?;

        if assignment.status != AssignmentStatus::Unfilled {
            self.store.coerce_unfilled(assignment_id, now).await?;
            self.store
                .record_audit(
                    "assignment",
                    assignment_id.to_string(),
                    "unfilled",
                    ActorType::System,
                    None,
                    serde_json::json!({ "reason": "bid_window_opened", "trigger": opts.trigger }),
                    now,
                )
                .await?;
        }

        let shift_start = self.shift_start(assignment.route_id, assignment.date, org_id).await?;
        let end_of_today = self.tenant.end_of_day(self.tenant.today_in_zone())?;
        let selection = select_mode(
            opts.requested_mode,
            opts.allow_past_shift,
            shift_start,
            now,
            end_of_today,
            self.policy.bidding_instant_mode_cutoff_hours,
        )
        .map_err(|e| match e {
            ModeSelectionError::ShiftInPast => BiddingError::ShiftInPast,
        })?;

        let pay_bonus_percent = match selection.mode {
            BidWindowMode::Emergency => self.policy.bidding_emergency_bonus_percent,
            _ => 0,
        };

        let outcome = self
            .store
            .create_bid_window(NewBidWindow {
                assignment_id,
                mode: selection.mode,
                trigger: opts.trigger,
                pay_bonus_percent,
                opens_at: now,
                closes_at: selection.closes_at,
            })
            .await?;

        let window_id = match outcome {
            CreateBidWindowOutcome::AlreadyExists => return Ok(CreateOutcome::AlreadyExists),
            CreateBidWindowOutcome::Created(id) => id,
        };

        let recipients = self.eligible_recipients(org_id, assignment.date).await?;
        self.notifier
            .send_bulk(
                org_id,
                recipients,
                NotificationType::BidOpen,
                "A shift is open for bidding".to_string(),
                "A route near you is accepting bids.".to_string(),
                serde_json::json!({ "bidWindowId": window_id.to_string(), "assignmentId": assignment_id.to_string() }),
                now,
            )
            .await;
        broadcaster
            .publish(
                org_id,
                broadcaster::Event::BidWindowOpened {
                    bid_window_id: window_id.to_string(),
                    assignment_id: assignment_id.to_string(),
                },
            )
            .await;

        Ok(CreateOutcome::Created(window_id))
    }

    /// `resolveBidWindow`, steps 2-6. Retries the conflict-skip path a
    /// bounded number of times before surfacing `AllConflicted` as a
    /// clean no-winner close rather than looping forever.
    pub async fn resolve_bid_window(
        &self,
        window_id: BidWindowId,
        org_id: OrgId,
        broadcaster: &broadcaster::Broadcaster,
        now: DateTime<Utc>,
    ) -> anyhow::Result<ResolveOutcome> {
        let Some((window, assignment)) = self.store.get_bid_window(window_id, Some(org_id)).await? else {
            return Ok(ResolveOutcome::NotOpen);
        };
        if window.status != BidWindowStatus::Open {
            return Ok(ResolveOutcome::NotOpen);
        }

        let pending = self.store.list_pending_bids(window_id).await?;
        if pending.is_empty() {
            if window.mode == BidWindowMode::Competitive {
                let transition = self.transition_to_instant(window_id, org_id, broadcaster, now).await?;
                return Ok(match transition {
                    TransitionOutcome::Transitioned => ResolveOutcome::NotOpen,
                    TransitionOutcome::ClosedAsExpired => ResolveOutcome::NotOpen,
                    TransitionOutcome::Refused => ResolveOutcome::NotOpen,
                });
            }
            self.store.close_without_winner(window_id).await?;
            self.notifier
                .send_manager_alert(
                    org_id,
                    assignment.route_id,
                    NotificationType::RouteUnfilled,
                    "Route unfilled",
                    "No bids were placed before this window closed.",
                    serde_json::json!({ "assignmentId": assignment.id.to_string() }),
                    now,
                )
                .await
                .ok();
            return Ok(ResolveOutcome::NotOpen);
        }

        let mut scored = Vec::with_capacity(pending.len());
        for bid in &pending {
            scored.push(
                self.score_bid(bid.id, bid.user_id, assignment.route_id, org_id, bid.bid_at, now)
                    .await?,
            );
        }
        scored.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then(a.bid_at.cmp(&b.bid_at))
                .then(a.bid_id.cmp(&b.bid_id))
        });

        for _ in 0..MAX_RESOLVE_ATTEMPTS {
            let outcome = self.store.resolve_bid_window(window_id, &scored, now).await?;
            match outcome {
                ResolveOutcome::Resolved { winner } => {
                    self.store
                        .record_audit(
                            "assignment",
                            assignment.id.to_string(),
                            domain::audit::actions::ASSIGN,
                            ActorType::System,
                            Some(winner),
                            serde_json::json!({ "bidWindowId": window_id.to_string() }),
                            now,
                        )
                        .await?;

                    self.notifier
                        .send(
                            org_id,
                            winner,
                            NotificationType::BidWon,
                            "You won the bid",
                            "Congratulations, you've been assigned this route.",
                            serde_json::json!({ "assignmentId": assignment.id.to_string() }),
                            None,
                            now,
                        )
                        .await?;
                    for bid in &pending {
                        if bid.user_id != winner {
                            self.notifier
                                .send(
                                    org_id,
                                    bid.user_id,
                                    NotificationType::BidLost,
                                    "Bid not selected",
                                    "Another driver was selected for this route.",
                                    serde_json::json!({}),
                                    None,
                                    now,
                                )
                                .await?;
                        }
                    }

                    broadcaster
                        .publish(
                            org_id,
                            broadcaster::Event::BidWindowClosed {
                                bid_window_id: window_id.to_string(),
                                assignment_id: assignment.id.to_string(),
                            },
                        )
                        .await;
                    let updated_assignment = self
                        .store
                        .get_assignment(assignment.id, Some(org_id))
                        .await?
                        .unwrap_or_else(|| assignment.clone());
                    let shift = self.store.get_shift(assignment.id).await.ok().flatten();
                    let shift_progress = derive_shift_progress(&updated_assignment, shift.as_ref());
                    let shift_progress = serde_json::to_value(shift_progress)
                        .ok()
                        .and_then(|v| v.as_str().map(str::to_string))
                        .unwrap_or_else(|| "unconfirmed".to_string());
                    broadcaster
                        .publish(
                            org_id,
                            broadcaster::Event::AssignmentUpdated {
                                assignment_id: assignment.id.to_string(),
                                shift_progress,
                            },
                        )
                        .await;
                    return Ok(outcome);
                }
                ResolveOutcome::AllConflicted => continue,
                ResolveOutcome::NotOpen => return Ok(outcome),
            }
        }

        self.store.close_without_winner(window_id).await?;
        Ok(ResolveOutcome::AllConflicted)
    }

    async fn score_bid(
        &self,
        bid_id: BidId,
        user_id: UserId,
        route_id: RouteId,
        org_id: OrgId,
        bid_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> anyhow::Result<ScoredBid> {
        let health = self.store.get_health_state(user_id).await?;
        let familiarity = self.store.get_route_completion(user_id, route_id).await?;
        let driver = self.store.get_driver(user_id, org_id).await?;
        let prefers_route = self
            .store
            .get_driver_preferences(user_id)
            .await?
            .map(|p| p.prefers_route(route_id))
            .unwrap_or(false);
        let tenure_months = driver_tenure_months(driver.as_ref(), now);

        let score = calculate_bid_score(
            health.current_score,
            familiarity.completion_count,
            tenure_months,
            prefers_route,
            &self.policy.bid_score,
        );
        Ok(ScoredBid {
            bid_id,
            user_id,
            score,
            bid_at,
        })
    }

    pub async fn transition_to_instant(
        &self,
        window_id: BidWindowId,
        org_id: OrgId,
        broadcaster: &broadcaster::Broadcaster,
        now: DateTime<Utc>,
    ) -> anyhow::Result<TransitionOutcome> {
        let Some((window, assignment)) = self.store.get_bid_window(window_id, Some(org_id)).await? else {
            return Ok(TransitionOutcome::Refused);
        };
        let shift_start = self.shift_start(assignment.route_id, assignment.date, org_id).await?;
        if shift_start <= now {
            self.store.close_without_winner(window_id).await?;
            return Ok(TransitionOutcome::ClosedAsExpired);
        }
        let outcome = self
            .store
            .transition_to_instant(window_id, now, shift_start)
            .await?;
        if outcome == TransitionOutcome::Transitioned {
            let recipients = self.eligible_recipients(org_id, assignment.date).await?;
            self.notifier
                .send_bulk(
                    org_id,
                    recipients,
                    NotificationType::BidOpen,
                    "This shift is now first-come-first-served".to_string(),
                    "No one won the competitive bid; claim it now before anyone else.".to_string(),
                    serde_json::json!({ "bidWindowId": window_id.to_string() }),
                    now,
                )
                .await;
            broadcaster
                .publish(
                    org_id,
                    broadcaster::Event::BidWindowOpened {
                        bid_window_id: window_id.to_string(),
                        assignment_id: assignment.id.to_string(),
                    },
                )
                .await;
        }
        let _ = window;
        Ok(outcome)
    }

    /// `instantAssign`, steps 1-6, with the error-mapping table applied
    /// directly to the store's closed outcome enum.
    pub async fn instant_assign(
        &self,
        window_id: BidWindowId,
        user_id: UserId,
        org_id: OrgId,
        now: DateTime<Utc>,
    ) -> anyhow::Result<()> {
        let Some((window, assignment)) = self.store.get_bid_window(window_id, Some(org_id)).await? else {
            return Err(BiddingError::RouteAlreadyAssigned.into());
        };

        let outcome = self.store.instant_assign(window_id, user_id, now).await?;
        match outcome {
            InstantAssignOutcome::Assigned => {}
            InstantAssignOutcome::WindowNotOpen => return Err(BiddingError::RouteAlreadyAssigned.into()),
            InstantAssignOutcome::AlreadyHasShiftThatDate => {
                return Err(BiddingError::AlreadyHasShiftThatDate.into())
            }
        }

        self.store
            .update_driver_metrics(user_id, {
                let mut m = self.store.get_driver_metrics(user_id).await?;
                m.bid_pickups += 1;
                if window.mode != BidWindowMode::Competitive {
                    m.urgent_pickups += 1;
                }
                m
            })
            .await?;

        self.store
            .record_audit(
                "assignment",
                assignment.id.to_string(),
                domain::audit::actions::INSTANT_ASSIGN,
                ActorType::User,
                Some(user_id),
                serde_json::json!({ "bidWindowId": window_id.to_string() }),
                now,
            )
            .await?;
        Ok(())
    }

    /// Manager-initiated assignment, bypassing bidding entirely. The store
    /// enforces eligibility at the row level; this checks the same
    /// warehouse-access/flag/weekly-cap rules up front so a rejected
    /// manager gets a reason instead of a generic failure.
    pub async fn manual_assign(
        &self,
        assignment_id: AssignmentId,
        manager_id: UserId,
        user_id: UserId,
        org_id: OrgId,
        now: DateTime<Utc>,
    ) -> anyhow::Result<()> {
        let assignment = self
            .store
            .get_assignment(assignment_id, Some(org_id))
            .await?
            .ok_or(BiddingError::NotFound)?;

        if !self
            .store
            .can_manager_access_warehouse(manager_id, assignment.warehouse_id, org_id)
            .await?
        {
            return Err(BiddingError::Forbidden("manager lacks warehouse access").into());
        }
        let driver = self
            .store
            .get_driver(user_id, org_id)
            .await?
            .ok_or(BiddingError::NotFound)?;
        if driver.is_flagged {
            return Err(BiddingError::Forbidden("driver is flagged").into());
        }
        let week_start = TenantClock::<C>::week_start(assignment.date);
        let week_end = TenantClock::<C>::add_days(week_start, 7);
        let weekly_count = self.store.weekly_assignment_count(user_id, week_start, week_end).await?;
        if weekly_count >= driver.weekly_cap as i64 {
            return Err(BiddingError::Forbidden("driver is at their weekly cap").into());
        }

        self.store.manual_assign(assignment_id, user_id, now).await?;
        self.store
            .record_audit(
                "assignment",
                assignment_id.to_string(),
                domain::audit::actions::MANUAL_ASSIGN,
                ActorType::User,
                Some(manager_id),
                serde_json::json!({ "userId": user_id.to_string() }),
                now,
            )
            .await?;

        self.notifier
            .send(
                org_id,
                user_id,
                NotificationType::AssignmentConfirmed,
                "You've been assigned a shift",
                "A manager assigned you to a shift directly.",
                serde_json::json!({ "assignmentId": assignment_id.to_string() }),
                None,
                now,
            )
            .await?;
        Ok(())
    }

    /// Driver-facing bid placement; idempotent on a repeat call from the
    /// same driver against the same open window.
    pub async fn place_bid(
        &self,
        window_id: BidWindowId,
        user_id: UserId,
        org_id: OrgId,
        now: DateTime<Utc>,
    ) -> anyhow::Result<domain::bidding::Bid> {
        let Some((window, _assignment)) = self.store.get_bid_window(window_id, Some(org_id)).await? else {
            return Err(BiddingError::NotFound.into());
        };
        if window.status != domain::bidding::BidWindowStatus::Open {
            return Err(BiddingError::NotOpen.into());
        }
        let driver = self
            .store
            .get_driver(user_id, org_id)
            .await?
            .ok_or(BiddingError::NotFound)?;
        if driver.is_flagged {
            return Err(BiddingError::Forbidden("driver is flagged").into());
        }

        self.store.place_bid(window_id, user_id, now).await
    }

    pub async fn get_bid_window_detail(
        &self,
        window_id: BidWindowId,
        org_id: Option<OrgId>,
    ) -> anyhow::Result<Option<BidWindowDetail>> {
        let Some((window, _assignment)) = self.store.get_bid_window(window_id, org_id).await? else {
            return Ok(None);
        };
        let bids = self.store.list_pending_bids(window_id).await?;
        Ok(Some(BidWindowDetail { window, bids }))
    }

    /// No-show detection (§4.9), run hourly. Skips an assignment already
    /// covered by an open bid window so a re-run mid-hour is a no-op.
    pub async fn detect_no_shows(
        &self,
        org_id: OrgId,
        broadcaster: &broadcaster::Broadcaster,
        now: DateTime<Utc>,
    ) -> anyhow::Result<NoShowSweepResult> {
        let today = self.tenant.today_in_zone();
        let candidates = self.store.list_todays_confirmed_unarrived(org_id, today).await?;
        let mut result = NoShowSweepResult::default();

        for (assignment, route) in candidates {
            let (h, m) = route.start_time_parts();
            let route_deadline = match self.tenant.local_datetime_at(today, h, m) {
                Ok(t) => t,
                Err(e) => {
                    result.errors.push(format!("{}: {e}", assignment.id));
                    continue;
                }
            };
            if now < route_deadline {
                continue;
            }

            let Some(user_id) = assignment.user_id else {
                continue;
            };

            match self
                .handle_no_show(org_id, assignment.id, assignment.route_id, user_id, broadcaster, now)
                .await
            {
                Ok(true) => result.detected += 1,
                Ok(false) => result.skipped_already_open += 1,
                Err(e) => {
                    warn!(assignment_id = %assignment.id, error = %e, "no-show handling failed");
                    result.errors.push(format!("{}: {e}", assignment.id));
                }
            }
        }

        Ok(result)
    }

    async fn handle_no_show(
        &self,
        org_id: OrgId,
        assignment_id: AssignmentId,
        route_id: RouteId,
        user_id: UserId,
        broadcaster: &broadcaster::Broadcaster,
        now: DateTime<Utc>,
    ) -> anyhow::Result<bool> {
        let outcome = self
            .create_bid_window(
                assignment_id,
                org_id,
                CreateBidWindowOptions {
                    requested_mode: Some(BidWindowMode::Emergency),
                    allow_past_shift: true,
                    trigger: BidWindowTrigger::NoShow,
                },
                broadcaster,
                now,
            )
            .await?;
        if outcome == CreateOutcome::AlreadyExists {
            return Ok(false);
        }

        self.store
            .update_driver_metrics(user_id, {
                let mut m = self.store.get_driver_metrics(user_id).await?;
                m.no_shows += 1;
                m
            })
            .await?;
        self.store.reset_health_on_no_show(user_id, now).await?;

        self.notifier
            .send_manager_alert(
                org_id,
                route_id,
                NotificationType::DriverNoShow,
                "Driver no-show",
                "A driver did not arrive for their confirmed shift.",
                serde_json::json!({ "assignmentId": assignment_id.to_string(), "userId": user_id.to_string() }),
                now,
            )
            .await?;

        let recipients = self.eligible_recipients(org_id, self.tenant.today_in_zone()).await?;
        let recipients: Vec<UserId> = recipients.into_iter().filter(|r| *r != user_id).collect();
        self.notifier
            .send_bulk(
                org_id,
                recipients,
                NotificationType::EmergencyRouteAvailable,
                "Emergency shift available".to_string(),
                "A route just opened up and needs a driver immediately.".to_string(),
                serde_json::json!({ "assignmentId": assignment_id.to_string() }),
                now,
            )
            .await;

        self.store
            .record_audit(
                "assignment",
                assignment_id.to_string(),
                domain::audit::actions::NO_SHOW_DETECTED,
                ActorType::System,
                None,
                serde_json::json!({ "userId": user_id.to_string() }),
                now,
            )
            .await?;
        Ok(true)
    }
}

fn driver_tenure_months(driver: Option<&Driver>, now: DateTime<Utc>) -> f64 {
    driver.map(|d| d.tenure_months(now)).unwrap_or(0.0)
}

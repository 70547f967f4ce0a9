//! I/O shell that fans the rest of the crate's per-domain services out
//! over every tenant. Each method here is one periodic pass: list the
//! organizations, run the underlying service once per org, fold the
//! per-org outcomes into a single report. Mirrors `health/src/evaluator.rs`'s
//! `run_daily_batch` in spirit (gather, dispatch, collect errors instead of
//! propagating the first one) but fanned out over tenants instead of
//! drivers within one tenant.

use std::sync::Arc;

use broadcaster::Broadcaster;
use chrono::{DateTime, NaiveDate, Utc};
use common::policy::DispatchPolicy;
use common::{Clock, TenantClock};
use domain::bidding::BidWindowTrigger;
use domain::notification::NotificationType;
use notifier::Notifier;
use scheduler::{GenerationResult, ScheduleGenerator};
use serde::Serialize;
use store::Store;
use tracing::warn;

use bidding::{BiddingService, CreateBidWindowOptions, CreateOutcome, NoShowSweepResult};
use lifecycle::LifecycleService;

#[derive(Debug, Clone, Default, Serialize)]
pub struct BidWindowSweepResult {
    pub windows_seen: i64,
    pub resolved: i64,
    /// Window closed without producing a winner: no bids and the mode
    /// wasn't competitive, every scored candidate conflicted, or the
    /// window had already left `open` by the time this ran. `resolve_bid_window`
    /// collapses all three into the same `NotOpen` outcome, so this count
    /// isn't further split.
    pub closed_without_winner: i64,
    pub errors: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ReminderSweepResult {
    pub sent: i64,
    pub errors: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct AutoDropSweepResult {
    pub dropped: i64,
    pub rebid_windows_opened: i64,
    pub errors: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct HealthSweepResult {
    pub drivers_evaluated: i64,
    pub failures: i64,
}

/// Wires the per-domain services together the way `dispatchd` wires them
/// for the request path, minus the HTTP layer. One `CronJobs` per process;
/// every method iterates `store.list_organizations()` internally so the
/// caller never has to know which tenants exist.
pub struct CronJobs<C: Clock + Clone> {
    store: Arc<dyn Store>,
    notifier: Arc<Notifier>,
    broadcaster: Arc<Broadcaster>,
    scheduler: ScheduleGenerator,
    lifecycle: LifecycleService<C>,
    bidding: BiddingService<C>,
    health: health::HealthEvaluator,
}

impl<C: Clock + Clone> CronJobs<C> {
    pub fn new(
        store: Arc<dyn Store>,
        notifier: Arc<Notifier>,
        broadcaster: Arc<Broadcaster>,
        zone: chrono_tz::Tz,
        clock: C,
        policy: DispatchPolicy,
    ) -> Self {
        let lifecycle = LifecycleService::new(
            store.clone(),
            TenantClock::new(zone, clock.clone()),
            policy.clone(),
        );
        let bidding = BiddingService::new(
            store.clone(),
            TenantClock::new(zone, clock.clone()),
            notifier.clone(),
            policy.clone(),
        );
        let health = health::HealthEvaluator::new(store.clone(), notifier.clone(), policy.clone());
        let scheduler = ScheduleGenerator::new(store.clone());

        Self {
            store,
            notifier,
            broadcaster,
            scheduler,
            lifecycle,
            bidding,
            health,
        }
    }

    /// Generates (or re-confirms) the week containing `week_reference_date`
    /// for every organization.
    pub async fn generate_week_schedule(
        &self,
        week_reference_date: NaiveDate,
        now: DateTime<Utc>,
    ) -> anyhow::Result<GenerationResult> {
        let mut total = GenerationResult::default();
        for org_id in self.store.list_organizations().await? {
            match self.scheduler.generate_week(org_id, week_reference_date, now).await {
                Ok(r) => {
                    total.created += r.created;
                    total.skipped += r.skipped;
                    total.unfilled += r.unfilled;
                    total.errors.extend(r.errors);
                }
                Err(e) => {
                    warn!(%org_id, error = %e, "week schedule generation failed for organization");
                    total.errors.push(e.to_string());
                }
            }
        }
        Ok(total)
    }

    /// Resolves every bid window whose `closesAt` has passed, across every
    /// organization.
    pub async fn close_bid_windows(&self, now: DateTime<Utc>) -> anyhow::Result<BidWindowSweepResult> {
        let mut result = BidWindowSweepResult::default();
        for org_id in self.store.list_organizations().await? {
            let expired = match self.store.get_expired_bid_windows(org_id, now).await {
                Ok(w) => w,
                Err(e) => {
                    result.errors.push(e.to_string());
                    continue;
                }
            };
            for window_id in expired {
                result.windows_seen += 1;
                match self.bidding.resolve_bid_window(window_id, org_id, &self.broadcaster, now).await {
                    Ok(store::ResolveOutcome::Resolved { .. }) => result.resolved += 1,
                    Ok(store::ResolveOutcome::AllConflicted) | Ok(store::ResolveOutcome::NotOpen) => {
                        result.closed_without_winner += 1;
                    }
                    Err(e) => {
                        warn!(%window_id, %org_id, error = %e, "bid window resolution failed");
                        result.errors.push(e.to_string());
                    }
                }
            }
        }
        Ok(result)
    }

    /// Sweeps today's confirmed-but-unarrived assignments for no-shows,
    /// across every organization.
    pub async fn detect_no_shows(&self, now: DateTime<Utc>) -> anyhow::Result<NoShowSweepResult> {
        let mut total = NoShowSweepResult::default();
        for org_id in self.store.list_organizations().await? {
            match self.bidding.detect_no_shows(org_id, &self.broadcaster, now).await {
                Ok(r) => {
                    total.detected += r.detected;
                    total.skipped_already_open += r.skipped_already_open;
                    total.errors.extend(r.errors);
                }
                Err(e) => {
                    warn!(%org_id, error = %e, "no-show sweep failed for organization");
                    total.errors.push(e.to_string());
                }
            }
        }
        Ok(total)
    }

    /// Sends a dedupe-keyed reminder for every assignment scheduled today
    /// that hasn't started yet. Safe to call more than once for the same
    /// day: the `(org, recipient, dedupeKey)` unique index on
    /// `notifications` makes a repeat send a no-op.
    pub async fn send_shift_reminders(
        &self,
        today: NaiveDate,
        now: DateTime<Utc>,
    ) -> anyhow::Result<ReminderSweepResult> {
        let mut result = ReminderSweepResult::default();
        for org_id in self.store.list_organizations().await? {
            let assignments = match self.store.list_todays_scheduled_not_started(org_id, today).await {
                Ok(a) => a,
                Err(e) => {
                    result.errors.push(e.to_string());
                    continue;
                }
            };
            for assignment in assignments {
                let Some(user_id) = assignment.user_id else {
                    continue;
                };
                let dedupe_key = format!("shift-reminder:{}:{}", assignment.id, today);
                let sent = self
                    .notifier
                    .send(
                        org_id,
                        user_id,
                        NotificationType::ShiftReminder,
                        "Shift reminder",
                        "You have a shift scheduled today.",
                        serde_json::json!({ "assignmentId": assignment.id.to_string() }),
                        Some(dedupe_key),
                        now,
                    )
                    .await;
                match sent {
                    Ok(()) => result.sent += 1,
                    Err(e) => {
                        warn!(assignment_id = %assignment.id, error = %e, "shift reminder failed");
                        result.errors.push(e.to_string());
                    }
                }
            }
        }
        Ok(result)
    }

    /// Converts every stale unconfirmed assignment to `cancelled/auto_drop`
    /// and opens an emergency replacement bid window for each, across
    /// every organization.
    pub async fn auto_drop_unconfirmed(&self, now: DateTime<Utc>) -> anyhow::Result<AutoDropSweepResult> {
        let mut result = AutoDropSweepResult::default();
        for org_id in self.store.list_organizations().await? {
            let dropped = match self.lifecycle.sweep_auto_drop(org_id, now).await {
                Ok(d) => d,
                Err(e) => {
                    result.errors.push(e.to_string());
                    continue;
                }
            };
            for dropped_assignment in dropped {
                result.dropped += 1;

                let outcome = self
                    .bidding
                    .create_bid_window(
                        dropped_assignment.assignment_id,
                        org_id,
                        CreateBidWindowOptions {
                            requested_mode: None,
                            allow_past_shift: false,
                            trigger: BidWindowTrigger::AutoDrop,
                        },
                        &self.broadcaster,
                        now,
                    )
                    .await;
                match outcome {
                    Ok(CreateOutcome::Created(_)) => result.rebid_windows_opened += 1,
                    Ok(CreateOutcome::AlreadyExists) => {}
                    Err(e) => {
                        warn!(assignment_id = %dropped_assignment.assignment_id, error = %e, "auto-drop rebid window failed");
                        result.errors.push(e.to_string());
                        continue;
                    }
                }

                if let Err(e) = self
                    .notifier
                    .send(
                        org_id,
                        dropped_assignment.user_id,
                        lifecycle::AUTO_DROP_NOTIFICATION,
                        "Shift auto-dropped",
                        "You didn't confirm your shift in time and it has been reassigned.",
                        serde_json::json!({ "assignmentId": dropped_assignment.assignment_id.to_string() }),
                        None,
                        now,
                    )
                    .await
                {
                    result.errors.push(e.to_string());
                }
            }
        }
        Ok(result)
    }

    /// Scores and flags every driver with at least one recorded shift,
    /// across every organization.
    pub async fn run_daily_health_evaluation(
        &self,
        today: NaiveDate,
        now: DateTime<Utc>,
    ) -> anyhow::Result<HealthSweepResult> {
        let mut result = HealthSweepResult::default();
        for org_id in self.store.list_organizations().await? {
            let driver_ids = match self.store.list_driver_ids_with_shifts(org_id).await {
                Ok(ids) => ids,
                Err(e) => {
                    warn!(%org_id, error = %e, "listing drivers for daily health evaluation failed");
                    result.failures += 1;
                    continue;
                }
            };
            result.drivers_evaluated += driver_ids.len() as i64;
            result.failures += self.health.run_daily_batch(org_id, driver_ids.clone(), today, now).await as i64;

            for driver_id in driver_ids {
                if let Err(e) = self.health.apply_flag_decision(org_id, &self.broadcaster, driver_id, now).await {
                    warn!(%driver_id, %org_id, error = %e, "flag decision failed");
                    result.failures += 1;
                }
            }
        }
        Ok(result)
    }

    /// Runs the qualifying-week streak/star evaluation for
    /// `week_start..week_end_exclusive`, across every organization.
    pub async fn run_weekly_health_evaluation(
        &self,
        week_start: NaiveDate,
        week_end_exclusive: NaiveDate,
        now: DateTime<Utc>,
    ) -> anyhow::Result<HealthSweepResult> {
        let mut result = HealthSweepResult::default();
        for org_id in self.store.list_organizations().await? {
            let driver_ids = match self.store.list_driver_ids_with_shifts(org_id).await {
                Ok(ids) => ids,
                Err(e) => {
                    warn!(%org_id, error = %e, "listing drivers for weekly health evaluation failed");
                    result.failures += 1;
                    continue;
                }
            };
            result.drivers_evaluated += driver_ids.len() as i64;
            match self
                .health
                .run_weekly_batch(org_id, driver_ids, week_start, week_end_exclusive, now)
                .await
            {
                Ok(failures) => result.failures += failures as i64,
                Err(e) => {
                    warn!(%org_id, error = %e, "weekly health batch failed for organization");
                    result.failures += 1;
                }
            }
        }
        Ok(result)
    }
}

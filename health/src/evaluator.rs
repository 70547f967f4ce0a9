//! I/O shells around the pure scoring/flagging math: gathers counts from
//! the store, persists the result under a CAS guard, and fires the
//! notifications/broadcasts the evaluation implies. Mirrors the split
//! between this codebase's `scheduler/drr.rs` (pure) and
//! `scheduler/scheduler.rs` (I/O orchestration): the pure module never
//! touches a store or a clock, this one does nothing else.

use std::sync::Arc;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use common::policy::DispatchPolicy;
use domain::assignment::CancelType;
use domain::audit::{actions, ActorType};
use domain::driver::DriverMetrics;
use domain::health::DriverHealthSnapshot;
use domain::ids::{OrgId, UserId};
use domain::notification::NotificationType;
use futures::stream::{FuturesUnordered, StreamExt};
use notifier::Notifier;
use store::Store;
use tracing::{info, warn};

use crate::flagging::{derive_flag_decision, FlagTransition};
use crate::scoring::{
    accumulate_score, apply_hard_stop_cap, classify_week, is_hard_stop, HealthEventCounts,
    WeekOutcome, WeekVerdict,
};

/// CAS retries on `update_health_state_guarded` before giving up and
/// logging; a concurrent write losing every one of these is treated as
/// transient contention, not a bug, and simply skipped until next run.
const MAX_CAS_ATTEMPTS: usize = 3;

pub struct HealthEvaluator {
    store: Arc<dyn Store>,
    notifier: Arc<Notifier>,
    policy: DispatchPolicy,
}

impl HealthEvaluator {
    pub fn new(store: Arc<dyn Store>, notifier: Arc<Notifier>, policy: DispatchPolicy) -> Self {
        Self {
            store,
            notifier,
            policy,
        }
    }

    fn counts_from_metrics(metrics: &DriverMetrics) -> HealthEventCounts {
        HealthEventCounts {
            confirmed_on_time: metrics.confirmed_shifts,
            arrived_on_time: metrics.arrived_on_time_shifts,
            completed: metrics.completed_shifts,
            high_delivery: metrics.high_delivery_shifts,
            bid_pickup: metrics.bid_pickups,
            urgent_pickup: metrics.urgent_pickups,
            auto_drop: metrics.auto_drops,
            late_cancel: metrics.late_cancels,
        }
    }

    /// Daily evaluation for one driver. No-ops for drivers with zero
    /// recorded shifts.
    pub async fn run_daily_for_driver(
        &self,
        org_id: OrgId,
        user_id: UserId,
        today: NaiveDate,
        now: DateTime<Utc>,
    ) -> anyhow::Result<()> {
        let metrics = self.store.get_driver_metrics(user_id).await?;
        if metrics.total_shifts < 1 {
            return Ok(());
        }

        let counts = Self::counts_from_metrics(&metrics);
        let hard_stop = is_hard_stop(
            metrics.no_shows,
            metrics.late_cancels,
            self.policy.health_late_cancel_threshold,
        );
        let score = apply_hard_stop_cap(
            accumulate_score(&counts, &self.policy.health_points),
            hard_stop,
        );

        let reasons = if hard_stop {
            vec!["hard_stop_triggered".to_string()]
        } else {
            Vec::new()
        };
        let snapshot = DriverHealthSnapshot {
            user_id,
            evaluated_at: today,
            score,
            hard_stop_triggered: hard_stop,
            reasons,
            contributions: serde_json::to_value(&counts)
                .unwrap_or(serde_json::Value::Null),
        };
        self.store.upsert_health_snapshot(snapshot).await?;

        for attempt in 0..MAX_CAS_ATTEMPTS {
            let current = self.store.get_health_state(user_id).await?;
            let already_hard_stopped =
                !current.assignment_pool_eligible || current.requires_manager_intervention;

            let mut next = current.clone();
            next.current_score = score;

            if hard_stop && !already_hard_stopped {
                next.assignment_pool_eligible = false;
                next.requires_manager_intervention = true;
                next.stars = 0;
                next.streak_weeks = 0;
                next.next_milestone_stars = 1;
                next.last_score_reset_at = Some(now);
            }

            if metrics.completion_rate < self.policy.health_corrective_completion_threshold {
                let deduped = next
                    .last_corrective_warning_at
                    .map(|last| {
                        now - last < Duration::days(self.policy.health_corrective_recovery_days)
                    })
                    .unwrap_or(false);
                if !deduped {
                    next.last_corrective_warning_at = Some(now);
                    self.notifier
                        .send(
                            org_id,
                            user_id,
                            NotificationType::CorrectiveWarning,
                            "Completion rate below target",
                            "Your recent completion rate has dropped below the required threshold.",
                            serde_json::json!({ "completionRate": metrics.completion_rate }),
                            None,
                            now,
                        )
                        .await?;
                }
            }

            let updated = self
                .store
                .update_health_state_guarded(user_id, current.last_score_reset_at, next.clone())
                .await?;

            if updated {
                if hard_stop && !already_hard_stopped {
                    self.notifier
                        .send(
                            org_id,
                            user_id,
                            NotificationType::StreakReset,
                            "Your streak has been reset",
                            "A recent no-show or repeated late cancellations paused your assignment eligibility.",
                            serde_json::json!({}),
                            None,
                            now,
                        )
                        .await?;
                }
                self.store
                    .record_audit(
                        "driver_health_state",
                        user_id.to_string(),
                        actions::WEEK_EVALUATED,
                        ActorType::System,
                        None,
                        serde_json::json!({ "score": score, "hardStop": hard_stop }),
                        now,
                    )
                    .await?;
                return Ok(());
            }

            warn!(%user_id, attempt, "health state CAS write lost the race, retrying");
        }

        warn!(%user_id, "health state daily evaluation abandoned after exhausting CAS retries");
        Ok(())
    }

    /// Weekly evaluation for one driver over `week_start..week_end_exclusive`.
    pub async fn run_weekly_for_driver(
        &self,
        org_id: OrgId,
        user_id: UserId,
        week_start: NaiveDate,
        outcome: WeekOutcome,
        now: DateTime<Utc>,
    ) -> anyhow::Result<()> {
        let verdict = classify_week(&outcome);
        if verdict == WeekVerdict::Neutral {
            return Ok(());
        }

        for attempt in 0..MAX_CAS_ATTEMPTS {
            let current = self.store.get_health_state(user_id).await?;
            let mut next = current.clone();

            let hard_stop = outcome.no_shows > 0
                || outcome.late_cancels >= self.policy.health_late_cancel_threshold;

            if hard_stop {
                next.streak_weeks = 0;
                next.stars = 0;
            } else if verdict == WeekVerdict::Qualifying {
                let was_at_max = current.stars >= self.policy.health_max_stars;
                next.stars = crate::scoring::advance_stars(current.stars, self.policy.health_max_stars);
                next.streak_weeks = current.streak_weeks.saturating_add(1);
                next.last_qualified_week_start = Some(week_start);

                let updated = self
                    .store
                    .update_health_state_guarded(user_id, current.last_score_reset_at, next.clone())
                    .await?;
                if !updated {
                    warn!(%user_id, attempt, "weekly health CAS write lost the race, retrying");
                    continue;
                }

                self.notifier
                    .send(
                        org_id,
                        user_id,
                        NotificationType::StreakAdvanced,
                        "Streak advanced",
                        "Another qualifying week in the books.",
                        serde_json::json!({ "streakWeeks": next.streak_weeks }),
                        None,
                        now,
                    )
                    .await?;
                if !was_at_max && next.stars >= self.policy.health_max_stars {
                    self.notifier
                        .send(
                            org_id,
                            user_id,
                            NotificationType::BonusEligible,
                            "Bonus eligible",
                            "You've reached the maximum star tier and are now bonus-eligible.",
                            serde_json::json!({}),
                            None,
                            now,
                        )
                        .await?;
                }
                return Ok(());
            } else {
                return Ok(());
            }

            let updated = self
                .store
                .update_health_state_guarded(user_id, current.last_score_reset_at, next.clone())
                .await?;
            if !updated {
                warn!(%user_id, attempt, "weekly health CAS write lost the race, retrying");
                continue;
            }
            if hard_stop {
                self.notifier
                    .send(
                        org_id,
                        user_id,
                        NotificationType::StreakReset,
                        "Streak reset",
                        "A no-show or late cancellation this week reset your streak.",
                        serde_json::json!({}),
                        None,
                        now,
                    )
                    .await?;
            }
            return Ok(());
        }

        warn!(%user_id, "weekly health evaluation abandoned after exhausting CAS retries");
        Ok(())
    }

    /// Applies the derived flag transition for one driver: persists the
    /// flag/cap fields, broadcasts and audits only on the entry
    /// transition, always audits the before/after diff.
    pub async fn apply_flag_decision(
        &self,
        org_id: OrgId,
        broadcaster: &broadcaster::Broadcaster,
        driver_id: UserId,
        now: DateTime<Utc>,
    ) -> anyhow::Result<()> {
        let Some(driver) = self.store.get_driver(driver_id, org_id).await? else {
            return Ok(());
        };
        let metrics = self.store.get_driver_metrics(driver_id).await?;
        let decision = derive_flag_decision(&driver, &metrics, &self.policy, now);

        self.store
            .set_driver_flag(
                driver_id,
                decision.is_flagged,
                decision.flag_warning_date,
                decision.weekly_cap,
            )
            .await?;

        self.store
            .record_audit(
                "driver",
                driver_id.to_string(),
                actions::FLAG,
                ActorType::System,
                None,
                serde_json::json!({
                    "before": { "isFlagged": driver.is_flagged, "weeklyCap": driver.weekly_cap },
                    "after": { "isFlagged": decision.is_flagged, "weeklyCap": decision.weekly_cap },
                }),
                now,
            )
            .await?;

        if decision.transition == FlagTransition::EnteredFlagged {
            broadcaster
                .publish(
                    org_id,
                    broadcaster::Event::DriverFlagged {
                        user_id: driver_id.to_string(),
                        is_flagged: true,
                    },
                )
                .await;
            self.notifier
                .send(
                    org_id,
                    driver_id,
                    NotificationType::Warning,
                    "Attendance warning",
                    "Your attendance rate has fallen below the required threshold.",
                    serde_json::json!({}),
                    None,
                    now,
                )
                .await?;
            info!(%driver_id, "driver entered flagged state");
        }

        Ok(())
    }

    /// Runs the daily evaluation over every id in `driver_ids`, bounded to
    /// `policy.jobs_performance_check_batch_size` in flight at a time, the
    /// same sliding-window shape as the notifier's bulk fan-out.
    pub async fn run_daily_batch(
        &self,
        org_id: OrgId,
        driver_ids: Vec<UserId>,
        today: NaiveDate,
        now: DateTime<Utc>,
    ) -> usize {
        let batch_size = self.policy.jobs_performance_check_batch_size.max(1);
        let mut in_flight = FuturesUnordered::new();
        let mut queue = driver_ids.into_iter();
        let mut errors = 0usize;

        for driver_id in queue.by_ref().take(batch_size) {
            in_flight.push(self.run_daily_for_driver(org_id, driver_id, today, now));
        }

        while let Some(result) = in_flight.next().await {
            if let Err(e) = result {
                warn!(error = %e, "daily health evaluation failed for driver");
                errors += 1;
            }
            if let Some(driver_id) = queue.next() {
                in_flight.push(self.run_daily_for_driver(org_id, driver_id, today, now));
            }
        }
        errors
    }

    /// Builds a `WeekOutcome` for one driver from the org's raw week
    /// assignments plus a `get_shift` lookup per assignment. No-shows
    /// aren't attributable here: `coerce_unfilled` clears `user_id` the
    /// moment the emergency window opens, so by the time a weekly batch
    /// runs there's no row left pointing back at the driver who missed
    /// it. That path already has its own immediate consequence
    /// (`reset_health_on_no_show` at detection time, plus `no_shows` in
    /// the all-time metrics feeding the daily hard-stop check); the
    /// weekly outcome's `no_shows` field is always 0 by construction.
    async fn build_week_outcome(
        &self,
        user_id: UserId,
        assignments: &[domain::assignment::Assignment],
    ) -> anyhow::Result<WeekOutcome> {
        let mine: Vec<_> = assignments.iter().filter(|a| a.user_id == Some(user_id)).collect();
        let assignment_count = mine.len() as i64;
        if assignment_count == 0 {
            return Ok(WeekOutcome {
                assignment_count: 0,
                attendance_rate: 0.0,
                adjusted_completion_rate: 0.0,
                no_shows: 0,
                late_cancels: 0,
            });
        }

        let mut arrived = 0i64;
        let mut delivery_rates = Vec::new();
        let mut late_cancels = 0i64;
        for a in &mine {
            if a.cancel_type == Some(CancelType::Late) {
                late_cancels += 1;
            }
            if let Some(shift) = self.store.get_shift(a.id).await? {
                if shift.arrived_at.is_some() {
                    arrived += 1;
                }
                if let Some(rate) = shift.delivery_rate() {
                    delivery_rates.push(rate);
                }
            }
        }

        let attendance_rate = arrived as f64 / assignment_count as f64;
        let adjusted_completion_rate = if delivery_rates.is_empty() {
            1.0
        } else {
            delivery_rates.iter().sum::<f64>() / delivery_rates.len() as f64
        };

        Ok(WeekOutcome {
            assignment_count,
            attendance_rate,
            adjusted_completion_rate,
            no_shows: 0,
            late_cancels,
        })
    }

    /// Runs the weekly evaluation over every id in `driver_ids` against a
    /// single shared fetch of the org's `week_start..week_end_exclusive`
    /// assignments, the same bounded-concurrency shape as
    /// [`Self::run_daily_batch`].
    pub async fn run_weekly_batch(
        &self,
        org_id: OrgId,
        driver_ids: Vec<UserId>,
        week_start: NaiveDate,
        week_end_exclusive: NaiveDate,
        now: DateTime<Utc>,
    ) -> anyhow::Result<usize> {
        let assignments = self
            .store
            .list_week_assignments(org_id, week_start, week_end_exclusive)
            .await?;

        let batch_size = self.policy.jobs_performance_check_batch_size.max(1);
        let mut in_flight = FuturesUnordered::new();
        let mut queue = driver_ids.into_iter();
        let mut errors = 0usize;

        async fn run_one(
            this: &HealthEvaluator,
            org_id: OrgId,
            driver_id: UserId,
            week_start: NaiveDate,
            assignments: &[domain::assignment::Assignment],
            now: DateTime<Utc>,
        ) -> anyhow::Result<()> {
            let outcome = this.build_week_outcome(driver_id, assignments).await?;
            this.run_weekly_for_driver(org_id, driver_id, week_start, outcome, now).await
        }

        for driver_id in queue.by_ref().take(batch_size) {
            in_flight.push(run_one(self, org_id, driver_id, week_start, &assignments, now));
        }
        while let Some(result) = in_flight.next().await {
            if let Err(e) = result {
                warn!(error = %e, "weekly health evaluation failed for driver");
                errors += 1;
            }
            if let Some(driver_id) = queue.next() {
                in_flight.push(run_one(self, org_id, driver_id, week_start, &assignments, now));
            }
        }
        Ok(errors)
    }

    /// Clears a manager-intervention hold. Pool re-enablement is never
    /// automatic: only this explicit, manager-attributed call may flip
    /// `requires_manager_intervention` back off and stamp `reinstated_at`.
    /// Returns `Ok(false)` without writing anything if the driver wasn't
    /// actually held, so callers can distinguish a no-op from a real change.
    pub async fn reinstate_driver(
        &self,
        org_id: OrgId,
        broadcaster: &broadcaster::Broadcaster,
        driver_id: UserId,
        manager_id: UserId,
        now: DateTime<Utc>,
    ) -> anyhow::Result<bool> {
        for attempt in 0..MAX_CAS_ATTEMPTS {
            let current = self.store.get_health_state(driver_id).await?;
            if current.assignment_pool_eligible && !current.requires_manager_intervention {
                return Ok(false);
            }

            let mut next = current.clone();
            next.assignment_pool_eligible = true;
            next.requires_manager_intervention = false;
            next.reinstated_at = Some(now);

            let updated = self
                .store
                .update_health_state_guarded(driver_id, current.last_score_reset_at, next)
                .await?;
            if !updated {
                warn!(%driver_id, attempt, "reinstatement CAS write lost the race, retrying");
                continue;
            }

            self.store
                .record_audit(
                    "driver_health_state",
                    driver_id.to_string(),
                    actions::REINSTATE,
                    ActorType::User,
                    Some(manager_id),
                    serde_json::json!({
                        "before": {
                            "assignmentPoolEligible": current.assignment_pool_eligible,
                            "requiresManagerIntervention": current.requires_manager_intervention,
                        },
                        "after": { "assignmentPoolEligible": true, "requiresManagerIntervention": false },
                    }),
                    now,
                )
                .await?;

            broadcaster
                .publish(
                    org_id,
                    broadcaster::Event::DriverFlagged {
                        user_id: driver_id.to_string(),
                        is_flagged: false,
                    },
                )
                .await;
            info!(%driver_id, %manager_id, "driver reinstated to assignment pool");
            return Ok(true);
        }

        warn!(%driver_id, "reinstatement abandoned after exhausting CAS retries");
        Ok(false)
    }
}

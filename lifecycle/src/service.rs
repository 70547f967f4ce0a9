//! I/O shell around the pure gate in `gate.rs`: guarded single-row
//! transitions plus the counters/audit/broadcast side effects each one
//! implies. Mirrors the split in this codebase's health evaluator
//! (`health/src/evaluator.rs`) between a pure decision module and a shell
//! that does nothing but gather state, persist, and notify.

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use common::policy::DispatchPolicy;
use common::{Clock, TenantClock};
use domain::assignment::{derive_shift_progress, AssignmentStatus, CancelType};
use domain::audit::ActorType;
use domain::driver::DriverMetrics;
use domain::ids::{AssignmentId, OrgId, RouteId, UserId};
use domain::notification::NotificationType;
use store::Store;
use tracing::warn;

use crate::gate::{allowed_actions, compute_window, LifecycleAction, LifecycleWindow};

/// `0.95`, the same delivery-rate bar `Shift::is_high_delivery` and the
/// health scorer's contribution count both use.
const HIGH_DELIVERY_THRESHOLD: f64 = 0.95;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleError {
    NotFound,
    StateChanged,
}

impl std::fmt::Display for LifecycleError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LifecycleError::NotFound => write!(f, "assignment not found"),
            LifecycleError::StateChanged => write!(f, "state_changed"),
        }
    }
}

impl std::error::Error for LifecycleError {}

/// An assignment dropped by the auto-drop sweep, handed to whoever opens
/// the follow-up bid window (this crate never does that itself — see
/// module docs on the dependency direction with bid window creation).
#[derive(Debug, Clone, Copy)]
pub struct AutoDroppedAssignment {
    pub assignment_id: AssignmentId,
    pub route_id: RouteId,
    pub date: NaiveDate,
    pub user_id: UserId,
}

pub struct LifecycleService<C: Clock> {
    store: Arc<dyn Store>,
    tenant: TenantClock<C>,
    policy: DispatchPolicy,
}

impl<C: Clock> LifecycleService<C> {
    pub fn new(store: Arc<dyn Store>, tenant: TenantClock<C>, policy: DispatchPolicy) -> Self {
        Self {
            store,
            tenant,
            policy,
        }
    }

    async fn window_for(&self, date: NaiveDate, route_id: RouteId, org_id: OrgId) -> anyhow::Result<LifecycleWindow> {
        let route = self
            .store
            .get_route(route_id, org_id)
            .await?
            .ok_or_else(|| anyhow::anyhow!(LifecycleError::NotFound))?;
        let window = compute_window(
            &self.tenant,
            self.policy.confirmation_window_days_before_shift,
            self.policy.confirmation_deadline_hours_before_shift,
            self.policy.shifts_start_hour_local,
            date,
            route.start_time_parts(),
        )?;
        Ok(window)
    }

    async fn bump_metrics(
        &self,
        user_id: UserId,
        f: impl FnOnce(&mut DriverMetrics),
    ) -> anyhow::Result<()> {
        let mut metrics = self.store.get_driver_metrics(user_id).await?;
        f(&mut metrics);
        self.store.update_driver_metrics(user_id, metrics).await
    }

    /// Re-reads the assignment+shift pair and broadcasts the freshly
    /// derived display label, the same pure function a read projection
    /// would use, so a subscriber's view can never disagree with a query.
    async fn broadcast_progress(
        &self,
        broadcaster: &broadcaster::Broadcaster,
        org_id: OrgId,
        assignment_id: AssignmentId,
    ) {
        let Ok(Some(assignment)) = self.store.get_assignment(assignment_id, Some(org_id)).await else {
            return;
        };
        let shift = self.store.get_shift(assignment_id).await.ok().flatten();
        let shift_progress = derive_shift_progress(&assignment, shift.as_ref());
        let shift_progress = serde_json::to_value(shift_progress)
            .ok()
            .and_then(|v| v.as_str().map(str::to_string))
            .unwrap_or_else(|| "unconfirmed".to_string());
        broadcaster
            .publish(
                org_id,
                broadcaster::Event::AssignmentUpdated {
                    assignment_id: assignment_id.to_string(),
                    shift_progress,
                },
            )
            .await;
    }

    /// Guarded `confirmedAt=now WHERE confirmedAt IS NULL AND status='scheduled'`,
    /// refused outside `[opensAt, deadline]`.
    pub async fn confirm_shift(
        &self,
        assignment_id: AssignmentId,
        org_id: OrgId,
        broadcaster: &broadcaster::Broadcaster,
        now: DateTime<Utc>,
    ) -> anyhow::Result<()> {
        let assignment = self
            .store
            .get_assignment(assignment_id, Some(org_id))
            .await?
            .ok_or_else(|| anyhow::anyhow!(LifecycleError::NotFound))?;
        let window = self.window_for(assignment.date, assignment.route_id, org_id).await?;
        let actions = allowed_actions(&assignment, None, self.tenant.today_in_zone(), window, now);
        if !actions.contains(&LifecycleAction::Confirm) {
            anyhow::bail!(LifecycleError::StateChanged);
        }

        if !self.store.confirm_assignment(assignment_id, now).await? {
            anyhow::bail!(LifecycleError::StateChanged);
        }

        let Some(user_id) = assignment.user_id else {
            anyhow::bail!(LifecycleError::NotFound);
        };
        self.bump_metrics(user_id, |m| m.confirmed_shifts += 1).await?;

        self.store
            .record_audit(
                "assignment",
                assignment_id.to_string(),
                "confirm",
                ActorType::User,
                Some(user_id),
                serde_json::json!({}),
                now,
            )
            .await?;
        self.broadcast_progress(broadcaster, org_id, assignment_id).await;
        Ok(())
    }

    /// Cancels, deriving early/late from the confirmation deadline.
    /// Late cancels count against the driver's rolling health window.
    pub async fn cancel_assignment(
        &self,
        assignment_id: AssignmentId,
        org_id: OrgId,
        broadcaster: &broadcaster::Broadcaster,
        now: DateTime<Utc>,
    ) -> anyhow::Result<CancelType> {
        let assignment = self
            .store
            .get_assignment(assignment_id, Some(org_id))
            .await?
            .ok_or_else(|| anyhow::anyhow!(LifecycleError::NotFound))?;
        let window = self.window_for(assignment.date, assignment.route_id, org_id).await?;
        let today = self.tenant.today_in_zone();
        let actions = allowed_actions(&assignment, None, today, window, now);

        let cancel_type = if actions.contains(&LifecycleAction::CancelEarly) {
            CancelType::Early
        } else if actions.contains(&LifecycleAction::CancelLate) {
            CancelType::Late
        } else {
            anyhow::bail!(LifecycleError::StateChanged);
        };

        if !self
            .store
            .cancel_assignment(assignment_id, now, cancel_type)
            .await?
        {
            anyhow::bail!(LifecycleError::StateChanged);
        }

        if let Some(user_id) = assignment.user_id {
            if cancel_type == CancelType::Late {
                self.bump_metrics(user_id, |m| {
                    m.total_shifts += 1;
                    m.late_cancels += 1;
                    m.attendance_rate = m.arrived_on_time_shifts as f64 / m.total_shifts as f64;
                })
                .await?;
            }
        }

        self.store
            .record_audit(
                "assignment",
                assignment_id.to_string(),
                "cancel",
                ActorType::User,
                assignment.user_id,
                serde_json::json!({ "cancelType": cancel_type }),
                now,
            )
            .await?;
        self.broadcast_progress(broadcaster, org_id, assignment_id).await;
        Ok(cancel_type)
    }

    /// Guarded arrival mark; only reachable before `arrivalDeadline`, so
    /// every recorded arrival counts as on-time by construction.
    pub async fn record_arrival(
        &self,
        assignment_id: AssignmentId,
        org_id: OrgId,
        broadcaster: &broadcaster::Broadcaster,
        now: DateTime<Utc>,
    ) -> anyhow::Result<()> {
        let assignment = self
            .store
            .get_assignment(assignment_id, Some(org_id))
            .await?
            .ok_or_else(|| anyhow::anyhow!(LifecycleError::NotFound))?;
        let window = self.window_for(assignment.date, assignment.route_id, org_id).await?;
        let today = self.tenant.today_in_zone();
        let actions = allowed_actions(&assignment, None, today, window, now);
        if !actions.contains(&LifecycleAction::Arrive) {
            anyhow::bail!(LifecycleError::StateChanged);
        }

        if !self.store.record_arrival(assignment_id, now).await? {
            anyhow::bail!(LifecycleError::StateChanged);
        }

        if let Some(user_id) = assignment.user_id {
            self.bump_metrics(user_id, |m| m.arrived_on_time_shifts += 1).await?;
        }

        self.store
            .record_audit(
                "assignment",
                assignment_id.to_string(),
                "arrive",
                ActorType::User,
                assignment.user_id,
                serde_json::json!({}),
                now,
            )
            .await?;
        self.broadcast_progress(broadcaster, org_id, assignment_id).await;
        Ok(())
    }

    pub async fn start_shift(
        &self,
        assignment_id: AssignmentId,
        org_id: OrgId,
        broadcaster: &broadcaster::Broadcaster,
        now: DateTime<Utc>,
    ) -> anyhow::Result<()> {
        if !self.store.start_shift(assignment_id, now).await? {
            anyhow::bail!(LifecycleError::StateChanged);
        }
        self.store
            .record_audit(
                "assignment",
                assignment_id.to_string(),
                "start",
                ActorType::User,
                None,
                serde_json::json!({}),
                now,
            )
            .await?;
        self.broadcast_progress(broadcaster, org_id, assignment_id).await;
        Ok(())
    }

    /// Completes the shift and folds the final tallies into
    /// `DriverMetrics`: `totalShifts`/`completedShifts` both advance, and
    /// the two rate fields are recomputed against the new total.
    pub async fn complete_shift(
        &self,
        assignment_id: AssignmentId,
        org_id: OrgId,
        broadcaster: &broadcaster::Broadcaster,
        parcels_delivered: i64,
        parcels_returned: i64,
        excepted_returns: i64,
        now: DateTime<Utc>,
    ) -> anyhow::Result<()> {
        let assignment = self
            .store
            .get_assignment(assignment_id, Some(org_id))
            .await?
            .ok_or_else(|| anyhow::anyhow!(LifecycleError::NotFound))?;

        if !self
            .store
            .complete_shift(assignment_id, now, parcels_delivered, parcels_returned, excepted_returns)
            .await?
        {
            anyhow::bail!(LifecycleError::StateChanged);
        }

        let shift = self.store.get_shift(assignment_id).await?;
        let is_high_delivery = shift
            .map(|s| s.is_high_delivery(HIGH_DELIVERY_THRESHOLD))
            .unwrap_or(false);

        if let Some(user_id) = assignment.user_id {
            self.bump_metrics(user_id, |m| {
                m.total_shifts += 1;
                m.completed_shifts += 1;
                if is_high_delivery {
                    m.high_delivery_shifts += 1;
                }
                m.avg_parcels_delivered = ((m.avg_parcels_delivered * (m.completed_shifts - 1) as f64)
                    + parcels_delivered as f64)
                    / m.completed_shifts as f64;
                m.completion_rate = m.completed_shifts as f64 / m.total_shifts as f64;
                m.attendance_rate = m.arrived_on_time_shifts as f64 / m.total_shifts as f64;
            })
            .await?;
            self.store
                .increment_route_completion(user_id, assignment.route_id, now)
                .await?;
        }

        self.store
            .record_audit(
                "assignment",
                assignment_id.to_string(),
                "complete",
                ActorType::User,
                assignment.user_id,
                serde_json::json!({
                    "parcelsDelivered": parcels_delivered,
                    "parcelsReturned": parcels_returned,
                    "exceptedReturns": excepted_returns,
                }),
                now,
            )
            .await?;
        self.broadcast_progress(broadcaster, org_id, assignment_id).await;
        Ok(())
    }

    /// Computes the display label for an assignment+shift pair the same
    /// way every other caller does, so a broadcast payload and a read
    /// response can never disagree.
    pub async fn shift_progress(&self, assignment_id: AssignmentId) -> anyhow::Result<String> {
        let assignment = self
            .store
            .get_assignment(assignment_id, None)
            .await?
            .ok_or_else(|| anyhow::anyhow!(LifecycleError::NotFound))?;
        let shift = self.store.get_shift(assignment_id).await?;
        Ok(serde_json::to_value(derive_shift_progress(&assignment, shift.as_ref()))
            .ok()
            .and_then(|v| v.as_str().map(str::to_string))
            .unwrap_or_else(|| "unconfirmed".to_string()))
    }

    /// Finds every `status=scheduled, confirmedAt=null` assignment whose
    /// confirmation deadline has passed and converts it to
    /// `cancelled/auto_drop`. Does not open a replacement bid window or
    /// notify — that belongs to whoever wires this sweep together with
    /// bid-window creation.
    pub async fn sweep_auto_drop(
        &self,
        org_id: OrgId,
        now: DateTime<Utc>,
    ) -> anyhow::Result<Vec<AutoDroppedAssignment>> {
        let stale = self.store.list_stale_unconfirmed(org_id, now).await?;
        let mut dropped = Vec::new();

        for assignment in stale {
            let window = match self.window_for(assignment.date, assignment.route_id, org_id).await {
                Ok(w) => w,
                Err(e) => {
                    warn!(assignment_id = %assignment.id, error = %e, "skipping auto-drop sweep for assignment; window computation failed");
                    continue;
                }
            };
            if now <= window.deadline {
                continue;
            }
            if assignment.status != AssignmentStatus::Scheduled || assignment.confirmed_at.is_some() {
                continue;
            }
            let Some(user_id) = assignment.user_id else {
                continue;
            };

            if !self
                .store
                .cancel_assignment(assignment.id, now, CancelType::AutoDrop)
                .await?
            {
                continue;
            }

            self.bump_metrics(user_id, |m| m.auto_drops += 1).await?;

            self.store
                .record_audit(
                    "assignment",
                    assignment.id.to_string(),
                    "auto_drop",
                    ActorType::System,
                    None,
                    serde_json::json!({ "userId": user_id.to_string() }),
                    now,
                )
                .await?;

            dropped.push(AutoDroppedAssignment {
                assignment_id: assignment.id,
                route_id: assignment.route_id,
                date: assignment.date,
                user_id,
            });
        }

        Ok(dropped)
    }
}

/// Shared notification kind for an auto-dropped driver, exposed so
/// callers gluing the sweep to bid-window creation don't need to
/// duplicate the tag.
pub const AUTO_DROP_NOTIFICATION: NotificationType = NotificationType::ShiftAutoDropped;

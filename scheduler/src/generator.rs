//! I/O shell: loads a week's reference data once, then runs the pure
//! candidate filter/sort per `(route, date)` pair and persists the winner
//! or an unfilled placeholder. Mirrors the split between this codebase's
//! `scheduler/engine.rs` (tick orchestration) and `scheduler/eligibility.rs`
//! (pure gate) — `candidate.rs` here is the pure half, this module the I/O
//! half, structurally the same `on_tick -> pick_intents -> reserve` pipeline
//! generalized to a per-route-per-day candidate instead of a per-session
//! execution chunk.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use common::{SystemClock, TenantClock};
use domain::assignment::{AssignedBy, AssignmentStatus};
use domain::audit::{actions, ActorType};
use domain::driver::{DriverMetrics, DriverPreferences};
use domain::ids::{OrgId, RouteId, UserId, WarehouseId};
use serde::Serialize;
use store::{NewAssignment, Store};
use tracing::warn;

use crate::candidate::{is_eligible_candidate, rank_candidates, CandidateDriver};

#[derive(Debug, Clone, Default, Serialize)]
pub struct GenerationResult {
    pub created: i64,
    pub skipped: i64,
    pub unfilled: i64,
    pub errors: Vec<String>,
}

pub struct ScheduleGenerator {
    store: Arc<dyn Store>,
}

impl ScheduleGenerator {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Generates (or re-confirms) the Monday-anchored week containing
    /// `week_reference_date`. Re-runnable without duplicating assignments:
    /// existing non-cancelled assignments in the week are treated as
    /// already covered, so a second call's `created` is 0 and `skipped`
    /// equals the first call's `created + unfilled`.
    pub async fn generate_week(
        &self,
        org_id: OrgId,
        week_reference_date: NaiveDate,
        now: DateTime<Utc>,
    ) -> anyhow::Result<GenerationResult> {
        let monday = TenantClock::<SystemClock>::week_start(week_reference_date);
        let week_end_exclusive = TenantClock::<SystemClock>::add_days(monday, 7);

        let routes = self.store.list_routes(org_id).await?;
        let drivers = self.store.list_non_flagged_drivers(org_id).await?;

        let mut preferences: HashMap<UserId, DriverPreferences> = HashMap::new();
        let mut metrics: HashMap<UserId, DriverMetrics> = HashMap::new();
        let mut familiarity: HashMap<(UserId, RouteId), i64> = HashMap::new();
        for driver in &drivers {
            if let Some(prefs) = self.store.get_driver_preferences(driver.id).await? {
                preferences.insert(driver.id, prefs);
            }
            metrics.insert(driver.id, self.store.get_driver_metrics(driver.id).await?);
            for route in &routes {
                let completion = self.store.get_route_completion(driver.id, route.id).await?;
                familiarity.insert((driver.id, route.id), completion.completion_count);
            }
        }

        let existing = self
            .store
            .list_week_assignments(org_id, monday, week_end_exclusive)
            .await?;
        let mut covered: HashSet<(RouteId, NaiveDate)> = HashSet::new();
        let mut weekly_tally: HashMap<UserId, i64> = HashMap::new();
        for assignment in &existing {
            covered.insert((assignment.route_id, assignment.date));
            if let Some(user_id) = assignment.user_id {
                *weekly_tally.entry(user_id).or_insert(0) += 1;
            }
        }

        let mut result = GenerationResult::default();

        for day_offset in 0..7i64 {
            let date = TenantClock::<SystemClock>::add_days(monday, day_offset);
            let day_of_week = TenantClock::<SystemClock>::day_of_week(date);

            for route in &routes {
                if covered.contains(&(route.id, date)) {
                    result.skipped += 1;
                    continue;
                }

                let mut candidates = Vec::new();
                for driver in &drivers {
                    let tally = *weekly_tally.get(&driver.id).unwrap_or(&0);
                    if !is_eligible_candidate(
                        driver,
                        preferences.get(&driver.id),
                        route.id,
                        day_of_week,
                        tally,
                    ) {
                        continue;
                    }
                    let m = metrics.get(&driver.id).copied().unwrap_or_default();
                    candidates.push(CandidateDriver {
                        user_id: driver.id,
                        familiarity_count: *familiarity.get(&(driver.id, route.id)).unwrap_or(&0),
                        completion_rate: m.completion_rate,
                        attendance_rate: m.attendance_rate,
                    });
                }
                rank_candidates(&mut candidates);
                let winner = candidates.first().map(|c| c.user_id);

                match self.place(route.id, route.warehouse_id, date, winner, now).await {
                    Ok(()) => {
                        if let Some(user_id) = winner {
                            *weekly_tally.entry(user_id).or_insert(0) += 1;
                            result.created += 1;
                        } else {
                            result.unfilled += 1;
                        }
                    }
                    Err(e) => {
                        warn!(route_id = %route.id, %date, error = %e, "schedule generation failed for route/date pair");
                        result.errors.push(format!("{}/{date}: {e}", route.id));
                    }
                }
            }
        }

        Ok(result)
    }

    async fn place(
        &self,
        route_id: RouteId,
        warehouse_id: WarehouseId,
        date: NaiveDate,
        winner: Option<UserId>,
        now: DateTime<Utc>,
    ) -> anyhow::Result<()> {
        let status = if winner.is_some() {
            AssignmentStatus::Scheduled
        } else {
            AssignmentStatus::Unfilled
        };
        let id = self
            .store
            .insert_assignment(NewAssignment {
                warehouse_id,
                route_id,
                date,
                user_id: winner,
                status,
                assigned_by: Some(AssignedBy::Algorithm),
                assigned_at: Some(now),
            })
            .await?;

        let action = if winner.is_some() {
            actions::ASSIGN
        } else {
            actions::UNFILLED
        };
        self.store
            .record_audit(
                "assignment",
                id.to_string(),
                action,
                ActorType::System,
                None,
                serde_json::json!({
                    "routeId": route_id.to_string(),
                    "date": date.to_string(),
                    "userId": winner.map(|u| u.to_string()),
                }),
                now,
            )
            .await?;
        Ok(())
    }
}

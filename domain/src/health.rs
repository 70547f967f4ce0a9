use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ids::UserId;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriverHealthState {
    pub user_id: UserId,
    pub current_score: i64,
    pub stars: i32,
    pub streak_weeks: i32,
    pub last_qualified_week_start: Option<NaiveDate>,
    pub next_milestone_stars: i32,
    pub assignment_pool_eligible: bool,
    pub requires_manager_intervention: bool,
    pub last_score_reset_at: Option<DateTime<Utc>>,
    pub reinstated_at: Option<DateTime<Utc>>,
    pub last_corrective_warning_at: Option<DateTime<Utc>>,
}

impl DriverHealthState {
    pub fn new(user_id: UserId) -> Self {
        Self {
            user_id,
            current_score: 0,
            stars: 0,
            streak_weeks: 0,
            last_qualified_week_start: None,
            next_milestone_stars: 1,
            assignment_pool_eligible: true,
            requires_manager_intervention: false,
            last_score_reset_at: None,
            reinstated_at: None,
            last_corrective_warning_at: None,
        }
    }

    /// "If a driver is currently hard-stopped, `assignmentPoolEligible=false
    /// ∧ requiresManagerIntervention=true ∧ stars=0 ∧ streakWeeks=0`."
    pub fn hard_stopped_invariant_holds(&self) -> bool {
        if !self.assignment_pool_eligible || self.requires_manager_intervention {
            self.assignment_pool_eligible == false
                && self.requires_manager_intervention
                && self.stars == 0
                && self.streak_weeks == 0
        } else {
            true
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriverHealthSnapshot {
    pub user_id: UserId,
    pub evaluated_at: NaiveDate,
    pub score: i64,
    pub hard_stop_triggered: bool,
    pub reasons: Vec<String>,
    pub contributions: Value,
}

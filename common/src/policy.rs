use serde::{Deserialize, Serialize};

/// Per-organization tunables. Every field has a documented default; an
/// `OrganizationDispatchSettings` row overrides any subset. Mirrors the
/// "every field falls back except secrets" discipline this codebase's
/// `AppConfig::from_env()` uses for process-wide config, but scoped per
/// tenant instead of per process.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchPolicy {
    pub shifts_start_hour_local: u32,
    pub shifts_arrival_deadline_hour_local: u32,

    pub confirmation_window_days_before_shift: i64,
    pub confirmation_deadline_hours_before_shift: i64,

    pub bidding_instant_mode_cutoff_hours: i64,
    pub bidding_emergency_bonus_percent: i32,

    pub flagging_grace_period_days: i64,
    pub flagging_weekly_cap_base: i32,
    pub flagging_weekly_cap_reward: i32,
    pub flagging_weekly_cap_min: i32,
    pub flagging_reward_min_attendance_rate: f64,
    pub flagging_reward_min_shifts: i64,
    pub attendance_threshold_low_volume: f64,
    pub attendance_threshold_high_volume: f64,
    pub attendance_high_volume_shift_count: i64,

    pub health_points: HealthPoints,
    pub health_late_cancel_rolling_days: i64,
    pub health_late_cancel_threshold: i64,
    pub health_corrective_completion_threshold: f64,
    pub health_corrective_recovery_days: i64,
    pub health_max_stars: i32,

    pub jobs_performance_check_batch_size: usize,

    pub bid_score: BidScoreWeights,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct HealthPoints {
    pub confirmed_on_time: i64,
    pub arrived_on_time: i64,
    pub completed_shift: i64,
    pub high_delivery: i64,
    pub bid_pickup: i64,
    pub urgent_pickup: i64,
    pub auto_drop: i64,
    pub late_cancel: i64,
}

/// Weights feeding `calculateBidScoreParts`. Familiarity and tenure each
/// saturate at a cap so no single very-senior driver can dominate every
/// resolution by an unbounded margin.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct BidScoreWeights {
    pub health_weight: f64,
    pub familiarity_weight: f64,
    pub familiarity_cap: f64,
    pub tenure_weight: f64,
    pub tenure_cap_months: f64,
    pub preferred_route_bonus: f64,
}

impl Default for DispatchPolicy {
    fn default() -> Self {
        Self {
            shifts_start_hour_local: 7,
            shifts_arrival_deadline_hour_local: 9,

            confirmation_window_days_before_shift: 7,
            confirmation_deadline_hours_before_shift: 48,

            bidding_instant_mode_cutoff_hours: 24,
            bidding_emergency_bonus_percent: 20,

            flagging_grace_period_days: 7,
            flagging_weekly_cap_base: 4,
            flagging_weekly_cap_reward: 6,
            flagging_weekly_cap_min: 1,
            flagging_reward_min_attendance_rate: 0.95,
            flagging_reward_min_shifts: 20,
            attendance_threshold_low_volume: 0.8,
            attendance_threshold_high_volume: 0.7,
            attendance_high_volume_shift_count: 10,

            health_points: HealthPoints {
                confirmed_on_time: 1,
                arrived_on_time: 1,
                completed_shift: 3,
                high_delivery: 1,
                bid_pickup: 2,
                urgent_pickup: 3,
                auto_drop: -10,
                late_cancel: -20,
            },
            health_late_cancel_rolling_days: 30,
            health_late_cancel_threshold: 2,
            health_corrective_completion_threshold: 0.98,
            health_corrective_recovery_days: 7,
            health_max_stars: 4,

            jobs_performance_check_batch_size: 25,

            bid_score: BidScoreWeights {
                health_weight: 1.0,
                familiarity_weight: 2.0,
                familiarity_cap: 20.0,
                tenure_weight: 0.5,
                tenure_cap_months: 36.0,
                preferred_route_bonus: 15.0,
            },
        }
    }
}

impl DispatchPolicy {
    pub fn attendance_threshold(&self, total_shifts: i64) -> f64 {
        if total_shifts < self.attendance_high_volume_shift_count {
            self.attendance_threshold_low_volume
        } else {
            self.attendance_threshold_high_volume
        }
    }

    pub fn flagging_weekly_cap(&self, is_reward_eligible: bool) -> i32 {
        if is_reward_eligible {
            self.flagging_weekly_cap_reward
        } else {
            self.flagging_weekly_cap_base
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attendance_threshold_switches_at_volume_boundary() {
        let p = DispatchPolicy::default();
        assert_eq!(p.attendance_threshold(9), 0.8);
        assert_eq!(p.attendance_threshold(10), 0.7);
    }
}

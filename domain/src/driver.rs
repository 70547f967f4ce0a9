use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{OrgId, RouteId, UserId};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Driver {
    pub id: UserId,
    pub org_id: OrgId,
    pub weekly_cap: i32,
    pub is_flagged: bool,
    pub flag_warning_date: Option<DateTime<Utc>>,
    pub preferred_locale: String,
    pub fcm_token: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Driver {
    pub fn tenure_months(&self, now: DateTime<Utc>) -> f64 {
        let days = (now - self.created_at).num_days().max(0) as f64;
        days / 30.436_875
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriverPreferences {
    pub user_id: UserId,
    /// Subset of 0..=6, 0=Sunday.
    pub preferred_days: Vec<u32>,
    /// Ordered, at most 3 route ids.
    pub preferred_routes: Vec<RouteId>,
}

impl DriverPreferences {
    pub fn prefers_day(&self, day_of_week: u32) -> bool {
        self.preferred_days.contains(&day_of_week)
    }

    pub fn prefers_route(&self, route_id: RouteId) -> bool {
        self.preferred_routes.contains(&route_id)
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct DriverMetrics {
    pub total_shifts: i64,
    pub completed_shifts: i64,
    pub attendance_rate: f64,
    pub completion_rate: f64,
    pub avg_parcels_delivered: f64,
    pub no_shows: i64,
    pub bid_pickups: i64,
    pub urgent_pickups: i64,
    pub confirmed_shifts: i64,
    pub arrived_on_time_shifts: i64,
    pub high_delivery_shifts: i64,
    pub auto_drops: i64,
    pub late_cancels: i64,
}

impl DriverMetrics {
    pub fn should_flag(&self, threshold: f64) -> bool {
        self.total_shifts > 0 && self.attendance_rate < threshold
    }

    pub fn is_reward_eligible(&self, min_shifts: i64, min_attendance_rate: f64) -> bool {
        self.total_shifts >= min_shifts && self.attendance_rate >= min_attendance_rate
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RouteCompletion {
    pub user_id: UserId,
    pub route_id: RouteId,
    pub completion_count: i64,
    pub last_completed_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_flag_requires_at_least_one_shift() {
        let m = DriverMetrics {
            total_shifts: 0,
            attendance_rate: 0.1,
            ..Default::default()
        };
        assert!(!m.should_flag(0.8));
    }

    #[test]
    fn should_flag_compares_against_threshold() {
        let m = DriverMetrics {
            total_shifts: 5,
            attendance_rate: 0.5,
            ..Default::default()
        };
        assert!(m.should_flag(0.8));
        assert!(!m.should_flag(0.4));
    }
}

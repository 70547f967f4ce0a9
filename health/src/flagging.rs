//! Attendance flagging, a track parallel to and independent of health
//! scoring: driven purely by `DriverMetrics`, never by `DriverHealthState`.

use chrono::{DateTime, Duration, Utc};
use common::policy::DispatchPolicy;
use domain::driver::{Driver, DriverMetrics};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlagTransition {
    /// Driver just crossed into flagged: broadcast, warn, audit.
    EnteredFlagged,
    /// Driver was already flagged and remains so (cap may still shrink
    /// once the grace period elapses).
    StillFlagged,
    /// Driver just crossed back to good standing.
    ExitedFlagged,
    /// Driver was already unflagged and remains so.
    StillUnflagged,
}

impl FlagTransition {
    pub fn is_entry(&self) -> bool {
        matches!(self, FlagTransition::EnteredFlagged)
    }
}

pub struct FlagDecision {
    pub transition: FlagTransition,
    pub is_flagged: bool,
    pub flag_warning_date: Option<DateTime<Utc>>,
    pub weekly_cap: i32,
}

/// Derives the next flag state for a driver given their current metrics.
/// Pure: takes the driver's current recorded flag state and `now` rather
/// than reading either from a store.
pub fn derive_flag_decision(
    driver: &Driver,
    metrics: &DriverMetrics,
    policy: &DispatchPolicy,
    now: DateTime<Utc>,
) -> FlagDecision {
    let threshold = policy.attendance_threshold(metrics.total_shifts);
    let should_flag = metrics.should_flag(threshold);
    let reward_eligible = metrics.is_reward_eligible(
        policy.flagging_reward_min_shifts,
        policy.flagging_reward_min_attendance_rate,
    );
    let base_cap = policy.flagging_weekly_cap(reward_eligible);

    if should_flag {
        let transition = if driver.is_flagged {
            FlagTransition::StillFlagged
        } else {
            FlagTransition::EnteredFlagged
        };
        let flag_warning_date = if transition.is_entry() {
            Some(now)
        } else {
            driver.flag_warning_date
        };
        let weekly_cap = match flag_warning_date {
            Some(warned_at)
                if now - warned_at >= Duration::days(policy.flagging_grace_period_days) =>
            {
                (base_cap - 1).max(policy.flagging_weekly_cap_min)
            }
            _ => base_cap,
        };
        FlagDecision {
            transition,
            is_flagged: true,
            flag_warning_date,
            weekly_cap,
        }
    } else {
        let transition = if driver.is_flagged {
            FlagTransition::ExitedFlagged
        } else {
            FlagTransition::StillUnflagged
        };
        FlagDecision {
            transition,
            is_flagged: false,
            flag_warning_date: None,
            weekly_cap: base_cap,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::ids::{OrgId, UserId};

    fn driver(is_flagged: bool, flag_warning_date: Option<DateTime<Utc>>) -> Driver {
        Driver {
            id: UserId::new(),
            org_id: OrgId::new(),
            weekly_cap: 4,
            is_flagged,
            flag_warning_date,
            preferred_locale: "en".to_string(),
            fcm_token: None,
            created_at: Utc::now() - Duration::days(400),
        }
    }

    fn metrics(total_shifts: i64, attendance_rate: f64) -> DriverMetrics {
        DriverMetrics {
            total_shifts,
            attendance_rate,
            ..Default::default()
        }
    }

    #[test]
    fn low_attendance_enters_flagged_with_warning_date() {
        let policy = DispatchPolicy::default();
        let now = Utc::now();
        let d = driver(false, None);
        let decision = derive_flag_decision(&d, &metrics(5, 0.5), &policy, now);
        assert_eq!(decision.transition, FlagTransition::EnteredFlagged);
        assert!(decision.is_flagged);
        assert_eq!(decision.flag_warning_date, Some(now));
        assert_eq!(decision.weekly_cap, policy.flagging_weekly_cap_base);
    }

    #[test]
    fn cap_shrinks_after_grace_period_elapses() {
        let policy = DispatchPolicy::default();
        let now = Utc::now();
        let warned_at = now - Duration::days(policy.flagging_grace_period_days + 1);
        let d = driver(true, Some(warned_at));
        let decision = derive_flag_decision(&d, &metrics(5, 0.5), &policy, now);
        assert_eq!(decision.transition, FlagTransition::StillFlagged);
        assert_eq!(decision.weekly_cap, policy.flagging_weekly_cap_base - 1);
    }

    #[test]
    fn recovering_attendance_exits_flagged_and_restores_base_cap() {
        let policy = DispatchPolicy::default();
        let now = Utc::now();
        let d = driver(true, Some(now - Duration::days(1)));
        let decision = derive_flag_decision(&d, &metrics(25, 0.97), &policy, now);
        assert_eq!(decision.transition, FlagTransition::ExitedFlagged);
        assert!(!decision.is_flagged);
        assert_eq!(decision.flag_warning_date, None);
        assert_eq!(decision.weekly_cap, policy.flagging_weekly_cap_reward);
    }

    #[test]
    fn untouched_good_standing_driver_keeps_reward_cap_when_eligible() {
        let policy = DispatchPolicy::default();
        let now = Utc::now();
        let d = driver(false, None);
        let decision = derive_flag_decision(&d, &metrics(25, 0.99), &policy, now);
        assert_eq!(decision.transition, FlagTransition::StillUnflagged);
        assert_eq!(decision.weekly_cap, policy.flagging_weekly_cap_reward);
    }
}

//! Pure per-(route,date) candidate selection, grounded in this codebase's
//! `Eligibility` gate enum and round-robin candidate sort
//! (`scheduler/eligibility.rs`, `scheduler/policy.rs`): no I/O, no clock
//! reads, just a filter-then-sort over pre-loaded state.

use domain::driver::{Driver, DriverPreferences};
use domain::ids::{RouteId, UserId};

#[derive(Debug, Clone, Copy)]
pub struct CandidateDriver {
    pub user_id: UserId,
    pub familiarity_count: i64,
    pub completion_rate: f64,
    pub attendance_rate: f64,
}

/// Drivers whose preferences include this `day_of_week` AND whose
/// `preferredRoutes` contains `route_id` AND whose current weekly tally
/// is under their cap.
pub fn is_eligible_candidate(
    driver: &Driver,
    preferences: Option<&DriverPreferences>,
    route_id: RouteId,
    day_of_week: u32,
    weekly_tally: i64,
) -> bool {
    let Some(prefs) = preferences else {
        return false;
    };
    prefs.prefers_day(day_of_week)
        && prefs.prefers_route(route_id)
        && weekly_tally < driver.weekly_cap as i64
}

/// `familiarityCount desc, completionRate desc, attendanceRate desc`,
/// final tiebreak `driverId asc` — the same "score desc, then id asc"
/// determinism discipline as the round-robin selector's tiebreak.
pub fn rank_candidates(candidates: &mut [CandidateDriver]) {
    candidates.sort_by(|a, b| {
        b.familiarity_count
            .cmp(&a.familiarity_count)
            .then(b.completion_rate.total_cmp(&a.completion_rate))
            .then(b.attendance_rate.total_cmp(&a.attendance_rate))
            .then(a.user_id.cmp(&b.user_id))
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use domain::ids::OrgId;

    fn driver(weekly_cap: i32) -> Driver {
        Driver {
            id: UserId::new(),
            org_id: OrgId::new(),
            weekly_cap,
            is_flagged: false,
            flag_warning_date: None,
            preferred_locale: "en".to_string(),
            fcm_token: None,
            created_at: Utc::now(),
        }
    }

    fn prefs(user_id: UserId, days: Vec<u32>, routes: Vec<RouteId>) -> DriverPreferences {
        DriverPreferences {
            user_id,
            preferred_days: days,
            preferred_routes: routes,
        }
    }

    #[test]
    fn requires_day_and_route_preference() {
        let route = RouteId::new();
        let other_route = RouteId::new();
        let d = driver(4);
        let p = prefs(d.id, vec![1, 2], vec![route]);

        assert!(is_eligible_candidate(&d, Some(&p), route, 1, 0));
        assert!(!is_eligible_candidate(&d, Some(&p), route, 3, 0));
        assert!(!is_eligible_candidate(&d, Some(&p), other_route, 1, 0));
        assert!(!is_eligible_candidate(&d, None, route, 1, 0));
    }

    #[test]
    fn weekly_cap_excludes_at_capacity_drivers() {
        let route = RouteId::new();
        let d = driver(2);
        let p = prefs(d.id, vec![1], vec![route]);
        assert!(is_eligible_candidate(&d, Some(&p), route, 1, 1));
        assert!(!is_eligible_candidate(&d, Some(&p), route, 1, 2));
    }

    #[test]
    fn rank_sorts_by_familiarity_then_rate_then_id() {
        let a = CandidateDriver {
            user_id: UserId::new(),
            familiarity_count: 5,
            completion_rate: 0.9,
            attendance_rate: 0.9,
        };
        let mut b = a;
        b.user_id = UserId::new();
        b.familiarity_count = 10;

        let mut candidates = vec![a, b];
        rank_candidates(&mut candidates);
        assert_eq!(candidates[0].user_id, b.user_id);
    }

    #[test]
    fn rank_breaks_full_tie_by_driver_id() {
        let mut a = CandidateDriver {
            user_id: UserId::new(),
            familiarity_count: 5,
            completion_rate: 0.9,
            attendance_rate: 0.9,
        };
        let mut b = a;
        b.user_id = UserId::new();

        if a.user_id > b.user_id {
            std::mem::swap(&mut a, &mut b);
        }
        let expected_first = a.user_id;

        let mut candidates = vec![b, a];
        rank_candidates(&mut candidates);
        assert_eq!(candidates[0].user_id, expected_first);
    }
}

//! Pure driver health scoring, grounded the same way this codebase's DRR
//! credit math (`accumulate_credit`, `can_serve`, `charge`) is pure and
//! saturating-arithmetic-safe: no I/O, no clock reads, just counts in and
//! a score out. The evaluator module is the thin shell that gathers the
//! counts and persists the result.

use common::policy::HealthPoints;
use serde::Serialize;

/// Event tallies accumulated since a driver's last score reset. Derived
/// from `DriverMetrics` by the evaluator; kept separate from that type so
/// the scoring math stays decoupled from the storage row shape.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct HealthEventCounts {
    pub confirmed_on_time: i64,
    pub arrived_on_time: i64,
    pub completed: i64,
    pub high_delivery: i64,
    pub bid_pickup: i64,
    pub urgent_pickup: i64,
    pub auto_drop: i64,
    pub late_cancel: i64,
}

/// `score = max(0, Σ points)`, each tally saturating-multiplied by its
/// per-event point value before summing so a pathological count never
/// wraps rather than merely producing a wrong answer.
pub fn accumulate_score(counts: &HealthEventCounts, points: &HealthPoints) -> i64 {
    let raw = counts
        .confirmed_on_time
        .saturating_mul(points.confirmed_on_time)
        .saturating_add(counts.arrived_on_time.saturating_mul(points.arrived_on_time))
        .saturating_add(counts.completed.saturating_mul(points.completed_shift))
        .saturating_add(counts.high_delivery.saturating_mul(points.high_delivery))
        .saturating_add(counts.bid_pickup.saturating_mul(points.bid_pickup))
        .saturating_add(counts.urgent_pickup.saturating_mul(points.urgent_pickup))
        .saturating_add(counts.auto_drop.saturating_mul(points.auto_drop))
        .saturating_add(counts.late_cancel.saturating_mul(points.late_cancel));
    raw.max(0)
}

/// Hard-stop is any no-show at all, or at least `threshold` late cancels
/// within the rolling window.
pub fn is_hard_stop(no_shows_in_window: i64, late_cancels_in_window: i64, threshold: i64) -> bool {
    no_shows_in_window > 0 || late_cancels_in_window >= threshold
}

/// A hard-stopped driver's score is capped even if their raw tally would
/// score higher, so the UI never shows a "healthy-looking" number next to
/// a driver who is currently locked out of the pool.
pub fn apply_hard_stop_cap(score: i64, hard_stop: bool) -> i64 {
    const HARD_STOP_CAP: i64 = 49;
    if hard_stop {
        score.min(HARD_STOP_CAP)
    } else {
        score
    }
}

/// Inputs to the weekly qualifying-week test. All counts scoped to the
/// week being evaluated.
#[derive(Debug, Clone, Copy)]
pub struct WeekOutcome {
    pub assignment_count: i64,
    pub attendance_rate: f64,
    pub adjusted_completion_rate: f64,
    pub no_shows: i64,
    pub late_cancels: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WeekVerdict {
    /// No assignments that week; streak/stars untouched.
    Neutral,
    /// Attendance and completion both held and nothing went wrong.
    Qualifying,
    /// At least one assignment, but it didn't clear every qualifying bar.
    NonQualifying,
}

pub fn classify_week(outcome: &WeekOutcome) -> WeekVerdict {
    if outcome.assignment_count == 0 {
        return WeekVerdict::Neutral;
    }
    let qualifies = outcome.attendance_rate >= 1.0
        && outcome.adjusted_completion_rate >= 0.95
        && outcome.no_shows == 0
        && outcome.late_cancels == 0;
    if qualifies {
        WeekVerdict::Qualifying
    } else {
        WeekVerdict::NonQualifying
    }
}

/// `stars = min(stars + 1, maxStars)`, saturating rather than wrapping on
/// a pathological existing value.
pub fn advance_stars(current_stars: i32, max_stars: i32) -> i32 {
    current_stars.saturating_add(1).min(max_stars)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn points() -> HealthPoints {
        HealthPoints {
            confirmed_on_time: 1,
            arrived_on_time: 1,
            completed_shift: 3,
            high_delivery: 1,
            bid_pickup: 2,
            urgent_pickup: 3,
            auto_drop: -10,
            late_cancel: -20,
        }
    }

    #[test]
    fn accumulate_score_floors_at_zero() {
        let counts = HealthEventCounts {
            auto_drop: 5,
            ..Default::default()
        };
        assert_eq!(accumulate_score(&counts, &points()), 0);
    }

    #[test]
    fn accumulate_score_sums_positive_contributions() {
        let counts = HealthEventCounts {
            confirmed_on_time: 5,
            arrived_on_time: 5,
            completed: 5,
            ..Default::default()
        };
        // 5*1 + 5*1 + 5*3 = 25
        assert_eq!(accumulate_score(&counts, &points()), 25);
    }

    #[test]
    fn hard_stop_triggers_on_single_no_show() {
        assert!(is_hard_stop(1, 0, 2));
        assert!(!is_hard_stop(0, 1, 2));
        assert!(is_hard_stop(0, 2, 2));
    }

    #[test]
    fn hard_stop_caps_score_at_49() {
        assert_eq!(apply_hard_stop_cap(120, true), 49);
        assert_eq!(apply_hard_stop_cap(30, true), 30);
        assert_eq!(apply_hard_stop_cap(120, false), 120);
    }

    #[test]
    fn classify_week_is_neutral_with_no_assignments() {
        let outcome = WeekOutcome {
            assignment_count: 0,
            attendance_rate: 0.0,
            adjusted_completion_rate: 0.0,
            no_shows: 0,
            late_cancels: 0,
        };
        assert_eq!(classify_week(&outcome), WeekVerdict::Neutral);
    }

    #[test]
    fn classify_week_requires_perfect_attendance_and_high_completion() {
        let qualifying = WeekOutcome {
            assignment_count: 5,
            attendance_rate: 1.0,
            adjusted_completion_rate: 0.97,
            no_shows: 0,
            late_cancels: 0,
        };
        assert_eq!(classify_week(&qualifying), WeekVerdict::Qualifying);

        let missed_one = WeekOutcome {
            attendance_rate: 0.8,
            ..qualifying
        };
        assert_eq!(classify_week(&missed_one), WeekVerdict::NonQualifying);
    }

    #[test]
    fn advance_stars_saturates_at_max() {
        assert_eq!(advance_stars(3, 4), 4);
        assert_eq!(advance_stars(4, 4), 4);
    }
}

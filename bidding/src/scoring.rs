//! Pure bid-window math: mode selection and bid scoring, grounded the
//! same way this codebase keeps its DRR credit math (`scoring.rs` in the
//! `health` crate, itself modeled on `scheduler/drr.rs`) separate from
//! the store/clock-touching shell. No I/O here.

use chrono::{DateTime, Duration, Utc};
use common::policy::BidScoreWeights;
use domain::bidding::BidWindowMode;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModeSelectionError {
    /// Shift already started/ended and the caller didn't opt into
    /// opening a window for a past shift.
    ShiftInPast,
}

#[derive(Debug, Clone, Copy)]
pub struct ModeSelection {
    pub mode: BidWindowMode,
    pub closes_at: DateTime<Utc>,
}

/// Mirrors the four-way branch in `createBidWindow`'s mode-selection
/// step: emergency is always honored verbatim, a past shift needs an
/// explicit opt-in, and otherwise the instant-cutoff decides between
/// instant and competitive.
pub fn select_mode(
    requested_mode: Option<BidWindowMode>,
    allow_past_shift: bool,
    shift_start: DateTime<Utc>,
    now: DateTime<Utc>,
    end_of_today: DateTime<Utc>,
    instant_cutoff_hours: i64,
) -> Result<ModeSelection, ModeSelectionError> {
    if requested_mode == Some(BidWindowMode::Emergency) {
        let closes_at = if shift_start > now { shift_start } else { end_of_today };
        return Ok(ModeSelection {
            mode: BidWindowMode::Emergency,
            closes_at,
        });
    }

    if shift_start <= now {
        if !allow_past_shift {
            return Err(ModeSelectionError::ShiftInPast);
        }
        return Ok(ModeSelection {
            mode: BidWindowMode::Instant,
            closes_at: end_of_today,
        });
    }

    let delta = shift_start - now;
    if requested_mode == Some(BidWindowMode::Instant) || delta <= Duration::hours(instant_cutoff_hours) {
        Ok(ModeSelection {
            mode: BidWindowMode::Instant,
            closes_at: shift_start,
        })
    } else {
        Ok(ModeSelection {
            mode: BidWindowMode::Competitive,
            closes_at: shift_start - Duration::hours(instant_cutoff_hours),
        })
    }
}

/// `calculateBidScoreParts`: health score plus familiarity and tenure,
/// each saturating at a policy cap, plus a flat preferred-route bonus.
pub fn calculate_bid_score(
    health_score: i64,
    familiarity_count: i64,
    tenure_months: f64,
    prefers_route: bool,
    weights: &BidScoreWeights,
) -> f64 {
    let familiarity = (familiarity_count as f64).min(weights.familiarity_cap);
    let tenure = tenure_months.min(weights.tenure_cap_months);
    let bonus = if prefers_route { weights.preferred_route_bonus } else { 0.0 };

    health_score as f64 * weights.health_weight
        + familiarity * weights.familiarity_weight
        + tenure * weights.tenure_weight
        + bonus
}

#[cfg(test)]
mod tests {
    use super::*;

    fn weights() -> BidScoreWeights {
        BidScoreWeights {
            health_weight: 1.0,
            familiarity_weight: 2.0,
            familiarity_cap: 20.0,
            tenure_weight: 0.5,
            tenure_cap_months: 36.0,
            preferred_route_bonus: 15.0,
        }
    }

    #[test]
    fn emergency_closes_at_shift_start_when_future() {
        let now: DateTime<Utc> = "2026-03-08T06:00:00Z".parse().unwrap();
        let shift_start: DateTime<Utc> = "2026-03-08T09:00:00Z".parse().unwrap();
        let end_of_today: DateTime<Utc> = "2026-03-08T23:59:00Z".parse().unwrap();
        let sel = select_mode(Some(BidWindowMode::Emergency), false, shift_start, now, end_of_today, 24).unwrap();
        assert_eq!(sel.mode, BidWindowMode::Emergency);
        assert_eq!(sel.closes_at, shift_start);
    }

    #[test]
    fn past_shift_requires_explicit_opt_in() {
        let now: DateTime<Utc> = "2026-03-08T12:00:00Z".parse().unwrap();
        let shift_start: DateTime<Utc> = "2026-03-08T09:00:00Z".parse().unwrap();
        let end_of_today: DateTime<Utc> = "2026-03-08T23:59:00Z".parse().unwrap();
        assert_eq!(
            select_mode(None, false, shift_start, now, end_of_today, 24).unwrap_err(),
            ModeSelectionError::ShiftInPast
        );
        let sel = select_mode(None, true, shift_start, now, end_of_today, 24).unwrap();
        assert_eq!(sel.mode, BidWindowMode::Instant);
        assert_eq!(sel.closes_at, end_of_today);
    }

    #[test]
    fn inside_cutoff_is_instant_outside_is_competitive() {
        let now: DateTime<Utc> = "2026-03-07T12:00:00Z".parse().unwrap();
        let end_of_today: DateTime<Utc> = "2026-03-07T23:59:00Z".parse().unwrap();
        let near_shift: DateTime<Utc> = "2026-03-08T09:00:00Z".parse().unwrap();
        let sel = select_mode(None, false, near_shift, now, end_of_today, 24).unwrap();
        assert_eq!(sel.mode, BidWindowMode::Instant);
        assert_eq!(sel.closes_at, near_shift);

        let far_shift: DateTime<Utc> = "2026-03-15T09:00:00Z".parse().unwrap();
        let sel = select_mode(None, false, far_shift, now, end_of_today, 24).unwrap();
        assert_eq!(sel.mode, BidWindowMode::Competitive);
        assert_eq!(sel.closes_at, far_shift - Duration::hours(24));
    }

    #[test]
    fn score_saturates_familiarity_and_tenure_at_their_caps() {
        let w = weights();
        let uncapped = calculate_bid_score(10, 5, 10.0, false, &w);
        assert!((uncapped - (10.0 + 10.0 + 5.0)).abs() < 1e-9);

        let capped = calculate_bid_score(10, 100, 1000.0, true, &w);
        // 10*1 + 20*2 + 36*0.5 + 15 = 10 + 40 + 18 + 15 = 83
        assert!((capped - 83.0).abs() < 1e-9);
    }
}

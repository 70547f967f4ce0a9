//! Pure allowed-action derivation for an assignment, grounded in this
//! codebase's `Eligibility`-style gate functions (`constraints_ok`,
//! `gate_b_ok`): given pre-loaded state and a `now`, return a closed set
//! of enabled actions rather than performing any of them. No I/O, no
//! clock reads — callers supply `now` and the three window instants.

use chrono::{DateTime, NaiveDate, Utc};
use common::{Clock, TenantClock, TimeError};
use domain::assignment::{Assignment, AssignmentStatus, Shift};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LifecycleAction {
    Confirm,
    CancelEarly,
    CancelLate,
    Arrive,
    Start,
    Complete,
}

/// The three tenant-local instants an assignment's allowed actions are
/// computed against.
#[derive(Debug, Clone, Copy)]
pub struct LifecycleWindow {
    pub opens_at: DateTime<Utc>,
    pub deadline: DateTime<Utc>,
    pub arrival_deadline: DateTime<Utc>,
}

/// `opensAt = localDateTimeAt(date − confirmationWindowDays, shiftsStartHour)`,
/// `deadline = localDateTimeAt(date − confirmationDeadlineHours/24, shiftsStartHour)`,
/// `arrivalDeadline = localDateTimeAt(date, routeStartTime)`.
pub fn compute_window<C: Clock>(
    tenant: &TenantClock<C>,
    confirmation_window_days_before_shift: i64,
    confirmation_deadline_hours_before_shift: i64,
    shifts_start_hour_local: u32,
    date: NaiveDate,
    route_start_time: (u32, u32),
) -> Result<LifecycleWindow, TimeError> {
    let opens_date = TenantClock::<C>::add_days(date, -confirmation_window_days_before_shift);
    let deadline_date =
        TenantClock::<C>::add_days(date, -(confirmation_deadline_hours_before_shift / 24));
    let opens_at = tenant.local_datetime_at(opens_date, shifts_start_hour_local, 0)?;
    let deadline = tenant.local_datetime_at(deadline_date, shifts_start_hour_local, 0)?;
    let (route_hour, route_minute) = route_start_time;
    let arrival_deadline = tenant.local_datetime_at(date, route_hour, route_minute)?;
    Ok(LifecycleWindow {
        opens_at,
        deadline,
        arrival_deadline,
    })
}

/// Pure function of `(assignment, shift, today, window, now)`.
pub fn allowed_actions(
    assignment: &Assignment,
    shift: Option<&Shift>,
    today: NaiveDate,
    window: LifecycleWindow,
    now: DateTime<Utc>,
) -> Vec<LifecycleAction> {
    let mut actions = Vec::new();

    if assignment.status == AssignmentStatus::Scheduled
        && assignment.confirmed_at.is_none()
        && window.opens_at <= now
        && now <= window.deadline
    {
        actions.push(LifecycleAction::Confirm);
    }

    if assignment.date > today && assignment.status != AssignmentStatus::Cancelled {
        if now < window.deadline {
            actions.push(LifecycleAction::CancelEarly);
        } else {
            actions.push(LifecycleAction::CancelLate);
        }
    }

    let arrived_at = shift.and_then(|s| s.arrived_at);
    if assignment.date == today
        && assignment.status == AssignmentStatus::Scheduled
        && assignment.confirmed_at.is_some()
        && arrived_at.is_none()
        && now < window.arrival_deadline
    {
        actions.push(LifecycleAction::Arrive);
    }

    if let Some(s) = shift {
        if assignment.status == AssignmentStatus::Active
            && s.arrived_at.is_some()
            && s.parcels_start.is_none()
        {
            actions.push(LifecycleAction::Start);
        }
        if assignment.status == AssignmentStatus::Active
            && s.parcels_start.is_some()
            && s.completed_at.is_none()
        {
            actions.push(LifecycleAction::Complete);
        }
    }

    actions
}

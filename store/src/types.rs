use chrono::{DateTime, NaiveDate, Utc};
use domain::assignment::{AssignedBy, AssignmentStatus, CancelType};
use domain::bidding::{BidWindowMode, BidWindowTrigger};
use domain::ids::{AssignmentId, BidWindowId, RouteId, UserId, WarehouseId};

/// A not-yet-persisted assignment row, as produced by the schedule
/// generator or a manual-assign path.
#[derive(Debug, Clone)]
pub struct NewAssignment {
    pub warehouse_id: WarehouseId,
    pub route_id: RouteId,
    pub date: NaiveDate,
    pub user_id: Option<UserId>,
    pub status: AssignmentStatus,
    pub assigned_by: Option<AssignedBy>,
    pub assigned_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct NewBidWindow {
    pub assignment_id: AssignmentId,
    pub mode: BidWindowMode,
    pub trigger: BidWindowTrigger,
    pub pay_bonus_percent: i32,
    pub opens_at: DateTime<Utc>,
    pub closes_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateBidWindowOutcome {
    Created(BidWindowId),
    AlreadyExists,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionOutcome {
    Transitioned,
    ClosedAsExpired,
    Refused,
}

#[derive(Debug, Clone)]
pub struct ScoredBid {
    pub bid_id: domain::ids::BidId,
    pub user_id: UserId,
    pub score: f64,
    pub bid_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolveOutcome {
    /// Winner assigned cleanly.
    Resolved { winner: UserId },
    /// Every scored candidate conflicted with an existing same-day
    /// assignment; caller should retry with the next candidate set.
    AllConflicted,
    /// The window was no longer open by the time it was locked.
    NotOpen,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstantAssignOutcome {
    Assigned,
    WindowNotOpen,
    AlreadyHasShiftThatDate,
}

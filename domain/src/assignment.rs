use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{AssignmentId, RouteId, UserId, WarehouseId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssignmentStatus {
    Scheduled,
    Active,
    Completed,
    Cancelled,
    Unfilled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CancelType {
    Early,
    Late,
    AutoDrop,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssignedBy {
    Algorithm,
    Manager,
    Bid,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Assignment {
    pub id: AssignmentId,
    pub warehouse_id: WarehouseId,
    pub route_id: RouteId,
    pub date: NaiveDate,
    pub user_id: Option<UserId>,
    pub status: AssignmentStatus,
    pub confirmed_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub cancel_type: Option<CancelType>,
    pub assigned_by: Option<AssignedBy>,
    pub assigned_at: Option<DateTime<Utc>>,
}

impl Assignment {
    /// `status=scheduled ⇒ userId ≠ null`; `status=unfilled ⇒ userId = null`;
    /// `status=cancelled ⇒ cancelledAt ≠ null ∧ cancelType ≠ null`.
    pub fn invariant_holds(&self) -> bool {
        match self.status {
            AssignmentStatus::Scheduled | AssignmentStatus::Active | AssignmentStatus::Completed => {
                self.user_id.is_some()
            }
            AssignmentStatus::Unfilled => self.user_id.is_none(),
            AssignmentStatus::Cancelled => {
                self.cancelled_at.is_some() && self.cancel_type.is_some()
            }
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Shift {
    pub arrived_at: Option<DateTime<Utc>>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub parcels_start: Option<i64>,
    pub parcels_delivered: Option<i64>,
    pub parcels_returned: Option<i64>,
    pub excepted_returns: Option<i64>,
    pub exception_notes: Option<String>,
}

impl Shift {
    /// `parcelsStart ≥ parcelsReturned ≥ exceptedReturns ≥ 0`.
    pub fn invariant_holds(&self) -> bool {
        let start = self.parcels_start.unwrap_or(0);
        let returned = self.parcels_returned.unwrap_or(0);
        let excepted = self.excepted_returns.unwrap_or(0);
        start >= returned && returned >= excepted && excepted >= 0
    }

    /// `(start - returned + excepted) / start >= 0.95`
    pub fn delivery_rate(&self) -> Option<f64> {
        let start = self.parcels_start?;
        if start <= 0 {
            return None;
        }
        let returned = self.parcels_returned.unwrap_or(0);
        let excepted = self.excepted_returns.unwrap_or(0);
        Some((start - returned + excepted) as f64 / start as f64)
    }

    pub fn is_high_delivery(&self, threshold: f64) -> bool {
        self.delivery_rate().map(|r| r >= threshold).unwrap_or(false)
    }
}

/// Display label derived identically wherever it is needed (broadcast
/// payloads, read projections): never stored, never partially cached, so a
/// writer and a later reader can never disagree about its value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShiftProgress {
    Unconfirmed,
    Confirmed,
    Arrived,
    InProgress,
    Completed,
    Cancelled,
}

pub fn derive_shift_progress(assignment: &Assignment, shift: Option<&Shift>) -> ShiftProgress {
    if assignment.status == AssignmentStatus::Cancelled {
        return ShiftProgress::Cancelled;
    }
    let shift = match shift {
        Some(s) => s,
        None => {
            return if assignment.confirmed_at.is_some() {
                ShiftProgress::Confirmed
            } else {
                ShiftProgress::Unconfirmed
            }
        }
    };
    if shift.completed_at.is_some() {
        ShiftProgress::Completed
    } else if shift.parcels_start.is_some() {
        ShiftProgress::InProgress
    } else if shift.arrived_at.is_some() {
        ShiftProgress::Arrived
    } else if assignment.confirmed_at.is_some() {
        ShiftProgress::Confirmed
    } else {
        ShiftProgress::Unconfirmed
    }
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{AssignmentId, BidId, BidWindowId, UserId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BidWindowMode {
    Competitive,
    Instant,
    Emergency,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BidWindowTrigger {
    Cancellation,
    AutoDrop,
    NoShow,
    Manager,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BidWindowStatus {
    Open,
    Resolved,
    Closed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BidWindow {
    pub id: BidWindowId,
    pub assignment_id: AssignmentId,
    pub mode: BidWindowMode,
    pub trigger: BidWindowTrigger,
    pub pay_bonus_percent: i32,
    pub opens_at: DateTime<Utc>,
    pub closes_at: DateTime<Utc>,
    pub status: BidWindowStatus,
    pub winner_id: Option<UserId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BidStatus {
    Pending,
    Won,
    Lost,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bid {
    pub id: BidId,
    pub bid_window_id: BidWindowId,
    pub user_id: UserId,
    pub score: Option<f64>,
    pub bid_at: DateTime<Utc>,
    pub status: BidStatus,
    pub resolved_at: Option<DateTime<Utc>>,
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ids::{NotificationId, OrgId, UserId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationType {
    ShiftReminder,
    BidOpen,
    BidWon,
    BidLost,
    ShiftCancelled,
    Warning,
    Manual,
    ScheduleLocked,
    AssignmentConfirmed,
    RouteUnfilled,
    RouteCancelled,
    DriverNoShow,
    ConfirmationReminder,
    ShiftAutoDropped,
    EmergencyRouteAvailable,
    StreakAdvanced,
    StreakReset,
    BonusEligible,
    CorrectiveWarning,
    ReturnException,
    StaleShiftReminder,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub id: NotificationId,
    pub org_id: OrgId,
    pub recipient_user_id: UserId,
    pub kind: NotificationType,
    pub title: String,
    pub body: String,
    pub data: Value,
    pub dedupe_key: Option<String>,
    pub created_at: DateTime<Utc>,
    pub read_at: Option<DateTime<Utc>>,
}

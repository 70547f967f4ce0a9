use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ids::{AuditLogId, UserId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActorType {
    User,
    System,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditLog {
    pub id: AuditLogId,
    pub entity_type: String,
    pub entity_id: String,
    pub action: String,
    pub actor_type: ActorType,
    pub actor_id: Option<UserId>,
    pub changes: Value,
    pub created_at: DateTime<Utc>,
}

/// The indicative action tag set observed across the core. Not exhaustive —
/// callers may record other snake_case actions — but these are the ones every
/// component is expected to recognize in log/search tooling.
pub mod actions {
    pub const CREATE: &str = "create";
    pub const ASSIGN: &str = "assign";
    pub const MANUAL_ASSIGN: &str = "manual_assign";
    pub const CONFIRM: &str = "confirm";
    pub const UNFILLED: &str = "unfilled";
    pub const INSTANT_ASSIGN: &str = "instant_assign";
    pub const NO_SHOW_DETECTED: &str = "no_show_detected";
    pub const FLAG: &str = "flag";
    pub const UNFLAG: &str = "unflag";
    pub const STREAK_RESET: &str = "streak_reset";
    pub const STREAK_ADVANCED: &str = "streak_advanced";
    pub const WEEK_EVALUATED: &str = "week_evaluated";
    pub const REINSTATE: &str = "reinstate";
}

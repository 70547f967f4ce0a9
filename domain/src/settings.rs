use serde::{Deserialize, Serialize};

use crate::ids::OrgId;

/// Optional per-org override row. Absence of a row, or of any field within
/// it, means the corresponding `common::policy::DispatchPolicy` default
/// applies.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OrganizationDispatchSettings {
    pub org_id: Option<OrgId>,
    pub tenant_timezone: Option<String>,
    pub shifts_start_hour_local: Option<u32>,
    pub confirmation_deadline_hours_before_shift: Option<i64>,
    pub bidding_instant_mode_cutoff_hours: Option<i64>,
    pub bidding_emergency_bonus_percent: Option<i32>,
    pub flagging_grace_period_days: Option<i64>,
}

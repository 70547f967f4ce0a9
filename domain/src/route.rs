use serde::{Deserialize, Serialize};

use crate::ids::{RouteId, UserId, WarehouseId};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Route {
    pub id: RouteId,
    pub warehouse_id: WarehouseId,
    pub name: String,
    /// Local "HH:MM", default "09:00".
    pub start_time: String,
    pub primary_manager_id: Option<UserId>,
}

impl Route {
    pub fn start_time_parts(&self) -> (u32, u32) {
        parse_hh_mm(&self.start_time).unwrap_or((9, 0))
    }
}

pub fn parse_hh_mm(s: &str) -> Option<(u32, u32)> {
    let (h, m) = s.split_once(':')?;
    Some((h.parse().ok()?, m.parse().ok()?))
}

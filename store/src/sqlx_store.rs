use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use domain::assignment::{AssignedBy, Assignment, AssignmentStatus, CancelType, Shift};
use domain::audit::ActorType;
use domain::bidding::{Bid, BidStatus, BidWindow};
use domain::driver::{Driver, DriverMetrics, DriverPreferences, RouteCompletion};
use domain::error::constraints::{ACTIVE_ASSIGNMENT_PER_USER_DATE, OPEN_BID_WINDOW_PER_ASSIGNMENT};
use domain::health::{DriverHealthSnapshot, DriverHealthState};
use domain::ids::*;
use domain::notification::Notification;
use domain::route::Route;
use serde_json::Value;
use sqlx::Row;
use uuid::Uuid;

use crate::db::Db;
use crate::error::classify_sql_error;
use crate::repo::Store;
use crate::rows::*;
use crate::types::{
    CreateBidWindowOutcome, InstantAssignOutcome, NewAssignment, NewBidWindow, ResolveOutcome,
    ScoredBid, TransitionOutcome,
};

pub struct SqlxStore {
    db: Db,
}

impl SqlxStore {
    pub fn new(db: Db) -> Self {
        Self { db }
    }
}

#[async_trait]
impl Store for SqlxStore {
    async fn list_organizations(&self) -> anyhow::Result<Vec<OrgId>> {
        let rows = sqlx::query("SELECT id FROM organizations")
            .fetch_all(&*self.db.pool)
            .await?;
        rows.iter()
            .map(|r| Ok(OrgId(parse_uuid(r.try_get("id")?)?)))
            .collect()
    }

    async fn list_routes(&self, org_id: OrgId) -> anyhow::Result<Vec<Route>> {
        let rows = sqlx::query(
            "SELECT r.* FROM routes r JOIN warehouses w ON w.id = r.warehouse_id WHERE w.org_id = ?",
        )
        .bind(org_id.0.to_string())
        .fetch_all(&*self.db.pool)
        .await?;
        rows.iter().map(row_to_route).collect()
    }

    async fn get_route(&self, route_id: RouteId, org_id: OrgId) -> anyhow::Result<Option<Route>> {
        let row = sqlx::query(
            "SELECT r.* FROM routes r JOIN warehouses w ON w.id = r.warehouse_id WHERE r.id = ? AND w.org_id = ?",
        )
        .bind(route_id.0.to_string())
        .bind(org_id.0.to_string())
        .fetch_optional(&*self.db.pool)
        .await?;
        row.as_ref().map(row_to_route).transpose()
    }

    async fn get_route_manager(
        &self,
        route_id: RouteId,
        org_id: OrgId,
    ) -> anyhow::Result<Option<UserId>> {
        Ok(self
            .get_route(route_id, org_id)
            .await?
            .and_then(|r| r.primary_manager_id))
    }

    async fn can_manager_access_warehouse(
        &self,
        user_id: UserId,
        warehouse_id: WarehouseId,
        org_id: OrgId,
    ) -> anyhow::Result<bool> {
        let row = sqlx::query(
            "SELECT 1 FROM users u JOIN warehouses w ON w.org_id = u.org_id \
             WHERE u.id = ? AND u.role = 'manager' AND u.org_id = ? AND w.id = ?",
        )
        .bind(user_id.0.to_string())
        .bind(org_id.0.to_string())
        .bind(warehouse_id.0.to_string())
        .fetch_optional(&*self.db.pool)
        .await?;
        Ok(row.is_some())
    }

    async fn list_non_flagged_drivers(&self, org_id: OrgId) -> anyhow::Result<Vec<Driver>> {
        let rows = sqlx::query("SELECT * FROM drivers WHERE org_id = ? AND is_flagged = 0")
            .bind(org_id.0.to_string())
            .fetch_all(&*self.db.pool)
            .await?;
        rows.iter().map(row_to_driver).collect()
    }

    async fn get_driver(&self, user_id: UserId, org_id: OrgId) -> anyhow::Result<Option<Driver>> {
        let row = sqlx::query("SELECT * FROM drivers WHERE id = ? AND org_id = ?")
            .bind(user_id.0.to_string())
            .bind(org_id.0.to_string())
            .fetch_optional(&*self.db.pool)
            .await?;
        row.as_ref().map(row_to_driver).transpose()
    }

    async fn get_driver_preferences(
        &self,
        user_id: UserId,
    ) -> anyhow::Result<Option<DriverPreferences>> {
        let row = sqlx::query("SELECT * FROM driver_preferences WHERE user_id = ?")
            .bind(user_id.0.to_string())
            .fetch_optional(&*self.db.pool)
            .await?;
        row.as_ref().map(row_to_driver_preferences).transpose()
    }

    async fn get_driver_metrics(&self, user_id: UserId) -> anyhow::Result<DriverMetrics> {
        let row = sqlx::query("SELECT * FROM driver_metrics WHERE user_id = ?")
            .bind(user_id.0.to_string())
            .fetch_optional(&*self.db.pool)
            .await?;
        match row {
            Some(r) => row_to_driver_metrics(&r),
            None => Ok(DriverMetrics::default()),
        }
    }

    async fn update_driver_metrics(
        &self,
        user_id: UserId,
        metrics: DriverMetrics,
    ) -> anyhow::Result<()> {
        sqlx::query(
            "INSERT INTO driver_metrics \
             (user_id, total_shifts, completed_shifts, attendance_rate, completion_rate, \
              avg_parcels_delivered, no_shows, bid_pickups, urgent_pickups, confirmed_shifts, \
              arrived_on_time_shifts, high_delivery_shifts, auto_drops, late_cancels) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?) \
             ON CONFLICT(user_id) DO UPDATE SET \
              total_shifts=excluded.total_shifts, completed_shifts=excluded.completed_shifts, \
              attendance_rate=excluded.attendance_rate, completion_rate=excluded.completion_rate, \
              avg_parcels_delivered=excluded.avg_parcels_delivered, no_shows=excluded.no_shows, \
              bid_pickups=excluded.bid_pickups, urgent_pickups=excluded.urgent_pickups, \
              confirmed_shifts=excluded.confirmed_shifts, \
              arrived_on_time_shifts=excluded.arrived_on_time_shifts, \
              high_delivery_shifts=excluded.high_delivery_shifts, \
              auto_drops=excluded.auto_drops, late_cancels=excluded.late_cancels",
        )
        .bind(user_id.0.to_string())
        .bind(metrics.total_shifts)
        .bind(metrics.completed_shifts)
        .bind(metrics.attendance_rate)
        .bind(metrics.completion_rate)
        .bind(metrics.avg_parcels_delivered)
        .bind(metrics.no_shows)
        .bind(metrics.bid_pickups)
        .bind(metrics.urgent_pickups)
        .bind(metrics.confirmed_shifts)
        .bind(metrics.arrived_on_time_shifts)
        .bind(metrics.high_delivery_shifts)
        .bind(metrics.auto_drops)
        .bind(metrics.late_cancels)
        .execute(&*self.db.pool)
        .await?;
        Ok(())
    }

    async fn get_route_completion(
        &self,
        user_id: UserId,
        route_id: RouteId,
    ) -> anyhow::Result<RouteCompletion> {
        let row = sqlx::query("SELECT * FROM route_completions WHERE user_id = ? AND route_id = ?")
            .bind(user_id.0.to_string())
            .bind(route_id.0.to_string())
            .fetch_optional(&*self.db.pool)
            .await?;
        match row {
            Some(r) => row_to_route_completion(&r),
            None => Ok(RouteCompletion {
                user_id,
                route_id,
                completion_count: 0,
                last_completed_at: None,
            }),
        }
    }

    async fn increment_route_completion(
        &self,
        user_id: UserId,
        route_id: RouteId,
        now: DateTime<Utc>,
    ) -> anyhow::Result<()> {
        // Monotone non-decreasing counter: never decremented by any path.
        sqlx::query(
            "INSERT INTO route_completions (user_id, route_id, completion_count, last_completed_at) \
             VALUES (?, ?, 1, ?) \
             ON CONFLICT(user_id, route_id) DO UPDATE SET \
              completion_count = completion_count + 1, last_completed_at = excluded.last_completed_at",
        )
        .bind(user_id.0.to_string())
        .bind(route_id.0.to_string())
        .bind(to_rfc3339(now))
        .execute(&*self.db.pool)
        .await?;
        Ok(())
    }

    async fn set_driver_flag(
        &self,
        user_id: UserId,
        is_flagged: bool,
        flag_warning_date: Option<DateTime<Utc>>,
        weekly_cap: i32,
    ) -> anyhow::Result<()> {
        sqlx::query(
            "UPDATE drivers SET is_flagged = ?, flag_warning_date = ?, weekly_cap = ? WHERE id = ?",
        )
        .bind(is_flagged as i64)
        .bind(opt_to_rfc3339(flag_warning_date))
        .bind(weekly_cap as i64)
        .bind(user_id.0.to_string())
        .execute(&*self.db.pool)
        .await?;
        Ok(())
    }

    async fn clear_driver_token_if_matches(
        &self,
        user_id: UserId,
        token: &str,
    ) -> anyhow::Result<()> {
        sqlx::query("UPDATE drivers SET fcm_token = NULL WHERE id = ? AND fcm_token = ?")
            .bind(user_id.0.to_string())
            .bind(token)
            .execute(&*self.db.pool)
            .await?;
        Ok(())
    }

    async fn list_week_assignments(
        &self,
        org_id: OrgId,
        week_start: NaiveDate,
        week_end_exclusive: NaiveDate,
    ) -> anyhow::Result<Vec<Assignment>> {
        let rows = sqlx::query(
            "SELECT a.* FROM assignments a JOIN warehouses w ON w.id = a.warehouse_id \
             WHERE w.org_id = ? AND a.date >= ? AND a.date < ? AND a.status != 'cancelled'",
        )
        .bind(org_id.0.to_string())
        .bind(week_start.format("%Y-%m-%d").to_string())
        .bind(week_end_exclusive.format("%Y-%m-%d").to_string())
        .fetch_all(&*self.db.pool)
        .await?;
        rows.iter().map(row_to_assignment).collect()
    }

    async fn insert_assignment(&self, new: NewAssignment) -> anyhow::Result<AssignmentId> {
        let id = AssignmentId::new();
        let status = match new.status {
            AssignmentStatus::Scheduled => "scheduled",
            AssignmentStatus::Active => "active",
            AssignmentStatus::Completed => "completed",
            AssignmentStatus::Cancelled => "cancelled",
            AssignmentStatus::Unfilled => "unfilled",
        };
        let assigned_by = new.assigned_by.map(|a| match a {
            AssignedBy::Algorithm => "algorithm",
            AssignedBy::Manager => "manager",
            AssignedBy::Bid => "bid",
        });
        let result = sqlx::query(
            "INSERT INTO assignments \
             (id, warehouse_id, route_id, date, user_id, status, assigned_by, assigned_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(id.0.to_string())
        .bind(new.warehouse_id.0.to_string())
        .bind(new.route_id.0.to_string())
        .bind(new.date.format("%Y-%m-%d").to_string())
        .bind(new.user_id.map(|u| u.0.to_string()))
        .bind(status)
        .bind(assigned_by)
        .bind(opt_to_rfc3339(new.assigned_at))
        .execute(&*self.db.pool)
        .await;

        match result {
            Ok(_) => Ok(id),
            Err(e) => {
                Err(classify_sql_error(e, &[ACTIVE_ASSIGNMENT_PER_USER_DATE]).into())
            }
        }
    }

    async fn get_assignment(
        &self,
        id: AssignmentId,
        org_id: Option<OrgId>,
    ) -> anyhow::Result<Option<Assignment>> {
        let row = if let Some(org_id) = org_id {
            sqlx::query(
                "SELECT a.* FROM assignments a JOIN warehouses w ON w.id = a.warehouse_id \
                 WHERE a.id = ? AND w.org_id = ?",
            )
            .bind(id.0.to_string())
            .bind(org_id.0.to_string())
            .fetch_optional(&*self.db.pool)
            .await?
        } else {
            sqlx::query("SELECT * FROM assignments WHERE id = ?")
                .bind(id.0.to_string())
                .fetch_optional(&*self.db.pool)
                .await?
        };
        row.as_ref().map(row_to_assignment).transpose()
    }

    async fn get_shift(&self, assignment_id: AssignmentId) -> anyhow::Result<Option<Shift>> {
        let row = sqlx::query("SELECT * FROM shifts WHERE assignment_id = ?")
            .bind(assignment_id.0.to_string())
            .fetch_optional(&*self.db.pool)
            .await?;
        row.as_ref().map(row_to_shift).transpose()
    }

    async fn confirm_assignment(
        &self,
        id: AssignmentId,
        now: DateTime<Utc>,
    ) -> anyhow::Result<bool> {
        let result = sqlx::query(
            "UPDATE assignments SET confirmed_at = ? \
             WHERE id = ? AND confirmed_at IS NULL AND status = 'scheduled'",
        )
        .bind(to_rfc3339(now))
        .bind(id.0.to_string())
        .execute(&*self.db.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn cancel_assignment(
        &self,
        id: AssignmentId,
        now: DateTime<Utc>,
        cancel_type: CancelType,
    ) -> anyhow::Result<bool> {
        let cancel_type_str = match cancel_type {
            CancelType::Early => "early",
            CancelType::Late => "late",
            CancelType::AutoDrop => "auto_drop",
        };
        let result = sqlx::query(
            "UPDATE assignments SET status = 'cancelled', cancelled_at = ?, cancel_type = ? \
             WHERE id = ? AND status != 'cancelled'",
        )
        .bind(to_rfc3339(now))
        .bind(cancel_type_str)
        .bind(id.0.to_string())
        .execute(&*self.db.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn record_arrival(&self, id: AssignmentId, now: DateTime<Utc>) -> anyhow::Result<bool> {
        let mut tx = self.db.pool.begin().await?;
        let assignment = sqlx::query("SELECT * FROM assignments WHERE id = ?")
            .bind(id.0.to_string())
            .fetch_optional(&mut *tx)
            .await?;
        let assignment = match assignment {
            Some(r) => row_to_assignment(&r)?,
            None => return Ok(false),
        };
        if assignment.status != AssignmentStatus::Active
            && assignment.status != AssignmentStatus::Scheduled
        {
            return Ok(false);
        }
        let result = sqlx::query(
            "INSERT INTO shifts (assignment_id, arrived_at) VALUES (?, ?) \
             ON CONFLICT(assignment_id) DO UPDATE SET arrived_at = excluded.arrived_at \
             WHERE shifts.arrived_at IS NULL",
        )
        .bind(id.0.to_string())
        .bind(to_rfc3339(now))
        .execute(&mut *tx)
        .await?;
        if result.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(false);
        }
        sqlx::query("UPDATE assignments SET status = 'active' WHERE id = ? AND status = 'scheduled'")
            .bind(id.0.to_string())
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(true)
    }

    async fn start_shift(&self, id: AssignmentId, now: DateTime<Utc>) -> anyhow::Result<bool> {
        let result = sqlx::query(
            "UPDATE shifts SET parcels_start = COALESCE(parcels_start, 0), started_at = ? \
             WHERE assignment_id = ? AND arrived_at IS NOT NULL AND parcels_start IS NULL",
        )
        .bind(to_rfc3339(now))
        .bind(id.0.to_string())
        .execute(&*self.db.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn complete_shift(
        &self,
        id: AssignmentId,
        now: DateTime<Utc>,
        parcels_delivered: i64,
        parcels_returned: i64,
        excepted_returns: i64,
    ) -> anyhow::Result<bool> {
        let mut tx = self.db.pool.begin().await?;
        let result = sqlx::query(
            "UPDATE shifts SET completed_at = ?, parcels_delivered = ?, parcels_returned = ?, \
             excepted_returns = ? \
             WHERE assignment_id = ? AND parcels_start IS NOT NULL AND completed_at IS NULL",
        )
        .bind(to_rfc3339(now))
        .bind(parcels_delivered)
        .bind(parcels_returned)
        .bind(excepted_returns)
        .bind(id.0.to_string())
        .execute(&mut *tx)
        .await?;
        if result.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(false);
        }
        sqlx::query("UPDATE assignments SET status = 'completed' WHERE id = ?")
            .bind(id.0.to_string())
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(true)
    }

    async fn weekly_assignment_count(
        &self,
        user_id: UserId,
        week_start: NaiveDate,
        week_end_exclusive: NaiveDate,
    ) -> anyhow::Result<i64> {
        let row = sqlx::query(
            "SELECT COUNT(*) as c FROM assignments \
             WHERE user_id = ? AND date >= ? AND date < ? AND status != 'cancelled'",
        )
        .bind(user_id.0.to_string())
        .bind(week_start.format("%Y-%m-%d").to_string())
        .bind(week_end_exclusive.format("%Y-%m-%d").to_string())
        .fetch_one(&*self.db.pool)
        .await?;
        Ok(row.try_get::<i64, _>("c")?)
    }

    async fn same_day_conflict(
        &self,
        user_id: UserId,
        date: NaiveDate,
        excluding_assignment: Option<AssignmentId>,
    ) -> anyhow::Result<bool> {
        let row = sqlx::query(
            "SELECT 1 FROM assignments WHERE user_id = ? AND date = ? AND status != 'cancelled' \
             AND (? IS NULL OR id != ?)",
        )
        .bind(user_id.0.to_string())
        .bind(date.format("%Y-%m-%d").to_string())
        .bind(excluding_assignment.map(|a| a.0.to_string()))
        .bind(excluding_assignment.map(|a| a.0.to_string()))
        .fetch_optional(&*self.db.pool)
        .await?;
        Ok(row.is_some())
    }

    async fn coerce_unfilled(&self, id: AssignmentId, now: DateTime<Utc>) -> anyhow::Result<()> {
        let _ = now;
        sqlx::query(
            "UPDATE assignments SET status = 'unfilled', user_id = NULL \
             WHERE id = ? AND status != 'unfilled'",
        )
        .bind(id.0.to_string())
        .execute(&*self.db.pool)
        .await?;
        Ok(())
    }

    async fn delete_partial_shift(&self, assignment_id: AssignmentId) -> anyhow::Result<()> {
        sqlx::query("DELETE FROM shifts WHERE assignment_id = ? AND completed_at IS NULL")
            .bind(assignment_id.0.to_string())
            .execute(&*self.db.pool)
            .await?;
        Ok(())
    }

    async fn list_todays_confirmed_unarrived(
        &self,
        org_id: OrgId,
        today: NaiveDate,
    ) -> anyhow::Result<Vec<(Assignment, Route)>> {
        let rows = sqlx::query(
            "SELECT a.*, r.id as route_id_full, r.warehouse_id as route_warehouse_id, \
                    r.name as route_name, r.start_time as route_start_time, \
                    r.primary_manager_id as route_primary_manager_id \
             FROM assignments a \
             JOIN warehouses w ON w.id = a.warehouse_id \
             JOIN routes r ON r.id = a.route_id \
             LEFT JOIN shifts s ON s.assignment_id = a.id \
             WHERE w.org_id = ? AND a.date = ? AND a.status = 'scheduled' \
               AND a.confirmed_at IS NOT NULL AND s.arrived_at IS NULL",
        )
        .bind(org_id.0.to_string())
        .bind(today.format("%Y-%m-%d").to_string())
        .fetch_all(&*self.db.pool)
        .await?;
        rows.iter()
            .map(|row| {
                let assignment = row_to_assignment(row)?;
                let route = Route {
                    id: RouteId(parse_uuid(row.try_get("route_id_full")?)?),
                    warehouse_id: WarehouseId(parse_uuid(row.try_get("route_warehouse_id")?)?),
                    name: row.try_get("route_name")?,
                    start_time: row.try_get("route_start_time")?,
                    primary_manager_id: row
                        .try_get::<Option<String>, _>("route_primary_manager_id")?
                        .map(|s| parse_uuid(&s))
                        .transpose()?
                        .map(UserId),
                };
                Ok((assignment, route))
            })
            .collect()
    }

    async fn list_stale_unconfirmed(
        &self,
        org_id: OrgId,
        now: DateTime<Utc>,
    ) -> anyhow::Result<Vec<Assignment>> {
        // Deadline comparison happens in the lifecycle crate (it needs the
        // per-assignment route's tenant-zone deadline, which isn't a plain
        // column comparison); this returns the full not-yet-confirmed set
        // for the org so the caller can filter per assignment.
        let _ = now;
        let rows = sqlx::query(
            "SELECT a.* FROM assignments a JOIN warehouses w ON w.id = a.warehouse_id \
             WHERE w.org_id = ? AND a.status = 'scheduled' AND a.confirmed_at IS NULL",
        )
        .bind(org_id.0.to_string())
        .fetch_all(&*self.db.pool)
        .await?;
        rows.iter().map(row_to_assignment).collect()
    }

    async fn list_todays_scheduled_not_started(
        &self,
        org_id: OrgId,
        today: NaiveDate,
    ) -> anyhow::Result<Vec<Assignment>> {
        let rows = sqlx::query(
            "SELECT a.* FROM assignments a JOIN warehouses w ON w.id = a.warehouse_id \
             WHERE w.org_id = ? AND a.date = ? AND a.status = 'scheduled'",
        )
        .bind(org_id.0.to_string())
        .bind(today.format("%Y-%m-%d").to_string())
        .fetch_all(&*self.db.pool)
        .await?;
        rows.iter().map(row_to_assignment).collect()
    }

    async fn list_other_active_today(
        &self,
        org_id: OrgId,
        today: NaiveDate,
        excluding_assignment: AssignmentId,
    ) -> anyhow::Result<Vec<UserId>> {
        let rows = sqlx::query(
            "SELECT DISTINCT a.user_id FROM assignments a JOIN warehouses w ON w.id = a.warehouse_id \
             WHERE w.org_id = ? AND a.date = ? AND a.status IN ('scheduled','active') \
               AND a.id != ? AND a.user_id IS NOT NULL",
        )
        .bind(org_id.0.to_string())
        .bind(today.format("%Y-%m-%d").to_string())
        .bind(excluding_assignment.0.to_string())
        .fetch_all(&*self.db.pool)
        .await?;
        rows.iter()
            .map(|r| Ok(UserId(parse_uuid(r.try_get("user_id")?)?)))
            .collect()
    }

    async fn create_bid_window(
        &self,
        new: NewBidWindow,
    ) -> anyhow::Result<CreateBidWindowOutcome> {
        let id = BidWindowId::new();
        let mode = match new.mode {
            domain::bidding::BidWindowMode::Competitive => "competitive",
            domain::bidding::BidWindowMode::Instant => "instant",
            domain::bidding::BidWindowMode::Emergency => "emergency",
        };
        let trigger = match new.trigger {
            domain::bidding::BidWindowTrigger::Cancellation => "cancellation",
            domain::bidding::BidWindowTrigger::AutoDrop => "auto_drop",
            domain::bidding::BidWindowTrigger::NoShow => "no_show",
            domain::bidding::BidWindowTrigger::Manager => "manager",
        };
        let result = sqlx::query(
            "INSERT INTO bid_windows \
             (id, assignment_id, mode, trigger, pay_bonus_percent, opens_at, closes_at, status) \
             VALUES (?, ?, ?, ?, ?, ?, ?, 'open')",
        )
        .bind(id.0.to_string())
        .bind(new.assignment_id.0.to_string())
        .bind(mode)
        .bind(trigger)
        .bind(new.pay_bonus_percent as i64)
        .bind(to_rfc3339(new.opens_at))
        .bind(to_rfc3339(new.closes_at))
        .execute(&*self.db.pool)
        .await;

        match result {
            Ok(_) => Ok(CreateBidWindowOutcome::Created(id)),
            Err(e) => match classify_sql_error(e, &[OPEN_BID_WINDOW_PER_ASSIGNMENT]) {
                crate::error::StoreError::Unique(_) => Ok(CreateBidWindowOutcome::AlreadyExists),
                other => Err(other.into()),
            },
        }
    }

    async fn get_bid_window(
        &self,
        id: BidWindowId,
        org_id: Option<OrgId>,
    ) -> anyhow::Result<Option<(BidWindow, Assignment)>> {
        let row = sqlx::query("SELECT * FROM bid_windows WHERE id = ?")
            .bind(id.0.to_string())
            .fetch_optional(&*self.db.pool)
            .await?;
        let window = match row.as_ref().map(row_to_bid_window).transpose()? {
            Some(w) => w,
            None => return Ok(None),
        };
        let assignment = self.get_assignment(window.assignment_id, org_id).await?;
        Ok(assignment.map(|a| (window, a)))
    }

    async fn list_pending_bids(&self, window_id: BidWindowId) -> anyhow::Result<Vec<Bid>> {
        let rows = sqlx::query("SELECT * FROM bids WHERE bid_window_id = ? AND status = 'pending'")
            .bind(window_id.0.to_string())
            .fetch_all(&*self.db.pool)
            .await?;
        rows.iter().map(row_to_bid).collect()
    }

    async fn place_bid(
        &self,
        window_id: BidWindowId,
        user_id: UserId,
        now: DateTime<Utc>,
    ) -> anyhow::Result<Bid> {
        let existing = sqlx::query(
            "SELECT * FROM bids WHERE bid_window_id = ? AND user_id = ? AND status = 'pending'",
        )
        .bind(window_id.0.to_string())
        .bind(user_id.0.to_string())
        .fetch_optional(&*self.db.pool)
        .await?;
        if let Some(row) = existing {
            return row_to_bid(&row);
        }
        let id = BidId::new();
        sqlx::query(
            "INSERT INTO bids (id, bid_window_id, user_id, bid_at, status) VALUES (?, ?, ?, ?, 'pending')",
        )
        .bind(id.0.to_string())
        .bind(window_id.0.to_string())
        .bind(user_id.0.to_string())
        .bind(to_rfc3339(now))
        .execute(&*self.db.pool)
        .await?;
        Ok(Bid {
            id,
            bid_window_id: window_id,
            user_id,
            score: None,
            bid_at: now,
            status: BidStatus::Pending,
            resolved_at: None,
        })
    }

    async fn resolve_bid_window(
        &self,
        window_id: BidWindowId,
        scored_candidates: &[ScoredBid],
        now: DateTime<Utc>,
    ) -> anyhow::Result<ResolveOutcome> {
        let mut tx = self.db.pool.begin().await?;
        let window_row = sqlx::query("SELECT * FROM bid_windows WHERE id = ?")
            .bind(window_id.0.to_string())
            .fetch_optional(&mut *tx)
            .await?;
        let window = match window_row.as_ref().map(row_to_bid_window).transpose()? {
            Some(w) => w,
            None => return Ok(ResolveOutcome::NotOpen),
        };
        if window.status != domain::bidding::BidWindowStatus::Open {
            return Ok(ResolveOutcome::NotOpen);
        }

        let assignment_row = sqlx::query("SELECT * FROM assignments WHERE id = ?")
            .bind(window.assignment_id.0.to_string())
            .fetch_optional(&mut *tx)
            .await?;
        let assignment = match assignment_row.as_ref().map(row_to_assignment).transpose()? {
            Some(a) => a,
            None => return Ok(ResolveOutcome::NotOpen),
        };

        for candidate in scored_candidates {
            let update_result = sqlx::query(
                "UPDATE assignments SET user_id = ?, status = 'scheduled', assigned_by = 'bid', assigned_at = ? \
                 WHERE id = ?",
            )
            .bind(candidate.user_id.0.to_string())
            .bind(to_rfc3339(now))
            .bind(assignment.id.0.to_string())
            .execute(&mut *tx)
            .await;

            match update_result {
                Ok(_) => {
                    sqlx::query(
                        "UPDATE bid_windows SET status = 'resolved', winner_id = ? WHERE id = ?",
                    )
                    .bind(candidate.user_id.0.to_string())
                    .bind(window_id.0.to_string())
                    .execute(&mut *tx)
                    .await?;

                    sqlx::query(
                        "UPDATE bids SET status = 'won', score = ?, resolved_at = ? \
                         WHERE id = ?",
                    )
                    .bind(candidate.score)
                    .bind(to_rfc3339(now))
                    .bind(candidate.bid_id.0.to_string())
                    .execute(&mut *tx)
                    .await?;

                    sqlx::query(
                        "UPDATE bids SET status = 'lost', resolved_at = ? \
                         WHERE bid_window_id = ? AND status = 'pending' AND id != ?",
                    )
                    .bind(to_rfc3339(now))
                    .bind(window_id.0.to_string())
                    .bind(candidate.bid_id.0.to_string())
                    .execute(&mut *tx)
                    .await?;

                    tx.commit().await?;
                    return Ok(ResolveOutcome::Resolved {
                        winner: candidate.user_id,
                    });
                }
                Err(e) => {
                    let classified = classify_sql_error(e, &[ACTIVE_ASSIGNMENT_PER_USER_DATE]);
                    if matches!(classified, crate::error::StoreError::Unique(_)) {
                        // this candidate conflicted; try the next one.
                        continue;
                    }
                    return Err(classified.into());
                }
            }
        }

        tx.rollback().await?;
        Ok(ResolveOutcome::AllConflicted)
    }

    async fn close_without_winner(&self, window_id: BidWindowId) -> anyhow::Result<()> {
        sqlx::query("UPDATE bid_windows SET status = 'closed' WHERE id = ? AND status = 'open'")
            .bind(window_id.0.to_string())
            .execute(&*self.db.pool)
            .await?;
        Ok(())
    }

    async fn transition_to_instant(
        &self,
        window_id: BidWindowId,
        now: DateTime<Utc>,
        new_closes_at: DateTime<Utc>,
    ) -> anyhow::Result<TransitionOutcome> {
        let _ = now;
        let result = sqlx::query(
            "UPDATE bid_windows SET mode = 'instant', closes_at = ? \
             WHERE id = ? AND status = 'open' AND mode = 'competitive'",
        )
        .bind(to_rfc3339(new_closes_at))
        .bind(window_id.0.to_string())
        .execute(&*self.db.pool)
        .await?;
        if result.rows_affected() > 0 {
            Ok(TransitionOutcome::Transitioned)
        } else {
            Ok(TransitionOutcome::Refused)
        }
    }

    async fn instant_assign(
        &self,
        window_id: BidWindowId,
        user_id: UserId,
        now: DateTime<Utc>,
    ) -> anyhow::Result<InstantAssignOutcome> {
        let mut tx = self.db.pool.begin().await?;
        let window_row = sqlx::query("SELECT * FROM bid_windows WHERE id = ?")
            .bind(window_id.0.to_string())
            .fetch_optional(&mut *tx)
            .await?;
        let window = match window_row.as_ref().map(row_to_bid_window).transpose()? {
            Some(w) if w.status == domain::bidding::BidWindowStatus::Open => w,
            _ => return Ok(InstantAssignOutcome::WindowNotOpen),
        };

        let update_result = sqlx::query(
            "UPDATE assignments SET user_id = ?, status = 'scheduled', assigned_by = 'bid', assigned_at = ? \
             WHERE id = ?",
        )
        .bind(user_id.0.to_string())
        .bind(to_rfc3339(now))
        .bind(window.assignment_id.0.to_string())
        .execute(&mut *tx)
        .await;

        if let Err(e) = update_result {
            let classified = classify_sql_error(e, &[ACTIVE_ASSIGNMENT_PER_USER_DATE]);
            if matches!(classified, crate::error::StoreError::Unique(_)) {
                tx.rollback().await?;
                return Ok(InstantAssignOutcome::AlreadyHasShiftThatDate);
            }
            return Err(classified.into());
        }

        let bid_id = BidId::new();
        sqlx::query(
            "INSERT INTO bids (id, bid_window_id, user_id, bid_at, status, resolved_at) \
             VALUES (?, ?, ?, ?, 'won', ?)",
        )
        .bind(bid_id.0.to_string())
        .bind(window_id.0.to_string())
        .bind(user_id.0.to_string())
        .bind(to_rfc3339(now))
        .bind(to_rfc3339(now))
        .execute(&mut *tx)
        .await?;

        sqlx::query("UPDATE bid_windows SET status = 'resolved', winner_id = ? WHERE id = ?")
            .bind(user_id.0.to_string())
            .bind(window_id.0.to_string())
            .execute(&mut *tx)
            .await?;

        sqlx::query(
            "UPDATE bids SET status = 'lost', resolved_at = ? \
             WHERE bid_window_id = ? AND status = 'pending' AND id != ?",
        )
        .bind(to_rfc3339(now))
        .bind(window_id.0.to_string())
        .bind(bid_id.0.to_string())
        .execute(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM shifts WHERE assignment_id = ? AND completed_at IS NULL")
            .bind(window.assignment_id.0.to_string())
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(InstantAssignOutcome::Assigned)
    }

    async fn manual_assign(
        &self,
        assignment_id: AssignmentId,
        user_id: UserId,
        now: DateTime<Utc>,
    ) -> anyhow::Result<()> {
        let mut tx = self.db.pool.begin().await?;
        sqlx::query(
            "UPDATE assignments SET user_id = ?, status = 'scheduled', assigned_by = 'manager', assigned_at = ? \
             WHERE id = ?",
        )
        .bind(user_id.0.to_string())
        .bind(to_rfc3339(now))
        .bind(assignment_id.0.to_string())
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            "UPDATE bid_windows SET status = 'resolved', winner_id = NULL \
             WHERE assignment_id = ? AND status = 'open'",
        )
        .bind(assignment_id.0.to_string())
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            "UPDATE bids SET status = 'lost', resolved_at = ? \
             WHERE bid_window_id IN (SELECT id FROM bid_windows WHERE assignment_id = ?) \
               AND status = 'pending'",
        )
        .bind(to_rfc3339(now))
        .bind(assignment_id.0.to_string())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn get_expired_bid_windows(
        &self,
        org_id: OrgId,
        now: DateTime<Utc>,
    ) -> anyhow::Result<Vec<BidWindowId>> {
        let rows = sqlx::query(
            "SELECT bw.id FROM bid_windows bw \
             JOIN assignments a ON a.id = bw.assignment_id \
             JOIN warehouses w ON w.id = a.warehouse_id \
             WHERE w.org_id = ? AND bw.status = 'open' AND bw.closes_at <= ?",
        )
        .bind(org_id.0.to_string())
        .bind(to_rfc3339(now))
        .fetch_all(&*self.db.pool)
        .await?;
        rows.iter()
            .map(|r| Ok(BidWindowId(parse_uuid(r.try_get("id")?)?)))
            .collect()
    }

    async fn get_health_state(&self, user_id: UserId) -> anyhow::Result<DriverHealthState> {
        let row = sqlx::query("SELECT * FROM driver_health_state WHERE user_id = ?")
            .bind(user_id.0.to_string())
            .fetch_optional(&*self.db.pool)
            .await?;
        match row {
            Some(r) => row_to_health_state(&r),
            None => Ok(DriverHealthState::new(user_id)),
        }
    }

    async fn update_health_state_guarded(
        &self,
        user_id: UserId,
        expected_last_reset_at: Option<DateTime<Utc>>,
        new_state: DriverHealthState,
    ) -> anyhow::Result<bool> {
        // Row-lock + re-read `lastScoreResetAt`, abort (retryable) if it
        // changed mid-evaluation.
        let mut tx = self.db.pool.begin().await?;
        let current = sqlx::query("SELECT last_score_reset_at FROM driver_health_state WHERE user_id = ?")
            .bind(user_id.0.to_string())
            .fetch_optional(&mut *tx)
            .await?;
        let current_reset_at = current
            .map(|r| r.try_get::<Option<String>, _>("last_score_reset_at"))
            .transpose()?
            .flatten()
            .map(|s| DateTime::parse_from_rfc3339(&s).map(|d| d.with_timezone(&Utc)))
            .transpose()?;
        if current_reset_at != expected_last_reset_at {
            tx.rollback().await?;
            return Ok(false);
        }

        sqlx::query(
            "INSERT INTO driver_health_state \
             (user_id, current_score, stars, streak_weeks, last_qualified_week_start, \
              next_milestone_stars, assignment_pool_eligible, requires_manager_intervention, \
              last_score_reset_at, reinstated_at, last_corrective_warning_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?) \
             ON CONFLICT(user_id) DO UPDATE SET \
              current_score=excluded.current_score, stars=excluded.stars, \
              streak_weeks=excluded.streak_weeks, \
              last_qualified_week_start=excluded.last_qualified_week_start, \
              next_milestone_stars=excluded.next_milestone_stars, \
              assignment_pool_eligible=excluded.assignment_pool_eligible, \
              requires_manager_intervention=excluded.requires_manager_intervention, \
              last_score_reset_at=excluded.last_score_reset_at, \
              reinstated_at=excluded.reinstated_at, \
              last_corrective_warning_at=excluded.last_corrective_warning_at",
        )
        .bind(user_id.0.to_string())
        .bind(new_state.current_score)
        .bind(new_state.stars as i64)
        .bind(new_state.streak_weeks as i64)
        .bind(new_state.last_qualified_week_start.map(|d| d.format("%Y-%m-%d").to_string()))
        .bind(new_state.next_milestone_stars as i64)
        .bind(new_state.assignment_pool_eligible as i64)
        .bind(new_state.requires_manager_intervention as i64)
        .bind(opt_to_rfc3339(new_state.last_score_reset_at))
        .bind(opt_to_rfc3339(new_state.reinstated_at))
        .bind(opt_to_rfc3339(new_state.last_corrective_warning_at))
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(true)
    }

    async fn reset_health_on_no_show(
        &self,
        user_id: UserId,
        now: DateTime<Utc>,
    ) -> anyhow::Result<()> {
        sqlx::query(
            "INSERT INTO driver_health_state \
             (user_id, current_score, stars, streak_weeks, assignment_pool_eligible, \
              requires_manager_intervention, last_score_reset_at) \
             VALUES (?, 0, 0, 0, 0, 1, ?) \
             ON CONFLICT(user_id) DO UPDATE SET \
              current_score=0, stars=0, streak_weeks=0, assignment_pool_eligible=0, \
              requires_manager_intervention=1, last_score_reset_at=excluded.last_score_reset_at",
        )
        .bind(user_id.0.to_string())
        .bind(to_rfc3339(now))
        .execute(&*self.db.pool)
        .await?;
        Ok(())
    }

    async fn upsert_health_snapshot(&self, snapshot: DriverHealthSnapshot) -> anyhow::Result<()> {
        sqlx::query(
            "INSERT INTO driver_health_snapshots \
             (user_id, evaluated_at, score, hard_stop_triggered, reasons, contributions) \
             VALUES (?, ?, ?, ?, ?, ?) \
             ON CONFLICT(user_id, evaluated_at) DO UPDATE SET \
              score=excluded.score, hard_stop_triggered=excluded.hard_stop_triggered, \
              reasons=excluded.reasons, contributions=excluded.contributions",
        )
        .bind(snapshot.user_id.0.to_string())
        .bind(snapshot.evaluated_at.format("%Y-%m-%d").to_string())
        .bind(snapshot.score)
        .bind(snapshot.hard_stop_triggered as i64)
        .bind(serde_json::to_string(&snapshot.reasons)?)
        .bind(snapshot.contributions.to_string())
        .execute(&*self.db.pool)
        .await?;
        Ok(())
    }

    async fn list_driver_ids_with_shifts(&self, org_id: OrgId) -> anyhow::Result<Vec<UserId>> {
        let rows = sqlx::query(
            "SELECT id FROM drivers d WHERE d.org_id = ? \
             AND EXISTS (SELECT 1 FROM driver_metrics m WHERE m.user_id = d.id AND m.total_shifts >= 1)",
        )
        .bind(org_id.0.to_string())
        .fetch_all(&*self.db.pool)
        .await?;
        rows.iter()
            .map(|r| Ok(UserId(parse_uuid(r.try_get("id")?)?)))
            .collect()
    }

    async fn insert_notification(&self, notification: Notification) -> anyhow::Result<()> {
        // `INSERT OR IGNORE` makes a repeat call with the same
        // `(org_id, recipient_user_id, dedupe_key)` a silent no-op instead
        // of a unique-violation error, so callers can retry a reminder job
        // without tracking what already went out.
        sqlx::query(
            "INSERT OR IGNORE INTO notifications \
             (id, org_id, recipient_user_id, kind, title, body, data, dedupe_key, created_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(notification.id.0.to_string())
        .bind(notification.org_id.0.to_string())
        .bind(notification.recipient_user_id.0.to_string())
        .bind(serde_json::to_string(&notification.kind)?)
        .bind(notification.title)
        .bind(notification.body)
        .bind(notification.data.to_string())
        .bind(notification.dedupe_key)
        .bind(to_rfc3339(notification.created_at))
        .execute(&*self.db.pool)
        .await?;
        Ok(())
    }

    async fn record_audit(
        &self,
        entity_type: &str,
        entity_id: String,
        action: &str,
        actor_type: ActorType,
        actor_id: Option<UserId>,
        changes: Value,
        now: DateTime<Utc>,
    ) -> anyhow::Result<()> {
        let actor_type_str = match actor_type {
            ActorType::User => "user",
            ActorType::System => "system",
        };
        sqlx::query(
            "INSERT INTO audit_logs \
             (id, entity_type, entity_id, action, actor_type, actor_id, changes, created_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(Uuid::new_v4().to_string())
        .bind(entity_type)
        .bind(entity_id)
        .bind(action)
        .bind(actor_type_str)
        .bind(actor_id.map(|u| u.0.to_string()))
        .bind(changes.to_string())
        .bind(to_rfc3339(now))
        .execute(&*self.db.pool)
        .await?;
        Ok(())
    }
}

use chrono::{DateTime, NaiveDate, Utc};
use domain::assignment::{AssignedBy, Assignment, AssignmentStatus, CancelType, Shift};
use domain::bidding::{Bid, BidStatus, BidWindow, BidWindowMode, BidWindowStatus, BidWindowTrigger};
use domain::driver::{Driver, DriverMetrics, DriverPreferences, RouteCompletion};
use domain::health::DriverHealthState;
use domain::ids::*;
use domain::route::Route;
use sqlx::any::AnyRow;
use sqlx::Row;

pub fn parse_uuid(s: &str) -> anyhow::Result<uuid::Uuid> {
    Ok(uuid::Uuid::parse_str(s)?)
}

fn parse_instant(s: &str) -> anyhow::Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(s)?.with_timezone(&Utc))
}

fn parse_opt_instant(s: Option<String>) -> anyhow::Result<Option<DateTime<Utc>>> {
    s.map(|s| parse_instant(&s)).transpose()
}

fn parse_date(s: &str) -> anyhow::Result<NaiveDate> {
    Ok(NaiveDate::parse_from_str(s, "%Y-%m-%d")?)
}

pub fn row_to_route(row: &AnyRow) -> anyhow::Result<Route> {
    Ok(Route {
        id: RouteId(parse_uuid(row.try_get("id")?)?),
        warehouse_id: WarehouseId(parse_uuid(row.try_get("warehouse_id")?)?),
        name: row.try_get("name")?,
        start_time: row.try_get("start_time")?,
        primary_manager_id: row
            .try_get::<Option<String>, _>("primary_manager_id")?
            .map(|s| parse_uuid(&s))
            .transpose()?
            .map(UserId),
    })
}

pub fn row_to_driver(row: &AnyRow) -> anyhow::Result<Driver> {
    Ok(Driver {
        id: UserId(parse_uuid(row.try_get("id")?)?),
        org_id: OrgId(parse_uuid(row.try_get("org_id")?)?),
        weekly_cap: row.try_get::<i64, _>("weekly_cap")? as i32,
        is_flagged: row.try_get::<i64, _>("is_flagged")? != 0,
        flag_warning_date: parse_opt_instant(row.try_get("flag_warning_date")?)?,
        preferred_locale: row.try_get("preferred_locale")?,
        fcm_token: row.try_get("fcm_token")?,
        created_at: parse_instant(row.try_get::<String, _>("created_at")?.as_str())?,
    })
}

pub fn row_to_driver_preferences(row: &AnyRow) -> anyhow::Result<DriverPreferences> {
    let days_raw: String = row.try_get("preferred_days")?;
    let routes_raw: String = row.try_get("preferred_routes")?;
    let preferred_days = days_raw
        .split(',')
        .filter(|s| !s.is_empty())
        .map(|s| s.parse::<u32>())
        .collect::<Result<Vec<_>, _>>()?;
    let preferred_routes = routes_raw
        .split(',')
        .filter(|s| !s.is_empty())
        .map(|s| parse_uuid(s).map(RouteId))
        .collect::<anyhow::Result<Vec<_>>>()?;
    Ok(DriverPreferences {
        user_id: UserId(parse_uuid(row.try_get("user_id")?)?),
        preferred_days,
        preferred_routes,
    })
}

pub fn row_to_driver_metrics(row: &AnyRow) -> anyhow::Result<DriverMetrics> {
    Ok(DriverMetrics {
        total_shifts: row.try_get("total_shifts")?,
        completed_shifts: row.try_get("completed_shifts")?,
        attendance_rate: row.try_get("attendance_rate")?,
        completion_rate: row.try_get("completion_rate")?,
        avg_parcels_delivered: row.try_get("avg_parcels_delivered")?,
        no_shows: row.try_get("no_shows")?,
        bid_pickups: row.try_get("bid_pickups")?,
        urgent_pickups: row.try_get("urgent_pickups")?,
        confirmed_shifts: row.try_get("confirmed_shifts")?,
        arrived_on_time_shifts: row.try_get("arrived_on_time_shifts")?,
        high_delivery_shifts: row.try_get("high_delivery_shifts")?,
        auto_drops: row.try_get("auto_drops")?,
        late_cancels: row.try_get("late_cancels")?,
    })
}

pub fn row_to_route_completion(row: &AnyRow) -> anyhow::Result<RouteCompletion> {
    Ok(RouteCompletion {
        user_id: UserId(parse_uuid(row.try_get("user_id")?)?),
        route_id: RouteId(parse_uuid(row.try_get("route_id")?)?),
        completion_count: row.try_get("completion_count")?,
        last_completed_at: parse_opt_instant(row.try_get("last_completed_at")?)?,
    })
}

pub fn row_to_assignment(row: &AnyRow) -> anyhow::Result<Assignment> {
    let status_raw: String = row.try_get("status")?;
    let status = match status_raw.as_str() {
        "scheduled" => AssignmentStatus::Scheduled,
        "active" => AssignmentStatus::Active,
        "completed" => AssignmentStatus::Completed,
        "cancelled" => AssignmentStatus::Cancelled,
        "unfilled" => AssignmentStatus::Unfilled,
        other => anyhow::bail!("unknown assignment status {other}"),
    };
    let cancel_type = row
        .try_get::<Option<String>, _>("cancel_type")?
        .map(|s| match s.as_str() {
            "early" => Ok(CancelType::Early),
            "late" => Ok(CancelType::Late),
            "auto_drop" => Ok(CancelType::AutoDrop),
            other => anyhow::bail!("unknown cancel type {other}"),
        })
        .transpose()?;
    let assigned_by = row
        .try_get::<Option<String>, _>("assigned_by")?
        .map(|s| match s.as_str() {
            "algorithm" => Ok(AssignedBy::Algorithm),
            "manager" => Ok(AssignedBy::Manager),
            "bid" => Ok(AssignedBy::Bid),
            other => anyhow::bail!("unknown assigned_by {other}"),
        })
        .transpose()?;
    Ok(Assignment {
        id: AssignmentId(parse_uuid(row.try_get("id")?)?),
        warehouse_id: WarehouseId(parse_uuid(row.try_get("warehouse_id")?)?),
        route_id: RouteId(parse_uuid(row.try_get("route_id")?)?),
        date: parse_date(row.try_get::<String, _>("date")?.as_str())?,
        user_id: row
            .try_get::<Option<String>, _>("user_id")?
            .map(|s| parse_uuid(&s))
            .transpose()?
            .map(UserId),
        status,
        confirmed_at: parse_opt_instant(row.try_get("confirmed_at")?)?,
        cancelled_at: parse_opt_instant(row.try_get("cancelled_at")?)?,
        cancel_type,
        assigned_by,
        assigned_at: parse_opt_instant(row.try_get("assigned_at")?)?,
    })
}

pub fn row_to_shift(row: &AnyRow) -> anyhow::Result<Shift> {
    Ok(Shift {
        arrived_at: parse_opt_instant(row.try_get("arrived_at")?)?,
        started_at: parse_opt_instant(row.try_get("started_at")?)?,
        completed_at: parse_opt_instant(row.try_get("completed_at")?)?,
        parcels_start: row.try_get("parcels_start")?,
        parcels_delivered: row.try_get("parcels_delivered")?,
        parcels_returned: row.try_get("parcels_returned")?,
        excepted_returns: row.try_get("excepted_returns")?,
        exception_notes: row.try_get("exception_notes")?,
    })
}

pub fn row_to_bid_window(row: &AnyRow) -> anyhow::Result<BidWindow> {
    let mode = match row.try_get::<String, _>("mode")?.as_str() {
        "competitive" => BidWindowMode::Competitive,
        "instant" => BidWindowMode::Instant,
        "emergency" => BidWindowMode::Emergency,
        other => anyhow::bail!("unknown bid window mode {other}"),
    };
    let trigger = match row.try_get::<String, _>("trigger")?.as_str() {
        "cancellation" => BidWindowTrigger::Cancellation,
        "auto_drop" => BidWindowTrigger::AutoDrop,
        "no_show" => BidWindowTrigger::NoShow,
        "manager" => BidWindowTrigger::Manager,
        other => anyhow::bail!("unknown bid window trigger {other}"),
    };
    let status = match row.try_get::<String, _>("status")?.as_str() {
        "open" => BidWindowStatus::Open,
        "resolved" => BidWindowStatus::Resolved,
        "closed" => BidWindowStatus::Closed,
        other => anyhow::bail!("unknown bid window status {other}"),
    };
    Ok(BidWindow {
        id: BidWindowId(parse_uuid(row.try_get("id")?)?),
        assignment_id: AssignmentId(parse_uuid(row.try_get("assignment_id")?)?),
        mode,
        trigger,
        pay_bonus_percent: row.try_get::<i64, _>("pay_bonus_percent")? as i32,
        opens_at: parse_instant(row.try_get::<String, _>("opens_at")?.as_str())?,
        closes_at: parse_instant(row.try_get::<String, _>("closes_at")?.as_str())?,
        status,
        winner_id: row
            .try_get::<Option<String>, _>("winner_id")?
            .map(|s| parse_uuid(&s))
            .transpose()?
            .map(UserId),
    })
}

pub fn row_to_bid(row: &AnyRow) -> anyhow::Result<Bid> {
    let status = match row.try_get::<String, _>("status")?.as_str() {
        "pending" => BidStatus::Pending,
        "won" => BidStatus::Won,
        "lost" => BidStatus::Lost,
        other => anyhow::bail!("unknown bid status {other}"),
    };
    Ok(Bid {
        id: BidId(parse_uuid(row.try_get("id")?)?),
        bid_window_id: BidWindowId(parse_uuid(row.try_get("bid_window_id")?)?),
        user_id: UserId(parse_uuid(row.try_get("user_id")?)?),
        score: row.try_get("score")?,
        bid_at: parse_instant(row.try_get::<String, _>("bid_at")?.as_str())?,
        status,
        resolved_at: parse_opt_instant(row.try_get("resolved_at")?)?,
    })
}

pub fn row_to_health_state(row: &AnyRow) -> anyhow::Result<DriverHealthState> {
    Ok(DriverHealthState {
        user_id: UserId(parse_uuid(row.try_get("user_id")?)?),
        current_score: row.try_get("current_score")?,
        stars: row.try_get::<i64, _>("stars")? as i32,
        streak_weeks: row.try_get::<i64, _>("streak_weeks")? as i32,
        last_qualified_week_start: row
            .try_get::<Option<String>, _>("last_qualified_week_start")?
            .map(|s| parse_date(&s))
            .transpose()?,
        next_milestone_stars: row.try_get::<i64, _>("next_milestone_stars")? as i32,
        assignment_pool_eligible: row.try_get::<i64, _>("assignment_pool_eligible")? != 0,
        requires_manager_intervention: row.try_get::<i64, _>("requires_manager_intervention")?
            != 0,
        last_score_reset_at: parse_opt_instant(row.try_get("last_score_reset_at")?)?,
        reinstated_at: parse_opt_instant(row.try_get("reinstated_at")?)?,
        last_corrective_warning_at: parse_opt_instant(row.try_get("last_corrective_warning_at")?)?,
    })
}

pub fn to_rfc3339(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339()
}

pub fn opt_to_rfc3339(dt: Option<DateTime<Utc>>) -> Option<String> {
    dt.map(to_rfc3339)
}

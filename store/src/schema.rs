/// Raw DDL for the persisted state layout. Driver-agnostic (works on
/// both sqlite and postgres via `sqlx::AnyPool`) the same way this
/// codebase's `db::schema` module keeps its `CREATE TABLE IF NOT EXISTS`
/// statements plain SQL rather than a migration-framework DSL.
pub const STATEMENTS: &[&str] = &[
    r#"CREATE TABLE IF NOT EXISTS organizations (
        id TEXT PRIMARY KEY,
        name TEXT NOT NULL,
        created_at TEXT NOT NULL
    )"#,
    r#"CREATE TABLE IF NOT EXISTS warehouses (
        id TEXT PRIMARY KEY,
        org_id TEXT NOT NULL,
        name TEXT NOT NULL,
        timezone TEXT NOT NULL
    )"#,
    r#"CREATE TABLE IF NOT EXISTS users (
        id TEXT PRIMARY KEY,
        org_id TEXT NOT NULL,
        role TEXT NOT NULL,
        display_name TEXT NOT NULL,
        email TEXT NOT NULL,
        created_at TEXT NOT NULL
    )"#,
    r#"CREATE TABLE IF NOT EXISTS routes (
        id TEXT PRIMARY KEY,
        warehouse_id TEXT NOT NULL,
        name TEXT NOT NULL,
        start_time TEXT NOT NULL,
        primary_manager_id TEXT
    )"#,
    r#"CREATE TABLE IF NOT EXISTS drivers (
        id TEXT PRIMARY KEY,
        org_id TEXT NOT NULL,
        weekly_cap INTEGER NOT NULL,
        is_flagged INTEGER NOT NULL DEFAULT 0,
        flag_warning_date TEXT,
        preferred_locale TEXT NOT NULL,
        fcm_token TEXT,
        created_at TEXT NOT NULL
    )"#,
    "CREATE INDEX IF NOT EXISTS idx_drivers_org ON drivers(org_id)",
    r#"CREATE TABLE IF NOT EXISTS driver_preferences (
        user_id TEXT PRIMARY KEY,
        preferred_days TEXT NOT NULL,
        preferred_routes TEXT NOT NULL
    )"#,
    r#"CREATE TABLE IF NOT EXISTS driver_metrics (
        user_id TEXT PRIMARY KEY,
        total_shifts INTEGER NOT NULL DEFAULT 0,
        completed_shifts INTEGER NOT NULL DEFAULT 0,
        attendance_rate REAL NOT NULL DEFAULT 0,
        completion_rate REAL NOT NULL DEFAULT 0,
        avg_parcels_delivered REAL NOT NULL DEFAULT 0,
        no_shows INTEGER NOT NULL DEFAULT 0,
        bid_pickups INTEGER NOT NULL DEFAULT 0,
        urgent_pickups INTEGER NOT NULL DEFAULT 0,
        confirmed_shifts INTEGER NOT NULL DEFAULT 0,
        arrived_on_time_shifts INTEGER NOT NULL DEFAULT 0,
        high_delivery_shifts INTEGER NOT NULL DEFAULT 0,
        auto_drops INTEGER NOT NULL DEFAULT 0,
        late_cancels INTEGER NOT NULL DEFAULT 0
    )"#,
    r#"CREATE TABLE IF NOT EXISTS route_completions (
        user_id TEXT NOT NULL,
        route_id TEXT NOT NULL,
        completion_count INTEGER NOT NULL DEFAULT 0,
        last_completed_at TEXT,
        PRIMARY KEY (user_id, route_id)
    )"#,
    r#"CREATE TABLE IF NOT EXISTS assignments (
        id TEXT PRIMARY KEY,
        warehouse_id TEXT NOT NULL,
        route_id TEXT NOT NULL,
        date TEXT NOT NULL,
        user_id TEXT,
        status TEXT NOT NULL,
        confirmed_at TEXT,
        cancelled_at TEXT,
        cancel_type TEXT,
        assigned_by TEXT,
        assigned_at TEXT
    )"#,
    "CREATE UNIQUE INDEX IF NOT EXISTS uq_assignments_active_user_date ON assignments(user_id, date) WHERE status != 'cancelled'",
    "CREATE INDEX IF NOT EXISTS idx_assignments_route_date ON assignments(route_id, date)",
    r#"CREATE TABLE IF NOT EXISTS shifts (
        assignment_id TEXT PRIMARY KEY,
        arrived_at TEXT,
        started_at TEXT,
        completed_at TEXT,
        parcels_start INTEGER,
        parcels_delivered INTEGER,
        parcels_returned INTEGER,
        excepted_returns INTEGER,
        exception_notes TEXT
    )"#,
    r#"CREATE TABLE IF NOT EXISTS bid_windows (
        id TEXT PRIMARY KEY,
        assignment_id TEXT NOT NULL,
        mode TEXT NOT NULL,
        trigger TEXT NOT NULL,
        pay_bonus_percent INTEGER NOT NULL,
        opens_at TEXT NOT NULL,
        closes_at TEXT NOT NULL,
        status TEXT NOT NULL,
        winner_id TEXT
    )"#,
    "CREATE UNIQUE INDEX IF NOT EXISTS uq_bid_windows_open_assignment ON bid_windows(assignment_id) WHERE status = 'open'",
    r#"CREATE TABLE IF NOT EXISTS bids (
        id TEXT PRIMARY KEY,
        bid_window_id TEXT NOT NULL,
        user_id TEXT NOT NULL,
        score REAL,
        bid_at TEXT NOT NULL,
        status TEXT NOT NULL,
        resolved_at TEXT
    )"#,
    r#"CREATE TABLE IF NOT EXISTS driver_health_state (
        user_id TEXT PRIMARY KEY,
        current_score INTEGER NOT NULL DEFAULT 0,
        stars INTEGER NOT NULL DEFAULT 0,
        streak_weeks INTEGER NOT NULL DEFAULT 0,
        last_qualified_week_start TEXT,
        next_milestone_stars INTEGER NOT NULL DEFAULT 1,
        assignment_pool_eligible INTEGER NOT NULL DEFAULT 1,
        requires_manager_intervention INTEGER NOT NULL DEFAULT 0,
        last_score_reset_at TEXT,
        reinstated_at TEXT,
        last_corrective_warning_at TEXT
    )"#,
    r#"CREATE TABLE IF NOT EXISTS driver_health_snapshots (
        user_id TEXT NOT NULL,
        evaluated_at TEXT NOT NULL,
        score INTEGER NOT NULL,
        hard_stop_triggered INTEGER NOT NULL,
        reasons TEXT NOT NULL,
        contributions TEXT NOT NULL,
        PRIMARY KEY (user_id, evaluated_at)
    )"#,
    r#"CREATE TABLE IF NOT EXISTS notifications (
        id TEXT PRIMARY KEY,
        org_id TEXT NOT NULL,
        recipient_user_id TEXT NOT NULL,
        kind TEXT NOT NULL,
        title TEXT NOT NULL,
        body TEXT NOT NULL,
        data TEXT NOT NULL,
        dedupe_key TEXT,
        created_at TEXT NOT NULL,
        read_at TEXT
    )"#,
    r#"CREATE UNIQUE INDEX IF NOT EXISTS uq_notifications_dedupe
        ON notifications(org_id, recipient_user_id, dedupe_key)
        WHERE dedupe_key IS NOT NULL"#,
    r#"CREATE TABLE IF NOT EXISTS audit_logs (
        id TEXT PRIMARY KEY,
        entity_type TEXT NOT NULL,
        entity_id TEXT NOT NULL,
        action TEXT NOT NULL,
        actor_type TEXT NOT NULL,
        actor_id TEXT,
        changes TEXT NOT NULL,
        created_at TEXT NOT NULL
    )"#,
    r#"CREATE TABLE IF NOT EXISTS organization_dispatch_settings (
        org_id TEXT PRIMARY KEY,
        tenant_timezone TEXT,
        shifts_start_hour_local INTEGER,
        confirmation_deadline_hours_before_shift INTEGER,
        bidding_instant_mode_cutoff_hours INTEGER,
        bidding_emergency_bonus_percent INTEGER,
        flagging_grace_period_days INTEGER
    )"#,
];

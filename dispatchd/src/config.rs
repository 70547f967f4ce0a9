use std::str::FromStr;

#[derive(Clone, Debug)]
pub struct AppConfig {
    /// Database connection string.
    pub database_url: String,
    /// Max pooled connections held against `database_url`.
    pub db_max_connections: u32,

    // =========================
    // Logging
    // =========================
    /// Emits structured JSON logs instead of the pretty human format.
    /// Defaults on when `APP_ENV=production`.
    pub log_json: bool,

    // =========================
    // Cron trigger surface
    // =========================
    /// Bearer secret an outer HTTP layer would check before invoking any of
    /// these jobs on demand. No invoker here reads it directly today — the
    /// jobs run on internal interval loops — but startup fails without it so
    /// the value exists before the trigger surface that needs it is wired in.
    pub cron_secret: String,

    /// Calendar zone the interval loops use to compute "today" / "this week"
    /// for schedule generation, reminders, and health evaluation. One zone
    /// for the whole process: organizations spanning multiple zones are a
    /// known limitation, not yet addressed by a per-tenant clock.
    pub dispatch_timezone: chrono_tz::Tz,

    // =========================
    // Cron cadence
    // =========================
    /// How often the weekly schedule generator re-runs (idempotent; cheap to
    /// run more often than once a week).
    pub schedule_generation_interval_secs: u64,
    /// How often expired bid windows are swept and resolved. Kept short:
    /// this is the latency a replacement driver waits to hear they won.
    pub bid_window_interval_secs: u64,
    /// How often today's confirmed-but-unarrived assignments are checked
    /// for no-shows.
    pub no_show_interval_secs: u64,
    /// How often today's scheduled assignments are reminded. Idempotent via
    /// the per-day dedupe key, so a shorter interval just means a tighter
    /// reminder-send latency, not duplicate sends.
    pub reminder_interval_secs: u64,
    /// How often unconfirmed assignments past the confirmation deadline are
    /// auto-dropped and rebid.
    pub auto_drop_interval_secs: u64,
    /// How often the daily health/flagging batch runs.
    pub daily_health_interval_secs: u64,
    /// How often the weekly streak/star batch runs. Coarse: running this more
    /// than once a day is wasted work since `run_weekly_for_driver` only
    /// changes state once per `week_start`.
    pub weekly_health_interval_secs: u64,

    // =========================
    // Notifier transport
    // =========================
    /// Push transport endpoint. Unset falls back to a logging-only
    /// transport, matching this codebase's pattern of a safe no-op default
    /// for environments without push configured.
    pub push_endpoint: Option<String>,
    pub push_api_key: String,
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url =
            std::env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite://dispatchd_dev.db".to_string());

        let is_production = std::env::var("APP_ENV").unwrap_or_default() == "production";
        let log_json = std::env::var("LOG_JSON")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(is_production);

        let cron_secret = std::env::var("CRON_SECRET")
            .map_err(|_| anyhow::anyhow!("CRON_SECRET must be set; refusing to start without it"))?;

        let dispatch_timezone = std::env::var("DISPATCH_TIMEZONE")
            .ok()
            .and_then(|v| v.parse::<chrono_tz::Tz>().ok())
            .unwrap_or(chrono_tz::UTC);

        Ok(Self {
            database_url,
            db_max_connections: env_or("DB_MAX_CONNECTIONS", 10),

            log_json,

            cron_secret,
            dispatch_timezone,

            // Cadence defaults: fast loops for the driver-facing latency path
            // (bid windows, no-shows, reminders, auto-drop), slow loops for
            // the batch scoring passes.
            schedule_generation_interval_secs: env_or("SCHEDULE_GENERATION_INTERVAL_SECS", 3_600),
            bid_window_interval_secs: env_or("BID_WINDOW_INTERVAL_SECS", 60),
            no_show_interval_secs: env_or("NO_SHOW_INTERVAL_SECS", 300),
            reminder_interval_secs: env_or("REMINDER_INTERVAL_SECS", 900),
            auto_drop_interval_secs: env_or("AUTO_DROP_INTERVAL_SECS", 300),
            daily_health_interval_secs: env_or("DAILY_HEALTH_INTERVAL_SECS", 3_600),
            weekly_health_interval_secs: env_or("WEEKLY_HEALTH_INTERVAL_SECS", 21_600),

            push_endpoint: std::env::var("PUSH_ENDPOINT").ok(),
            push_api_key: std::env::var("PUSH_API_KEY").unwrap_or_default(),
        })
    }
}

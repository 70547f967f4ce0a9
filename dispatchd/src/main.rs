mod config;

use std::sync::Arc;
use std::time::Duration;

use broadcaster::Broadcaster;
use chrono::{NaiveDate, Utc};
use common::logger::init_tracing;
use common::policy::DispatchPolicy;
use common::SystemClock;
use cron::scheduler::spawn_interval_job;
use cron::CronJobs;
use notifier::transport::{HttpPushTransport, LoggingPushTransport, PushTransport};
use notifier::Notifier;
use store::{Db, SqlxStore, Store};

use config::AppConfig;

/// Connects, runs every `schema::STATEMENTS` migration, and wraps the pool
/// in the `sqlx`-backed `Store` impl.
async fn init_store(cfg: &AppConfig) -> anyhow::Result<Arc<dyn Store>> {
    let db = Db::connect(&cfg.database_url, cfg.db_max_connections).await?;
    db.migrate().await?;
    Ok(Arc::new(SqlxStore::new(db)))
}

fn init_push_transport(cfg: &AppConfig) -> Arc<dyn PushTransport> {
    match &cfg.push_endpoint {
        Some(endpoint) => Arc::new(HttpPushTransport::new(endpoint.clone(), cfg.push_api_key.clone())),
        None => {
            tracing::warn!("PUSH_ENDPOINT not set; push notifications will only be logged");
            Arc::new(LoggingPushTransport)
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cfg = AppConfig::from_env()?;
    init_tracing("dispatchd", cfg.log_json);

    tracing::info!("Starting dispatchd...");

    let zone = cfg.dispatch_timezone;

    let store = init_store(&cfg).await?;
    let notifier = Arc::new(Notifier::new(store.clone(), init_push_transport(&cfg)));
    let broadcaster = Arc::new(Broadcaster::new());

    let jobs = Arc::new(CronJobs::new(
        store,
        notifier,
        broadcaster,
        zone,
        SystemClock,
        DispatchPolicy::default(),
    ));

    {
        let jobs = jobs.clone();
        spawn_interval_job(
            "generate_week_schedule",
            Duration::from_secs(cfg.schedule_generation_interval_secs),
            move || {
                let jobs = jobs.clone();
                async move {
                    let today = today_in(zone);
                    let result = jobs.generate_week_schedule(today, Utc::now()).await?;
                    tracing::info!(?result, "week schedule generation pass complete");
                    Ok(())
                }
            },
        );
    }

    {
        let jobs = jobs.clone();
        spawn_interval_job(
            "close_bid_windows",
            Duration::from_secs(cfg.bid_window_interval_secs),
            move || {
                let jobs = jobs.clone();
                async move {
                    let result = jobs.close_bid_windows(Utc::now()).await?;
                    tracing::info!(?result, "bid window sweep complete");
                    Ok(())
                }
            },
        );
    }

    {
        let jobs = jobs.clone();
        spawn_interval_job(
            "detect_no_shows",
            Duration::from_secs(cfg.no_show_interval_secs),
            move || {
                let jobs = jobs.clone();
                async move {
                    let result = jobs.detect_no_shows(Utc::now()).await?;
                    tracing::info!(?result, "no-show sweep complete");
                    Ok(())
                }
            },
        );
    }

    {
        let jobs = jobs.clone();
        spawn_interval_job(
            "send_shift_reminders",
            Duration::from_secs(cfg.reminder_interval_secs),
            move || {
                let jobs = jobs.clone();
                async move {
                    let today = today_in(zone);
                    let result = jobs.send_shift_reminders(today, Utc::now()).await?;
                    tracing::info!(?result, "shift reminder sweep complete");
                    Ok(())
                }
            },
        );
    }

    {
        let jobs = jobs.clone();
        spawn_interval_job(
            "auto_drop_unconfirmed",
            Duration::from_secs(cfg.auto_drop_interval_secs),
            move || {
                let jobs = jobs.clone();
                async move {
                    let result = jobs.auto_drop_unconfirmed(Utc::now()).await?;
                    tracing::info!(?result, "auto-drop sweep complete");
                    Ok(())
                }
            },
        );
    }

    {
        let jobs = jobs.clone();
        spawn_interval_job(
            "run_daily_health_evaluation",
            Duration::from_secs(cfg.daily_health_interval_secs),
            move || {
                let jobs = jobs.clone();
                async move {
                    let today = today_in(zone);
                    let result = jobs.run_daily_health_evaluation(today, Utc::now()).await?;
                    tracing::info!(?result, "daily health evaluation complete");
                    Ok(())
                }
            },
        );
    }

    {
        let jobs = jobs.clone();
        spawn_interval_job(
            "run_weekly_health_evaluation",
            Duration::from_secs(cfg.weekly_health_interval_secs),
            move || {
                let jobs = jobs.clone();
                async move {
                    let today = today_in(zone);
                    let week_start = common::TenantClock::<SystemClock>::week_start(today);
                    let week_end_exclusive = common::TenantClock::<SystemClock>::add_days(week_start, 7);
                    let result = jobs
                        .run_weekly_health_evaluation(week_start, week_end_exclusive, Utc::now())
                        .await?;
                    tracing::info!(?result, "weekly health evaluation complete");
                    Ok(())
                }
            },
        );
    }

    tracing::info!("dispatchd started; waiting for shutdown signal");
    tokio::signal::ctrl_c().await?;
    tracing::info!("shutdown signal received");

    Ok(())
}

/// Today's date in the process-wide dispatch zone, computed fresh on every
/// tick rather than cached, so a long-lived process still rolls over at
/// local midnight.
fn today_in(zone: chrono_tz::Tz) -> NaiveDate {
    Utc::now().with_timezone(&zone).date_naive()
}

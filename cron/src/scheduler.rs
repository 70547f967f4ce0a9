//! Fixed-cadence interval loop, the same shape as this codebase's
//! `start_scheduler_loop` / `run_stonfi_market_poller`: a `tokio::time::interval`
//! ticking on a fixed period with `MissedTickBehavior::Skip` (a slow pass
//! never triggers a burst of catch-up ticks), spawned as its own task and
//! left running until the process shuts down.

use std::future::Future;
use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tracing::error;

/// Spawns `job` on its own `tokio::time::interval(period)` ticker and
/// returns the task handle. `job` is called once per tick with no
/// argument; callers close over whatever state (the `CronJobs` instance,
/// `now()` source) the call needs. A tick whose job returns `Err` is
/// logged and the loop continues — one bad pass never kills the ticker.
pub fn spawn_interval_job<F, Fut>(
    label: &'static str,
    period: Duration,
    mut job: F,
) -> tokio::task::JoinHandle<()>
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send,
{
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            if let Err(e) = job().await {
                error!(job = label, error = %e, "cron job pass failed");
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn ticks_fire_on_the_configured_cadence() {
        let count = Arc::new(AtomicUsize::new(0));
        let counted = count.clone();
        let handle = spawn_interval_job("test-job", Duration::from_millis(100), move || {
            let count = counted.clone();
            async move {
                count.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        });

        tokio::time::advance(Duration::from_millis(350)).await;
        // Yield so the spawned task gets scheduled after each advance.
        tokio::task::yield_now().await;

        assert!(count.load(Ordering::SeqCst) >= 3);
        handle.abort();
    }
}

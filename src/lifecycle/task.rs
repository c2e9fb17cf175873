//! Cancellable periodic background tasks.
//!
//! # Guarantees
//! - The first iteration runs immediately, then once per period
//! - No iteration starts after `stop` has been requested
//! - `stop` waits for the running iteration, up to a bounded window;
//!   past that window the task is aborted rather than leaked
//! - Dropping the handle without calling `stop` also ends the loop

use std::future::Future;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};

use crate::lifecycle::shutdown::Shutdown;

/// Handle to a background task that runs on a fixed period.
#[derive(Debug)]
pub struct PeriodicTask {
    name: &'static str,
    stop: Shutdown,
    handle: JoinHandle<()>,
}

impl PeriodicTask {
    /// Spawn `tick` on the current runtime, once per `period`.
    pub fn spawn<F, Fut>(name: &'static str, period: Duration, mut tick: F) -> Self
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let stop = Shutdown::new();
        let mut signal = stop.subscribe();

        let handle = tokio::spawn(async move {
            let mut ticker = time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    biased;
                    _ = signal.recv() => break,
                    _ = ticker.tick() => {
                        if signal.is_triggered() {
                            break;
                        }
                        tick().await;
                    }
                }
            }
            tracing::debug!(task = name, "Periodic task exited");
        });

        tracing::debug!(task = name, period = ?period, "Periodic task started");
        Self { name, stop, handle }
    }

    /// Request a stop and wait up to `window` for the task to finish.
    ///
    /// Returns true if the task ended on its own within the window.
    pub async fn stop(self, window: Duration) -> bool {
        let Self { name, stop, mut handle } = self;
        stop.trigger();

        match time::timeout(window, &mut handle).await {
            Ok(Ok(())) => {
                tracing::debug!(task = name, "Periodic task stopped");
                true
            }
            Ok(Err(e)) => {
                tracing::error!(task = name, error = %e, "Periodic task failed");
                false
            }
            Err(_) => {
                tracing::warn!(
                    task = name,
                    window = ?window,
                    "Periodic task did not stop in time, aborting"
                );
                handle.abort();
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn test_runs_immediately_and_periodically() {
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        let task = PeriodicTask::spawn("counter", Duration::from_secs(10), move || {
            let c = c.clone();
            async move {
                c.fetch_add(1, Ordering::SeqCst);
            }
        });

        time::sleep(Duration::from_secs(25)).await;
        // ticks at 0s, 10s, 20s
        assert_eq!(count.load(Ordering::SeqCst), 3);

        assert!(task.stop(Duration::from_secs(1)).await);
        time::sleep(Duration::from_secs(60)).await;
        assert_eq!(count.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_waits_for_inflight_iteration() {
        let finished = Arc::new(AtomicUsize::new(0));
        let f = finished.clone();
        let task = PeriodicTask::spawn("slow", Duration::from_secs(10), move || {
            let f = f.clone();
            async move {
                time::sleep(Duration::from_secs(2)).await;
                f.fetch_add(1, Ordering::SeqCst);
            }
        });

        // first iteration is mid-sleep
        time::sleep(Duration::from_secs(1)).await;
        assert!(task.stop(Duration::from_secs(5)).await);
        assert_eq!(finished.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_aborts_after_window() {
        let finished = Arc::new(AtomicUsize::new(0));
        let f = finished.clone();
        let task = PeriodicTask::spawn("stuck", Duration::from_secs(10), move || {
            let f = f.clone();
            async move {
                time::sleep(Duration::from_secs(3600)).await;
                f.fetch_add(1, Ordering::SeqCst);
            }
        });

        time::sleep(Duration::from_millis(10)).await;
        assert!(!task.stop(Duration::from_secs(1)).await);
        time::sleep(Duration::from_secs(7200)).await;
        assert_eq!(finished.load(Ordering::SeqCst), 0);
    }
}

//! Background task releasing expired reservations on a fixed interval.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use super::SweepReport;
use crate::error::ClinicResult;

/// Something that can run one expiry sweep. Called on a blocking thread.
pub trait SweepTarget: Send + Sync + 'static {
    fn sweep(&self, now: DateTime<Utc>) -> ClinicResult<SweepReport>;
}

/// Handle to a running sweep task.
pub struct ReservationSweeper {
    shutdown: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

impl ReservationSweeper {
    /// Start sweeping every `interval`. The first sweep runs one interval in.
    ///
    /// Must be called from inside a tokio runtime.
    pub fn spawn<T: SweepTarget>(target: Arc<T>, interval: Duration) -> Self {
        let (shutdown, mut shutdown_rx) = oneshot::channel::<()>();

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await; // Consume initial immediate tick

            loop {
                tokio::select! {
                    _ = &mut shutdown_rx => break,
                    _ = ticker.tick() => {
                        let target = Arc::clone(&target);
                        let result = tokio::task::spawn_blocking(move || target.sweep(Utc::now())).await;
                        match result {
                            Ok(Ok(report)) if !report.released.is_empty() => {
                                tracing::info!(released = report.released.len(), "reservation sweep released stock");
                            }
                            Ok(Ok(_)) => {}
                            Ok(Err(e)) => tracing::error!(error = %e, "reservation sweep failed"),
                            Err(e) => tracing::error!(error = %e, "reservation sweep task panicked"),
                        }
                    }
                }
            }

            tracing::debug!("reservation sweeper stopped");
        });

        tracing::debug!(interval_secs = interval.as_secs(), "reservation sweeper started");
        Self { shutdown, task }
    }

    /// Stop the task and wait for an in-flight sweep to finish.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(());
        if let Err(e) = self.task.await {
            tracing::error!(error = %e, "reservation sweeper did not stop cleanly");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ClinicError;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingTarget {
        sweeps: AtomicUsize,
    }

    impl SweepTarget for CountingTarget {
        fn sweep(&self, _now: DateTime<Utc>) -> ClinicResult<SweepReport> {
            self.sweeps.fetch_add(1, Ordering::SeqCst);
            Ok(SweepReport::default())
        }
    }

    struct FailingTarget;

    impl SweepTarget for FailingTarget {
        fn sweep(&self, _now: DateTime<Utc>) -> ClinicResult<SweepReport> {
            Err(ClinicError::Validation("database unavailable".into()))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweeps_once_per_interval() {
        let target = Arc::new(CountingTarget::default());
        let sweeper = ReservationSweeper::spawn(Arc::clone(&target), Duration::from_secs(60));

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(target.sweeps.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_secs(155)).await;
        assert_eq!(target.sweeps.load(Ordering::SeqCst), 3);

        sweeper.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_stops_sweeping() {
        let target = Arc::new(CountingTarget::default());
        let sweeper = ReservationSweeper::spawn(Arc::clone(&target), Duration::from_secs(60));
        sweeper.shutdown().await;

        tokio::time::sleep(Duration::from_secs(600)).await;
        assert_eq!(target.sweeps.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_sweep_keeps_running() {
        let sweeper = ReservationSweeper::spawn(Arc::new(FailingTarget), Duration::from_secs(10));
        tokio::time::sleep(Duration::from_secs(35)).await;
        // Still accepts shutdown after repeated failures
        sweeper.shutdown().await;
    }
}

use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::error::SchedulerError;
use crate::store::CheckStore;

/// Drives periodic sweeps of one store.
pub struct Scheduler {
    store: Arc<CheckStore>,
    interval: Duration,
}

pub struct SchedulerHandle {
    token: CancellationToken,
    task: JoinHandle<()>,
}

/// Releases the store's scheduler slot when the loop ends, even on panic.
struct Claim(Arc<CheckStore>);

impl Drop for Claim {
    fn drop(&mut self) {
        self.0.release_scheduler();
    }
}

impl Scheduler {
    pub fn new(store: Arc<CheckStore>, interval: Duration) -> Self {
        Self { store, interval }
    }

    pub fn start(self) -> Result<SchedulerHandle, SchedulerError> {
        if self.interval.is_zero() {
            return Err(SchedulerError::ZeroInterval);
        }
        if !self.store.claim_scheduler() {
            return Err(SchedulerError::AlreadyRunning);
        }
        let claim = Claim(Arc::clone(&self.store));
        let token = CancellationToken::new();
        let stop = token.clone();

        let task = tokio::spawn(async move {
            let _claim = claim;
            self.run(stop).await;
        });
        Ok(SchedulerHandle { token, task })
    }

    async fn run(self, stop: CancellationToken) {
        info!(interval_secs = self.interval.as_secs_f64(), "Scheduler started");

        let mut timer = interval(self.interval);
        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // first tick is immediate
        timer.tick().await;

        loop {
            // A sweep is never interrupted; stop is only observed between sweeps.
            self.store.run_sweep().await;

            tokio::select! {
                biased;
                _ = stop.cancelled() => break,
                _ = timer.tick() => {}
            }
        }

        info!("Scheduler stopped");
    }
}

impl SchedulerHandle {
    /// Signals the loop to stop after the current sweep, if any.
    pub fn stop(&self) {
        self.token.cancel();
    }

    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }

    pub async fn shutdown(self) {
        self.stop();
        if let Err(e) = self.task.await {
            error!("Scheduler task failed: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{sample_config, RecordingNotifier, StubProber};

    fn store(prober: Arc<StubProber>) -> Arc<CheckStore> {
        Arc::new(
            CheckStore::new(sample_config())
                .unwrap()
                .with_prober(prober)
                .with_notifier(Arc::new(RecordingNotifier::default())),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn sweeps_immediately_then_every_interval() {
        let prober = Arc::new(StubProber::default());
        let store = store(prober.clone());

        let handle = Scheduler::new(store.clone(), Duration::from_secs(30)).start().unwrap();
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(prober.calls(), 4);

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(prober.calls(), 12);

        handle.shutdown().await;
        assert!(!store.scheduler_running());
    }

    #[tokio::test(start_paused = true)]
    async fn only_one_scheduler_per_store() {
        let store = store(Arc::new(StubProber::default()));

        let handle = Scheduler::new(store.clone(), Duration::from_secs(5)).start().unwrap();
        assert!(store.scheduler_running());
        let second = Scheduler::new(store.clone(), Duration::from_secs(5)).start();
        assert_eq!(second.err(), Some(SchedulerError::AlreadyRunning));

        handle.shutdown().await;
        let again = Scheduler::new(store.clone(), Duration::from_secs(5)).start().unwrap();
        assert!(again.is_running());
        again.shutdown().await;
    }

    #[tokio::test]
    async fn zero_interval_is_rejected() {
        let store = store(Arc::new(StubProber::default()));
        let result = Scheduler::new(store.clone(), Duration::ZERO).start();
        assert_eq!(result.err(), Some(SchedulerError::ZeroInterval));
        assert!(!store.scheduler_running());
    }

    #[tokio::test(start_paused = true)]
    async fn stop_lets_running_sweep_finish() {
        let prober = Arc::new(StubProber::with_delay(Duration::from_secs(3)));
        let store = store(prober.clone());

        let handle = Scheduler::new(store.clone(), Duration::from_secs(30)).start().unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(prober.calls(), 4);

        handle.shutdown().await;

        let snap = store.snapshot().await;
        assert!(snap.iter().flat_map(|h| &h.checks).all(|c| c.outcome.is_some()));
        // no further sweep after stop
        tokio::time::sleep(Duration::from_secs(120)).await;
        assert_eq!(prober.calls(), 4);
    }
}

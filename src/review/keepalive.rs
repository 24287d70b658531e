//! Periodic liveness signal for long-running reviews

use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::debug;

/// Receives a ping every keepalive interval while a review runs
pub trait KeepAlive: Send + Sync {
    fn ping(&self, elapsed: Duration);
}

/// Logs each ping at debug level
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingKeepAlive;

impl KeepAlive for TracingKeepAlive {
    fn ping(&self, elapsed: Duration) {
        debug!("Review still running ({}s elapsed)", elapsed.as_secs());
    }
}

/// Stops the ping task when dropped
#[derive(Debug)]
pub struct KeepAliveGuard {
    handle: Option<JoinHandle<()>>,
}

impl KeepAliveGuard {
    /// Spawn the ping task; a zero interval disables it
    pub fn start(keepalive: Arc<dyn KeepAlive>, every: Duration) -> Self {
        if every.is_zero() {
            return Self { handle: None };
        }

        let handle = tokio::spawn(async move {
            let started = Instant::now();
            let mut ticker = interval_at(started + every, every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                keepalive.ping(started.elapsed());
            }
        });

        Self { handle: Some(handle) }
    }

    pub fn is_active(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }
}

impl Drop for KeepAliveGuard {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    pub(crate) struct CountingKeepAlive {
        pub pings: AtomicUsize,
    }

    impl CountingKeepAlive {
        pub fn count(&self) -> usize {
            self.pings.load(Ordering::SeqCst)
        }
    }

    impl KeepAlive for CountingKeepAlive {
        fn ping(&self, _elapsed: Duration) {
            self.pings.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_pings_until_dropped() {
        let counter = Arc::new(CountingKeepAlive::default());
        let guard = KeepAliveGuard::start(counter.clone(), Duration::from_secs(25));
        assert!(guard.is_active());

        tokio::time::sleep(Duration::from_secs(80)).await;
        assert_eq!(counter.count(), 3);

        drop(guard);
        tokio::time::sleep(Duration::from_secs(100)).await;
        assert_eq!(counter.count(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_interval_disabled() {
        let counter = Arc::new(CountingKeepAlive::default());
        let guard = KeepAliveGuard::start(counter.clone(), Duration::ZERO);
        assert!(!guard.is_active());
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(counter.count(), 0);
    }
}

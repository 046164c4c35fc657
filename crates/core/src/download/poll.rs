use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::trace;

/// Fixed-attempt, fixed-interval wait for something a backend registers lazily.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollPolicy {
    pub attempts: u32,
    pub interval: Duration,
}

impl PollPolicy {
    pub fn new(attempts: u32, interval: Duration) -> Self {
        Self { attempts, interval }
    }

    /// Call `probe` until it yields a value or attempts run out.
    ///
    /// Sleeps between attempts, never after the last one.
    pub async fn until<T, F, Fut>(&self, what: &str, mut probe: F) -> Option<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Option<T>>,
    {
        for attempt in 1..=self.attempts {
            if let Some(value) = probe().await {
                return Some(value);
            }
            trace!(what = what, attempt = attempt, "Not ready yet");
            if attempt < self.attempts {
                tokio::time::sleep(self.interval).await;
            }
        }
        None
    }
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self::new(5, Duration::from_secs(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn test_found_after_retries() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let policy = PollPolicy::new(5, Duration::from_millis(1));
        let found = policy
            .until("task", move || async move {
                let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                (n == 3).then_some(n)
            })
            .await;
        assert_eq!(found, Some(3));
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_exhaustion_returns_none() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let policy = PollPolicy::new(3, Duration::from_millis(1));
        let found: Option<()> = policy
            .until("task", move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                None
            })
            .await;
        assert!(found.is_none());
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }
}

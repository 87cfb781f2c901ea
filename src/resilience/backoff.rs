//! Fixed reconnect backoff.

use std::time::Duration;

/// Wait applied between tearing a connection down and re-establishing it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    interval: Duration,
}

impl Backoff {
    pub fn fixed(interval: Duration) -> Self {
        Self { interval }
    }

    pub fn from_millis(ms: u64) -> Self {
        Self::fixed(Duration::from_millis(ms))
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub async fn wait(&self) {
        if !self.interval.is_zero() {
            tokio::time::sleep(self.interval).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[tokio::test]
    async fn test_fixed_wait() {
        let backoff = Backoff::from_millis(30);
        let start = Instant::now();
        backoff.wait().await;
        assert!(start.elapsed() >= Duration::from_millis(30));
        assert_eq!(backoff.interval(), Duration::from_millis(30));
    }

    #[tokio::test]
    async fn test_zero_wait_returns_immediately() {
        let start = Instant::now();
        Backoff::from_millis(0).wait().await;
        assert!(start.elapsed() < Duration::from_millis(20));
    }
}

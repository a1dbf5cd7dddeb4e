//! Stale buffer reaping: flush text that never reached a sentence boundary.

use tokio::time::{Duration, Instant};

use super::buffer::SessionBuffer;

#[derive(Debug, Clone)]
pub struct StaleBufferReaper {
    stale_after: Duration,
}

impl StaleBufferReaper {
    pub fn new(stale_after: Duration) -> Self {
        Self { stale_after }
    }

    /// Delay between an ingestion request and its reaper firing
    pub fn delay(&self) -> Duration {
        self.stale_after
    }

    /// Take the pending text if the session has been quiet long enough.
    /// Newer activity makes this a no-op.
    pub fn reap(&self, buffer: &mut SessionBuffer, now: Instant) -> Option<String> {
        if now.saturating_duration_since(buffer.last_activity_at) < self.stale_after {
            return None;
        }
        buffer.take_pending()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_reaps_only_after_threshold() {
        let reaper = StaleBufferReaper::new(Duration::from_millis(5000));
        let mut buffer = SessionBuffer::new(Instant::now());
        buffer.pending_messages.push("half a thought".to_string());

        tokio::time::advance(Duration::from_millis(4999)).await;
        assert_eq!(reaper.reap(&mut buffer, Instant::now()), None);

        tokio::time::advance(Duration::from_millis(1)).await;
        assert_eq!(
            reaper.reap(&mut buffer, Instant::now()),
            Some("half a thought".to_string())
        );
        assert!(buffer.pending_messages.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_nothing_pending_is_noop() {
        let reaper = StaleBufferReaper::new(Duration::from_millis(5000));
        let mut buffer = SessionBuffer::new(Instant::now());
        tokio::time::advance(Duration::from_secs(10)).await;
        assert_eq!(reaper.reap(&mut buffer, Instant::now()), None);
    }
}

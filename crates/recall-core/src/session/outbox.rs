//! ============================================================================
//! Response Outbox - Delivery side channel for recall answers
//! ============================================================================
//! Answers are produced by timers long after the triggering webhook returned.
//! They are queued per session until the caller collects them (next webhook
//! call or explicit poll), and broadcast to in-process subscribers.
//! ============================================================================

use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, warn};

/// A resolved trigger cycle
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecallResponse {
    pub session_id: String,
    pub cycle: u64,
    pub question: String,
    pub message: String,
    pub found: bool,
    pub created_at: i64,
}

pub struct ResponseOutbox {
    capacity: usize,
    queues: Mutex<HashMap<String, VecDeque<RecallResponse>>>,
    live: broadcast::Sender<RecallResponse>,
}

impl ResponseOutbox {
    pub fn new(capacity: usize) -> Self {
        let (live, _) = broadcast::channel(64);
        Self {
            capacity: capacity.max(1),
            queues: Mutex::new(HashMap::new()),
            live,
        }
    }

    pub async fn publish(&self, response: RecallResponse) {
        // Nobody listening is fine; the queue still holds it
        let _ = self.live.send(response.clone());

        let mut queues = self.queues.lock().await;
        let queue = queues.entry(response.session_id.clone()).or_default();
        if queue.len() >= self.capacity {
            warn!(
                "Outbox full for session {}, dropping oldest answer",
                response.session_id
            );
            queue.pop_front();
        }
        queue.push_back(response);
    }

    /// Drain undelivered answers for a session, oldest first
    pub async fn take(&self, session_id: &str) -> Vec<RecallResponse> {
        let drained: Vec<RecallResponse> = self
            .queues
            .lock()
            .await
            .remove(session_id)
            .map(Vec::from)
            .unwrap_or_default();

        if !drained.is_empty() {
            debug!("Delivering {} answers for session {}", drained.len(), session_id);
        }
        drained
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RecallResponse> {
        self.live.subscribe()
    }

    pub async fn forget(&self, session_id: &str) {
        self.queues.lock().await.remove(session_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(session: &str, cycle: u64) -> RecallResponse {
        RecallResponse {
            session_id: session.to_string(),
            cycle,
            question: "i forgot".to_string(),
            message: format!("answer {}", cycle),
            found: true,
            created_at: 0,
        }
    }

    #[tokio::test]
    async fn test_take_drains_per_session() {
        let outbox = ResponseOutbox::new(4);
        outbox.publish(response("a", 1)).await;
        outbox.publish(response("b", 1)).await;
        outbox.publish(response("a", 2)).await;

        let taken = outbox.take("a").await;
        assert_eq!(taken.iter().map(|r| r.cycle).collect::<Vec<_>>(), vec![1, 2]);
        assert!(outbox.take("a").await.is_empty());
        assert_eq!(outbox.take("b").await.len(), 1);
    }

    #[tokio::test]
    async fn test_capacity_drops_oldest() {
        let outbox = ResponseOutbox::new(2);
        for cycle in 1..=3 {
            outbox.publish(response("a", cycle)).await;
        }
        let taken = outbox.take("a").await;
        assert_eq!(taken.iter().map(|r| r.cycle).collect::<Vec<_>>(), vec![2, 3]);
    }

    #[tokio::test]
    async fn test_subscribers_receive_live() {
        let outbox = ResponseOutbox::new(4);
        let mut rx = outbox.subscribe();
        outbox.publish(response("a", 7)).await;
        assert_eq!(rx.recv().await.unwrap().cycle, 7);
    }
}

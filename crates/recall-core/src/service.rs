//! ============================================================================
//! Recall Service - Glue between webhook traffic, session state and timers
//! ============================================================================
//! Owns the session registry and runs, per ingestion request:
//! 1. each fragment through the SegmentIngestor and TriggerWatcher, holding
//!    the session lock for the whole batch,
//! 2. a 2s dispatch timer whenever a trigger window opens,
//! 3. one 5s stale-buffer timer, cancelling the request's predecessor.
//!
//! Timer tasks are only ever aborted by a holder of the session lock, and a
//! timer flushes while holding that lock, so an abort can never tear a flush.
//! ============================================================================

use std::sync::{Arc, Weak};
use tokio::task::JoinHandle;
use tokio::time::{sleep, Instant};
use tracing::{debug, error, info};

use crate::config::RecallConfig;
use crate::error::{RecallError, Result};
use crate::generator::ResponseGenerator;
use crate::memory::{MemoryKind, MemoryManager, MemoryRecord};
use crate::session::{
    normalize_fragment, RecallDispatcher, RecallResponse, ResponseOutbox, SegmentIngestor,
    SessionBuffer, SessionBufferStore, StaleBufferReaper, TriggerEvent, TriggerWatcher,
};

pub const NO_SESSION_ID: &str = "No session ID provided";
pub const NO_UID: &str = "No user ID provided";

/// What one ingestion request did
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IngestReport {
    /// Non-blank fragments appended
    pub fragments: usize,
    /// Texts persisted by sentence-boundary flushes, in order
    pub flushed: Vec<String>,
    pub trigger_opened: bool,
}

#[derive(Clone)]
pub struct RecallService {
    inner: Arc<Inner>,
}

struct Inner {
    config: RecallConfig,
    sessions: SessionBufferStore,
    ingestor: SegmentIngestor,
    watcher: TriggerWatcher,
    dispatcher: RecallDispatcher,
    reaper: StaleBufferReaper,
    memory: MemoryManager,
    outbox: ResponseOutbox,
}

impl RecallService {
    pub fn new(
        config: RecallConfig,
        memory: MemoryManager,
        generator: Arc<dyn ResponseGenerator>,
    ) -> Self {
        let dispatcher = RecallDispatcher::new(
            memory.clone(),
            generator,
            config.similarity_threshold,
            config.top_k,
            config.nothing_remembered.clone(),
        );

        let inner = Inner {
            sessions: SessionBufferStore::new(),
            ingestor: SegmentIngestor::new(config.long_utterance_chars),
            watcher: TriggerWatcher::new(config.trigger_phrases.clone()),
            dispatcher,
            reaper: StaleBufferReaper::new(config.stale_after),
            outbox: ResponseOutbox::new(config.outbox_capacity),
            memory,
            config,
        };

        Self {
            inner: Arc::new(inner),
        }
    }

    pub fn config(&self) -> &RecallConfig {
        &self.inner.config
    }

    pub fn sessions(&self) -> &SessionBufferStore {
        &self.inner.sessions
    }

    pub fn outbox(&self) -> &ResponseOutbox {
        &self.inner.outbox
    }

    pub fn memory(&self) -> &MemoryManager {
        &self.inner.memory
    }

    /// Run one webhook batch for a session
    pub async fn process_segments<S: AsRef<str>>(
        &self,
        session_id: &str,
        fragments: &[S],
    ) -> Result<IngestReport> {
        if session_id.trim().is_empty() {
            return Err(RecallError::Validation(NO_SESSION_ID.to_string()));
        }

        let buffer = self.inner.sessions.get(session_id).await;
        let mut state = buffer.lock().await;

        let outcome = self.ingest_batch(session_id, &mut state, fragments).await;

        // Once per request, even when a flush failed midway
        let reaper = self.schedule_reaper(session_id);
        state.replace_reaper(reaper);

        outcome
    }

    async fn ingest_batch<S: AsRef<str>>(
        &self,
        session_id: &str,
        state: &mut SessionBuffer,
        fragments: &[S],
    ) -> Result<IngestReport> {
        let mut report = IngestReport::default();

        for raw in fragments {
            let Some(fragment) = normalize_fragment(raw.as_ref()) else {
                continue;
            };
            let now = Instant::now();
            report.fragments += 1;

            let flushed = self
                .inner
                .ingestor
                .ingest(state, &fragment, fragments.len(), now);

            if let TriggerEvent::Opened { cycle } =
                self.inner.watcher.on_fragment(state, &fragment, now)
            {
                let timer = self.schedule_recall(session_id, cycle);
                if let Some(previous) = state.recall_timer.replace(timer) {
                    previous.abort();
                }
                report.trigger_opened = true;
            }

            // Pending is already cleared; a failed store loses this text
            if let Some(text) = flushed {
                self.inner
                    .memory
                    .remember(session_id, &text, MemoryKind::Utterance)
                    .await?;
                report.flushed.push(text);
            }
        }

        debug!(
            "Session {}: {} fragments, {} flushes, {} still pending",
            session_id,
            report.fragments,
            report.flushed.len(),
            state.pending_messages.len()
        );
        Ok(report)
    }

    fn schedule_recall(&self, session_id: &str, cycle: u64) -> JoinHandle<()> {
        let service = self.clone();
        let session_id = session_id.to_string();
        let delay = self.inner.config.question_window;

        tokio::spawn(async move {
            sleep(delay).await;
            if let Err(e) = service.dispatch_recall(&session_id, cycle).await {
                error!("Recall for session {} (cycle {}) failed: {}", session_id, cycle, e);
            }
        })
    }

    fn schedule_reaper(&self, session_id: &str) -> JoinHandle<()> {
        let service = self.clone();
        let session_id = session_id.to_string();
        let delay = self.inner.reaper.delay();

        tokio::spawn(async move {
            sleep(delay).await;
            if let Err(e) = service.reap_stale(&session_id).await {
                error!("Stale flush for session {} failed: {}", session_id, e);
            }
        })
    }

    /// Resolve trigger cycle `cycle`. A no-op (`Ok(None)`) unless the cycle is
    /// still open and unanswered, so duplicate firings never answer twice.
    pub async fn dispatch_recall(
        &self,
        session_id: &str,
        cycle: u64,
    ) -> Result<Option<RecallResponse>> {
        let Some(buffer) = self.inner.sessions.lookup(session_id).await else {
            return Ok(None);
        };

        let claimed = {
            let mut state = buffer.lock().await;
            let claimed = RecallDispatcher::claim(&mut state, cycle);
            if claimed.is_some() {
                // Detach our own handle so eviction cannot abort an answer in flight
                state.recall_timer.take();
            }
            claimed
        };
        drop(buffer);

        let Some(claimed) = claimed else {
            debug!("Recall cycle {} for session {} already resolved", cycle, session_id);
            return Ok(None);
        };

        info!(
            "Answering recall for session {} (cycle {}): {}",
            session_id, cycle, claimed.question
        );

        let answer = self
            .inner
            .dispatcher
            .answer(session_id, &claimed.question)
            .await?;

        let response = RecallResponse {
            session_id: session_id.to_string(),
            cycle,
            question: claimed.question,
            message: answer.message,
            found: answer.found,
            created_at: chrono::Utc::now().timestamp(),
        };
        self.inner.outbox.publish(response.clone()).await;

        Ok(Some(response))
    }

    /// Flush pending text if the session has been quiet for the stale window
    pub async fn reap_stale(&self, session_id: &str) -> Result<Option<String>> {
        let Some(buffer) = self.inner.sessions.lookup(session_id).await else {
            return Ok(None);
        };
        let mut state = buffer.lock().await;

        let Some(text) = self.inner.reaper.reap(&mut state, Instant::now()) else {
            return Ok(None);
        };

        info!("Flushing stale buffer for session {}", session_id);
        self.inner
            .memory
            .remember(session_id, &text, MemoryKind::Utterance)
            .await?;

        Ok(Some(text))
    }

    /// Answers waiting for a session, oldest first
    pub async fn take_responses(&self, session_id: &str) -> Vec<RecallResponse> {
        self.inner.outbox.take(session_id).await
    }

    /// Store a structured conversation record; no buffering involved
    pub async fn ingest_memory_record(&self, uid: &str, record: &MemoryRecord) -> Result<usize> {
        if uid.trim().is_empty() {
            return Err(RecallError::Validation(NO_UID.to_string()));
        }
        let stored = self.inner.memory.ingest_record(uid, record).await?;
        Ok(stored.len())
    }

    pub async fn evict_idle(&self) -> Vec<String> {
        let evicted = self
            .inner
            .sessions
            .evict_idle(Instant::now(), self.inner.config.evict_after)
            .await;

        for session_id in &evicted {
            self.inner.outbox.forget(session_id).await;
        }
        if !evicted.is_empty() {
            info!("Evicted {} idle sessions", evicted.len());
        }
        evicted
    }

    /// Periodically evict idle sessions. Stops once the service is dropped.
    pub fn spawn_eviction_sweeper(&self) -> JoinHandle<()> {
        let weak: Weak<Inner> = Arc::downgrade(&self.inner);
        let period = self.inner.config.sweep_interval;

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            // First tick completes immediately
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(inner) = weak.upgrade() else {
                    break;
                };
                RecallService { inner }.evict_idle().await;
            }
        })
    }

    pub async fn health_check(&self) -> Result<bool> {
        self.inner.memory.health_check().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::NOTHING_REMEMBERED;
    use crate::memory::ScoredMemory;
    use crate::testing::{service_with, FailingEmbedder, FixedHitsStore, RecordingGenerator};
    use std::time::Duration;

    async fn pending(service: &RecallService, session_id: &str) -> Vec<String> {
        let buffer = service.sessions().lookup(session_id).await.unwrap();
        let state = buffer.lock().await;
        state.pending_messages.clone()
    }

    fn dana() -> Vec<ScoredMemory> {
        vec![ScoredMemory {
            content: "her name is dana.".to_string(),
            distance: 0.2,
        }]
    }

    #[tokio::test(start_paused = true)]
    async fn test_sentence_boundary_flushes_once() {
        let (service, store, _) = service_with(vec![]);

        let report = service
            .process_segments("s1", &["hello", "world.", "next"])
            .await
            .unwrap();

        assert_eq!(report.flushed, vec!["hello world.".to_string()]);
        assert_eq!(store.stored_contents(), vec!["hello world.".to_string()]);
        assert_eq!(pending(&service, "s1").await, vec!["next".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fragments_are_lowercased() {
        let (service, store, _) = service_with(vec![]);
        service.process_segments("s1", &["Call Mom Tonight!"]).await.unwrap();
        assert_eq!(store.stored_contents(), vec!["call mom tonight!".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_long_utterance_flushes() {
        let (service, store, _) = service_with(vec![]);
        let long = "so we walked all the way down to the harbor and back again";
        assert!(long.len() > 50);

        service.process_segments("alone", &[long]).await.unwrap();
        assert_eq!(store.stored_contents(), vec![long.to_string()]);

        service.process_segments("paired", &[long, "then"]).await.unwrap();
        assert_eq!(store.stored_contents().len(), 1);
        assert_eq!(pending(&service, "paired").await.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_trigger_window_collects_then_answers_once() {
        let (service, _, generator) = service_with(dana());

        let report = service.process_segments("s1", &["i forgot"]).await.unwrap();
        assert!(report.trigger_opened);

        sleep(Duration::from_millis(1000)).await;
        let report = service
            .process_segments("s1", &["what was the name"])
            .await
            .unwrap();
        assert!(!report.trigger_opened);
        assert!(service.take_responses("s1").await.is_empty());

        sleep(Duration::from_millis(1500)).await;

        let responses = service.take_responses("s1").await;
        assert_eq!(responses.len(), 1);
        assert_eq!(responses[0].question, "i forgot what was the name");
        assert_eq!(responses[0].message, "it was dana");
        assert!(responses[0].found);
        assert_eq!(generator.calls().len(), 1);

        let buffer = service.sessions().lookup("s1").await.unwrap();
        let state = buffer.lock().await;
        assert!(state.response_sent);
        assert!(!state.trigger_open);
        assert!(state.collected_question.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_duplicate_dispatch_is_noop() {
        let (service, _, generator) = service_with(dana());
        service.process_segments("s1", &["i don't remember"]).await.unwrap();

        let first = service.dispatch_recall("s1", 1).await.unwrap();
        assert!(first.is_some());
        let second = service.dispatch_recall("s1", 1).await.unwrap();
        assert!(second.is_none());

        // The real timer fires later and finds the cycle resolved
        sleep(Duration::from_millis(2500)).await;

        assert_eq!(service.take_responses("s1").await.len(), 1);
        assert_eq!(generator.calls().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_distant_match_yields_nothing_remembered() {
        let (service, _, generator) = service_with(vec![ScoredMemory {
            content: "the car is blue.".to_string(),
            distance: 0.41,
        }]);
        service.process_segments("s1", &["i forgot her birthday"]).await.unwrap();

        let response = service.dispatch_recall("s1", 1).await.unwrap().unwrap();
        assert_eq!(response.message, NOTHING_REMEMBERED);
        assert!(!response.found);
        assert!(generator.calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_new_cycle_after_resolution() {
        let (service, _, _) = service_with(dana());
        service.process_segments("s1", &["i forgot"]).await.unwrap();
        sleep(Duration::from_millis(2100)).await;

        let report = service.process_segments("s1", &["i forgot again"]).await.unwrap();
        assert!(report.trigger_opened);
        sleep(Duration::from_millis(2100)).await;

        let cycles: Vec<u64> = service
            .take_responses("s1")
            .await
            .iter()
            .map(|r| r.cycle)
            .collect();
        assert_eq!(cycles, vec![1, 2]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_buffer_is_reaped() {
        let (service, store, _) = service_with(vec![]);
        service.process_segments("s1", &["half a thought"]).await.unwrap();

        sleep(Duration::from_millis(4999)).await;
        assert!(store.stored_contents().is_empty());

        sleep(Duration::from_millis(10)).await;
        assert_eq!(store.stored_contents(), vec!["half a thought".to_string()]);
        assert!(pending(&service, "s1").await.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_newer_activity_supersedes_reaper() {
        let (service, store, _) = service_with(vec![]);
        service.process_segments("s1", &["first"]).await.unwrap();

        sleep(Duration::from_millis(3000)).await;
        service.process_segments("s1", &["second"]).await.unwrap();

        // The first request's reaper would have fired here
        sleep(Duration::from_millis(2500)).await;
        assert!(store.stored_contents().is_empty());
        assert_eq!(service.reap_stale("s1").await.unwrap(), None);

        sleep(Duration::from_millis(2600)).await;
        assert_eq!(store.stored_contents(), vec!["first second".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sessions_never_share_state() {
        let (service, store, _) = service_with(vec![]);
        service.process_segments("a", &["alpha"]).await.unwrap();
        service.process_segments("b", &["beta"]).await.unwrap();
        service.process_segments("a", &["done."]).await.unwrap();

        assert_eq!(store.stored_contents(), vec!["alpha done.".to_string()]);
        assert!(pending(&service, "a").await.is_empty());
        assert_eq!(pending(&service, "b").await, vec!["beta".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_requests_do_not_lose_fragments() {
        let (service, _, _) = service_with(vec![]);

        let (left, right) = tokio::join!(
            service.process_segments("s1", &["one", "two"]),
            service.process_segments("s1", &["three", "four"]),
        );
        left.unwrap();
        right.unwrap();

        let mut fragments = pending(&service, "s1").await;
        fragments.sort();
        assert_eq!(fragments, vec!["four", "one", "three", "two"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_session_id_is_validation_error() {
        let (service, _, _) = service_with(vec![]);
        let err = service.process_segments("  ", &["hello."]).await.unwrap_err();
        assert_eq!(err, RecallError::Validation(NO_SESSION_ID.to_string()));
        assert!(service.sessions().is_empty().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_flush_propagates_and_clears_pending() {
        let store = Arc::new(FixedHitsStore::new(vec![]));
        let service = RecallService::new(
            RecallConfig::default(),
            MemoryManager::new(Arc::new(FailingEmbedder), store.clone()),
            Arc::new(RecordingGenerator::new("unused")),
        );

        let err = service.process_segments("s1", &["lost words."]).await.unwrap_err();
        assert!(matches!(err, RecallError::Provider(_)));
        assert!(pending(&service, "s1").await.is_empty());
        assert!(store.stored_contents().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_blank_fragments_are_skipped() {
        let (service, _, _) = service_with(vec![]);
        let report = service.process_segments("s1", &["", "   ", "hi"]).await.unwrap();
        assert_eq!(report.fragments, 1);
        assert_eq!(pending(&service, "s1").await, vec!["hi".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_sessions_are_evicted() {
        let (service, _, _) = service_with(vec![]);
        service.process_segments("done", &["all finished."]).await.unwrap();
        service.process_segments("open", &["trailing words"]).await.unwrap();

        // Keep "open" from being reaped so it still holds pending text
        {
            let buffer = service.sessions().lookup("open").await.unwrap();
            buffer.lock().await.cancel_timers();
        }

        sleep(service.config().evict_after).await;
        assert_eq!(service.evict_idle().await, vec!["done".to_string()]);
        assert!(service.sessions().lookup("done").await.is_none());
        assert!(service.sessions().lookup("open").await.is_some());

        // A timer for an evicted session must not recreate it
        assert_eq!(service.reap_stale("done").await.unwrap(), None);
        assert!(service.sessions().lookup("done").await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_memory_record_requires_uid() {
        let (service, store, _) = service_with(vec![]);
        let record: MemoryRecord = serde_json::from_value(serde_json::json!({
            "transcript_segments": [{"text": "We picked the blue logo."}]
        }))
        .unwrap();

        let err = service.ingest_memory_record("", &record).await.unwrap_err();
        assert_eq!(err, RecallError::Validation(NO_UID.to_string()));

        assert_eq!(service.ingest_memory_record("u1", &record).await.unwrap(), 1);
        assert_eq!(store.stored_contents(), vec!["We picked the blue logo.".to_string()]);
    }
}

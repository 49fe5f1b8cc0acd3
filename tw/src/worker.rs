//! Queue worker loop
//!
//! One request at a time, end to end. Failed turns are requeued after an
//! exponential backoff with jitter until the attempt limit; validation
//! failures are dropped immediately.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::config::WorkerConfig;
use crate::orchestrator::TripOrchestrator;
use crate::queue::{QueueError, QueuedRequest, TripQueue};

/// Counters for one worker run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerStats {
    pub processed: usize,
    pub retried: usize,
    pub dropped: usize,
}

pub struct Worker {
    queue: Arc<dyn TripQueue>,
    orchestrator: Arc<TripOrchestrator>,
    config: WorkerConfig,
    stats: WorkerStats,
}

impl Worker {
    pub fn new(queue: Arc<dyn TripQueue>, orchestrator: Arc<TripOrchestrator>, config: &WorkerConfig) -> Self {
        Self {
            queue,
            orchestrator,
            config: config.clone(),
            stats: WorkerStats::default(),
        }
    }

    pub fn stats(&self) -> WorkerStats {
        self.stats
    }

    /// Poll until `shutdown` resolves
    ///
    /// Shutdown is only observed between turns; a turn in flight completes.
    pub async fn run<F>(&mut self, shutdown: F) -> WorkerStats
    where
        F: Future<Output = ()>,
    {
        info!(queue = %self.config.queue_name, "Worker::run: started");
        tokio::pin!(shutdown);
        let timeout = Duration::from_millis(self.config.poll_timeout_ms);
        let idle = Duration::from_millis(self.config.idle_sleep_ms);

        loop {
            let popped = tokio::select! {
                biased;
                _ = &mut shutdown => {
                    info!("Worker::run: shutdown requested");
                    break;
                }
                popped = self.queue.pop(timeout) => popped,
            };
            match popped {
                Ok(Some(request)) => self.handle(request).await,
                Ok(None) => {
                    tokio::select! {
                        _ = &mut shutdown => {
                            info!("Worker::run: shutdown requested");
                            break;
                        }
                        _ = tokio::time::sleep(idle) => {}
                    }
                }
                Err(QueueError::Closed) => {
                    warn!("Worker::run: queue closed");
                    break;
                }
            }
        }

        info!(?self.stats, "Worker::run: stopped");
        self.stats
    }

    /// Process until the queue is empty
    pub async fn drain(&mut self) -> WorkerStats {
        debug!("Worker::drain: called");
        let timeout = Duration::from_millis(self.config.poll_timeout_ms);
        loop {
            match self.queue.pop(timeout).await {
                Ok(Some(request)) => self.handle(request).await,
                Ok(None) => break,
                Err(e) => {
                    warn!(error = %e, "Worker::drain: queue closed");
                    break;
                }
            }
        }
        info!(?self.stats, "Worker::drain: queue empty");
        self.stats
    }

    async fn handle(&mut self, request: QueuedRequest) {
        let request_id = request
            .payload
            .get("request_id")
            .and_then(|v| v.as_str())
            .unwrap_or("-")
            .to_string();
        debug!(%request_id, attempt = request.attempt, "handle: called");

        let err = match self.orchestrator.process(&request.payload).await {
            Ok(plan) => {
                self.stats.processed += 1;
                info!(%request_id, thread_id = %plan.thread_id, "handle: turn complete");
                return;
            }
            Err(e) => e,
        };

        if err.is_terminal() {
            self.stats.dropped += 1;
            warn!(%request_id, error = %err, "handle: invalid request dropped");
            return;
        }

        let next = request.attempt + 1;
        if next >= self.config.max_attempts {
            self.stats.dropped += 1;
            error!(%request_id, attempts = next, error = %err, "handle: giving up after max attempts");
            return;
        }

        let delay = backoff_delay(next, self.config.backoff_base_ms, self.config.backoff_max_ms);
        warn!(%request_id, attempt = next, delay_ms = delay.as_millis() as u64, error = %err, "handle: retrying after backoff");
        tokio::time::sleep(delay).await;

        match self.queue.push(request.retry()).await {
            Ok(()) => self.stats.retried += 1,
            Err(e) => {
                self.stats.dropped += 1;
                error!(%request_id, error = %e, "handle: requeue failed");
            }
        }
    }
}

/// Exponential backoff with up to 50% random jitter, capped at `max_ms`
pub fn backoff_delay(attempt: u32, base_ms: u64, max_ms: u64) -> Duration {
    let exp = base_ms.saturating_mul(1u64 << attempt.saturating_sub(1).min(20));
    let capped = exp.min(max_ms);
    let jitter = if capped > 1 { rand::random_range(0..=capped / 2) } else { 0 };
    Duration::from_millis(capped.saturating_add(jitter).min(max_ms))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::context::ContextAssembler;
    use crate::generator::PlanGenerator;
    use crate::history::InMemoryHistory;
    use crate::memory::LocalLongTermMemory;
    use crate::normalize::RequestNormalizer;
    use crate::queue::ChannelQueue;
    use crate::retrieval::{LocalGroundingStore, Retriever};
    use memorystore::MemoryStore;
    use serde_json::json;

    fn worker(history: Arc<InMemoryHistory>, queue: Arc<ChannelQueue>) -> Worker {
        let mut config = Config::default();
        config.worker.poll_timeout_ms = 10;
        config.worker.idle_sleep_ms = 5;
        config.worker.backoff_base_ms = 1;
        config.worker.backoff_max_ms = 2;
        let store = Arc::new(MemoryStore::in_memory());
        let orchestrator = TripOrchestrator::new(
            RequestNormalizer::new(&config),
            ContextAssembler::new(
                history.clone(),
                Arc::new(LocalLongTermMemory::new(store.clone(), "memories", 1)),
                &config,
            ),
            Retriever::new(Arc::new(LocalGroundingStore::new(store, "grounding", 1)), &config),
            PlanGenerator::offline(&config),
            history,
        );
        Worker::new(queue, Arc::new(orchestrator), &config.worker)
    }

    #[test]
    fn test_backoff_grows_and_caps() {
        for _ in 0..20 {
            let first = backoff_delay(1, 100, 10_000).as_millis();
            assert!((100..=150).contains(&first));
            let third = backoff_delay(3, 100, 10_000).as_millis();
            assert!((400..=600).contains(&third));
            assert_eq!(backoff_delay(30, 100, 1_000).as_millis(), 1_000);
        }
    }

    #[tokio::test]
    async fn test_drain_processes_and_drops_invalid() {
        let history = Arc::new(InMemoryHistory::new());
        let queue = Arc::new(ChannelQueue::new("trip_requests"));
        queue
            .push_payload(json!({"thread_id": "t1", "message_id": "m1", "content": "3 days in Yosemite"}))
            .await
            .unwrap();
        queue.push_payload(json!("not an object")).await.unwrap();

        let stats = worker(history.clone(), queue).drain().await;
        assert_eq!(stats.processed, 1);
        assert_eq!(stats.dropped, 1);
        assert_eq!(stats.retried, 0);
        assert_eq!(history.appended("t1").len(), 2);
    }

    #[tokio::test]
    async fn test_failed_turn_retried_until_limit() {
        let history = Arc::new(InMemoryHistory::new());
        history.set_fail_writes(true);
        let queue = Arc::new(ChannelQueue::new("trip_requests"));
        queue
            .push_payload(json!({"thread_id": "t1", "message_id": "m1", "content": "hi"}))
            .await
            .unwrap();

        let stats = worker(history, queue).drain().await;
        assert_eq!(stats.retried, 2);
        assert_eq!(stats.dropped, 1);
        assert_eq!(stats.processed, 0);
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown() {
        let queue = Arc::new(ChannelQueue::new("trip_requests"));
        let mut worker = worker(Arc::new(InMemoryHistory::new()), queue);
        let stats = worker
            .run(tokio::time::sleep(Duration::from_millis(30)))
            .await;
        assert_eq!(stats, WorkerStats::default());
    }
}

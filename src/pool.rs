//! Bounded concurrency, cancellation, and retry orchestration across
//! `ConversationWorker` instances.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::{watch, Semaphore};
use tokio::task::JoinSet;
use tracing::warn;

use crate::config::ExplorerConfig;
use crate::error::ExplorationError;
use crate::models::{CallStatus, CallTask, FrontierEntry};
use crate::worker::{ConversationWorker, WorkerOutcome};

type TaskResult = (FrontierEntry, Result<WorkerOutcome, ExplorationError>);

/// Dispatches frontier entries to a fixed-size pool of concurrent workers.
/// At most `capacity` calls are outstanding at once; a shared stop signal
/// propagates cooperative cancellation into every in-flight task.
pub struct WorkerPool {
    worker: Arc<ConversationWorker>,
    semaphore: Arc<Semaphore>,
    stop_tx: watch::Sender<bool>,
    stop_rx: watch::Receiver<bool>,
    tasks: JoinSet<TaskResult>,
    next_slot: u64,
    active: Arc<Mutex<HashMap<u64, CallTask>>>,
}

impl WorkerPool {
    pub fn new(worker: Arc<ConversationWorker>, capacity: usize) -> Self {
        let (stop_tx, stop_rx) = watch::channel(false);
        Self {
            worker,
            semaphore: Arc::new(Semaphore::new(capacity)),
            stop_tx,
            stop_rx,
            tasks: JoinSet::new(),
            next_slot: 0,
            active: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn in_flight(&self) -> usize {
        self.tasks.len()
    }

    pub fn available_permits(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Current lifecycle status of every task the pool has dispatched and
    /// not yet reaped, keyed by dispatch slot.
    pub fn active_task_statuses(&self) -> Vec<CallStatus> {
        self.active
            .lock()
            .expect("active task map poisoned")
            .values()
            .map(|t| t.status)
            .collect()
    }

    /// Acquire a permit and spawn `entry` as a worker task. Blocks (async)
    /// until a permit is free, so callers should only dispatch up to the
    /// number of permits they know are available.
    pub async fn dispatch(&mut self, entry: FrontierEntry) {
        let permit = self
            .semaphore
            .clone()
            .acquire_owned()
            .await
            .expect("pool semaphore never closes while the pool is alive");

        let worker = self.worker.clone();
        let mut stop_rx = self.stop_rx.clone();
        let task_entry = entry.clone();

        let slot = self.next_slot;
        self.next_slot += 1;
        let mut task = CallTask::new(entry.clone());
        task.status = CallStatus::Dialing;
        self.active.lock().expect("active task map poisoned").insert(slot, task);
        let active = self.active.clone();

        self.tasks.spawn(async move {
            let _permit = permit;
            let outcome = tokio::select! {
                result = worker.run_task(entry) => result,
                _ = stop_rx.changed() => Err(ExplorationError::Cancelled),
            };
            let final_status = if outcome.is_ok() { CallStatus::Done } else { CallStatus::Failed };
            if let Some(task) = active.lock().expect("active task map poisoned").get_mut(&slot) {
                task.status = final_status;
            }
            (task_entry, outcome)
        });
    }

    /// Await the next completed (or cancelled) task, dropping it from the
    /// active set once reaped.
    pub async fn join_next(&mut self) -> Option<TaskResult> {
        let joined = self.tasks.join_next().await;
        if joined.is_some() {
            self.active
                .lock()
                .expect("active task map poisoned")
                .retain(|_, t| t.status != CallStatus::Done && t.status != CallStatus::Failed);
        }
        joined.map(|joined| joined.expect("worker task panicked"))
    }

    /// Signal all in-flight tasks to cancel and wait up to `grace` for them
    /// to unwind; anything still running past that is abandoned.
    pub async fn shutdown(&mut self, grace: Duration) {
        let _ = self.stop_tx.send(true);

        let drained = tokio::time::timeout(grace, async {
            while self.tasks.join_next().await.is_some() {}
        })
        .await;

        if drained.is_err() {
            warn!("worker pool grace period elapsed with tasks still in flight; abandoning them");
            self.tasks.abort_all();
        }
    }
}

/// Build a pool sized from `config.worker_count`.
pub fn build(worker: Arc<ConversationWorker>, config: &ExplorerConfig) -> WorkerPool {
    WorkerPool::new(worker, config.worker_count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ExplorerConfig;
    use crate::graph::ConversationGraph;
    use crate::progress::ProgressTracker;
    use crate::providers::mock::{MockLlmClient, MockVoiceApiClient, MockTranscriber, ScriptedIvr};
    use crate::webhook::WebhookCorrelator;

    fn build_worker() -> Arc<ConversationWorker> {
        let config = ExplorerConfig::default();
        let graph = ConversationGraph::new(config.similarity_threshold);
        let correlator = WebhookCorrelator::new(Duration::from_secs(5));
        let voice = Arc::new(MockVoiceApiClient::new(correlator.clone()));
        let transcriber = Arc::new(MockTranscriber::new(ScriptedIvr::default_scenario()));
        let llm = Arc::new(MockLlmClient::new());
        let progress = Arc::new(ProgressTracker::new(config.plateau_window));

        Arc::new(ConversationWorker::new(
            graph, voice, transcriber, llm, correlator, progress, config,
        ))
    }

    #[tokio::test]
    async fn respects_capacity_and_drains_on_shutdown() {
        let worker = build_worker();
        let mut pool = WorkerPool::new(worker, 2);

        assert_eq!(pool.available_permits(), 2);
        pool.dispatch(FrontierEntry::seed()).await;
        assert_eq!(pool.available_permits(), 1);

        let (_, result) = pool.join_next().await.unwrap();
        assert!(result.is_ok());

        pool.shutdown(Duration::from_secs(1)).await;
        assert_eq!(pool.in_flight(), 0);
    }

    #[tokio::test]
    async fn active_task_statuses_reflects_in_flight_dispatch() {
        let worker = build_worker();
        let mut pool = WorkerPool::new(worker, 2);

        pool.dispatch(FrontierEntry::seed()).await;
        assert_eq!(pool.active_task_statuses(), vec![CallStatus::Dialing]);

        pool.join_next().await.unwrap();
        assert!(pool.active_task_statuses().is_empty());
    }
}

//! Top-level control loop: frontier scheduling, dispatch, retries, and
//! termination.

use std::sync::Arc;
use std::time::{Duration, Instant};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::config::ExplorerConfig;
use crate::error::ExplorationError;
use crate::graph::ConversationGraph;
use crate::models::FrontierEntry;
use crate::pool::WorkerPool;
use crate::progress::{ExplorationStats, ProgressTracker};
use crate::worker::{ConversationWorker, WorkerOutcome};

/// Final report returned once the explorer reaches quiescence.
#[derive(Debug, Clone)]
pub struct ExplorationSummary {
    pub stats: ExplorationStats,
}

pub struct ConversationExplorer {
    pool: WorkerPool,
    graph: Arc<ConversationGraph>,
    progress: Arc<ProgressTracker>,
    config: ExplorerConfig,
    frontier: Vec<FrontierEntry>,
    pending_retries: usize,
    retry_tx: mpsc::UnboundedSender<FrontierEntry>,
    retry_rx: mpsc::UnboundedReceiver<FrontierEntry>,
    rng: StdRng,
    started_at: Instant,
}

impl ConversationExplorer {
    pub fn new(
        worker: Arc<ConversationWorker>,
        graph: Arc<ConversationGraph>,
        progress: Arc<ProgressTracker>,
        config: ExplorerConfig,
    ) -> Self {
        let pool = WorkerPool::new(worker, config.worker_count);
        let (retry_tx, retry_rx) = mpsc::unbounded_channel();
        let rng = StdRng::seed_from_u64(config.random_seed);

        Self {
            pool,
            graph,
            progress,
            config,
            frontier: vec![FrontierEntry::seed()],
            pending_retries: 0,
            retry_tx,
            retry_rx,
            rng,
            started_at: Instant::now(),
        }
    }

    pub async fn run(mut self) -> ExplorationSummary {
        loop {
            if let Some(reason) = self.quiescence_reason() {
                info!(%reason, "exploration reached quiescence");
                self.progress.set_quiescence_reason(reason);
                break;
            }

            while !self.frontier.is_empty()
                && self.pool.available_permits() > 0
                && self.progress.calls_attempted() + (self.pool.in_flight() as u64) < self.config.max_calls as u64
            {
                if let Some(entry) = self.pop_frontier() {
                    self.pool.dispatch(entry).await;
                }
            }
            debug!(statuses = ?self.pool.active_task_statuses(), "dispatch pass complete");

            if self.pool.in_flight() == 0 {
                if self.pending_retries == 0 {
                    // Nothing in flight, nothing pending, and the quiescence
                    // check above didn't trip: the frontier must have been
                    // empty on entry. Loop back to re-check.
                    continue;
                }
                if let Some(entry) = self.retry_rx.recv().await {
                    self.pending_retries -= 1;
                    self.frontier.push(entry);
                }
                continue;
            }

            tokio::select! {
                Some((entry, result)) = self.pool.join_next() => {
                    self.handle_result(entry, result).await;
                }
                Some(entry) = self.retry_rx.recv(), if self.pending_retries > 0 => {
                    self.pending_retries -= 1;
                    self.frontier.push(entry);
                }
            }
        }

        self.pool.shutdown(self.config.grace_shutdown).await;
        ExplorationSummary {
            stats: self.progress.snapshot(),
        }
    }

    fn quiescence_reason(&self) -> Option<String> {
        if self.progress.calls_attempted() >= self.config.max_calls as u64 {
            return Some("max_calls_reached".to_string());
        }
        if self.started_at.elapsed() >= self.config.max_wall_time {
            return Some("max_wall_time_exceeded".to_string());
        }
        if self.progress.is_plateaued() {
            return Some("coverage_plateau".to_string());
        }
        if self.frontier.is_empty() && self.pool.in_flight() == 0 && self.pending_retries == 0 {
            return Some("frontier_exhausted".to_string());
        }
        None
    }

    /// Pop the highest-priority entry (shallowest depth, fewest attempts),
    /// breaking ties via the seeded RNG rather than arbitrary heap order.
    fn pop_frontier(&mut self) -> Option<FrontierEntry> {
        if self.frontier.is_empty() {
            return None;
        }
        let best = self.frontier.iter().max().cloned()?;
        let candidate_indices: Vec<usize> = self
            .frontier
            .iter()
            .enumerate()
            .filter(|(_, e)| **e == best)
            .map(|(i, _)| i)
            .collect();
        let pick = candidate_indices[self.rng.gen_range(0..candidate_indices.len())];
        Some(self.frontier.swap_remove(pick))
    }

    async fn handle_result(&mut self, entry: FrontierEntry, result: Result<WorkerOutcome, ExplorationError>) {
        match result {
            Ok(outcome) => {
                self.progress.record_call_succeeded();
                self.frontier.extend(outcome.new_frontier_entries);
            }
            Err(err) => {
                self.progress.record_call_failed(err.kind());
                let next_attempts = entry.attempts + 1;
                if err.is_retryable() && next_attempts < self.config.task_retry_max {
                    warn!(error = %err, attempts = next_attempts, "retrying task after transient failure");
                    self.schedule_retry(entry, next_attempts);
                } else {
                    warn!(error = %err, "dropping task after exhausting retries");
                    self.graph.record_dropped_error(entry.node_id).await;
                }
            }
        }
    }

    fn schedule_retry(&mut self, mut entry: FrontierEntry, attempts: u32) {
        entry.attempts = attempts;
        let delay = backoff_duration(attempts);
        let tx = self.retry_tx.clone();
        self.pending_retries += 1;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(entry);
        });
    }
}

fn backoff_duration(attempts: u32) -> Duration {
    let base = Duration::from_millis(500);
    let scaled = base.saturating_mul(1u32 << attempts.min(6));
    scaled.min(Duration::from_secs(30))
}

//! Running counters and quiescence-by-plateau detection for the exploration
//! loop.

use std::collections::VecDeque;
use std::sync::Mutex;

use serde::Serialize;

/// Point-in-time counters, exposed verbatim by `GET /stats`.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ExplorationStats {
    pub calls_attempted: u64,
    pub calls_succeeded: u64,
    pub calls_failed_by_kind: std::collections::BTreeMap<String, u64>,
    pub nodes_added: u64,
    pub edges_added: u64,
    pub terminals_marked: u64,
    pub quiescence_reason: Option<String>,
    /// RFC3339 timestamp of the last quiescence check that set `quiescence_reason`.
    pub quiesced_at: Option<chrono::DateTime<chrono::Utc>>,
}

/// Thread-safe counters plus the rolling "new entities per call" window used
/// to detect a coverage plateau.
pub struct ProgressTracker {
    inner: Mutex<Inner>,
    plateau_window: usize,
}

struct Inner {
    stats: ExplorationStats,
    recent_new_entities: VecDeque<usize>,
}

impl ProgressTracker {
    pub fn new(plateau_window: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                stats: ExplorationStats::default(),
                recent_new_entities: VecDeque::with_capacity(plateau_window),
            }),
            plateau_window,
        }
    }

    pub fn record_call_attempted(&self) {
        self.inner.lock().unwrap().stats.calls_attempted += 1;
    }

    pub fn record_call_succeeded(&self) {
        self.inner.lock().unwrap().stats.calls_succeeded += 1;
    }

    pub fn record_call_failed(&self, kind: &str) {
        let mut inner = self.inner.lock().unwrap();
        *inner.stats.calls_failed_by_kind.entry(kind.to_string()).or_insert(0) += 1;
    }

    pub fn record_terminal_marked(&self) {
        self.inner.lock().unwrap().stats.terminals_marked += 1;
    }

    /// Record how many new nodes/edges a completed call contributed, for
    /// plateau detection.
    pub fn record_call_outcome(&self, new_nodes: usize, new_edges: usize) {
        let mut inner = self.inner.lock().unwrap();
        inner.stats.nodes_added += new_nodes as u64;
        inner.stats.edges_added += new_edges as u64;

        let window = self.plateau_window;
        inner.recent_new_entities.push_back(new_nodes + new_edges);
        while inner.recent_new_entities.len() > window {
            inner.recent_new_entities.pop_front();
        }
    }

    /// True once `plateau_window` consecutive calls have produced no new
    /// nodes or edges.
    pub fn is_plateaued(&self) -> bool {
        let inner = self.inner.lock().unwrap();
        inner.recent_new_entities.len() >= self.plateau_window
            && inner.recent_new_entities.iter().all(|&n| n == 0)
    }

    pub fn set_quiescence_reason(&self, reason: impl Into<String>) {
        let mut inner = self.inner.lock().unwrap();
        inner.stats.quiescence_reason = Some(reason.into());
        inner.stats.quiesced_at = Some(chrono::Utc::now());
    }

    pub fn calls_attempted(&self) -> u64 {
        self.inner.lock().unwrap().stats.calls_attempted
    }

    pub fn snapshot(&self) -> ExplorationStats {
        self.inner.lock().unwrap().stats.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plateau_requires_full_window_of_zero_growth() {
        let tracker = ProgressTracker::new(3);
        tracker.record_call_outcome(1, 0);
        tracker.record_call_outcome(0, 0);
        assert!(!tracker.is_plateaued());

        tracker.record_call_outcome(0, 0);
        assert!(tracker.is_plateaued());
    }

    #[test]
    fn any_growth_resets_the_plateau_window() {
        let tracker = ProgressTracker::new(2);
        tracker.record_call_outcome(0, 0);
        tracker.record_call_outcome(0, 1);
        assert!(!tracker.is_plateaued());
    }

    #[test]
    fn failure_kinds_accumulate_independently() {
        let tracker = ProgressTracker::new(20);
        tracker.record_call_failed("webhook_timeout");
        tracker.record_call_failed("webhook_timeout");
        tracker.record_call_failed("dial_failed");

        let snapshot = tracker.snapshot();
        assert_eq!(snapshot.calls_failed_by_kind["webhook_timeout"], 2);
        assert_eq!(snapshot.calls_failed_by_kind["dial_failed"], 1);
    }
}

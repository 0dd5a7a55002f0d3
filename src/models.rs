//! Core data types shared across the exploration engine: graph entities,
//! call lifecycle state, and the wire shapes exchanged with the HTTP
//! surface and the provider contracts.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

/// Opaque identifier for a conversation node, assigned at creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub u64);

/// Identifier for an in-flight or completed outbound call.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CallId(pub String);

impl CallId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

impl Default for CallId {
    fn default() -> Self {
        Self::new()
    }
}

/// A distinct agent utterance observed during exploration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationNode {
    pub id: NodeId,
    pub utterance: String,
    pub normalized_utterance: String,
    pub is_terminal: bool,
    pub depth_min: u32,
    pub visit_count: u32,
    /// Count of tasks rooted at this node that were dropped after exhausting
    /// retries or hitting a non-retryable error, for `GET /graph` inspection.
    pub dropped_errors: u32,
}

/// A labeled transition between two nodes caused by a specific user response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationEdge {
    pub from_id: NodeId,
    pub to_id: NodeId,
    pub user_response: String,
    pub observation_count: u32,
}

/// A unit of pending exploration work: try `candidate_response` from `node_id`
/// (or place the cold seed call when `node_id` is `None`).
#[derive(Debug, Clone)]
pub struct FrontierEntry {
    pub node_id: Option<NodeId>,
    pub candidate_response: String,
    pub depth: u32,
    pub attempts: u32,
}

impl FrontierEntry {
    pub fn seed() -> Self {
        Self {
            node_id: None,
            candidate_response: String::new(),
            depth: 0,
            attempts: 0,
        }
    }

    fn priority_key(&self) -> (i64, i64) {
        // BinaryHeap is a max-heap; negate so shallower depth and fewer
        // attempts pop first.
        (-(self.depth as i64), -(self.attempts as i64))
    }
}

impl PartialEq for FrontierEntry {
    fn eq(&self, other: &Self) -> bool {
        self.priority_key() == other.priority_key()
    }
}

impl Eq for FrontierEntry {}

impl PartialOrd for FrontierEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for FrontierEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        self.priority_key().cmp(&other.priority_key())
    }
}

/// Lifecycle state of a single call task, per SPEC_FULL.md's state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallStatus {
    Queued,
    Dialing,
    AwaitingWebhook,
    Transcribing,
    Integrating,
    Done,
    Failed,
}

/// A task being carried through the worker lifecycle.
#[derive(Debug, Clone)]
pub struct CallTask {
    pub entry: FrontierEntry,
    pub status: CallStatus,
    pub attempts: u32,
}

impl CallTask {
    pub fn new(entry: FrontierEntry) -> Self {
        let attempts = entry.attempts;
        Self {
            entry,
            status: CallStatus::Queued,
            attempts,
        }
    }
}

/// A single turn extracted from a transcribed recording.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptTurn {
    pub speaker: Option<u32>,
    pub text: String,
    pub t_start_ms: u64,
    pub t_end_ms: u64,
}

/// Audio container/encoding of a fetched recording, passed to `Transcriber`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioFormat {
    Wav,
    Mp3,
}

/// Sampling controls passed to `LlmClient::complete`.
#[derive(Debug, Clone)]
pub struct LlmOptions {
    pub temperature: f64,
    pub max_tokens: u32,
}

impl Default for LlmOptions {
    fn default() -> Self {
        Self {
            temperature: 0.2,
            max_tokens: 1024,
        }
    }
}

/// Parsed result of asking the LM for the next candidate user responses.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LlmExpansion {
    pub candidates: Vec<String>,
    pub is_terminal: bool,
    pub confidence: f64,
}

/// Inbound webhook body for `POST /webhook/call-complete`.
#[derive(Debug, Clone, Deserialize)]
pub struct CallCompleteEvent {
    pub call_id: String,
    pub status: CallCompleteStatus,
    #[serde(default)]
    pub recording_url: Option<String>,
    #[serde(default)]
    pub duration_s: Option<f64>,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CallCompleteStatus {
    Completed,
    Failed,
    NoAnswer,
}

/// Wire shape for a single node in `GET /graph`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeView {
    pub id: u64,
    pub utterance: String,
    pub is_terminal: bool,
    pub depth_min: u32,
    pub visit_count: u32,
    pub dropped_errors: u32,
}

/// Wire shape for a single edge in `GET /graph`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EdgeView {
    pub from: u64,
    pub to: u64,
    pub user_response: String,
    pub observation_count: u32,
}

/// Full `GET /graph` response body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphSnapshot {
    pub nodes: Vec<NodeView>,
    pub edges: Vec<EdgeView>,
}

impl From<&ConversationNode> for NodeView {
    fn from(node: &ConversationNode) -> Self {
        Self {
            id: node.id.0,
            utterance: node.utterance.clone(),
            is_terminal: node.is_terminal,
            depth_min: node.depth_min,
            visit_count: node.visit_count,
            dropped_errors: node.dropped_errors,
        }
    }
}

impl From<&ConversationEdge> for EdgeView {
    fn from(edge: &ConversationEdge) -> Self {
        Self {
            from: edge.from_id.0,
            to: edge.to_id.0,
            user_response: edge.user_response.clone(),
            observation_count: edge.observation_count,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frontier_entries_order_shallower_depth_first() {
        let shallow = FrontierEntry {
            node_id: Some(NodeId(1)),
            candidate_response: "a".into(),
            depth: 1,
            attempts: 0,
        };
        let deep = FrontierEntry {
            node_id: Some(NodeId(2)),
            candidate_response: "b".into(),
            depth: 3,
            attempts: 0,
        };
        assert!(shallow > deep);
    }

    #[test]
    fn frontier_entries_order_fewer_attempts_first_at_same_depth() {
        let fresh = FrontierEntry {
            node_id: Some(NodeId(1)),
            candidate_response: "a".into(),
            depth: 1,
            attempts: 0,
        };
        let retried = FrontierEntry {
            node_id: Some(NodeId(1)),
            candidate_response: "a".into(),
            depth: 1,
            attempts: 2,
        };
        assert!(fresh > retried);
    }
}

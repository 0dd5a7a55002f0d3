use thiserror::Error;

/// Errors raised while exploring a conversation graph.
///
/// Variants carry enough context to decide whether the caller should
/// retry, reprompt, or abort the whole run.
#[derive(Debug, Error)]
pub enum ExplorationError {
    #[error("configuration error: {0}")]
    Config(String),

    /// `carrier_rejected` is set for an explicit carrier-level rejection
    /// (e.g. invalid number, blocked), which is never worth retrying; a plain
    /// no-answer or transient dial failure leaves it unset.
    #[error("failed to place call: {reason}")]
    Dial { reason: String, carrier_rejected: bool },

    #[error("timed out waiting {0:?} for call-complete webhook")]
    WebhookTimeout(std::time::Duration),

    #[error("recording unavailable: {0}")]
    RecordingUnavailable(String),

    #[error("transcription failed: {0}")]
    Transcription(String),

    #[error("could not parse LLM response: {0}")]
    LlmParse(String),

    #[error("graph invariant violated: {0}")]
    GraphInvariant(String),

    #[error("task cancelled during shutdown")]
    Cancelled,
}

impl ExplorationError {
    /// Whether retrying the same operation (with backoff) is worth attempting.
    pub fn is_retryable(&self) -> bool {
        match self {
            ExplorationError::Dial { carrier_rejected, .. } => !carrier_rejected,
            ExplorationError::WebhookTimeout(_) | ExplorationError::RecordingUnavailable(_) => true,
            _ => false,
        }
    }

    /// A short machine-readable kind, used for stats bucketing in `GET /stats`.
    pub fn kind(&self) -> &'static str {
        match self {
            ExplorationError::Config(_) => "config",
            ExplorationError::Dial { .. } => "dial_failed",
            ExplorationError::WebhookTimeout(_) => "webhook_timeout",
            ExplorationError::RecordingUnavailable(_) => "recording_unavailable",
            ExplorationError::Transcription(_) => "transcription_failed",
            ExplorationError::LlmParse(_) => "llm_parse_failed",
            ExplorationError::GraphInvariant(_) => "graph_invariant",
            ExplorationError::Cancelled => "cancelled",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn carrier_rejected_dial_is_not_retryable() {
        let err = ExplorationError::Dial { reason: "blocked".into(), carrier_rejected: true };
        assert!(!err.is_retryable());
        assert_eq!(err.kind(), "dial_failed");
    }

    #[test]
    fn plain_dial_failure_is_retryable() {
        let err = ExplorationError::Dial { reason: "no answer".into(), carrier_rejected: false };
        assert!(err.is_retryable());
    }
}

//! Capability contracts for the external collaborators the exploration
//! engine depends on but does not implement: the voice-call provider, the
//! speech-to-text provider, and the language model. Real wire protocols are
//! out of scope; `mock` supplies deterministic stand-ins used by tests and
//! by `--dry-run`.

pub mod mock;

use async_trait::async_trait;

use crate::error::ExplorationError;
use crate::models::{AudioFormat, LlmOptions, TranscriptTurn};

/// Places outbound calls and retrieves their recordings once complete.
/// Call completion itself is asynchronous and arrives via the webhook
/// surface, not as this trait's return value.
#[async_trait]
pub trait VoiceApiClient: Send + Sync {
    async fn place_call(
        &self,
        script: &[String],
        phone_number: &str,
    ) -> Result<String, ExplorationError>;

    async fn fetch_recording(
        &self,
        call_id: &str,
        recording_url: &str,
    ) -> Result<Vec<u8>, ExplorationError>;
}

/// Converts a recorded call into a sequence of speaker turns.
#[async_trait]
pub trait Transcriber: Send + Sync {
    async fn transcribe(
        &self,
        audio: &[u8],
        format: AudioFormat,
    ) -> Result<Vec<TranscriptTurn>, ExplorationError>;
}

/// A language model capable of free-form text completion.
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, prompt: &str, options: LlmOptions) -> Result<String, ExplorationError>;
}

//! Deterministic provider implementations used by `--dry-run` and by the
//! integration tests in each module. No network I/O; a recording is just
//! the serialized caller script, and the transcriber replays a scripted
//! IVR tree against it.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::error::ExplorationError;
use crate::models::{AudioFormat, CallCompleteEvent, CallCompleteStatus, CallId, LlmOptions, TranscriptTurn};
use crate::text::normalize;
use crate::webhook::WebhookCorrelator;

use super::{LlmClient, Transcriber, VoiceApiClient};

/// A small branching IVR script: `branches` maps a path of normalized user
/// responses to the agent utterance spoken after that path, with `[]`
/// mapping to the greeting.
#[derive(Debug, Clone)]
pub struct ScriptedIvr {
    branches: HashMap<Vec<String>, String>,
    fallback: String,
}

impl ScriptedIvr {
    pub fn new(greeting: impl Into<String>) -> Self {
        let mut branches = HashMap::new();
        branches.insert(Vec::new(), greeting.into());
        Self {
            branches,
            fallback: "I'm sorry, I didn't understand that. Goodbye.".to_string(),
        }
    }

    /// Register the agent line spoken after `path` (a sequence of raw user
    /// responses, normalized internally for matching).
    pub fn branch(mut self, path: &[&str], agent_line: impl Into<String>) -> Self {
        let normalized_path = path.iter().map(|r| normalize(r)).collect();
        self.branches.insert(normalized_path, agent_line.into());
        self
    }

    fn agent_for(&self, path: &[String]) -> &str {
        let normalized_path: Vec<String> = path.iter().map(|r| normalize(r)).collect();
        self.branches
            .get(&normalized_path)
            .map(|s| s.as_str())
            .unwrap_or(&self.fallback)
    }

    /// A small two-level menu used as the default scenario for `--dry-run`.
    pub fn default_scenario() -> Self {
        Self::new("Thank you for calling. Press 1 for sales, or 2 for support.")
            .branch(&["1"], "Sales hours are nine to five, Monday through Friday. Goodbye.")
            .branch(&["2"], "Support is available twenty four hours. Goodbye.")
    }
}

impl Default for ScriptedIvr {
    fn default() -> Self {
        Self::default_scenario()
    }
}

/// Places calls against a `ScriptedIvr` and self-triggers the webhook
/// completion shortly afterward, the way a real provider would call back.
pub struct MockVoiceApiClient {
    correlator: Arc<WebhookCorrelator>,
    scripts: Mutex<HashMap<String, Vec<String>>>,
}

impl MockVoiceApiClient {
    pub fn new(correlator: Arc<WebhookCorrelator>) -> Self {
        Self {
            correlator,
            scripts: Mutex::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl VoiceApiClient for MockVoiceApiClient {
    async fn place_call(&self, script: &[String], _phone_number: &str) -> Result<String, ExplorationError> {
        let call_id = CallId::new().0;
        self.scripts.lock().await.insert(call_id.clone(), script.to_vec());

        let correlator = self.correlator.clone();
        let event_call_id = call_id.clone();
        tokio::spawn(async move {
            correlator
                .resolve(CallCompleteEvent {
                    call_id: event_call_id,
                    status: CallCompleteStatus::Completed,
                    recording_url: Some("mock://recording".to_string()),
                    duration_s: Some(1.0),
                    error: None,
                })
                .await;
        });

        Ok(call_id)
    }

    async fn fetch_recording(&self, call_id: &str, _recording_url: &str) -> Result<Vec<u8>, ExplorationError> {
        let scripts = self.scripts.lock().await;
        let script = scripts
            .get(call_id)
            .ok_or_else(|| ExplorationError::RecordingUnavailable(call_id.to_string()))?;
        serde_json::to_vec(script)
            .map_err(|e| ExplorationError::RecordingUnavailable(e.to_string()))
    }
}

/// Decodes the mock recording (the serialized caller script) and replays it
/// through a `ScriptedIvr` to produce alternating agent/user turns.
pub struct MockTranscriber {
    ivr: ScriptedIvr,
}

impl MockTranscriber {
    pub fn new(ivr: ScriptedIvr) -> Self {
        Self { ivr }
    }
}

#[async_trait]
impl Transcriber for MockTranscriber {
    async fn transcribe(
        &self,
        audio: &[u8],
        _format: AudioFormat,
    ) -> Result<Vec<TranscriptTurn>, ExplorationError> {
        let script: Vec<String> = serde_json::from_slice(audio)
            .map_err(|e| ExplorationError::Transcription(e.to_string()))?;

        let mut turns = Vec::new();
        let mut t = 0u64;
        let mut path: Vec<String> = Vec::new();

        for response in &script {
            let agent_line = self.ivr.agent_for(&path);
            turns.push(turn(0, agent_line, &mut t));
            turns.push(turn(1, response, &mut t));
            path.push(response.clone());
        }

        let final_line = self.ivr.agent_for(&path);
        turns.push(turn(0, final_line, &mut t));

        Ok(turns)
    }
}

fn turn(speaker: u32, text: &str, t: &mut u64) -> TranscriptTurn {
    let start = *t;
    let end = start + 1500;
    *t = end;
    TranscriptTurn {
        speaker: Some(speaker),
        text: text.to_string(),
        t_start_ms: start,
        t_end_ms: end,
    }
}

/// A canned LM that proposes the next candidate responses for a handful of
/// known agent prompts, and otherwise declares the turn terminal.
pub struct MockLlmClient {
    responses: HashMap<String, String>,
}

impl MockLlmClient {
    pub fn new() -> Self {
        let mut responses = HashMap::new();
        responses.insert(
            normalize("Thank you for calling. Press 1 for sales, or 2 for support."),
            r#"{"candidates": ["1", "2"], "is_terminal": false, "confidence": 0.9}"#.to_string(),
        );
        Self { responses }
    }

    /// Match based on the last agent line embedded in the prompt. Both sides
    /// go through the same canonicalization as graph node matching, so
    /// punctuation and spelled-out digits in the prompt don't break the
    /// lookup against a plainly-written registered key.
    fn lookup(&self, prompt: &str) -> String {
        let normalized_prompt = normalize(prompt);
        for (key, value) in &self.responses {
            if normalized_prompt.contains(key.as_str()) {
                return value.clone();
            }
        }
        r#"{"candidates": [], "is_terminal": true, "confidence": 0.95}"#.to_string()
    }
}

impl Default for MockLlmClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn complete(&self, prompt: &str, _options: LlmOptions) -> Result<String, ExplorationError> {
        Ok(self.lookup(prompt))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::build_expansion_prompt;

    #[tokio::test]
    async fn transcriber_replays_scripted_branches() {
        let transcriber = MockTranscriber::new(ScriptedIvr::default_scenario());
        let script = vec!["1".to_string()];
        let audio = serde_json::to_vec(&script).unwrap();

        let turns = transcriber.transcribe(&audio, AudioFormat::Wav).await.unwrap();
        assert_eq!(turns.len(), 3);
        assert!(turns[0].text.contains("Press 1 for sales"));
        assert_eq!(turns[1].text, "1");
        assert!(turns[2].text.contains("Sales hours"));
    }

    #[tokio::test]
    async fn llm_matches_the_greeting_despite_punctuation_and_digits() {
        let llm = MockLlmClient::new();
        let prompt = build_expansion_prompt(
            "A customer calling to resolve an account issue",
            &[],
            "Thank you for calling. Press 1 for sales, or 2 for support.",
        );

        let raw = llm.complete(&prompt, LlmOptions::default()).await.unwrap();
        assert!(raw.contains("\"1\""));
        assert!(raw.contains("\"2\""));
        assert!(!raw.contains("is_terminal\": true"));
    }

    #[tokio::test]
    async fn voice_client_self_resolves_webhook() {
        let correlator = WebhookCorrelator::new(std::time::Duration::from_secs(5));
        let client = MockVoiceApiClient::new(correlator.clone());

        let call_id = client.place_call(&[], "+15550100").await.unwrap();
        let event = correlator
            .await_completion(&call_id, std::time::Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(event.call_id, call_id);
    }
}

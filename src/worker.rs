//! A single exploration step: place a call, await its transcription, walk
//! the resulting turns into the graph, and ask the LM for the next
//! candidate responses.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::config::ExplorerConfig;
use crate::error::ExplorationError;
use crate::graph::ConversationGraph;
use crate::llm::{build_expansion_prompt, parse, LlmParseOutcome};
use crate::models::{AudioFormat, CallStatus, FrontierEntry, LlmOptions, TranscriptTurn};
use crate::progress::ProgressTracker;
use crate::providers::{LlmClient, Transcriber, VoiceApiClient};
use crate::text::normalize;
use crate::webhook::WebhookCorrelator;

/// What a completed worker task produced: counts for `ProgressTracker`, and
/// any newly proposed frontier work to hand back to the explorer.
pub struct WorkerOutcome {
    pub new_nodes: usize,
    pub new_edges: usize,
    pub new_frontier_entries: Vec<FrontierEntry>,
}

pub struct ConversationWorker {
    graph: Arc<ConversationGraph>,
    voice: Arc<dyn VoiceApiClient>,
    transcriber: Arc<dyn Transcriber>,
    llm: Arc<dyn LlmClient>,
    correlator: Arc<WebhookCorrelator>,
    progress: Arc<ProgressTracker>,
    config: ExplorerConfig,
}

impl ConversationWorker {
    pub fn new(
        graph: Arc<ConversationGraph>,
        voice: Arc<dyn VoiceApiClient>,
        transcriber: Arc<dyn Transcriber>,
        llm: Arc<dyn LlmClient>,
        correlator: Arc<WebhookCorrelator>,
        progress: Arc<ProgressTracker>,
        config: ExplorerConfig,
    ) -> Self {
        Self {
            graph,
            voice,
            transcriber,
            llm,
            correlator,
            progress,
            config,
        }
    }

    /// Run one task to completion. Errors are the caller's signal to decide
    /// retry vs. drop, per `ExplorationError::is_retryable`.
    pub async fn run_task(&self, entry: FrontierEntry) -> Result<WorkerOutcome, ExplorationError> {
        self.progress.record_call_attempted();

        let script = self.build_script(&entry).await;

        info!(status = ?CallStatus::Dialing, "placing call");
        let phone = self.config.target_phone_number.clone().unwrap_or_default();
        let call_id = self.voice.place_call(&script, &phone).await?;

        info!(status = ?CallStatus::AwaitingWebhook, call_id = %call_id, "awaiting webhook");
        let event = self
            .correlator
            .await_completion(&call_id, self.config.call_timeout)
            .await?;

        if event.status != crate::models::CallCompleteStatus::Completed {
            // A carrier-issued failure (as opposed to a plain no-answer) is
            // treated as an explicit reject: retrying won't help.
            let carrier_rejected = event.status == crate::models::CallCompleteStatus::Failed;
            return Err(ExplorationError::Dial {
                reason: event.error.unwrap_or_else(|| format!("{:?}", event.status)),
                carrier_rejected,
            });
        }

        let recording_url = event
            .recording_url
            .ok_or_else(|| ExplorationError::RecordingUnavailable(call_id.clone()))?;
        let audio = self.voice.fetch_recording(&call_id, &recording_url).await?;

        info!(status = ?CallStatus::Transcribing, call_id = %call_id, "transcribing recording");
        let turns = self.transcriber.transcribe(&audio, AudioFormat::Wav).await?;

        info!(status = ?CallStatus::Integrating, call_id = %call_id, "integrating turns into graph");

        let agent_texts = agent_texts(&turns);
        if agent_texts.is_empty() {
            return Err(ExplorationError::Transcription(
                "transcription produced no agent turns".to_string(),
            ));
        }

        let (mut new_nodes, mut new_edges) = (0usize, 0usize);
        let (mut current, created) = self.graph.get_or_create_node(&agent_texts[0]).await;
        if created {
            new_nodes += 1;
        }

        for (k, agent_text) in agent_texts.iter().enumerate().skip(1) {
            let prev_user = script.get(k - 1).cloned().unwrap_or_default();
            let (next, created) = self.graph.get_or_create_node(agent_text).await;
            if created {
                new_nodes += 1;
            }
            if self.graph.add_edge(current, &prev_user, next).await {
                new_edges += 1;
            }
            current = next;
        }

        let path = self.graph.path_to(current).await;
        let still_eligible = self
            .graph
            .frontier_candidates(self.config.breadth_cap, usize::MAX)
            .await
            .contains(&current);

        let mut new_frontier_entries = Vec::new();
        if !still_eligible {
            // Node already carries as many outgoing responses as the breadth
            // cap allows; stop proposing more without spending an LM call.
            debug!(node = ?current, "breadth cap reached, skipping expansion");
        } else {
            let prompt = build_expansion_prompt(
                &self.config.scenario_description,
                &path,
                agent_texts.last().unwrap(),
            );

            let expansion = self.expand(&prompt).await?;

            if expansion.is_terminal {
                self.graph.mark_terminal(current).await;
                self.progress.record_terminal_marked();
            } else {
                let mut seen: HashSet<String> = self
                    .graph
                    .existing_responses(current)
                    .await
                    .into_iter()
                    .collect();
                let depth = path.len() as u32 + 1;

                for candidate in expansion.candidates {
                    if seen.insert(normalize(&candidate)) {
                        new_frontier_entries.push(FrontierEntry {
                            node_id: Some(current),
                            candidate_response: candidate,
                            depth,
                            attempts: 0,
                        });
                    }
                }
            }
        }

        self.progress.record_call_outcome(new_nodes, new_edges);

        Ok(WorkerOutcome {
            new_nodes,
            new_edges,
            new_frontier_entries,
        })
    }

    async fn build_script(&self, entry: &FrontierEntry) -> Vec<String> {
        match entry.node_id {
            None => Vec::new(),
            Some(node_id) => {
                let mut script: Vec<String> = self
                    .graph
                    .path_to(node_id)
                    .await
                    .into_iter()
                    .map(|(_, response)| response)
                    .collect();
                script.push(entry.candidate_response.clone());
                script
            }
        }
    }

    async fn expand(&self, prompt: &str) -> Result<crate::models::LlmExpansion, ExplorationError> {
        let mut last_error = None;

        for attempt in 0..=self.config.llm_retry_max {
            if attempt > 0 {
                warn!(attempt, "retrying LLM expansion after parse failure");
            }

            match self.llm.complete(prompt, LlmOptions::default()).await {
                Ok(raw) => match parse(&raw) {
                    LlmParseOutcome::Parsed(expansion) => return Ok(expansion),
                    LlmParseOutcome::Failed => {
                        self.progress.record_call_failed("llm_parse_failed");
                        last_error = Some(ExplorationError::LlmParse(raw));
                    }
                },
                Err(e) => last_error = Some(e),
            }
        }

        Err(last_error.unwrap_or_else(|| ExplorationError::LlmParse("no response".to_string())))
    }
}

/// Extract just the agent's lines from a turn list. Prefers explicit speaker
/// ids (agent = 0) when present; falls back to strict alternation starting
/// with the agent when diarization is unavailable.
fn agent_texts(turns: &[TranscriptTurn]) -> Vec<String> {
    let has_speaker_info = turns.iter().any(|t| t.speaker.is_some());

    if has_speaker_info {
        turns
            .iter()
            .filter(|t| t.speaker == Some(0))
            .map(|t| t.text.clone())
            .collect()
    } else {
        turns
            .iter()
            .step_by(2)
            .map(|t| t.text.clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn agent_texts_prefers_speaker_zero_when_known() {
        let turns = vec![
            TranscriptTurn { speaker: Some(0), text: "Welcome.".into(), t_start_ms: 0, t_end_ms: 1 },
            TranscriptTurn { speaker: Some(1), text: "hi".into(), t_start_ms: 1, t_end_ms: 2 },
            TranscriptTurn { speaker: Some(0), text: "Goodbye.".into(), t_start_ms: 2, t_end_ms: 3 },
        ];
        assert_eq!(agent_texts(&turns), vec!["Welcome.", "Goodbye."]);
    }

    #[test]
    fn agent_texts_alternates_when_speaker_unknown() {
        let turns = vec![
            TranscriptTurn { speaker: None, text: "Welcome.".into(), t_start_ms: 0, t_end_ms: 1 },
            TranscriptTurn { speaker: None, text: "hi".into(), t_start_ms: 1, t_end_ms: 2 },
            TranscriptTurn { speaker: None, text: "Goodbye.".into(), t_start_ms: 2, t_end_ms: 3 },
        ];
        assert_eq!(agent_texts(&turns), vec!["Welcome.", "Goodbye."]);
    }
}

//! Builds the prompt sent to the language model at a newly-discovered
//! conversation node: the caller persona, the dialogue so far, and a
//! request for the next plausible user responses.

/// System prompt stating the task's non-negotiable output contract.
pub const SYSTEM_PROMPT: &str = r#"You are helping map the conversation tree of an automated phone agent (an IVR).
You will be shown the dialogue of a call so far and asked to propose what a
caller might plausibly say next, and whether the agent's last line ends the
call.

You MUST respond with a single fenced JSON code block matching this shape:
```json
{"candidates": ["..."], "is_terminal": false, "confidence": 0.0}
```
- "candidates": 1-4 short, plausible next user utterances. Empty if is_terminal is true.
- "is_terminal": true if the agent's last line is a goodbye, voicemail, or call transfer with nothing further to explore.
- "confidence": your confidence in this judgment, 0 to 1.

Do not include any other text outside the fenced block."#;

/// Build the user-turn prompt for a node: the scenario, the path from root,
/// and the agent's line at this node.
pub fn build_expansion_prompt(
    scenario_description: &str,
    path: &[(String, String)],
    current_agent_line: &str,
) -> String {
    let mut prompt = String::new();

    prompt.push_str("## Scenario\n");
    prompt.push_str(scenario_description);
    prompt.push_str("\n\n## Dialogue so far\n");

    for (agent_line, user_response) in path {
        prompt.push_str(&format!("Agent: {agent_line}\n"));
        prompt.push_str(&format!("Caller: {user_response}\n"));
    }
    prompt.push_str(&format!("Agent: {current_agent_line}\n"));

    prompt.push_str("\n## Instructions\n");
    prompt.push_str(
        "Given this dialogue, propose the next plausible caller responses and judge whether \
         the agent's last line ends the call. Respond with the fenced JSON block only.",
    );

    prompt
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompt_replays_the_full_path() {
        let path = vec![
            ("Welcome.".to_string(), "continue".to_string()),
            ("Press 1 for sales.".to_string(), "1".to_string()),
        ];
        let prompt = build_expansion_prompt("A customer calling about billing", &path, "Sales hours are nine to five.");

        assert!(prompt.contains("Agent: Welcome."));
        assert!(prompt.contains("Caller: continue"));
        assert!(prompt.contains("Agent: Press 1 for sales."));
        assert!(prompt.contains("Agent: Sales hours are nine to five."));
    }

    #[test]
    fn prompt_is_deterministic() {
        let path = vec![("Welcome.".to_string(), "continue".to_string())];
        let a = build_expansion_prompt("scenario", &path, "next");
        let b = build_expansion_prompt("scenario", &path, "next");
        assert_eq!(a, b);
    }
}

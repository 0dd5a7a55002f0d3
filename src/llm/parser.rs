//! Parses LM output into a structured `LlmExpansion`, tolerating prose
//! wrapped around the requested JSON block.

use crate::models::LlmExpansion;

/// Outcome of attempting to parse one LM response.
pub enum LlmParseOutcome {
    Parsed(LlmExpansion),
    Failed,
}

/// Extract an `LlmExpansion` from raw LM output. Looks for a fenced
/// ```` ```json ```` (or bare ``` ``` ````) block first, falling back to
/// scanning bullet/numbered list lines for candidate responses.
pub fn parse(raw: &str) -> LlmParseOutcome {
    if let Some(block) = extract_fenced_block(raw) {
        if let Ok(expansion) = serde_json::from_str::<LlmExpansion>(&block) {
            return LlmParseOutcome::Parsed(expansion);
        }
    }

    if let Some(expansion) = parse_list_fallback(raw) {
        return LlmParseOutcome::Parsed(expansion);
    }

    LlmParseOutcome::Failed
}

fn extract_fenced_block(raw: &str) -> Option<String> {
    let start_marker = raw.find("```json").map(|i| i + "```json".len())
        .or_else(|| raw.find("```").map(|i| i + "```".len()))?;
    let rest = &raw[start_marker..];
    let end = rest.find("```")?;
    Some(rest[..end].trim().to_string())
}

/// Best-effort fallback: treat numbered/bulleted lines as candidates and
/// declare terminal only if the text explicitly says so.
fn parse_list_fallback(raw: &str) -> Option<LlmExpansion> {
    let candidates: Vec<String> = raw
        .lines()
        .filter_map(|line| {
            let trimmed = line.trim();
            let stripped = trimmed
                .trim_start_matches(|c: char| c.is_ascii_digit())
                .trim_start_matches('.')
                .trim_start_matches('-')
                .trim_start_matches('*')
                .trim();
            if stripped.is_empty() || stripped == trimmed {
                None
            } else {
                Some(stripped.to_string())
            }
        })
        .collect();

    if candidates.is_empty() {
        return None;
    }

    let is_terminal = raw.to_lowercase().contains("terminal") && raw.to_lowercase().contains("true");

    Some(LlmExpansion {
        candidates,
        is_terminal,
        confidence: 0.5,
    })
}

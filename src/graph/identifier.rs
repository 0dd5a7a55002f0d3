//! Decides whether a newly observed utterance matches an existing node.

use crate::models::{ConversationNode, NodeId};
use crate::similarity;

/// Find the highest-scoring existing node whose normalized utterance is
/// within `threshold` similarity of `normalized`, if any.
///
/// `candidates` is prefiltered by length and first-token before scoring, so
/// large graphs don't pay full pairwise comparison cost on every insert.
/// Ties are broken by lower node id, for determinism under concurrency.
pub fn find_match<'a>(
    candidates: impl Iterator<Item = &'a ConversationNode>,
    normalized: &str,
    threshold: f64,
) -> Option<NodeId> {
    let len = normalized.len();
    let first_token = normalized.split_whitespace().next();

    let mut best: Option<(NodeId, f64)> = None;

    for node in candidates {
        if !length_bucket_matches(len, node.normalized_utterance.len()) {
            continue;
        }
        if let Some(first) = first_token {
            if node.normalized_utterance.split_whitespace().next() != Some(first) {
                continue;
            }
        }

        let score = similarity::score(normalized, &node.normalized_utterance);
        if score < threshold {
            continue;
        }

        best = match best {
            Some((best_id, best_score)) if best_score > score => Some((best_id, best_score)),
            Some((best_id, best_score)) if best_score == score && best_id.0 < node.id.0 => {
                Some((best_id, best_score))
            }
            _ => Some((node.id, score)),
        };
    }

    best.map(|(id, _)| id)
}

fn length_bucket_matches(a: usize, b: usize) -> bool {
    if a == 0 || b == 0 {
        return a == b;
    }
    let (small, large) = if a < b { (a, b) } else { (b, a) };
    (small as f64) >= (large as f64) * 0.7
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(id: u64, utterance: &str) -> ConversationNode {
        ConversationNode {
            id: NodeId(id),
            utterance: utterance.to_string(),
            normalized_utterance: crate::text::normalize(utterance),
            is_terminal: false,
            depth_min: 0,
            visit_count: 1,
            dropped_errors: 0,
        }
    }

    #[test]
    fn matches_near_duplicate_above_threshold() {
        let nodes = vec![node(1, "please say your account number")];
        let normalized = crate::text::normalize("please say your account number");
        assert_eq!(
            find_match(nodes.iter(), &normalized, 0.85),
            Some(NodeId(1))
        );
    }

    #[test]
    fn does_not_match_unrelated_utterance() {
        let nodes = vec![node(1, "please say your account number")];
        let normalized = crate::text::normalize("your call cannot be completed as dialed");
        assert_eq!(find_match(nodes.iter(), &normalized, 0.85), None);
    }

    #[test]
    fn ties_break_to_lower_id() {
        let nodes = vec![
            node(5, "press one for sales"),
            node(2, "press one for sales"),
        ];
        let normalized = crate::text::normalize("press one for sales");
        assert_eq!(find_match(nodes.iter(), &normalized, 0.85), Some(NodeId(2)));
    }
}

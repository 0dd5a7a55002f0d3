//! Token-set similarity over already-normalized utterances, used to decide
//! whether two transcribed agent turns refer to the same conversation node.

use std::collections::BTreeSet;

/// Score the similarity of two normalized strings in `[0, 1]`.
///
/// Builds three comparison strings the way token-set-ratio algorithms do
/// (sorted intersection, intersection + each side's sorted remainder) and
/// takes the best pairwise Jaro-Winkler score among them. Symmetric and
/// reflexive; monotone under appending a common suffix.
pub fn score(a: &str, b: &str) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    if a == b {
        return 1.0;
    }

    let tokens_a: BTreeSet<&str> = a.split_whitespace().collect();
    let tokens_b: BTreeSet<&str> = b.split_whitespace().collect();

    let intersection: Vec<&str> = tokens_a.intersection(&tokens_b).copied().collect();
    let only_a: Vec<&str> = tokens_a.difference(&tokens_b).copied().collect();
    let only_b: Vec<&str> = tokens_b.difference(&tokens_a).copied().collect();

    let sorted_intersection = join_sorted(&intersection);
    let combined_a = join_sorted(&[intersection.clone(), only_a].concat());
    let combined_b = join_sorted(&[intersection.clone(), only_b].concat());

    let candidates = [
        strsim::jaro_winkler(&sorted_intersection, &combined_a),
        strsim::jaro_winkler(&sorted_intersection, &combined_b),
        strsim::jaro_winkler(&combined_a, &combined_b),
        strsim::jaro_winkler(a, b),
    ];

    candidates.into_iter().fold(0.0, f64::max)
}

fn join_sorted(tokens: &[&str]) -> String {
    let mut sorted: Vec<&str> = tokens.to_vec();
    sorted.sort_unstable();
    sorted.join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_strings_score_one() {
        assert_eq!(score("press one for sales", "press one for sales"), 1.0);
    }

    #[test]
    fn empty_string_scores_zero() {
        assert_eq!(score("", "press one"), 0.0);
        assert_eq!(score("press one", ""), 0.0);
    }

    #[test]
    fn is_symmetric() {
        let a = "please say your account number";
        let b = "say your account number please";
        assert!((score(a, b) - score(b, a)).abs() < 1e-9);
    }

    #[test]
    fn near_duplicates_score_above_threshold() {
        let a = "please say your account number";
        let b = "please say your account number";
        assert!(score(a, b) >= 0.85);
    }

    #[test]
    fn unrelated_strings_score_low() {
        let a = "press one for sales";
        let b = "your call cannot be completed as dialed";
        assert!(score(a, b) < 0.5);
    }
}

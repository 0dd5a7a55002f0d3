//! Canonicalization of transcribed utterances so that two renderings of the
//! same agent prompt compare equal regardless of transcription noise.

const FILLER_WORDS: &[&str] = &["um", "uh", "er", "ah"];

const DIGIT_WORDS: &[(&str, &str)] = &[
    ("0", "zero"),
    ("1", "one"),
    ("2", "two"),
    ("3", "three"),
    ("4", "four"),
    ("5", "five"),
    ("6", "six"),
    ("7", "seven"),
    ("8", "eight"),
    ("9", "nine"),
];

/// Normalize an utterance for comparison: lowercase, strip punctuation and
/// filler words, spell out digits, collapse whitespace.
///
/// Idempotent: `normalize(normalize(x)) == normalize(x)`.
pub fn normalize(text: &str) -> String {
    let lowered = text.to_lowercase();

    let words: Vec<String> = lowered
        .split_whitespace()
        .map(strip_punctuation)
        .filter(|w| !w.is_empty())
        .filter(|w| !FILLER_WORDS.contains(&w.as_str()))
        .map(spell_digits)
        .collect();

    words.join(" ")
}

fn strip_punctuation(word: &str) -> String {
    word.chars()
        .filter(|c| c.is_alphanumeric())
        .collect()
}

fn spell_digits(word: String) -> String {
    for (digit, spelled) in DIGIT_WORDS {
        if word == *digit {
            return spelled.to_string();
        }
    }
    word
}

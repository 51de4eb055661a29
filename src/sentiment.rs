//! Lexicon polarity for short review summaries.
//!
//! Each known word carries a polarity in [-1, 1]. An intensifier directly
//! before a word scales it, a negator within the two preceding tokens flips
//! and dampens it. The score is the mean over matched words, 0 when nothing
//! matches.

use once_cell::sync::Lazy;
use std::collections::HashMap;

static LEXICON: Lazy<HashMap<&'static str, f64>> = Lazy::new(|| {
    HashMap::from([
        ("amazing", 0.6),
        ("awesome", 1.0),
        ("awful", -1.0),
        ("bad", -0.7),
        ("best", 1.0),
        ("better", 0.5),
        ("bland", -0.5),
        ("boring", -1.0),
        ("broken", -0.4),
        ("cheap", 0.4),
        ("delicious", 1.0),
        ("disappointed", -0.75),
        ("disappointing", -0.6),
        ("disgusting", -1.0),
        ("excellent", 1.0),
        ("fantastic", 0.4),
        ("fine", 0.4),
        ("fresh", 0.3),
        ("good", 0.7),
        ("great", 0.8),
        ("happy", 0.8),
        ("horrible", -1.0),
        ("love", 0.5),
        ("loved", 0.7),
        ("nice", 0.6),
        ("okay", 0.5),
        ("perfect", 1.0),
        ("poor", -0.4),
        ("recommend", 0.3),
        ("rotten", -0.8),
        ("sad", -0.5),
        ("stale", -0.5),
        ("tasty", 0.8),
        ("terrible", -1.0),
        ("waste", -0.2),
        ("wonderful", 1.0),
        ("worse", -0.4),
        ("worst", -1.0),
        ("yummy", 0.8),
    ])
});

static INTENSIFIERS: Lazy<HashMap<&'static str, f64>> = Lazy::new(|| {
    HashMap::from([
        ("very", 1.3),
        ("really", 1.3),
        ("so", 1.3),
        ("extremely", 1.5),
        ("super", 1.5),
        ("totally", 1.4),
        ("pretty", 1.1),
        ("quite", 1.1),
    ])
});

const NEGATORS: [&str; 6] = ["not", "no", "never", "isn't", "don't", "wasn't"];
const NEGATION_FACTOR: f64 = -0.5;

fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !(c.is_alphanumeric() || c == '\''))
        .filter(|t| !t.is_empty())
        .map(|t| t.trim_matches('\'').to_lowercase())
        .filter(|t| !t.is_empty())
        .collect()
}

/// Polarity of `text` in [-1, 1].
pub fn polarity(text: &str) -> f64 {
    let tokens = tokenize(text);
    let mut scores = Vec::new();
    for (i, token) in tokens.iter().enumerate() {
        let Some(&base) = LEXICON.get(token.as_str()) else {
            continue;
        };
        let mut score = base;
        if i >= 1 {
            if let Some(&boost) = INTENSIFIERS.get(tokens[i - 1].as_str()) {
                score *= boost;
            }
        }
        let window = i.saturating_sub(2)..i;
        if tokens[window]
            .iter()
            .any(|t| NEGATORS.contains(&t.as_str()) || t.ends_with("n't"))
        {
            score *= NEGATION_FACTOR;
        }
        scores.push(score.clamp(-1.0, 1.0));
    }
    if scores.is_empty() {
        return 0.0;
    }
    scores.iter().sum::<f64>() / scores.len() as f64
}

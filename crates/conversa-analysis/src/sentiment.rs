// SPDX-FileCopyrightText: 2026 Conversa Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Lexicon-based sentiment scoring.
//!
//! Deliberately simple: valence word counting normalized to [-1.0, 1.0].
//! Deterministic, dependency-free, and honest about being a baseline --
//! a model-backed analyzer can replace it behind the same trait.

/// Positive valence lexicon.
const POSITIVE: &[&str] = &[
    "good", "great", "excellent", "happy", "glad", "love", "liked", "like", "awesome",
    "wonderful", "nice", "fantastic", "perfect", "thanks", "thank", "agree", "agreed",
    "yes", "fun", "enjoy", "enjoyed", "success", "works", "working", "better", "best",
];

/// Negative valence lexicon.
const NEGATIVE: &[&str] = &[
    "bad", "terrible", "awful", "sad", "angry", "hate", "hated", "broken", "fail",
    "failed", "failure", "wrong", "worse", "worst", "no", "never", "problem",
    "problems", "annoying", "frustrated", "frustrating", "bug", "bugs", "ugh", "sorry",
];

/// Per-span sentiment summary.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SentimentScore {
    /// Normalized valence in [-1.0, 1.0]; 0.0 when no lexicon words hit.
    pub score: f64,
    pub positive_hits: usize,
    pub negative_hits: usize,
}

/// Score a piece of utterance text.
pub fn score_text(text: &str) -> SentimentScore {
    let mut positive_hits = 0usize;
    let mut negative_hits = 0usize;

    for token in text
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
    {
        let token = token.to_lowercase();
        if POSITIVE.contains(&token.as_str()) {
            positive_hits += 1;
        } else if NEGATIVE.contains(&token.as_str()) {
            negative_hits += 1;
        }
    }

    let total = positive_hits + negative_hits;
    let score = if total == 0 {
        0.0
    } else {
        (positive_hits as f64 - negative_hits as f64) / total as f64
    };

    SentimentScore {
        score,
        positive_hits,
        negative_hits,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn neutral_text_scores_zero() {
        let s = score_text("the meeting is at three on tuesday");
        assert_eq!(s.score, 0.0);
        assert_eq!(s.positive_hits, 0);
        assert_eq!(s.negative_hits, 0);
    }

    #[test]
    fn positive_text_scores_positive() {
        let s = score_text("great demo, really happy with it, thanks");
        assert!(s.score > 0.0);
        assert_eq!(s.negative_hits, 0);
        assert_eq!(s.positive_hits, 3);
    }

    #[test]
    fn negative_text_scores_negative() {
        let s = score_text("the build is broken again, terrible");
        assert!(s.score < 0.0);
        assert_eq!(s.negative_hits, 2);
    }

    #[test]
    fn mixed_text_lands_between_extremes() {
        let s = score_text("good progress but the tests failed");
        assert_eq!(s.positive_hits, 1);
        assert_eq!(s.negative_hits, 1);
        assert_eq!(s.score, 0.0);
    }

    #[test]
    fn score_is_bounded() {
        let s = score_text("great great great wonderful perfect");
        assert!((-1.0..=1.0).contains(&s.score));
        assert_eq!(s.score, 1.0);
    }

    #[test]
    fn matching_is_case_insensitive() {
        let s = score_text("GREAT stuff");
        assert_eq!(s.positive_hits, 1);
    }
}

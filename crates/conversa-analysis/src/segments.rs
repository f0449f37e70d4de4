// SPDX-FileCopyrightText: 2026 Conversa Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Topic segmentation over detected turns.
//!
//! Adjacent turns are compared by token-set Jaccard similarity; a segment
//! boundary opens where the similarity drops below the configured threshold.
//! Cheap and deterministic -- a TextTiling-style pass without the embedding
//! machinery.

use std::collections::HashSet;

use chrono::{DateTime, Utc};

use crate::turns::Turn;

/// A contiguous topical segment of a conversation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub turn_count: usize,
    pub token_count: usize,
}

/// Lowercased alphanumeric token set of an utterance.
pub fn tokenize(text: &str) -> HashSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase())
        .collect()
}

/// Jaccard similarity between two token sets. Two empty sets are treated as
/// fully similar so silence never opens a segment on its own.
pub fn jaccard(a: &HashSet<String>, b: &HashSet<String>) -> f64 {
    if a.is_empty() && b.is_empty() {
        return 1.0;
    }
    let intersection = a.intersection(b).count();
    let union = a.union(b).count();
    intersection as f64 / union as f64
}

/// Split turns into topical segments.
pub fn segment_turns(turns: &[Turn], similarity_threshold: f64) -> Vec<Segment> {
    let mut segments: Vec<Segment> = Vec::new();
    let mut previous_tokens: Option<HashSet<String>> = None;

    for turn in turns {
        let tokens = tokenize(&turn.text);

        let starts_new_segment = match &previous_tokens {
            None => true,
            Some(prev) => jaccard(prev, &tokens) < similarity_threshold,
        };

        if starts_new_segment {
            segments.push(Segment {
                start: turn.start,
                end: turn.end,
                turn_count: 0,
                token_count: 0,
            });
        }

        let segment = segments.last_mut().expect("segment pushed above");
        segment.end = turn.end;
        segment.turn_count += 1;
        segment.token_count += tokens.len();

        previous_tokens = Some(tokens);
    }

    segments
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use conversa_core::types::DeviceId;

    fn turn(secs: i64, text: &str) -> Turn {
        Turn {
            speaker: DeviceId("a".into()),
            start: Utc.timestamp_opt(secs, 0).unwrap(),
            end: Utc.timestamp_opt(secs + 1, 0).unwrap(),
            text: text.into(),
            fragment_count: 1,
        }
    }

    #[test]
    fn tokenize_strips_punctuation_and_case() {
        let tokens = tokenize("Well, the Demo went GREAT!");
        assert!(tokens.contains("demo"));
        assert!(tokens.contains("great"));
        assert!(!tokens.contains(""));
        assert_eq!(tokens.len(), 5);
    }

    #[test]
    fn jaccard_of_identical_sets_is_one() {
        let a = tokenize("same words here");
        assert!((jaccard(&a, &a) - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn jaccard_of_disjoint_sets_is_zero() {
        let a = tokenize("alpha beta");
        let b = tokenize("gamma delta");
        assert_eq!(jaccard(&a, &b), 0.0);
    }

    #[test]
    fn topic_shift_opens_segment() {
        let turns = vec![
            turn(0, "the deploy pipeline failed again"),
            turn(10, "pipeline failed because the deploy token expired"),
            turn(20, "anyway lunch plans for friday"),
        ];
        let segments = segment_turns(&turns, 0.15);
        assert_eq!(segments.len(), 2);
        assert_eq!(segments[0].turn_count, 2);
        assert_eq!(segments[1].turn_count, 1);
        assert_eq!(segments[1].start, turns[2].start);
    }

    #[test]
    fn sustained_topic_stays_one_segment() {
        let turns = vec![
            turn(0, "the budget review meeting"),
            turn(10, "budget review covers the meeting notes"),
        ];
        let segments = segment_turns(&turns, 0.15);
        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].turn_count, 2);
    }

    #[test]
    fn empty_turns_produce_no_segments() {
        assert!(segment_turns(&[], 0.15).is_empty());
    }
}

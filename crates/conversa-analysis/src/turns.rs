// SPDX-FileCopyrightText: 2026 Conversa Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Turn detection over an ordered fragment slice.
//!
//! A turn is a maximal run of fragments from one device. A boundary opens
//! where the speaking device changes, or where a single device falls silent
//! for longer than the configured gap.

use std::time::Duration;

use chrono::{DateTime, Utc};

use conversa_core::types::{DeviceId, Fragment, PayloadKind};

/// A detected speaking turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Turn {
    pub speaker: DeviceId,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    /// Utterance text concatenated across the turn's text fragments.
    pub text: String,
    pub fragment_count: usize,
}

/// Detect turns in an ordered slice.
///
/// Join fragments carry no utterance and are skipped. The slice must already
/// be in committed timeline order.
pub fn detect_turns(slice: &[Fragment], turn_gap: Duration) -> Vec<Turn> {
    let gap = chrono::Duration::from_std(turn_gap).unwrap_or_else(|_| chrono::Duration::zero());
    let mut turns: Vec<Turn> = Vec::new();

    for fragment in slice {
        if fragment.payload_kind == PayloadKind::Join {
            continue;
        }

        let starts_new_turn = match turns.last() {
            None => true,
            Some(turn) => {
                turn.speaker != fragment.device_id || fragment.capture_ts - turn.end > gap
            }
        };

        if starts_new_turn {
            turns.push(Turn {
                speaker: fragment.device_id.clone(),
                start: fragment.capture_ts,
                end: fragment.capture_ts,
                text: String::new(),
                fragment_count: 0,
            });
        }

        let turn = turns.last_mut().expect("turn pushed above");
        turn.end = fragment.capture_ts;
        turn.fragment_count += 1;
        if fragment.payload_kind == PayloadKind::Text {
            if !turn.text.is_empty() {
                turn.text.push(' ');
            }
            turn.text.push_str(&fragment.payload);
        }
    }

    turns
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn frag(device: &str, secs: i64, text: &str) -> Fragment {
        Fragment {
            device_id: DeviceId(device.into()),
            seq: 0,
            capture_ts: Utc.timestamp_opt(secs, 0).unwrap(),
            payload_kind: PayloadKind::Text,
            payload: text.into(),
            arrival_ts: Utc.timestamp_opt(secs, 0).unwrap(),
        }
    }

    #[test]
    fn empty_slice_has_no_turns() {
        assert!(detect_turns(&[], Duration::from_secs(2)).is_empty());
    }

    #[test]
    fn speaker_change_opens_turn() {
        let slice = vec![
            frag("a", 0, "how was the demo"),
            frag("a", 1, "yesterday"),
            frag("b", 2, "it went well"),
        ];
        let turns = detect_turns(&slice, Duration::from_secs(10));
        assert_eq!(turns.len(), 2);
        assert_eq!(turns[0].speaker.0, "a");
        assert_eq!(turns[0].text, "how was the demo yesterday");
        assert_eq!(turns[0].fragment_count, 2);
        assert_eq!(turns[1].speaker.0, "b");
    }

    #[test]
    fn silence_gap_opens_turn_for_same_speaker() {
        let slice = vec![frag("a", 0, "first thought"), frag("a", 30, "new thought")];
        let turns = detect_turns(&slice, Duration::from_secs(2));
        assert_eq!(turns.len(), 2);
        assert_eq!(turns[0].speaker, turns[1].speaker);
    }

    #[test]
    fn gap_at_threshold_does_not_split() {
        let slice = vec![frag("a", 0, "one"), frag("a", 2, "two")];
        let turns = detect_turns(&slice, Duration::from_secs(2));
        assert_eq!(turns.len(), 1);
        assert_eq!(turns[0].fragment_count, 2);
    }

    #[test]
    fn join_fragments_are_skipped() {
        let mut join = frag("b", 1, "c-target");
        join.payload_kind = PayloadKind::Join;
        let slice = vec![frag("a", 0, "hello"), join, frag("a", 2, "still me")];
        let turns = detect_turns(&slice, Duration::from_secs(10));
        assert_eq!(turns.len(), 1);
        assert_eq!(turns[0].fragment_count, 2);
    }

    #[test]
    fn audio_ref_counts_without_contributing_text() {
        let mut audio = frag("a", 1, "blob://clip-9");
        audio.payload_kind = PayloadKind::AudioRef;
        let slice = vec![frag("a", 0, "listen to this"), audio];
        let turns = detect_turns(&slice, Duration::from_secs(10));
        assert_eq!(turns.len(), 1);
        assert_eq!(turns[0].fragment_count, 2);
        assert_eq!(turns[0].text, "listen to this");
    }
}

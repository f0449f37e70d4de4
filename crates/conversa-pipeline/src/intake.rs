// SPDX-FileCopyrightText: 2026 Conversa Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Fragment validation and per-device deduplication.
//!
//! Intake never does blocking I/O: validation and dedup are in-memory, and
//! the downstream enqueue is bounded by the backpressure wait.

use std::collections::{HashSet, VecDeque};

use chrono::{DateTime, Utc};

use conversa_core::types::{FragmentSubmission, PayloadKind, RejectReason};

/// Bounded ring of recently seen sequence numbers for one device.
///
/// Duplicates within the ring are detected; duplicates older than the ring
/// are accepted as new fragments. That is a deliberate bounded-memory
/// tradeoff, not a correctness bug: retention is capped per device, and the
/// timeline merge tolerates the rare re-accepted stale fragment the same way
/// it tolerates any late arrival.
#[derive(Debug)]
pub struct DedupRing {
    capacity: usize,
    order: VecDeque<u64>,
    seen: HashSet<u64>,
}

impl DedupRing {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            order: VecDeque::with_capacity(capacity.max(1)),
            seen: HashSet::with_capacity(capacity.max(1)),
        }
    }

    /// Whether this sequence number is within the retained window.
    pub fn contains(&self, seq: u64) -> bool {
        self.seen.contains(&seq)
    }

    /// Record a sequence number, evicting the oldest entry when full.
    pub fn record(&mut self, seq: u64) {
        if self.seen.contains(&seq) {
            return;
        }
        if self.order.len() == self.capacity
            && let Some(evicted) = self.order.pop_front()
        {
            self.seen.remove(&evicted);
        }
        self.order.push_back(seq);
        self.seen.insert(seq);
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

/// Validate a submission's shape and clock sanity.
///
/// Returns the rejection reason, or `None` if the submission is acceptable.
/// Device registration is checked by the session tracker, which owns the
/// registry.
pub fn validate(
    submission: &FragmentSubmission,
    now: DateTime<Utc>,
    clock_skew_tolerance: std::time::Duration,
) -> Option<RejectReason> {
    if submission.device_id.0.trim().is_empty() {
        return Some(RejectReason::MalformedPayload("empty device id".into()));
    }

    if submission.payload.is_empty() {
        return Some(RejectReason::MalformedPayload("empty payload".into()));
    }

    if submission.payload_kind == PayloadKind::Join
        && submission.payload.trim() != submission.payload
    {
        return Some(RejectReason::MalformedPayload(
            "join payload is not a conversation id".into(),
        ));
    }

    let skew = chrono::Duration::from_std(clock_skew_tolerance)
        .unwrap_or_else(|_| chrono::Duration::zero());
    if submission.capture_ts > now + skew {
        return Some(RejectReason::ClockSkew);
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use conversa_core::types::DeviceId;
    use std::time::Duration;

    fn submission(kind: PayloadKind, payload: &str, capture_secs: i64) -> FragmentSubmission {
        FragmentSubmission {
            device_id: DeviceId("dev-a".into()),
            seq: 1,
            capture_ts: Utc.timestamp_opt(capture_secs, 0).unwrap(),
            payload_kind: kind,
            payload: payload.into(),
        }
    }

    #[test]
    fn ring_detects_duplicates_within_window() {
        let mut ring = DedupRing::new(4);
        ring.record(10);
        ring.record(11);
        assert!(ring.contains(10));
        assert!(ring.contains(11));
        assert!(!ring.contains(12));
    }

    #[test]
    fn ring_evicts_oldest_beyond_capacity() {
        let mut ring = DedupRing::new(3);
        for seq in 0..5 {
            ring.record(seq);
        }
        assert_eq!(ring.len(), 3);
        // 0 and 1 fell off the ring: duplicates this old go undetected.
        assert!(!ring.contains(0));
        assert!(!ring.contains(1));
        assert!(ring.contains(2));
        assert!(ring.contains(4));
    }

    #[test]
    fn ring_ignores_re_recorded_seq() {
        let mut ring = DedupRing::new(3);
        ring.record(1);
        ring.record(1);
        ring.record(1);
        assert_eq!(ring.len(), 1);
    }

    #[test]
    fn valid_submission_passes() {
        let now = Utc.timestamp_opt(1_000, 0).unwrap();
        let sub = submission(PayloadKind::Text, "hello", 990);
        assert_eq!(validate(&sub, now, Duration::from_secs(30)), None);
    }

    #[test]
    fn empty_payload_is_malformed() {
        let now = Utc.timestamp_opt(1_000, 0).unwrap();
        let sub = submission(PayloadKind::Text, "", 990);
        assert!(matches!(
            validate(&sub, now, Duration::from_secs(30)),
            Some(RejectReason::MalformedPayload(_))
        ));
    }

    #[test]
    fn empty_device_id_is_malformed() {
        let now = Utc.timestamp_opt(1_000, 0).unwrap();
        let mut sub = submission(PayloadKind::Text, "hello", 990);
        sub.device_id = DeviceId("  ".into());
        assert!(matches!(
            validate(&sub, now, Duration::from_secs(30)),
            Some(RejectReason::MalformedPayload(_))
        ));
    }

    #[test]
    fn future_capture_beyond_skew_is_rejected() {
        let now = Utc.timestamp_opt(1_000, 0).unwrap();
        let sub = submission(PayloadKind::Text, "hello", 1_031);
        assert_eq!(
            validate(&sub, now, Duration::from_secs(30)),
            Some(RejectReason::ClockSkew)
        );
    }

    #[test]
    fn future_capture_within_skew_is_accepted() {
        let now = Utc.timestamp_opt(1_000, 0).unwrap();
        let sub = submission(PayloadKind::Text, "hello", 1_029);
        assert_eq!(validate(&sub, now, Duration::from_secs(30)), None);
    }

    #[test]
    fn padded_join_payload_is_malformed() {
        let now = Utc.timestamp_opt(1_000, 0).unwrap();
        let sub = submission(PayloadKind::Join, " c-1 ", 990);
        assert!(matches!(
            validate(&sub, now, Duration::from_secs(30)),
            Some(RejectReason::MalformedPayload(_))
        ));
    }
}

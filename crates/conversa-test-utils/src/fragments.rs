// SPDX-FileCopyrightText: 2026 Conversa Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Fragment submission builders.
//!
//! The pipeline validates capture timestamps against the wall clock, so
//! builders express capture times as offsets from "now".

use chrono::{DateTime, Duration, Utc};

use conversa_core::types::{DeviceId, FragmentSubmission, PayloadKind};

/// A text fragment captured `offset_ms` relative to now (negative = past).
pub fn text_fragment(device: &str, seq: u64, offset_ms: i64, payload: &str) -> FragmentSubmission {
    FragmentSubmission {
        device_id: DeviceId(device.to_string()),
        seq,
        capture_ts: at_offset(offset_ms),
        payload_kind: PayloadKind::Text,
        payload: payload.to_string(),
    }
}

/// A join fragment targeting `conversation_id`, captured `offset_ms` from now.
pub fn join_fragment(device: &str, seq: u64, offset_ms: i64, conversation_id: &str) -> FragmentSubmission {
    FragmentSubmission {
        device_id: DeviceId(device.to_string()),
        seq,
        capture_ts: at_offset(offset_ms),
        payload_kind: PayloadKind::Join,
        payload: conversation_id.to_string(),
    }
}

/// An audio-reference fragment captured `offset_ms` from now.
pub fn audio_fragment(device: &str, seq: u64, offset_ms: i64, blob_ref: &str) -> FragmentSubmission {
    FragmentSubmission {
        device_id: DeviceId(device.to_string()),
        seq,
        capture_ts: at_offset(offset_ms),
        payload_kind: PayloadKind::AudioRef,
        payload: blob_ref.to_string(),
    }
}

/// Now plus a millisecond offset.
pub fn at_offset(offset_ms: i64) -> DateTime<Utc> {
    Utc::now() + Duration::milliseconds(offset_ms)
}

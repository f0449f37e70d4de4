// SPDX-FileCopyrightText: 2026 Conversa Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Common types used across adapter traits and the Conversa pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Opaque identifier for a physical device. Devices mint their own ids
/// (the reference clients use a UUID persisted on first launch).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DeviceId(pub String);

impl std::fmt::Display for DeviceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Unique identifier for a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConversationId(pub String);

impl ConversationId {
    /// Mint a fresh conversation id.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

impl std::fmt::Display for ConversationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Health status reported by adapter health checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthStatus {
    /// Adapter is fully operational.
    Healthy,
    /// Adapter is operational but experiencing issues.
    Degraded(String),
    /// Adapter is not operational.
    Unhealthy(String),
}

/// Identifies the type of adapter behind the [`crate::PluginAdapter`] trait.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
pub enum AdapterType {
    Storage,
    Analyzer,
    Ingest,
}

/// What a fragment carries.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum PayloadKind {
    /// Transcribed utterance text.
    Text,
    /// Reference to an audio blob held elsewhere (not the bytes themselves).
    AudioRef,
    /// Request to join an existing open conversation; the payload is the
    /// target conversation id.
    Join,
}

/// Conversation lifecycle state.
///
/// OPEN accepts fragments; CLOSING drains in-flight fragments; CLOSED is
/// terminal and archived. The idle sweep is the only path out of OPEN.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ConversationState {
    Open,
    Closing,
    Closed,
}

/// Kind of derived annotation produced by the analysis engine.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum AnnotationKind {
    TurnBoundary,
    Segment,
    Sentiment,
}

/// Which analysis pass produced an annotation.
///
/// Final-pass annotations of a given kind+span are authoritative over
/// incremental ones for the same window.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum AnalysisPass {
    Incremental,
    Final,
}

/// A fragment as submitted on the ingestion boundary, before intake stamps
/// an arrival timestamp: `{device_id, seq, capture_ts, payload_kind, payload}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FragmentSubmission {
    pub device_id: DeviceId,
    /// Monotonic per-device sequence number, assigned by the device.
    /// Not trusted as globally ordered; used only for deduplication.
    pub seq: u64,
    pub capture_ts: DateTime<Utc>,
    pub payload_kind: PayloadKind,
    pub payload: String,
}

impl FragmentSubmission {
    /// Stamp an arrival timestamp, producing an immutable [`Fragment`].
    pub fn into_fragment(self, arrival_ts: DateTime<Utc>) -> Fragment {
        Fragment {
            device_id: self.device_id,
            seq: self.seq,
            capture_ts: self.capture_ts,
            payload_kind: self.payload_kind,
            payload: self.payload,
            arrival_ts,
        }
    }
}

/// An accepted fragment. Immutable once accepted; deduplicated by
/// `(device_id, seq)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fragment {
    pub device_id: DeviceId,
    pub seq: u64,
    pub capture_ts: DateTime<Utc>,
    pub payload_kind: PayloadKind,
    pub payload: String,
    /// Assigned by intake on acceptance.
    pub arrival_ts: DateTime<Utc>,
}

impl Fragment {
    /// The total ordering key for timeline merges:
    /// `(capture_ts, arrival_ts, device_id)`. The deterministic tie-break
    /// makes timelines reproducible across replays.
    pub fn ordering_key(&self) -> (DateTime<Utc>, DateTime<Utc>, &str) {
        (self.capture_ts, self.arrival_ts, &self.device_id.0)
    }
}

/// A registered device. Never deleted, only marked inactive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Device {
    pub id: DeviceId,
    pub registered_at: DateTime<Utc>,
    pub last_seen_at: DateTime<Utc>,
    /// Weak reference for lookup only; the device does not own the conversation.
    pub active_conversation: Option<ConversationId>,
    pub active: bool,
}

/// Summary of a conversation, as archived and as listed on the query boundary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationRecord {
    pub id: ConversationId,
    pub state: ConversationState,
    pub participants: Vec<DeviceId>,
    pub created_at: DateTime<Utc>,
    pub last_activity_at: DateTime<Utc>,
    pub fragment_count: u64,
    /// Fragments that arrived below the commit point and were dropped.
    pub late_dropped: u64,
}

/// A derived annotation over a span of a conversation timeline.
/// Append-only per conversation; produced only by the analysis engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Annotation {
    pub conversation_id: ConversationId,
    pub kind: AnnotationKind,
    pub span_start: DateTime<Utc>,
    pub span_end: DateTime<Utc>,
    pub pass: AnalysisPass,
    pub payload: serde_json::Value,
}

/// A fully archived conversation: summary, committed timeline, annotations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationArchive {
    pub record: ConversationRecord,
    pub timeline: Vec<Fragment>,
    pub annotations: Vec<Annotation>,
}

/// Filter for `list_conversations`. The field set is fixed and documented --
/// there is deliberately no open-ended dynamic filtering.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConversationFilter {
    /// Match the archived state exactly.
    pub state: Option<ConversationState>,
    /// Match conversations this device participated in.
    pub device_id: Option<DeviceId>,
    /// Only conversations created at or after this instant.
    pub since: Option<DateTime<Utc>>,
    /// Only conversations created before this instant.
    pub until: Option<DateTime<Utc>>,
    /// Cap the number of summaries returned.
    pub limit: Option<u32>,
}

/// Why a fragment was rejected at intake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RejectReason {
    /// Payload failed validation; dropped, not retried.
    MalformedPayload(String),
    /// Capture timestamp beyond the configured clock-skew tolerance.
    ClockSkew,
    /// Device was never registered.
    UnknownDevice,
    /// Join referenced a conversation that is not open.
    UnknownConversation,
    /// Fragment referenced a conversation that already closed.
    ConversationClosed,
    /// Bounded enqueue wait lapsed; retry with backoff.
    Overloaded,
}

impl std::fmt::Display for RejectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RejectReason::MalformedPayload(detail) => write!(f, "malformed_payload: {detail}"),
            RejectReason::ClockSkew => write!(f, "clock_skew"),
            RejectReason::UnknownDevice => write!(f, "unknown_device"),
            RejectReason::UnknownConversation => write!(f, "unknown_conversation"),
            RejectReason::ConversationClosed => write!(f, "conversation_closed"),
            RejectReason::Overloaded => write!(f, "overloaded"),
        }
    }
}

/// Synchronous outcome of submitting a fragment to intake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AcceptOutcome {
    /// Fragment accepted into the named conversation's queue.
    Accepted { conversation_id: ConversationId },
    /// `(device_id, seq)` already seen within the dedup window; no-op.
    Duplicate,
    /// Fragment refused; see the reason for whether retrying makes sense.
    Rejected(RejectReason),
}

impl AcceptOutcome {
    pub fn is_accepted(&self) -> bool {
        matches!(self, AcceptOutcome::Accepted { .. })
    }
}

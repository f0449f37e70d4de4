// SPDX-FileCopyrightText: 2026 Conversa Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the Conversa pipeline.
//!
//! Duplicate and late fragments are *outcomes*, not errors -- see
//! [`crate::types::AcceptOutcome`]. This taxonomy covers the failures that
//! propagate: validation, lifecycle, overload, analysis, and storage.

use thiserror::Error;

/// The primary error type used across all Conversa adapter traits and
/// pipeline operations.
#[derive(Debug, Error)]
pub enum ConversaError {
    /// Configuration errors (invalid TOML, missing required fields, type mismatches).
    #[error("configuration error: {0}")]
    Config(String),

    /// Storage backend errors (database connection, query failure, serialization).
    #[error("storage error: {source}")]
    Storage {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Malformed fragment: dropped, not retried.
    #[error("invalid fragment: {reason}")]
    Validation { reason: String },

    /// Fragment from a device that was never registered.
    #[error("unknown device: {device_id}")]
    UnknownDevice { device_id: String },

    /// Join referenced a conversation that is not open.
    #[error("unknown conversation: {conversation_id}")]
    UnknownConversation { conversation_id: String },

    /// Fragment referenced a conversation that already closed; the caller
    /// must open a new conversation.
    #[error("conversation closed: {conversation_id}")]
    ConversationClosed { conversation_id: String },

    /// Intake could not enqueue within the bounded backpressure wait.
    /// Transient -- the caller should retry with backoff.
    #[error("pipeline overloaded after waiting {waited:?}")]
    Overloaded { waited: std::time::Duration },

    /// Analysis pass failure. Retried per policy; eventually degraded, never fatal.
    #[error("analysis error: {message}")]
    Analysis {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Operation timed out.
    #[error("operation timed out after {duration:?}")]
    Timeout { duration: std::time::Duration },

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

// SPDX-FileCopyrightText: 2026 Conversa Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Result store trait: durable archive of conversations, their timelines,
//! and analysis results, plus the device registry.
//!
//! Persistence is append-only per conversation. Once archived, a
//! conversation is never mutated -- a reopened conversation gets a new
//! identifier. The store also backs the query boundary consumed by the
//! external API layer.

use async_trait::async_trait;

use crate::error::ConversaError;
use crate::traits::adapter::PluginAdapter;
use crate::types::{
    Annotation, ConversationArchive, ConversationFilter, ConversationId, ConversationRecord,
    Device, DeviceId, Fragment,
};

/// Adapter for the durable result store.
#[async_trait]
pub trait ResultStore: PluginAdapter {
    /// Initializes the storage backend (migrations, connection, etc.).
    async fn initialize(&self) -> Result<(), ConversaError>;

    /// Closes the storage backend, flushing pending writes.
    async fn close(&self) -> Result<(), ConversaError>;

    // --- Device registry ---

    /// Registers a new device. Fails if the id is already registered.
    async fn register_device(&self, device: &Device) -> Result<(), ConversaError>;

    /// Updates a device's last-seen timestamp and activity flags.
    async fn upsert_device(&self, device: &Device) -> Result<(), ConversaError>;

    /// Fetches a single device by id.
    async fn get_device(&self, id: &DeviceId) -> Result<Option<Device>, ConversaError>;

    /// Lists all registered devices, most recently seen first.
    async fn list_devices(&self) -> Result<Vec<Device>, ConversaError>;

    // --- Conversation archive ---

    /// Archives a closed conversation: summary, committed timeline, and
    /// annotations, atomically. Re-archiving an existing id is an error.
    async fn persist_conversation(
        &self,
        record: &ConversationRecord,
        timeline: &[Fragment],
        annotations: &[Annotation],
    ) -> Result<(), ConversaError>;

    /// Loads an archived conversation, or `None` if the id is unknown.
    async fn load_conversation(
        &self,
        id: &ConversationId,
    ) -> Result<Option<ConversationArchive>, ConversaError>;

    /// Lists archived conversation summaries matching the filter,
    /// newest first.
    async fn list_conversations(
        &self,
        filter: &ConversationFilter,
    ) -> Result<Vec<ConversationRecord>, ConversaError>;

    /// Records a window whose analysis failed after retry exhaustion, so the
    /// degradation is visible on the query boundary.
    async fn record_failed_window(
        &self,
        id: &ConversationId,
        window_index: u64,
        error: &str,
    ) -> Result<(), ConversaError>;
}

// SPDX-FileCopyrightText: 2026 Conversa Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! In-memory result store with failure injection.
//!
//! Records every persisted archive and failed window so tests can assert on
//! pipeline behavior, and can be told to fail the next N persist calls to
//! exercise the retry-until-success closure path.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use conversa_core::types::{
    AdapterType, Annotation, ConversationArchive, ConversationFilter, ConversationId,
    ConversationRecord, Device, DeviceId, Fragment, HealthStatus,
};
use conversa_core::{ConversaError, PluginAdapter, ResultStore};

#[derive(Default)]
struct Inner {
    devices: HashMap<DeviceId, Device>,
    archives: HashMap<ConversationId, ConversationArchive>,
    failed_windows: Vec<(ConversationId, u64, String)>,
    persist_failures_remaining: u32,
    persist_attempts: u64,
}

/// In-memory [`ResultStore`] for tests.
#[derive(Default)]
pub struct MemoryResultStore {
    inner: Mutex<Inner>,
}

impl MemoryResultStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `count` persist calls fail with a storage error.
    pub fn fail_next_persists(&self, count: u32) {
        self.inner.lock().unwrap().persist_failures_remaining = count;
    }

    /// Total persist attempts, including injected failures.
    pub fn persist_attempts(&self) -> u64 {
        self.inner.lock().unwrap().persist_attempts
    }

    /// Archived conversation ids, unordered.
    pub fn archived_ids(&self) -> Vec<ConversationId> {
        self.inner.lock().unwrap().archives.keys().cloned().collect()
    }

    /// Fetch one archive by id.
    pub fn archive(&self, id: &ConversationId) -> Option<ConversationArchive> {
        self.inner.lock().unwrap().archives.get(id).cloned()
    }

    /// All recorded analysis-failed windows.
    pub fn failed_windows(&self) -> Vec<(ConversationId, u64, String)> {
        self.inner.lock().unwrap().failed_windows.clone()
    }
}

#[async_trait]
impl PluginAdapter for MemoryResultStore {
    fn name(&self) -> &str {
        "memory"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Storage
    }

    async fn health_check(&self) -> Result<HealthStatus, ConversaError> {
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), ConversaError> {
        Ok(())
    }
}

#[async_trait]
impl ResultStore for MemoryResultStore {
    async fn initialize(&self) -> Result<(), ConversaError> {
        Ok(())
    }

    async fn close(&self) -> Result<(), ConversaError> {
        Ok(())
    }

    async fn register_device(&self, device: &Device) -> Result<(), ConversaError> {
        let mut inner = self.inner.lock().unwrap();
        if inner.devices.contains_key(&device.id) {
            return Err(ConversaError::Storage {
                source: format!("device {} already registered", device.id).into(),
            });
        }
        inner.devices.insert(device.id.clone(), device.clone());
        Ok(())
    }

    async fn upsert_device(&self, device: &Device) -> Result<(), ConversaError> {
        self.inner
            .lock()
            .unwrap()
            .devices
            .insert(device.id.clone(), device.clone());
        Ok(())
    }

    async fn get_device(&self, id: &DeviceId) -> Result<Option<Device>, ConversaError> {
        Ok(self.inner.lock().unwrap().devices.get(id).cloned())
    }

    async fn list_devices(&self) -> Result<Vec<Device>, ConversaError> {
        let mut devices: Vec<Device> =
            self.inner.lock().unwrap().devices.values().cloned().collect();
        devices.sort_by(|a, b| b.last_seen_at.cmp(&a.last_seen_at));
        Ok(devices)
    }

    async fn persist_conversation(
        &self,
        record: &ConversationRecord,
        timeline: &[Fragment],
        annotations: &[Annotation],
    ) -> Result<(), ConversaError> {
        let mut inner = self.inner.lock().unwrap();
        inner.persist_attempts += 1;

        if inner.persist_failures_remaining > 0 {
            inner.persist_failures_remaining -= 1;
            return Err(ConversaError::Storage {
                source: "injected persist failure".into(),
            });
        }

        if inner.archives.contains_key(&record.id) {
            return Err(ConversaError::Storage {
                source: format!("conversation {} already archived", record.id).into(),
            });
        }

        inner.archives.insert(
            record.id.clone(),
            ConversationArchive {
                record: record.clone(),
                timeline: timeline.to_vec(),
                annotations: annotations.to_vec(),
            },
        );
        Ok(())
    }

    async fn load_conversation(
        &self,
        id: &ConversationId,
    ) -> Result<Option<ConversationArchive>, ConversaError> {
        Ok(self.inner.lock().unwrap().archives.get(id).cloned())
    }

    async fn list_conversations(
        &self,
        filter: &ConversationFilter,
    ) -> Result<Vec<ConversationRecord>, ConversaError> {
        let inner = self.inner.lock().unwrap();
        let mut records: Vec<ConversationRecord> = inner
            .archives
            .values()
            .map(|archive| archive.record.clone())
            .filter(|record| {
                filter.state.is_none_or(|s| record.state == s)
                    && filter
                        .device_id
                        .as_ref()
                        .is_none_or(|d| record.participants.contains(d))
                    && filter.since.is_none_or(|t| record.created_at >= t)
                    && filter.until.is_none_or(|t| record.created_at < t)
            })
            .collect();
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        if let Some(limit) = filter.limit {
            records.truncate(limit as usize);
        }
        Ok(records)
    }

    async fn record_failed_window(
        &self,
        id: &ConversationId,
        window_index: u64,
        error: &str,
    ) -> Result<(), ConversaError> {
        self.inner.lock().unwrap().failed_windows.push((
            id.clone(),
            window_index,
            error.to_string(),
        ));
        Ok(())
    }
}

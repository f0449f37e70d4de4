// SPDX-FileCopyrightText: 2026 Conversa Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite implementation of the ResultStore trait.

use async_trait::async_trait;
use tokio::sync::OnceCell;
use tracing::debug;

use conversa_config::model::StorageConfig;
use conversa_core::types::{
    Annotation, ConversationArchive, ConversationFilter, ConversationId, ConversationRecord,
    Device, DeviceId, Fragment,
};
use conversa_core::{AdapterType, ConversaError, HealthStatus, PluginAdapter, ResultStore};

use crate::database::Database;
use crate::queries;

/// SQLite-backed result store.
///
/// Wraps a [`Database`] handle and delegates all query operations to the
/// typed query modules. The database is lazily opened on the first call to
/// [`ResultStore::initialize`].
pub struct SqliteResultStore {
    config: StorageConfig,
    db: OnceCell<Database>,
}

impl SqliteResultStore {
    /// Create a new store with the given configuration.
    ///
    /// The database connection is not opened until `initialize` is called.
    pub fn new(config: StorageConfig) -> Self {
        Self {
            config,
            db: OnceCell::new(),
        }
    }

    /// Returns the underlying Database, or an error if not initialized.
    fn db(&self) -> Result<&Database, ConversaError> {
        self.db.get().ok_or_else(|| ConversaError::Storage {
            source: "store not initialized -- call initialize() first".into(),
        })
    }
}

#[async_trait]
impl PluginAdapter for SqliteResultStore {
    fn name(&self) -> &str {
        "sqlite"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Storage
    }

    async fn health_check(&self) -> Result<HealthStatus, ConversaError> {
        let db = self.db()?;
        db.connection()
            .call(|conn| -> Result<(), rusqlite::Error> {
                conn.execute_batch("SELECT 1;")?;
                Ok(())
            })
            .await
            .map_err(crate::database::map_tr_err)?;
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), ConversaError> {
        if let Some(db) = self.db.get() {
            db.close().await?;
            debug!("shutdown: WAL checkpoint complete");
        }
        Ok(())
    }
}

#[async_trait]
impl ResultStore for SqliteResultStore {
    async fn initialize(&self) -> Result<(), ConversaError> {
        let db = Database::open(&self.config.database_path, self.config.wal_mode).await?;
        self.db.set(db).map_err(|_| ConversaError::Storage {
            source: "store already initialized".into(),
        })?;
        debug!(path = %self.config.database_path, "SQLite result store initialized");
        Ok(())
    }

    async fn close(&self) -> Result<(), ConversaError> {
        self.db()?.close().await
    }

    // --- Device registry ---

    async fn register_device(&self, device: &Device) -> Result<(), ConversaError> {
        queries::devices::register_device(self.db()?, device).await
    }

    async fn upsert_device(&self, device: &Device) -> Result<(), ConversaError> {
        queries::devices::upsert_device(self.db()?, device).await
    }

    async fn get_device(&self, id: &DeviceId) -> Result<Option<Device>, ConversaError> {
        queries::devices::get_device(self.db()?, id).await
    }

    async fn list_devices(&self) -> Result<Vec<Device>, ConversaError> {
        queries::devices::list_devices(self.db()?).await
    }

    // --- Conversation archive ---

    async fn persist_conversation(
        &self,
        record: &ConversationRecord,
        timeline: &[Fragment],
        annotations: &[Annotation],
    ) -> Result<(), ConversaError> {
        queries::conversations::persist_archive(self.db()?, record, timeline, annotations).await
    }

    async fn load_conversation(
        &self,
        id: &ConversationId,
    ) -> Result<Option<ConversationArchive>, ConversaError> {
        queries::conversations::load_archive(self.db()?, id).await
    }

    async fn list_conversations(
        &self,
        filter: &ConversationFilter,
    ) -> Result<Vec<ConversationRecord>, ConversaError> {
        queries::conversations::list_records(self.db()?, filter).await
    }

    async fn record_failed_window(
        &self,
        id: &ConversationId,
        window_index: u64,
        error: &str,
    ) -> Result<(), ConversaError> {
        queries::conversations::record_failed_window(self.db()?, id, window_index, error).await
    }
}

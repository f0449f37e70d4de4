// SPDX-FileCopyrightText: 2026 Conversa Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The Conversa ingestion and assembly pipeline.
//!
//! The [`Pipeline`] is the central coordinator:
//! - Intake validates and deduplicates device fragments
//! - The session tracker resolves each fragment to a conversation
//! - Per-conversation single-writer workers merge fragments into ordered
//!   timelines, advancing a watermark-gated commit point
//! - Committed windows and final timelines flow to the analysis engine
//! - Closed conversations are archived through the result store
//!
//! Different conversations progress fully in parallel; within one
//! conversation, commit-point advancement is monotonic.

pub mod assembler;
pub mod intake;
pub mod shutdown;
pub mod tracker;

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use conversa_analysis::AnalysisRunner;
use conversa_config::model::ConversaConfig;
use conversa_core::types::{AcceptOutcome, Device, DeviceId, FragmentSubmission};
use conversa_core::{Analyzer, ConversaError, ResultStore};

pub use tracker::{OpenConversation, SessionTracker};

/// The assembled pipeline: intake, tracking, assembly, analysis, archival.
pub struct Pipeline {
    config: ConversaConfig,
    store: Arc<dyn ResultStore>,
    tracker: Arc<SessionTracker>,
    cancel: CancellationToken,
}

impl Pipeline {
    /// Wire the pipeline together and seed the device registry from the
    /// store. The store must already be initialized.
    pub async fn new(
        config: ConversaConfig,
        store: Arc<dyn ResultStore>,
        analyzer: Arc<dyn Analyzer>,
    ) -> Result<Self, ConversaError> {
        let cancel = CancellationToken::new();
        let runner = Arc::new(AnalysisRunner::new(
            analyzer,
            Arc::clone(&store),
            config.analysis.retry_count,
            config.analysis.retry_backoff(),
        ));
        let tracker = Arc::new(SessionTracker::new(
            config.clone(),
            Arc::clone(&store),
            runner,
            cancel.clone(),
        ));

        let seeded = tracker.load_registry().await?;
        info!(
            service = config.service.name.as_str(),
            devices = seeded,
            "pipeline initialized"
        );

        Ok(Self {
            config,
            store,
            tracker,
            cancel,
        })
    }

    /// Token that stops [`run`](Self::run) when cancelled.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Submit one fragment on behalf of a device connection.
    pub async fn submit(&self, submission: FragmentSubmission) -> AcceptOutcome {
        self.tracker.submit(submission).await
    }

    /// Register a device so its fragments are accepted.
    pub async fn register_device(&self, id: DeviceId) -> Result<Device, ConversaError> {
        self.tracker.register_device(id).await
    }

    /// In-memory view of one device.
    pub fn device(&self, id: &DeviceId) -> Option<Device> {
        self.tracker.device(id)
    }

    /// Live summaries of conversations the pipeline still owns.
    pub fn open_conversations(&self) -> Vec<OpenConversation> {
        self.tracker.open_conversations()
    }

    /// Number of open conversations holding this device in their active set.
    pub fn open_conversations_containing(&self, id: &DeviceId) -> usize {
        self.tracker.open_conversations_containing(id)
    }

    /// Run one idle-closure sweep immediately, outside the periodic loop.
    /// Used by operational tooling and tests that drive the clock themselves.
    pub async fn sweep_now(&self) {
        self.tracker.sweep().await;
    }

    /// Run the lifecycle loop (idle sweeps) until the cancellation token
    /// fires, then drain and shut down.
    pub async fn run(&self) -> Result<(), ConversaError> {
        info!("pipeline running");
        let mut ticker = tokio::time::interval(self.config.pipeline.sweep_interval());
        // The first tick fires immediately; skip it so a freshly started
        // pipeline does not sweep before anything happened.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.tracker.sweep().await;
                }
                _ = self.cancel.cancelled() => {
                    info!("shutdown signal received, stopping pipeline");
                    break;
                }
            }
        }

        self.drain().await;
        self.store.close().await?;
        info!("pipeline stopped");
        Ok(())
    }

    /// Close all open conversations within the configured drain window.
    async fn drain(&self) {
        let drain_window =
            std::time::Duration::from_secs(self.config.service.shutdown_drain_secs);
        if tokio::time::timeout(drain_window, self.tracker.shutdown())
            .await
            .is_err()
        {
            warn!(
                drain_secs = self.config.service.shutdown_drain_secs,
                "drain window elapsed with conversations still closing"
            );
        }
    }

    /// Close everything immediately (test and embedding support; `run`
    /// performs the same drain on cancellation).
    pub async fn shutdown(&self) -> Result<(), ConversaError> {
        self.cancel.cancel();
        self.drain().await;
        self.store.close().await
    }
}

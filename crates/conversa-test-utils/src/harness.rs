// SPDX-FileCopyrightText: 2026 Conversa Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test harness for end-to-end pipeline testing.
//!
//! `PipelineHarness` assembles a complete pipeline over an in-memory result
//! store and a scripted analyzer, with aggressive timeouts so lifecycle
//! tests run in seconds. Both mocks stay accessible for assertions.

use std::sync::Arc;

use conversa_config::model::ConversaConfig;
use conversa_core::types::{AcceptOutcome, Device, DeviceId, FragmentSubmission};
use conversa_core::{Analyzer, ConversaError, ResultStore};
use conversa_pipeline::Pipeline;

use crate::mock_analyzer::ScriptedAnalyzer;
use crate::mock_store::MemoryResultStore;

/// Builder for creating test pipelines with tightened configuration.
pub struct PipelineHarnessBuilder {
    config: ConversaConfig,
}

impl PipelineHarnessBuilder {
    fn new() -> Self {
        let mut config = ConversaConfig::default();
        // Fast defaults so tests never wait on production timing.
        config.pipeline.idle_timeout_secs = 2;
        config.pipeline.out_of_order_tolerance_ms = 100;
        config.pipeline.window_size_secs = 1;
        config.pipeline.sweep_interval_secs = 1;
        config.intake.clock_skew_tolerance_secs = 5;
        config.analysis.retry_backoff_ms = 20;
        config.service.shutdown_drain_secs = 5;
        Self { config }
    }

    pub fn with_idle_timeout_secs(mut self, secs: u64) -> Self {
        self.config.pipeline.idle_timeout_secs = secs;
        self
    }

    pub fn with_tolerance_ms(mut self, ms: u64) -> Self {
        self.config.pipeline.out_of_order_tolerance_ms = ms;
        self
    }

    pub fn with_window_secs(mut self, secs: u64) -> Self {
        self.config.pipeline.window_size_secs = secs;
        self
    }

    pub fn with_queue_depth(mut self, depth: usize) -> Self {
        self.config.intake.queue_depth = depth;
        self
    }

    pub fn with_dedup_window(mut self, size: usize) -> Self {
        self.config.intake.dedup_window_size = size;
        self
    }

    pub fn with_analysis_retries(mut self, count: u32, backoff_ms: u64) -> Self {
        self.config.analysis.retry_count = count;
        self.config.analysis.retry_backoff_ms = backoff_ms;
        self
    }

    /// Build the harness, wiring the pipeline over the mocks.
    pub async fn build(self) -> Result<PipelineHarness, ConversaError> {
        let store = Arc::new(MemoryResultStore::new());
        let analyzer = Arc::new(ScriptedAnalyzer::new());

        store.initialize().await?;
        let pipeline = Pipeline::new(
            self.config.clone(),
            Arc::clone(&store) as Arc<dyn ResultStore>,
            Arc::clone(&analyzer) as Arc<dyn Analyzer>,
        )
        .await?;

        Ok(PipelineHarness {
            pipeline: Arc::new(pipeline),
            store,
            analyzer,
            config: self.config,
        })
    }
}

/// A complete test pipeline with inspectable mocks.
pub struct PipelineHarness {
    pub pipeline: Arc<Pipeline>,
    pub store: Arc<MemoryResultStore>,
    pub analyzer: Arc<ScriptedAnalyzer>,
    pub config: ConversaConfig,
}

impl PipelineHarness {
    pub fn builder() -> PipelineHarnessBuilder {
        PipelineHarnessBuilder::new()
    }

    /// Register a device by bare id.
    pub async fn register(&self, device: &str) -> Result<Device, ConversaError> {
        self.pipeline
            .register_device(DeviceId(device.to_string()))
            .await
    }

    /// Submit a fragment and return the synchronous outcome.
    pub async fn submit(&self, submission: FragmentSubmission) -> AcceptOutcome {
        self.pipeline.submit(submission).await
    }

    /// Submit a fragment, panicking unless it was accepted. Returns the
    /// conversation id it attached to.
    pub async fn submit_accepted(&self, submission: FragmentSubmission) -> String {
        match self.pipeline.submit(submission).await {
            AcceptOutcome::Accepted { conversation_id } => conversation_id.0,
            other => panic!("expected acceptance, got {other:?}"),
        }
    }

    /// Run one idle sweep immediately.
    pub async fn sweep_now(&self) {
        self.pipeline.sweep_now().await;
    }

    /// Drain and close the pipeline.
    pub async fn shutdown(&self) -> Result<(), ConversaError> {
        self.pipeline.shutdown().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fragments::text_fragment;

    #[tokio::test]
    async fn harness_builds_and_accepts_fragments() {
        let harness = PipelineHarness::builder().build().await.unwrap();
        harness.register("dev-a").await.unwrap();

        let outcome = harness.submit(text_fragment("dev-a", 1, 0, "hello")).await;
        assert!(outcome.is_accepted());
    }

    #[tokio::test]
    async fn shutdown_archives_open_conversations() {
        let harness = PipelineHarness::builder().build().await.unwrap();
        harness.register("dev-a").await.unwrap();
        let conversation = harness
            .submit_accepted(text_fragment("dev-a", 1, 0, "hello"))
            .await;

        harness.shutdown().await.unwrap();

        let archived = harness.store.archived_ids();
        assert_eq!(archived.len(), 1);
        assert_eq!(archived[0].0, conversation);
    }
}

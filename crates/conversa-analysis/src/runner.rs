// SPDX-FileCopyrightText: 2026 Conversa Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Retry/backoff wrapper around an [`Analyzer`].
//!
//! Analysis failure on a window is non-fatal to the pipeline: the window is
//! retried with exponential backoff, and after exhaustion it is recorded as
//! failed so the conversation can persist without annotations for that
//! window. Ingestion of other conversations is never blocked.

use std::sync::Arc;

use tracing::{debug, warn};

use conversa_core::types::{AnalysisPass, Annotation, ConversationId, Fragment};
use conversa_core::{Analyzer, ConversaError, ResultStore};

/// Runs analysis passes with the configured retry policy.
pub struct AnalysisRunner {
    analyzer: Arc<dyn Analyzer>,
    store: Arc<dyn ResultStore>,
    retry_count: u32,
    retry_backoff: std::time::Duration,
}

impl AnalysisRunner {
    pub fn new(
        analyzer: Arc<dyn Analyzer>,
        store: Arc<dyn ResultStore>,
        retry_count: u32,
        retry_backoff: std::time::Duration,
    ) -> Self {
        Self {
            analyzer,
            store,
            retry_count,
            retry_backoff,
        }
    }

    /// Analyze one committed window (or the full timeline for the final
    /// pass), retrying on failure.
    ///
    /// Returns the annotations on success. After retry exhaustion the window
    /// is recorded as failed in the store and an empty set is returned --
    /// degraded, not fatal.
    pub async fn run(
        &self,
        conversation_id: &ConversationId,
        slice: &[Fragment],
        pass: AnalysisPass,
        window_index: u64,
    ) -> Vec<Annotation> {
        let mut last_error: Option<ConversaError> = None;

        for attempt in 0..=self.retry_count {
            if attempt > 0 {
                // Exponential backoff: base, 2x, 4x, ...
                let backoff = self.retry_backoff * 2u32.saturating_pow(attempt - 1);
                tokio::time::sleep(backoff).await;
                debug!(
                    conversation_id = %conversation_id,
                    window_index,
                    attempt,
                    "retrying analysis"
                );
            }

            match self.analyzer.analyze(conversation_id, slice, pass).await {
                Ok(annotations) => {
                    debug!(
                        conversation_id = %conversation_id,
                        window_index,
                        pass = %pass,
                        annotations = annotations.len(),
                        "analysis pass complete"
                    );
                    return annotations;
                }
                Err(e) => {
                    warn!(
                        conversation_id = %conversation_id,
                        window_index,
                        attempt,
                        error = %e,
                        "analysis pass failed"
                    );
                    last_error = Some(e);
                }
            }
        }

        let reason = last_error
            .map(|e| e.to_string())
            .unwrap_or_else(|| "unknown analysis failure".to_string());
        warn!(
            conversation_id = %conversation_id,
            window_index,
            "analysis retries exhausted, persisting window without annotations"
        );
        if let Err(e) = self
            .store
            .record_failed_window(conversation_id, window_index, &reason)
            .await
        {
            warn!(error = %e, "failed to record analysis-failed window");
        }

        Vec::new()
    }
}

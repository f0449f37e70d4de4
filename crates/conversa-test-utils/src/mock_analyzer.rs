// SPDX-FileCopyrightText: 2026 Conversa Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Scripted analyzer for exercising retry and degradation paths.
//!
//! Delegates to the real [`TimelineAnalyzer`] but can be told to fail the
//! next N calls, and records every invocation so tests can assert on pass
//! counts (e.g. "final pass invoked exactly once").

use std::sync::Mutex;

use async_trait::async_trait;

use conversa_analysis::TimelineAnalyzer;
use conversa_config::model::AnalysisConfig;
use conversa_core::types::{
    AdapterType, AnalysisPass, Annotation, ConversationId, Fragment, HealthStatus,
};
use conversa_core::{Analyzer, ConversaError, PluginAdapter};

/// One recorded analyzer invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalyzerCall {
    pub conversation_id: ConversationId,
    pub pass: AnalysisPass,
    pub slice_len: usize,
}

/// An [`Analyzer`] wrapper with failure injection and call recording.
pub struct ScriptedAnalyzer {
    inner: TimelineAnalyzer,
    failures_remaining: Mutex<u32>,
    calls: Mutex<Vec<AnalyzerCall>>,
}

impl Default for ScriptedAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedAnalyzer {
    pub fn new() -> Self {
        Self {
            inner: TimelineAnalyzer::new(AnalysisConfig::default()),
            failures_remaining: Mutex::new(0),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Fail the next `count` analyze calls before succeeding again.
    pub fn fail_next(&self, count: u32) {
        *self.failures_remaining.lock().unwrap() = count;
    }

    /// Every invocation recorded so far, in order.
    pub fn calls(&self) -> Vec<AnalyzerCall> {
        self.calls.lock().unwrap().clone()
    }

    /// Recorded invocations of one pass kind.
    pub fn calls_for_pass(&self, pass: AnalysisPass) -> Vec<AnalyzerCall> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|call| call.pass == pass)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl PluginAdapter for ScriptedAnalyzer {
    fn name(&self) -> &str {
        "scripted"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Analyzer
    }

    async fn health_check(&self) -> Result<HealthStatus, ConversaError> {
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), ConversaError> {
        Ok(())
    }
}

#[async_trait]
impl Analyzer for ScriptedAnalyzer {
    async fn analyze(
        &self,
        conversation_id: &ConversationId,
        slice: &[Fragment],
        pass: AnalysisPass,
    ) -> Result<Vec<Annotation>, ConversaError> {
        self.calls.lock().unwrap().push(AnalyzerCall {
            conversation_id: conversation_id.clone(),
            pass,
            slice_len: slice.len(),
        });

        {
            let mut remaining = self.failures_remaining.lock().unwrap();
            if *remaining > 0 {
                *remaining -= 1;
                return Err(ConversaError::Analysis {
                    message: "scripted failure".into(),
                    source: None,
                });
            }
        }

        self.inner.analyze(conversation_id, slice, pass).await
    }
}

// SPDX-FileCopyrightText: 2026 Conversa Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Analyzer trait: a pure function over an ordered fragment slice.

use async_trait::async_trait;

use crate::error::ConversaError;
use crate::traits::adapter::PluginAdapter;
use crate::types::{AnalysisPass, Annotation, ConversationId, Fragment};

/// Adapter for analysis engines.
///
/// Implementations must be pure with respect to the slice: the same ordered
/// fragments produce the same annotations. The pipeline invokes an analyzer
/// incrementally per committed window and once finally at closure; final-pass
/// annotations supersede incremental ones for the same kind+span.
#[async_trait]
pub trait Analyzer: PluginAdapter {
    /// Analyzes an ordered fragment slice, returning ordered annotations.
    ///
    /// `slice` is a committed window for [`AnalysisPass::Incremental`] and
    /// the full timeline for [`AnalysisPass::Final`].
    async fn analyze(
        &self,
        conversation_id: &ConversationId,
        slice: &[Fragment],
        pass: AnalysisPass,
    ) -> Result<Vec<Annotation>, ConversaError>;
}

// SPDX-FileCopyrightText: 2026 Conversa Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The built-in analyzer: turn detection, topic segmentation, and sentiment
//! composed into one pure pass over an ordered fragment slice.

use async_trait::async_trait;

use conversa_config::model::AnalysisConfig;
use conversa_core::types::{
    AdapterType, AnalysisPass, Annotation, AnnotationKind, ConversationId, Fragment, HealthStatus,
};
use conversa_core::{Analyzer, ConversaError, PluginAdapter};

use crate::segments::segment_turns;
use crate::sentiment::score_text;
use crate::turns::detect_turns;

/// Deterministic, lexicon-driven analyzer over committed timeline slices.
///
/// The same ordered slice always yields the same annotations, which is what
/// makes incremental and final passes comparable.
pub struct TimelineAnalyzer {
    config: AnalysisConfig,
}

impl TimelineAnalyzer {
    pub fn new(config: AnalysisConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl PluginAdapter for TimelineAnalyzer {
    fn name(&self) -> &str {
        "timeline"
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
impl Analyzer for TimelineAnalyzer {
    async fn analyze(
        &self,
        conversation_id: &ConversationId,
        slice: &[Fragment],
        pass: AnalysisPass,
    ) -> Result<Vec<Annotation>, ConversaError> {
        let turns = detect_turns(slice, self.config.turn_gap());
        let segments = segment_turns(&turns, self.config.segment_similarity_threshold);

        let mut annotations =
            Vec::with_capacity(turns.len() + segments.len() * 2);

        for turn in &turns {
            annotations.push(Annotation {
                conversation_id: conversation_id.clone(),
                kind: AnnotationKind::TurnBoundary,
                span_start: turn.start,
                span_end: turn.end,
                pass,
                payload: serde_json::json!({
                    "speaker": turn.speaker.0,
                    "fragments": turn.fragment_count,
                }),
            });
        }

        for segment in &segments {
            annotations.push(Annotation {
                conversation_id: conversation_id.clone(),
                kind: AnnotationKind::Segment,
                span_start: segment.start,
                span_end: segment.end,
                pass,
                payload: serde_json::json!({
                    "turns": segment.turn_count,
                    "tokens": segment.token_count,
                }),
            });

            // Sentiment is scored per segment over the turns it spans.
            let segment_text: String = turns
                .iter()
                .filter(|t| t.start >= segment.start && t.end <= segment.end)
                .map(|t| t.text.as_str())
                .collect::<Vec<_>>()
                .join(" ");
            let score = score_text(&segment_text);
            annotations.push(Annotation {
                conversation_id: conversation_id.clone(),
                kind: AnnotationKind::Sentiment,
                span_start: segment.start,
                span_end: segment.end,
                pass,
                payload: serde_json::json!({
                    "score": score.score,
                    "positive": score.positive_hits,
                    "negative": score.negative_hits,
                }),
            });
        }

        Ok(annotations)
    }
}

// SPDX-FileCopyrightText: 2026 Conversa Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Analysis engine for Conversa timelines.
//!
//! The [`TimelineAnalyzer`] is a pure function over an ordered fragment
//! slice: turn detection, topic segmentation, and lexicon sentiment. The
//! [`AnalysisRunner`] wraps any [`conversa_core::Analyzer`] with the
//! retry/backoff policy and failed-window accounting.

pub mod engine;
pub mod runner;
pub mod segments;
pub mod sentiment;
pub mod turns;

pub use engine::TimelineAnalyzer;
pub use runner::AnalysisRunner;

// SPDX-FileCopyrightText: 2026 Conversa Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test utilities for Conversa integration tests: an in-memory result store
//! with failure injection, a scripted analyzer, fragment builders, and a
//! full-pipeline harness with fast timeouts.

pub mod fragments;
pub mod harness;
pub mod mock_analyzer;
pub mod mock_store;

pub use harness::{PipelineHarness, PipelineHarnessBuilder};
pub use mock_analyzer::{AnalyzerCall, ScriptedAnalyzer};
pub use mock_store::MemoryResultStore;

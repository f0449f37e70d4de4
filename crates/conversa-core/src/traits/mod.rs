// SPDX-FileCopyrightText: 2026 Conversa Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Adapter trait definitions.
//!
//! Every pluggable component implements [`adapter::PluginAdapter`]; the
//! result store and analysis engine sit behind their own traits so the
//! pipeline can be exercised against mocks.

pub mod adapter;
pub mod analyzer;
pub mod store;

pub use adapter::PluginAdapter;
pub use analyzer::Analyzer;
pub use store::ResultStore;

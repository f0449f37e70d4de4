// SPDX-FileCopyrightText: 2026 Conversa Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs for the Conversa pipeline.
//!
//! All structs use `#[serde(deny_unknown_fields)]` to reject unrecognized
//! config keys at startup, providing actionable error messages.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Top-level Conversa configuration.
///
/// Loaded from TOML files following XDG hierarchy, with environment variable
/// overrides. All sections are optional and default to sensible values.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ConversaConfig {
    /// Service identity, logging, and shutdown settings.
    #[serde(default)]
    pub service: ServiceConfig,

    /// Conversation lifecycle and assembly settings.
    #[serde(default)]
    pub pipeline: PipelineConfig,

    /// Fragment intake settings.
    #[serde(default)]
    pub intake: IntakeConfig,

    /// Analysis engine settings.
    #[serde(default)]
    pub analysis: AnalysisConfig,

    /// Storage backend settings.
    #[serde(default)]
    pub storage: StorageConfig,
}

/// Service identity and behavior configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ServiceConfig {
    /// Display name of the service instance.
    #[serde(default = "default_service_name")]
    pub name: String,

    /// Logging level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Seconds in-flight analysis tasks get to finish after a shutdown
    /// signal before being dropped.
    #[serde(default = "default_shutdown_drain_secs")]
    pub shutdown_drain_secs: u64,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: default_service_name(),
            log_level: default_log_level(),
            shutdown_drain_secs: default_shutdown_drain_secs(),
        }
    }
}

fn default_service_name() -> String {
    "conversa".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_shutdown_drain_secs() -> u64 {
    10
}

/// Conversation lifecycle and timeline assembly configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct PipelineConfig {
    /// Seconds without activity before a conversation is closed. Also bounds
    /// how far a fragment's capture time may trail the conversation's last
    /// activity and still attach to it.
    #[serde(default = "default_idle_timeout_secs")]
    pub idle_timeout_secs: u64,

    /// Out-of-order tolerance in milliseconds. The commit point trails the
    /// minimum participant watermark by this much.
    #[serde(default = "default_out_of_order_tolerance_ms")]
    pub out_of_order_tolerance_ms: u64,

    /// Width in seconds of the analysis windows cut from the committed
    /// timeline.
    #[serde(default = "default_window_size_secs")]
    pub window_size_secs: u64,

    /// Interval in seconds between idle-closure sweeps.
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            idle_timeout_secs: default_idle_timeout_secs(),
            out_of_order_tolerance_ms: default_out_of_order_tolerance_ms(),
            window_size_secs: default_window_size_secs(),
            sweep_interval_secs: default_sweep_interval_secs(),
        }
    }
}

impl PipelineConfig {
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    pub fn out_of_order_tolerance(&self) -> Duration {
        Duration::from_millis(self.out_of_order_tolerance_ms)
    }

    pub fn window_size(&self) -> Duration {
        Duration::from_secs(self.window_size_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

fn default_idle_timeout_secs() -> u64 {
    120 // 2 minutes of silence ends a conversation
}

fn default_out_of_order_tolerance_ms() -> u64 {
    5_000
}

fn default_window_size_secs() -> u64 {
    30
}

fn default_sweep_interval_secs() -> u64 {
    5
}

/// Fragment intake configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct IntakeConfig {
    /// Entries retained per device for duplicate detection. Duplicates older
    /// than the ring are accepted as new -- a bounded-memory tradeoff.
    #[serde(default = "default_dedup_window_size")]
    pub dedup_window_size: usize,

    /// Seconds a capture timestamp may lead the intake clock before the
    /// fragment is rejected.
    #[serde(default = "default_clock_skew_tolerance_secs")]
    pub clock_skew_tolerance_secs: u64,

    /// Milliseconds intake waits on a full conversation queue before
    /// rejecting with `overloaded`.
    #[serde(default = "default_backpressure_wait_ms")]
    pub backpressure_wait_ms: u64,

    /// Capacity of each per-conversation fragment queue.
    #[serde(default = "default_queue_depth")]
    pub queue_depth: usize,
}

impl Default for IntakeConfig {
    fn default() -> Self {
        Self {
            dedup_window_size: default_dedup_window_size(),
            clock_skew_tolerance_secs: default_clock_skew_tolerance_secs(),
            backpressure_wait_ms: default_backpressure_wait_ms(),
            queue_depth: default_queue_depth(),
        }
    }
}

impl IntakeConfig {
    pub fn clock_skew_tolerance(&self) -> Duration {
        Duration::from_secs(self.clock_skew_tolerance_secs)
    }

    pub fn backpressure_wait(&self) -> Duration {
        Duration::from_millis(self.backpressure_wait_ms)
    }
}

fn default_dedup_window_size() -> usize {
    256
}

fn default_clock_skew_tolerance_secs() -> u64 {
    30
}

fn default_backpressure_wait_ms() -> u64 {
    50
}

fn default_queue_depth() -> usize {
    512
}

/// Analysis engine configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct AnalysisConfig {
    /// Retries per window before the window is recorded as analysis-failed.
    #[serde(default = "default_retry_count")]
    pub retry_count: u32,

    /// Base backoff in milliseconds between analysis retries (doubles per
    /// attempt).
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,

    /// Intra-device silence in milliseconds that opens a new turn even
    /// without a speaker change.
    #[serde(default = "default_turn_gap_ms")]
    pub turn_gap_ms: u64,

    /// Token-set Jaccard similarity below which adjacent turns start a new
    /// topic segment (0.0-1.0).
    #[serde(default = "default_segment_similarity_threshold")]
    pub segment_similarity_threshold: f64,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            retry_count: default_retry_count(),
            retry_backoff_ms: default_retry_backoff_ms(),
            turn_gap_ms: default_turn_gap_ms(),
            segment_similarity_threshold: default_segment_similarity_threshold(),
        }
    }
}

impl AnalysisConfig {
    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }

    pub fn turn_gap(&self) -> Duration {
        Duration::from_millis(self.turn_gap_ms)
    }
}

fn default_retry_count() -> u32 {
    3
}

fn default_retry_backoff_ms() -> u64 {
    250
}

fn default_turn_gap_ms() -> u64 {
    2_000
}

fn default_segment_similarity_threshold() -> f64 {
    0.15
}

/// Storage backend configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_database_path")]
    pub database_path: String,

    /// Enable WAL (Write-Ahead Logging) mode for SQLite.
    #[serde(default = "default_wal_mode")]
    pub wal_mode: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            wal_mode: default_wal_mode(),
        }
    }
}

fn default_database_path() -> String {
    dirs::data_dir()
        .map(|p| p.join("conversa").join("conversa.db"))
        .unwrap_or_else(|| std::path::PathBuf::from("conversa.db"))
        .to_string_lossy()
        .into_owned()
}

fn default_wal_mode() -> bool {
    true
}

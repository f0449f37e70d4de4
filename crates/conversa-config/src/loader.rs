// SPDX-FileCopyrightText: 2026 Conversa Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration loader using Figment for layered config merging.
//!
//! Supports XDG hierarchy: `./conversa.toml` > `~/.config/conversa/conversa.toml`
//! > `/etc/conversa/conversa.toml` with environment variable overrides via the
//! `CONVERSA_` prefix.

#![allow(clippy::result_large_err)] // figment::Error is external and cannot be boxed without wrapper

use std::path::Path;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};

use crate::model::ConversaConfig;

/// Load configuration from the standard XDG hierarchy with env var overrides.
///
/// Merge order (later overrides earlier):
/// 1. Compiled defaults
/// 2. `/etc/conversa/conversa.toml` (system-wide)
/// 3. `~/.config/conversa/conversa.toml` (user XDG config)
/// 4. `./conversa.toml` (local directory)
/// 5. `CONVERSA_*` environment variables
pub fn load_config() -> Result<ConversaConfig, figment::Error> {
    build_figment().extract()
}

/// Load configuration from a TOML string only (no XDG lookup).
///
/// Used for testing and explicit config specification.
pub fn load_config_from_str(toml_content: &str) -> Result<ConversaConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(ConversaConfig::default()))
        .merge(Toml::string(toml_content))
        .extract()
}

/// Load configuration from a specific file path with env var overrides.
pub fn load_config_from_path(path: &Path) -> Result<ConversaConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(ConversaConfig::default()))
        .merge(Toml::file(path))
        .merge(env_provider())
        .extract()
}

/// Build the Figment used internally for config loading (exposed for
/// diagnostic use).
pub fn build_figment() -> Figment {
    Figment::new()
        .merge(Serialized::defaults(ConversaConfig::default()))
        .merge(Toml::file("/etc/conversa/conversa.toml"))
        .merge(Toml::file(
            dirs::config_dir()
                .map(|d| d.join("conversa/conversa.toml"))
                .unwrap_or_default(),
        ))
        .merge(Toml::file("conversa.toml"))
        .merge(env_provider())
}

/// Create the environment variable provider using explicit `map()` for
/// section-to-dot mapping.
///
/// Uses `Env::map()` NOT `Env::split("_")` to avoid ambiguity with
/// underscore-containing key names: `CONVERSA_PIPELINE_IDLE_TIMEOUT_SECS`
/// must map to `pipeline.idle_timeout_secs`, not `pipeline.idle.timeout.secs`.
fn env_provider() -> Env {
    Env::prefixed("CONVERSA_").map(|key| {
        // `key` is the lowercased env var name with prefix stripped.
        let key_str = key.as_str();
        let mapped = key_str
            .replacen("service_", "service.", 1)
            .replacen("pipeline_", "pipeline.", 1)
            .replacen("intake_", "intake.", 1)
            .replacen("analysis_", "analysis.", 1)
            .replacen("storage_", "storage.", 1);
        mapped.into()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_load_without_any_file() {
        let config = load_config_from_str("").unwrap();
        assert_eq!(config.service.name, "conversa");
        assert_eq!(config.pipeline.idle_timeout_secs, 120);
        assert_eq!(config.intake.backpressure_wait_ms, 50);
    }

    #[test]
    fn toml_overrides_defaults() {
        let config = load_config_from_str(
            r#"
[pipeline]
idle_timeout_secs = 15
window_size_secs = 5

[intake]
dedup_window_size = 8
"#,
        )
        .unwrap();
        assert_eq!(config.pipeline.idle_timeout_secs, 15);
        assert_eq!(config.pipeline.window_size_secs, 5);
        assert_eq!(config.intake.dedup_window_size, 8);
        // Untouched sections keep defaults.
        assert_eq!(config.analysis.retry_count, 3);
    }

    #[test]
    fn unknown_key_is_rejected() {
        let result = load_config_from_str(
            r#"
[pipeline]
idle_timeou_secs = 15
"#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn duration_accessors_convert_units() {
        let config = load_config_from_str(
            r#"
[pipeline]
out_of_order_tolerance_ms = 1500
"#,
        )
        .unwrap();
        assert_eq!(
            config.pipeline.out_of_order_tolerance(),
            std::time::Duration::from_millis(1500)
        );
        assert_eq!(
            config.intake.backpressure_wait(),
            std::time::Duration::from_millis(50)
        );
    }
}

// SPDX-FileCopyrightText: 2026 Conversa Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Post-deserialization validation for configuration values.
//!
//! Validates semantic constraints that cannot be expressed via serde
//! attributes, such as non-zero windows, valid thresholds, and non-empty
//! paths.

use crate::diagnostic::ConfigError;
use crate::model::ConversaConfig;

/// Validate a deserialized configuration for semantic correctness.
///
/// Returns `Ok(())` if all validations pass, or `Err(Vec<ConfigError>)` with
/// all collected validation errors (does not fail fast).
pub fn validate_config(config: &ConversaConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();

    if config.service.name.trim().is_empty() {
        errors.push(ConfigError::Validation {
            message: "service.name must not be empty".to_string(),
        });
    }

    if config.pipeline.idle_timeout_secs == 0 {
        errors.push(ConfigError::Validation {
            message: "pipeline.idle_timeout_secs must be greater than zero".to_string(),
        });
    }

    if config.pipeline.window_size_secs == 0 {
        errors.push(ConfigError::Validation {
            message: "pipeline.window_size_secs must be greater than zero".to_string(),
        });
    }

    if config.pipeline.sweep_interval_secs == 0 {
        errors.push(ConfigError::Validation {
            message: "pipeline.sweep_interval_secs must be greater than zero".to_string(),
        });
    }

    // A tolerance wider than the idle timeout would hold the commit point
    // behind fragments that can no longer arrive.
    if config.pipeline.out_of_order_tolerance_ms >= config.pipeline.idle_timeout_secs * 1000 {
        errors.push(ConfigError::Validation {
            message: format!(
                "pipeline.out_of_order_tolerance_ms ({}) must be smaller than pipeline.idle_timeout_secs ({}s)",
                config.pipeline.out_of_order_tolerance_ms, config.pipeline.idle_timeout_secs
            ),
        });
    }

    if config.intake.dedup_window_size == 0 {
        errors.push(ConfigError::Validation {
            message: "intake.dedup_window_size must be greater than zero".to_string(),
        });
    }

    if config.intake.queue_depth == 0 {
        errors.push(ConfigError::Validation {
            message: "intake.queue_depth must be greater than zero".to_string(),
        });
    }

    let threshold = config.analysis.segment_similarity_threshold;
    if !(0.0..=1.0).contains(&threshold) {
        errors.push(ConfigError::Validation {
            message: format!(
                "analysis.segment_similarity_threshold must be within 0.0-1.0, got {threshold}"
            ),
        });
    }

    if config.storage.database_path.trim().is_empty() {
        errors.push(ConfigError::Validation {
            message: "storage.database_path must not be empty".to_string(),
        });
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_validates() {
        let config = ConversaConfig::default();
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn zero_idle_timeout_fails_validation() {
        let mut config = ConversaConfig::default();
        config.pipeline.idle_timeout_secs = 0;
        let errors = validate_config(&config).unwrap_err();
        assert!(errors
            .iter()
            .any(|e| matches!(e, ConfigError::Validation { message } if message.contains("idle_timeout_secs"))));
    }

    #[test]
    fn tolerance_wider_than_idle_timeout_fails() {
        let mut config = ConversaConfig::default();
        config.pipeline.idle_timeout_secs = 5;
        config.pipeline.out_of_order_tolerance_ms = 5_000;
        let errors = validate_config(&config).unwrap_err();
        assert!(errors
            .iter()
            .any(|e| matches!(e, ConfigError::Validation { message } if message.contains("out_of_order_tolerance_ms"))));
    }

    #[test]
    fn out_of_range_threshold_fails() {
        let mut config = ConversaConfig::default();
        config.analysis.segment_similarity_threshold = 1.5;
        let errors = validate_config(&config).unwrap_err();
        assert!(errors
            .iter()
            .any(|e| matches!(e, ConfigError::Validation { message } if message.contains("segment_similarity_threshold"))));
    }

    #[test]
    fn empty_database_path_fails_validation() {
        let mut config = ConversaConfig::default();
        config.storage.database_path = "".to_string();
        let errors = validate_config(&config).unwrap_err();
        assert!(errors
            .iter()
            .any(|e| matches!(e, ConfigError::Validation { message } if message.contains("database_path"))));
    }

    #[test]
    fn all_errors_are_collected_not_just_the_first() {
        let mut config = ConversaConfig::default();
        config.pipeline.window_size_secs = 0;
        config.intake.queue_depth = 0;
        config.storage.database_path = "".to_string();
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 3);
    }
}

// SPDX-FileCopyrightText: 2026 Conversa Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for the Conversa pipeline.
//!
//! This crate provides the foundational trait definitions, error types, and
//! common types used throughout the Conversa workspace: fragments, devices,
//! conversations, annotations, and the adapter traits the pipeline is
//! assembled from.

pub mod error;
pub mod traits;
pub mod types;

// Re-export key items at crate root for ergonomic imports.
pub use error::ConversaError;
pub use types::{
    AcceptOutcome, AdapterType, AnalysisPass, Annotation, AnnotationKind, ConversationArchive,
    ConversationFilter, ConversationId, ConversationRecord, ConversationState, Device, DeviceId,
    Fragment, FragmentSubmission, HealthStatus, PayloadKind, RejectReason,
};

// Re-export adapter traits at crate root.
pub use traits::{Analyzer, PluginAdapter, ResultStore};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conversa_error_has_all_variants() {
        // Verify every variant of the taxonomy can be constructed.
        let _config = ConversaError::Config("test".into());
        let _storage = ConversaError::Storage {
            source: Box::new(std::io::Error::other("test")),
        };
        let _validation = ConversaError::Validation {
            reason: "empty payload".into(),
        };
        let _device = ConversaError::UnknownDevice {
            device_id: "dev-a".into(),
        };
        let _conversation = ConversaError::UnknownConversation {
            conversation_id: "c-1".into(),
        };
        let _closed = ConversaError::ConversationClosed {
            conversation_id: "c-1".into(),
        };
        let _overloaded = ConversaError::Overloaded {
            waited: std::time::Duration::from_millis(50),
        };
        let _analysis = ConversaError::Analysis {
            message: "test".into(),
            source: None,
        };
        let _timeout = ConversaError::Timeout {
            duration: std::time::Duration::from_secs(30),
        };
        let _internal = ConversaError::Internal("test".into());
    }

    #[test]
    fn adapter_type_round_trips() {
        use std::str::FromStr;

        let variants = [AdapterType::Storage, AdapterType::Analyzer, AdapterType::Ingest];
        for variant in &variants {
            let s = variant.to_string();
            let parsed = AdapterType::from_str(&s).expect("should parse back");
            assert_eq!(*variant, parsed);
        }
    }

    #[test]
    fn error_messages_name_the_offender() {
        let err = ConversaError::ConversationClosed {
            conversation_id: "c-42".into(),
        };
        assert!(err.to_string().contains("c-42"));

        let err = ConversaError::UnknownDevice {
            device_id: "dev-9".into(),
        };
        assert!(err.to_string().contains("dev-9"));
    }

    #[test]
    fn all_trait_modules_are_exported() {
        // If any trait module is missing or broken, this won't compile.
        fn _assert_plugin_adapter<T: PluginAdapter>() {}
        fn _assert_result_store<T: ResultStore>() {}
        fn _assert_analyzer<T: Analyzer>() {}
    }
}

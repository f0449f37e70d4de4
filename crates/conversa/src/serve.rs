// SPDX-FileCopyrightText: 2026 Conversa Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The `serve` command: run the pipeline against an NDJSON stdin transport.
//!
//! The ingestion boundary is transport-agnostic; stdin NDJSON is the
//! reference transport. One line in, one JSON outcome out on stdout --
//! outcomes return synchronously to the submitting device.

use std::sync::Arc;

use serde::Deserialize;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use conversa_analysis::TimelineAnalyzer;
use conversa_config::model::ConversaConfig;
use conversa_core::types::{AcceptOutcome, DeviceId, FragmentSubmission};
use conversa_core::{Analyzer, ConversaError, ResultStore};
use conversa_pipeline::{shutdown, Pipeline};
use conversa_storage::SqliteResultStore;

/// One NDJSON ingestion operation.
#[derive(Debug, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
enum IngestOp {
    /// Register a device so its fragments are accepted.
    Register { device_id: DeviceId },
    /// Submit one fragment.
    Fragment(FragmentSubmission),
}

pub async fn run(config: ConversaConfig) -> Result<(), ConversaError> {
    let store = Arc::new(SqliteResultStore::new(config.storage.clone()));
    store.initialize().await?;

    let analyzer = Arc::new(TimelineAnalyzer::new(config.analysis.clone()));
    let pipeline = Arc::new(
        Pipeline::new(
            config,
            Arc::clone(&store) as Arc<dyn ResultStore>,
            analyzer as Arc<dyn Analyzer>,
        )
        .await?,
    );

    // Signals cancel the pipeline's own token so `run` drains and exits.
    let signals = shutdown::install_signal_handler();
    let pipeline_token = pipeline.cancellation_token();
    tokio::spawn({
        let signals = signals.clone();
        let pipeline_token = pipeline_token.clone();
        async move {
            signals.cancelled().await;
            pipeline_token.cancel();
        }
    });

    let ingest = tokio::spawn(ingest_stdin(Arc::clone(&pipeline), pipeline_token));

    pipeline.run().await?;

    if let Err(e) = ingest.await {
        warn!(error = %e, "ingest task join failed");
    }
    Ok(())
}

/// Read NDJSON operations from stdin until EOF or shutdown.
async fn ingest_stdin(pipeline: Arc<Pipeline>, cancel: CancellationToken) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            line = lines.next_line() => match line {
                Ok(Some(line)) => {
                    if line.trim().is_empty() {
                        continue;
                    }
                    let response = handle_line(&pipeline, &line).await;
                    println!("{response}");
                }
                Ok(None) => {
                    info!("ingest stream ended, shutting down");
                    cancel.cancel();
                    break;
                }
                Err(e) => {
                    warn!(error = %e, "ingest read error, shutting down");
                    cancel.cancel();
                    break;
                }
            }
        }
    }
}

/// Process one NDJSON line, returning the JSON response line.
async fn handle_line(pipeline: &Pipeline, line: &str) -> String {
    let op: IngestOp = match serde_json::from_str(line) {
        Ok(op) => op,
        Err(e) => {
            return serde_json::json!({
                "outcome": "rejected",
                "reason": format!("malformed_payload: {e}"),
            })
            .to_string();
        }
    };

    match op {
        IngestOp::Register { device_id } => match pipeline.register_device(device_id).await {
            Ok(device) => serde_json::json!({
                "outcome": "registered",
                "device_id": device.id.0,
            })
            .to_string(),
            Err(e) => serde_json::json!({
                "outcome": "error",
                "reason": e.to_string(),
            })
            .to_string(),
        },
        IngestOp::Fragment(submission) => {
            outcome_json(pipeline.submit(submission).await)
        }
    }
}

fn outcome_json(outcome: AcceptOutcome) -> String {
    match outcome {
        AcceptOutcome::Accepted { conversation_id } => serde_json::json!({
            "outcome": "accepted",
            "conversation_id": conversation_id.0,
        })
        .to_string(),
        AcceptOutcome::Duplicate => serde_json::json!({
            "outcome": "duplicate",
        })
        .to_string(),
        AcceptOutcome::Rejected(reason) => serde_json::json!({
            "outcome": "rejected",
            "reason": reason.to_string(),
        })
        .to_string(),
    }
}

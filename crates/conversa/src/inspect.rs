// SPDX-FileCopyrightText: 2026 Conversa Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Query-boundary subcommands: `conversations` and `devices`.
//!
//! These are the CLI face of the query functions the external API layer
//! consumes: `list_conversations(filter)`, `load_conversation(id)`,
//! `list_devices()`.

use chrono::{DateTime, Utc};
use clap::Subcommand;
use colored::Colorize;

use conversa_config::model::ConversaConfig;
use conversa_core::types::{
    ConversationFilter, ConversationId, ConversationState, DeviceId,
};
use conversa_core::{ConversaError, ResultStore};
use conversa_storage::SqliteResultStore;

#[derive(Subcommand, Debug)]
pub enum ConversationsCmd {
    /// List archived conversation summaries.
    List {
        /// Filter by archived state (open, closing, closed).
        #[arg(long)]
        state: Option<ConversationState>,
        /// Filter by participating device id.
        #[arg(long)]
        device: Option<String>,
        /// Only conversations created at or after this RFC 3339 instant.
        #[arg(long)]
        since: Option<String>,
        /// Only conversations created before this RFC 3339 instant.
        #[arg(long)]
        until: Option<String>,
        /// Maximum number of summaries.
        #[arg(long, default_value_t = 50)]
        limit: u32,
    },
    /// Show one conversation's timeline and annotations.
    Show {
        /// Conversation id.
        id: String,
    },
}

async fn open_store(config: &ConversaConfig) -> Result<SqliteResultStore, ConversaError> {
    let store = SqliteResultStore::new(config.storage.clone());
    store.initialize().await?;
    Ok(store)
}

fn parse_instant(raw: &str) -> Result<DateTime<Utc>, ConversaError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| ConversaError::Validation {
            reason: format!("invalid timestamp `{raw}`: {e}"),
        })
}

pub async fn conversations(
    config: ConversaConfig,
    command: ConversationsCmd,
) -> Result<(), ConversaError> {
    let store = open_store(&config).await?;

    match command {
        ConversationsCmd::List {
            state,
            device,
            since,
            until,
            limit,
        } => {
            let filter = ConversationFilter {
                state,
                device_id: device.map(DeviceId),
                since: since.as_deref().map(parse_instant).transpose()?,
                until: until.as_deref().map(parse_instant).transpose()?,
                limit: Some(limit),
            };
            let records = store.list_conversations(&filter).await?;

            if records.is_empty() {
                println!("no conversations match");
            }
            for record in records {
                println!(
                    "{}  {}  {} fragments, {} participants, {} late",
                    record.id.0.bold(),
                    record.created_at.to_rfc3339().dimmed(),
                    record.fragment_count,
                    record.participants.len(),
                    record.late_dropped,
                );
            }
        }
        ConversationsCmd::Show { id } => {
            let archive = store
                .load_conversation(&ConversationId(id.clone()))
                .await?
                .ok_or(ConversaError::UnknownConversation {
                    conversation_id: id,
                })?;

            println!(
                "{} ({} - {})",
                archive.record.id.0.bold(),
                archive.record.created_at.to_rfc3339(),
                archive.record.last_activity_at.to_rfc3339(),
            );
            for fragment in &archive.timeline {
                println!(
                    "  {}  {}  {}",
                    fragment.capture_ts.to_rfc3339().dimmed(),
                    fragment.device_id.0.cyan(),
                    fragment.payload,
                );
            }
            if !archive.annotations.is_empty() {
                println!("{}", "annotations:".bold());
                for annotation in &archive.annotations {
                    println!(
                        "  {}  [{} - {}]  {}  {}",
                        annotation.kind.to_string().yellow(),
                        annotation.span_start.to_rfc3339().dimmed(),
                        annotation.span_end.to_rfc3339().dimmed(),
                        annotation.pass,
                        annotation.payload,
                    );
                }
            }
        }
    }

    store.close().await
}

pub async fn devices(config: ConversaConfig) -> Result<(), ConversaError> {
    let store = open_store(&config).await?;
    let devices = store.list_devices().await?;

    if devices.is_empty() {
        println!("no devices registered");
    }
    for device in devices {
        let status = if device.active {
            "active".green()
        } else {
            "inactive".dimmed()
        };
        println!(
            "{}  {}  last seen {}",
            device.id.0.bold(),
            status,
            device.last_seen_at.to_rfc3339().dimmed(),
        );
    }

    store.close().await
}

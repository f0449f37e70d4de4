// SPDX-FileCopyrightText: 2026 Conversa Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The `doctor` command: configuration summary and storage health check.

use colored::Colorize;

use conversa_config::model::ConversaConfig;
use conversa_core::types::ConversationFilter;
use conversa_core::{ConversaError, HealthStatus, PluginAdapter, ResultStore};
use conversa_storage::SqliteResultStore;

pub async fn run(config: ConversaConfig) -> Result<(), ConversaError> {
    println!("{}", "configuration".bold());
    println!("  service name        {}", config.service.name);
    println!("  idle timeout        {:?}", config.pipeline.idle_timeout());
    println!(
        "  out-of-order tol.   {:?}",
        config.pipeline.out_of_order_tolerance()
    );
    println!("  window size         {:?}", config.pipeline.window_size());
    println!(
        "  dedup window        {} seqs/device",
        config.intake.dedup_window_size
    );
    println!(
        "  backpressure wait   {:?}",
        config.intake.backpressure_wait()
    );
    println!("  database            {}", config.storage.database_path);

    println!("{}", "storage".bold());
    let store = SqliteResultStore::new(config.storage.clone());
    store.initialize().await?;

    match store.health_check().await? {
        HealthStatus::Healthy => println!("  health              {}", "healthy".green()),
        HealthStatus::Degraded(reason) => {
            println!("  health              {} ({reason})", "degraded".yellow())
        }
        HealthStatus::Unhealthy(reason) => {
            println!("  health              {} ({reason})", "unhealthy".red())
        }
    }

    let devices = store.list_devices().await?;
    let conversations = store
        .list_conversations(&ConversationFilter::default())
        .await?;
    println!("  devices             {}", devices.len());
    println!("  conversations       {}", conversations.len());

    store.close().await
}

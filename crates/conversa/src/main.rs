// SPDX-FileCopyrightText: 2026 Conversa Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Conversa -- device-sourced conversation ingestion and analysis.
//!
//! This is the binary entry point for the Conversa pipeline.

#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

mod doctor;
mod inspect;
mod serve;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

/// Conversa -- device-sourced conversation ingestion and analysis.
#[derive(Parser, Debug)]
#[command(name = "conversa", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the pipeline, ingesting NDJSON fragments from stdin.
    Serve,
    /// List or show archived conversations.
    Conversations {
        #[command(subcommand)]
        command: inspect::ConversationsCmd,
    },
    /// List registered devices.
    Devices,
    /// Check configuration and storage health.
    Doctor,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Load and validate configuration at startup.
    let config = match conversa_config::load_and_validate() {
        Ok(config) => config,
        Err(errors) => {
            conversa_config::render_errors(&errors);
            std::process::exit(1);
        }
    };

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.service.log_level.clone()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let result = match cli.command {
        Some(Commands::Serve) => serve::run(config).await,
        Some(Commands::Conversations { command }) => inspect::conversations(config, command).await,
        Some(Commands::Devices) => inspect::devices(config).await,
        Some(Commands::Doctor) => doctor::run(config).await,
        None => {
            println!("conversa: use --help for available commands");
            Ok(())
        }
    };

    if let Err(e) = result {
        eprintln!("conversa: {e}");
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    #[test]
    #[cfg(not(target_env = "msvc"))]
    fn jemalloc_is_active() {
        // Verify jemalloc is the global allocator by advancing the epoch.
        // Only jemalloc supports this -- the system allocator would fail.
        use tikv_jemalloc_ctl::{epoch, stats};
        epoch::advance().unwrap();
        let allocated = stats::allocated::read().unwrap();
        assert!(allocated > 0, "jemalloc should report non-zero allocation");
    }

    #[test]
    fn binary_loads_config_defaults() {
        // Verify config loads with defaults (no config file needed).
        let config = conversa_config::load_and_validate_str("")
            .expect("default config should be valid");
        assert_eq!(config.service.name, "conversa");
    }
}

// SPDX-FileCopyrightText: 2026 Conversa Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite result store for the Conversa pipeline.
//!
//! Archives closed conversations (summary, committed timeline, annotations)
//! append-only, backs the device registry, and serves the query boundary.
//! All writes go through one `tokio-rusqlite` connection -- see [`writer`].

pub mod adapter;
pub mod database;
pub mod migrations;
pub mod models;
pub mod queries;
pub mod writer;

pub use adapter::SqliteResultStore;
pub use database::Database;

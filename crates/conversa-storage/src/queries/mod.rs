// SPDX-FileCopyrightText: 2026 Conversa Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Typed query modules. All functions accept `&Database` and run on the
//! connection's single background thread.

pub mod annotations;
pub mod conversations;
pub mod devices;

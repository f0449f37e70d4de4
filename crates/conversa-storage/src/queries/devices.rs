// SPDX-FileCopyrightText: 2026 Conversa Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Device registry operations.
//!
//! Devices are never deleted; `active = 0` marks them inactive.

use rusqlite::params;

use conversa_core::types::{ConversationId, Device, DeviceId};
use conversa_core::ConversaError;

use crate::database::{fmt_ts, parse_ts, Database};

fn device_from_row(row: &rusqlite::Row<'_>) -> Result<Device, rusqlite::Error> {
    let registered_at: String = row.get(1)?;
    let last_seen_at: String = row.get(2)?;
    let active_conversation: Option<String> = row.get(3)?;
    Ok(Device {
        id: DeviceId(row.get(0)?),
        registered_at: parse_ts(&registered_at)?,
        last_seen_at: parse_ts(&last_seen_at)?,
        active_conversation: active_conversation.map(ConversationId),
        active: row.get::<_, i64>(4)? != 0,
    })
}

/// Register a new device. Fails if the id is already registered.
pub async fn register_device(db: &Database, device: &Device) -> Result<(), ConversaError> {
    let device = device.clone();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO devices (id, registered_at, last_seen_at, active_conversation, active)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    device.id.0,
                    fmt_ts(device.registered_at),
                    fmt_ts(device.last_seen_at),
                    device.active_conversation.as_ref().map(|c| c.0.clone()),
                    device.active as i64,
                ],
            )?;
            Ok(())
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Update a device's last-seen timestamp, conversation reference, and
/// activity flag, inserting if the device is somehow missing.
pub async fn upsert_device(db: &Database, device: &Device) -> Result<(), ConversaError> {
    let device = device.clone();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO devices (id, registered_at, last_seen_at, active_conversation, active)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(id) DO UPDATE SET
                     last_seen_at = excluded.last_seen_at,
                     active_conversation = excluded.active_conversation,
                     active = excluded.active",
                params![
                    device.id.0,
                    fmt_ts(device.registered_at),
                    fmt_ts(device.last_seen_at),
                    device.active_conversation.as_ref().map(|c| c.0.clone()),
                    device.active as i64,
                ],
            )?;
            Ok(())
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Get a device by id.
pub async fn get_device(db: &Database, id: &DeviceId) -> Result<Option<Device>, ConversaError> {
    let id = id.0.clone();
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, registered_at, last_seen_at, active_conversation, active
                 FROM devices WHERE id = ?1",
            )?;
            let result = stmt.query_row(params![id], device_from_row);
            match result {
                Ok(device) => Ok(Some(device)),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(e.into()),
            }
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// List all registered devices, most recently seen first.
pub async fn list_devices(db: &Database) -> Result<Vec<Device>, ConversaError> {
    db.connection()
        .call(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, registered_at, last_seen_at, active_conversation, active
                 FROM devices ORDER BY last_seen_at DESC",
            )?;
            let rows = stmt.query_map([], device_from_row)?;
            let mut devices = Vec::new();
            for row in rows {
                devices.push(row?);
            }
            Ok(devices)
        })
        .await
        .map_err(crate::database::map_tr_err)
}

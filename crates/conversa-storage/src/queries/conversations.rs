// SPDX-FileCopyrightText: 2026 Conversa Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Conversation archive operations.
//!
//! Archives are append-only: `persist_archive` writes the summary row, the
//! committed timeline, and the annotations in one transaction, and refuses
//! to overwrite an existing conversation id.

use std::str::FromStr;

use rusqlite::params;

use conversa_core::types::{
    Annotation, ConversationArchive, ConversationFilter, ConversationId, ConversationRecord,
    ConversationState, DeviceId, Fragment, PayloadKind,
};
use conversa_core::ConversaError;

use crate::database::{fmt_ts, parse_ts, Database};
use crate::queries::annotations::{annotation_from_row, insert_annotations};

fn record_from_row(row: &rusqlite::Row<'_>) -> Result<ConversationRecord, rusqlite::Error> {
    let state: String = row.get(1)?;
    let participants_json: String = row.get(2)?;
    let created_at: String = row.get(3)?;
    let last_activity_at: String = row.get(4)?;

    let participants: Vec<String> =
        serde_json::from_str(&participants_json).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(
                2,
                rusqlite::types::Type::Text,
                Box::new(e),
            )
        })?;

    Ok(ConversationRecord {
        id: ConversationId(row.get(0)?),
        state: ConversationState::from_str(&state).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(
                1,
                rusqlite::types::Type::Text,
                Box::new(e),
            )
        })?,
        participants: participants.into_iter().map(DeviceId).collect(),
        created_at: parse_ts(&created_at)?,
        last_activity_at: parse_ts(&last_activity_at)?,
        fragment_count: row.get::<_, i64>(5)? as u64,
        late_dropped: row.get::<_, i64>(6)? as u64,
    })
}

fn fragment_from_row(row: &rusqlite::Row<'_>) -> Result<Fragment, rusqlite::Error> {
    let capture_ts: String = row.get(2)?;
    let payload_kind: String = row.get(3)?;
    let arrival_ts: String = row.get(5)?;
    Ok(Fragment {
        device_id: DeviceId(row.get(0)?),
        seq: row.get::<_, i64>(1)? as u64,
        capture_ts: parse_ts(&capture_ts)?,
        payload_kind: PayloadKind::from_str(&payload_kind).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(
                3,
                rusqlite::types::Type::Text,
                Box::new(e),
            )
        })?,
        payload: row.get(4)?,
        arrival_ts: parse_ts(&arrival_ts)?,
    })
}

/// Archive a closed conversation atomically: summary row, committed
/// timeline, and annotations. Re-archiving an existing id is an error.
pub async fn persist_archive(
    db: &Database,
    record: &ConversationRecord,
    timeline: &[Fragment],
    annotations: &[Annotation],
) -> Result<(), ConversaError> {
    let record = record.clone();
    let timeline = timeline.to_vec();
    let annotations = annotations.to_vec();

    db.connection()
        .call(move |conn| {
            let tx = conn.transaction()?;

            let participants: Vec<&str> =
                record.participants.iter().map(|d| d.0.as_str()).collect();
            let participants_json = serde_json::to_string(&participants).map_err(|e| {
                rusqlite::Error::ToSqlConversionFailure(Box::new(e))
            })?;

            tx.execute(
                "INSERT INTO conversations
                     (id, state, participants, created_at, last_activity_at,
                      fragment_count, late_dropped, archived_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))",
                params![
                    record.id.0,
                    record.state.to_string(),
                    participants_json,
                    fmt_ts(record.created_at),
                    fmt_ts(record.last_activity_at),
                    record.fragment_count as i64,
                    record.late_dropped as i64,
                ],
            )?;

            for (position, fragment) in timeline.iter().enumerate() {
                tx.execute(
                    "INSERT INTO fragments
                         (conversation_id, position, device_id, seq, capture_ts,
                          payload_kind, payload, arrival_ts)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                    params![
                        record.id.0,
                        position as i64,
                        fragment.device_id.0,
                        fragment.seq as i64,
                        fmt_ts(fragment.capture_ts),
                        fragment.payload_kind.to_string(),
                        fragment.payload,
                        fmt_ts(fragment.arrival_ts),
                    ],
                )?;
            }

            insert_annotations(&tx, &annotations)?;

            tx.commit()?;
            Ok(())
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Load an archived conversation with its timeline and annotations.
pub async fn load_archive(
    db: &Database,
    id: &ConversationId,
) -> Result<Option<ConversationArchive>, ConversaError> {
    let id = id.0.clone();
    db.connection()
        .call(move |conn| {
            let record = {
                let mut stmt = conn.prepare(
                    "SELECT id, state, participants, created_at, last_activity_at,
                            fragment_count, late_dropped
                     FROM conversations WHERE id = ?1",
                )?;
                match stmt.query_row(params![id], record_from_row) {
                    Ok(record) => record,
                    Err(rusqlite::Error::QueryReturnedNoRows) => return Ok(None),
                    Err(e) => return Err(e.into()),
                }
            };

            let timeline = {
                let mut stmt = conn.prepare(
                    "SELECT device_id, seq, capture_ts, payload_kind, payload, arrival_ts
                     FROM fragments WHERE conversation_id = ?1 ORDER BY position ASC",
                )?;
                let rows = stmt.query_map(params![id], fragment_from_row)?;
                let mut fragments = Vec::new();
                for row in rows {
                    fragments.push(row?);
                }
                fragments
            };

            let annotations = {
                let mut stmt = conn.prepare(
                    "SELECT conversation_id, kind, span_start, span_end, pass, payload
                     FROM annotations WHERE conversation_id = ?1 ORDER BY id ASC",
                )?;
                let rows = stmt.query_map(params![id], annotation_from_row)?;
                let mut annotations = Vec::new();
                for row in rows {
                    annotations.push(row?);
                }
                annotations
            };

            Ok(Some(ConversationArchive {
                record,
                timeline,
                annotations,
            }))
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// List archived conversation summaries matching the filter, newest first.
///
/// The filter field set is fixed: state, device_id (participant), since,
/// until, limit.
pub async fn list_records(
    db: &Database,
    filter: &ConversationFilter,
) -> Result<Vec<ConversationRecord>, ConversaError> {
    let filter = filter.clone();
    db.connection()
        .call(move |conn| {
            let mut sql = String::from(
                "SELECT id, state, participants, created_at, last_activity_at,
                        fragment_count, late_dropped
                 FROM conversations",
            );
            let mut conditions: Vec<String> = Vec::new();
            let mut values: Vec<String> = Vec::new();

            if let Some(state) = filter.state {
                values.push(state.to_string());
                conditions.push(format!("state = ?{}", values.len()));
            }
            if let Some(ref device_id) = filter.device_id {
                // Participants are stored as a JSON array of quoted ids.
                values.push(format!("%\"{}\"%", device_id.0));
                conditions.push(format!("participants LIKE ?{}", values.len()));
            }
            if let Some(since) = filter.since {
                values.push(fmt_ts(since));
                conditions.push(format!("created_at >= ?{}", values.len()));
            }
            if let Some(until) = filter.until {
                values.push(fmt_ts(until));
                conditions.push(format!("created_at < ?{}", values.len()));
            }

            if !conditions.is_empty() {
                sql.push_str(" WHERE ");
                sql.push_str(&conditions.join(" AND "));
            }
            sql.push_str(" ORDER BY created_at DESC");
            if let Some(limit) = filter.limit {
                sql.push_str(&format!(" LIMIT {limit}"));
            }

            let mut stmt = conn.prepare(&sql)?;
            let rows =
                stmt.query_map(rusqlite::params_from_iter(values.iter()), record_from_row)?;
            let mut records = Vec::new();
            for row in rows {
                records.push(row?);
            }
            Ok(records)
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Record a window whose analysis failed after retry exhaustion.
pub async fn record_failed_window(
    db: &Database,
    id: &ConversationId,
    window_index: u64,
    error: &str,
) -> Result<(), ConversaError> {
    let id = id.0.clone();
    let error = error.to_string();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT OR REPLACE INTO failed_windows
                     (conversation_id, window_index, error, recorded_at)
                 VALUES (?1, ?2, ?3, strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))",
                params![id, window_index as i64, error],
            )?;
            Ok(())
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// List failed windows recorded for a conversation.
pub async fn failed_windows(
    db: &Database,
    id: &ConversationId,
) -> Result<Vec<(u64, String)>, ConversaError> {
    let id = id.0.clone();
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT window_index, error FROM failed_windows
                 WHERE conversation_id = ?1 ORDER BY window_index ASC",
            )?;
            let rows = stmt.query_map(params![id], |row| {
                Ok((row.get::<_, i64>(0)? as u64, row.get::<_, String>(1)?))
            })?;
            let mut windows = Vec::new();
            for row in rows {
                windows.push(row?);
            }
            Ok(windows)
        })
        .await
        .map_err(crate::database::map_tr_err)
}

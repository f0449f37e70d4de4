// SPDX-FileCopyrightText: 2026 Conversa Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Annotation persistence helpers.
//!
//! Annotations are written together with their conversation's archive
//! transaction (see `queries::conversations::persist_archive`) and are
//! append-only.

use std::str::FromStr;

use rusqlite::params;

use conversa_core::types::{
    AnalysisPass, Annotation, AnnotationKind, ConversationId,
};
use conversa_core::ConversaError;

use crate::database::{fmt_ts, parse_ts, Database};

pub(crate) fn annotation_from_row(
    row: &rusqlite::Row<'_>,
) -> Result<Annotation, rusqlite::Error> {
    let kind: String = row.get(1)?;
    let span_start: String = row.get(2)?;
    let span_end: String = row.get(3)?;
    let pass: String = row.get(4)?;
    let payload: String = row.get(5)?;

    let conv = |idx, e: Box<dyn std::error::Error + Send + Sync>| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, e)
    };

    Ok(Annotation {
        conversation_id: ConversationId(row.get(0)?),
        kind: AnnotationKind::from_str(&kind).map_err(|e| conv(1, Box::new(e)))?,
        span_start: parse_ts(&span_start)?,
        span_end: parse_ts(&span_end)?,
        pass: AnalysisPass::from_str(&pass).map_err(|e| conv(4, Box::new(e)))?,
        payload: serde_json::from_str(&payload).map_err(|e| conv(5, Box::new(e)))?,
    })
}

/// Insert annotations inside an open archive transaction.
pub(crate) fn insert_annotations(
    tx: &rusqlite::Transaction<'_>,
    annotations: &[Annotation],
) -> Result<(), rusqlite::Error> {
    for annotation in annotations {
        let payload = serde_json::to_string(&annotation.payload)
            .map_err(|e| rusqlite::Error::ToSqlConversionFailure(Box::new(e)))?;
        tx.execute(
            "INSERT INTO annotations
                 (conversation_id, kind, span_start, span_end, pass, payload)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                annotation.conversation_id.0,
                annotation.kind.to_string(),
                fmt_ts(annotation.span_start),
                fmt_ts(annotation.span_end),
                annotation.pass.to_string(),
                payload,
            ],
        )?;
    }
    Ok(())
}

/// Fetch all annotations for a conversation in insertion order.
pub async fn for_conversation(
    db: &Database,
    id: &ConversationId,
) -> Result<Vec<Annotation>, ConversaError> {
    let id = id.0.clone();
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT conversation_id, kind, span_start, span_end, pass, payload
                 FROM annotations WHERE conversation_id = ?1 ORDER BY id ASC",
            )?;
            let rows = stmt.query_map(params![id], annotation_from_row)?;
            let mut annotations = Vec::new();
            for row in rows {
                annotations.push(row?);
            }
            Ok(annotations)
        })
        .await
        .map_err(crate::database::map_tr_err)
}

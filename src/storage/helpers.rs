//! Shared storage helper functions.
//!
//! Query construction, row decoding, and driver-error mapping used by both
//! relational backends. Queries are assembled dialect-independently with
//! sea-query; each backend renders them with its own query builder.

use chrono::{DateTime, NaiveDateTime, Utc};
use sea_query::{Asterisk, Expr, InsertStatement, Order, Query, SelectStatement};
use sqlx::postgres::PgRow;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use crate::envelope::{EnvelopeBatch, EventEnvelope, JsonObject};
use crate::interfaces::event_store::{
    EnvelopeViolation, EventStoreError, Result, SinceFilter, StreamRange,
};
use crate::storage::schema::{Events, UQ_EVENT_ID, UQ_STREAM_ID_VERSION};

/// Wrap a pool/transaction-level failure.
pub(crate) fn unavailable(err: sqlx::Error) -> EventStoreError {
    EventStoreError::Unavailable(err.to_string())
}

fn decode_err(err: sqlx::Error) -> EventStoreError {
    EventStoreError::Unavailable(format!("row decode failed: {err}"))
}

/// Map a server-engine driver error onto the store taxonomy.
///
/// Postgres names the violated constraint, so the two unique constraints
/// map directly; residual data (class 22) and integrity (class 23) errors
/// are caller-attributable, everything else is transient.
pub(crate) fn map_pg_error(err: sqlx::Error, stream_id: &str) -> EventStoreError {
    if let sqlx::Error::Database(db) = &err {
        match db.constraint() {
            Some(UQ_EVENT_ID) => {
                return EventStoreError::DuplicateEventId {
                    detail: db.message().to_string(),
                }
            }
            Some(UQ_STREAM_ID_VERSION) => {
                return EventStoreError::VersionConflict {
                    stream_id: stream_id.to_string(),
                    detail: db.message().to_string(),
                }
            }
            _ => {}
        }
        if let Some(code) = db.code() {
            if code.starts_with("22") || code.starts_with("23") {
                return EventStoreError::invalid(
                    EnvelopeViolation::SchemaRejected,
                    db.message().to_string(),
                );
            }
        }
    }
    EventStoreError::Unavailable(err.to_string())
}

/// Map an embedded-engine driver error onto the store taxonomy.
///
/// SQLite does not expose constraint names, only messages of the form
/// `UNIQUE constraint failed: event_store.event_id`, so mapping keys off
/// the affected columns.
pub(crate) fn map_sqlite_error(err: sqlx::Error, stream_id: &str) -> EventStoreError {
    if let sqlx::Error::Database(db) = &err {
        let message = db.message();
        if message.contains("UNIQUE constraint failed") {
            if message.contains("event_store.event_id") {
                return EventStoreError::DuplicateEventId {
                    detail: message.to_string(),
                };
            }
            if message.contains("event_store.stream_id") {
                return EventStoreError::VersionConflict {
                    stream_id: stream_id.to_string(),
                    detail: message.to_string(),
                };
            }
        }
        if message.contains("CHECK constraint failed") {
            return EventStoreError::invalid(EnvelopeViolation::SchemaRejected, message.to_string());
        }
    }
    EventStoreError::Unavailable(err.to_string())
}

/// Enforce the optimistic-concurrency precondition: the batch must start at
/// the current stream tip plus one.
pub(crate) fn check_tip(batch: &EnvelopeBatch, tip: i64) -> Result<()> {
    let expected = tip + 1;
    if batch.starting_version() != expected {
        return Err(EventStoreError::VersionConflict {
            stream_id: batch.stream_id().to_string(),
            detail: format!(
                "expected first version {expected}, got {}",
                batch.starting_version()
            ),
        });
    }
    Ok(())
}

/// `SELECT MAX(version)` for one stream.
pub(crate) fn build_tip_select(stream_type: &str, stream_id: &str) -> SelectStatement {
    Query::select()
        .expr(Expr::col(Events::Version).max())
        .from(Events::Table)
        .and_where(Expr::col(Events::StreamType).eq(stream_type))
        .and_where(Expr::col(Events::StreamId).eq(stream_id))
        .to_owned()
}

/// Multi-row insert for a batch. `global_seq` and `recorded_at` are left to
/// the schema, which assigns both server-side.
pub(crate) fn build_insert(batch: &EnvelopeBatch) -> InsertStatement {
    let mut stmt = Query::insert()
        .into_table(Events::Table)
        .columns([
            Events::StreamId,
            Events::StreamType,
            Events::Version,
            Events::EventId,
            Events::EventType,
            Events::Payload,
            Events::Metadata,
        ])
        .to_owned();

    for event in batch.events() {
        stmt.values_panic([
            event.stream_id.as_str().into(),
            event.stream_type.as_str().into(),
            event.version.into(),
            event.event_id.as_str().into(),
            event.event_type.as_str().into(),
            serde_json::Value::Object(event.payload.clone()).into(),
            serde_json::Value::Object(event.metadata.clone()).into(),
        ]);
    }

    stmt
}

/// Per-stream read, ascending by version, inclusive bounds.
pub(crate) fn build_stream_select(stream_id: &str, range: &StreamRange) -> SelectStatement {
    build_version_window(
        stream_id,
        range.from_version(),
        range.to_version(),
        range.limit(),
    )
}

/// Version-window read used both for the public per-stream read and the
/// embedded backend's post-insert re-read.
pub(crate) fn build_version_window(
    stream_id: &str,
    from_version: i64,
    to_version: Option<i64>,
    limit: Option<i64>,
) -> SelectStatement {
    let mut stmt = Query::select()
        .column(Asterisk)
        .from(Events::Table)
        .and_where(Expr::col(Events::StreamId).eq(stream_id))
        .and_where(Expr::col(Events::Version).gte(from_version))
        .order_by(Events::Version, Order::Asc)
        .to_owned();

    if let Some(to) = to_version {
        stmt.and_where(Expr::col(Events::Version).lte(to));
    }
    if let Some(limit) = limit {
        stmt.limit(limit as u64);
    }
    stmt
}

/// Global catch-up read, ascending by `global_seq`, exclusive cursor.
pub(crate) fn build_since_select(filter: &SinceFilter) -> SelectStatement {
    let mut stmt = Query::select()
        .column(Asterisk)
        .from(Events::Table)
        .and_where(Expr::col(Events::GlobalSeq).gt(filter.after_seq()))
        .order_by(Events::GlobalSeq, Order::Asc)
        .to_owned();

    if let Some(stream_type) = filter.stream_type() {
        stmt.and_where(Expr::col(Events::StreamType).eq(stream_type));
    }
    if let Some(event_type) = filter.event_type() {
        stmt.and_where(Expr::col(Events::EventType).eq(event_type));
    }
    if let Some(limit) = filter.limit() {
        stmt.limit(limit as u64);
    }
    stmt
}

fn as_object(column: &str, value: serde_json::Value) -> Result<JsonObject> {
    match value {
        serde_json::Value::Object(map) => Ok(map),
        other => Err(EventStoreError::Unavailable(format!(
            "{column} column holds a non-object JSON value: {other}"
        ))),
    }
}

/// Decode a server-engine row into a persisted envelope.
pub(crate) fn envelope_from_pg_row(row: &PgRow) -> Result<EventEnvelope> {
    let payload: serde_json::Value = row.try_get("payload").map_err(decode_err)?;
    let metadata: Option<serde_json::Value> = row.try_get("metadata").map_err(decode_err)?;

    Ok(EventEnvelope {
        global_seq: Some(row.try_get::<i64, _>("global_seq").map_err(decode_err)?),
        event_id: row.try_get("event_id").map_err(decode_err)?,
        stream_type: row.try_get("stream_type").map_err(decode_err)?,
        stream_id: row.try_get("stream_id").map_err(decode_err)?,
        version: i64::from(row.try_get::<i32, _>("version").map_err(decode_err)?),
        event_type: row.try_get("event_type").map_err(decode_err)?,
        recorded_at: Some(
            row.try_get::<DateTime<Utc>, _>("recorded_at")
                .map_err(decode_err)?,
        ),
        payload: as_object("payload", payload)?,
        metadata: match metadata {
            Some(value) => as_object("metadata", value)?,
            None => JsonObject::new(),
        },
    })
}

/// Decode an embedded-engine row into a persisted envelope.
///
/// The embedded engine stores JSON as text and timestamps as RFC 3339
/// strings; both are decoded here so callers see the same shapes as on the
/// server engine.
pub(crate) fn envelope_from_sqlite_row(row: &SqliteRow) -> Result<EventEnvelope> {
    let payload_text: String = row.try_get("payload").map_err(decode_err)?;
    let payload = serde_json::from_str(&payload_text)
        .map_err(|e| EventStoreError::Unavailable(format!("payload column is not JSON: {e}")))?;
    let metadata_text: Option<String> = row.try_get("metadata").map_err(decode_err)?;
    let metadata = match metadata_text {
        Some(text) => as_object(
            "metadata",
            serde_json::from_str(&text).map_err(|e| {
                EventStoreError::Unavailable(format!("metadata column is not JSON: {e}"))
            })?,
        )?,
        None => JsonObject::new(),
    };

    let recorded_raw: String = row.try_get("recorded_at").map_err(decode_err)?;

    Ok(EventEnvelope {
        global_seq: Some(row.try_get::<i64, _>("global_seq").map_err(decode_err)?),
        event_id: row.try_get("event_id").map_err(decode_err)?,
        stream_type: row.try_get("stream_type").map_err(decode_err)?,
        stream_id: row.try_get("stream_id").map_err(decode_err)?,
        version: row.try_get::<i64, _>("version").map_err(decode_err)?,
        event_type: row.try_get("event_type").map_err(decode_err)?,
        recorded_at: Some(parse_utc_text(&recorded_raw)?),
        payload: as_object("payload", payload)?,
        metadata,
    })
}

/// Parse the embedded engine's timestamp text back to tz-aware UTC.
///
/// Accepts both the schema default (`2026-01-02T03:04:05.678Z`) and the
/// engine's bare `CURRENT_TIMESTAMP` form (`2026-01-02 03:04:05`).
pub(crate) fn parse_utc_text(raw: &str) -> Result<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Ok(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S")
        .map(|naive| naive.and_utc())
        .map_err(|e| EventStoreError::Unavailable(format!("unparseable recorded_at {raw:?}: {e}")))
}

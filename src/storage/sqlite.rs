//! Embedded-engine (SQLite) EventStore implementation.
//!
//! The engine's deferred transactions upgrade from shared to exclusive
//! locks and can deadlock under write contention, so appends open with
//! `BEGIN IMMEDIATE` to take the write lock upfront. The engine path does
//! not use RETURNING: rows are inserted, then re-read by
//! `(stream_id, version range)` to pick up the server-assigned
//! `global_seq` and `recorded_at`.

use async_trait::async_trait;
use sea_query::SqliteQueryBuilder;
use sqlx::{Row, SqliteConnection, SqlitePool};
use tracing::debug;

use crate::envelope::{EnvelopeBatch, EventEnvelope};
use crate::interfaces::event_store::{EventStore, Result, SinceFilter, StreamRange};
use crate::storage::helpers::{
    build_insert, build_since_select, build_stream_select, build_tip_select,
    build_version_window, check_tip, envelope_from_sqlite_row, map_sqlite_error, unavailable,
};
use crate::storage::schema::SQLITE_SCHEMA;

/// SQLite implementation of EventStore.
#[derive(Clone)]
pub struct SqliteEventStore {
    pool: SqlitePool,
}

impl SqliteEventStore {
    /// Create a new SQLite event store.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Apply the schema: table, constraints, indexes, and the append-only
    /// triggers. Idempotent; must run before the store serves traffic.
    pub async fn init(&self) -> Result<()> {
        for statement in SQLITE_SCHEMA {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .map_err(unavailable)?;
        }
        Ok(())
    }

    /// Append within an already-started transaction.
    async fn append_in_txn(
        conn: &mut SqliteConnection,
        batch: &EnvelopeBatch,
    ) -> Result<Vec<EventEnvelope>> {
        let tip_sql =
            build_tip_select(batch.stream_type(), batch.stream_id()).to_string(SqliteQueryBuilder);
        let tip_row = sqlx::query(&tip_sql)
            .fetch_one(&mut *conn)
            .await
            .map_err(|e| map_sqlite_error(e, batch.stream_id()))?;
        let tip: Option<i64> = tip_row.try_get(0).map_err(unavailable)?;
        check_tip(batch, tip.unwrap_or(0))?;

        let insert_sql = build_insert(batch).to_string(SqliteQueryBuilder);
        sqlx::query(&insert_sql)
            .execute(&mut *conn)
            .await
            .map_err(|e| map_sqlite_error(e, batch.stream_id()))?;

        // Re-read what was just written to pick up global_seq/recorded_at.
        let first = batch.starting_version();
        let last = first + batch.len() as i64 - 1;
        let reread_sql = build_version_window(batch.stream_id(), first, Some(last), None)
            .to_string(SqliteQueryBuilder);
        let rows = sqlx::query(&reread_sql)
            .fetch_all(&mut *conn)
            .await
            .map_err(|e| map_sqlite_error(e, batch.stream_id()))?;

        rows.iter().map(envelope_from_sqlite_row).collect()
    }
}

#[async_trait]
impl EventStore for SqliteEventStore {
    async fn append(&self, batch: EnvelopeBatch) -> Result<Vec<EventEnvelope>> {
        let mut conn = self.pool.acquire().await.map_err(unavailable)?;
        sqlx::query("BEGIN IMMEDIATE")
            .execute(&mut *conn)
            .await
            .map_err(unavailable)?;

        let result = Self::append_in_txn(&mut conn, &batch).await;

        match result {
            Ok(persisted) => {
                sqlx::query("COMMIT")
                    .execute(&mut *conn)
                    .await
                    .map_err(unavailable)?;
                debug!(
                    stream_id = %batch.stream_id(),
                    count = persisted.len(),
                    "appended events"
                );
                Ok(persisted)
            }
            Err(e) => {
                let _ = sqlx::query("ROLLBACK").execute(&mut *conn).await;
                Err(e)
            }
        }
    }

    async fn read_stream(
        &self,
        stream_id: &str,
        range: StreamRange,
    ) -> Result<Vec<EventEnvelope>> {
        let sql = build_stream_select(stream_id, &range).to_string(SqliteQueryBuilder);
        let rows = sqlx::query(&sql)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| map_sqlite_error(e, stream_id))?;
        rows.iter().map(envelope_from_sqlite_row).collect()
    }

    async fn read_since(&self, filter: SinceFilter) -> Result<Vec<EventEnvelope>> {
        let sql = build_since_select(&filter).to_string(SqliteQueryBuilder);
        let rows = sqlx::query(&sql)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| map_sqlite_error(e, ""))?;
        rows.iter().map(envelope_from_sqlite_row).collect()
    }
}

//! Server-engine (PostgreSQL) EventStore implementation.
//!
//! Appends run inside one transaction: tip check, multi-row insert with
//! `RETURNING *`, commit. The engine's default isolation is sufficient:
//! concurrent writers racing past the tip check lose on the unique
//! constraints, which map to the typed conflict errors.

use async_trait::async_trait;
use sea_query::PostgresQueryBuilder;
use sqlx::{PgPool, Row};
use tracing::debug;

use crate::envelope::{EnvelopeBatch, EventEnvelope};
use crate::interfaces::event_store::{EventStore, Result, SinceFilter, StreamRange};
use crate::storage::helpers::{
    build_insert, build_since_select, build_stream_select, build_tip_select, check_tip,
    envelope_from_pg_row, map_pg_error, unavailable,
};
use crate::storage::schema::POSTGRES_SCHEMA;

/// PostgreSQL implementation of EventStore.
#[derive(Clone)]
pub struct PostgresEventStore {
    pool: PgPool,
}

impl PostgresEventStore {
    /// Create a new PostgreSQL event store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Apply the schema: table, constraints, indexes, and the append-only
    /// trigger. Idempotent; must run before the store serves traffic.
    pub async fn init(&self) -> Result<()> {
        for statement in POSTGRES_SCHEMA {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .map_err(unavailable)?;
        }
        Ok(())
    }
}

#[async_trait]
impl EventStore for PostgresEventStore {
    async fn append(&self, batch: EnvelopeBatch) -> Result<Vec<EventEnvelope>> {
        let mut tx = self.pool.begin().await.map_err(unavailable)?;

        let tip_sql =
            build_tip_select(batch.stream_type(), batch.stream_id()).to_string(PostgresQueryBuilder);
        let tip_row = sqlx::query(&tip_sql)
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| map_pg_error(e, batch.stream_id()))?;
        let tip: Option<i32> = tip_row.try_get(0).map_err(unavailable)?;
        check_tip(&batch, i64::from(tip.unwrap_or(0)))?;

        let insert_sql = {
            let mut insert = build_insert(&batch);
            insert.returning_all();
            insert.to_string(PostgresQueryBuilder)
        };
        let rows = sqlx::query(&insert_sql)
            .fetch_all(&mut *tx)
            .await
            .map_err(|e| map_pg_error(e, batch.stream_id()))?;

        tx.commit().await.map_err(unavailable)?;

        let mut persisted = rows
            .iter()
            .map(envelope_from_pg_row)
            .collect::<Result<Vec<_>>>()?;
        // Input order equals version order within a single-stream batch.
        persisted.sort_by_key(|e| e.version);

        debug!(
            stream_id = %batch.stream_id(),
            count = persisted.len(),
            "appended events"
        );
        Ok(persisted)
    }

    async fn read_stream(
        &self,
        stream_id: &str,
        range: StreamRange,
    ) -> Result<Vec<EventEnvelope>> {
        let sql = build_stream_select(stream_id, &range).to_string(PostgresQueryBuilder);
        let rows = sqlx::query(&sql)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| map_pg_error(e, stream_id))?;
        rows.iter().map(envelope_from_pg_row).collect()
    }

    async fn read_since(&self, filter: SinceFilter) -> Result<Vec<EventEnvelope>> {
        let sql = build_since_select(&filter).to_string(PostgresQueryBuilder);
        let rows = sqlx::query(&sql)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| map_pg_error(e, ""))?;
        rows.iter().map(envelope_from_pg_row).collect()
    }
}

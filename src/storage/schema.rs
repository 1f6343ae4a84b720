//! Event store schema.
//!
//! Column identifiers for type-safe query building plus the per-dialect DDL
//! applied by each backend's `init()`. Constraint, index, and trigger names
//! are stable; tests and migrations reference them.
//!
//! Append-only enforcement lives here: triggers reject UPDATE and DELETE on
//! `event_store` at the engine level, so no connection can rewrite history.

use sea_query::Iden;

/// `event_store` table identifiers.
#[derive(Iden, Clone, Copy)]
pub enum Events {
    #[iden = "event_store"]
    Table,
    GlobalSeq,
    StreamId,
    StreamType,
    Version,
    EventId,
    EventType,
    RecordedAt,
    Payload,
    Metadata,
}

/// Unique constraint guarding global `event_id` uniqueness.
pub const UQ_EVENT_ID: &str = "uq_event_store_event_id";

/// Unique constraint guarding per-stream optimistic concurrency.
pub const UQ_STREAM_ID_VERSION: &str = "uq_event_store_stream_id_version";

/// Server-engine DDL, in application order. Idempotent.
pub const POSTGRES_SCHEMA: &[&str] = &[
    r"
    CREATE TABLE IF NOT EXISTS event_store (
        global_seq   BIGINT GENERATED ALWAYS AS IDENTITY,
        stream_id    VARCHAR(200) NOT NULL,
        stream_type  VARCHAR(100) NOT NULL,
        version      INTEGER NOT NULL,
        event_id     VARCHAR(26) NOT NULL,
        event_type   VARCHAR(120) NOT NULL,
        recorded_at  TIMESTAMPTZ NOT NULL DEFAULT now(),
        payload      JSONB NOT NULL,
        metadata     JSONB,
        CONSTRAINT pk_event_store PRIMARY KEY (global_seq),
        CONSTRAINT uq_event_store_event_id UNIQUE (event_id),
        CONSTRAINT uq_event_store_stream_id_version UNIQUE (stream_id, version),
        CONSTRAINT ck_event_store_positive_version CHECK (version >= 1),
        CONSTRAINT ck_event_store_event_id_26_char CHECK (length(event_id) = 26)
    )
    ",
    "CREATE INDEX IF NOT EXISTS ix_event_store_stream_type ON event_store (stream_type)",
    "CREATE INDEX IF NOT EXISTS ix_event_store_event_type ON event_store (event_type)",
    "CREATE INDEX IF NOT EXISTS ix_event_store_stream_id_global_seq ON event_store (stream_id, global_seq)",
    "CREATE INDEX IF NOT EXISTS ix_event_store_payload_gin ON event_store USING gin (payload)",
    "CREATE INDEX IF NOT EXISTS ix_event_store_metadata_gin ON event_store USING gin (metadata)",
    r"
    CREATE OR REPLACE FUNCTION event_store_forbid_mod() RETURNS trigger
    LANGUAGE plpgsql AS $$
    BEGIN
        RAISE EXCEPTION 'event_store is append-only; % not allowed', TG_OP
        USING ERRCODE = '0A000';
    END;
    $$
    ",
    "DROP TRIGGER IF EXISTS event_store_forbid_mod ON event_store",
    r"
    CREATE TRIGGER event_store_forbid_mod
    BEFORE UPDATE OR DELETE ON event_store
    FOR EACH ROW
    EXECUTE FUNCTION event_store_forbid_mod()
    ",
];

/// Embedded-engine DDL, in application order. Idempotent.
///
/// JSON columns are TEXT and `recorded_at` defaults to an RFC 3339 UTC
/// string; the backend hides both representations from callers. The engine
/// needs one trigger per statement kind, hence the `_update`/`_delete`
/// suffixes on the `event_store_forbid_mod` stem.
pub const SQLITE_SCHEMA: &[&str] = &[
    r"
    CREATE TABLE IF NOT EXISTS event_store (
        global_seq   INTEGER PRIMARY KEY AUTOINCREMENT,
        stream_id    TEXT NOT NULL,
        stream_type  TEXT NOT NULL,
        version      INTEGER NOT NULL,
        event_id     TEXT NOT NULL,
        event_type   TEXT NOT NULL,
        recorded_at  TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
        payload      TEXT NOT NULL,
        metadata     TEXT,
        CONSTRAINT uq_event_store_event_id UNIQUE (event_id),
        CONSTRAINT uq_event_store_stream_id_version UNIQUE (stream_id, version),
        CONSTRAINT ck_event_store_positive_version CHECK (version >= 1),
        CONSTRAINT ck_event_store_event_id_26_char CHECK (length(event_id) = 26)
    )
    ",
    "CREATE INDEX IF NOT EXISTS ix_event_store_stream_type ON event_store (stream_type)",
    "CREATE INDEX IF NOT EXISTS ix_event_store_event_type ON event_store (event_type)",
    "CREATE INDEX IF NOT EXISTS ix_event_store_stream_id_global_seq ON event_store (stream_id, global_seq)",
    r"
    CREATE TRIGGER IF NOT EXISTS event_store_forbid_mod_update
    BEFORE UPDATE ON event_store
    BEGIN
        SELECT RAISE(ABORT, 'event_store is append-only; UPDATE not allowed');
    END
    ",
    r"
    CREATE TRIGGER IF NOT EXISTS event_store_forbid_mod_delete
    BEFORE DELETE ON event_store
    BEGIN
        SELECT RAISE(ABORT, 'event_store is append-only; DELETE not allowed');
    END
    ",
];

//! Lucida: persistence core for an event-sourced scientific-data pipeline.
//!
//! Two tightly coupled subsystems back the pipeline's reproducibility and
//! auditability guarantees:
//!
//! - An **append-only event store** with per-stream optimistic concurrency,
//!   a globally monotonic sequence, and identical behavior over PostgreSQL
//!   and SQLite.
//! - A **content-addressed blob store** where bytes are identified solely
//!   by the SHA-256 of their contents, with atomic installation and
//!   deduplication.
//!
//! Envelope payloads may carry blob digests as references; the two
//! subsystems are otherwise independent persistence domains.

pub mod blob;
pub mod config;
pub mod digest;
pub mod envelope;
pub mod ids;
pub mod interfaces;
pub mod storage;

// Re-export common types for library usage
pub use blob::{init_blob_store, FilesystemBlobStore, MemoryBlobStore};
pub use config::{BlobStoreConfig, Config, StorageConfig, StorageType};
pub use envelope::{EnvelopeBatch, EventEnvelope, JsonObject};
pub use ids::{Clock, FixedClock, IdGenerator, SystemClock, UlidGenerator};
pub use interfaces::{
    BlobRead, BlobStat, BlobStore, BlobStoreError, EnvelopeViolation, EventStore, EventStoreError,
    RangeError, SinceFilter, StreamRange,
};
pub use storage::{init_storage, MemoryEventStore, PostgresEventStore, SqliteEventStore};

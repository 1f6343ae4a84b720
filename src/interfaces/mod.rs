//! Port definitions for the persistence core.
//!
//! Adapters under `storage` and `blob` conform to these interfaces; upper
//! layers depend on the traits, never on a concrete backend.

pub mod blob_store;
pub mod event_store;

pub use blob_store::{BlobRead, BlobStat, BlobStore, BlobStoreError};
pub use event_store::{
    EnvelopeViolation, EventStore, EventStoreError, RangeError, SinceFilter, StreamRange,
};

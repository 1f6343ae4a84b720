//! Event storage interface.
//!
//! Defines the `EventStore` port implemented by the relational backends and
//! the in-memory fake, together with the closed error taxonomy adapters must
//! map driver failures into. Callers never see a raw `sqlx::Error`.

use std::fmt;

use async_trait::async_trait;

use crate::envelope::{EnvelopeBatch, EventEnvelope};

/// Result type for event store operations.
pub type Result<T> = std::result::Result<T, EventStoreError>;

/// Machine-readable reason code attached to `InvalidEnvelope` errors.
///
/// `Display` renders the snake_case code so callers can branch without
/// parsing free-form messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvelopeViolation {
    /// Batch contained no envelopes.
    EmptyBatch,
    /// Envelopes in one batch name more than one `(stream_type, stream_id)`.
    MixedStreams,
    /// Versions within the batch do not increase by exactly one.
    NonContiguous,
    /// `version` below 1.
    BadVersion,
    /// `event_id` is not a 26-character Crockford-Base32 ULID.
    BadUlid,
    /// A required identifier is empty or whitespace.
    BlankField,
    /// An identifier exceeds its column length.
    FieldTooLong,
    /// The same `event_id` appears twice within one batch.
    DuplicateInBatch,
    /// The database rejected a row the preflight checks did not catch.
    SchemaRejected,
}

impl EnvelopeViolation {
    /// The stable snake_case code for this violation.
    pub fn code(self) -> &'static str {
        match self {
            Self::EmptyBatch => "empty_batch",
            Self::MixedStreams => "mixed_streams",
            Self::NonContiguous => "non_contiguous",
            Self::BadVersion => "bad_version",
            Self::BadUlid => "bad_ulid",
            Self::BlankField => "blank_field",
            Self::FieldTooLong => "field_too_long",
            Self::DuplicateInBatch => "duplicate_in_batch",
            Self::SchemaRejected => "schema_rejected",
        }
    }
}

impl fmt::Display for EnvelopeViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Errors that can occur during event store operations.
///
/// The taxonomy is closed: every adapter failure is mapped to one of these
/// four kinds. `InvalidEnvelope` is a caller bug and should not be retried;
/// `VersionConflict` and `DuplicateEventId` are concurrency conflicts the
/// caller may resolve by rebuilding intent; `Unavailable` is transient and
/// may be retried with backoff. The store itself never retries.
#[derive(Debug, thiserror::Error)]
pub enum EventStoreError {
    #[error("invalid envelope ({reason}): {detail}")]
    InvalidEnvelope {
        reason: EnvelopeViolation,
        detail: String,
    },

    #[error("version conflict on stream {stream_id}: {detail}")]
    VersionConflict { stream_id: String, detail: String },

    #[error("duplicate event_id: {detail}")]
    DuplicateEventId { detail: String },

    #[error("event store unavailable: {0}")]
    Unavailable(String),
}

impl EventStoreError {
    pub(crate) fn invalid(reason: EnvelopeViolation, detail: impl Into<String>) -> Self {
        Self::InvalidEnvelope {
            reason,
            detail: detail.into(),
        }
    }
}

/// Invalid read-range arguments.
///
/// Deliberately not part of [`EventStoreError`]: a bad range is a plain
/// value error in the caller's arguments, not a store failure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid read range: {0}")]
pub struct RangeError(pub String);

/// Version window for [`EventStore::read_stream`], inclusive on both ends.
///
/// The default range reads a whole stream from version 1.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamRange {
    from_version: i64,
    to_version: Option<i64>,
    limit: Option<i64>,
}

impl Default for StreamRange {
    fn default() -> Self {
        Self {
            from_version: 1,
            to_version: None,
            limit: None,
        }
    }
}

impl StreamRange {
    /// Build a range `[from_version, to_version]`.
    pub fn new(from_version: i64, to_version: Option<i64>) -> std::result::Result<Self, RangeError> {
        if from_version < 1 {
            return Err(RangeError("from_version must be >= 1".into()));
        }
        if let Some(to) = to_version {
            if to < from_version {
                return Err(RangeError("to_version must be >= from_version".into()));
            }
        }
        Ok(Self {
            from_version,
            to_version,
            limit: None,
        })
    }

    /// Cap the number of returned envelopes.
    pub fn with_limit(mut self, limit: i64) -> std::result::Result<Self, RangeError> {
        if limit < 1 {
            return Err(RangeError("limit must be >= 1".into()));
        }
        self.limit = Some(limit);
        Ok(self)
    }

    pub fn from_version(&self) -> i64 {
        self.from_version
    }

    pub fn to_version(&self) -> Option<i64> {
        self.to_version
    }

    pub fn limit(&self) -> Option<i64> {
        self.limit
    }
}

/// Cursor and coarse filters for [`EventStore::read_since`].
///
/// Matches envelopes with `global_seq > after_seq`, ascending. The default
/// filter replays the whole store.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SinceFilter {
    after_seq: i64,
    stream_type: Option<String>,
    event_type: Option<String>,
    limit: Option<i64>,
}

impl SinceFilter {
    /// Start strictly after the given global sequence number.
    pub fn after(global_seq: i64) -> std::result::Result<Self, RangeError> {
        if global_seq < 0 {
            return Err(RangeError("global_seq must be >= 0".into()));
        }
        Ok(Self {
            after_seq: global_seq,
            ..Self::default()
        })
    }

    /// Restrict to one `stream_type`.
    pub fn for_stream_type(mut self, stream_type: impl Into<String>) -> Self {
        self.stream_type = Some(stream_type.into());
        self
    }

    /// Restrict to one `event_type`.
    pub fn for_event_type(mut self, event_type: impl Into<String>) -> Self {
        self.event_type = Some(event_type.into());
        self
    }

    /// Cap the number of returned envelopes.
    pub fn with_limit(mut self, limit: i64) -> std::result::Result<Self, RangeError> {
        if limit < 1 {
            return Err(RangeError("limit must be >= 1".into()));
        }
        self.limit = Some(limit);
        Ok(self)
    }

    pub fn after_seq(&self) -> i64 {
        self.after_seq
    }

    pub fn stream_type(&self) -> Option<&str> {
        self.stream_type.as_deref()
    }

    pub fn event_type(&self) -> Option<&str> {
        self.event_type.as_deref()
    }

    pub fn limit(&self) -> Option<i64> {
        self.limit
    }
}

/// Interface for event persistence.
///
/// Implementations:
/// - `PostgresEventStore`: server engine
/// - `SqliteEventStore`: embedded engine
/// - `MemoryEventStore`: in-process fake
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Persist a single-stream batch atomically.
    ///
    /// Plain `Vec<EventEnvelope>` sequences convert via
    /// `EnvelopeBatch::try_from`, which runs the preflight validation.
    ///
    /// On success, returns fresh envelope instances in input order, each
    /// carrying the store-assigned `global_seq` and `recorded_at`.
    /// Caller-supplied values for those two fields are silently ignored.
    /// On failure nothing is persisted.
    async fn append(&self, batch: EnvelopeBatch) -> Result<Vec<EventEnvelope>>;

    /// Read one stream's envelopes, ascending by `version`.
    ///
    /// An empty window or an absent stream yields an empty vec, never an
    /// error.
    async fn read_stream(&self, stream_id: &str, range: StreamRange)
        -> Result<Vec<EventEnvelope>>;

    /// Read envelopes with `global_seq` past the cursor, ascending.
    async fn read_since(&self, filter: SinceFilter) -> Result<Vec<EventEnvelope>>;
}

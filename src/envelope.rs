//! Event envelope model.
//!
//! `EventEnvelope` is the canonical persisted shape of one domain event;
//! `EnvelopeBatch` is the single-stream, contiguous unit of atomic append.
//! Trivially checkable invariants are enforced at construction so that the
//! backends can fail fast before touching the database.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::interfaces::event_store::{EnvelopeViolation, EventStoreError};

/// JSON object used for `payload` and `metadata`.
pub type JsonObject = serde_json::Map<String, serde_json::Value>;

/// Column length limits, mirrored by the schema's VARCHAR widths.
pub const MAX_STREAM_ID_LEN: usize = 200;
pub const MAX_STREAM_TYPE_LEN: usize = 100;
pub const MAX_EVENT_TYPE_LEN: usize = 120;

/// Length of a ULID in its canonical text form.
pub const ULID_LEN: usize = 26;

/// Canonical persisted event wrapper.
///
/// `global_seq` and `recorded_at` are `None` before persistence; the store
/// assigns both on commit and returns fresh instances carrying them. A
/// persisted envelope is immutable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventEnvelope {
    /// Store-assigned global position; strictly monotonic in commit order.
    pub global_seq: Option<i64>,
    /// 26-character ULID, globally unique.
    pub event_id: String,
    /// Aggregate kind, e.g. `Session`.
    pub stream_type: String,
    /// Aggregate instance identifier.
    pub stream_id: String,
    /// Per-stream ordinal, starting at 1 and contiguous.
    pub version: i64,
    /// Domain-specific event name.
    pub event_type: String,
    /// Store-assigned UTC commit timestamp.
    #[serde(with = "rfc3339", default)]
    pub recorded_at: Option<DateTime<Utc>>,
    /// Domain data; may reference blob digests.
    pub payload: JsonObject,
    /// Transport headers; reserved keys: `correlation_id`, `causation_id`,
    /// `actor`.
    pub metadata: JsonObject,
}

impl EventEnvelope {
    /// Build a pre-persist envelope, validating the caller-checkable
    /// invariants.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        stream_type: impl Into<String>,
        stream_id: impl Into<String>,
        version: i64,
        event_id: impl Into<String>,
        event_type: impl Into<String>,
        payload: JsonObject,
        metadata: JsonObject,
    ) -> Result<Self, EventStoreError> {
        let envelope = Self {
            global_seq: None,
            event_id: event_id.into(),
            stream_type: stream_type.into(),
            stream_id: stream_id.into(),
            version,
            event_type: event_type.into(),
            recorded_at: None,
            payload,
            metadata,
        };
        envelope.validate()?;
        Ok(envelope)
    }

    /// Check the per-envelope invariants.
    pub fn validate(&self) -> Result<(), EventStoreError> {
        if self.version < 1 {
            return Err(EventStoreError::invalid(
                EnvelopeViolation::BadVersion,
                format!("version must be >= 1, got {}", self.version),
            ));
        }
        if self.event_id.len() != ULID_LEN || ulid::Ulid::from_string(&self.event_id).is_err() {
            return Err(EventStoreError::invalid(
                EnvelopeViolation::BadUlid,
                format!("event_id must be a 26-character ULID, got {:?}", self.event_id),
            ));
        }
        for (name, value) in [
            ("stream_id", &self.stream_id),
            ("stream_type", &self.stream_type),
            ("event_type", &self.event_type),
        ] {
            if value.trim().is_empty() {
                return Err(EventStoreError::invalid(
                    EnvelopeViolation::BlankField,
                    format!("{name} must be non-empty"),
                ));
            }
        }
        for (name, value, max) in [
            ("stream_id", &self.stream_id, MAX_STREAM_ID_LEN),
            ("stream_type", &self.stream_type, MAX_STREAM_TYPE_LEN),
            ("event_type", &self.event_type, MAX_EVENT_TYPE_LEN),
        ] {
            if value.len() > max {
                return Err(EventStoreError::invalid(
                    EnvelopeViolation::FieldTooLong,
                    format!("{name} exceeds {max} characters"),
                ));
            }
        }
        Ok(())
    }
}

/// A single-stream, atomic append batch.
///
/// Invariants enforced at construction:
/// - non-empty
/// - all envelopes share one `(stream_type, stream_id)`
/// - versions are contiguous and strictly increasing
/// - `event_id` values are unique within the batch
///
/// Caller-supplied `global_seq`/`recorded_at` values are accepted here and
/// silently ignored at append time.
#[derive(Debug, Clone, PartialEq)]
pub struct EnvelopeBatch {
    stream_id: String,
    stream_type: String,
    events: Vec<EventEnvelope>,
}

impl EnvelopeBatch {
    /// Build a batch from an ordered sequence of envelopes, enforcing the
    /// batch invariants.
    pub fn from_events(events: Vec<EventEnvelope>) -> Result<Self, EventStoreError> {
        let Some(first) = events.first() else {
            return Err(EventStoreError::invalid(
                EnvelopeViolation::EmptyBatch,
                "empty batch is not allowed",
            ));
        };
        let stream_id = first.stream_id.clone();
        let stream_type = first.stream_type.clone();

        for event in &events {
            event.validate()?;
            if event.stream_id != stream_id || event.stream_type != stream_type {
                return Err(EventStoreError::invalid(
                    EnvelopeViolation::MixedStreams,
                    "all envelopes in a batch must share one (stream_type, stream_id)",
                ));
            }
        }

        for (offset, event) in events.iter().enumerate() {
            let expected = events[0].version + offset as i64;
            if event.version != expected {
                return Err(EventStoreError::invalid(
                    EnvelopeViolation::NonContiguous,
                    format!(
                        "versions in a batch must increase by 1; expected {expected}, got {}",
                        event.version
                    ),
                ));
            }
        }

        for (i, event) in events.iter().enumerate() {
            if events[..i].iter().any(|e| e.event_id == event.event_id) {
                return Err(EventStoreError::invalid(
                    EnvelopeViolation::DuplicateInBatch,
                    format!("event_id {} appears twice in the batch", event.event_id),
                ));
            }
        }

        Ok(Self {
            stream_id,
            stream_type,
            events,
        })
    }

    pub fn stream_id(&self) -> &str {
        &self.stream_id
    }

    pub fn stream_type(&self) -> &str {
        &self.stream_type
    }

    pub fn events(&self) -> &[EventEnvelope] {
        &self.events
    }

    /// The first version in the batch.
    pub fn starting_version(&self) -> i64 {
        self.events[0].version
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        // A constructed batch is never empty; kept for clippy's len/is_empty pairing.
        self.events.is_empty()
    }
}

impl TryFrom<Vec<EventEnvelope>> for EnvelopeBatch {
    type Error = EventStoreError;

    fn try_from(events: Vec<EventEnvelope>) -> Result<Self, Self::Error> {
        Self::from_events(events)
    }
}

/// RFC 3339 with `Z` suffix and microsecond precision, the envelope wire
/// format for `recorded_at`.
mod rfc3339 {
    use chrono::{DateTime, SecondsFormat, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(value: &Option<DateTime<Utc>>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(ts) => {
                serializer.serialize_str(&ts.to_rfc3339_opts(SecondsFormat::Micros, true))
            }
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        match Option::<String>::deserialize(deserializer)? {
            Some(raw) => DateTime::parse_from_rfc3339(&raw)
                .map(|dt| Some(dt.with_timezone(&Utc)))
                .map_err(serde::de::Error::custom),
            None => Ok(None),
        }
    }
}

//! In-memory EventStore fake.
//!
//! Honors the full append/read contract (tip check, global uniqueness,
//! monotonic `global_seq`, store-assigned `recorded_at`) without any
//! database, so upper layers can be tested in-process. Time comes from an
//! injected [`Clock`].

use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;

use crate::envelope::{EnvelopeBatch, EventEnvelope};
use crate::ids::{Clock, SystemClock};
use crate::interfaces::event_store::{
    EventStore, EventStoreError, Result, SinceFilter, StreamRange,
};
use crate::storage::helpers::check_tip;

/// Non-durable event store holding persisted envelopes in commit order.
pub struct MemoryEventStore {
    clock: Arc<dyn Clock>,
    rows: Mutex<Vec<EventEnvelope>>,
}

impl MemoryEventStore {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Build a store whose `recorded_at` values come from the given clock.
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            rows: Mutex::new(Vec::new()),
        }
    }
}

impl Default for MemoryEventStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EventStore for MemoryEventStore {
    async fn append(&self, batch: EnvelopeBatch) -> Result<Vec<EventEnvelope>> {
        let mut rows = self.rows.lock().unwrap_or_else(PoisonError::into_inner);

        let tip = rows
            .iter()
            .filter(|row| {
                row.stream_type == batch.stream_type() && row.stream_id == batch.stream_id()
            })
            .map(|row| row.version)
            .max()
            .unwrap_or(0);
        check_tip(&batch, tip)?;

        for event in batch.events() {
            if rows.iter().any(|row| row.event_id == event.event_id) {
                return Err(EventStoreError::DuplicateEventId {
                    detail: event.event_id.clone(),
                });
            }
            // Mirrors uq_event_store_stream_id_version, which spans stream
            // types sharing one stream_id.
            if rows
                .iter()
                .any(|row| row.stream_id == event.stream_id && row.version == event.version)
            {
                return Err(EventStoreError::VersionConflict {
                    stream_id: event.stream_id.clone(),
                    detail: format!("version {} already exists", event.version),
                });
            }
        }

        let recorded_at = self.clock.now();
        let mut persisted = Vec::with_capacity(batch.len());
        for event in batch.events() {
            let mut stored = event.clone();
            stored.global_seq = Some(rows.len() as i64 + persisted.len() as i64 + 1);
            stored.recorded_at = Some(recorded_at);
            persisted.push(stored);
        }

        rows.extend(persisted.iter().cloned());
        Ok(persisted)
    }

    async fn read_stream(
        &self,
        stream_id: &str,
        range: StreamRange,
    ) -> Result<Vec<EventEnvelope>> {
        let rows = self.rows.lock().unwrap_or_else(PoisonError::into_inner);
        let mut matched: Vec<EventEnvelope> = rows
            .iter()
            .filter(|row| row.stream_id == stream_id)
            .filter(|row| row.version >= range.from_version())
            .filter(|row| range.to_version().is_none_or(|to| row.version <= to))
            .cloned()
            .collect();
        matched.sort_by_key(|row| row.version);
        if let Some(limit) = range.limit() {
            matched.truncate(limit as usize);
        }
        Ok(matched)
    }

    async fn read_since(&self, filter: SinceFilter) -> Result<Vec<EventEnvelope>> {
        let rows = self.rows.lock().unwrap_or_else(PoisonError::into_inner);
        let mut matched: Vec<EventEnvelope> = rows
            .iter()
            .filter(|row| row.global_seq.is_some_and(|seq| seq > filter.after_seq()))
            .filter(|row| {
                filter
                    .stream_type()
                    .is_none_or(|wanted| row.stream_type == wanted)
            })
            .filter(|row| {
                filter
                    .event_type()
                    .is_none_or(|wanted| row.event_type == wanted)
            })
            .cloned()
            .collect();
        matched.sort_by_key(|row| row.global_seq);
        if let Some(limit) = filter.limit() {
            matched.truncate(limit as usize);
        }
        Ok(matched)
    }
}

//! Clock and identifier services.
//!
//! ULIDs produced within one millisecond carry a monotonically increasing
//! random component, so generation order and sort order agree. The clock is
//! behind a trait so tests can pin time.

use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Utc};
use ulid::Ulid;

/// Source of unique identifiers.
pub trait IdGenerator: Send + Sync {
    /// Produce a new identifier.
    fn new_id(&self) -> String;
}

/// Thread-safe monotonic ULID generator.
///
/// Generation is serialized across threads; two ULIDs produced in the same
/// millisecond compare strictly in order of generation.
pub struct UlidGenerator {
    inner: Mutex<ulid::Generator>,
}

impl Default for UlidGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl UlidGenerator {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(ulid::Generator::new()),
        }
    }

    /// Generate the next ULID.
    pub fn next_ulid(&self) -> Ulid {
        let mut generator = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        loop {
            // Random-component overflow within one millisecond: wait for the
            // clock to tick rather than hand out a non-monotonic value.
            match generator.generate() {
                Ok(ulid) => return ulid,
                Err(_) => std::thread::yield_now(),
            }
        }
    }
}

impl IdGenerator for UlidGenerator {
    fn new_id(&self) -> String {
        self.next_ulid().to_string()
    }
}

/// Sequential zero-padded ids for tests and demos; not for production use.
#[derive(Default)]
pub struct SequentialIdGenerator {
    counter: Mutex<u64>,
}

impl SequentialIdGenerator {
    pub fn new() -> Self {
        Self::default()
    }
}

impl IdGenerator for SequentialIdGenerator {
    fn new_id(&self) -> String {
        let mut counter = self.counter.lock().unwrap_or_else(PoisonError::into_inner);
        *counter += 1;
        format!("{:026}", *counter)
    }
}

/// Abstraction over system time for deterministic behavior.
pub trait Clock: Send + Sync {
    /// Returns the current UTC time.
    fn now(&self) -> DateTime<Utc>;
}

/// Production clock that delegates to the system clock.
#[derive(Debug, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that always returns a fixed point in time.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

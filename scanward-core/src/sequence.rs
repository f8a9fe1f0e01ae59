//! Scoped sequence generation
//!
//! Each owner (event bus, aggregation run) holds its own generator instead of
//! sharing a process wide counter.

use std::sync::atomic::{AtomicU64, Ordering};

/// Monotonic sequence generator
#[derive(Debug)]
pub struct SequenceGenerator {
    next: AtomicU64,
}

impl SequenceGenerator {
    /// Creates a generator whose first value is 1
    pub fn new() -> Self {
        Self::starting_at(1)
    }

    pub fn starting_at(first: u64) -> Self {
        Self {
            next: AtomicU64::new(first),
        }
    }

    /// Returns the next value
    pub fn next_value(&self) -> u64 {
        self.next.fetch_add(1, Ordering::Relaxed)
    }
}

impl Default for SequenceGenerator {
    fn default() -> Self {
        Self::new()
    }
}

//! Statistics primitives for the huddle relay.
//!
//! [`Counter`] counts events that only ever grow (deliveries, joins).
//! [`Gauge`] tracks a level that moves both ways (queued frames) and
//! remembers its peak.
//! Both serialize as a bare integer so a stats snapshot reads as plain JSON.

use std::fmt;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

/// Monotonic event counter.
///
/// Relaxed ordering throughout: values are read for reporting, never to
/// synchronize other memory.
pub struct Counter(AtomicU64);

impl Counter {
    pub fn new() -> Self {
        Self(AtomicU64::new(0))
    }

    pub fn inc(&self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_by(&self, n: u64) {
        self.0.fetch_add(n, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

impl Default for Counter {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Counter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Counter").field(&self.get()).finish()
    }
}

impl serde::Serialize for Counter {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.get().serialize(serializer)
    }
}

/// Up/down level indicator with a high-water mark.
///
/// Signed internally so a decrement racing ahead of its increment never
/// wraps; [`Gauge::get`] clamps at zero.
pub struct Gauge {
    value: AtomicI64,
    peak: AtomicU64,
}

impl Gauge {
    pub fn new() -> Self {
        Self {
            value: AtomicI64::new(0),
            peak: AtomicU64::new(0),
        }
    }

    pub fn inc(&self) {
        self.inc_by(1);
    }

    pub fn inc_by(&self, n: u64) {
        let n = saturating_i64(n);
        let now = self
            .value
            .fetch_add(n, Ordering::Relaxed)
            .saturating_add(n);
        if now > 0 {
            self.peak.fetch_max(now as u64, Ordering::Relaxed);
        }
    }

    pub fn dec(&self) {
        self.dec_by(1);
    }

    pub fn dec_by(&self, n: u64) {
        self.value.fetch_sub(saturating_i64(n), Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.value.load(Ordering::Relaxed).max(0) as u64
    }

    /// Highest level observed since creation.
    pub fn peak(&self) -> u64 {
        self.peak.load(Ordering::Relaxed)
    }
}

fn saturating_i64(n: u64) -> i64 {
    i64::try_from(n).unwrap_or(i64::MAX)
}

impl Default for Gauge {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Gauge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Gauge")
            .field("value", &self.get())
            .field("peak", &self.peak())
            .finish()
    }
}

impl serde::Serialize for Gauge {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.get().serialize(serializer)
    }
}

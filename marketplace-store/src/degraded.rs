//! Approximate counters for degraded mode
//!
//! When no backend is reachable, aggregate queries are answered from these
//! in-process counters instead of failing. The same store carries the
//! availability switch that repositories and the aggregate gateway consult
//! before touching a backend.
//!
//! A fresh store starts with the database **disabled**; bootstrap flips it on
//! once a backend has been confirmed.
//!
//! # Example
//!
//! ```rust
//! use marketplace_store::degraded::{CounterKey, DegradedCounters};
//!
//! let counters = DegradedCounters::new();
//! counters.increment("users");
//! counters.update_progress("revenue", 42.5);
//! counters.update_progress("widgets", 1.0); // unknown keys are ignored
//!
//! assert_eq!(counters.get(CounterKey::Users), 1.0);
//! assert_eq!(counters.get(CounterKey::Revenue), 42.5);
//! assert!(!counters.is_db_available());
//! ```

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// Keys tracked by the counter store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CounterKey {
    /// Registered users
    Users,
    /// Users acting as vendors
    Vendors,
    /// Listed products
    Products,
    /// Placed orders
    Orders,
    /// Total monetary amount across orders
    Revenue,
}

impl CounterKey {
    /// Every tracked key, in storage order
    pub const ALL: [CounterKey; 5] = [
        CounterKey::Users,
        CounterKey::Vendors,
        CounterKey::Products,
        CounterKey::Orders,
        CounterKey::Revenue,
    ];

    /// Resolve a caller-supplied key name
    pub fn parse(key: &str) -> Option<Self> {
        match key {
            "users" => Some(Self::Users),
            "vendors" => Some(Self::Vendors),
            "products" => Some(Self::Products),
            "orders" => Some(Self::Orders),
            "revenue" => Some(Self::Revenue),
            _ => None,
        }
    }

    /// Key name as used by callers and in snapshots
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Users => "users",
            Self::Vendors => "vendors",
            Self::Products => "products",
            Self::Orders => "orders",
            Self::Revenue => "revenue",
        }
    }

    const fn slot(self) -> usize {
        self as usize
    }
}

impl fmt::Display for CounterKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Process-wide approximate counters plus the database availability flag
///
/// Values are `f64` stored as bits inside `AtomicU64`, so updates are lock-free
/// and safe to call from any task. Share it through `Arc<DegradedCounters>`.
#[derive(Debug)]
pub struct DegradedCounters {
    values: [AtomicU64; 5],
    db_available: AtomicBool,
}

impl DegradedCounters {
    /// Create a store with every counter at zero and the database disabled
    pub fn new() -> Self {
        Self {
            values: std::array::from_fn(|_| AtomicU64::new(0f64.to_bits())),
            db_available: AtomicBool::new(false),
        }
    }

    /// Mark the database as reachable
    pub fn enable_db(&self) {
        if !self.db_available.swap(true, Ordering::SeqCst) {
            tracing::info!("database marked available");
        }
    }

    /// Mark the database as unreachable; aggregates answer from counters
    pub fn disable_db(&self) {
        if self.db_available.swap(false, Ordering::SeqCst) {
            tracing::warn!("database marked unavailable, serving degraded answers");
        }
    }

    pub fn is_db_available(&self) -> bool {
        self.db_available.load(Ordering::SeqCst)
    }

    /// Add `delta` to a known counter
    ///
    /// Unknown keys and non-finite deltas are ignored; neither creates a key.
    pub fn update_progress(&self, key: &str, delta: f64) {
        match CounterKey::parse(key) {
            Some(key) => self.add(key, delta),
            None => tracing::debug!(key, "ignoring progress update for untracked counter"),
        }
    }

    /// Shorthand for `update_progress(key, 1.0)`
    pub fn increment(&self, key: &str) {
        self.update_progress(key, 1.0);
    }

    /// Add `delta` to a counter by typed key
    pub fn add(&self, key: CounterKey, delta: f64) {
        if !delta.is_finite() {
            tracing::debug!(%key, delta, "ignoring non-finite counter delta");
            return;
        }
        // fetch_update only fails when the closure returns None
        let _ = self.values[key.slot()].fetch_update(Ordering::AcqRel, Ordering::Acquire, |bits| {
            Some((f64::from_bits(bits) + delta).to_bits())
        });
    }

    pub fn get(&self, key: CounterKey) -> f64 {
        f64::from_bits(self.values[key.slot()].load(Ordering::Acquire))
    }

    /// Counter value by name, `0.0` for unknown keys
    pub fn value(&self, key: &str) -> f64 {
        CounterKey::parse(key).map_or(0.0, |key| self.get(key))
    }

    /// Serializable copy of every counter and the availability flag
    pub fn snapshot(&self) -> CounterSnapshot {
        CounterSnapshot {
            users: self.get(CounterKey::Users),
            vendors: self.get(CounterKey::Vendors),
            products: self.get(CounterKey::Products),
            orders: self.get(CounterKey::Orders),
            revenue: self.get(CounterKey::Revenue),
            db_available: self.is_db_available(),
        }
    }
}

impl Default for DegradedCounters {
    fn default() -> Self {
        Self::new()
    }
}

/// Point-in-time view of the counter store, for dashboards
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CounterSnapshot {
    pub users: f64,
    pub vendors: f64,
    pub products: f64,
    pub orders: f64,
    pub revenue: f64,
    pub db_available: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_new_store_is_zeroed_and_disabled() {
        let counters = DegradedCounters::new();
        for key in CounterKey::ALL {
            assert_eq!(counters.get(key), 0.0);
        }
        assert!(!counters.is_db_available());
    }

    #[test]
    fn test_update_progress_known_key() {
        let counters = DegradedCounters::new();
        counters.update_progress("orders", 3.0);
        counters.increment("orders");
        assert_eq!(counters.value("orders"), 4.0);
    }

    #[test]
    fn test_update_progress_unknown_key_is_noop() {
        let counters = DegradedCounters::new();
        counters.update_progress("widgets", 10.0);
        counters.increment("");
        assert_eq!(counters.value("widgets"), 0.0);
        assert_eq!(counters.snapshot(), CounterSnapshot::default());
    }

    #[test]
    fn test_non_finite_delta_ignored() {
        let counters = DegradedCounters::new();
        counters.update_progress("revenue", 10.0);
        counters.update_progress("revenue", f64::NAN);
        counters.update_progress("revenue", f64::INFINITY);
        assert_eq!(counters.get(CounterKey::Revenue), 10.0);
    }

    #[test]
    fn test_db_flag_toggles() {
        let counters = DegradedCounters::new();
        counters.enable_db();
        assert!(counters.is_db_available());
        counters.disable_db();
        assert!(!counters.is_db_available());
    }

    #[test]
    fn test_concurrent_increments() {
        let counters = Arc::new(DegradedCounters::new());
        std::thread::scope(|scope| {
            for _ in 0..8 {
                let counters = Arc::clone(&counters);
                scope.spawn(move || {
                    for _ in 0..1000 {
                        counters.increment("users");
                        counters.update_progress("revenue", 0.5);
                    }
                });
            }
        });
        assert_eq!(counters.get(CounterKey::Users), 8000.0);
        assert_eq!(counters.get(CounterKey::Revenue), 4000.0);
    }

    #[test]
    fn test_snapshot_serializes_camel_case() {
        let counters = DegradedCounters::new();
        counters.increment("vendors");
        counters.enable_db();
        let json = serde_json::to_value(counters.snapshot()).unwrap();
        assert_eq!(json["vendors"], 1.0);
        assert_eq!(json["dbAvailable"], true);
    }

    #[test]
    fn test_counter_key_round_trip_names() {
        for key in CounterKey::ALL {
            assert_eq!(CounterKey::parse(key.as_str()), Some(key));
            assert_eq!(key.to_string(), key.as_str());
        }
        assert_eq!(CounterKey::parse("Users"), None);
    }
}

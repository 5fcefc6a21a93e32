//! Directory of named connection pools.
//!
//! A flat map from string key to [`ConnectionPool`] behind one lock. The
//! directory never closes pools: whoever owns them closes them before
//! dropping the map.
//!
//! # Key Order
//!
//! [`ConnectionPoolMap::keys`] returns every key in the order it was
//! `set`, as an append-only log: setting a key twice lists it twice, and
//! deleting a key does not remove it from the log. Existing callers rely on
//! this, so it is kept as is.

// ============================================================================
// Imports
// ============================================================================

use parking_lot::Mutex;
use rustc_hash::FxHashMap;

use super::pool::ConnectionPool;

// ============================================================================
// ConnectionPoolMap
// ============================================================================

/// Thread-safe map of named pools.
#[derive(Debug, Default)]
pub struct ConnectionPoolMap {
    inner: Mutex<PoolMapInner>,
}

#[derive(Debug, Default)]
struct PoolMapInner {
    pools: FxHashMap<String, ConnectionPool>,
    keys: Vec<String>,
}

impl ConnectionPoolMap {
    /// Creates an empty directory.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `pool` under `key`, replacing any previous pool.
    pub fn set(&self, key: impl Into<String>, pool: ConnectionPool) {
        let key = key.into();
        let mut inner = self.inner.lock();
        inner.pools.insert(key.clone(), pool);
        inner.keys.push(key);
    }

    /// Returns the pool stored under `key`, if any.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<ConnectionPool> {
        self.inner.lock().pools.get(key).cloned()
    }

    /// Removes the pool stored under `key`. The pool is not closed.
    pub fn delete(&self, key: &str) {
        self.inner.lock().pools.remove(key);
    }

    /// Returns every key ever set, in insertion order.
    #[must_use]
    pub fn keys(&self) -> Vec<String> {
        self.inner.lock().keys.clone()
    }
}

// ============================================================================
// Tests
// ============================================================================

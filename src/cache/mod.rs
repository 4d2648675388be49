//! Compiled query cache.
//!
//! Compiled queries are memoized by raw query text. Entries hold
//! [`Value::Unresolved`](crate::compiler::Value::Unresolved) placeholders for
//! relative dates, never resolved values, so they stay valid as the clock
//! moves. The whole cache is cleared when metadata changes, because compiled
//! SQL embeds table and column names.
//!
//! # Design
//!
//! - Keyed by exact query text (no normalization)
//! - No TTL - entries live until invalidation or eviction
//! - Bounded caches drop every entry when full, then insert

use std::sync::Arc;

use dashmap::DashMap;
use tracing::trace;

use crate::compiler::CompiledQuery;

/// Storage for compiled queries.
pub trait QueryCache: Send + Sync {
    fn get(&self, text: &str) -> Option<Arc<CompiledQuery>>;

    fn put(&self, text: String, compiled: Arc<CompiledQuery>);

    /// Drop every entry.
    fn invalidate(&self);

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// In-memory cache backed by a concurrent hash map.
#[derive(Debug, Default)]
pub struct MemoryQueryCache {
    entries: DashMap<String, Arc<CompiledQuery>>,
    /// Maximum entries; `None` is unbounded.
    capacity: Option<usize>,
}

impl MemoryQueryCache {
    /// An unbounded cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// A cache holding at most `capacity` entries. Zero means unbounded.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: DashMap::with_capacity(capacity),
            capacity: (capacity > 0).then_some(capacity),
        }
    }

    pub fn capacity(&self) -> Option<usize> {
        self.capacity
    }
}

impl QueryCache for MemoryQueryCache {
    fn get(&self, text: &str) -> Option<Arc<CompiledQuery>> {
        self.entries.get(text).map(|entry| Arc::clone(entry.value()))
    }

    fn put(&self, text: String, compiled: Arc<CompiledQuery>) {
        if let Some(capacity) = self.capacity {
            if self.entries.len() >= capacity && !self.entries.contains_key(&text) {
                trace!(capacity, "query cache full, evicting all entries");
                self.entries.clear();
            }
        }
        self.entries.insert(text, compiled);
    }

    fn invalidate(&self) {
        self.entries.clear();
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}

impl<T: QueryCache + ?Sized> QueryCache for Arc<T> {
    fn get(&self, text: &str) -> Option<Arc<CompiledQuery>> {
        (**self).get(text)
    }

    fn put(&self, text: String, compiled: Arc<CompiledQuery>) {
        (**self).put(text, compiled)
    }

    fn invalidate(&self) {
        (**self).invalidate()
    }

    fn len(&self) -> usize {
        (**self).len()
    }
}

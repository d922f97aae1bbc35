//! String id cache
//!
//! Ids handed out by the engine's string table never change once assigned,
//! so a successful lookup can be reused by every thread without routing
//! through the main context again. Misses are not cached: the string may be
//! interned later by the engine, and the next lookup must see it.
//!
//! Uses DashMap so worker threads can hit the cache concurrently.

use dashmap::DashMap;
use tether_runtime::StrId;

#[derive(Debug)]
pub struct Resolver {
    cache: Option<DashMap<String, StrId>>,
}

impl Resolver {
    pub fn new(enabled: bool) -> Self {
        Self {
            cache: enabled.then(DashMap::new),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.cache.is_some()
    }

    pub fn cached(&self, s: &str) -> Option<StrId> {
        self.cache.as_ref()?.get(s).map(|entry| *entry.value())
    }

    /// Remember a lookup result. The NONE sentinel is never stored.
    pub fn remember(&self, s: &str, id: StrId) {
        if id.is_none() {
            return;
        }
        if let Some(cache) = &self.cache {
            cache.insert(s.to_string(), id);
        }
    }

    pub fn len(&self) -> usize {
        self.cache.as_ref().map_or(0, DashMap::len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

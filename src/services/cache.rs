use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, Utc};

use super::Clock;
use crate::container::{Component, ResolutionError, Resolver};

/// Key/value cache with absolute expiry, shared by everything that needs
/// short-lived state across requests.
pub trait DistributedCache: Send + Sync {
    fn get(&self, key: &str) -> Option<Vec<u8>>;
    fn set(&self, key: &str, value: Vec<u8>, expires_in: Duration);
    fn remove(&self, key: &str);
}

struct CacheEntry {
    value: Vec<u8>,
    expires_at: DateTime<Utc>,
}

/// Process-local implementation of [`DistributedCache`].
pub struct MemoryDistributedCache {
    clock: Arc<dyn Clock>,
    entries: Mutex<HashMap<String, CacheEntry>>,
}

impl MemoryDistributedCache {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            entries: Mutex::new(HashMap::new()),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, CacheEntry>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Component for MemoryDistributedCache {
    fn construct(resolver: &Resolver<'_>) -> Result<Self, ResolutionError> {
        Ok(Self::new(resolver.resolve()?))
    }
}

crate::provides!(MemoryDistributedCache => dyn DistributedCache);

impl DistributedCache for MemoryDistributedCache {
    fn get(&self, key: &str) -> Option<Vec<u8>> {
        let now = self.clock.now();
        let entries = self.lock();
        entries
            .get(key)
            .filter(|e| e.expires_at > now)
            .map(|e| e.value.clone())
    }

    fn set(&self, key: &str, value: Vec<u8>, expires_in: Duration) {
        let now = self.clock.now();
        let mut entries = self.lock();
        // Lazy cleanup
        entries.retain(|_, e| e.expires_at > now);
        entries.insert(
            key.to_string(),
            CacheEntry {
                value,
                expires_at: now + expires_in,
            },
        );
    }

    fn remove(&self, key: &str) {
        self.lock().remove(key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::FixedClock;

    #[test]
    fn entries_expire() {
        let now = Utc::now();
        let cache = MemoryDistributedCache::new(Arc::new(FixedClock(now)));
        cache.set("live", b"1".to_vec(), Duration::seconds(5));
        cache.set("dead", b"2".to_vec(), Duration::seconds(0));
        assert_eq!(cache.get("live"), Some(b"1".to_vec()));
        assert_eq!(cache.get("dead"), None);

        cache.remove("live");
        assert_eq!(cache.get("live"), None);
    }
}

//! Bounded caches for raw module text, wrapped source text, and compiled
//! artifacts, keyed by [`ModuleId`] / [`SourceKey`].
//!
//! Each cache is an LRU with a hard capacity cap plus an idle expiry;
//! invalidation is a linear scan over the (small, bounded) wrapped caches,
//! which is cheap enough not to matter for frame timing.

use std::num::NonZeroUsize;
use std::time::{Duration, Instant};

use lru::LruCache;

use crate::module::{ModuleId, SourceKey};

const DEFAULT_TEXT_CAPACITY: usize = 2_048;
const DEFAULT_WRAPPED_CAPACITY: usize = 512;
const DEFAULT_TEXT_IDLE_EXPIRY: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy)]
pub struct CacheConfig {
    pub text_capacity: usize,
    pub wrapped_capacity: usize,
    pub text_idle_expiry: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            text_capacity: DEFAULT_TEXT_CAPACITY,
            wrapped_capacity: DEFAULT_WRAPPED_CAPACITY,
            text_idle_expiry: DEFAULT_TEXT_IDLE_EXPIRY,
        }
    }
}

/// Point-in-time snapshot of a single cache's hit/miss/eviction counters.
/// Debug/tooling only; no core algorithm reads this back.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
}

struct TimedEntry<V> {
    value: V,
    inserted_at: Instant,
}

/// `moduleId -> raw text`, short idle expiry.
struct TextCache {
    entries: LruCache<ModuleId, TimedEntry<String>>,
    idle_expiry: Duration,
    stats: CacheStats,
}

impl TextCache {
    fn new(capacity: usize, idle_expiry: Duration) -> Self {
        Self {
            entries: LruCache::new(NonZeroUsize::new(capacity.max(1)).unwrap()),
            idle_expiry,
            stats: CacheStats::default(),
        }
    }

    fn get(&mut self, id: &ModuleId) -> Option<String> {
        let expired = match self.entries.peek(id) {
            Some(entry) => entry.inserted_at.elapsed() > self.idle_expiry,
            None => {
                self.stats.misses += 1;
                return None;
            }
        };
        if expired {
            self.entries.pop(id);
            self.stats.misses += 1;
            self.stats.evictions += 1;
            return None;
        }
        self.stats.hits += 1;
        self.entries.get(id).map(|e| e.value.clone())
    }

    fn put(&mut self, id: ModuleId, text: String) {
        if self.entries.put(
            id,
            TimedEntry {
                value: text,
                inserted_at: Instant::now(),
            },
        ).is_some() {
            self.stats.evictions += 1;
        }
    }

    fn invalidate(&mut self, id: &ModuleId) -> bool {
        self.entries.pop(id).is_some()
    }

    fn clear(&mut self) {
        self.entries.clear();
    }
}

/// `SourceKey -> V`, generic over the two wrapped-source caches (wrapped
/// code text, compiled artifact).
struct KeyedCache<V> {
    entries: LruCache<SourceKey, V>,
    stats: CacheStats,
}

impl<V: Clone> KeyedCache<V> {
    fn new(capacity: usize) -> Self {
        Self {
            entries: LruCache::new(NonZeroUsize::new(capacity.max(1)).unwrap()),
            stats: CacheStats::default(),
        }
    }

    fn get(&mut self, key: &SourceKey) -> Option<V> {
        match self.entries.get(key) {
            Some(v) => {
                self.stats.hits += 1;
                Some(v.clone())
            }
            None => {
                self.stats.misses += 1;
                None
            }
        }
    }

    fn put(&mut self, key: SourceKey, value: V) {
        if self.entries.put(key, value).is_some() {
            self.stats.evictions += 1;
        }
    }

    /// Remove every entry whose key's module id matches `id`. Acceptable
    /// linear scan given the bounded capacity of these caches.
    fn invalidate(&mut self, id: &ModuleId) -> usize {
        let stale: Vec<SourceKey> = self
            .entries
            .iter()
            .filter(|(key, _)| &key.module_id == id)
            .map(|(key, _)| key.clone())
            .collect();
        for key in &stale {
            self.entries.pop(key);
        }
        stale.len()
    }

    fn clear(&mut self) {
        self.entries.clear();
    }
}

/// Owns the three bounded caches: raw text, wrapped source, and compiled
/// artifacts. `V` is the compiled-source artifact type, left generic so the
/// cache does not depend on the script engine backend.
pub struct ScriptCache<V> {
    module_text: TextCache,
    wrapped_code: KeyedCache<String>,
    wrapped_source: KeyedCache<V>,
}

impl<V: Clone> ScriptCache<V> {
    pub fn new(config: CacheConfig) -> Self {
        Self {
            module_text: TextCache::new(config.text_capacity, config.text_idle_expiry),
            wrapped_code: KeyedCache::new(config.wrapped_capacity),
            wrapped_source: KeyedCache::new(config.wrapped_capacity),
        }
    }

    pub fn get_text(&mut self, id: &ModuleId) -> Option<String> {
        self.module_text.get(id)
    }

    pub fn put_text(&mut self, id: ModuleId, text: String) {
        self.module_text.put(id, text);
    }

    pub fn get_wrapped_code(&mut self, key: &SourceKey) -> Option<String> {
        self.wrapped_code.get(key)
    }

    pub fn put_wrapped_code(&mut self, key: SourceKey, code: String) {
        self.wrapped_code.put(key, code);
    }

    pub fn get_compiled(&mut self, key: &SourceKey) -> Option<V> {
        self.wrapped_source.get(key)
    }

    pub fn put_compiled(&mut self, key: SourceKey, compiled: V) {
        self.wrapped_source.put(key, compiled);
    }

    /// Scan the wrapped caches for any entry keyed to `id` and drop it, plus
    /// the raw text for `id`. Cheap given bounded capacity; must never block
    /// frame update.
    pub fn invalidate(&mut self, id: &ModuleId) {
        self.module_text.invalidate(id);
        self.wrapped_code.invalidate(id);
        self.wrapped_source.invalidate(id);
    }

    pub fn invalidate_all(&mut self) {
        self.module_text.clear();
        self.wrapped_code.clear();
        self.wrapped_source.clear();
    }

    pub fn text_stats(&self) -> CacheStats {
        self.module_text.stats
    }

    pub fn wrapped_code_stats(&self) -> CacheStats {
        self.wrapped_code.stats
    }

    pub fn compiled_stats(&self) -> CacheStats {
        self.wrapped_source.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_cache_hits_and_misses_count() {
        let mut cache: ScriptCache<String> = ScriptCache::new(CacheConfig::default());
        let id = ModuleId::new("a.js");
        assert!(cache.get_text(&id).is_none());
        cache.put_text(id.clone(), "body".to_string());
        assert_eq!(cache.get_text(&id).as_deref(), Some("body"));
        let stats = cache.text_stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
    }

    #[test]
    fn invalidate_removes_from_all_three_caches() {
        let mut cache: ScriptCache<String> = ScriptCache::new(CacheConfig::default());
        let id = ModuleId::new("a.js");
        let key = SourceKey::new(id.clone(), "body");
        cache.put_text(id.clone(), "body".to_string());
        cache.put_wrapped_code(key.clone(), "wrapped".to_string());
        cache.put_compiled(key.clone(), "compiled".to_string());

        cache.invalidate(&id);

        assert!(cache.get_text(&id).is_none());
        assert!(cache.get_wrapped_code(&key).is_none());
        assert!(cache.get_compiled(&key).is_none());
    }

    #[test]
    fn invalidate_all_clears_everything() {
        let mut cache: ScriptCache<String> = ScriptCache::new(CacheConfig::default());
        let id = ModuleId::new("a.js");
        cache.put_text(id.clone(), "body".to_string());
        cache.invalidate_all();
        assert!(cache.get_text(&id).is_none());
    }

    #[test]
    fn idle_expiry_evicts_stale_text() {
        let mut cache: ScriptCache<String> = ScriptCache::new(CacheConfig {
            text_idle_expiry: Duration::from_millis(0),
            ..CacheConfig::default()
        });
        let id = ModuleId::new("a.js");
        cache.put_text(id.clone(), "body".to_string());
        std::thread::sleep(Duration::from_millis(2));
        assert!(cache.get_text(&id).is_none());
    }

    #[test]
    fn capacity_is_enforced_lru() {
        let mut cache: ScriptCache<String> = ScriptCache::new(CacheConfig {
            text_capacity: 1,
            ..CacheConfig::default()
        });
        let a = ModuleId::new("a.js");
        let b = ModuleId::new("b.js");
        cache.put_text(a.clone(), "a".to_string());
        cache.put_text(b.clone(), "b".to_string());
        assert!(cache.get_text(&a).is_none());
        assert_eq!(cache.get_text(&b).as_deref(), Some("b"));
    }
}

use std::collections::HashMap;
use std::hash::Hash;

use serde::Serialize;

use crate::error::{AnalyticsError, Result};
use crate::telemetry::{self, SharedTelemetry, TelemetryEvent};

const HEAD: usize = 0;
const TAIL: usize = 1;

#[derive(Debug)]
struct Slot<K, V> {
    prev: usize,
    next: usize,
    item: Option<(K, V)>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CacheStats {
    pub size: usize,
    pub capacity: usize,
    pub hits: u64,
    pub misses: u64,
    pub hit_rate: f64,
}

/// Supplies entries related to a key, for speculative cache fills.
pub trait PrefetchSource<K, V> {
    fn related(&self, key: &K) -> Result<Vec<(K, V)>>;
}

pub struct RecencyCache<K, V> {
    slots: Vec<Slot<K, V>>,
    free: Vec<usize>,
    map: HashMap<K, usize>,
    capacity: usize,
    hits: u64,
    misses: u64,
    telemetry: SharedTelemetry,
}

impl<K, V> RecencyCache<K, V>
where
    K: Eq + Hash + Clone,
{
    pub fn new(capacity: usize) -> Result<Self> {
        Self::with_telemetry(capacity, telemetry::noop())
    }

    pub fn with_telemetry(capacity: usize, telemetry: SharedTelemetry) -> Result<Self> {
        if capacity == 0 {
            return Err(AnalyticsError::validation("cache capacity must be at least 1"));
        }
        let mut slots = Vec::with_capacity(capacity + 2);
        slots.push(Slot {
            prev: HEAD,
            next: TAIL,
            item: None,
        });
        slots.push(Slot {
            prev: HEAD,
            next: TAIL,
            item: None,
        });
        Ok(Self {
            slots,
            free: Vec::new(),
            map: HashMap::with_capacity(capacity),
            capacity,
            hits: 0,
            misses: 0,
            telemetry,
        })
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn contains(&self, key: &K) -> bool {
        self.map.contains_key(key)
    }

    /// Returns the value and marks it most recently used.
    pub fn get(&mut self, key: &K) -> Option<&V> {
        let Some(&idx) = self.map.get(key) else {
            self.misses += 1;
            return None;
        };
        self.hits += 1;
        self.assert_slot_holds(idx, key);
        self.detach(idx);
        self.attach_after(HEAD, idx);
        self.slots[idx].item.as_ref().map(|(_, v)| v)
    }

    pub fn peek(&self, key: &K) -> Option<&V> {
        let idx = *self.map.get(key)?;
        self.slots[idx].item.as_ref().map(|(_, v)| v)
    }

    pub fn put(&mut self, key: K, value: V) {
        if let Some(&idx) = self.map.get(&key) {
            self.assert_slot_holds(idx, &key);
            self.slots[idx].item = Some((key, value));
            self.detach(idx);
            self.attach_after(HEAD, idx);
            return;
        }

        if self.map.len() == self.capacity {
            self.evict_lru();
        }
        let idx = self.allocate(key.clone(), value);
        self.attach_after(HEAD, idx);
        self.map.insert(key, idx);
        debug_assert!(self.map.len() <= self.capacity);
    }

    pub fn remove(&mut self, key: &K) -> Option<V> {
        let idx = self.map.remove(key)?;
        self.detach(idx);
        self.free.push(idx);
        self.slots[idx].item.take().map(|(_, v)| v)
    }

    pub fn clear(&mut self) {
        self.slots.truncate(2);
        self.slots[HEAD].next = TAIL;
        self.slots[TAIL].prev = HEAD;
        self.free.clear();
        self.map.clear();
    }

    pub fn keys_mru(&self) -> Vec<&K> {
        let mut keys = Vec::with_capacity(self.map.len());
        let mut current = self.slots[HEAD].next;
        while current != TAIL {
            if let Some((k, _)) = self.slots[current].item.as_ref() {
                keys.push(k);
            }
            current = self.slots[current].next;
        }
        assert_eq!(keys.len(), self.map.len(), "cache list and key map disagree");
        keys
    }

    pub fn stats(&self) -> CacheStats {
        let accesses = self.hits + self.misses;
        CacheStats {
            size: self.map.len(),
            capacity: self.capacity,
            hits: self.hits,
            misses: self.misses,
            hit_rate: if accesses == 0 {
                0.0
            } else {
                self.hits as f64 / accesses as f64
            },
        }
    }

    /// Best-effort fill of entries related to `key`. Only free capacity is
    /// used and new entries go to the cold end, so nothing already cached is
    /// displaced. Source failures are reported to telemetry and dropped.
    pub fn prefetch(&mut self, key: &K, source: &dyn PrefetchSource<K, V>) {
        let related = match source.related(key) {
            Ok(related) => related,
            Err(e) => {
                let reason = e.to_string();
                self.telemetry
                    .record(&TelemetryEvent::PrefetchSkipped { reason: &reason });
                return;
            }
        };

        for (k, v) in related {
            if self.map.len() == self.capacity {
                break;
            }
            if self.map.contains_key(&k) {
                continue;
            }
            let idx = self.allocate(k.clone(), v);
            let coldest = self.slots[TAIL].prev;
            self.attach_after(coldest, idx);
            self.map.insert(k, idx);
        }
    }

    fn evict_lru(&mut self) {
        let lru = self.slots[TAIL].prev;
        assert_ne!(lru, HEAD, "evicting from an empty cache");
        self.detach(lru);
        if let Some((k, _)) = self.slots[lru].item.take() {
            self.map.remove(&k);
        }
        self.free.push(lru);
        self.telemetry.record(&TelemetryEvent::CacheEviction {
            size: self.map.len(),
            capacity: self.capacity,
        });
    }

    fn allocate(&mut self, key: K, value: V) -> usize {
        let slot = Slot {
            prev: HEAD,
            next: TAIL,
            item: Some((key, value)),
        };
        match self.free.pop() {
            Some(idx) => {
                self.slots[idx] = slot;
                idx
            }
            None => {
                self.slots.push(slot);
                self.slots.len() - 1
            }
        }
    }

    fn detach(&mut self, idx: usize) {
        let (prev, next) = (self.slots[idx].prev, self.slots[idx].next);
        assert!(
            self.slots[prev].next == idx && self.slots[next].prev == idx,
            "cache slot {idx} is not linked"
        );
        self.slots[prev].next = next;
        self.slots[next].prev = prev;
    }

    fn attach_after(&mut self, anchor: usize, idx: usize) {
        let next = self.slots[anchor].next;
        self.slots[idx].prev = anchor;
        self.slots[idx].next = next;
        self.slots[anchor].next = idx;
        self.slots[next].prev = idx;
    }

    fn assert_slot_holds(&self, idx: usize, key: &K) {
        assert!(
            matches!(&self.slots[idx].item, Some((k, _)) if k == key),
            "cache key map points at slot {idx} holding a different key"
        );
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::telemetry::testing::RecordingTelemetry;

    #[test]
    fn refreshed_entry_survives_eviction() {
        let mut cache = RecencyCache::new(2).unwrap();
        cache.put("A", 1);
        cache.put("B", 2);
        assert_eq!(cache.get(&"A"), Some(&1));
        cache.put("C", 3);

        assert!(!cache.contains(&"B"));
        assert_eq!(cache.keys_mru(), vec![&"C", &"A"]);
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn zero_capacity_is_rejected() {
        assert!(matches!(
            RecencyCache::<String, u32>::new(0),
            Err(AnalyticsError::Validation(_))
        ));
    }

    #[test]
    fn put_updates_existing_value_and_promotes() {
        let mut cache = RecencyCache::new(2).unwrap();
        cache.put("A", 1);
        cache.put("B", 2);
        cache.put("A", 10);
        cache.put("C", 3);
        assert_eq!(cache.peek(&"A"), Some(&10));
        assert!(cache.peek(&"B").is_none());
    }

    #[test]
    fn stats_track_hits_and_misses() {
        let mut cache = RecencyCache::new(3).unwrap();
        assert_eq!(cache.stats().hit_rate, 0.0);

        cache.put(1, "one");
        cache.get(&1);
        cache.get(&1);
        cache.get(&2);
        let stats = cache.stats();
        assert_eq!(stats.hits, 2);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.size, 1);
        assert_eq!(stats.capacity, 3);
        assert!((stats.hit_rate - 2.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn remove_and_clear_reuse_slots() {
        let mut cache = RecencyCache::new(2).unwrap();
        cache.put("A", 1);
        cache.put("B", 2);
        assert_eq!(cache.remove(&"A"), Some(1));
        assert_eq!(cache.remove(&"A"), None);
        cache.put("C", 3);
        assert_eq!(cache.keys_mru(), vec![&"C", &"B"]);

        cache.clear();
        assert!(cache.is_empty());
        cache.put("D", 4);
        assert_eq!(cache.keys_mru(), vec![&"D"]);
    }

    #[test]
    fn eviction_is_reported() {
        let recorder = Arc::new(RecordingTelemetry::default());
        let mut cache = RecencyCache::with_telemetry(1, recorder.clone()).unwrap();
        cache.put("A", 1);
        cache.put("B", 2);
        let events = recorder.events.lock().unwrap();
        assert_eq!(events.as_slice(), ["cache_eviction"]);
    }

    struct Peers;

    impl PrefetchSource<&'static str, u32> for Peers {
        fn related(&self, key: &&'static str) -> Result<Vec<(&'static str, u32)>> {
            match *key {
                "A" => Ok(vec![("A", 0), ("B", 2), ("C", 3), ("D", 4)]),
                _ => Err(AnalyticsError::Source("peer lookup unavailable".to_string())),
            }
        }
    }

    #[test]
    fn prefetch_fills_cold_end_without_displacing() {
        let mut cache = RecencyCache::new(3).unwrap();
        cache.put("A", 1);
        cache.prefetch(&"A", &Peers);

        assert_eq!(cache.keys_mru(), vec![&"A", &"B", &"C"]);
        assert_eq!(cache.peek(&"A"), Some(&1));
        assert_eq!(cache.stats().hits + cache.stats().misses, 0);
    }

    #[test]
    fn prefetch_failure_is_swallowed() {
        let recorder = Arc::new(RecordingTelemetry::default());
        let mut cache = RecencyCache::with_telemetry(2, recorder.clone()).unwrap();
        cache.put("Z", 9);
        cache.prefetch(&"Z", &Peers);

        assert_eq!(cache.get(&"Z"), Some(&9));
        let events = recorder.events.lock().unwrap();
        assert_eq!(events.as_slice(), ["prefetch_skipped"]);
    }
}

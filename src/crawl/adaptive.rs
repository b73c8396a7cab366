use std::hash::Hash;

use lru::LruCache;

use crate::error::AppError;

/// Adaptive replacement cache.
///
/// Resident entries live in `t1` (seen once recently) or `t2` (seen at least
/// twice). Keys evicted from either list are remembered in the ghost lists
/// `b1`/`b2`; a later miss that hits a ghost list shifts the target size `p`
/// of `t1` towards whichever list would have kept the entry. A burst of
/// one-off keys therefore only churns `t1` and leaves frequently used
/// entries in `t2` alone.
pub struct AdaptiveCache<K: Hash + Eq, V> {
    capacity: usize,
    p: usize,
    t1: LruCache<K, V>,
    t2: LruCache<K, V>,
    b1: LruCache<K, ()>,
    b2: LruCache<K, ()>,
}

impl<K, V> AdaptiveCache<K, V>
where
    K: Hash + Eq + Clone,
    V: Clone,
{
    pub fn new(capacity: usize) -> Result<Self, AppError> {
        if capacity == 0 {
            return Err(AppError::ConfigError(
                "cache capacity must be greater than zero".to_string(),
            ));
        }

        Ok(AdaptiveCache {
            capacity,
            p: 0,
            t1: LruCache::unbounded(),
            t2: LruCache::unbounded(),
            b1: LruCache::unbounded(),
            b2: LruCache::unbounded(),
        })
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of resident entries
    pub fn len(&self) -> usize {
        self.t1.len() + self.t2.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, key: &K) -> bool {
        self.t1.contains(key) || self.t2.contains(key)
    }

    /// Look up a key, promoting it to the frequent list on a hit
    pub fn get(&mut self, key: &K) -> Option<V> {
        if let Some(value) = self.t1.pop(key) {
            self.t2.put(key.clone(), value.clone());
            return Some(value);
        }

        self.t2.get(key).cloned()
    }

    pub fn put(&mut self, key: K, value: V) {
        // resident: refresh and count as a repeated access
        if self.t1.pop(&key).is_some() || self.t2.contains(&key) {
            self.t2.put(key, value);
            return;
        }

        // recently evicted from t1: t1 was too small
        if self.b1.contains(&key) {
            let delta = std::cmp::max(self.b2.len() / self.b1.len(), 1);
            self.p = std::cmp::min(self.capacity, self.p + delta);
            self.replace(false);
            self.b1.pop(&key);
            self.t2.put(key, value);
            return;
        }

        // recently evicted from t2: t2 was too small
        if self.b2.contains(&key) {
            let delta = std::cmp::max(self.b1.len() / self.b2.len(), 1);
            self.p = self.p.saturating_sub(delta);
            self.replace(true);
            self.b2.pop(&key);
            self.t2.put(key, value);
            return;
        }

        // brand new key
        let l1 = self.t1.len() + self.b1.len();
        let total = l1 + self.t2.len() + self.b2.len();
        if l1 >= self.capacity {
            if self.t1.len() < self.capacity {
                self.b1.pop_lru();
                self.replace(false);
            } else {
                self.t1.pop_lru();
            }
        } else if total >= self.capacity {
            if total >= 2 * self.capacity {
                self.b2.pop_lru();
            }
            self.replace(false);
        }

        self.t1.put(key, value);
    }

    /// Evict one resident entry into the matching ghost list. Only acts when
    /// the resident lists are full.
    fn replace(&mut self, hit_in_b2: bool) {
        if self.len() < self.capacity {
            return;
        }

        let t1_len = self.t1.len();
        if t1_len > 0 && (t1_len > self.p || (hit_in_b2 && t1_len == self.p)) {
            if let Some((key, _)) = self.t1.pop_lru() {
                self.b1.put(key, ());
            }
        } else if let Some((key, _)) = self.t2.pop_lru() {
            self.b2.put(key, ());
        } else if let Some((key, _)) = self.t1.pop_lru() {
            self.b1.put(key, ());
        }
    }
}

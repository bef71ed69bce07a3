use std::borrow::Borrow;
use std::collections::HashMap;
use std::convert::Infallible;
use std::hash::Hash;

use crate::common::{Result, SdbError};

const NIL: usize = usize::MAX;

/// Hook invoked on the least-recently-used entry right before `put` evicts it.
///
/// Returning an error aborts the `put`: the victim stays cached, the new entry
/// is not inserted, and the error is handed back to the caller.
pub trait EvictionListener<K, V> {
    type Error;

    fn on_evict(&mut self, key: &K, value: &V) -> std::result::Result<(), Self::Error>;
}

/// Listener for caches that need no eviction side effects.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoEviction;

impl<K, V> EvictionListener<K, V> for NoEviction {
    type Error = Infallible;

    fn on_evict(&mut self, _key: &K, _value: &V) -> std::result::Result<(), Infallible> {
        Ok(())
    }
}

struct Entry<K, V> {
    key: K,
    value: V,
    /// Neighbour towards the most recently used end
    prev: usize,
    /// Neighbour towards the least recently used end
    next: usize,
}

/// Fixed-capacity cache with strict least-recently-used eviction.
///
/// Entries live in a slab and are threaded on an intrusive doubly linked list
/// ordered by recency (head = most recent); a hash map gives direct slab
/// indexes, so every operation is O(1).
pub struct LruCache<K, V, L = NoEviction> {
    map: HashMap<K, usize>,
    entries: Vec<Option<Entry<K, V>>>,
    free_slots: Vec<usize>,
    head: usize,
    tail: usize,
    capacity: usize,
    listener: L,
}

impl<K: Hash + Eq + Clone, V> LruCache<K, V, NoEviction> {
    /// Creates a cache holding at most `capacity` entries. Capacity must be at least 1.
    pub fn new(capacity: usize) -> Result<Self> {
        Self::with_listener(capacity, NoEviction)
    }
}

impl<K: Hash + Eq + Clone, V, L: EvictionListener<K, V>> LruCache<K, V, L> {
    /// Creates a cache that calls `listener` on every eviction.
    pub fn with_listener(capacity: usize, listener: L) -> Result<Self> {
        if capacity == 0 {
            return Err(SdbError::InvalidCapacity(capacity));
        }
        Ok(Self {
            map: HashMap::with_capacity(capacity),
            entries: Vec::with_capacity(capacity),
            free_slots: Vec::new(),
            head: NIL,
            tail: NIL,
            capacity,
            listener,
        })
    }

    /// Returns the value for `key` and marks it most recently used.
    pub fn get<Q>(&mut self, key: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let idx = *self.map.get(key)?;
        self.touch(idx);
        self.entries[idx].as_ref().map(|e| &e.value)
    }

    /// Like [`LruCache::get`], but returns a mutable reference.
    pub fn get_mut<Q>(&mut self, key: &Q) -> Option<&mut V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let idx = *self.map.get(key)?;
        self.touch(idx);
        self.entries[idx].as_mut().map(|e| &mut e.value)
    }

    /// Returns the value for `key` without changing its recency.
    pub fn peek<Q>(&self, key: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let idx = *self.map.get(key)?;
        self.entries[idx].as_ref().map(|e| &e.value)
    }

    /// Mutable access without changing recency.
    pub fn peek_mut<Q>(&mut self, key: &Q) -> Option<&mut V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let idx = *self.map.get(key)?;
        self.entries[idx].as_mut().map(|e| &mut e.value)
    }

    pub fn contains<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.map.contains_key(key)
    }

    /// Inserts or updates `key`, making it the most recently used entry.
    ///
    /// If the key is new and the cache is full, the least recently used entry is
    /// passed to the listener, removed, and returned. If the listener fails,
    /// nothing changes and `value` is dropped.
    pub fn put(&mut self, key: K, value: V) -> std::result::Result<Option<(K, V)>, L::Error> {
        if let Some(&idx) = self.map.get(&key) {
            if let Some(entry) = self.entries[idx].as_mut() {
                entry.value = value;
            }
            self.touch(idx);
            return Ok(None);
        }

        let mut evicted = None;
        if self.map.len() >= self.capacity {
            let victim = self.tail;
            if let Some(entry) = self.entries[victim].as_ref() {
                self.listener.on_evict(&entry.key, &entry.value)?;
            }
            if let Some(entry) = self.take_slot(victim) {
                self.map.remove(&entry.key);
                evicted = Some((entry.key, entry.value));
            }
        }

        let idx = self.alloc_slot(Entry {
            key: key.clone(),
            value,
            prev: NIL,
            next: NIL,
        });
        self.attach_front(idx);
        self.map.insert(key, idx);

        Ok(evicted)
    }

    /// Removes `key` without notifying the listener.
    pub fn remove<Q>(&mut self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let idx = self.map.remove(key)?;
        self.take_slot(idx).map(|e| e.value)
    }

    /// Removes and returns the least recently used entry without notifying the listener.
    pub fn pop_lru(&mut self) -> Option<(K, V)> {
        if self.tail == NIL {
            return None;
        }
        let entry = self.take_slot(self.tail)?;
        self.map.remove(&entry.key);
        Some((entry.key, entry.value))
    }

    /// Key of the entry the next eviction would pick.
    pub fn peek_lru(&self) -> Option<&K> {
        self.entries.get(self.tail)?.as_ref().map(|e| &e.key)
    }

    /// Entries from most to least recently used.
    pub fn iter(&self) -> Iter<'_, K, V> {
        Iter {
            entries: &self.entries,
            cursor: self.head,
        }
    }

    /// Mutable access to every entry, in no particular order. Recency is unchanged.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&K, &mut V)> {
        self.entries
            .iter_mut()
            .flatten()
            .map(|e| (&e.key, &mut e.value))
    }

    /// Removes every entry without notifying the listener.
    pub fn drain(&mut self) -> Vec<(K, V)> {
        let mut out = Vec::with_capacity(self.map.len());
        while let Some(entry) = self.pop_lru() {
            out.push(entry);
        }
        out
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

    pub fn listener(&self) -> &L {
        &self.listener
    }

    fn touch(&mut self, idx: usize) {
        if self.head != idx {
            self.detach(idx);
            self.attach_front(idx);
        }
    }

    fn detach(&mut self, idx: usize) {
        let (prev, next) = match self.entries[idx].as_ref() {
            Some(e) => (e.prev, e.next),
            None => return,
        };
        match self.entries.get_mut(prev).and_then(Option::as_mut) {
            Some(p) => p.next = next,
            None => self.head = next,
        }
        match self.entries.get_mut(next).and_then(Option::as_mut) {
            Some(n) => n.prev = prev,
            None => self.tail = prev,
        }
    }

    fn attach_front(&mut self, idx: usize) {
        let old_head = self.head;
        if let Some(e) = self.entries[idx].as_mut() {
            e.prev = NIL;
            e.next = old_head;
        }
        match self.entries.get_mut(old_head).and_then(Option::as_mut) {
            Some(h) => h.prev = idx,
            None => self.tail = idx,
        }
        self.head = idx;
    }

    fn alloc_slot(&mut self, entry: Entry<K, V>) -> usize {
        match self.free_slots.pop() {
            Some(idx) => {
                self.entries[idx] = Some(entry);
                idx
            }
            None => {
                self.entries.push(Some(entry));
                self.entries.len() - 1
            }
        }
    }

    fn take_slot(&mut self, idx: usize) -> Option<Entry<K, V>> {
        self.detach(idx);
        let entry = self.entries.get_mut(idx)?.take();
        if entry.is_some() {
            self.free_slots.push(idx);
        }
        entry
    }
}

/// Iterator over cache entries from most to least recently used.
pub struct Iter<'a, K, V> {
    entries: &'a [Option<Entry<K, V>>],
    cursor: usize,
}

impl<'a, K, V> Iterator for Iter<'a, K, V> {
    type Item = (&'a K, &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        let entry = self.entries.get(self.cursor)?.as_ref()?;
        self.cursor = entry.next;
        Some((&entry.key, &entry.value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys<L: EvictionListener<&'static str, i32>>(
        cache: &LruCache<&'static str, i32, L>,
    ) -> Vec<&'static str> {
        cache.iter().map(|(k, _)| *k).collect()
    }

    #[test]
    fn test_zero_capacity_rejected() {
        let err = LruCache::<u32, u32>::new(0).err().unwrap();
        assert!(matches!(err, SdbError::InvalidCapacity(0)));
        assert!(LruCache::<u32, u32>::new(1).is_ok());
    }

    #[test]
    fn test_get_promotes() {
        let mut cache = LruCache::new(2).unwrap();
        cache.put("a", 1).unwrap();
        cache.put("b", 2).unwrap();
        assert_eq!(cache.get("a"), Some(&1));

        let evicted = cache.put("c", 3).unwrap();
        assert_eq!(evicted, Some(("b", 2)));
        assert_eq!(keys(&cache), vec!["c", "a"]);
    }

    #[test]
    fn test_update_existing_key_does_not_evict() {
        let mut cache = LruCache::new(2).unwrap();
        cache.put("a", 1).unwrap();
        cache.put("b", 2).unwrap();
        assert_eq!(cache.put("a", 10).unwrap(), None);
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.peek("a"), Some(&10));
        assert_eq!(cache.peek_lru(), Some(&"b"));
    }

    #[test]
    fn test_peek_does_not_promote() {
        let mut cache = LruCache::new(2).unwrap();
        cache.put("a", 1).unwrap();
        cache.put("b", 2).unwrap();
        assert_eq!(cache.peek("a"), Some(&1));
        assert_eq!(cache.put("c", 3).unwrap(), Some(("a", 1)));
    }

    #[test]
    fn test_remove_and_reuse_slots() {
        let mut cache = LruCache::new(3).unwrap();
        cache.put("a", 1).unwrap();
        cache.put("b", 2).unwrap();
        cache.put("c", 3).unwrap();

        assert_eq!(cache.remove("b"), Some(2));
        assert_eq!(cache.remove("b"), None);
        assert_eq!(keys(&cache), vec!["c", "a"]);

        cache.put("d", 4).unwrap();
        assert_eq!(keys(&cache), vec!["d", "c", "a"]);
        assert_eq!(cache.entries.len(), 3);
        assert_eq!(cache.pop_lru(), Some(("a", 1)));
        assert_eq!(cache.drain(), vec![("c", 3), ("d", 4)]);
        assert!(cache.is_empty());
        assert_eq!(cache.peek_lru(), None);
    }

    struct Refuse;

    impl EvictionListener<&'static str, i32> for Refuse {
        type Error = &'static str;

        fn on_evict(&mut self, _key: &&'static str, _value: &i32) -> std::result::Result<(), &'static str> {
            Err("refused")
        }
    }

    #[test]
    fn test_failed_listener_keeps_victim() {
        let mut cache = LruCache::with_listener(1, Refuse).unwrap();
        cache.put("a", 1).unwrap();
        assert_eq!(cache.put("b", 2), Err("refused"));
        assert_eq!(keys(&cache), vec!["a"]);
        assert!(!cache.contains("b"));
    }
}

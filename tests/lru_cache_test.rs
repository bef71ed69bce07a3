//! Integration tests for the LRU cache

use std::collections::VecDeque;

use rand::{thread_rng, Rng};

use sdb::buffer::{EvictionListener, LruCache};
use sdb::common::{ErrorKind, SdbError};

/// Records every eviction it is told about.
#[derive(Default)]
struct Recorder {
    evicted: Vec<(char, u32)>,
}

impl EvictionListener<char, u32> for Recorder {
    type Error = SdbError;

    fn on_evict(&mut self, key: &char, value: &u32) -> Result<(), SdbError> {
        self.evicted.push((*key, *value));
        Ok(())
    }
}

#[test]
fn test_lru_get_promotes_before_eviction() {
    let mut cache = LruCache::new(2).unwrap();

    assert_eq!(cache.put('A', 1).unwrap(), None);
    assert_eq!(cache.put('B', 2).unwrap(), None);
    assert_eq!(cache.get(&'A'), Some(&1));
    assert_eq!(cache.put('C', 3).unwrap(), Some(('B', 2)));

    assert_eq!(cache.len(), 2);
    assert_eq!(cache.get(&'A'), Some(&1));
    assert_eq!(cache.get(&'C'), Some(&3));
    assert_eq!(cache.get(&'B'), None);
}

#[test]
fn test_lru_eviction_order_without_access() {
    let mut cache = LruCache::new(3).unwrap();
    for i in 0..3 {
        cache.put(i, i * 10).unwrap();
    }

    for i in 3..10 {
        assert_eq!(cache.put(i, i * 10).unwrap(), Some((i - 3, (i - 3) * 10)));
    }
    assert_eq!(cache.capacity(), 3);
    assert_eq!(cache.len(), 3);
}

#[test]
fn test_lru_listener_sees_victims() {
    let mut cache = LruCache::with_listener(2, Recorder::default()).unwrap();
    cache.put('A', 1).unwrap();
    cache.put('B', 2).unwrap();
    cache.put('A', 10).unwrap(); // update, no eviction
    cache.put('C', 3).unwrap();
    cache.put('D', 4).unwrap();

    assert_eq!(cache.listener().evicted, vec![('B', 2), ('A', 10)]);

    // remove and drain bypass the listener
    cache.remove(&'C');
    cache.drain();
    assert_eq!(cache.listener().evicted.len(), 2);
    assert!(cache.is_empty());
}

#[test]
fn test_lru_zero_capacity() {
    let err = LruCache::<u32, u32>::new(0).err().unwrap();
    assert_eq!(err.kind(), ErrorKind::Capacity);
}

#[test]
fn test_lru_iter_reports_recency() {
    let mut cache = LruCache::new(4).unwrap();
    for c in ['a', 'b', 'c', 'd'] {
        cache.put(c, ()).unwrap();
    }
    cache.get(&'b');
    cache.peek(&'a');

    let order: Vec<char> = cache.iter().map(|(k, _)| *k).collect();
    assert_eq!(order, vec!['b', 'd', 'c', 'a']);
    assert_eq!(cache.peek_lru(), Some(&'a'));
}

#[test]
fn test_lru_matches_reference_model() {
    let mut rng = thread_rng();
    let capacity = 8;
    let mut cache = LruCache::new(capacity).unwrap();
    // front = most recently used
    let mut model: VecDeque<(u32, u32)> = VecDeque::new();

    for step in 0..5000u32 {
        let key = rng.gen_range(0..20);
        if rng.gen_bool(0.5) {
            let expected = model.iter().position(|(k, _)| *k == key).map(|pos| {
                let entry = model.remove(pos).unwrap();
                model.push_front(entry);
                entry.1
            });
            assert_eq!(cache.get(&key).copied(), expected);
        } else {
            let evicted = match model.iter().position(|(k, _)| *k == key) {
                Some(pos) => {
                    model.remove(pos);
                    None
                }
                None if model.len() == capacity => model.pop_back(),
                None => None,
            };
            model.push_front((key, step));
            assert_eq!(cache.put(key, step).unwrap(), evicted);
        }
        assert_eq!(cache.len(), model.len());
    }

    let cached: Vec<(u32, u32)> = cache.iter().map(|(k, v)| (*k, *v)).collect();
    assert_eq!(cached, model.into_iter().collect::<Vec<_>>());
}

use bytes::{Buf, BufMut, BytesMut};
use log::trace;

use crate::common::{Locator, Result, SdbError, DEFAULT_BTREE_ORDER, MIN_BTREE_ORDER};
use crate::storage::disk::{Deserializer, Serializer};

use super::btree_iterator::BTreeIterator;
use super::btree_node::{check_tree, InternalNode, LeafNode, Node};

const INDEX_MAGIC: &[u8; 4] = b"SDBI";
const INDEX_FORMAT_VERSION: u16 = 1;
/// magic + version + key width + order + entry count
const INDEX_HEADER_SIZE: usize = 4 + 2 + 2 + 2 + 8;

/// In-memory B+tree mapping fixed-width byte keys to tuple locators.
///
/// Keys compare byte-lexicographically. Every node but the root holds between
/// `order / 2` and `order` keys, and all leaves sit at the same depth. The
/// whole tree is serialized at once; see [`Serializer`] for the file layout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BTreeIndex {
    root: Node,
    key_width: usize,
    order: usize,
    len: u64,
}

impl BTreeIndex {
    /// Creates an empty index with the default order.
    pub fn new(key_width: usize) -> Result<Self> {
        Self::with_order(key_width, DEFAULT_BTREE_ORDER)
    }

    /// Creates an empty index whose nodes hold at most `order` keys.
    pub fn with_order(key_width: usize, order: usize) -> Result<Self> {
        if order < MIN_BTREE_ORDER || order > u16::MAX as usize {
            return Err(SdbError::InvalidBTreeOrder {
                order,
                min: MIN_BTREE_ORDER,
            });
        }
        if key_width == 0 || key_width > u16::MAX as usize {
            return Err(SdbError::InvalidKeyLength {
                expected: 1,
                actual: key_width,
            });
        }
        Ok(Self {
            root: Node::Leaf(LeafNode::empty()),
            key_width,
            order,
            len: 0,
        })
    }

    pub fn key_width(&self) -> usize {
        self.key_width
    }

    pub fn order(&self) -> usize {
        self.order
    }

    /// Number of keys in the index
    pub fn len(&self) -> usize {
        self.len as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Inserts `key`, replacing and returning any locator already stored for it.
    pub fn insert(&mut self, key: &[u8], locator: Locator) -> Result<Option<Locator>> {
        self.check_key(key)?;

        let (previous, split) = self.root.insert(key, locator, self.order);
        if let Some((separator, right)) = split {
            let left = std::mem::replace(&mut self.root, Node::Leaf(LeafNode::empty()));
            self.root = Node::Internal(InternalNode {
                keys: vec![separator],
                children: vec![left, right],
            });
            trace!("index root split, {} keys", self.len + 1);
        }
        if previous.is_none() {
            self.len += 1;
        }
        Ok(previous)
    }

    /// Returns the locator stored for `key`. A missing key is `Ok(None)`.
    pub fn lookup(&self, key: &[u8]) -> Result<Option<Locator>> {
        self.check_key(key)?;
        Ok(self.root.lookup(key))
    }

    /// Removes `key`. Returns whether it was present.
    pub fn delete(&mut self, key: &[u8]) -> Result<bool> {
        Ok(self.remove(key)?.is_some())
    }

    /// Removes `key` and returns its locator.
    pub fn remove(&mut self, key: &[u8]) -> Result<Option<Locator>> {
        self.check_key(key)?;

        let removed = self.root.remove(key, self.order)?;
        if removed.is_some() {
            self.len -= 1;
        }

        // collapse a root left with a single child
        if let Node::Internal(internal) = &mut self.root {
            if internal.keys.is_empty() {
                if let Some(child) = internal.children.pop() {
                    self.root = child;
                    trace!("index root collapsed, {} keys", self.len);
                }
            }
        }
        Ok(removed)
    }

    /// Iterates all entries in ascending key order.
    pub fn iter(&self) -> BTreeIterator<'_> {
        BTreeIterator::seek(&self.root, None)
    }

    /// Returns the entries with `start <= key <= end`, in key order.
    pub fn range_scan(&self, start: &[u8], end: &[u8]) -> Result<Vec<(Vec<u8>, Locator)>> {
        self.check_key(start)?;
        self.check_key(end)?;

        Ok(BTreeIterator::seek(&self.root, Some(start))
            .take_while(|(key, _)| *key <= end)
            .map(|(key, locator)| (key.to_vec(), locator))
            .collect())
    }

    /// Checks key order, node fan-out, balance, and the entry count.
    pub fn validate(&self) -> Result<()> {
        let entries = check_tree(&self.root, self.key_width, self.order)?;
        if entries != self.len {
            return Err(SdbError::corrupt(format!(
                "index claims {} entries, tree holds {}",
                self.len, entries
            )));
        }
        Ok(())
    }

    /// Height of the tree, 1 for a lone leaf.
    pub fn height(&self) -> usize {
        let mut height = 1;
        let mut node = &self.root;
        while let Node::Internal(internal) = node {
            height += 1;
            node = &internal.children[0];
        }
        height
    }

    fn check_key(&self, key: &[u8]) -> Result<()> {
        if key.len() != self.key_width {
            return Err(SdbError::InvalidKeyLength {
                expected: self.key_width,
                actual: key.len(),
            });
        }
        Ok(())
    }
}

/// Index file layout, little-endian:
///
/// ```text
/// "SDBI" | version u16 | key_width u16 | order u16 | entries u64 | root node
/// ```
///
/// Nodes follow in pre-order, so decoding rebuilds the identical tree.
impl Serializer for BTreeIndex {
    fn serialize(&self) -> Result<Vec<u8>> {
        let mut buf = BytesMut::with_capacity(INDEX_HEADER_SIZE + self.len() * 16);
        buf.put_slice(INDEX_MAGIC);
        buf.put_u16_le(INDEX_FORMAT_VERSION);
        buf.put_u16_le(self.key_width as u16);
        buf.put_u16_le(self.order as u16);
        buf.put_u64_le(self.len);
        self.root.encode_into(&mut buf);
        Ok(buf.to_vec())
    }
}

impl Deserializer for BTreeIndex {
    fn deserialize(bytes: &[u8]) -> Result<Self> {
        let mut buf = bytes;
        if buf.remaining() < INDEX_HEADER_SIZE {
            return Err(SdbError::corrupt(format!(
                "index header needs {} bytes, got {}",
                INDEX_HEADER_SIZE,
                buf.remaining()
            )));
        }

        if &buf[..INDEX_MAGIC.len()] != INDEX_MAGIC {
            return Err(SdbError::corrupt("bad index magic"));
        }
        buf.advance(INDEX_MAGIC.len());

        let version = buf.get_u16_le();
        if version != INDEX_FORMAT_VERSION {
            return Err(SdbError::corrupt(format!(
                "unsupported index version {}",
                version
            )));
        }
        let key_width = buf.get_u16_le() as usize;
        let order = buf.get_u16_le() as usize;
        let len = buf.get_u64_le();

        let mut index = BTreeIndex::with_order(key_width, order)
            .map_err(|e| SdbError::corrupt(format!("bad index header: {}", e)))?;
        index.root = Node::decode_from(&mut buf, key_width, 0)?;
        index.len = len;

        if buf.has_remaining() {
            return Err(SdbError::corrupt(format!(
                "{} trailing bytes after index tree",
                buf.remaining()
            )));
        }
        index.validate()?;
        Ok(index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::PageId;

    fn key(n: u32) -> [u8; 4] {
        n.to_be_bytes()
    }

    fn loc(n: u32) -> Locator {
        Locator::new(PageId::new(n / 10), n % 10)
    }

    #[test]
    fn test_simple_insert_lookup() {
        let mut index = BTreeIndex::new(4).unwrap();
        assert!(index.is_empty());

        for n in [10, 20, 30] {
            assert_eq!(index.insert(&key(n), loc(n)).unwrap(), None);
        }

        assert_eq!(index.len(), 3);
        assert_eq!(index.lookup(&key(10)).unwrap(), Some(loc(10)));
        assert_eq!(index.lookup(&key(20)).unwrap(), Some(loc(20)));
        assert_eq!(index.lookup(&key(30)).unwrap(), Some(loc(30)));
        assert_eq!(index.lookup(&key(40)).unwrap(), None);
    }

    #[test]
    fn test_insert_replaces_existing() {
        let mut index = BTreeIndex::with_order(4, 3).unwrap();
        index.insert(&key(1), loc(1)).unwrap();
        assert_eq!(index.insert(&key(1), loc(2)).unwrap(), Some(loc(1)));
        assert_eq!(index.len(), 1);
        assert_eq!(index.lookup(&key(1)).unwrap(), Some(loc(2)));
    }

    #[test]
    fn test_wrong_key_width() {
        let mut index = BTreeIndex::new(4).unwrap();
        let err = index.insert(&[1, 2], loc(1)).unwrap_err();
        assert!(matches!(
            err,
            SdbError::InvalidKeyLength {
                expected: 4,
                actual: 2
            }
        ));
        assert!(index.lookup(&[0; 5]).is_err());
    }

    #[test]
    fn test_invalid_order() {
        let err = BTreeIndex::with_order(4, 2).unwrap_err();
        assert!(matches!(err, SdbError::InvalidBTreeOrder { order: 2, .. }));
    }

    #[test]
    fn test_splits_and_collapses() {
        let mut index = BTreeIndex::with_order(4, 3).unwrap();
        for n in 0..100 {
            index.insert(&key(n), loc(n)).unwrap();
        }
        assert!(index.height() > 2);
        index.validate().unwrap();

        for n in 0..100 {
            assert!(index.delete(&key(n)).unwrap());
            index.validate().unwrap();
        }
        assert!(index.is_empty());
        assert_eq!(index.height(), 1);
        assert!(!index.delete(&key(0)).unwrap());
    }

    #[test]
    fn test_iter_in_order() {
        let mut index = BTreeIndex::with_order(4, 4).unwrap();
        for n in [50, 10, 40, 20, 30, 70, 60] {
            index.insert(&key(n), loc(n)).unwrap();
        }
        let keys: Vec<Vec<u8>> = index.iter().map(|(k, _)| k.to_vec()).collect();
        let expected: Vec<Vec<u8>> = [10, 20, 30, 40, 50, 60, 70]
            .iter()
            .map(|n| key(*n).to_vec())
            .collect();
        assert_eq!(keys, expected);
    }

    #[test]
    fn test_range_scan_inclusive() {
        let mut index = BTreeIndex::with_order(4, 3).unwrap();
        for n in (0..50).map(|n| n * 2) {
            index.insert(&key(n), loc(n)).unwrap();
        }

        let found: Vec<Locator> = index
            .range_scan(&key(9), &key(20))
            .unwrap()
            .into_iter()
            .map(|(_, l)| l)
            .collect();
        assert_eq!(found, vec![loc(10), loc(12), loc(14), loc(16), loc(18), loc(20)]);

        assert!(index.range_scan(&key(30), &key(10)).unwrap().is_empty());
        assert!(index.range_scan(&key(200), &key(300)).unwrap().is_empty());
    }

    #[test]
    fn test_serialize_round_trip() {
        let mut index = BTreeIndex::with_order(4, 5).unwrap();
        for n in 0..60 {
            index.insert(&key(n * 7 % 61), loc(n)).unwrap();
        }
        let bytes = index.serialize().unwrap();
        assert_eq!(&bytes[..4], b"SDBI");

        let decoded = BTreeIndex::deserialize(&bytes).unwrap();
        assert_eq!(decoded, index);
        assert_eq!(decoded.serialize().unwrap(), bytes);
    }

    #[test]
    fn test_deserialize_rejects_bad_count() {
        let mut index = BTreeIndex::with_order(4, 3).unwrap();
        index.insert(&key(1), loc(1)).unwrap();
        let mut bytes = index.serialize().unwrap();
        // entry count lives right after magic, version, width, order
        bytes[10] = 9;
        assert!(BTreeIndex::deserialize(&bytes).unwrap_err().is_corrupt());
    }

    #[test]
    fn test_deserialize_rejects_trailing_bytes() {
        let index = BTreeIndex::new(4).unwrap();
        let mut bytes = index.serialize().unwrap();
        bytes.push(0);
        assert!(BTreeIndex::deserialize(&bytes).unwrap_err().is_corrupt());
    }
}

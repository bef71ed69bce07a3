use std::cmp::Ordering;

use bytes::{Buf, BufMut, BytesMut};

use crate::common::{Locator, PageId, Result, SdbError};

const LEAF_TAG: u8 = 0;
const INTERNAL_TAG: u8 = 1;

/// Deepest tree accepted when decoding. A tree of order 3 holding u64::MAX
/// keys is still far shallower than this.
const MAX_DECODE_DEPTH: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct LeafNode {
    pub(crate) keys: Vec<Vec<u8>>,
    pub(crate) values: Vec<Locator>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct InternalNode {
    /// keys[i] separates children[i] (keys < keys[i]) from children[i + 1]
    pub(crate) keys: Vec<Vec<u8>>,
    pub(crate) children: Vec<Node>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Node {
    Leaf(LeafNode),
    Internal(InternalNode),
}

/// Facts gathered while checking a subtree.
struct SubtreeInfo {
    entries: u64,
    leaf_depth: usize,
}

impl LeafNode {
    pub(crate) fn empty() -> Self {
        Self {
            keys: Vec::new(),
            values: Vec::new(),
        }
    }

    pub(crate) fn search(&self, key: &[u8]) -> std::result::Result<usize, usize> {
        self.keys.binary_search_by(|k| k.as_slice().cmp(key))
    }
}

impl InternalNode {
    /// Index of the child whose key range contains `key`.
    pub(crate) fn child_index(&self, key: &[u8]) -> usize {
        self.keys.partition_point(|k| k.as_slice() <= key)
    }

    /// Restores minimum occupancy of `children[i]` by merging it with a
    /// neighbour and splitting the result again if it no longer fits.
    fn fix_underflow(&mut self, i: usize, order: usize) -> Result<()> {
        if self.children.len() < 2 {
            return Err(SdbError::corrupt("internal node with a single child"));
        }
        let left = if i > 0 { i - 1 } else { i };

        let separator = self.keys.remove(left);
        let right = self.children.remove(left + 1);
        let merged = &mut self.children[left];
        merged.absorb(separator, right)?;

        if let Some((separator, right)) = merged.split_if_overfull(order) {
            self.keys.insert(left, separator);
            self.children.insert(left + 1, right);
        }
        Ok(())
    }
}

impl Node {
    pub(crate) fn num_keys(&self) -> usize {
        match self {
            Node::Leaf(leaf) => leaf.keys.len(),
            Node::Internal(internal) => internal.keys.len(),
        }
    }

    pub(crate) fn lookup(&self, key: &[u8]) -> Option<Locator> {
        let mut node = self;
        loop {
            match node {
                Node::Leaf(leaf) => return leaf.search(key).ok().map(|i| leaf.values[i]),
                Node::Internal(internal) => node = &internal.children[internal.child_index(key)],
            }
        }
    }

    /// Inserts or replaces `key`. Returns the replaced locator and, if this node
    /// overflowed, the separator and new right sibling the parent must adopt.
    pub(crate) fn insert(
        &mut self,
        key: &[u8],
        locator: Locator,
        order: usize,
    ) -> (Option<Locator>, Option<(Vec<u8>, Node)>) {
        let previous = match self {
            Node::Leaf(leaf) => match leaf.search(key) {
                Ok(i) => return (Some(std::mem::replace(&mut leaf.values[i], locator)), None),
                Err(i) => {
                    leaf.keys.insert(i, key.to_vec());
                    leaf.values.insert(i, locator);
                    None
                }
            },
            Node::Internal(internal) => {
                let i = internal.child_index(key);
                let (previous, split) = internal.children[i].insert(key, locator, order);
                match split {
                    Some((separator, right)) => {
                        internal.keys.insert(i, separator);
                        internal.children.insert(i + 1, right);
                    }
                    None => return (previous, None),
                }
                previous
            }
        };

        (previous, self.split_if_overfull(order))
    }

    /// Removes `key`, rebalancing children that drop below half full.
    pub(crate) fn remove(&mut self, key: &[u8], order: usize) -> Result<Option<Locator>> {
        match self {
            Node::Leaf(leaf) => Ok(leaf.search(key).ok().map(|i| {
                leaf.keys.remove(i);
                leaf.values.remove(i)
            })),
            Node::Internal(internal) => {
                let i = internal.child_index(key);
                let removed = internal.children[i].remove(key, order)?;
                if removed.is_some() && internal.children[i].num_keys() < min_keys(order) {
                    internal.fix_underflow(i, order)?;
                }
                Ok(removed)
            }
        }
    }

    /// Appends `right` (the next sibling) to this node. Internal nodes pull the
    /// separator down between the two key runs; leaves drop it.
    fn absorb(&mut self, separator: Vec<u8>, right: Node) -> Result<()> {
        match (self, right) {
            (Node::Leaf(left), Node::Leaf(right)) => {
                left.keys.extend(right.keys);
                left.values.extend(right.values);
            }
            (Node::Internal(left), Node::Internal(right)) => {
                left.keys.push(separator);
                left.keys.extend(right.keys);
                left.children.extend(right.children);
            }
            _ => return Err(SdbError::corrupt("sibling nodes at different depths")),
        }
        Ok(())
    }

    /// Splits a node holding more than `order` keys in half.
    fn split_if_overfull(&mut self, order: usize) -> Option<(Vec<u8>, Node)> {
        if self.num_keys() <= order {
            return None;
        }
        let mid = self.num_keys() / 2;

        match self {
            Node::Leaf(leaf) => {
                let keys = leaf.keys.split_off(mid);
                let values = leaf.values.split_off(mid);
                let separator = keys.first()?.clone();
                Some((separator, Node::Leaf(LeafNode { keys, values })))
            }
            Node::Internal(internal) => {
                let keys = internal.keys.split_off(mid + 1);
                let children = internal.children.split_off(mid + 1);
                let separator = internal.keys.pop()?;
                Some((separator, Node::Internal(InternalNode { keys, children })))
            }
        }
    }

    /// Checks ordering, key widths, fan-out and balance of this subtree.
    /// Every key must fall in `[lower, upper)`.
    fn check(
        &self,
        key_width: usize,
        order: usize,
        is_root: bool,
        lower: Option<&[u8]>,
        upper: Option<&[u8]>,
    ) -> Result<SubtreeInfo> {
        let keys = match self {
            Node::Leaf(leaf) => &leaf.keys,
            Node::Internal(internal) => &internal.keys,
        };

        if keys.len() > order {
            return Err(SdbError::corrupt(format!(
                "node holds {} keys, order is {}",
                keys.len(),
                order
            )));
        }
        if !is_root && keys.len() < min_keys(order) {
            return Err(SdbError::corrupt(format!(
                "non-root node holds {} keys, minimum is {}",
                keys.len(),
                min_keys(order)
            )));
        }
        for key in keys {
            if key.len() != key_width {
                return Err(SdbError::corrupt(format!(
                    "key of {} bytes in index of width {}",
                    key.len(),
                    key_width
                )));
            }
            let below = lower.map_or(false, |l| key.as_slice() < l);
            let above = upper.map_or(false, |u| key.as_slice() >= u);
            if below || above {
                return Err(SdbError::corrupt("key outside its parent's range"));
            }
        }
        if keys.windows(2).any(|w| w[0].cmp(&w[1]) != Ordering::Less) {
            return Err(SdbError::corrupt("node keys are not strictly increasing"));
        }

        match self {
            Node::Leaf(leaf) => {
                if leaf.values.len() != leaf.keys.len() {
                    return Err(SdbError::corrupt("leaf key and value counts differ"));
                }
                Ok(SubtreeInfo {
                    entries: leaf.keys.len() as u64,
                    leaf_depth: 0,
                })
            }
            Node::Internal(internal) => {
                if internal.keys.is_empty() {
                    return Err(SdbError::corrupt("internal node without keys"));
                }
                if internal.children.len() != internal.keys.len() + 1 {
                    return Err(SdbError::corrupt("internal node child count mismatch"));
                }

                let mut entries = 0;
                let mut depth = None;
                for (i, child) in internal.children.iter().enumerate() {
                    let child_lower = if i == 0 {
                        lower
                    } else {
                        Some(internal.keys[i - 1].as_slice())
                    };
                    let child_upper = internal.keys.get(i).map(Vec::as_slice).or(upper);

                    let info = child.check(key_width, order, false, child_lower, child_upper)?;
                    match depth {
                        None => depth = Some(info.leaf_depth),
                        Some(d) if d != info.leaf_depth => {
                            return Err(SdbError::corrupt("leaves at different depths"));
                        }
                        Some(_) => {}
                    }
                    entries += info.entries;
                }

                Ok(SubtreeInfo {
                    entries,
                    leaf_depth: depth.unwrap_or(0) + 1,
                })
            }
        }
    }

    /// Writes this subtree in pre-order:
    /// `[tag u8][num_keys u16][keys]` then locators for a leaf or children for
    /// an internal node.
    pub(crate) fn encode_into(&self, buf: &mut BytesMut) {
        match self {
            Node::Leaf(leaf) => {
                buf.put_u8(LEAF_TAG);
                buf.put_u16_le(leaf.keys.len() as u16);
                for key in &leaf.keys {
                    buf.put_slice(key);
                }
                for locator in &leaf.values {
                    buf.put_u32_le(locator.page_id.as_u32());
                    buf.put_u32_le(locator.offset);
                }
            }
            Node::Internal(internal) => {
                buf.put_u8(INTERNAL_TAG);
                buf.put_u16_le(internal.keys.len() as u16);
                for key in &internal.keys {
                    buf.put_slice(key);
                }
                for child in &internal.children {
                    child.encode_into(buf);
                }
            }
        }
    }

    pub(crate) fn decode_from(buf: &mut &[u8], key_width: usize, depth: usize) -> Result<Node> {
        if depth > MAX_DECODE_DEPTH {
            return Err(SdbError::corrupt("index tree is too deep"));
        }
        need(buf, 3, "node header")?;
        let tag = buf.get_u8();
        let num_keys = buf.get_u16_le() as usize;

        need(buf, num_keys * key_width, "node keys")?;
        let keys: Vec<Vec<u8>> = (0..num_keys)
            .map(|_| {
                let key = buf[..key_width].to_vec();
                buf.advance(key_width);
                key
            })
            .collect();

        match tag {
            LEAF_TAG => {
                need(buf, num_keys * Locator::ENCODED_LEN, "leaf locators")?;
                let values = (0..num_keys)
                    .map(|_| {
                        let page_id = PageId::new(buf.get_u32_le());
                        Locator::new(page_id, buf.get_u32_le())
                    })
                    .collect();
                Ok(Node::Leaf(LeafNode { keys, values }))
            }
            INTERNAL_TAG => {
                let children = (0..=num_keys)
                    .map(|_| Node::decode_from(buf, key_width, depth + 1))
                    .collect::<Result<Vec<_>>>()?;
                Ok(Node::Internal(InternalNode { keys, children }))
            }
            other => Err(SdbError::corrupt(format!("unknown node tag {}", other))),
        }
    }
}

/// Minimum keys in any non-root node.
pub(crate) fn min_keys(order: usize) -> usize {
    order / 2
}

/// Validates the tree rooted at `root` and returns its entry count.
pub(crate) fn check_tree(root: &Node, key_width: usize, order: usize) -> Result<u64> {
    root.check(key_width, order, true, None, None)
        .map(|info| info.entries)
}

fn need(buf: &[u8], len: usize, what: &str) -> Result<()> {
    if buf.remaining() < len {
        return Err(SdbError::corrupt(format!(
            "truncated {}: need {} bytes, {} left",
            what,
            len,
            buf.remaining()
        )));
    }
    Ok(())
}

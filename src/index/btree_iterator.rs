use crate::common::Locator;

use super::btree_node::{InternalNode, LeafNode, Node};

/// In-order iterator over the entries of a `BTreeIndex`.
///
/// Keeps the path from the root to the current leaf, so advancing past the end
/// of a leaf climbs to the nearest ancestor with an unvisited child.
pub struct BTreeIterator<'a> {
    /// Ancestors of the current leaf and the index of the next child to visit
    stack: Vec<(&'a InternalNode, usize)>,
    leaf: Option<&'a LeafNode>,
    position: usize,
}

impl<'a> BTreeIterator<'a> {
    /// Positions the iterator at the first key >= `start`, or at the first key
    /// of the tree if `start` is None.
    pub(crate) fn seek(root: &'a Node, start: Option<&[u8]>) -> Self {
        let mut stack = Vec::new();
        let mut node = root;

        let leaf = loop {
            match node {
                Node::Leaf(leaf) => break leaf,
                Node::Internal(internal) => {
                    let i = start.map_or(0, |key| internal.child_index(key));
                    stack.push((internal, i + 1));
                    node = &internal.children[i];
                }
            }
        };

        let position = start.map_or(0, |key| leaf.keys.partition_point(|k| k.as_slice() < key));

        Self {
            stack,
            leaf: Some(leaf),
            position,
        }
    }

    /// Moves to the leftmost leaf of the next unvisited subtree.
    fn next_leaf(&mut self) -> Option<&'a LeafNode> {
        loop {
            let (internal, next) = self.stack.last_mut()?;
            let internal: &'a InternalNode = *internal;
            if *next < internal.children.len() {
                let mut node = &internal.children[*next];
                *next += 1;

                loop {
                    match node {
                        Node::Leaf(leaf) => return Some(leaf),
                        Node::Internal(child) => {
                            self.stack.push((child, 1));
                            node = &child.children[0];
                        }
                    }
                }
            }
            self.stack.pop();
        }
    }
}

impl<'a> Iterator for BTreeIterator<'a> {
    type Item = (&'a [u8], Locator);

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let leaf = self.leaf?;
            if self.position < leaf.keys.len() {
                let item = (leaf.keys[self.position].as_slice(), leaf.values[self.position]);
                self.position += 1;
                return Some(item);
            }
            self.leaf = self.next_leaf();
            self.position = 0;
        }
    }
}

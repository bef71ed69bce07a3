mod btree_index;
mod btree_iterator;
mod btree_node;

pub use btree_index::BTreeIndex;
pub use btree_iterator::BTreeIterator;

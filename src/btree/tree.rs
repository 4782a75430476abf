//! Copy-on-write tree driver.
//!
//! This module provides the main BTree struct with operations for:
//! - get: Point lookups
//! - insert: Insertions and updates
//! - delete: Removals with merge-on-underflow rebalancing

use std::sync::Arc;

use smallvec::smallvec;

use crate::error::{Result, TreeError};
use crate::page::{merge, split3, Node, NodeType, SplitShards, HEADER_SIZE};
use crate::storage::PageManager;
use crate::types::{PageId, MAX_KEY_SIZE, MAX_VALUE_SIZE, MERGE_THRESHOLD, PAGE_SIZE};

/// Merge decision for an edited child, carrying the fetched sibling.
enum MergeSibling {
    None,
    Left(Node),
    Right(Node),
}

/// A copy-on-write B+ tree mapping byte-string keys to byte-string values.
///
/// The tree owns nothing but the root page id; all pages live in the
/// injected [`PageManager`]. Every mutation produces new pages and releases
/// the ones that became unreachable, so after each operation the manager
/// holds exactly the pages reachable from the root. Concurrent mutation is
/// the caller's responsibility.
pub struct BTree {
    manager: Arc<dyn PageManager>,
    root: PageId,
}

impl BTree {
    /// Create an empty tree on top of `manager`.
    pub fn new(manager: Arc<dyn PageManager>) -> Self {
        Self {
            manager,
            root: PageId::NIL,
        }
    }

    /// Reopen a tree whose root page already lives in `manager`.
    pub fn with_root(manager: Arc<dyn PageManager>, root: PageId) -> Self {
        Self { manager, root }
    }

    /// Root page id; `PageId::NIL` when the tree is empty.
    pub fn root_page(&self) -> PageId {
        self.root
    }

    pub(crate) fn manager(&self) -> &dyn PageManager {
        self.manager.as_ref()
    }

    /// Look up a key and return its value.
    ///
    /// Returns `None` if the key does not exist.
    pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        if self.root.is_nil() {
            return Ok(None);
        }
        let root = self.manager.read_page(self.root)?;
        self.lookup_value(&root, key)
    }

    fn lookup_value(&self, node: &Node, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let (idx, found) = node.lookup(key);
        match node.node_type() {
            NodeType::Leaf => Ok(if found {
                Some(node.val(idx).to_vec())
            } else {
                None
            }),
            NodeType::Internal => {
                let idx = descend_idx(idx, found);
                let child = self.manager.read_page(node.ptr(idx))?;
                self.lookup_value(&child, key)
            }
        }
    }

    /// Insert or update a key-value pair.
    pub fn insert(&mut self, key: &[u8], val: &[u8]) -> Result<()> {
        validate_key(key)?;
        if val.len() > MAX_VALUE_SIZE {
            return Err(TreeError::ValueTooLarge {
                size: val.len(),
                max: MAX_VALUE_SIZE,
            });
        }

        if self.root.is_nil() {
            let mut root = Node::page();
            root.set_header(NodeType::Leaf, 1);
            root.append_kv(0, PageId::NIL, key, val);
            self.root = self.manager.create_page(root)?;
            return Ok(());
        }

        let old_root = self.root;
        let root = self.manager.read_page(old_root)?;
        let grown = self.insert_node(&root, key, val)?;
        self.root = self.register_root(split3(grown))?;
        self.manager.delete_page(old_root)?;
        Ok(())
    }

    /// Register the shards of a grown root, adding a new internal root
    /// level when the old one split.
    fn register_root(&self, mut shards: SplitShards) -> Result<PageId> {
        if shards.len() == 1 {
            return self.manager.create_page(shards.remove(0));
        }
        let mut root = Node::page();
        root.set_header(NodeType::Internal, shards.len());
        for (i, shard) in shards.into_iter().enumerate() {
            let first = shard.key(0).to_vec();
            let id = self.manager.create_page(shard)?;
            root.append_kv(i, id, &first, &[]);
        }
        self.manager.create_page(root)
    }

    /// Recursive insert. Returns the edited copy of `node`, which may
    /// exceed `PAGE_SIZE` (never `2 * PAGE_SIZE`) until the caller splits
    /// it.
    fn insert_node(&self, node: &Node, key: &[u8], val: &[u8]) -> Result<Node> {
        let (idx, found) = node.lookup(key);
        match node.node_type() {
            NodeType::Leaf => Ok(if found {
                Node::leaf_update(node, idx, key, val)
            } else {
                Node::leaf_insert(node, idx, key, val)
            }),
            NodeType::Internal => {
                let idx = descend_idx(idx, found);
                let child = self.manager.read_page(node.ptr(idx))?;
                let grown = self.insert_node(&child, key, val)?;
                self.replace_kid_n(node, idx, split3(grown))
            }
        }
    }

    /// Delete a key from the tree.
    ///
    /// Returns `true` if the key was found and deleted. An absent key
    /// issues no `create_page` or `delete_page` calls at all.
    pub fn delete(&mut self, key: &[u8]) -> Result<bool> {
        validate_key(key)?;
        if self.root.is_nil() {
            return Ok(false);
        }
        let old_root = self.root;
        let root = self.manager.read_page(old_root)?;
        let Some(updated) = self.delete_node(&root, key)? else {
            return Ok(false);
        };
        self.root = if updated.nkeys() == 0 {
            // The last key anywhere on the path is gone; the tree is empty.
            PageId::NIL
        } else if !updated.is_leaf() && updated.nkeys() == 1 {
            // Height shrinks: the sole child becomes the root. `updated`
            // itself was never registered.
            updated.ptr(0)
        } else {
            self.manager.create_page(updated)?
        };
        self.manager.delete_page(old_root)?;
        Ok(true)
    }

    /// Recursive delete. `None` means the key was absent and no pages were
    /// created or released.
    fn delete_node(&self, node: &Node, key: &[u8]) -> Result<Option<Node>> {
        let (idx, found) = node.lookup(key);
        match node.node_type() {
            NodeType::Leaf => Ok(if found {
                Some(Node::leaf_delete(node, idx))
            } else {
                None
            }),
            NodeType::Internal => {
                let idx = descend_idx(idx, found);
                let child_id = node.ptr(idx);
                let child = self.manager.read_page(child_id)?;
                let Some(updated) = self.delete_node(&child, key)? else {
                    return Ok(None);
                };
                let new_parent = match self.should_merge(node, idx, &updated)? {
                    MergeSibling::Left(sibling) => {
                        let merged = merge(&sibling, &updated);
                        self.replace_two_kids(node, idx - 1, merged)?
                    }
                    MergeSibling::Right(sibling) => {
                        let merged = merge(&updated, &sibling);
                        self.replace_two_kids(node, idx, merged)?
                    }
                    MergeSibling::None if updated.nkeys() == 0 => {
                        // The child emptied out with no sibling to absorb
                        // it, which only happens under a single-child
                        // parent. Signal emptiness upward.
                        assert!(
                            node.nkeys() == 1 && idx == 0,
                            "empty child under a parent with {} keys at index {idx}",
                            node.nkeys()
                        );
                        self.manager.delete_page(child_id)?;
                        let mut empty = Node::page();
                        empty.set_header(NodeType::Internal, 0);
                        empty
                    }
                    MergeSibling::None => self.replace_kid_n(node, idx, smallvec![updated])?,
                };
                Ok(Some(new_parent))
            }
        }
    }

    /// Decide whether the edited child at `idx` should merge with a
    /// sibling. The left sibling is preferred when both would fit.
    fn should_merge(&self, parent: &Node, idx: usize, updated: &Node) -> Result<MergeSibling> {
        if updated.total_bytes() > MERGE_THRESHOLD {
            return Ok(MergeSibling::None);
        }
        if idx > 0 {
            let sibling = self.manager.read_page(parent.ptr(idx - 1))?;
            if sibling.total_bytes() + updated.total_bytes() - HEADER_SIZE <= PAGE_SIZE {
                return Ok(MergeSibling::Left(sibling));
            }
        }
        if idx + 1 < parent.nkeys() {
            let sibling = self.manager.read_page(parent.ptr(idx + 1))?;
            if sibling.total_bytes() + updated.total_bytes() - HEADER_SIZE <= PAGE_SIZE {
                return Ok(MergeSibling::Right(sibling));
            }
        }
        Ok(MergeSibling::None)
    }

    /// New internal node where the entry at `idx` is replaced by one entry
    /// per kid, keyed by each kid's first key. Registers the kids with the
    /// manager and releases the replaced child.
    fn replace_kid_n(&self, parent: &Node, idx: usize, kids: SplitShards) -> Result<Node> {
        let old_child = parent.ptr(idx);
        let m = kids.len();
        let mut node = Node::scratch();
        node.set_header(NodeType::Internal, parent.nkeys() + m - 1);
        node.append_range(parent, 0, 0, idx);
        for (i, kid) in kids.into_iter().enumerate() {
            let first = kid.key(0).to_vec();
            let id = self.manager.create_page(kid)?;
            node.append_kv(idx + i, id, &first, &[]);
        }
        node.append_range(parent, idx + m, idx + 1, parent.nkeys() - idx - 1);
        self.manager.delete_page(old_child)?;
        Ok(node)
    }

    /// New internal node where the entries at `idx` and `idx + 1` collapse
    /// into a single entry pointing at `merged`. Registers the merged page
    /// and releases both replaced children.
    fn replace_two_kids(&self, parent: &Node, idx: usize, merged: Node) -> Result<Node> {
        let left_child = parent.ptr(idx);
        let right_child = parent.ptr(idx + 1);
        let first = merged.key(0).to_vec();
        let mut node = Node::scratch();
        node.set_header(NodeType::Internal, parent.nkeys() - 1);
        node.append_range(parent, 0, 0, idx);
        let id = self.manager.create_page(merged)?;
        node.append_kv(idx, id, &first, &[]);
        node.append_range(parent, idx + 1, idx + 2, parent.nkeys() - idx - 2);
        self.manager.delete_page(left_child)?;
        self.manager.delete_page(right_child)?;
        Ok(node)
    }

    /// Height of the tree: 0 when empty, 1 for a lone leaf.
    pub fn height(&self) -> Result<usize> {
        let mut height = 0;
        let mut id = self.root;
        while !id.is_nil() {
            let node = self.manager.read_page(id)?;
            height += 1;
            if node.is_leaf() {
                break;
            }
            id = node.ptr(0);
        }
        Ok(height)
    }
}

/// Map a lookup result onto the child slot to descend into. An absent key
/// belongs to the subtree whose separator precedes the insertion position.
fn descend_idx(idx: usize, found: bool) -> usize {
    if !found && idx > 0 {
        idx - 1
    } else {
        idx
    }
}

fn validate_key(key: &[u8]) -> Result<()> {
    if key.is_empty() {
        return Err(TreeError::EmptyKey);
    }
    if key.len() > MAX_KEY_SIZE {
        return Err(TreeError::KeyTooLarge {
            size: key.len(),
            max: MAX_KEY_SIZE,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryPageManager;

    fn create_test_btree() -> (BTree, Arc<MemoryPageManager>) {
        let manager = Arc::new(MemoryPageManager::new());
        let btree = BTree::new(manager.clone());
        (btree, manager)
    }

    #[test]
    fn test_btree_empty() -> Result<()> {
        let (btree, manager) = create_test_btree();
        assert_eq!(btree.get(b"key")?, None);
        assert!(btree.root_page().is_nil());
        assert_eq!(manager.page_count(), 0);
        Ok(())
    }

    #[test]
    fn test_single_entry_lifecycle() -> Result<()> {
        let (mut btree, manager) = create_test_btree();

        btree.insert(b"a", b"A")?;
        assert_eq!(btree.get(b"a")?, Some(b"A".to_vec()));
        assert_eq!(btree.height()?, 1);
        assert_eq!(manager.page_count(), 1);

        assert!(btree.delete(b"a")?);
        assert!(btree.root_page().is_nil());
        assert_eq!(btree.get(b"a")?, None);
        assert_eq!(manager.page_count(), 0);

        assert!(!btree.delete(b"a")?);
        Ok(())
    }

    #[test]
    fn test_update_shrinks_in_place() -> Result<()> {
        let (mut btree, manager) = create_test_btree();

        btree.insert(b"k", &vec![b'v'; 2000])?;
        btree.insert(b"k", &vec![b'v'; 100])?;

        assert_eq!(btree.get(b"k")?, Some(vec![b'v'; 100]));
        assert_eq!(btree.height()?, 1);
        assert_eq!(manager.page_count(), 1);
        Ok(())
    }

    #[test]
    fn test_large_entries_grow_and_shrink() -> Result<()> {
        let (mut btree, manager) = create_test_btree();

        // Three entries too large to share a page: the root must become
        // internal with one leaf per entry.
        btree.insert(b"b", &vec![b'b'; 3000])?;
        btree.insert(b"c", &vec![b'c'; 3000])?;
        btree.insert(b"a", &vec![b'a'; 3000])?;

        assert_eq!(btree.height()?, 2);
        assert_eq!(manager.page_count(), 4);
        let root = manager.read_page(btree.root_page())?;
        assert_eq!(root.node_type(), NodeType::Internal);
        assert_eq!(root.nkeys(), 3);
        for (key, val) in [(b"a", b'a'), (b"b", b'b'), (b"c", b'c')] {
            assert_eq!(btree.get(key)?, Some(vec![val; 3000]));
        }

        assert!(btree.delete(b"c")?);
        assert!(btree.delete(b"b")?);
        assert!(btree.delete(b"a")?);
        assert!(btree.root_page().is_nil());
        assert_eq!(manager.page_count(), 0);
        Ok(())
    }

    #[test]
    fn test_split_separators_match_leaf_first_keys() -> Result<()> {
        let (mut btree, manager) = create_test_btree();

        // Two entries whose combined size just exceeds a page.
        btree.insert(b"a", &vec![b'x'; 2100])?;
        btree.insert(b"b", &vec![b'y'; 2100])?;

        let root = manager.read_page(btree.root_page())?;
        assert_eq!(root.node_type(), NodeType::Internal);
        assert_eq!(root.nkeys(), 2);
        for i in 0..root.nkeys() {
            let child = manager.read_page(root.ptr(i))?;
            assert_eq!(child.node_type(), NodeType::Leaf);
            assert_eq!(root.key(i), child.key(0));
        }
        Ok(())
    }

    #[test]
    fn test_absent_delete_leaves_pages_untouched() -> Result<()> {
        let (mut btree, manager) = create_test_btree();

        btree.insert(b"a", b"1")?;
        btree.insert(b"b", b"2")?;
        let pages_before = manager.page_ids();

        assert!(!btree.delete(b"c")?);
        assert_eq!(manager.page_ids(), pages_before);
        Ok(())
    }

    #[test]
    fn test_key_and_value_preconditions() {
        let (mut btree, manager) = create_test_btree();

        assert!(matches!(btree.insert(b"", b"v"), Err(TreeError::EmptyKey)));
        assert!(matches!(
            btree.insert(&vec![b'k'; MAX_KEY_SIZE + 1], b"v"),
            Err(TreeError::KeyTooLarge { .. })
        ));
        assert!(matches!(
            btree.insert(b"k", &vec![b'v'; MAX_VALUE_SIZE + 1]),
            Err(TreeError::ValueTooLarge { .. })
        ));
        assert!(matches!(btree.delete(b""), Err(TreeError::EmptyKey)));
        assert_eq!(manager.page_count(), 0);
    }

    #[test]
    fn test_boundary_sizes_accepted() -> Result<()> {
        let (mut btree, _manager) = create_test_btree();

        // Smallest legal entry.
        btree.insert(b"x", b"")?;
        assert_eq!(btree.get(b"x")?, Some(Vec::new()));

        // Largest legal entry; a second one forces a leaf split.
        let big_key_a = vec![b'a'; MAX_KEY_SIZE];
        let big_key_b = vec![b'b'; MAX_KEY_SIZE];
        let big_val = vec![b'v'; MAX_VALUE_SIZE];
        btree.insert(&big_key_a, &big_val)?;
        assert_eq!(btree.height()?, 1);
        btree.insert(&big_key_b, &big_val)?;
        assert_eq!(btree.height()?, 2);
        assert_eq!(btree.get(&big_key_b)?, Some(big_val));
        Ok(())
    }

    #[test]
    fn test_reopen_with_root() -> Result<()> {
        let manager = Arc::new(MemoryPageManager::new());
        let root = {
            let mut btree = BTree::new(manager.clone());
            btree.insert(b"a", b"1")?;
            btree.insert(b"b", b"2")?;
            btree.root_page()
        };

        let btree = BTree::with_root(manager, root);
        assert_eq!(btree.get(b"a")?, Some(b"1".to_vec()));
        assert_eq!(btree.get(b"b")?, Some(b"2".to_vec()));
        Ok(())
    }
}

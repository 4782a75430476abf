//! # Copy-on-write B+ tree index
//!
//! An ordered key/value index: a copy-on-write B+ tree whose nodes are
//! fixed-size byte pages. Keys and values are arbitrary byte strings
//! (bounded by [`MAX_KEY_SIZE`] and [`MAX_VALUE_SIZE`]), ordered by
//! lexicographic byte comparison. No live page is ever modified in place:
//! every mutation produces new pages and releases the old ones through an
//! injected page manager.
//!
//! ## Architecture
//!
//! The index is composed of modular, swappable components:
//!
//! - **Page Layer** (`page`): hand-packed node format and pure page edits
//! - **B-Tree Layer** (`btree`): recursive insert/delete with
//!   copy-on-write split and merge rebalancing
//! - **Storage Layer** (`storage`): the injected page-manager seam
//!
//! ## Usage
//!
//! ```rust,ignore
//! use cow_btree::Db;
//!
//! let db = Db::in_memory();
//!
//! // Put a key-value pair
//! db.insert(b"hello", b"world")?;
//!
//! // Get a value
//! let value = db.get(b"hello")?;
//!
//! // Delete a key
//! db.delete(b"hello")?;
//! ```

pub mod btree;
pub mod error;
pub mod page;
pub mod storage;
pub mod types;

pub use error::{Result, TreeError};
pub use types::{PageId, MAX_KEY_SIZE, MAX_VALUE_SIZE, MERGE_THRESHOLD, PAGE_SIZE};

// Re-export main public API
pub use btree::BTree;
pub use page::{Node, NodeType};
pub use storage::{MemoryPageManager, PageManager};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Node snapshot for visualization
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TreeNode {
    /// Page ID
    pub page_id: u64,
    /// Whether this is a leaf node
    pub is_leaf: bool,
    /// Keys in this node
    pub keys: Vec<String>,
    /// Values (only for leaf nodes)
    pub values: Vec<String>,
    /// Child nodes (only for internal nodes)
    pub children: Vec<TreeNode>,
}

/// Main database handle providing key-value storage backed by the
/// copy-on-write B-tree.
///
/// This is the primary public interface: it wraps the tree in a
/// reader-writer lock so a single process can share one handle across
/// threads, which is exactly the concurrency the core itself leaves to the
/// caller.
pub struct Db {
    btree: Arc<RwLock<BTree>>,
    manager: Arc<dyn PageManager>,
}

impl Db {
    /// Open an empty index on top of `manager`.
    pub fn new(manager: Arc<dyn PageManager>) -> Self {
        Self {
            btree: Arc::new(RwLock::new(BTree::new(manager.clone()))),
            manager,
        }
    }

    /// Open an empty index backed by a fresh in-memory page manager.
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryPageManager::new()))
    }

    /// Reopen an index whose root page already lives in `manager`.
    pub fn with_root(manager: Arc<dyn PageManager>, root: PageId) -> Self {
        Self {
            btree: Arc::new(RwLock::new(BTree::with_root(manager.clone(), root))),
            manager,
        }
    }

    /// Get a value by key
    ///
    /// Returns `None` if the key does not exist.
    pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let btree = self.btree.read();
        btree.get(key)
    }

    /// Insert or update a key-value pair
    pub fn insert(&self, key: &[u8], value: &[u8]) -> Result<()> {
        let mut btree = self.btree.write();
        btree.insert(key, value)
    }

    /// Delete a key-value pair
    ///
    /// Returns `true` if the key existed and was deleted.
    pub fn delete(&self, key: &[u8]) -> Result<bool> {
        let mut btree = self.btree.write();
        btree.delete(key)
    }

    /// Check if a key exists
    pub fn contains(&self, key: &[u8]) -> Result<bool> {
        let btree = self.btree.read();
        Ok(btree.get(key)?.is_some())
    }

    /// Current root page id; `PageId::NIL` when the index is empty.
    pub fn root_page(&self) -> PageId {
        self.btree.read().root_page()
    }

    /// Get statistics about the index
    pub fn stats(&self) -> Result<DbStats> {
        let btree = self.btree.read();
        Ok(DbStats {
            height: btree.height()?,
            key_count: btree.key_count()?,
            page_count: btree.pages()?.len(),
        })
    }

    /// Export the tree structure for visualization
    pub fn export_tree(&self) -> Result<Option<TreeNode>> {
        let btree = self.btree.read();
        let root_page = btree.root_page();

        if root_page.is_nil() {
            return Ok(None);
        }

        self.export_node(root_page).map(Some)
    }

    fn export_node(&self, page_id: PageId) -> Result<TreeNode> {
        let node = self.manager.read_page(page_id)?;

        if node.is_leaf() {
            let mut keys = Vec::with_capacity(node.nkeys());
            let mut values = Vec::with_capacity(node.nkeys());
            for i in 0..node.nkeys() {
                keys.push(String::from_utf8_lossy(node.key(i)).to_string());
                values.push(String::from_utf8_lossy(node.val(i)).to_string());
            }
            Ok(TreeNode {
                page_id: page_id.value(),
                is_leaf: true,
                keys,
                values,
                children: Vec::new(),
            })
        } else {
            let mut keys = Vec::with_capacity(node.nkeys());
            let mut children = Vec::with_capacity(node.nkeys());
            for i in 0..node.nkeys() {
                keys.push(String::from_utf8_lossy(node.key(i)).to_string());
                children.push(self.export_node(node.ptr(i))?);
            }
            Ok(TreeNode {
                page_id: page_id.value(),
                is_leaf: false,
                keys,
                values: Vec::new(),
                children,
            })
        }
    }
}

/// Database statistics
#[derive(Debug, Clone)]
pub struct DbStats {
    /// Height of the tree (0 when empty)
    pub height: usize,
    /// Number of live keys
    pub key_count: u64,
    /// Number of pages reachable from the root
    pub page_count: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic_operations() -> Result<()> {
        let db = Db::in_memory();

        // Test insert and get
        db.insert(b"key1", b"value1")?;
        assert_eq!(db.get(b"key1")?, Some(b"value1".to_vec()));

        // Test update
        db.insert(b"key1", b"value2")?;
        assert_eq!(db.get(b"key1")?, Some(b"value2".to_vec()));

        // Test delete
        assert!(db.delete(b"key1")?);
        assert_eq!(db.get(b"key1")?, None);

        // Test non-existent key
        assert_eq!(db.get(b"nonexistent")?, None);
        assert!(!db.delete(b"nonexistent")?);

        Ok(())
    }

    #[test]
    fn test_contains() -> Result<()> {
        let db = Db::in_memory();

        db.insert(b"apple", b"1")?;
        assert!(db.contains(b"apple")?);
        assert!(!db.contains(b"banana")?);

        Ok(())
    }

    #[test]
    fn test_stats() -> Result<()> {
        let db = Db::in_memory();

        let empty = db.stats()?;
        assert_eq!(empty.height, 0);
        assert_eq!(empty.key_count, 0);
        assert_eq!(empty.page_count, 0);

        for i in 0..20 {
            let key = format!("key{i:02}");
            db.insert(key.as_bytes(), &vec![b'v'; 400])?;
        }

        let stats = db.stats()?;
        assert_eq!(stats.key_count, 20);
        assert!(stats.height >= 2);
        assert!(stats.page_count > 1);

        Ok(())
    }

    #[test]
    fn test_export_tree() -> Result<()> {
        let db = Db::in_memory();
        assert!(db.export_tree()?.is_none());

        db.insert(b"apple", b"red")?;
        db.insert(b"banana", b"yellow")?;

        let tree = db.export_tree()?.unwrap();
        assert!(tree.is_leaf);
        assert_eq!(tree.keys, vec!["apple", "banana"]);
        assert_eq!(tree.values, vec!["red", "yellow"]);
        Ok(())
    }

    #[test]
    fn test_shared_manager_reopen() -> Result<()> {
        let manager = Arc::new(MemoryPageManager::new());
        let root = {
            let db = Db::new(manager.clone());
            db.insert(b"persist", b"me")?;
            db.root_page()
        };

        let db = Db::with_root(manager, root);
        assert_eq!(db.get(b"persist")?, Some(b"me".to_vec()));
        Ok(())
    }
}

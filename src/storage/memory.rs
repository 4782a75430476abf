//! In-memory page manager.

use std::collections::HashMap;

use parking_lot::RwLock;

use crate::error::{Result, TreeError};
use crate::page::Node;
use crate::storage::PageManager;
use crate::types::PageId;

/// Page manager keeping every page in a process-local map.
///
/// Ids are issued from a monotonic counter starting at 1 and are never
/// reused. Useful on its own for ephemeral indexes and as the reference
/// implementation of the [`PageManager`] contract: `delete_page` of an
/// unknown id and `read_page` of a released id both fail loudly.
pub struct MemoryPageManager {
    inner: RwLock<Inner>,
}

struct Inner {
    pages: HashMap<PageId, Node>,
    next_id: u64,
}

impl MemoryPageManager {
    /// Create an empty page manager.
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner {
                pages: HashMap::new(),
                next_id: 1,
            }),
        }
    }

    /// Number of live pages.
    pub fn page_count(&self) -> usize {
        self.inner.read().pages.len()
    }

    /// Ids of all live pages, in ascending order.
    pub fn page_ids(&self) -> Vec<PageId> {
        let inner = self.inner.read();
        let mut ids: Vec<PageId> = inner.pages.keys().copied().collect();
        ids.sort();
        ids
    }
}

impl Default for MemoryPageManager {
    fn default() -> Self {
        Self::new()
    }
}

impl PageManager for MemoryPageManager {
    fn read_page(&self, id: PageId) -> Result<Node> {
        let inner = self.inner.read();
        inner
            .pages
            .get(&id)
            .cloned()
            .ok_or(TreeError::PageNotFound(id))
    }

    fn create_page(&self, node: Node) -> Result<PageId> {
        let node = node.into_page();
        let mut inner = self.inner.write();
        let id = PageId::new(inner.next_id);
        inner.next_id += 1;
        inner.pages.insert(id, node);
        Ok(id)
    }

    fn delete_page(&self, id: PageId) -> Result<()> {
        let mut inner = self.inner.write();
        match inner.pages.remove(&id) {
            Some(_) => Ok(()),
            None => Err(TreeError::PageNotFound(id)),
        }
    }
}

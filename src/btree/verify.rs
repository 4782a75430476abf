//! Structural invariant checks and whole-tree walks.
//!
//! [`BTree::verify`] audits everything the balance protocol promises across
//! the whole tree; [`BTree::pages`] and [`BTree::key_count`] expose the
//! reachable page set and live key population for stats and tests.

use crate::error::{Result, TreeError};
use crate::page::{Node, NodeType};
use crate::types::{PageId, PAGE_SIZE};

use super::BTree;

impl BTree {
    /// Walk the whole tree and verify its structural invariants: every
    /// page fits `PAGE_SIZE`, keys are strictly ascending within each node,
    /// every separator equals its child's first key, internal nodes are
    /// non-empty, and all leaves sit at the same depth. Returns
    /// `TreeError::Corruption` describing the first violation found.
    pub fn verify(&self) -> Result<()> {
        let root_id = self.root_page();
        if root_id.is_nil() {
            return Ok(());
        }
        let root = self.manager().read_page(root_id)?;
        let mut leaf_depth = None;
        self.verify_node(&root, root_id, 1, &mut leaf_depth, None)
    }

    fn verify_node(
        &self,
        node: &Node,
        id: PageId,
        depth: usize,
        leaf_depth: &mut Option<usize>,
        separator: Option<&[u8]>,
    ) -> Result<()> {
        // Every reachable page holds at least one key: an empty root is
        // represented as PageId::NIL and empty children are merged away.
        if node.nkeys() == 0 {
            return Err(TreeError::corruption(format!("page {id} has no keys")));
        }
        let total = node.total_bytes();
        if total > PAGE_SIZE {
            return Err(TreeError::corruption(format!(
                "page {id} holds {total} bytes (max: {PAGE_SIZE})"
            )));
        }
        for i in 1..node.nkeys() {
            if node.key(i - 1) >= node.key(i) {
                return Err(TreeError::corruption(format!(
                    "page {id} keys not strictly ascending at index {i}"
                )));
            }
        }
        if let Some(separator) = separator {
            if node.key(0) != separator {
                return Err(TreeError::corruption(format!(
                    "page {id} first key does not match its parent separator"
                )));
            }
        }
        match node.node_type() {
            NodeType::Leaf => match *leaf_depth {
                None => {
                    *leaf_depth = Some(depth);
                    Ok(())
                }
                Some(expected) if expected != depth => Err(TreeError::corruption(format!(
                    "leaf {id} at depth {depth}, expected {expected}"
                ))),
                Some(_) => Ok(()),
            },
            NodeType::Internal => {
                for i in 0..node.nkeys() {
                    let child_id = node.ptr(i);
                    let child = self.manager().read_page(child_id)?;
                    self.verify_node(&child, child_id, depth + 1, leaf_depth, Some(node.key(i)))?;
                }
                Ok(())
            }
        }
    }

    /// Ids of every page reachable from the root, in pre-order.
    pub fn pages(&self) -> Result<Vec<PageId>> {
        let mut ids = Vec::new();
        if !self.root_page().is_nil() {
            self.collect_pages(self.root_page(), &mut ids)?;
        }
        Ok(ids)
    }

    fn collect_pages(&self, id: PageId, ids: &mut Vec<PageId>) -> Result<()> {
        ids.push(id);
        let node = self.manager().read_page(id)?;
        if !node.is_leaf() {
            for i in 0..node.nkeys() {
                self.collect_pages(node.ptr(i), ids)?;
            }
        }
        Ok(())
    }

    /// Number of live keys across all leaves.
    pub fn key_count(&self) -> Result<u64> {
        if self.root_page().is_nil() {
            return Ok(0);
        }
        self.count_keys(self.root_page())
    }

    fn count_keys(&self, id: PageId) -> Result<u64> {
        let node = self.manager().read_page(id)?;
        if node.is_leaf() {
            return Ok(node.nkeys() as u64);
        }
        let mut total = 0;
        for i in 0..node.nkeys() {
            total += self.count_keys(node.ptr(i))?;
        }
        Ok(total)
    }
}

//! Storage layer: the page-manager seam.
//!
//! The tree does not own storage. It is constructed with a [`PageManager`]
//! supplying the three operations the copy-on-write protocol consumes:
//! fetch a page by id, register a new page, and release a page that became
//! unreachable. Durability, free-list management and transaction boundaries
//! all live behind this trait.

mod memory;

pub use memory::MemoryPageManager;

use crate::error::Result;
use crate::page::Node;
use crate::types::PageId;

/// Capability set the tree consumes for page storage.
///
/// The contract the core relies on:
///
/// - `read_page` returns exactly the bytes most recently registered under
///   `id`; the core never mutates what it reads.
/// - `create_page` issues an id not currently in use and takes ownership of
///   the node; the core never touches that page again except through
///   `read_page`.
/// - `delete_page` marks the id unreachable; the core never references it
///   afterwards.
///
/// During a mutation the core always registers a replacement page before
/// releasing the page it replaces, so an implementation observes a
/// consistent reachable set at every call boundary.
pub trait PageManager: Send + Sync {
    /// Fetch the page registered under `id`.
    fn read_page(&self, id: PageId) -> Result<Node>;

    /// Register a new page and return its fresh, non-zero id.
    fn create_page(&self, node: Node) -> Result<PageId>;

    /// Release a page that is no longer reachable.
    fn delete_page(&self, id: PageId) -> Result<()>;
}

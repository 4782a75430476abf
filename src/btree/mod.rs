//! B+ tree layer: the copy-on-write tree driver.
//!
//! Operations walk from the root to a leaf, build edited copies bottom-up
//! through the page codec, and rebalance on the way back out: oversized
//! pages split into up to three shards, underfull pages merge with a
//! sibling. No live page is ever modified; the page manager is told about
//! every replacement before the page it replaces is released.

mod tree;
mod verify;

pub use tree::BTree;

//! Error types for the index.

use crate::types::PageId;
use thiserror::Error;

/// Result type alias for tree operations
pub type Result<T> = std::result::Result<T, TreeError>;

/// Errors that can occur in the tree or its page manager
#[derive(Error, Debug)]
pub enum TreeError {
    /// Keys must hold at least one byte
    #[error("Key is empty")]
    EmptyKey,

    /// Key exceeds the fixed on-page maximum
    #[error("Key too large: {size} bytes (max: {max})")]
    KeyTooLarge { size: usize, max: usize },

    /// Value exceeds the fixed on-page maximum
    #[error("Value too large: {size} bytes (max: {max})")]
    ValueTooLarge { size: usize, max: usize },

    /// Requested page was not held by the page manager
    #[error("Page {0} not found")]
    PageNotFound(PageId),

    /// A structural invariant does not hold
    #[error("Corruption detected: {0}")]
    Corruption(String),
}

impl TreeError {
    /// Create a corruption error with a message
    pub fn corruption(msg: impl Into<String>) -> Self {
        Self::Corruption(msg.into())
    }
}

//! Error types for store operations.

use thiserror::Error;

/// Error produced by an action body.
///
/// Returned to the dispatch caller unchanged inside [`StoreError::Action`].
pub type ActionError = Box<dyn std::error::Error + Send + Sync>;

/// Main error type for store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Action not found: {0}")]
    ActionNotFound(String),

    #[error("Selector not found: {0}")]
    SelectorNotFound(String),

    #[error("Key not found: {0}")]
    KeyNotFound(String),

    #[error("Action already exists: {0}")]
    ActionExists(String),

    #[error("Selector already exists: {0}")]
    SelectorExists(String),

    #[error("Action is asynchronous and must be dispatched with dispatch_async: {0}")]
    AsyncAction(String),

    #[error("Deserialization error: {0}")]
    Deserialization(String),

    #[error(transparent)]
    Action(#[from] ActionError),
}

impl StoreError {
    /// True for lookups that referenced an unregistered action, selector, or key.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            StoreError::ActionNotFound(_)
                | StoreError::SelectorNotFound(_)
                | StoreError::KeyNotFound(_)
        )
    }
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

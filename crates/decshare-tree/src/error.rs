use thiserror::Error;

/// File tree errors.
#[derive(Debug, Error)]
pub enum TreeError {
    /// A node with this path already exists.
    #[error("path already exists: {0}")]
    DuplicatePath(String),

    /// No node with this id or path.
    #[error("not found: {0}")]
    NotFound(String),

    /// The parent of an insertion is not a directory.
    #[error("not a directory: {0}")]
    NotADirectory(String),

    /// Name is empty or contains a path separator.
    #[error("invalid name: {0:?}")]
    InvalidName(String),
}

/// Convenience result type for tree operations.
pub type TreeResult<T> = Result<T, TreeError>;

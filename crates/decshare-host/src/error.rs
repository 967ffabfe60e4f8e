use std::path::PathBuf;

use decshare_tree::TreeError;
use thiserror::Error;

/// Host mirror errors.
#[derive(Debug, Error)]
pub enum HostError {
    /// Native IO error wrapper.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The notification backend failed.
    #[error("watch error: {0}")]
    Watch(#[from] notify::Error),

    /// A path escapes the shared directory.
    #[error("path outside the shared directory: {0}")]
    OutsideRoot(PathBuf),

    /// Tree bookkeeping failed.
    #[error(transparent)]
    Tree(#[from] TreeError),
}

/// Convenience result type for host operations.
pub type HostResult<T> = Result<T, HostError>;

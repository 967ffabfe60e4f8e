use decshare_image::ImageError;
use decshare_tree::TreeError;
use thiserror::Error;

/// RT-11 codec errors.
#[derive(Debug, Error)]
pub enum Rt11Error {
    /// The on-disk structures are inconsistent. The tree built so far is
    /// informational only.
    #[error("filesystem fault: {0}")]
    Structural(String),

    /// Not enough free blocks or directory entries. Raised while planning,
    /// before anything is written.
    #[error("insufficient space: {0}")]
    Capacity(String),

    /// The name does not follow the 6.3 convention.
    #[error("invalid RT-11 file name: {0:?}")]
    InvalidName(String),

    /// The file cannot be written from the host.
    #[error("file is read-only: {0}")]
    ReadOnly(String),

    /// Image access failed.
    #[error(transparent)]
    Image(#[from] ImageError),

    /// Tree bookkeeping failed.
    #[error(transparent)]
    Tree(#[from] TreeError),
}

impl Rt11Error {
    /// True for faults in the on-disk structures.
    #[must_use]
    pub fn is_structural(&self) -> bool {
        matches!(self, Self::Structural(_))
    }

    /// True for insufficient-space errors.
    #[must_use]
    pub fn is_capacity(&self) -> bool {
        matches!(self, Self::Capacity(_))
    }
}

/// Convenience result type for RT-11 operations.
pub type Rt11Result<T> = Result<T, Rt11Error>;

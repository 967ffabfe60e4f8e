use decshare_host::HostError;
use decshare_image::ImageError;
use decshare_rt11::Rt11Error;
use decshare_tree::TreeError;
use thiserror::Error;

/// Synchronization errors.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Image access failed.
    #[error(transparent)]
    Image(#[from] ImageError),

    /// RT-11 codec failure.
    #[error(transparent)]
    Rt11(#[from] Rt11Error),

    /// Host mirror failure.
    #[error(transparent)]
    Host(#[from] HostError),

    /// Tree bookkeeping failed.
    #[error(transparent)]
    Tree(#[from] TreeError),

    /// The volume configuration is unusable.
    #[error("configuration error: {0}")]
    Config(String),

    /// The worker thread could not be started.
    #[error("failed to start sync worker: {0}")]
    Worker(std::io::Error),

    /// A thread panicked while holding the volume lock.
    #[error("volume lock poisoned")]
    Poisoned,
}

/// Convenience result type for synchronization.
pub type SyncResult<T> = Result<T, SyncError>;

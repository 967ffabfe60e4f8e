use thiserror::Error;

/// Errors raised by image streams and partitions.
#[derive(Debug, Error)]
pub enum ImageError {
    /// Native IO error wrapper.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The image stream was used after `close()`.
    #[error("image is not open")]
    Closed,

    /// A partition does not start or end on a sector boundary.
    #[error("partition offset {offset} is not aligned to sector size {sector_size}")]
    Unaligned {
        /// Byte offset of the partition.
        offset: u64,
        /// Sector size of the drive.
        sector_size: usize,
    },

    /// A block range lies outside the partition.
    #[error("block range {start}+{count} outside partition of {blocks} blocks")]
    OutOfRange {
        /// First requested block.
        start: u32,
        /// Number of requested blocks.
        count: u32,
        /// Number of blocks in the partition.
        blocks: u32,
    },

    /// The interleave pattern or geometry is inconsistent.
    #[error("invalid interleave: {0}")]
    InvalidInterleave(String),
}

/// Convenience result type for image operations.
pub type ImageResult<T> = Result<T, ImageError>;

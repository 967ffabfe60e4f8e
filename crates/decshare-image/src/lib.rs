//! decshare image layer.
//!
//! Provides the byte-stream abstraction over an emulated disk image and the
//! partition mapper that translates logical filesystem blocks into physical
//! sectors, honoring the sector interleave of floppy-style drives.
//!
//! # Example
//!
//! ```rust
//! use decshare_image::{MemoryImage, Partition};
//!
//! # fn main() -> Result<(), decshare_image::ImageError> {
//! let mut image = MemoryImage::new(16 * 512);
//! let partition = Partition::new("fs", 0, 16 * 512, 512, 512)?;
//! partition.set_blocks(&mut image, 3, b"hello")?;
//! let block = partition.get_blocks(&mut image, 3, 1)?;
//! assert_eq!(&block[..5], b"hello");
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

/// Image error types.
pub mod error;
/// Drive geometries and partition layouts for known DEC drive types.
pub mod geometry;
/// Sector interleave tables.
pub mod interleave;
/// Partitions with logical-block mapping and dirty tracking.
pub mod partition;
/// Byte-stream access to image files.
pub mod stream;

pub use error::{ImageError, ImageResult};
pub use geometry::{DriveGeometry, DriveType, InterleaveSpec, PartitionSpec, VolumeLayout};
pub use interleave::InterleaveTable;
pub use partition::Partition;
pub use stream::{FileImage, ImageStream, MemoryImage};

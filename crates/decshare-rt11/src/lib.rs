//! RT-11 filesystem codec.
//!
//! Parses an RT-11 volume held in a [`Partition`](decshare_image::Partition)
//! into a flat [`FileTree`](decshare_tree::FileTree) of [`Rt11File`]s and
//! renders such a tree back into a bit-exact volume image.
//!
//! # Volume layout
//!
//! ```text
//! block 0        boot block            ($BOOT.BLK)
//! block 1        home block            (identifiers, checksum)
//! blocks 2..=5   monitor               ($MONI.TOR)
//! blocks 6..     directory segments    (2 blocks each, linked list)
//! then           file data, contiguous, in directory order
//! ```
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use decshare_image::{MemoryImage, Partition};
//! use decshare_rt11::{Rt11Filesystem, Rt11Options};
//! use decshare_tree::{StreamKind, SystemClock};
//!
//! # fn main() -> Result<(), decshare_rt11::Rt11Error> {
//! let mut image = MemoryImage::new(0);
//! let mut partition = Partition::new("fs", 0, 100 * 512, 512, 512)?;
//! let mut fs = Rt11Filesystem::new(Rt11Options::default(), 100, Arc::new(SystemClock));
//! fs.write_stream("HELLO.TXT", StreamKind::Data, b"hi".to_vec(), None, false)?;
//! fs.render(&mut partition, &mut image)?;
//!
//! let mut copy = Rt11Filesystem::new(Rt11Options::default(), 100, Arc::new(SystemClock));
//! copy.parse(&mut partition, &mut image)?;
//! assert!(copy.file("HELLO.TXT").is_some());
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

/// Date word encoding.
pub mod date;
/// Directory segments and entries.
pub mod directory;
/// RT-11 error types.
pub mod error;
/// RT-11 files and names.
pub mod file;
/// Filesystem parse, render and change detection.
pub mod filesystem;
/// Home block codec.
pub mod home;
/// Directory and free-space layout planning.
pub mod layout;
/// Radix-50 text encoding.
pub mod radix50;
/// Volume information text and directory listings.
pub mod report;

pub use error::{Rt11Error, Rt11Result};
pub use file::{InternalKind, Rt11File, Rt11Name};
pub use filesystem::{Rt11Filesystem, Rt11Options};
pub use home::HomeBlock;
pub use layout::Layout;

/// Bytes per RT-11 block.
pub const BLOCK_SIZE: usize = 512;

/// Read a little-endian PDP-11 word.
pub(crate) fn get_word(buf: &[u8], offset: usize) -> u16 {
    let bytes = &buf[offset..];
    u16::from_le_bytes([bytes[0], bytes[1]])
}

/// Store a little-endian PDP-11 word.
pub(crate) fn put_word(buf: &mut [u8], offset: usize, value: u16) {
    buf[offset..][..2].copy_from_slice(&value.to_le_bytes());
}

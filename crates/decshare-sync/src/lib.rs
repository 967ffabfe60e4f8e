//! Synchronization of a DEC volume image with a host directory.
//!
//! A [`SharedVolume`] owns the image, the RT-11 view of it and the host
//! mirror behind one mutex. The emulated device reads and writes the image
//! through [`SharedVolume::read`] and [`SharedVolume::write`]; a background
//! worker runs the synchronization tick on a fixed interval:
//!
//! ```text
//! 1. poll host notifications            -> host event queue
//! 2. host settled, device settled       -> apply host events to the RT-11
//!    and no undiffed device writes         tree, render the image
//! 3. device writes settled, or rendered -> re-parse the image, diff against
//!                                          the last snapshot -> DEC queue
//! 4. drain the DEC queue                -> write/delete host files
//! ```
//!
//! Echoes are suppressed with ack filters: a change applied to one side is
//! acknowledged on that side's queue so the notification it causes is not
//! sent back.

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

/// Sync error types.
pub mod error;
/// Tick timing options.
pub mod options;
/// The synchronization tick.
pub mod orchestrator;
/// The shared volume and its worker thread.
pub mod volume;

pub use error::{SyncError, SyncResult};
pub use options::{ShareConfig, SyncOptions};
pub use orchestrator::{Orchestrator, TickReport};
pub use volume::SharedVolume;

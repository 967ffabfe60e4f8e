//! Host side of a shared volume.
//!
//! [`HostFilesystem`] mirrors a host directory into a
//! [`FileTree`](decshare_tree::FileTree) and turns filesystem notifications
//! into [`FileEvent`](decshare_tree::FileEvent)s. Every directory in the tree
//! has its own non-recursive watch.
//!
//! Notifications arrive in fragments: a new file is announced when it is
//! created and again when its writer closes it. The fragments are coalesced
//! with per-file pending flags so that a consumer sees one event per completed
//! change:
//!
//! ```text
//! create            -> node added, create pending, no event
//! modify (data)     -> modify pending, no event
//! close after write -> pending flag promoted to a create/modify event
//! attributes        -> modify event
//! remove / move out -> delete event (silent while create is pending)
//! move in           -> create event
//! ```

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

/// Notification classification.
pub mod change;
/// Host error types.
pub mod error;
/// The mirrored host directory.
pub mod filesystem;

pub use change::{HostChange, classify};
pub use error::{HostError, HostResult};
pub use filesystem::{HostFile, HostFilesystem};

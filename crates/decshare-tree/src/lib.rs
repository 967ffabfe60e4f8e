//! decshare file tree and change-event model.
//!
//! Both sides of a shared volume, the DEC filesystem held in the disk image
//! and the mirrored host directory, are represented as a [`FileTree`]: an
//! arena of nodes with a path index. Changes on either side are expressed as
//! [`FileEvent`]s flowing through an [`EventQueue`], whose [`AckFilter`]
//! suppresses echoes of changes that were just applied from the other side.
//!
//! DEC files carry up to three byte [`Stream`]s (data, prefix and directory
//! extension); the [`HasStreams`] capability exposes them to the generic
//! [`snapshot`](diff::snapshot) and [`diff`](diff::diff) machinery.

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

/// Clock abstraction used for settle windows.
pub mod clock;
/// Snapshot and two-direction tree diff.
pub mod diff;
/// Tree error types.
pub mod error;
/// Change events, event queues and ack filters.
pub mod event;
/// Directory-listing order rules.
pub mod sort;
/// DEC file streams.
pub mod stream;
/// Arena-backed file tree.
pub mod tree;

pub use clock::{Clock, ManualClock, SystemClock};
pub use diff::{diff, snapshot, stream_path, update_changed};
pub use error::{TreeError, TreeResult};
pub use event::{AckFilter, EventFile, EventKind, EventQueue, FileEvent};
pub use sort::{NameRule, SortRules};
pub use stream::{HasStreams, Stream, StreamKind};
pub use tree::{Directory, FileMeta, FileTree, Node, NodeId, NodeKind, join_path};

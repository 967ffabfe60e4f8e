use std::path::PathBuf;

use notify::event::{AccessKind, AccessMode, CreateKind, ModifyKind, RenameMode};
use notify::{Event, EventKind};

/// One normalized notification fragment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostChange {
    /// A file was created; its contents may still be written.
    CreateStarted(PathBuf),
    /// A directory was created.
    DirectoryCreated(PathBuf),
    /// File contents are being written.
    ModifyStarted(PathBuf),
    /// Attributes (times, permissions) changed.
    Attributes(PathBuf),
    /// A writer closed the file.
    CloseWrite(PathBuf),
    /// The path was removed.
    Removed(PathBuf),
    /// The path was moved away.
    MovedFrom(PathBuf),
    /// A path was moved in.
    MovedTo(PathBuf),
}

impl HostChange {
    /// The absolute path the change refers to.
    #[must_use]
    pub fn path(&self) -> &PathBuf {
        match self {
            Self::CreateStarted(p)
            | Self::DirectoryCreated(p)
            | Self::ModifyStarted(p)
            | Self::Attributes(p)
            | Self::CloseWrite(p)
            | Self::Removed(p)
            | Self::MovedFrom(p)
            | Self::MovedTo(p) => p,
        }
    }
}

/// Split a raw notification into normalized changes.
#[must_use]
pub fn classify(event: &Event) -> Vec<HostChange> {
    let paths = event.paths.iter().cloned();
    match event.kind {
        EventKind::Create(CreateKind::Folder) => paths.map(HostChange::DirectoryCreated).collect(),
        EventKind::Create(_) => paths
            .map(|p| {
                if p.is_dir() {
                    HostChange::DirectoryCreated(p)
                } else {
                    HostChange::CreateStarted(p)
                }
            })
            .collect(),
        EventKind::Modify(ModifyKind::Metadata(_)) => paths.map(HostChange::Attributes).collect(),
        EventKind::Modify(ModifyKind::Name(RenameMode::From)) => {
            paths.map(HostChange::MovedFrom).collect()
        },
        EventKind::Modify(ModifyKind::Name(RenameMode::To)) => {
            paths.map(HostChange::MovedTo).collect()
        },
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => {
            let mut out = Vec::new();
            let mut it = paths;
            if let Some(from) = it.next() {
                out.push(HostChange::MovedFrom(from));
            }
            out.extend(it.map(HostChange::MovedTo));
            out
        },
        EventKind::Modify(ModifyKind::Name(_)) => paths
            .map(|p| {
                if p.exists() {
                    HostChange::MovedTo(p)
                } else {
                    HostChange::MovedFrom(p)
                }
            })
            .collect(),
        EventKind::Modify(_) => paths.map(HostChange::ModifyStarted).collect(),
        EventKind::Access(AccessKind::Close(AccessMode::Write)) => {
            paths.map(HostChange::CloseWrite).collect()
        },
        EventKind::Remove(_) => paths.map(HostChange::Removed).collect(),
        EventKind::Access(_) | EventKind::Any | EventKind::Other => Vec::new(),
    }
}

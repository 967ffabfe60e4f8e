//! Change events exchanged between the DEC and host sides.

use std::collections::{HashMap, VecDeque};
use std::fmt;

use tracing::{debug, trace};

use crate::tree::FileMeta;

/// What happened to a path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// The path appeared.
    Create,
    /// Contents or attributes of the path changed.
    Modify,
    /// The path disappeared.
    Delete,
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Create => "create",
            Self::Modify => "modify",
            Self::Delete => "delete",
        })
    }
}

/// The touched file as seen by the producing side.
///
/// DEC-origin events carry the stream contents; host-origin events leave
/// `data` empty and the consumer reads the host file when applying.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventFile {
    /// Size, modification time and read-only flag at production time.
    pub meta: FileMeta,
    /// File contents, if captured.
    pub data: Option<Vec<u8>>,
}

/// One change to one host-relative path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEvent {
    /// Kind of change.
    pub kind: EventKind,
    /// Host-relative path, `/`-separated, starting with `/`.
    pub path: String,
    /// True if the path is a directory.
    pub is_dir: bool,
    /// The touched file; `None` for deletions.
    pub file: Option<EventFile>,
}

impl FileEvent {
    /// A create event.
    #[must_use]
    pub fn create(path: impl Into<String>, is_dir: bool, file: EventFile) -> Self {
        Self {
            kind: EventKind::Create,
            path: path.into(),
            is_dir,
            file: Some(file),
        }
    }

    /// A modify event.
    #[must_use]
    pub fn modify(path: impl Into<String>, is_dir: bool, file: EventFile) -> Self {
        Self {
            kind: EventKind::Modify,
            path: path.into(),
            is_dir,
            file: Some(file),
        }
    }

    /// A delete event.
    #[must_use]
    pub fn delete(path: impl Into<String>, is_dir: bool) -> Self {
        Self {
            kind: EventKind::Delete,
            path: path.into(),
            is_dir,
            file: None,
        }
    }
}

impl fmt::Display for FileEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let what = if self.is_dir { "dir" } else { "file" };
        write!(f, "{} {what} {}", self.kind, self.path)
    }
}

/// Multiset of paths whose events are echoes of a just-applied change.
#[derive(Debug, Clone, Default)]
pub struct AckFilter {
    paths: HashMap<String, usize>,
}

impl AckFilter {
    /// Create an empty filter.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one acknowledged change on `path`.
    pub fn ack(&mut self, path: impl Into<String>) {
        let count = self.paths.entry(path.into()).or_insert(0);
        *count = count.saturating_add(1);
    }

    /// True if `path` has at least one outstanding acknowledgement.
    #[must_use]
    pub fn contains(&self, path: &str) -> bool {
        self.paths.get(path).is_some_and(|c| *c > 0)
    }

    /// Number of acknowledgements recorded for `path`.
    #[must_use]
    pub fn count(&self, path: &str) -> usize {
        self.paths.get(path).copied().unwrap_or(0)
    }

    /// Number of distinct paths.
    #[must_use]
    pub fn len(&self) -> usize {
        self.paths.len()
    }

    /// True if no path is acknowledged.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    /// Forget every acknowledgement.
    pub fn clear(&mut self) {
        self.paths.clear();
    }
}

/// FIFO of produced events with echo suppression.
#[derive(Debug, Clone)]
pub struct EventQueue {
    side: &'static str,
    events: VecDeque<FileEvent>,
    ack: AckFilter,
}

impl EventQueue {
    /// Create an empty queue; `side` labels log output.
    #[must_use]
    pub fn new(side: &'static str) -> Self {
        Self {
            side,
            events: VecDeque::new(),
            ack: AckFilter::new(),
        }
    }

    /// Queue an event unless its path is acknowledged. Returns whether it
    /// was queued.
    pub fn push(&mut self, event: FileEvent) -> bool {
        if self.ack.contains(&event.path) {
            trace!(side = self.side, event = %event, "Suppressed acknowledged event");
            return false;
        }
        debug!(side = self.side, event = %event, "Queued event");
        self.events.push_back(event);
        true
    }

    /// Take the oldest event.
    pub fn pop(&mut self) -> Option<FileEvent> {
        self.events.pop_front()
    }

    /// Take every queued event in order.
    pub fn drain(&mut self) -> Vec<FileEvent> {
        self.events.drain(..).collect()
    }

    /// Queued events, oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &FileEvent> {
        self.events.iter()
    }

    /// Drop queued events matching `predicate`; returns how many were removed.
    pub fn discard(&mut self, mut predicate: impl FnMut(&FileEvent) -> bool) -> usize {
        let before = self.events.len();
        self.events.retain(|e| !predicate(e));
        before.saturating_sub(self.events.len())
    }

    /// Number of queued events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// True if nothing is queued.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Acknowledge a path: future events for it are suppressed until
    /// [`clear_acks`](Self::clear_acks).
    pub fn ack(&mut self, path: impl Into<String>) {
        self.ack.ack(path);
    }

    /// The ack filter.
    #[must_use]
    pub fn ack_filter(&self) -> &AckFilter {
        &self.ack
    }

    /// Forget every acknowledgement.
    pub fn clear_acks(&mut self) {
        self.ack.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file() -> EventFile {
        EventFile {
            meta: FileMeta::default(),
            data: None,
        }
    }

    #[test]
    fn test_fifo_order() {
        let mut q = EventQueue::new("test");
        q.push(FileEvent::create("/a", false, file()));
        q.push(FileEvent::delete("/b", false));
        assert_eq!(q.len(), 2);
        assert_eq!(q.pop().unwrap().path, "/a");
        assert_eq!(q.pop().unwrap().kind, EventKind::Delete);
        assert!(q.pop().is_none());
    }

    #[test]
    fn test_acked_paths_are_suppressed_until_cleared() {
        let mut q = EventQueue::new("test");
        q.ack("/TEST.TXT");
        assert!(!q.push(FileEvent::modify("/TEST.TXT", false, file())));
        assert!(!q.push(FileEvent::modify("/TEST.TXT", false, file())));
        assert!(q.push(FileEvent::modify("/OTHER.TXT", false, file())));
        q.clear_acks();
        assert!(q.push(FileEvent::modify("/TEST.TXT", false, file())));
        assert_eq!(q.len(), 2);
    }

    #[test]
    fn test_ack_filter_is_multiset() {
        let mut f = AckFilter::new();
        f.ack("/x");
        f.ack("/x");
        assert_eq!(f.count("/x"), 2);
        assert_eq!(f.len(), 1);
        assert!(!f.contains("/y"));
    }

    #[test]
    fn test_discard() {
        let mut q = EventQueue::new("test");
        q.push(FileEvent::create("/a", false, file()));
        q.push(FileEvent::create("/b", false, file()));
        assert_eq!(q.discard(|e| e.path == "/a"), 1);
        assert_eq!(q.drain().len(), 1);
        assert!(q.is_empty());
    }

    #[test]
    fn test_display() {
        assert_eq!(FileEvent::delete("/d", true).to_string(), "delete dir /d");
    }
}

use tracing::debug;

use crate::event::{EventFile, FileEvent};
use crate::stream::{HasStreams, Stream, StreamKind};
use crate::tree::{FileMeta, FileTree, Node};

/// Metadata-only copy of a tree: streams keep position and size but drop
/// their payload.
#[must_use]
pub fn snapshot<T: HasStreams>(tree: &FileTree<T>) -> FileTree<T> {
    tree.map_files(HasStreams::without_data)
}

/// Set each stream's `changed` flag from a block dirty map without
/// re-parsing. Returns the number of streams flagged.
pub fn update_changed<T: HasStreams>(
    tree: &mut FileTree<T>,
    block_size: usize,
    is_dirty: impl Fn(u32, u32) -> bool,
) -> usize {
    let mut flagged = 0usize;
    for id in tree.walk() {
        let Some(file) = tree
            .get_mut(id)
            .and_then(Node::file_mut)
            .filter(|f| f.is_block_backed())
        else {
            continue;
        };
        for kind in StreamKind::ALL {
            if let Some(stream) = file.stream_mut(kind) {
                let blocks = stream.block_count(block_size);
                if blocks > 0 && is_dirty(stream.start_block, blocks) {
                    stream.changed = true;
                    flagged = flagged.saturating_add(1);
                }
            }
        }
    }
    flagged
}

/// Host-visible path of a stream of the file at `path`.
#[must_use]
pub fn stream_path(path: &str, stream: &Stream) -> String {
    format!("{path}{}", stream.kind.host_suffix())
}

fn event_file(meta: &FileMeta, stream: &Stream) -> EventFile {
    EventFile {
        meta: FileMeta {
            size: stream.size as u64,
            mtime: meta.mtime,
            readonly: meta.readonly,
        },
        data: Some(stream.data.clone()),
    }
}

fn stream_modified(old_meta: &FileMeta, old: &Stream, new_meta: &FileMeta, new: &Stream) -> bool {
    old.changed
        || old.size != new.size
        || old_meta.mtime != new_meta.mtime
        || old_meta.readonly != new_meta.readonly
}

/// Events turning `old` into `new`.
///
/// Two directed passes over the stream paths: `old → new` yields deletions
/// for streams that vanished and modifications for streams whose `changed`
/// flag, size, date or read-only flag differ; `new → old` yields creations.
/// Modifications are only detected in the first pass, so each stream gets at
/// most one event.
#[must_use]
pub fn diff<T: HasStreams>(old: &FileTree<T>, new: &FileTree<T>) -> Vec<FileEvent> {
    let mut events = Vec::new();

    for (_, old_node, old_file) in old.iter_files() {
        let new_node = new.get_path(old_node.path());
        for old_stream in old_file.streams() {
            let path = stream_path(old_node.path(), old_stream);
            let new_stream = new_node.and_then(|n| n.file().map(|f| (n, f))).and_then(
                |(n, f)| f.stream(old_stream.kind).map(|s| (n, s)),
            );
            match new_stream {
                None => events.push(FileEvent::delete(path, false)),
                Some((n, s)) if stream_modified(&old_node.meta, old_stream, &n.meta, s) => {
                    events.push(FileEvent::modify(path, false, event_file(&n.meta, s)));
                },
                Some(_) => {},
            }
        }
    }

    for (_, new_node, new_file) in new.iter_files() {
        let old_file = old.get_path(new_node.path()).and_then(Node::file);
        for new_stream in new_file.streams() {
            if old_file.and_then(|f| f.stream(new_stream.kind)).is_none() {
                let path = stream_path(new_node.path(), new_stream);
                events.push(FileEvent::create(
                    path,
                    false,
                    event_file(&new_node.meta, new_stream),
                ));
            }
        }
    }

    debug!(count = events.len(), "Computed tree diff");
    events
}

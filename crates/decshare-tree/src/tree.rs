use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use chrono::NaiveDateTime;
use tracing::trace;

use crate::clock::Clock;
use crate::error::{TreeError, TreeResult};
use crate::sort::SortRules;

/// Stable index of a node inside one [`FileTree`].
///
/// Ids are only meaningful for the tree that issued them; a removed node's
/// slot may be reused by a later insertion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

/// Metadata shared by files and directories.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileMeta {
    /// Size in bytes.
    pub size: u64,
    /// Last modification time, local wall clock.
    pub mtime: NaiveDateTime,
    /// Read-only flag.
    pub readonly: bool,
}

/// Children of a directory node.
#[derive(Debug, Clone, Default)]
pub struct Directory {
    /// Sub-directories, in listing order.
    pub dirs: Vec<NodeId>,
    /// Files, in listing order.
    pub files: Vec<NodeId>,
}

/// A node is either a file carrying a payload or a directory.
#[derive(Debug, Clone)]
pub enum NodeKind<T> {
    /// File with filesystem-specific payload.
    File(T),
    /// Directory owning its children.
    Directory(Directory),
}

/// One file or directory.
#[derive(Debug, Clone)]
pub struct Node<T> {
    name: String,
    path: String,
    parent: Option<NodeId>,
    /// Size, modification time and read-only flag.
    pub meta: FileMeta,
    /// File payload or directory children.
    pub kind: NodeKind<T>,
}

impl<T> Node<T> {
    /// Name within the parent directory; empty for the root.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Absolute path within the tree, `/`-separated, root is `/`.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Parent directory, `None` for the root.
    #[must_use]
    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    /// True for directories.
    #[must_use]
    pub fn is_dir(&self) -> bool {
        matches!(self.kind, NodeKind::Directory(_))
    }

    /// File payload, `None` for directories.
    #[must_use]
    pub fn file(&self) -> Option<&T> {
        match &self.kind {
            NodeKind::File(f) => Some(f),
            NodeKind::Directory(_) => None,
        }
    }

    /// Mutable file payload, `None` for directories.
    pub fn file_mut(&mut self) -> Option<&mut T> {
        match &mut self.kind {
            NodeKind::File(f) => Some(f),
            NodeKind::Directory(_) => None,
        }
    }

    /// Directory children, `None` for files.
    #[must_use]
    pub fn directory(&self) -> Option<&Directory> {
        match &self.kind {
            NodeKind::Directory(d) => Some(d),
            NodeKind::File(_) => None,
        }
    }
}

/// Hierarchical file tree with a path index.
///
/// Nodes live in an arena and refer to their parent by [`NodeId`], so
/// removing a subtree can never leave a dangling parent reference. Every
/// structural change sets the coarse `changed` flag and stamps it with the
/// tree's clock.
#[derive(Debug, Clone)]
pub struct FileTree<T> {
    nodes: Vec<Option<Node<T>>>,
    free: Vec<usize>,
    index: HashMap<String, NodeId>,
    root: NodeId,
    changed: bool,
    changed_at: Option<Instant>,
    clock: Arc<dyn Clock>,
}

/// Join a directory path and a child name.
#[must_use]
pub fn join_path(dir: &str, name: &str) -> String {
    if dir == "/" {
        format!("/{name}")
    } else {
        format!("{dir}/{name}")
    }
}

impl<T> FileTree<T> {
    /// Create a tree holding only the root directory.
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        let root = Node {
            name: String::new(),
            path: "/".to_owned(),
            parent: None,
            meta: FileMeta::default(),
            kind: NodeKind::Directory(Directory::default()),
        };
        let mut index = HashMap::new();
        index.insert("/".to_owned(), NodeId(0));
        Self {
            nodes: vec![Some(root)],
            free: Vec::new(),
            index,
            root: NodeId(0),
            changed: false,
            changed_at: None,
            clock,
        }
    }

    /// The root directory.
    #[must_use]
    pub fn root(&self) -> NodeId {
        self.root
    }

    /// Clock used for change timestamps.
    #[must_use]
    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Borrow a node.
    #[must_use]
    pub fn get(&self, id: NodeId) -> Option<&Node<T>> {
        self.nodes.get(id.0).and_then(Option::as_ref)
    }

    /// Mutably borrow a node. Path and parent stay fixed.
    pub fn get_mut(&mut self, id: NodeId) -> Option<&mut Node<T>> {
        self.nodes.get_mut(id.0).and_then(Option::as_mut)
    }

    /// Look a node up by path.
    #[must_use]
    pub fn lookup(&self, path: &str) -> Option<NodeId> {
        self.index.get(path).copied()
    }

    /// Borrow a node by path.
    #[must_use]
    pub fn get_path(&self, path: &str) -> Option<&Node<T>> {
        self.lookup(path).and_then(|id| self.get(id))
    }

    /// Number of nodes, root included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.index.len()
    }

    /// True if only the root exists.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.index.len() <= 1
    }

    /// Set the changed flag and stamp it.
    pub fn mark_changed(&mut self) {
        self.changed = true;
        self.changed_at = Some(self.clock.now());
    }

    /// True if anything changed since the last [`reset_changed`](Self::reset_changed).
    #[must_use]
    pub fn is_changed(&self) -> bool {
        self.changed
    }

    /// When the tree last changed, if ever.
    #[must_use]
    pub fn changed_at(&self) -> Option<Instant> {
        self.changed_at
    }

    /// Clear the changed flag; the timestamp is kept.
    pub fn reset_changed(&mut self) {
        self.changed = false;
    }

    fn insert(
        &mut self,
        parent: NodeId,
        name: &str,
        meta: FileMeta,
        kind: NodeKind<T>,
    ) -> TreeResult<NodeId> {
        if name.is_empty() || name.contains('/') || name == "." || name == ".." {
            return Err(TreeError::InvalidName(name.to_owned()));
        }
        let parent_path = match self.get(parent) {
            Some(node) if node.is_dir() => node.path.clone(),
            Some(node) => return Err(TreeError::NotADirectory(node.path.clone())),
            None => return Err(TreeError::NotFound(format!("node {}", parent.0))),
        };
        let path = join_path(&parent_path, name);
        if self.index.contains_key(&path) {
            return Err(TreeError::DuplicatePath(path));
        }

        let is_dir = matches!(kind, NodeKind::Directory(_));
        let node = Node {
            name: name.to_owned(),
            path: path.clone(),
            parent: Some(parent),
            meta,
            kind,
        };
        let id = if let Some(slot) = self.free.pop() {
            self.nodes[slot] = Some(node);
            NodeId(slot)
        } else {
            self.nodes.push(Some(node));
            NodeId(self.nodes.len().saturating_sub(1))
        };
        self.index.insert(path, id);

        if let Some(Node {
            kind: NodeKind::Directory(dir),
            ..
        }) = self.nodes[parent.0].as_mut()
        {
            if is_dir {
                dir.dirs.push(id);
            } else {
                dir.files.push(id);
            }
        }
        self.mark_changed();
        Ok(id)
    }

    /// Add a file below `parent`.
    ///
    /// # Errors
    ///
    /// Fails if `parent` is not a directory, the name is invalid, or the path
    /// already exists.
    pub fn add_file(
        &mut self,
        parent: NodeId,
        name: &str,
        meta: FileMeta,
        file: T,
    ) -> TreeResult<NodeId> {
        self.insert(parent, name, meta, NodeKind::File(file))
    }

    /// Add an empty directory below `parent`.
    ///
    /// # Errors
    ///
    /// Fails if `parent` is not a directory, the name is invalid, or the path
    /// already exists.
    pub fn add_directory(
        &mut self,
        parent: NodeId,
        name: &str,
        meta: FileMeta,
    ) -> TreeResult<NodeId> {
        self.insert(parent, name, meta, NodeKind::Directory(Directory::default()))
    }

    /// Remove a file, or a directory together with its whole subtree.
    ///
    /// # Errors
    ///
    /// Fails if the node does not exist or is the root.
    pub fn remove(&mut self, id: NodeId) -> TreeResult<()> {
        let parent = self
            .get(id)
            .ok_or_else(|| TreeError::NotFound(format!("node {}", id.0)))?
            .parent
            .ok_or_else(|| TreeError::InvalidName("/".to_owned()))?;
        if let Some(Node {
            kind: NodeKind::Directory(dir),
            ..
        }) = self.nodes[parent.0].as_mut()
        {
            dir.dirs.retain(|c| *c != id);
            dir.files.retain(|c| *c != id);
        }
        self.free_subtree(id);
        self.mark_changed();
        Ok(())
    }

    /// Remove every child of a directory, leaving it empty.
    ///
    /// # Errors
    ///
    /// Fails if the node does not exist or is not a directory.
    pub fn clear(&mut self, dir: NodeId) -> TreeResult<()> {
        let children = match self.get_mut(dir).map(|n| &mut n.kind) {
            Some(NodeKind::Directory(d)) => {
                let mut all = std::mem::take(&mut d.dirs);
                all.append(&mut d.files);
                all
            },
            Some(NodeKind::File(_)) => {
                return Err(TreeError::NotADirectory(format!("node {}", dir.0)));
            },
            None => return Err(TreeError::NotFound(format!("node {}", dir.0))),
        };
        for child in children {
            self.free_subtree(child);
        }
        self.mark_changed();
        Ok(())
    }

    /// Deregister and free a node and all its descendants.
    fn free_subtree(&mut self, id: NodeId) {
        let Some(node) = self.nodes.get_mut(id.0).and_then(Option::take) else {
            return;
        };
        if let NodeKind::Directory(dir) = &node.kind {
            for child in dir.dirs.iter().chain(dir.files.iter()) {
                self.free_subtree(*child);
            }
        }
        trace!(path = %node.path, "Released tree node");
        self.index.remove(&node.path);
        self.free.push(id.0);
    }

    /// Files directly inside a directory, in listing order.
    #[must_use]
    pub fn files(&self, dir: NodeId) -> &[NodeId] {
        self.get(dir)
            .and_then(Node::directory)
            .map_or(&[], |d| d.files.as_slice())
    }

    /// Sub-directories directly inside a directory, in listing order.
    #[must_use]
    pub fn subdirs(&self, dir: NodeId) -> &[NodeId] {
        self.get(dir)
            .and_then(Node::directory)
            .map_or(&[], |d| d.dirs.as_slice())
    }

    /// All nodes below the root in pre-order: a directory precedes its
    /// contents, files precede sub-directories.
    #[must_use]
    pub fn walk(&self) -> Vec<NodeId> {
        let mut out = Vec::new();
        self.walk_into(self.root, &mut out);
        out
    }

    fn walk_into(&self, dir: NodeId, out: &mut Vec<NodeId>) {
        out.extend_from_slice(self.files(dir));
        for sub in self.subdirs(dir) {
            out.push(*sub);
            self.walk_into(*sub, out);
        }
    }

    /// Every file node with its payload, in walk order.
    pub fn iter_files(&self) -> impl Iterator<Item = (NodeId, &Node<T>, &T)> + '_ {
        self.walk()
            .into_iter()
            .filter_map(move |id| self.get(id).and_then(|n| n.file().map(|f| (id, n, f))))
    }

    /// Find or create every directory along `path`, returning the last one.
    ///
    /// # Errors
    ///
    /// Fails if a path component exists as a file.
    pub fn ensure_directory(&mut self, path: &str) -> TreeResult<NodeId> {
        let mut current = self.root;
        for part in path.split('/').filter(|p| !p.is_empty()) {
            let parent_path = self.get(current).map(|n| n.path.clone()).unwrap_or_default();
            let child_path = join_path(&parent_path, part);
            current = match self.lookup(&child_path) {
                Some(id) if self.get(id).is_some_and(Node::is_dir) => id,
                Some(_) => return Err(TreeError::NotADirectory(child_path)),
                None => self.add_directory(current, part, FileMeta::default())?,
            };
        }
        Ok(current)
    }

    /// Order the files of a directory by (sort group, name) and its
    /// sub-directories by name.
    pub fn sort(&mut self, dir: NodeId, rules: &SortRules) {
        let mut files = self.files(dir).to_vec();
        let mut dirs = self.subdirs(dir).to_vec();
        let key = |tree: &Self, id: &NodeId| {
            let name = tree.get(*id).map(|n| n.name.clone()).unwrap_or_default();
            (rules.group(&name), name)
        };
        files.sort_by_cached_key(|id| key(self, id));
        dirs.sort_by_cached_key(|id| key(self, id).1);
        if let Some(Node {
            kind: NodeKind::Directory(d),
            ..
        }) = self.get_mut(dir)
        {
            d.files = files;
            d.dirs = dirs;
        }
    }

    /// Copy the tree, transforming every file payload. Node ids, paths,
    /// metadata and order are preserved.
    #[must_use]
    pub fn map_files<U>(&self, mut f: impl FnMut(&T) -> U) -> FileTree<U> {
        let nodes = self
            .nodes
            .iter()
            .map(|slot| {
                slot.as_ref().map(|n| Node {
                    name: n.name.clone(),
                    path: n.path.clone(),
                    parent: n.parent,
                    meta: n.meta.clone(),
                    kind: match &n.kind {
                        NodeKind::File(t) => NodeKind::File(f(t)),
                        NodeKind::Directory(d) => NodeKind::Directory(d.clone()),
                    },
                })
            })
            .collect();
        FileTree {
            nodes,
            free: self.free.clone(),
            index: self.index.clone(),
            root: self.root,
            changed: self.changed,
            changed_at: self.changed_at,
            clock: Arc::clone(&self.clock),
        }
    }
}

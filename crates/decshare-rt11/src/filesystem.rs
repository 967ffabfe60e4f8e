use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{NaiveDateTime, NaiveTime, Timelike};
use decshare_image::{ImageStream, Partition};
use decshare_tree::{
    Clock, FileMeta, FileTree, Node, NodeId, SortRules, Stream, StreamKind, TreeError, join_path,
};
use tracing::{debug, info, warn};

use crate::directory::{
    DirEntry, E_EOS, E_MPTY, E_PERM, E_PRE, E_READ, E_TENT, HEADER_BYTES, MAX_EXTRA_BYTES,
    MAX_SEGMENTS, SEGMENT_BLOCKS, SEGMENT_BYTES, SegmentHeader, entries_per_segment, entry_size,
    segment_block,
};
use crate::error::{Rt11Error, Rt11Result};
use crate::file::{InternalKind, Rt11File, Rt11Name};
use crate::home::{FIRST_DIR_BLOCK, HOME_BLOCK, HomeBlock};
use crate::layout::Layout;
use crate::{BLOCK_SIZE, date, put_word, report};

/// Largest volume an RT-11 directory can address.
pub const MAX_BLOCKS: u32 = 65535;

/// Largest prefix: its block count is stored in one byte.
const MAX_PREFIX_BLOCKS: u32 = 255;

/// Settings applied when formatting and rendering a volume.
#[derive(Debug, Clone)]
pub struct Rt11Options {
    /// Volume identification for newly formatted volumes.
    pub volume_id: String,
    /// Owner name for newly formatted volumes.
    pub owner_name: String,
    /// System identification for newly formatted volumes.
    pub system_id: String,
    /// Minimum extra bytes per directory entry.
    pub extra_bytes: u16,
    /// Synthesize `$VOLUM.INF`.
    pub volume_info: bool,
    /// Directory listing order.
    pub sort_rules: SortRules,
}

impl Default for Rt11Options {
    fn default() -> Self {
        Self {
            volume_id: crate::home::DEFAULT_VOLUME_ID.to_owned(),
            owner_name: String::new(),
            system_id: crate::home::DEFAULT_SYSTEM_ID.to_owned(),
            extra_bytes: 0,
            volume_info: true,
            sort_rules: SortRules::new(),
        }
    }
}

impl Rt11Options {
    fn home_block(&self) -> HomeBlock {
        HomeBlock::new(&self.volume_id, &self.owner_name, &self.system_id)
    }
}

/// An RT-11 volume as a flat file tree.
///
/// The tree is the live view: [`parse`](Self::parse) replaces it from the
/// image, [`render`](Self::render) writes it back. Between the two, files are
/// changed through [`write_stream`](Self::write_stream) and
/// [`delete_stream`](Self::delete_stream), which reject changes the volume
/// cannot hold.
#[derive(Debug)]
pub struct Rt11Filesystem {
    options: Rt11Options,
    block_count: u32,
    tree: FileTree<Rt11File>,
    home: Option<HomeBlock>,
    layout: Option<Layout>,
    fault: Option<String>,
    tentative_blocks: u32,
    /// Last `$VOLUM.INF` text and the time it first appeared.
    volume_info_stamp: Option<(String, NaiveDateTime)>,
    /// Files written through the API since the last parse or render.
    rewritten: BTreeSet<String>,
}

impl Rt11Filesystem {
    /// Create an empty, unformatted filesystem for a volume of
    /// `block_count` blocks.
    #[must_use]
    pub fn new(options: Rt11Options, block_count: u32, clock: Arc<dyn Clock>) -> Self {
        if block_count > MAX_BLOCKS {
            warn!(
                blocks = block_count,
                max = MAX_BLOCKS,
                "Volume exceeds the RT-11 addressing limit, clamping"
            );
        }
        Self {
            options,
            block_count: block_count.min(MAX_BLOCKS),
            tree: FileTree::new(clock),
            home: None,
            layout: None,
            fault: None,
            tentative_blocks: 0,
            volume_info_stamp: None,
            rewritten: BTreeSet::new(),
        }
    }

    /// Blocks addressed by the filesystem.
    #[must_use]
    pub fn block_count(&self) -> u32 {
        self.block_count
    }

    /// Settings in effect.
    #[must_use]
    pub fn options(&self) -> &Rt11Options {
        &self.options
    }

    /// The file tree.
    #[must_use]
    pub fn tree(&self) -> &FileTree<Rt11File> {
        &self.tree
    }

    /// Mutable access to the file tree.
    pub fn tree_mut(&mut self) -> &mut FileTree<Rt11File> {
        &mut self.tree
    }

    /// Home block of the last parsed or rendered volume; `None` while
    /// unformatted.
    #[must_use]
    pub fn home(&self) -> Option<&HomeBlock> {
        self.home.as_ref()
    }

    /// Directory layout of the last parsed or rendered volume.
    #[must_use]
    pub fn layout(&self) -> Option<&Layout> {
        self.layout.as_ref()
    }

    /// True once a home block was parsed or rendered.
    #[must_use]
    pub fn is_formatted(&self) -> bool {
        self.home.is_some()
    }

    /// Description of the structural fault found by the last parse.
    #[must_use]
    pub fn fault(&self) -> Option<&str> {
        self.fault.as_deref()
    }

    /// Free blocks according to the last parse or render.
    #[must_use]
    pub fn free_blocks(&self) -> u32 {
        self.layout.map_or(0, |l| l.free_blocks)
    }

    /// Blocks held by tentative entries at the last parse.
    #[must_use]
    pub fn tentative_blocks(&self) -> u32 {
        self.tentative_blocks
    }

    /// The file with this host name, internal files included.
    #[must_use]
    pub fn file(&self, name: &str) -> Option<&Rt11File> {
        self.tree.get_path(&join_path("/", name)).and_then(Node::file)
    }

    /// Files with a directory entry, in directory order.
    pub fn user_files(&self) -> impl Iterator<Item = (&Node<Rt11File>, &Rt11File)> + '_ {
        self.tree
            .iter_files()
            .filter(|(_, _, f)| f.internal.is_none())
            .map(|(_, n, f)| (n, f))
    }

    /// Replace the tree with the contents of the image.
    ///
    /// Clears the partition's dirty map. On a structural fault the files
    /// decoded so far stay in the tree, [`fault`](Self::fault) describes the
    /// problem, and the error is returned.
    ///
    /// # Errors
    ///
    /// Returns [`Rt11Error::Structural`] for inconsistent on-disk structures
    /// and [`Rt11Error::Image`] if the image cannot be read.
    pub fn parse(
        &mut self,
        partition: &mut Partition,
        image: &mut dyn ImageStream,
    ) -> Rt11Result<()> {
        let root = self.tree.root();
        self.tree.clear(root)?;
        self.home = None;
        self.layout = None;
        self.fault = None;
        self.tentative_blocks = 0;
        self.rewritten.clear();

        let result = self.parse_volume(partition, image);
        partition.clear_dirty();
        match &result {
            Err(err) if err.is_structural() => {
                warn!(error = %err, "RT-11 filesystem fault");
                self.fault = Some(err.to_string());
            },
            Err(_) => {},
            Ok(()) => debug!(
                files = self.user_files().count(),
                free = self.free_blocks(),
                "Parsed RT-11 volume"
            ),
        }
        self.refresh_volume_info();
        result
    }

    fn parse_volume(
        &mut self,
        partition: &Partition,
        image: &mut dyn ImageStream,
    ) -> Rt11Result<()> {
        if partition.block_count() < FIRST_DIR_BLOCK {
            return Err(Rt11Error::Structural(format!(
                "partition of {} blocks is too small",
                partition.block_count()
            )));
        }
        let block = partition.get_blocks(image, HOME_BLOCK, 1)?;
        let Some(home) = HomeBlock::decode(&block)? else {
            return Ok(());
        };
        self.home = Some(home);
        self.load_internal(partition, image)?;
        self.parse_directory(partition, image)
    }

    fn load_internal(
        &mut self,
        partition: &Partition,
        image: &mut dyn ImageStream,
    ) -> Rt11Result<()> {
        for kind in [InternalKind::Boot, InternalKind::Monitor] {
            let Some((start, count)) = kind.blocks() else {
                continue;
            };
            let data = partition.get_blocks(image, start, count)?;
            if data.iter().all(|b| *b == 0) {
                continue;
            }
            let meta = FileMeta {
                size: data.len() as u64,
                mtime: date::epoch().and_time(NaiveTime::MIN),
                readonly: false,
            };
            let root = self.tree.root();
            self.tree
                .add_file(root, kind.file_name(), meta, Rt11File::internal(kind, data))?;
        }
        Ok(())
    }

    // Offsets are checked against the segment and blocks against the
    // volume before they are used.
    #[allow(clippy::arithmetic_side_effects)]
    fn parse_directory(
        &mut self,
        partition: &Partition,
        image: &mut dyn ImageStream,
    ) -> Rt11Result<()> {
        let mut visited = [false; MAX_SEGMENTS as usize + 1];
        let mut number: u16 = 1;
        let mut total_segments = 0u16;
        let mut extra_bytes = 0u16;
        let mut used_segments = 0u16;
        let mut used_blocks = 0u32;
        let mut free_blocks = 0u32;
        let mut file_count = 0usize;

        while number != 0 {
            if visited.get(usize::from(number)).copied().unwrap_or(true) {
                return Err(Rt11Error::Structural(format!(
                    "directory segment chain revisits segment {number}"
                )));
            }
            visited[usize::from(number)] = true;
            used_segments += 1;

            let first = segment_block(number);
            if first + SEGMENT_BLOCKS > self.block_count.min(partition.block_count()) {
                return Err(Rt11Error::Structural(format!(
                    "directory segment {number} lies beyond the volume"
                )));
            }
            let segment = partition.get_blocks(image, first, SEGMENT_BLOCKS)?;
            let header = SegmentHeader::decode(&segment);
            header.validate(number)?;
            if number == 1 {
                total_segments = header.total_segments;
                extra_bytes = header.extra_bytes;
            } else if header.total_segments != total_segments || header.extra_bytes != extra_bytes {
                return Err(Rt11Error::Structural(format!(
                    "directory segment {number} header disagrees with segment 1"
                )));
            }
            if number > total_segments {
                return Err(Rt11Error::Structural(format!(
                    "directory segment {number} beyond the {total_segments} allocated"
                )));
            }

            let size = entry_size(extra_bytes);
            let mut block = u32::from(header.data_block);
            let mut offset = HEADER_BYTES;
            loop {
                if offset + 2 > SEGMENT_BYTES {
                    return Err(Rt11Error::Structural(format!(
                        "directory segment {number} has no end-of-segment marker"
                    )));
                }
                if crate::get_word(&segment, offset) & E_EOS != 0 {
                    break;
                }
                if offset + size > SEGMENT_BYTES {
                    return Err(Rt11Error::Structural(format!(
                        "directory segment {number} entries overflow the segment"
                    )));
                }
                let entry = DirEntry::decode(&segment, offset, extra_bytes);
                let length = u32::from(entry.length);
                if block + length > self.block_count {
                    return Err(Rt11Error::Structural(format!(
                        "directory segment {number}: entry at block {block} runs past the end of \
                         the volume"
                    )));
                }
                if entry.is_permanent() {
                    self.add_entry(partition, image, &entry, block)?;
                    used_blocks += length;
                    file_count += 1;
                } else if entry.is_empty_area() {
                    free_blocks += length;
                } else if entry.is_tentative() {
                    debug!(block, length, "Skipping tentative entry");
                    self.tentative_blocks += length;
                    used_blocks += length;
                } else {
                    warn!(status = entry.status, block, "Unknown directory entry status");
                    used_blocks += length;
                }
                block += length;
                offset += size;
            }
            number = header.next_segment;
        }

        self.layout = Some(Layout {
            block_count: self.block_count,
            total_segments,
            used_segments,
            extra_bytes,
            entries_per_segment: entries_per_segment(extra_bytes),
            file_count,
            used_blocks,
            free_blocks,
        });
        Ok(())
    }

    #[allow(clippy::arithmetic_side_effects)] // the prefix never exceeds the entry length
    fn add_entry(
        &mut self,
        partition: &Partition,
        image: &mut dyn ImageStream,
        entry: &DirEntry,
        block: u32,
    ) -> Rt11Result<()> {
        let name = Rt11Name::from_words(entry.name);
        if name.basename.is_empty() {
            warn!(block, "Directory entry without a name, skipping");
            return Ok(());
        }
        let host_name = name.to_string();
        let length = u32::from(entry.length);

        let mut prefix = None;
        let mut data_start = block;
        if entry.status & E_PRE != 0 && length > 0 {
            let first = partition.get_blocks(image, block, 1)?;
            let count = u32::from(first[0]);
            if count == 0 || count > length {
                warn!(
                    file = %host_name,
                    count,
                    length,
                    "Invalid prefix block count, ignoring prefix"
                );
            } else {
                let blocks = partition.get_blocks(image, block, count)?;
                let mut stream = Stream::new(StreamKind::Prefix, blocks);
                stream.start_block = block;
                prefix = Some(stream);
                data_start += count;
            }
        }

        let data_blocks = length - (data_start - block);
        let mut data = Stream::new(
            StreamKind::Data,
            partition.get_blocks(image, data_start, data_blocks)?,
        );
        data.start_block = data_start;

        let dirext = entry
            .extra
            .iter()
            .any(|b| *b != 0)
            .then(|| Stream::new(StreamKind::DirExt, entry.extra.clone()));

        let day = date::decode(entry.date).unwrap_or_else(|| {
            warn!(file = %host_name, word = entry.date, "Invalid date word");
            date::epoch()
        });
        let meta = FileMeta {
            size: data.size as u64,
            mtime: day.and_time(NaiveTime::MIN),
            readonly: entry.status & E_READ != 0,
        };
        let file = Rt11File {
            name,
            status: entry.status,
            internal: None,
            data,
            prefix,
            dirext,
        };
        let root = self.tree.root();
        match self.tree.add_file(root, &host_name, meta, file) {
            Ok(_) => Ok(()),
            Err(TreeError::DuplicatePath(path)) => {
                warn!(path = %path, "Duplicate directory entry, keeping the first");
                Ok(())
            },
            Err(err) => Err(err.into()),
        }
    }

    /// Plan the directory for the current tree.
    ///
    /// # Errors
    ///
    /// Returns [`Rt11Error::Capacity`] if the files do not fit.
    pub fn plan_layout(&self) -> Rt11Result<Layout> {
        let mut extra_bytes = self
            .options
            .extra_bytes
            .max(self.layout.map_or(0, |l| l.extra_bytes));
        let mut blocks = Vec::new();
        for (node, file) in self.user_files() {
            let total = file.total_blocks();
            if total > u32::from(u16::MAX) {
                return Err(Rt11Error::Capacity(format!(
                    "{} needs {total} blocks, an entry holds at most {}",
                    node.path(),
                    u16::MAX
                )));
            }
            if file.prefix_blocks() > MAX_PREFIX_BLOCKS {
                return Err(Rt11Error::Capacity(format!(
                    "{} prefix exceeds {MAX_PREFIX_BLOCKS} blocks",
                    node.path()
                )));
            }
            if let Some(dirext) = &file.dirext {
                let needed = u16::try_from(dirext.size.next_multiple_of(2))
                    .ok()
                    .filter(|n| *n <= MAX_EXTRA_BYTES)
                    .ok_or_else(|| {
                        Rt11Error::Capacity(format!(
                            "{} directory extension exceeds {MAX_EXTRA_BYTES} bytes",
                            node.path()
                        ))
                    })?;
                extra_bytes = extra_bytes.max(needed);
            }
            blocks.push(total);
        }
        let preferred = self
            .layout
            .filter(|l| l.extra_bytes == extra_bytes)
            .map(|l| l.total_segments);
        Layout::plan(self.block_count, &blocks, extra_bytes, preferred)
    }

    /// Write the tree into the image.
    ///
    /// Boot, home and monitor blocks are written first, then the directory,
    /// then every file contiguously in tree order. Afterwards the partition's
    /// dirty map holds exactly the blocks of files written since the last
    /// parse or render, so the next diff reports them like guest writes.
    ///
    /// # Errors
    ///
    /// Returns [`Rt11Error::Capacity`] before anything is written if the
    /// tree does not fit, or [`Rt11Error::Image`] on write failure.
    pub fn render(
        &mut self,
        partition: &mut Partition,
        image: &mut dyn ImageStream,
    ) -> Rt11Result<()> {
        let layout = self.plan_layout()?;
        let home = self.home.clone().unwrap_or_else(|| self.options.home_block());
        partition.clear_dirty();

        for kind in [InternalKind::Boot, InternalKind::Monitor] {
            let Some((start, count)) = kind.blocks() else {
                continue;
            };
            let mut area = self
                .file(kind.file_name())
                .map(|f| f.data.data.clone())
                .unwrap_or_default();
            area.resize((count as usize).saturating_mul(BLOCK_SIZE), 0);
            if self.rewritten.contains(kind.file_name()) {
                partition.write_blocks(image, start, &area)?;
            } else {
                partition.set_blocks(image, start, &area)?;
            }
        }
        partition.set_blocks(image, HOME_BLOCK, &home.encode())?;

        let entries = self.assign_blocks(&layout);
        partition.set_blocks(image, FIRST_DIR_BLOCK, &encode_directory(&layout, &entries))?;

        for (node, file) in self.user_files() {
            let rewritten = self.rewritten.contains(node.name());
            let mut write = |start: u32, data: &[u8]| {
                if rewritten {
                    partition.write_blocks(image, start, data)
                } else {
                    partition.set_blocks(image, start, data)
                }
            };
            if let Some(prefix) = &file.prefix {
                let mut bytes = prefix.data.clone();
                if let Some(first) = bytes.first_mut() {
                    *first = u8::try_from(file.prefix_blocks()).unwrap_or(u8::MAX);
                }
                write(prefix.start_block, &bytes)?;
            }
            if !file.data.data.is_empty() {
                write(file.data.start_block, &file.data.data)?;
            }
        }

        self.rewritten.clear();
        info!(
            files = layout.file_count,
            segments = layout.total_segments,
            free = layout.free_blocks,
            "Rendered RT-11 volume"
        );
        self.home = Some(home);
        self.layout = Some(layout);
        self.fault = None;
        self.refresh_volume_info();
        Ok(())
    }

    /// Place every user file after the directory and build its entry. The
    /// last entry is the free area.
    fn assign_blocks(&mut self, layout: &Layout) -> Vec<DirEntry> {
        let mut block = layout.data_start();
        let mut entries = Vec::with_capacity(layout.file_count.saturating_add(1));
        let ids: Vec<NodeId> = self.tree.files(self.tree.root()).to_vec();
        for id in ids {
            let Some(node) = self.tree.get_mut(id) else {
                continue;
            };
            let mtime = node.meta.mtime;
            let readonly = node.meta.readonly;
            let Some(file) = node.file_mut().filter(|f| f.internal.is_none()) else {
                continue;
            };
            let prefix_blocks = file.prefix_blocks();
            if let Some(prefix) = file.prefix.as_mut() {
                prefix.start_block = block;
            }
            file.data.start_block = block.saturating_add(prefix_blocks);
            let total = file.total_blocks();
            block = block.saturating_add(total);

            let mut status = file.status & !(E_PRE | E_READ | E_TENT | E_MPTY | E_EOS);
            status |= E_PERM;
            if prefix_blocks > 0 {
                status |= E_PRE;
            }
            if readonly {
                status |= E_READ;
            }
            file.status = status;
            entries.push(DirEntry {
                status,
                name: file.name.to_words(),
                length: u16::try_from(total).unwrap_or(u16::MAX),
                channel: 0,
                date: date::encode(mtime.date()),
                extra: file.dirext.as_ref().map(|d| d.data.clone()).unwrap_or_default(),
            });
        }
        entries.push(DirEntry::empty(
            u16::try_from(layout.free_blocks).unwrap_or(u16::MAX),
            layout.extra_bytes,
        ));
        entries
    }

    /// Write an empty volume: fresh home block, empty directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the volume is too small or cannot be written.
    pub fn format(
        &mut self,
        partition: &mut Partition,
        image: &mut dyn ImageStream,
    ) -> Rt11Result<()> {
        let root = self.tree.root();
        self.tree.clear(root)?;
        self.home = Some(self.options.home_block());
        self.layout = None;
        self.render(partition, image)
    }

    /// Create or replace one stream of a file.
    ///
    /// For data streams `mtime` (day precision, default today) and
    /// `readonly` become the file's attributes. Writing a prefix or
    /// directory extension of a missing file creates it empty.
    ///
    /// # Errors
    ///
    /// Returns [`Rt11Error::InvalidName`] for names outside the 6.3
    /// convention, [`Rt11Error::ReadOnly`] for `$VOLUM.INF`, and
    /// [`Rt11Error::Capacity`] if the volume could not hold the result; the
    /// tree is left unchanged on error.
    pub fn write_stream(
        &mut self,
        name: &str,
        kind: StreamKind,
        data: Vec<u8>,
        mtime: Option<NaiveDateTime>,
        readonly: bool,
    ) -> Rt11Result<()> {
        if let Some(internal) = InternalKind::from_file_name(name) {
            return self.write_internal(internal, kind, data);
        }
        let parsed: Rt11Name = name.parse()?;
        let path = join_path("/", name);
        let mtime = mtime
            .unwrap_or_else(|| self.tree.clock().local_now())
            .date()
            .and_time(NaiveTime::MIN);

        if let Some(id) = self.tree.lookup(&path) {
            let Some(node) = self.tree.get_mut(id) else {
                return Err(TreeError::NotFound(path).into());
            };
            let saved_meta = node.meta.clone();
            let Some(file) = node.file_mut() else {
                return Err(TreeError::NotFound(path).into());
            };
            let saved_file = file.clone();
            file.set_stream(kind, data);
            let size = file.data.size as u64;
            if kind == StreamKind::Data {
                node.meta = FileMeta {
                    size,
                    mtime,
                    readonly,
                };
            }
            if let Err(err) = self.plan_layout() {
                if let Some(node) = self.tree.get_mut(id) {
                    node.meta = saved_meta;
                    if let Some(file) = node.file_mut() {
                        *file = saved_file;
                    }
                }
                return Err(err);
            }
            self.tree.mark_changed();
        } else {
            let mut file = Rt11File::new(parsed, Vec::new());
            file.set_stream(kind, data);
            let meta = FileMeta {
                size: file.data.size as u64,
                mtime,
                readonly: readonly && kind == StreamKind::Data,
            };
            let root = self.tree.root();
            let id = self.tree.add_file(root, name, meta, file)?;
            if let Err(err) = self.plan_layout() {
                self.tree.remove(id)?;
                return Err(err);
            }
        }
        self.rewritten.insert(name.to_owned());
        debug!(path = %path, stream = %kind, "Updated RT-11 file stream");
        Ok(())
    }

    fn write_internal(
        &mut self,
        internal: InternalKind,
        kind: StreamKind,
        data: Vec<u8>,
    ) -> Rt11Result<()> {
        let name = internal.file_name();
        let Some((_, count)) = internal.blocks() else {
            return Err(Rt11Error::ReadOnly(name.to_owned()));
        };
        if kind != StreamKind::Data {
            return Err(Rt11Error::InvalidName(format!("{name}{}", kind.host_suffix())));
        }
        if data.len() > (count as usize).saturating_mul(BLOCK_SIZE) {
            return Err(Rt11Error::Capacity(format!(
                "{name} holds at most {count} blocks"
            )));
        }
        let path = join_path("/", name);
        if let Some(id) = self.tree.lookup(&path) {
            self.tree.remove(id)?;
        }
        let meta = FileMeta {
            size: data.len() as u64,
            mtime: date::epoch().and_time(NaiveTime::MIN),
            readonly: false,
        };
        let root = self.tree.root();
        self.tree
            .add_file(root, name, meta, Rt11File::internal(internal, data))?;
        self.rewritten.insert(name.to_owned());
        Ok(())
    }

    /// Remove one stream of a file; removing the data stream removes the
    /// whole file. Returns false if there was nothing to remove.
    ///
    /// # Errors
    ///
    /// Returns [`Rt11Error::ReadOnly`] for `$VOLUM.INF`.
    pub fn delete_stream(&mut self, name: &str, kind: StreamKind) -> Rt11Result<bool> {
        if InternalKind::from_file_name(name) == Some(InternalKind::VolumeInfo) {
            return Err(Rt11Error::ReadOnly(name.to_owned()));
        }
        let path = join_path("/", name);
        let Some(id) = self.tree.lookup(&path) else {
            return Ok(false);
        };
        let removed = match kind {
            StreamKind::Data => {
                self.tree.remove(id)?;
                self.rewritten.remove(name);
                true
            },
            StreamKind::Prefix | StreamKind::DirExt => {
                let taken = self
                    .tree
                    .get_mut(id)
                    .and_then(Node::file_mut)
                    .and_then(|f| {
                        if kind == StreamKind::Prefix {
                            f.prefix.take()
                        } else {
                            f.dirext.take()
                        }
                    })
                    .is_some();
                if taken {
                    self.tree.mark_changed();
                }
                taken
            },
        };
        if removed {
            debug!(path = %path, stream = %kind, "Removed RT-11 file stream");
        }
        Ok(removed)
    }

    /// Order the directory by the configured sort rules.
    pub fn sort(&mut self) {
        let root = self.tree.root();
        self.tree.sort(root, &self.options.sort_rules);
    }

    /// Regenerate `$VOLUM.INF` from the current state.
    pub fn refresh_volume_info(&mut self) {
        let path = join_path("/", InternalKind::VolumeInfo.file_name());
        if let Some(id) = self.tree.lookup(&path)
            && let Err(err) = self.tree.remove(id)
        {
            warn!(error = %err, "Failed to drop stale volume information");
        }
        if !self.options.volume_info {
            return;
        }
        let text = report::volume_info(self);
        let mtime = match &self.volume_info_stamp {
            Some((previous, mtime)) if *previous == text => *mtime,
            _ => {
                let now = self.tree.clock().local_now();
                let mtime = now.with_nanosecond(0).unwrap_or(now);
                self.volume_info_stamp = Some((text.clone(), mtime));
                mtime
            },
        };
        let text = text.into_bytes();
        let meta = FileMeta {
            size: text.len() as u64,
            mtime,
            readonly: true,
        };
        let root = self.tree.root();
        let file = Rt11File::internal(InternalKind::VolumeInfo, text);
        if let Err(err) = self
            .tree
            .add_file(root, InternalKind::VolumeInfo.file_name(), meta, file)
        {
            warn!(error = %err, "Failed to add volume information");
        }
    }
}

/// Lay out the directory segments for `entries`, the last of which is the
/// free area.
#[allow(clippy::arithmetic_side_effects)] // the layout was planned to hold every entry
fn encode_directory(layout: &Layout, entries: &[DirEntry]) -> Vec<u8> {
    let mut dir = vec![0u8; layout.directory_blocks() as usize * BLOCK_SIZE];
    let size = entry_size(layout.extra_bytes);
    let mut data_block = layout.data_start();
    for (index, chunk) in entries.chunks(layout.entries_per_segment).enumerate() {
        let number = u16::try_from(index + 1).unwrap_or(MAX_SEGMENTS);
        let segment = &mut dir[index * SEGMENT_BYTES..(index + 1) * SEGMENT_BYTES];
        SegmentHeader {
            total_segments: layout.total_segments,
            next_segment: if number < layout.used_segments { number + 1 } else { 0 },
            highest_segment: layout.used_segments,
            extra_bytes: layout.extra_bytes,
            data_block: u16::try_from(data_block).unwrap_or(u16::MAX),
        }
        .encode(segment);
        let mut offset = HEADER_BYTES;
        for entry in chunk {
            entry.encode(segment, offset, layout.extra_bytes);
            offset += size;
            data_block += u32::from(entry.length);
        }
        put_word(segment, offset, E_EOS);
    }
    dir
}

#[cfg(test)]
#[allow(clippy::arithmetic_side_effects)]
mod tests {
    use std::time::Duration;

    use chrono::NaiveDate;
    use decshare_image::MemoryImage;
    use decshare_tree::{HasStreams, ManualClock, diff, snapshot, update_changed};

    use super::*;
    use crate::get_word;

    fn volume(blocks: u32) -> (Partition, MemoryImage) {
        let partition = Partition::new("rt11", 0, u64::from(blocks) * 512, 512, 512).unwrap();
        (partition, MemoryImage::new(blocks as usize * 512))
    }

    fn options() -> Rt11Options {
        Rt11Options {
            volume_info: false,
            ..Rt11Options::default()
        }
    }

    fn fs(blocks: u32) -> Rt11Filesystem {
        Rt11Filesystem::new(options(), blocks, Arc::new(ManualClock::new()))
    }

    fn day(y: i32, m: u32, d: u32) -> Option<NaiveDateTime> {
        NaiveDate::from_ymd_opt(y, m, d).map(|d| d.and_time(NaiveTime::MIN))
    }

    fn reparse(partition: &mut Partition, image: &mut MemoryImage, blocks: u32) -> Rt11Filesystem {
        let mut copy = fs(blocks);
        copy.parse(partition, image).unwrap();
        copy
    }

    #[test]
    fn test_unformatted_volume_is_empty() {
        let (mut partition, mut image) = volume(494);
        let mut fs = fs(494);
        fs.parse(&mut partition, &mut image).unwrap();
        assert!(!fs.is_formatted());
        assert!(fs.fault().is_none());
        assert_eq!(fs.user_files().count(), 0);
    }

    #[test]
    fn test_render_then_parse() {
        let (mut partition, mut image) = volume(494);
        let mut fs = fs(494);
        fs.write_stream("TEST.TXT", StreamKind::Data, vec![7; 1536], day(1985, 7, 14), false)
            .unwrap();
        fs.write_stream("RO.DAT", StreamKind::Data, vec![1; 100], day(2001, 1, 2), true)
            .unwrap();
        fs.render(&mut partition, &mut image).unwrap();

        let copy = reparse(&mut partition, &mut image, 494);
        assert!(copy.fault().is_none());
        let names: Vec<_> = copy.user_files().map(|(n, _)| n.name().to_owned()).collect();
        assert_eq!(names, ["TEST.TXT", "RO.DAT"]);

        let test = copy.tree().get_path("/TEST.TXT").unwrap();
        assert_eq!(test.meta.size, 1536);
        assert_eq!(test.meta.mtime, day(1985, 7, 14).unwrap());
        assert_eq!(test.file().unwrap().data.data, vec![7; 1536]);

        let ro = copy.tree().get_path("/RO.DAT").unwrap();
        assert!(ro.meta.readonly);
        // padded to a whole block
        assert_eq!(ro.meta.size, 512);
        assert_eq!(&ro.file().unwrap().data.data[..100], &[1; 100][..]);
    }

    #[test]
    fn test_free_space_accounting() {
        let (mut partition, mut image) = volume(494);
        let mut fs = fs(494);
        fs.write_stream("A.TXT", StreamKind::Data, vec![1; 512 * 10], None, false)
            .unwrap();
        fs.render(&mut partition, &mut image).unwrap();
        let layout = *fs.layout().unwrap();

        let copy = reparse(&mut partition, &mut image, 494);
        let parsed = copy.layout().unwrap();
        assert_eq!(parsed.free_blocks, layout.free_blocks);
        assert_eq!(parsed.total_segments, layout.total_segments);
        assert_eq!(
            parsed.used_blocks + parsed.free_blocks + parsed.directory_blocks(),
            494 - 6
        );
    }

    #[test]
    fn test_delete_restores_free_blocks() {
        let (mut partition, mut image) = volume(18);
        let mut fs = fs(18);
        fs.write_stream("TEST.TXT", StreamKind::Data, vec![1; 1536], None, false)
            .unwrap();
        fs.render(&mut partition, &mut image).unwrap();
        assert_eq!(fs.free_blocks(), 7);

        assert!(fs.delete_stream("TEST.TXT", StreamKind::Data).unwrap());
        fs.render(&mut partition, &mut image).unwrap();
        let copy = reparse(&mut partition, &mut image, 18);
        assert_eq!(copy.user_files().count(), 0);
        assert_eq!(copy.free_blocks(), 10);
    }

    #[test]
    fn test_capacity_rejected_before_write() {
        let (mut partition, mut image) = volume(18);
        let mut fs = fs(18);
        fs.render(&mut partition, &mut image).unwrap();
        let before = image.as_bytes().to_vec();

        let err = fs
            .write_stream("BIG.DAT", StreamKind::Data, vec![1; 512 * 11], None, false)
            .unwrap_err();
        assert!(err.is_capacity());
        assert!(fs.file("BIG.DAT").is_none());
        fs.render(&mut partition, &mut image).unwrap();
        assert_eq!(image.as_bytes(), &before[..]);

        // growing an existing file past the volume is rolled back
        fs.write_stream("SMALL.DAT", StreamKind::Data, vec![1; 512], None, false)
            .unwrap();
        let err = fs
            .write_stream("SMALL.DAT", StreamKind::Data, vec![1; 512 * 11], None, false)
            .unwrap_err();
        assert!(err.is_capacity());
        assert_eq!(fs.file("SMALL.DAT").unwrap().data.size, 512);
    }

    #[test]
    fn test_invalid_names_rejected() {
        let mut fs = fs(494);
        for name in ["lower.txt", "TOOLONG.TXT", "A.B.C"] {
            assert!(matches!(
                fs.write_stream(name, StreamKind::Data, vec![], None, false),
                Err(Rt11Error::InvalidName(_))
            ));
        }
    }

    #[test]
    fn test_prefix_and_dirext_streams() {
        let (mut partition, mut image) = volume(494);
        let mut fs = Rt11Filesystem::new(
            Rt11Options {
                extra_bytes: 2,
                ..options()
            },
            494,
            Arc::new(ManualClock::new()),
        );
        fs.write_stream("PROG.SAV", StreamKind::Data, vec![3; 1024], None, false)
            .unwrap();
        fs.write_stream("PROG.SAV", StreamKind::Prefix, vec![0xaa; 600], None, false)
            .unwrap();
        fs.write_stream("PROG.SAV", StreamKind::DirExt, vec![0x12, 0x34], None, false)
            .unwrap();
        fs.render(&mut partition, &mut image).unwrap();

        let copy = reparse(&mut partition, &mut image, 494);
        let f = copy.file("PROG.SAV").unwrap();
        let prefix = f.prefix.as_ref().unwrap();
        assert_eq!(prefix.data.len(), 1024);
        assert_eq!(prefix.data[0], 2, "first prefix byte holds the block count");
        assert_eq!(prefix.data[1], 0xaa);
        assert_eq!(f.data.data, vec![3; 1024]);
        assert_eq!(f.data.start_block, prefix.start_block + 2);
        assert_eq!(f.dirext.as_ref().unwrap().data, vec![0x12, 0x34]);
        assert_ne!(f.status & E_PRE, 0);
        assert_eq!(copy.layout().unwrap().extra_bytes, 2);
    }

    #[test]
    fn test_invalid_prefix_count_is_ignored() {
        let (mut partition, mut image) = volume(494);
        let mut fs = fs(494);
        fs.write_stream("P.DAT", StreamKind::Data, vec![3; 512], None, false)
            .unwrap();
        fs.write_stream("P.DAT", StreamKind::Prefix, vec![1; 512], None, false)
            .unwrap();
        fs.render(&mut partition, &mut image).unwrap();
        let start = fs.file("P.DAT").unwrap().start_block();
        // claim more prefix blocks than the file has
        let mut block = partition.get_blocks(&mut image, start, 1).unwrap();
        block[0] = 9;
        partition.set_blocks(&mut image, start, &block).unwrap();

        let copy = reparse(&mut partition, &mut image, 494);
        let f = copy.file("P.DAT").unwrap();
        assert!(f.prefix.is_none());
        assert_eq!(f.data.size, 1024);
    }

    #[test]
    fn test_boot_and_monitor_surface_when_nonzero() {
        let (mut partition, mut image) = volume(494);
        let mut fs = fs(494);
        fs.format(&mut partition, &mut image).unwrap();
        let copy = reparse(&mut partition, &mut image, 494);
        assert!(copy.file("$BOOT.BLK").is_none());
        assert!(copy.file("$MONI.TOR").is_none());

        fs.write_stream("$BOOT.BLK", StreamKind::Data, vec![0o240; 512], None, false)
            .unwrap();
        fs.render(&mut partition, &mut image).unwrap();
        let copy = reparse(&mut partition, &mut image, 494);
        let boot = copy.file("$BOOT.BLK").unwrap();
        assert_eq!(boot.internal, Some(InternalKind::Boot));
        assert_eq!(boot.data.data, vec![0o240; 512]);
        assert_eq!(copy.user_files().count(), 0);

        assert!(
            fs.write_stream("$MONI.TOR", StreamKind::Data, vec![1; 5 * 512], None, false)
                .unwrap_err()
                .is_capacity()
        );
    }

    #[test]
    fn test_volume_info_is_read_only() {
        let mut fs = Rt11Filesystem::new(Rt11Options::default(), 494, Arc::new(ManualClock::new()));
        fs.refresh_volume_info();
        let info = fs.tree().get_path("/$VOLUM.INF").unwrap();
        assert!(info.meta.readonly);
        assert!(matches!(
            fs.write_stream("$VOLUM.INF", StreamKind::Data, vec![], None, false),
            Err(Rt11Error::ReadOnly(_))
        ));
        assert!(matches!(
            fs.delete_stream("$VOLUM.INF", StreamKind::Data),
            Err(Rt11Error::ReadOnly(_))
        ));
    }

    #[test]
    fn test_volume_info_stable_across_parses() {
        let (mut partition, mut image) = volume(494);
        let clock = Arc::new(ManualClock::at(day(1985, 3, 1).unwrap()));
        let mut fs = Rt11Filesystem::new(Rt11Options::default(), 494, clock.clone());
        fs.format(&mut partition, &mut image).unwrap();
        fs.parse(&mut partition, &mut image).unwrap();
        let info = fs.tree().get_path("/$VOLUM.INF").unwrap();
        assert_eq!(Some(info.meta.mtime), day(1985, 3, 1));

        let snap = snapshot(fs.tree());
        clock.advance(Duration::from_secs(3_600));
        fs.parse(&mut partition, &mut image).unwrap();
        let events = diff(&snap, fs.tree());
        assert!(events.iter().all(|e| e.path != "/$VOLUM.INF"), "{events:?}");

        // new contents get a fresh date
        fs.write_stream("A.TXT", StreamKind::Data, vec![1; 512], None, false)
            .unwrap();
        fs.render(&mut partition, &mut image).unwrap();
        fs.parse(&mut partition, &mut image).unwrap();
        let info = fs.tree().get_path("/$VOLUM.INF").unwrap();
        assert_eq!(info.meta.mtime, clock.local_now());
    }

    #[test]
    fn test_undated_write_uses_clock_date() {
        let clock = Arc::new(ManualClock::at(
            NaiveDate::from_ymd_opt(1985, 3, 1).unwrap().and_hms_opt(12, 30, 0).unwrap(),
        ));
        let mut fs = Rt11Filesystem::new(options(), 494, clock);
        fs.write_stream("A.TXT", StreamKind::Data, vec![1; 512], None, false)
            .unwrap();
        let node = fs.tree().get_path("/A.TXT").unwrap();
        assert_eq!(Some(node.meta.mtime), day(1985, 3, 1));
    }

    #[test]
    fn test_checksum_mismatch_is_fault() {
        let (mut partition, mut image) = volume(494);
        fs(494).format(&mut partition, &mut image).unwrap();
        let mut home = partition.get_blocks(&mut image, 1, 1).unwrap();
        home[0o731] ^= 0x40;
        partition.set_blocks(&mut image, 1, &home).unwrap();

        let mut copy = fs(494);
        let err = copy.parse(&mut partition, &mut image).unwrap_err();
        assert!(err.is_structural());
        assert!(copy.fault().unwrap().contains("checksum"));
    }

    #[test]
    fn test_zero_checksum_tolerated() {
        let (mut partition, mut image) = volume(494);
        let mut fs = fs(494);
        fs.write_stream("A.TXT", StreamKind::Data, vec![1; 512], None, false)
            .unwrap();
        fs.render(&mut partition, &mut image).unwrap();
        let mut home = partition.get_blocks(&mut image, 1, 1).unwrap();
        put_word(&mut home, 0o776, 0);
        partition.set_blocks(&mut image, 1, &home).unwrap();

        let copy = reparse(&mut partition, &mut image, 494);
        assert!(copy.fault().is_none());
        assert!(copy.file("A.TXT").is_some());
    }

    #[test]
    fn test_broken_chain_keeps_partial_tree() {
        let (mut partition, mut image) = volume(494);
        let mut fs = fs(494);
        fs.write_stream("A.TXT", StreamKind::Data, vec![1; 512], None, false)
            .unwrap();
        fs.render(&mut partition, &mut image).unwrap();
        // segment 1 links to itself
        let mut seg = partition.get_blocks(&mut image, 6, 2).unwrap();
        let total = get_word(&seg, 0);
        assert!(total >= 1);
        put_word(&mut seg, 2, 1);
        partition.set_blocks(&mut image, 6, &seg).unwrap();

        let mut copy = self::fs(494);
        let err = copy.parse(&mut partition, &mut image).unwrap_err();
        assert!(err.is_structural());
        assert!(copy.fault().is_some());
        assert!(copy.file("A.TXT").is_some());
    }

    #[test]
    fn test_missing_end_marker_is_fault() {
        let (mut partition, mut image) = volume(494);
        fs(494).format(&mut partition, &mut image).unwrap();
        // fill segment 1 with permanent zero-length entries and no marker
        let mut seg = partition.get_blocks(&mut image, 6, 2).unwrap();
        let mut offset = HEADER_BYTES;
        while offset + 14 <= SEGMENT_BYTES {
            put_word(&mut seg, offset, E_MPTY);
            offset += 14;
        }
        partition.set_blocks(&mut image, 6, &seg).unwrap();
        let mut copy = fs(494);
        assert!(copy.parse(&mut partition, &mut image).unwrap_err().is_structural());
    }

    #[test]
    fn test_tentative_entries_skipped() {
        let (mut partition, mut image) = volume(494);
        let mut fs = fs(494);
        fs.write_stream("A.TXT", StreamKind::Data, vec![1; 512], None, false)
            .unwrap();
        fs.write_stream("B.TXT", StreamKind::Data, vec![2; 1024], None, false)
            .unwrap();
        fs.render(&mut partition, &mut image).unwrap();
        let mut seg = partition.get_blocks(&mut image, 6, 2).unwrap();
        // second entry becomes tentative
        put_word(&mut seg, HEADER_BYTES + 14, E_TENT);
        partition.set_blocks(&mut image, 6, &seg).unwrap();

        let copy = reparse(&mut partition, &mut image, 494);
        assert!(copy.file("A.TXT").is_some());
        assert!(copy.file("B.TXT").is_none());
        assert_eq!(copy.tentative_blocks(), 2);
        assert_eq!(copy.layout().unwrap().used_blocks, 3);
    }

    #[test]
    fn test_many_files_span_segments() {
        let (mut partition, mut image) = volume(2000);
        let mut fs = fs(2000);
        for i in 0..100 {
            fs.write_stream(&format!("F{i}.DAT"), StreamKind::Data, vec![1; 512], None, false)
                .unwrap();
        }
        fs.render(&mut partition, &mut image).unwrap();
        assert_eq!(fs.layout().unwrap().used_segments, 2);
        let copy = reparse(&mut partition, &mut image, 2000);
        assert_eq!(copy.user_files().count(), 100);
        assert!(copy.fault().is_none());
    }

    #[test]
    fn test_sort_orders_directory() {
        let (mut partition, mut image) = volume(494);
        let mut fs = Rt11Filesystem::new(
            Rt11Options {
                sort_rules: SortRules::parse(&["SWAP.SYS", "/\\.SYS$/"]).unwrap(),
                ..options()
            },
            494,
            Arc::new(ManualClock::new()),
        );
        for name in ["ZZ.TXT", "DL.SYS", "SWAP.SYS", "AA.TXT"] {
            fs.write_stream(name, StreamKind::Data, vec![1; 512], None, false)
                .unwrap();
        }
        fs.sort();
        fs.render(&mut partition, &mut image).unwrap();
        let copy = reparse(&mut partition, &mut image, 494);
        let names: Vec<_> = copy.user_files().map(|(n, _)| n.name().to_owned()).collect();
        assert_eq!(names, ["SWAP.SYS", "DL.SYS", "AA.TXT", "ZZ.TXT"]);
    }

    #[test]
    fn test_render_marks_rewritten_files_dirty() {
        let (mut partition, mut image) = volume(494);
        let mut fs = fs(494);
        fs.format(&mut partition, &mut image).unwrap();
        assert_eq!(partition.dirty_count(), 0);

        fs.write_stream("A.TXT", StreamKind::Data, vec![1; 512], None, false)
            .unwrap();
        fs.write_stream("B.TXT", StreamKind::Data, vec![2; 1024], None, false)
            .unwrap();
        fs.render(&mut partition, &mut image).unwrap();
        assert_eq!(partition.dirty_count(), 3);

        fs.parse(&mut partition, &mut image).unwrap();
        let a = fs.file("A.TXT").unwrap().data.start_block;
        let b = fs.file("B.TXT").unwrap().data.start_block;
        fs.write_stream("B.TXT", StreamKind::Data, vec![3; 1024], None, false)
            .unwrap();
        fs.render(&mut partition, &mut image).unwrap();
        assert!(!partition.is_dirty(a));
        assert!(partition.any_dirty(b, 2));
        assert_eq!(partition.dirty_count(), 2);
    }

    #[test]
    fn test_device_write_flags_stream() {
        let (mut partition, mut image) = volume(494);
        let mut fs = fs(494);
        fs.write_stream("A.TXT", StreamKind::Data, vec![1; 512], None, false)
            .unwrap();
        fs.write_stream("B.TXT", StreamKind::Data, vec![2; 512], None, false)
            .unwrap();
        fs.render(&mut partition, &mut image).unwrap();
        fs.parse(&mut partition, &mut image).unwrap();
        let mut snap = snapshot(fs.tree());

        // the guest rewrites B.TXT in place
        let start = fs.file("B.TXT").unwrap().data.start_block;
        partition.set_blocks(&mut image, start, &[9; 512]).unwrap();
        partition.mark_dirty(start, 1);
        let flagged = update_changed(&mut snap, BLOCK_SIZE, |s, c| partition.any_dirty(s, c));
        assert_eq!(flagged, 1);

        fs.parse(&mut partition, &mut image).unwrap();
        let events = diff(&snap, fs.tree());
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].path, "/B.TXT");
        assert_eq!(events[0].file.as_ref().unwrap().data.as_ref().unwrap(), &vec![9; 512]);
        assert!(!fs.file("B.TXT").unwrap().is_changed());
    }

    #[test]
    fn test_volume_clamped_to_addressing_limit() {
        let fs = fs(100_000);
        assert_eq!(fs.block_count(), MAX_BLOCKS);
    }
}

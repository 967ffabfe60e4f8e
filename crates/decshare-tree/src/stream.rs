use std::fmt;

/// Role of a stream within a DEC file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum StreamKind {
    /// Primary file contents.
    Data,
    /// Metadata blocks stored in front of the data.
    Prefix,
    /// Extra bytes stored inline in the directory entry.
    DirExt,
}

impl StreamKind {
    /// All stream kinds in host listing order.
    pub const ALL: [Self; 3] = [Self::Data, Self::Prefix, Self::DirExt];

    /// Suffix appended to the DEC file name to form the host file name.
    #[must_use]
    pub fn host_suffix(self) -> &'static str {
        match self {
            Self::Data => "",
            Self::Prefix => ".prefix",
            Self::DirExt => ".dirext",
        }
    }

    /// True if the stream is stored in the block area (and not inside the
    /// directory).
    #[must_use]
    pub fn occupies_blocks(self) -> bool {
        !matches!(self, Self::DirExt)
    }

    /// Split a host file name into the DEC file name and stream kind.
    ///
    /// `"FOO.BAR.prefix"` gives `("FOO.BAR", Prefix)`; a name without a known
    /// suffix is a data stream.
    #[must_use]
    pub fn split_host_name(name: &str) -> (&str, Self) {
        for kind in [Self::Prefix, Self::DirExt] {
            if let Some(base) = name.strip_suffix(kind.host_suffix())
                && !base.is_empty()
            {
                return (base, kind);
            }
        }
        (name, Self::Data)
    }
}

impl fmt::Display for StreamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Data => "data",
            Self::Prefix => "prefix",
            Self::DirExt => "dirext",
        })
    }
}

/// A span of bytes belonging to a DEC file.
///
/// A stream from a metadata snapshot keeps `size` and `start_block` but has
/// an empty `data` buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stream {
    /// Role of the stream.
    pub kind: StreamKind,
    /// First block on the volume; unused for directory extensions.
    pub start_block: u32,
    /// Length in bytes.
    pub size: usize,
    /// Contents, empty in snapshots.
    pub data: Vec<u8>,
    /// Set when a block owned by the stream was written since the last parse.
    pub changed: bool,
}

impl Stream {
    /// Create a stream holding `data`.
    #[must_use]
    pub fn new(kind: StreamKind, data: Vec<u8>) -> Self {
        Self {
            kind,
            start_block: 0,
            size: data.len(),
            data,
            changed: false,
        }
    }

    /// Copy without the payload.
    #[must_use]
    pub fn metadata_only(&self) -> Self {
        Self {
            kind: self.kind,
            start_block: self.start_block,
            size: self.size,
            data: Vec::new(),
            changed: self.changed,
        }
    }

    /// Blocks needed to store the stream, zero for directory extensions.
    #[must_use]
    pub fn block_count(&self, block_size: usize) -> u32 {
        if !self.kind.occupies_blocks() || block_size == 0 {
            return 0;
        }
        u32::try_from(self.size.div_ceil(block_size)).unwrap_or(u32::MAX)
    }
}

/// Capability of DEC-side files: a set of addressable streams.
pub trait HasStreams {
    /// The stream of the given kind, if populated.
    fn stream(&self, kind: StreamKind) -> Option<&Stream>;

    /// Mutable access to the stream of the given kind, if populated.
    fn stream_mut(&mut self, kind: StreamKind) -> Option<&mut Stream>;

    /// Copy of the file with every stream reduced to metadata.
    #[must_use]
    fn without_data(&self) -> Self
    where
        Self: Sized;

    /// False for synthesized files that have no blocks on the volume; their
    /// streams are never flagged from a dirty map.
    fn is_block_backed(&self) -> bool {
        true
    }

    /// Populated streams in [`StreamKind::ALL`] order.
    fn streams(&self) -> Vec<&Stream> {
        StreamKind::ALL
            .iter()
            .filter_map(|k| self.stream(*k))
            .collect()
    }

    /// Blocks occupied by all populated streams.
    fn block_count(&self, block_size: usize) -> u32 {
        self.streams()
            .iter()
            .map(|s| s.block_count(block_size))
            .fold(0u32, u32::saturating_add)
    }

    /// True if any stream was flagged as changed.
    fn is_changed(&self) -> bool {
        self.streams().iter().any(|s| s.changed)
    }
}

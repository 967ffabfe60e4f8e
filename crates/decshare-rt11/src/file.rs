use std::fmt;
use std::str::FromStr;

use decshare_tree::{HasStreams, Stream, StreamKind};

use crate::error::{Rt11Error, Rt11Result};
use crate::radix50;

/// A 6.3 file name: up to six characters, optional extension of up to three.
///
/// Only upper-case letters, digits and `$` are accepted, so a name maps to
/// exactly one host file name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Rt11Name {
    /// Base name, 1 to 6 characters.
    pub basename: String,
    /// Extension, 0 to 3 characters.
    pub extension: String,
}

fn valid_part(part: &str, max: usize) -> bool {
    part.len() <= max
        && part
            .chars()
            .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '$')
}

impl Rt11Name {
    /// Decode the three name words of a directory entry.
    #[must_use]
    pub fn from_words(words: [u16; 3]) -> Self {
        Self {
            basename: radix50::decode(&words[..2]),
            extension: radix50::decode(&words[2..]),
        }
    }

    /// Encode into the three name words of a directory entry.
    #[must_use]
    pub fn to_words(&self) -> [u16; 3] {
        let base = radix50::encode(&self.basename, 2);
        [base[0], base[1], radix50::encode_word(&self.extension)]
    }
}

impl FromStr for Rt11Name {
    type Err = Rt11Error;

    fn from_str(name: &str) -> Rt11Result<Self> {
        let (basename, extension) = name.split_once('.').unwrap_or((name, ""));
        if basename.is_empty()
            || !valid_part(basename, 6)
            || !valid_part(extension, 3)
            || (extension.is_empty() && name.ends_with('.'))
        {
            return Err(Rt11Error::InvalidName(name.to_owned()));
        }
        Ok(Self {
            basename: basename.to_owned(),
            extension: extension.to_owned(),
        })
    }
}

impl fmt::Display for Rt11Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.extension.is_empty() {
            f.write_str(&self.basename)
        } else {
            write!(f, "{}.{}", self.basename, self.extension)
        }
    }
}

/// Files synthesized from areas outside the directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InternalKind {
    /// Block 0.
    Boot,
    /// Blocks 2 to 5.
    Monitor,
    /// Generated volume statistics; not stored on the volume.
    VolumeInfo,
}

impl InternalKind {
    /// Every internal file.
    pub const ALL: [Self; 3] = [Self::Boot, Self::Monitor, Self::VolumeInfo];

    /// Host-visible name.
    #[must_use]
    pub fn file_name(self) -> &'static str {
        match self {
            Self::Boot => "$BOOT.BLK",
            Self::Monitor => "$MONI.TOR",
            Self::VolumeInfo => "$VOLUM.INF",
        }
    }

    /// The internal file with this name.
    #[must_use]
    pub fn from_file_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.file_name() == name)
    }

    /// First block and block count on the volume, `None` for generated
    /// files.
    #[must_use]
    pub fn blocks(self) -> Option<(u32, u32)> {
        match self {
            Self::Boot => Some((0, 1)),
            Self::Monitor => Some((2, 4)),
            Self::VolumeInfo => None,
        }
    }
}

/// Payload of an RT-11 file node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rt11File {
    /// Parsed name.
    pub name: Rt11Name,
    /// Directory status word; bits not interpreted here are kept.
    pub status: u16,
    /// Set for files synthesized outside the directory.
    pub internal: Option<InternalKind>,
    /// File contents.
    pub data: Stream,
    /// Prefix blocks, if any.
    pub prefix: Option<Stream>,
    /// Directory entry extra bytes, if any are non-zero.
    pub dirext: Option<Stream>,
}

impl Rt11File {
    /// A permanent file holding `data`.
    #[must_use]
    pub fn new(name: Rt11Name, data: Vec<u8>) -> Self {
        Self {
            name,
            status: crate::directory::E_PERM,
            internal: None,
            data: Stream::new(StreamKind::Data, data),
            prefix: None,
            dirext: None,
        }
    }

    /// An internal file.
    #[must_use]
    pub fn internal(kind: InternalKind, data: Vec<u8>) -> Self {
        let mut data = Stream::new(StreamKind::Data, data);
        data.start_block = kind.blocks().map_or(0, |(start, _)| start);
        let (basename, extension) = kind
            .file_name()
            .split_once('.')
            .unwrap_or((kind.file_name(), ""));
        Self {
            name: Rt11Name {
                basename: basename.to_owned(),
                extension: extension.to_owned(),
            },
            status: 0,
            internal: Some(kind),
            data,
            prefix: None,
            dirext: None,
        }
    }

    /// First block of the file, prefix included.
    #[must_use]
    pub fn start_block(&self) -> u32 {
        self.prefix
            .as_ref()
            .map_or(self.data.start_block, |p| p.start_block)
    }

    /// Blocks occupied by the prefix.
    #[must_use]
    pub fn prefix_blocks(&self) -> u32 {
        self.prefix
            .as_ref()
            .map_or(0, |p| p.block_count(crate::BLOCK_SIZE))
    }

    /// Blocks occupied in the data area.
    #[must_use]
    pub fn total_blocks(&self) -> u32 {
        HasStreams::block_count(self, crate::BLOCK_SIZE)
    }

    /// Replace or create a stream.
    pub fn set_stream(&mut self, kind: StreamKind, data: Vec<u8>) {
        let stream = Stream::new(kind, data);
        match kind {
            StreamKind::Data => self.data = stream,
            StreamKind::Prefix => self.prefix = Some(stream),
            StreamKind::DirExt => self.dirext = Some(stream),
        }
    }
}

impl HasStreams for Rt11File {
    fn stream(&self, kind: StreamKind) -> Option<&Stream> {
        match kind {
            StreamKind::Data => Some(&self.data),
            StreamKind::Prefix => self.prefix.as_ref(),
            StreamKind::DirExt => self.dirext.as_ref(),
        }
    }

    fn stream_mut(&mut self, kind: StreamKind) -> Option<&mut Stream> {
        match kind {
            StreamKind::Data => Some(&mut self.data),
            StreamKind::Prefix => self.prefix.as_mut(),
            StreamKind::DirExt => self.dirext.as_mut(),
        }
    }

    fn without_data(&self) -> Self {
        Self {
            name: self.name.clone(),
            status: self.status,
            internal: self.internal,
            data: self.data.metadata_only(),
            prefix: self.prefix.as_ref().map(Stream::metadata_only),
            dirext: self.dirext.as_ref().map(Stream::metadata_only),
        }
    }

    fn is_block_backed(&self) -> bool {
        self.internal != Some(InternalKind::VolumeInfo)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_names() {
        let n: Rt11Name = "TEST.TXT".parse().unwrap();
        assert_eq!(n.basename, "TEST");
        assert_eq!(n.extension, "TXT");
        assert_eq!(n.to_string(), "TEST.TXT");

        let n: Rt11Name = "SWAP$".parse().unwrap();
        assert_eq!(n.extension, "");
        assert_eq!(n.to_string(), "SWAP$");
    }

    #[test]
    fn test_reject_invalid_names() {
        for bad in ["", ".TXT", "TOOLONG.TXT", "A.LONG", "lower.txt", "A.B.C", "A-B.TXT", "A."] {
            assert!(bad.parse::<Rt11Name>().is_err(), "{bad}");
        }
    }

    #[test]
    fn test_words() {
        let n: Rt11Name = "RT11SJ.SYS".parse().unwrap();
        assert_eq!(Rt11Name::from_words(n.to_words()), n);
    }

    #[test]
    fn test_internal_names() {
        assert_eq!(InternalKind::from_file_name("$MONI.TOR"), Some(InternalKind::Monitor));
        assert_eq!(InternalKind::from_file_name("MONI.TOR"), None);
        assert_eq!(InternalKind::Monitor.blocks(), Some((2, 4)));
    }

    #[test]
    fn test_block_counts() {
        let mut f = Rt11File::new("A.B".parse().unwrap(), vec![0; 1000]);
        f.set_stream(StreamKind::Prefix, vec![0; 512]);
        f.set_stream(StreamKind::DirExt, vec![1, 2]);
        assert_eq!(f.prefix_blocks(), 1);
        assert_eq!(f.total_blocks(), 3);
    }

    #[test]
    fn test_volume_info_is_not_block_backed() {
        assert!(!Rt11File::internal(InternalKind::VolumeInfo, vec![]).is_block_backed());
        assert!(Rt11File::internal(InternalKind::Boot, vec![]).is_block_backed());
    }
}

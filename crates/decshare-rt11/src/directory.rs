//! Directory segments.
//!
//! A segment is two blocks: a five-word header followed by entries. Each
//! entry is seven words plus the volume's extra bytes:
//!
//! ```text
//! word 0   status
//! word 1-2 file name, Radix-50, six characters
//! word 3   extension, Radix-50, three characters
//! word 4   length in blocks
//! word 5   job / channel (tentative files only)
//! word 6   creation date
//! ...      extra bytes
//! ```
//!
//! The entry list of a segment ends with a status word carrying
//! [`E_EOS`].

use crate::error::{Rt11Error, Rt11Result};
use crate::home::FIRST_DIR_BLOCK;
use crate::{get_word, put_word};

/// Tentative file (open for writing).
pub const E_TENT: u16 = 0o400;
/// Empty area.
pub const E_MPTY: u16 = 0o1000;
/// Permanent file.
pub const E_PERM: u16 = 0o2000;
/// End of segment marker.
pub const E_EOS: u16 = 0o4000;
/// File has prefix blocks.
pub const E_PRE: u16 = 0o20;
/// File is read-only.
pub const E_READ: u16 = 0o40000;
/// File is protected from deletion.
pub const E_PROT: u16 = 0o100000;

/// Blocks per segment.
pub const SEGMENT_BLOCKS: u32 = 2;
/// Bytes per segment.
pub const SEGMENT_BYTES: usize = 1024;
/// Bytes of the segment header.
pub const HEADER_BYTES: usize = 10;
/// Bytes of an entry without extra bytes.
pub const ENTRY_BYTES: usize = 14;
/// Largest number of segments a directory can have.
pub const MAX_SEGMENTS: u16 = 31;
/// Largest number of extra bytes per entry accepted here.
pub const MAX_EXTRA_BYTES: u16 = 64;

/// Bytes of one entry including extra bytes.
#[must_use]
pub fn entry_size(extra_bytes: u16) -> usize {
    ENTRY_BYTES.saturating_add(usize::from(extra_bytes))
}

/// Entries fitting in one segment, keeping room for the end marker.
#[must_use]
#[allow(clippy::arithmetic_side_effects)] // entry_size is at least ENTRY_BYTES
pub fn entries_per_segment(extra_bytes: u16) -> usize {
    (SEGMENT_BYTES - HEADER_BYTES - 2) / entry_size(extra_bytes)
}

/// First block of segment `number` (1-based).
#[must_use]
pub fn segment_block(number: u16) -> u32 {
    let before = SEGMENT_BLOCKS.saturating_mul(u32::from(number.saturating_sub(1)));
    FIRST_DIR_BLOCK.saturating_add(before)
}

/// Segment header words.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegmentHeader {
    /// Segments allocated for the directory.
    pub total_segments: u16,
    /// Next segment in the chain, 0 for the last.
    pub next_segment: u16,
    /// Highest segment in use; only maintained in segment 1.
    pub highest_segment: u16,
    /// Extra bytes per entry.
    pub extra_bytes: u16,
    /// First data block described by this segment.
    pub data_block: u16,
}

impl SegmentHeader {
    /// Decode the header at the start of `segment`.
    #[must_use]
    pub fn decode(segment: &[u8]) -> Self {
        Self {
            total_segments: get_word(segment, 0),
            next_segment: get_word(segment, 2),
            highest_segment: get_word(segment, 4),
            extra_bytes: get_word(segment, 6),
            data_block: get_word(segment, 8),
        }
    }

    /// Store the header at the start of `segment`.
    pub fn encode(&self, segment: &mut [u8]) {
        put_word(segment, 0, self.total_segments);
        put_word(segment, 2, self.next_segment);
        put_word(segment, 4, self.highest_segment);
        put_word(segment, 6, self.extra_bytes);
        put_word(segment, 8, self.data_block);
    }

    /// Check the header of segment `number`.
    ///
    /// # Errors
    ///
    /// Returns [`Rt11Error::Structural`] for a segment count outside
    /// `1..=31`, a link beyond the segment count, or an odd or oversized
    /// extra byte count.
    pub fn validate(&self, number: u16) -> Rt11Result<()> {
        if self.total_segments == 0 || self.total_segments > MAX_SEGMENTS {
            return Err(Rt11Error::Structural(format!(
                "segment {number}: invalid segment count {}",
                self.total_segments
            )));
        }
        if self.next_segment > self.total_segments {
            return Err(Rt11Error::Structural(format!(
                "segment {number}: link to segment {} beyond {}",
                self.next_segment, self.total_segments
            )));
        }
        if self.extra_bytes & 1 != 0 || self.extra_bytes > MAX_EXTRA_BYTES {
            return Err(Rt11Error::Structural(format!(
                "segment {number}: invalid extra byte count {}",
                self.extra_bytes
            )));
        }
        Ok(())
    }
}

/// One directory entry.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DirEntry {
    /// Status bits.
    pub status: u16,
    /// Name (two words) and extension (one word) in Radix-50.
    pub name: [u16; 3],
    /// Length in blocks.
    pub length: u16,
    /// Job and channel of a tentative file.
    pub channel: u16,
    /// Creation date word.
    pub date: u16,
    /// Extra bytes.
    pub extra: Vec<u8>,
}

impl DirEntry {
    /// An empty-area entry covering `length` blocks.
    #[must_use]
    pub fn empty(length: u16, extra_bytes: u16) -> Self {
        Self {
            status: E_MPTY,
            length,
            extra: vec![0; usize::from(extra_bytes)],
            ..Self::default()
        }
    }

    /// Decode the entry at `offset`.
    #[must_use]
    #[allow(clippy::arithmetic_side_effects)] // callers keep the entry inside the segment
    pub fn decode(segment: &[u8], offset: usize, extra_bytes: u16) -> Self {
        let extra_start = offset + ENTRY_BYTES;
        Self {
            status: get_word(segment, offset),
            name: [
                get_word(segment, offset + 2),
                get_word(segment, offset + 4),
                get_word(segment, offset + 6),
            ],
            length: get_word(segment, offset + 8),
            channel: get_word(segment, offset + 10),
            date: get_word(segment, offset + 12),
            extra: segment[extra_start..extra_start + usize::from(extra_bytes)].to_vec(),
        }
    }

    /// Store the entry at `offset`; `extra` is truncated or zero-padded to
    /// `extra_bytes`.
    #[allow(clippy::arithmetic_side_effects)] // callers keep the entry inside the segment
    pub fn encode(&self, segment: &mut [u8], offset: usize, extra_bytes: u16) {
        put_word(segment, offset, self.status);
        for (i, word) in self.name.iter().enumerate() {
            put_word(segment, offset + 2 + 2 * i, *word);
        }
        put_word(segment, offset + 8, self.length);
        put_word(segment, offset + 10, self.channel);
        put_word(segment, offset + 12, self.date);
        let extra = &mut segment[offset + ENTRY_BYTES..offset + entry_size(extra_bytes)];
        extra.fill(0);
        for (dst, src) in extra.iter_mut().zip(&self.extra) {
            *dst = *src;
        }
    }

    /// True for the end-of-segment marker.
    #[must_use]
    pub fn is_end_of_segment(&self) -> bool {
        self.status & E_EOS != 0
    }

    /// True for permanent files.
    #[must_use]
    pub fn is_permanent(&self) -> bool {
        self.status & E_PERM != 0
    }

    /// True for empty areas.
    #[must_use]
    pub fn is_empty_area(&self) -> bool {
        self.status & E_MPTY != 0
    }

    /// True for tentative files.
    #[must_use]
    pub fn is_tentative(&self) -> bool {
        self.status & E_TENT != 0
    }
}

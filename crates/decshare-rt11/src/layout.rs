use tracing::debug;

use crate::directory::{MAX_SEGMENTS, SEGMENT_BLOCKS, entries_per_segment, segment_block};
use crate::error::{Rt11Error, Rt11Result};
use crate::home::FIRST_DIR_BLOCK;

/// Average file size assumed when sizing the directory of an empty volume.
const DEFAULT_FILE_BLOCKS: u32 = 16;

/// Directory and block allocation for one render.
///
/// Every block after the boot, home and monitor blocks belongs to exactly
/// one of: directory segments, file data, free space.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Layout {
    /// Blocks in the volume.
    pub block_count: u32,
    /// Segments reserved for the directory.
    pub total_segments: u16,
    /// Segments holding entries.
    pub used_segments: u16,
    /// Extra bytes per entry.
    pub extra_bytes: u16,
    /// Entries per segment.
    pub entries_per_segment: usize,
    /// Number of files.
    pub file_count: usize,
    /// Blocks occupied by files.
    pub used_blocks: u32,
    /// Blocks left free.
    pub free_blocks: u32,
}

impl Layout {
    /// Plan the directory for files of the given block sizes.
    ///
    /// `preferred_segments` keeps an existing directory size as long as the
    /// files still fit. Otherwise the directory is sized for the files plus
    /// as many more average-sized files as the free space would hold, but
    /// never spends more than half of the free space on segments.
    ///
    /// # Errors
    ///
    /// Returns [`Rt11Error::Capacity`] if the files need more entries than
    /// 31 segments hold, or more blocks than the volume has.
    // Block totals are checked against `usable` before subtracting.
    #[allow(clippy::arithmetic_side_effects)]
    pub fn plan(
        block_count: u32,
        file_blocks: &[u32],
        extra_bytes: u16,
        preferred_segments: Option<u16>,
    ) -> Rt11Result<Self> {
        let eps = entries_per_segment(extra_bytes);
        let files = file_blocks.len();
        // one entry is always taken by the trailing empty area
        let needed = (files + 1).div_ceil(eps);
        let needed = u16::try_from(needed)
            .ok()
            .filter(|n| *n <= MAX_SEGMENTS)
            .ok_or_else(|| {
                Rt11Error::Capacity(format!(
                    "{files} files exceed the directory limit of {} entries",
                    usize::from(MAX_SEGMENTS) * eps - 1
                ))
            })?;

        let used: u64 = file_blocks.iter().map(|b| u64::from(*b)).sum();
        let usable = u64::from(block_count.saturating_sub(FIRST_DIR_BLOCK));
        let dir_blocks = |segments: u16| u64::from(SEGMENT_BLOCKS) * u64::from(segments);
        if used + dir_blocks(needed) > usable {
            return Err(Rt11Error::Capacity(format!(
                "{used} blocks of file data and {} directory blocks do not fit in {usable} blocks",
                dir_blocks(needed)
            )));
        }
        let free = usable - used - dir_blocks(needed);

        let total = match preferred_segments {
            Some(p) if p >= needed && p <= MAX_SEGMENTS && dir_blocks(p - needed) <= free => p,
            _ => {
                let files = files as u64;
                let average = if files == 0 {
                    u64::from(DEFAULT_FILE_BLOCKS)
                } else {
                    (used / files).max(1)
                };
                let room_for = files + free / average + 1;
                let wanted = room_for.div_ceil(eps as u64);
                let affordable = u64::from(needed) + free / 2 / u64::from(SEGMENT_BLOCKS);
                let total = wanted.min(affordable).min(u64::from(MAX_SEGMENTS));
                u16::try_from(total).unwrap_or(MAX_SEGMENTS).max(needed)
            },
        };

        let layout = Self {
            block_count,
            total_segments: total,
            used_segments: needed,
            extra_bytes,
            entries_per_segment: eps,
            file_count: file_blocks.len(),
            used_blocks: u32::try_from(used).unwrap_or(u32::MAX),
            free_blocks: u32::try_from(usable - used - dir_blocks(total)).unwrap_or(0),
        };
        debug!(
            segments = layout.total_segments,
            used_segments = layout.used_segments,
            used = layout.used_blocks,
            free = layout.free_blocks,
            "Planned directory layout"
        );
        Ok(layout)
    }

    /// First block after the directory.
    #[must_use]
    pub fn data_start(&self) -> u32 {
        segment_block(self.total_segments).saturating_add(SEGMENT_BLOCKS)
    }

    /// Blocks after the boot, home and monitor blocks.
    #[must_use]
    pub fn usable_blocks(&self) -> u32 {
        self.block_count.saturating_sub(FIRST_DIR_BLOCK)
    }

    /// Blocks taken by directory segments.
    #[must_use]
    pub fn directory_blocks(&self) -> u32 {
        SEGMENT_BLOCKS.saturating_mul(u32::from(self.total_segments))
    }
}

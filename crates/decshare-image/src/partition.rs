use tracing::{debug, info, trace};

use crate::error::{ImageError, ImageResult};
use crate::geometry::PartitionSpec;
use crate::interleave::InterleaveTable;
use crate::stream::ImageStream;

/// Cartridge serial number written into fresh bad-sector tables.
pub const BAD_SECTOR_SERIAL: u32 = 0o12345;

/// A region of an image addressed in fixed-size logical blocks.
///
/// Blocks are made of one or more sectors. Without an interleave table a
/// block range is one contiguous byte range; with one, every logical sector
/// is placed individually. A dirty bit per block records device writes
/// since the last [`clear_dirty`](Self::clear_dirty).
#[derive(Debug, Clone)]
pub struct Partition {
    name: String,
    offset: u64,
    size: u64,
    sector_size: usize,
    block_size: usize,
    block_count: u32,
    interleave: Option<InterleaveTable>,
    dirty: Vec<bool>,
}

impl Partition {
    /// Create a partition without interleave.
    ///
    /// # Errors
    ///
    /// Returns [`ImageError::Unaligned`] if `offset` or `size` is not a
    /// multiple of the sector size, and [`ImageError::InvalidInterleave`] if
    /// the block size is not a multiple of the sector size.
    #[allow(clippy::arithmetic_side_effects)] // divisors are checked non-zero first
    pub fn new(
        name: impl Into<String>,
        offset: u64,
        size: u64,
        sector_size: usize,
        block_size: usize,
    ) -> ImageResult<Self> {
        if sector_size == 0 || offset % sector_size as u64 != 0 || size % sector_size as u64 != 0
        {
            return Err(ImageError::Unaligned {
                offset,
                sector_size,
            });
        }
        if block_size == 0 || block_size % sector_size != 0 {
            return Err(ImageError::InvalidInterleave(format!(
                "block size {block_size} is not a multiple of sector size {sector_size}"
            )));
        }
        let block_count = u32::try_from(size / block_size as u64).unwrap_or(u32::MAX);
        Ok(Self {
            name: name.into(),
            offset,
            size,
            sector_size,
            block_size,
            block_count,
            interleave: None,
            dirty: vec![false; block_count as usize],
        })
    }

    /// Create a partition from a drive layout entry, building its interleave
    /// table if one is specified.
    ///
    /// # Errors
    ///
    /// Returns an error if the spec is misaligned or its interleave invalid.
    pub fn from_spec(spec: &PartitionSpec, block_size: usize) -> ImageResult<Self> {
        let mut partition = Self::new(
            spec.name.clone(),
            spec.offset,
            spec.size,
            spec.sector_size,
            block_size,
        )?;
        if let Some(il) = &spec.interleave {
            partition.build_interleave_table(
                il.heads,
                &il.track_pattern,
                il.cylinder_skew,
                il.head_skew,
            )?;
        }
        Ok(partition)
    }

    /// Install an interleave table covering every sector of the partition.
    ///
    /// # Errors
    ///
    /// Returns an error if the pattern is invalid or the partition is not a
    /// whole number of tracks.
    pub fn build_interleave_table(
        &mut self,
        heads: u32,
        track_pattern: &[u32],
        cylinder_skew: u32,
        head_skew: u32,
    ) -> ImageResult<()> {
        let table = InterleaveTable::build(
            self.sector_count(),
            heads,
            track_pattern,
            cylinder_skew,
            head_skew,
        )?;
        debug!(
            partition = %self.name,
            sectors = table.len(),
            "Built interleave table"
        );
        self.interleave = Some(table);
        Ok(())
    }

    /// Partition name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Byte offset within the image.
    #[must_use]
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Size in bytes.
    #[must_use]
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Bytes per logical block.
    #[must_use]
    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// Number of whole blocks.
    #[must_use]
    pub fn block_count(&self) -> u32 {
        self.block_count
    }

    /// Bytes per sector.
    #[must_use]
    pub fn sector_size(&self) -> usize {
        self.sector_size
    }

    /// Interleave table, if any.
    #[must_use]
    pub fn interleave(&self) -> Option<&InterleaveTable> {
        self.interleave.as_ref()
    }

    #[allow(clippy::arithmetic_side_effects)] // sector_size is non-zero, checked in new
    fn sector_count(&self) -> u32 {
        u32::try_from(self.size / self.sector_size as u64).unwrap_or(u32::MAX)
    }

    #[allow(clippy::arithmetic_side_effects)] // sector_size is non-zero, checked in new
    fn sectors_per_block(&self) -> u32 {
        (self.block_size / self.sector_size) as u32
    }

    fn check_range(&self, start: u32, count: u32) -> ImageResult<()> {
        if u64::from(start).saturating_add(u64::from(count)) > u64::from(self.block_count) {
            return Err(ImageError::OutOfRange {
                start,
                count,
                blocks: self.block_count,
            });
        }
        Ok(())
    }

    /// Image byte position of a physical sector.
    fn physical_position(&self, physical: u32) -> u64 {
        let within = u64::from(physical).saturating_mul(self.sector_size as u64);
        self.offset.saturating_add(within)
    }

    /// Image byte position of a logical sector.
    fn sector_position(&self, logical: u32) -> u64 {
        let physical = self
            .interleave
            .as_ref()
            .map_or(logical, |t| t.logical_to_physical(logical));
        self.physical_position(physical)
    }

    /// Read `count` blocks starting at `start`.
    ///
    /// # Errors
    ///
    /// Returns an error if the range lies outside the partition or the image
    /// read fails.
    #[allow(clippy::arithmetic_side_effects)] // the range is checked against block_count first
    pub fn get_blocks(
        &self,
        image: &mut dyn ImageStream,
        start: u32,
        count: u32,
    ) -> ImageResult<Vec<u8>> {
        self.check_range(start, count)?;
        let mut data = vec![0u8; count as usize * self.block_size];
        if self.interleave.is_none() {
            let position = self.offset + u64::from(start) * self.block_size as u64;
            image.read(&mut data, position)?;
            return Ok(data);
        }
        let per_block = self.sectors_per_block();
        let first = start * per_block;
        for (i, chunk) in data.chunks_mut(self.sector_size).enumerate() {
            let position = self.sector_position(first + i as u32);
            image.read(chunk, position)?;
        }
        Ok(data)
    }

    /// Write `data` starting at block `start`. A partial final block is
    /// zero-padded.
    ///
    /// Writes made here are not recorded as dirty.
    ///
    /// # Errors
    ///
    /// Returns an error if the range lies outside the partition or the image
    /// write fails.
    #[allow(clippy::arithmetic_side_effects)] // the range is checked against block_count first
    pub fn set_blocks(
        &self,
        image: &mut dyn ImageStream,
        start: u32,
        data: &[u8],
    ) -> ImageResult<()> {
        let count = u32::try_from(data.len().div_ceil(self.block_size)).unwrap_or(u32::MAX);
        self.check_range(start, count)?;
        let mut padded;
        let data = if data.len() % self.block_size == 0 {
            data
        } else {
            padded = data.to_vec();
            padded.resize(count as usize * self.block_size, 0);
            &padded[..]
        };
        if self.interleave.is_none() {
            let position = self.offset + u64::from(start) * self.block_size as u64;
            image.write(data, position)?;
            return Ok(());
        }
        let first = start * self.sectors_per_block();
        for (i, chunk) in data.chunks(self.sector_size).enumerate() {
            let position = self.sector_position(first + i as u32);
            image.write(chunk, position)?;
        }
        Ok(())
    }

    /// Write `data` like [`set_blocks`](Self::set_blocks) and mark the
    /// written blocks dirty.
    ///
    /// # Errors
    ///
    /// Returns an error if the range lies outside the partition or the image
    /// write fails; nothing is marked then.
    pub fn write_blocks(
        &mut self,
        image: &mut dyn ImageStream,
        start: u32,
        data: &[u8],
    ) -> ImageResult<()> {
        self.set_blocks(image, start, data)?;
        let count = u32::try_from(data.len().div_ceil(self.block_size)).unwrap_or(u32::MAX);
        self.mark_dirty(start, count);
        Ok(())
    }

    /// Record that the image bytes `[position, position + len)` were written.
    ///
    /// Every logical block owning one of the touched physical sectors is
    /// marked dirty. Bytes outside the partition are ignored. Returns the
    /// number of blocks newly marked.
    // `begin < end` lie within the partition and the divisors are non-zero.
    #[allow(clippy::arithmetic_side_effects)]
    pub fn mark_dirty_at(&mut self, position: u64, len: u64) -> usize {
        let end = position.saturating_add(len).min(self.offset.saturating_add(self.size));
        let begin = position.max(self.offset);
        if len == 0 || begin >= end {
            return 0;
        }
        let first = (begin - self.offset) / self.sector_size as u64;
        let last = (end - 1 - self.offset) / self.sector_size as u64;
        let per_block = self.sectors_per_block();
        let mut marked = 0;
        for physical in first..=last {
            let physical = physical as u32;
            let logical = self
                .interleave
                .as_ref()
                .map_or(physical, |t| t.physical_to_logical(physical));
            let block = (logical / per_block) as usize;
            if let Some(bit) = self.dirty.get_mut(block)
                && !*bit
            {
                *bit = true;
                marked += 1;
            }
        }
        if marked > 0 {
            trace!(partition = %self.name, position, len, marked, "Marked blocks dirty");
        }
        marked
    }

    /// Mark a block range dirty directly.
    pub fn mark_dirty(&mut self, start: u32, count: u32) {
        for block in start..start.saturating_add(count) {
            if let Some(bit) = self.dirty.get_mut(block as usize) {
                *bit = true;
            }
        }
    }

    /// True if the block is dirty.
    #[must_use]
    pub fn is_dirty(&self, block: u32) -> bool {
        self.dirty.get(block as usize).copied().unwrap_or(false)
    }

    /// True if any block in the range is dirty.
    #[must_use]
    pub fn any_dirty(&self, start: u32, count: u32) -> bool {
        (start..start.saturating_add(count)).any(|b| self.is_dirty(b))
    }

    /// Number of dirty blocks.
    #[must_use]
    pub fn dirty_count(&self) -> usize {
        self.dirty.iter().filter(|b| **b).count()
    }

    /// Reset every dirty bit.
    pub fn clear_dirty(&mut self) {
        self.dirty.fill(false);
    }

    /// Pre-fill the partition with an empty DEC STD 144 bad-sector table.
    ///
    /// Every sector receives the cartridge serial number, two zero words and
    /// `0177777` fill, which format checkers read as "no bad sectors". Nothing
    /// is written unless the whole partition is still zero. Returns whether the
    /// table was written.
    ///
    /// # Errors
    ///
    /// Returns an error if the image cannot be read or written.
    pub fn fill_bad_sector_table(&self, image: &mut dyn ImageStream) -> ImageResult<bool> {
        let mut existing = vec![0u8; usize::try_from(self.size).unwrap_or(0)];
        image.read(&mut existing, self.offset)?;
        if existing.iter().any(|b| *b != 0) {
            debug!(partition = %self.name, "Bad sector table present, leaving it alone");
            return Ok(false);
        }

        let mut sector = vec![0xffu8; self.sector_size];
        let serial = BAD_SECTOR_SERIAL.to_le_bytes();
        sector[0..4].copy_from_slice(&serial);
        sector[4..8].fill(0);
        for s in 0..self.sector_count() {
            image.write(&sector, self.physical_position(s))?;
        }
        info!(
            partition = %self.name,
            sectors = self.sector_count(),
            "Wrote empty bad sector table"
        );
        Ok(true)
    }
}

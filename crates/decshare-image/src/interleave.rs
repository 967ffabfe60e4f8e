use crate::error::{ImageError, ImageResult};

/// A fixed permutation between logical and physical sector numbers.
///
/// Both directions are kept: logical→physical for block reads and writes,
/// physical→logical for translating a raw byte-level image write back into
/// the logical block it dirtied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterleaveTable {
    logical_to_physical: Vec<u32>,
    physical_to_logical: Vec<u32>,
}

impl InterleaveTable {
    /// Replicate `track_pattern` over `sector_count` sectors.
    ///
    /// `track_pattern[i]` is the physical position within a track of the
    /// i-th logical sector of that track; its length is the number of sectors
    /// per track. After every track the layout is rotated by a cumulative
    /// skew: `head_skew` when the next track is on another head of the same
    /// cylinder, `cylinder_skew` when the next track starts a new cylinder.
    ///
    /// # Errors
    ///
    /// Returns [`ImageError::InvalidInterleave`] if the pattern is not a
    /// permutation, `heads` is zero, or `sector_count` is not a whole number
    /// of tracks.
    // Divisors are checked non-zero and indices stay below `sector_count`.
    #[allow(clippy::arithmetic_side_effects)]
    pub fn build(
        sector_count: u32,
        heads: u32,
        track_pattern: &[u32],
        cylinder_skew: u32,
        head_skew: u32,
    ) -> ImageResult<Self> {
        let sectors_per_track = u32::try_from(track_pattern.len())
            .map_err(|_| ImageError::InvalidInterleave("track pattern too long".into()))?;
        if sectors_per_track == 0 || heads == 0 {
            return Err(ImageError::InvalidInterleave(
                "empty track pattern or zero heads".into(),
            ));
        }
        let mut seen = vec![false; track_pattern.len()];
        for &p in track_pattern {
            match seen.get_mut(p as usize) {
                Some(slot) if !*slot => *slot = true,
                _ => {
                    return Err(ImageError::InvalidInterleave(format!(
                        "track pattern entry {p} is out of range or repeated"
                    )));
                },
            }
        }
        if sector_count % sectors_per_track != 0 {
            return Err(ImageError::InvalidInterleave(format!(
                "{sector_count} sectors is not a whole number of {sectors_per_track}-sector tracks"
            )));
        }

        let tracks = sector_count / sectors_per_track;
        let mut logical_to_physical = vec![0u32; sector_count as usize];
        let mut skew = 0u32;
        for track in 0..tracks {
            if track > 0 {
                let step = if track % heads == 0 {
                    cylinder_skew
                } else {
                    head_skew
                };
                skew = (skew + step) % sectors_per_track;
            }
            let base = track * sectors_per_track;
            for (i, &p) in track_pattern.iter().enumerate() {
                let physical = base + (p + skew) % sectors_per_track;
                logical_to_physical[base as usize + i] = physical;
            }
        }

        let mut physical_to_logical = vec![0u32; sector_count as usize];
        for (logical, &physical) in logical_to_physical.iter().enumerate() {
            physical_to_logical[physical as usize] = logical as u32;
        }

        Ok(Self {
            logical_to_physical,
            physical_to_logical,
        })
    }

    /// The DEC RX01/RX02 layout: 2:1 interleave within a 26-sector track,
    /// skewed by 6 sectors on every track change.
    ///
    /// # Errors
    ///
    /// Returns an error if `sector_count` is not a whole number of tracks.
    pub fn rx(sector_count: u32) -> ImageResult<Self> {
        Self::build(sector_count, 1, &rx_track_pattern(), 6, 0)
    }

    /// Physical sector holding `logical`.
    ///
    /// # Panics
    ///
    /// Panics if `logical` is outside the table.
    #[must_use]
    pub fn logical_to_physical(&self, logical: u32) -> u32 {
        self.logical_to_physical[logical as usize]
    }

    /// Logical sector stored at `physical`.
    ///
    /// # Panics
    ///
    /// Panics if `physical` is outside the table.
    #[must_use]
    pub fn physical_to_logical(&self, physical: u32) -> u32 {
        self.physical_to_logical[physical as usize]
    }

    /// Number of sectors covered by the table.
    #[must_use]
    pub fn len(&self) -> usize {
        self.logical_to_physical.len()
    }

    /// True if the table covers no sectors.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.logical_to_physical.is_empty()
    }
}

/// Logical sector `i` of an RX track sits at physical position `2i` for the
/// first half of the track and `2(i-13)+1` for the second half.
#[must_use]
#[allow(clippy::arithmetic_side_effects)] // i < 26
pub fn rx_track_pattern() -> Vec<u32> {
    (0..26u32)
        .map(|i| if i < 13 { 2 * i } else { 2 * (i - 13) + 1 })
        .collect()
}

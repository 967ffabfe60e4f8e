use std::fmt;
use std::str::FromStr;

use crate::interleave::rx_track_pattern;

/// Physical geometry of a drive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DriveGeometry {
    /// Number of cylinders.
    pub cylinders: u32,
    /// Number of heads (surfaces).
    pub heads: u32,
    /// Sectors on one track.
    pub sectors_per_track: u32,
    /// Bytes per sector.
    pub sector_size: usize,
}

impl DriveGeometry {
    /// Bytes on one track.
    #[must_use]
    pub fn track_size(&self) -> u64 {
        u64::from(self.sectors_per_track).saturating_mul(self.sector_size as u64)
    }

    /// Total number of tracks.
    #[must_use]
    pub fn tracks(&self) -> u32 {
        self.cylinders.saturating_mul(self.heads)
    }

    /// Total capacity in bytes.
    #[must_use]
    pub fn capacity(&self) -> u64 {
        u64::from(self.tracks()).saturating_mul(self.track_size())
    }
}

/// Interleave parameters for a partition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterleaveSpec {
    /// Heads per cylinder, used to decide between head and cylinder skew.
    pub heads: u32,
    /// Physical position of each logical sector within a track.
    pub track_pattern: Vec<u32>,
    /// Skew added when moving to the next cylinder.
    pub cylinder_skew: u32,
    /// Skew added when switching heads within a cylinder.
    pub head_skew: u32,
}

/// Where a partition lies in the image and how its sectors are ordered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionSpec {
    /// Short name used in log output.
    pub name: String,
    /// Byte offset within the image.
    pub offset: u64,
    /// Size in bytes.
    pub size: u64,
    /// Bytes per physical sector.
    pub sector_size: usize,
    /// Optional sector interleave.
    pub interleave: Option<InterleaveSpec>,
}

/// Complete partitioning of one drive image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VolumeLayout {
    /// Full size of the image in bytes.
    pub image_size: u64,
    /// Partition holding the filesystem.
    pub filesystem: PartitionSpec,
    /// Trailing bad-sector table track, for drives that reserve one.
    pub bad_sector: Option<PartitionSpec>,
}

/// DEC drive types with a known layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DriveType {
    /// RX01 single density floppy.
    Rx01,
    /// RX02 double density floppy.
    Rx02,
    /// RK05 cartridge.
    Rk05,
    /// RL01 cartridge.
    Rl01,
    /// RL02 cartridge.
    Rl02,
    /// RK06 pack.
    Rk06,
    /// RK07 pack.
    Rk07,
    /// MSCP disk: flat block array without geometry.
    Mscp,
}

impl DriveType {
    /// All supported drive types.
    pub const ALL: [Self; 8] = [
        Self::Rx01,
        Self::Rx02,
        Self::Rk05,
        Self::Rl01,
        Self::Rl02,
        Self::Rk06,
        Self::Rk07,
        Self::Mscp,
    ];

    /// Physical geometry, or `None` for MSCP disks.
    #[must_use]
    pub fn geometry(self) -> Option<DriveGeometry> {
        let (cylinders, heads, sectors_per_track, sector_size) = match self {
            Self::Rx01 => (77, 1, 26, 128),
            Self::Rx02 => (77, 1, 26, 256),
            Self::Rk05 => (203, 2, 12, 512),
            Self::Rl01 => (256, 2, 40, 256),
            Self::Rl02 => (512, 2, 40, 256),
            Self::Rk06 => (411, 3, 22, 512),
            Self::Rk07 => (815, 3, 22, 512),
            Self::Mscp => return None,
        };
        Some(DriveGeometry {
            cylinders,
            heads,
            sectors_per_track,
            sector_size,
        })
    }

    /// True if the last track holds a DEC STD 144 bad-sector table.
    #[must_use]
    pub fn has_bad_sector_track(self) -> bool {
        matches!(self, Self::Rl01 | Self::Rl02 | Self::Rk06 | Self::Rk07)
    }

    /// Compute the partition layout.
    ///
    /// `mscp_blocks` is the block count of an MSCP disk and ignored for all
    /// other drives; an MSCP disk without a block count gets a zero-sized
    /// partition.
    #[must_use]
    pub fn layout(self, block_size: usize, mscp_blocks: Option<u32>) -> VolumeLayout {
        let Some(geometry) = self.geometry() else {
            let size = u64::from(mscp_blocks.unwrap_or(0)).saturating_mul(block_size as u64);
            return VolumeLayout {
                image_size: size,
                filesystem: PartitionSpec {
                    name: "filesystem".into(),
                    offset: 0,
                    size,
                    sector_size: block_size,
                    interleave: None,
                },
                bad_sector: None,
            };
        };

        let capacity = geometry.capacity();
        let track = geometry.track_size();

        match self {
            // Track 0 is not used by the filesystem.
            Self::Rx01 | Self::Rx02 => VolumeLayout {
                image_size: capacity,
                filesystem: PartitionSpec {
                    name: "filesystem".into(),
                    offset: track,
                    size: capacity.saturating_sub(track),
                    sector_size: geometry.sector_size,
                    interleave: Some(InterleaveSpec {
                        heads: geometry.heads,
                        track_pattern: rx_track_pattern(),
                        cylinder_skew: 6,
                        head_skew: 0,
                    }),
                },
                bad_sector: None,
            },
            _ if self.has_bad_sector_track() => VolumeLayout {
                image_size: capacity,
                filesystem: PartitionSpec {
                    name: "filesystem".into(),
                    offset: 0,
                    size: capacity.saturating_sub(track),
                    sector_size: geometry.sector_size,
                    interleave: None,
                },
                bad_sector: Some(PartitionSpec {
                    name: "bad-sector-table".into(),
                    offset: capacity.saturating_sub(track),
                    size: track,
                    sector_size: geometry.sector_size,
                    interleave: None,
                }),
            },
            _ => VolumeLayout {
                image_size: capacity,
                filesystem: PartitionSpec {
                    name: "filesystem".into(),
                    offset: 0,
                    size: capacity,
                    sector_size: geometry.sector_size,
                    interleave: None,
                },
                bad_sector: None,
            },
        }
    }

    /// Lower-case name as used in configuration files.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Rx01 => "rx01",
            Self::Rx02 => "rx02",
            Self::Rk05 => "rk05",
            Self::Rl01 => "rl01",
            Self::Rl02 => "rl02",
            Self::Rk06 => "rk06",
            Self::Rk07 => "rk07",
            Self::Mscp => "mscp",
        }
    }
}

impl fmt::Display for DriveType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for DriveType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|d| d.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown drive type '{s}'"))
    }
}

use std::path::PathBuf;
use std::time::Duration;

use decshare_image::DriveType;
use decshare_rt11::Rt11Options;

/// Default interval between ticks.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(1000);
/// Default quiet period before a side counts as settled.
pub const DEFAULT_SETTLE: Duration = Duration::from_millis(2000);

/// Tick timing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncOptions {
    /// Interval between worker ticks.
    pub poll_interval: Duration,
    /// How long a side must be quiet before its changes are applied.
    pub settle: Duration,
    /// Run ticks on a background thread; otherwise the owner calls
    /// [`SharedVolume::tick_now`](crate::SharedVolume::tick_now).
    pub background: bool,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            settle: DEFAULT_SETTLE,
            background: true,
        }
    }
}

/// Everything needed to open a shared volume from disk.
#[derive(Debug, Clone)]
pub struct ShareConfig {
    /// Disk image file.
    pub image: PathBuf,
    /// Host directory mirroring the volume.
    pub share_dir: PathBuf,
    /// Drive type giving the image layout.
    pub drive: DriveType,
    /// Block count of an MSCP disk.
    pub mscp_blocks: Option<u32>,
    /// Create the image file if it does not exist.
    pub create_image: bool,
    /// RT-11 settings.
    pub rt11: Rt11Options,
    /// Tick timing.
    pub sync: SyncOptions,
}

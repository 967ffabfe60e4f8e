//! Shared harness for end-to-end sharing tests.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use decshare_image::{DriveType, MemoryImage, Partition, VolumeLayout};
use decshare_rt11::{BLOCK_SIZE, Rt11Filesystem, Rt11Options};
use decshare_sync::{SharedVolume, SyncOptions};
use decshare_tree::{Clock, ManualClock, StreamKind};
use tempfile::TempDir;

/// Block count of the small MSCP volume most tests use.
#[allow(dead_code)]
pub const SMALL_BLOCKS: u32 = 18;

/// RT-11 settings without the synthesized volume information file.
#[allow(dead_code)]
pub fn rt11() -> Rt11Options {
    Rt11Options {
        volume_info: false,
        ..Rt11Options::default()
    }
}

/// Layout of an MSCP disk with `blocks` blocks.
#[allow(dead_code)]
pub fn mscp(blocks: u32) -> VolumeLayout {
    DriveType::Mscp.layout(BLOCK_SIZE, Some(blocks))
}

/// A zero-filled image for `layout`.
#[allow(dead_code)]
pub fn blank(layout: &VolumeLayout) -> MemoryImage {
    MemoryImage::new(usize::try_from(layout.image_size).unwrap())
}

/// A formatted image for `layout` holding `files`.
#[allow(dead_code)]
pub fn image_with(layout: &VolumeLayout, files: &[(&str, &[u8])]) -> MemoryImage {
    let mut image = blank(layout);
    let mut partition = Partition::from_spec(&layout.filesystem, BLOCK_SIZE).unwrap();
    let clock = Arc::new(ManualClock::new());
    let mut dec = Rt11Filesystem::new(rt11(), partition.block_count(), clock);
    dec.format(&mut partition, &mut image).unwrap();
    for (name, data) in files {
        dec.write_stream(name, StreamKind::Data, data.to_vec(), None, false)
            .unwrap();
    }
    dec.render(&mut partition, &mut image).unwrap();
    image
}

/// Parse the RT-11 filesystem found in raw image bytes.
#[allow(dead_code)]
pub fn parse_bytes(layout: &VolumeLayout, bytes: Vec<u8>) -> Rt11Filesystem {
    let mut image = MemoryImage::from_bytes(bytes);
    let mut partition = Partition::from_spec(&layout.filesystem, BLOCK_SIZE).unwrap();
    let clock = Arc::new(ManualClock::new());
    let mut dec = Rt11Filesystem::new(rt11(), partition.block_count(), clock);
    // Structural faults are reported through `fault()`.
    let _ = dec.parse(&mut partition, &mut image);
    dec
}

/// A shared volume ticked by hand against a temporary share directory.
#[allow(dead_code)]
pub struct ShareHarness {
    /// The shared volume.
    pub volume: SharedVolume,
    /// Layout the image was opened with.
    pub layout: VolumeLayout,
    /// Clock driving the settle windows.
    pub clock: Arc<ManualClock>,
    share: TempDir,
}

#[allow(dead_code)]
impl ShareHarness {
    /// Share `image` laid out as `layout` with no settle delay.
    pub fn new(image: MemoryImage, layout: VolumeLayout) -> Self {
        Self::with_settle(image, layout, Duration::ZERO)
    }

    /// Share `image` with a settle window driven by the harness clock.
    pub fn with_settle(image: MemoryImage, layout: VolumeLayout, settle: Duration) -> Self {
        let share = TempDir::new().expect("failed to create share dir");
        Self::in_dir(image, layout, settle, share)
    }

    /// Share `image` against an already populated directory.
    pub fn in_dir(
        image: MemoryImage,
        layout: VolumeLayout,
        settle: Duration,
        share: TempDir,
    ) -> Self {
        let clock = Arc::new(ManualClock::new());
        let volume = SharedVolume::with_image(
            Box::new(image),
            &layout,
            share.path(),
            rt11(),
            SyncOptions {
                poll_interval: Duration::from_millis(10),
                settle,
                background: false,
            },
            Arc::clone(&clock) as Arc<dyn Clock>,
        )
        .expect("failed to share volume");
        Self {
            volume,
            layout,
            clock,
            share,
        }
    }

    /// The share directory.
    pub fn dir(&self) -> &Path {
        self.share.path()
    }

    /// Path of `name` inside the share directory.
    pub fn path(&self, name: &str) -> PathBuf {
        self.share.path().join(name)
    }

    /// Sorted names of the plain files in the share directory.
    pub fn host_names(&self) -> Vec<String> {
        let mut names: Vec<String> = fs::read_dir(self.share.path())
            .unwrap()
            .map(|e| e.unwrap())
            .filter(|e| e.file_type().unwrap().is_file())
            .map(|e| e.file_name().into_string().unwrap())
            .collect();
        names.sort();
        names
    }

    /// The whole image as the emulated device sees it.
    pub fn image_bytes(&self) -> Vec<u8> {
        let mut bytes = vec![0; usize::try_from(self.volume.size()).unwrap()];
        self.volume.read(&mut bytes, 0).unwrap();
        bytes
    }

    /// Free blocks of the RT-11 view.
    pub fn free_blocks(&self) -> u32 {
        self.volume.with_dec(Rt11Filesystem::free_blocks).unwrap()
    }

    /// Split into the volume and the share directory, e.g. to close the
    /// volume while keeping the directory.
    pub fn into_parts(self) -> (SharedVolume, TempDir) {
        (self.volume, self.share)
    }

    /// Tick until `done` holds, giving the watcher time to deliver.
    pub fn tick_until(&self, mut done: impl FnMut(&Self) -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            self.volume.tick_now().unwrap();
            if done(self) {
                return true;
            }
            thread::sleep(Duration::from_millis(20));
        }
        false
    }

    /// Tick `count` times with a short pause between ticks.
    pub fn settle_ticks(&self, count: usize) {
        for _ in 0..count {
            thread::sleep(Duration::from_millis(20));
            self.volume.tick_now().unwrap();
        }
    }
}

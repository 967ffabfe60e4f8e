use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use decshare_host::HostFilesystem;
use decshare_image::{FileImage, ImageStream, Partition, VolumeLayout};
use decshare_rt11::{BLOCK_SIZE, Rt11Filesystem, Rt11Options, Rt11Result};
use decshare_tree::{Clock, StreamKind};
use tracing::{debug, error, info, warn};

use crate::error::{SyncError, SyncResult};
use crate::options::{ShareConfig, SyncOptions};
use crate::orchestrator::{Orchestrator, TickReport};

/// Background thread running the tick on a fixed interval.
struct Worker {
    running: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl Worker {
    fn spawn(state: Arc<Mutex<Orchestrator>>, interval: Duration) -> SyncResult<Self> {
        let running = Arc::new(AtomicBool::new(true));
        let running_loop = Arc::clone(&running);
        let handle = thread::Builder::new()
            .name("decshare-sync".into())
            .spawn(move || tick_loop(&state, &running_loop, interval))
            .map_err(SyncError::Worker)?;
        debug!(interval_ms = interval.as_millis(), "Started sync worker");
        Ok(Self {
            running,
            handle: Some(handle),
        })
    }

    fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            handle.thread().unpark();
            if handle.join().is_err() {
                error!("Sync worker panicked");
            }
        }
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        self.stop();
    }
}

fn tick_loop(state: &Mutex<Orchestrator>, running: &AtomicBool, interval: Duration) {
    while running.load(Ordering::SeqCst) {
        thread::park_timeout(interval);
        if !running.load(Ordering::SeqCst) {
            break;
        }
        let Ok(mut orchestrator) = state.lock() else {
            error!("Volume lock poisoned, stopping sync worker");
            break;
        };
        if let Err(e) = orchestrator.tick() {
            warn!(error = %e, "Sync tick failed");
        }
    }
}

/// A disk image shared between an emulated device and a host directory.
///
/// Device I/O, RT-11 API calls and the worker's ticks are serialized by one
/// mutex, so a tick always sees a consistent image.
pub struct SharedVolume {
    state: Arc<Mutex<Orchestrator>>,
    worker: Option<Worker>,
    size: u64,
}

impl std::fmt::Debug for SharedVolume {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedVolume")
            .field("size", &self.size)
            .field("background", &self.worker.is_some())
            .finish_non_exhaustive()
    }
}

impl SharedVolume {
    /// Open the image file of `config`, growing it to the drive size, and
    /// start sharing it.
    ///
    /// # Errors
    ///
    /// Returns an error if the drive has no usable size, the image cannot be
    /// opened, or the share directory cannot be scanned.
    pub fn open(config: &ShareConfig, clock: Arc<dyn Clock>) -> SyncResult<Self> {
        let layout = config.drive.layout(BLOCK_SIZE, config.mscp_blocks);
        if layout.filesystem.size == 0 {
            return Err(SyncError::Config(format!(
                "{} drive needs a block count",
                config.drive
            )));
        }
        let mut image = FileImage::open(&config.image, config.create_image)?;
        if image.size() < layout.image_size {
            info!(
                image = %config.image.display(),
                from = image.size(),
                to = layout.image_size,
                "Growing image to drive size"
            );
            image.set_size(layout.image_size)?;
        }
        Self::with_image(
            Box::new(image),
            &layout,
            &config.share_dir,
            config.rt11.clone(),
            config.sync,
            clock,
        )
    }

    /// Share an already opened image laid out as `layout`.
    ///
    /// # Errors
    ///
    /// Returns an error if the partitions do not fit the image or the share
    /// directory cannot be scanned.
    pub fn with_image(
        mut image: Box<dyn ImageStream>,
        layout: &VolumeLayout,
        share_dir: &Path,
        rt11: Rt11Options,
        sync: SyncOptions,
        clock: Arc<dyn Clock>,
    ) -> SyncResult<Self> {
        let partition = Partition::from_spec(&layout.filesystem, BLOCK_SIZE)?;
        if let Some(spec) = &layout.bad_sector {
            let table = Partition::from_spec(spec, BLOCK_SIZE)?;
            if table.fill_bad_sector_table(image.as_mut())? {
                info!("Initialized empty bad sector table");
            }
        }
        let dec = Rt11Filesystem::new(rt11, partition.block_count(), Arc::clone(&clock));
        let host = HostFilesystem::new(share_dir, Arc::clone(&clock))?;
        let orchestrator = Orchestrator::new(image, partition, dec, host, clock, sync)?;
        let size = orchestrator.image_size();
        info!(
            share = %orchestrator.host().root().display(),
            files = orchestrator.dec().user_files().count(),
            formatted = orchestrator.dec().is_formatted(),
            "Sharing volume"
        );

        let state = Arc::new(Mutex::new(orchestrator));
        let worker = if sync.background {
            Some(Worker::spawn(Arc::clone(&state), sync.poll_interval)?)
        } else {
            None
        };
        Ok(Self {
            state,
            worker,
            size,
        })
    }

    fn lock(&self) -> SyncResult<MutexGuard<'_, Orchestrator>> {
        self.state.lock().map_err(|_| SyncError::Poisoned)
    }

    /// Image size in bytes.
    #[must_use]
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Device read at a byte position.
    ///
    /// # Errors
    ///
    /// Returns an error if the image read fails.
    pub fn read(&self, buf: &mut [u8], position: u64) -> SyncResult<()> {
        self.lock()?.device_read(buf, position)
    }

    /// Device write at a byte position.
    ///
    /// # Errors
    ///
    /// Returns an error if the image write fails.
    pub fn write(&self, buf: &[u8], position: u64) -> SyncResult<()> {
        self.lock()?.device_write(buf, position)
    }

    /// Run one tick on the calling thread.
    ///
    /// # Errors
    ///
    /// Returns the tick's error.
    pub fn tick_now(&self) -> SyncResult<TickReport> {
        self.lock()?.tick()
    }

    /// Write an empty RT-11 volume; the host copies are deleted on the next
    /// tick.
    ///
    /// # Errors
    ///
    /// Returns an error if the image cannot be written.
    pub fn format(&self) -> SyncResult<()> {
        self.lock()?.format()
    }

    /// Change the volume through the RT-11 API and render it.
    ///
    /// # Errors
    ///
    /// Returns the error of `update`, or a render error.
    pub fn update_dec<R>(
        &self,
        update: impl FnOnce(&mut Rt11Filesystem) -> Rt11Result<R>,
    ) -> SyncResult<R> {
        self.lock()?.update_dec(update)
    }

    /// Inspect the RT-11 view.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Poisoned`] if the lock is poisoned.
    pub fn with_dec<R>(&self, inspect: impl FnOnce(&Rt11Filesystem) -> R) -> SyncResult<R> {
        Ok(inspect(self.lock()?.dec()))
    }

    /// Create or replace a file on the volume.
    ///
    /// # Errors
    ///
    /// Returns an error if the name is invalid or the volume is full.
    pub fn write_file(&self, name: &str, data: Vec<u8>) -> SyncResult<()> {
        self.update_dec(|dec| dec.write_stream(name, StreamKind::Data, data, None, false))
    }

    /// Remove a file from the volume. Returns false if it did not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the name is reserved or rendering fails.
    pub fn delete_file(&self, name: &str) -> SyncResult<bool> {
        self.update_dec(|dec| dec.delete_stream(name, StreamKind::Data))
    }

    /// Stop the worker, run a final tick and release the image.
    ///
    /// # Errors
    ///
    /// Returns an error if the final tick or the image flush fails.
    pub fn close(mut self) -> SyncResult<()> {
        if let Some(mut worker) = self.worker.take() {
            worker.stop();
        }
        let mut orchestrator = self.lock()?;
        orchestrator.tick()?;
        orchestrator.close()
    }
}

impl Drop for SharedVolume {
    fn drop(&mut self) {
        if let Some(mut worker) = self.worker.take() {
            worker.stop();
        }
    }
}

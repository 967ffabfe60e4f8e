use std::sync::Arc;
use std::time::{Duration, Instant};

use decshare_host::HostFilesystem;
use decshare_image::{ImageStream, Partition};
use decshare_rt11::{InternalKind, Rt11Error, Rt11File, Rt11Filesystem};
use decshare_tree::{
    Clock, EventKind, EventQueue, FileEvent, FileTree, HasStreams, StreamKind, diff, snapshot,
    update_changed,
};
use tracing::{debug, info, warn};

use crate::error::SyncResult;
use crate::options::SyncOptions;

/// What one tick did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Host notification fragments collected.
    pub host_changes: usize,
    /// Host events applied to the volume.
    pub imported: usize,
    /// True if the image was rendered.
    pub rendered: bool,
    /// DEC events produced by diffing the image.
    pub dec_events: usize,
    /// DEC events written to the host.
    pub exported: usize,
}

/// Both sides of a shared volume and the state carried between ticks.
///
/// Not synchronized itself; [`SharedVolume`](crate::SharedVolume) keeps it
/// behind a mutex.
pub struct Orchestrator {
    image: Box<dyn ImageStream>,
    partition: Partition,
    dec: Rt11Filesystem,
    snapshot: FileTree<Rt11File>,
    dec_events: EventQueue,
    host: HostFilesystem,
    dec_changed_at: Option<Instant>,
    needs_diff: bool,
    clear_host_acks: bool,
    clock: Arc<dyn Clock>,
    options: SyncOptions,
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("partition", &self.partition.name())
            .field("dec", &self.dec)
            .field("host", &self.host)
            .field("needs_diff", &self.needs_diff)
            .finish_non_exhaustive()
    }
}

fn settled(changed_at: Option<Instant>, now: Instant, settle: Duration) -> bool {
    changed_at.is_none_or(|t| now.saturating_duration_since(t) >= settle)
}

impl Orchestrator {
    /// Parse both sides and queue the initial exchange.
    ///
    /// Host files whose names collide with files on the volume are dropped
    /// from the import; the image wins. The snapshot starts empty so that the
    /// first DEC diff exports every file on the volume.
    ///
    /// # Errors
    ///
    /// Returns an error if the image cannot be read or the host directory
    /// cannot be scanned. A structurally damaged volume is not an error; it
    /// is reported through the filesystem fault.
    pub fn new(
        mut image: Box<dyn ImageStream>,
        mut partition: Partition,
        mut dec: Rt11Filesystem,
        mut host: HostFilesystem,
        clock: Arc<dyn Clock>,
        options: SyncOptions,
    ) -> SyncResult<Self> {
        match dec.parse(&mut partition, image.as_mut()) {
            Ok(()) => {},
            Err(e) if e.is_structural() => {
                warn!(error = %e, "Volume is damaged, sharing what could be read");
            },
            Err(e) => return Err(e.into()),
        }
        host.parse()?;
        let dropped = host.events().discard(|e| {
            let (name, kind) = StreamKind::split_host_name(e.path.trim_start_matches('/'));
            dec.file(name).is_some_and(|f| f.stream(kind).is_some())
        });
        if dropped > 0 {
            info!(dropped, "Host files shadowed by volume files");
        }
        let snapshot = FileTree::new(Arc::clone(&clock));
        Ok(Self {
            image,
            partition,
            dec,
            snapshot,
            dec_events: EventQueue::new("dec"),
            host,
            dec_changed_at: None,
            needs_diff: true,
            clear_host_acks: false,
            clock,
            options,
        })
    }

    /// The RT-11 view of the image.
    #[must_use]
    pub fn dec(&self) -> &Rt11Filesystem {
        &self.dec
    }

    /// The host mirror.
    #[must_use]
    pub fn host(&self) -> &HostFilesystem {
        &self.host
    }

    /// Tick timing in effect.
    #[must_use]
    pub fn options(&self) -> &SyncOptions {
        &self.options
    }

    /// Image size in bytes.
    #[must_use]
    pub fn image_size(&self) -> u64 {
        self.image.size()
    }

    /// Device read.
    ///
    /// # Errors
    ///
    /// Returns an error if the image read fails.
    pub fn device_read(&mut self, buf: &mut [u8], position: u64) -> SyncResult<()> {
        Ok(self.image.read(buf, position)?)
    }

    /// Device write: the touched blocks are marked dirty for the next diff.
    ///
    /// # Errors
    ///
    /// Returns an error if the image write fails.
    pub fn device_write(&mut self, buf: &[u8], position: u64) -> SyncResult<()> {
        self.image.write(buf, position)?;
        let marked = self.partition.mark_dirty_at(position, buf.len() as u64);
        if marked > 0 {
            self.dec_changed_at = Some(self.clock.now());
        }
        Ok(())
    }

    /// Change the volume through the RT-11 API, then render it.
    ///
    /// # Errors
    ///
    /// Returns the error of `update`, or a render error; nothing is rendered
    /// if `update` fails.
    pub fn update_dec<R>(
        &mut self,
        update: impl FnOnce(&mut Rt11Filesystem) -> Result<R, Rt11Error>,
    ) -> SyncResult<R> {
        let result = update(&mut self.dec)?;
        // Rendering leaves the rewritten files' blocks dirty, so the next
        // diff flags them the same way device writes do.
        self.render()?;
        Ok(result)
    }

    /// Write an empty RT-11 volume.
    ///
    /// # Errors
    ///
    /// Returns an error if the image cannot be written.
    pub fn format(&mut self) -> SyncResult<()> {
        self.dec.format(&mut self.partition, self.image.as_mut())?;
        self.needs_diff = true;
        Ok(())
    }

    fn render(&mut self) -> SyncResult<()> {
        self.dec.sort();
        self.dec.render(&mut self.partition, self.image.as_mut())?;
        self.needs_diff = true;
        Ok(())
    }

    /// Run one synchronization step.
    ///
    /// # Errors
    ///
    /// Returns an error for image failures. Problems with single files are
    /// logged and skipped.
    pub fn tick(&mut self) -> SyncResult<TickReport> {
        let mut report = TickReport {
            host_changes: self.host.poll(),
            ..TickReport::default()
        };
        // The first poll that sees anything after an export has collected
        // its echoes; later host changes are the user's.
        if self.clear_host_acks && report.host_changes > 0 {
            self.host.events().clear_acks();
            self.clear_host_acks = false;
        }

        let now = self.clock.now();
        let settle = self.options.settle;
        let dec_settled = settled(self.dec_changed_at, now, settle);
        let dec_dirty = self.partition.dirty_count() > 0;

        let host_ready = !self.host.events().is_empty()
            && settled(self.host.last_change(), now, settle)
            && dec_settled
            && !dec_dirty;
        if host_ready && self.dec.fault().is_some() {
            // Rendering would overwrite whatever the damaged directory hides.
            let dropped = self.host.events().drain().len();
            warn!(dropped, "Volume is damaged, host changes not applied");
        } else if host_ready {
            report.imported = self.import_host_events();
            if report.imported > 0 {
                self.render()?;
                report.rendered = true;
            }
        }

        if (dec_dirty && dec_settled) || self.needs_diff {
            report.dec_events = self.collect_dec_events()?;
        }

        report.exported = self.export_dec_events();
        if report.exported > 0 {
            self.clear_host_acks = true;
        }
        if report != TickReport::default() {
            debug!(?report, "Tick");
        }
        Ok(report)
    }

    /// Apply queued host events to the RT-11 tree. Returns how many changed
    /// the tree.
    fn import_host_events(&mut self) -> usize {
        let mut applied = 0usize;
        for event in self.host.events().drain() {
            if event.is_dir {
                continue;
            }
            let (name, kind) = StreamKind::split_host_name(event.path.trim_start_matches('/'));
            if name.contains('/') {
                debug!(path = %event.path, "Ignoring file in a subdirectory");
                continue;
            }
            if InternalKind::from_file_name(name) == Some(InternalKind::VolumeInfo) {
                debug!(path = %event.path, "Ignoring write to volume information");
                continue;
            }
            let result = match event.kind {
                EventKind::Create | EventKind::Modify => self.import_write(&event, name, kind),
                EventKind::Delete => self.dec.delete_stream(name, kind),
            };
            match result {
                Ok(true) => {
                    self.dec_events.ack(event.path.clone());
                    applied = applied.saturating_add(1);
                    debug!(event = %event, "Applied host change to volume");
                },
                Ok(false) => {},
                Err(e) if e.is_capacity() => {
                    warn!(path = %event.path, error = %e, "Volume full, host change not applied");
                },
                Err(Rt11Error::InvalidName(_)) => {
                    warn!(path = %event.path, "Host file name has no RT-11 equivalent, skipping");
                },
                Err(e) => warn!(path = %event.path, error = %e, "Failed to apply host change"),
            }
        }
        applied
    }

    fn import_write(
        &mut self,
        event: &FileEvent,
        name: &str,
        kind: StreamKind,
    ) -> Result<bool, Rt11Error> {
        let data = match self.host.read_file(&event.path) {
            Ok(data) => data,
            Err(e) => {
                debug!(path = %event.path, error = %e, "Host file unreadable, skipping");
                return Ok(false);
            },
        };
        let meta = event.file.as_ref().map(|f| f.meta.clone()).unwrap_or_default();
        self.dec.write_stream(name, kind, data, Some(meta.mtime), meta.readonly)?;
        Ok(true)
    }

    /// Re-parse the image and queue the differences to the last snapshot.
    fn collect_dec_events(&mut self) -> SyncResult<usize> {
        let block_size = self.partition.block_size();
        let partition = &self.partition;
        let flagged = update_changed(&mut self.snapshot, block_size, |start, count| {
            partition.any_dirty(start, count)
        });
        if flagged > 0 {
            debug!(streams = flagged, "Device writes touched file streams");
        }

        match self.dec.parse(&mut self.partition, self.image.as_mut()) {
            Ok(()) => {},
            Err(e) if e.is_structural() => {
                warn!(error = %e, "Volume inconsistent after device writes");
            },
            Err(e) => return Err(e.into()),
        }

        let mut queued = 0usize;
        for event in diff(&self.snapshot, self.dec.tree()) {
            if self.dec_events.push(event) {
                queued = queued.saturating_add(1);
            }
        }
        self.snapshot = snapshot(self.dec.tree());
        self.dec_events.clear_acks();
        self.needs_diff = false;
        self.dec_changed_at = None;
        Ok(queued)
    }

    /// Mirror queued DEC events on the host. Returns how many were written.
    fn export_dec_events(&mut self) -> usize {
        let mut exported = 0usize;
        while let Some(event) = self.dec_events.pop() {
            let result = match (&event.kind, &event.file) {
                (EventKind::Delete, _) => self.host.delete_file(&event.path),
                (_, Some(file)) => {
                    let data = file.data.as_deref().unwrap_or_default();
                    self.host.write_file(&event.path, data, &file.meta)
                },
                (_, None) => continue,
            };
            match result {
                Ok(()) => {
                    exported = exported.saturating_add(1);
                    debug!(event = %event, "Applied volume change to host");
                },
                Err(e) => {
                    warn!(event = %event, error = %e, "Failed to apply volume change to host");
                },
            }
        }
        exported
    }

    /// Flush and release the image.
    ///
    /// # Errors
    ///
    /// Returns an error if flushing fails.
    pub fn close(&mut self) -> SyncResult<()> {
        if self.image.is_open() {
            self.image.close()?;
        }
        Ok(())
    }
}

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::error::{ImageError, ImageResult};

/// Random-access byte stream over an emulated disk image.
///
/// Reads past the current end of the image return zeros, so a freshly
/// created (empty) image behaves like an all-zero disk. Writes past the end
/// extend the image.
pub trait ImageStream: Send {
    /// Fill `buf` with the bytes starting at `position`.
    ///
    /// # Errors
    ///
    /// Returns an error if the stream is closed or the underlying read fails.
    fn read(&mut self, buf: &mut [u8], position: u64) -> ImageResult<()>;

    /// Write `buf` at `position`.
    ///
    /// # Errors
    ///
    /// Returns an error if the stream is closed or the underlying write fails.
    fn write(&mut self, buf: &[u8], position: u64) -> ImageResult<()>;

    /// Current size of the image in bytes.
    fn size(&self) -> u64;

    /// Grow or shrink the image to exactly `size` bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the stream is closed or the resize fails.
    fn set_size(&mut self, size: u64) -> ImageResult<()>;

    /// Flush and release the underlying storage.
    ///
    /// # Errors
    ///
    /// Returns an error if flushing fails.
    fn close(&mut self) -> ImageResult<()>;

    /// True until [`close`](Self::close) has been called.
    fn is_open(&self) -> bool;
}

/// An image backed by a file on the host.
#[derive(Debug)]
pub struct FileImage {
    path: PathBuf,
    file: Option<File>,
    size: u64,
}

impl FileImage {
    /// Open an image file.
    ///
    /// With `create_if_missing`, a missing file is created empty.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened or created.
    pub fn open(path: impl Into<PathBuf>, create_if_missing: bool) -> ImageResult<Self> {
        let path = path.into();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(create_if_missing)
            .truncate(false)
            .open(&path)?;
        let size = file.metadata()?.len();
        info!(path = %path.display(), size, "Opened image file");
        Ok(Self {
            path,
            file: Some(file),
            size,
        })
    }

    /// Path of the image file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn file(&mut self) -> ImageResult<&mut File> {
        self.file.as_mut().ok_or(ImageError::Closed)
    }
}

impl ImageStream for FileImage {
    fn read(&mut self, buf: &mut [u8], position: u64) -> ImageResult<()> {
        let size = self.size;
        let file = self.file()?;
        buf.fill(0);
        if position >= size {
            return Ok(());
        }
        let available = usize::try_from(size.saturating_sub(position)).unwrap_or(usize::MAX);
        let len = buf.len().min(available);
        file.seek(SeekFrom::Start(position))?;
        file.read_exact(&mut buf[..len])?;
        Ok(())
    }

    fn write(&mut self, buf: &[u8], position: u64) -> ImageResult<()> {
        let file = self.file()?;
        file.seek(SeekFrom::Start(position))?;
        file.write_all(buf)?;
        let end = position.saturating_add(buf.len() as u64);
        self.size = self.size.max(end);
        Ok(())
    }

    fn size(&self) -> u64 {
        self.size
    }

    fn set_size(&mut self, size: u64) -> ImageResult<()> {
        self.file()?.set_len(size)?;
        self.size = size;
        Ok(())
    }

    fn close(&mut self) -> ImageResult<()> {
        if let Some(file) = self.file.take() {
            file.sync_all()?;
            debug!(path = %self.path.display(), "Closed image file");
        }
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.file.is_some()
    }
}

/// An image held entirely in memory. Used for scratch volumes and tests.
#[derive(Debug, Clone, Default)]
pub struct MemoryImage {
    data: Vec<u8>,
    closed: bool,
}

impl MemoryImage {
    /// Create a zero-filled image of `size` bytes.
    #[must_use]
    pub fn new(size: usize) -> Self {
        Self::from_bytes(vec![0; size])
    }

    /// Wrap existing image bytes.
    #[must_use]
    pub fn from_bytes(data: Vec<u8>) -> Self {
        Self {
            data,
            closed: false,
        }
    }

    /// Borrow the raw image bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Consume the image and return its bytes.
    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }

    fn check_open(&self) -> ImageResult<()> {
        if self.closed {
            Err(ImageError::Closed)
        } else {
            Ok(())
        }
    }
}

impl ImageStream for MemoryImage {
    fn read(&mut self, buf: &mut [u8], position: u64) -> ImageResult<()> {
        self.check_open()?;
        buf.fill(0);
        let Ok(start) = usize::try_from(position) else {
            return Ok(());
        };
        if start >= self.data.len() {
            return Ok(());
        }
        let available = &self.data[start..];
        let len = buf.len().min(available.len());
        buf[..len].copy_from_slice(&available[..len]);
        Ok(())
    }

    fn write(&mut self, buf: &[u8], position: u64) -> ImageResult<()> {
        self.check_open()?;
        let start = usize::try_from(position)
            .map_err(|_| ImageError::Io(std::io::Error::other("position exceeds memory image")))?;
        let end = start
            .checked_add(buf.len())
            .ok_or_else(|| ImageError::Io(std::io::Error::other("position exceeds memory image")))?;
        if end > self.data.len() {
            self.data.resize(end, 0);
        }
        self.data[start..end].copy_from_slice(buf);
        Ok(())
    }

    fn size(&self) -> u64 {
        self.data.len() as u64
    }

    fn set_size(&mut self, size: u64) -> ImageResult<()> {
        self.check_open()?;
        let size = usize::try_from(size)
            .map_err(|_| ImageError::Io(std::io::Error::other("size exceeds memory image")))?;
        self.data.resize(size, 0);
        Ok(())
    }

    fn close(&mut self) -> ImageResult<()> {
        self.closed = true;
        Ok(())
    }

    fn is_open(&self) -> bool {
        !self.closed
    }
}

#[cfg(test)]
#[allow(clippy::arithmetic_side_effects)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_read_past_end_is_zero() {
        let mut image = MemoryImage::from_bytes(vec![1, 2, 3]);
        let mut buf = [0xffu8; 6];
        image.read(&mut buf, 1).unwrap();
        assert_eq!(buf, [2, 3, 0, 0, 0, 0]);
    }

    #[test]
    fn test_memory_write_extends() {
        let mut image = MemoryImage::new(2);
        image.write(&[7, 8], 4).unwrap();
        assert_eq!(image.as_bytes(), &[0, 0, 0, 0, 7, 8]);
        assert_eq!(image.size(), 6);
    }

    #[test]
    fn test_memory_closed_rejects_io() {
        let mut image = MemoryImage::new(4);
        image.close().unwrap();
        assert!(!image.is_open());
        let mut buf = [0u8; 1];
        assert!(matches!(image.read(&mut buf, 0), Err(ImageError::Closed)));
    }

    #[test]
    fn test_file_image_create_and_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("disk.dsk");
        assert!(FileImage::open(&path, false).is_err());

        let mut image = FileImage::open(&path, true).unwrap();
        assert_eq!(image.size(), 0);
        image.write(b"RT11", 512).unwrap();
        assert_eq!(image.size(), 516);
        image.close().unwrap();

        let mut image = FileImage::open(&path, false).unwrap();
        let mut buf = [0u8; 8];
        image.read(&mut buf, 512).unwrap();
        assert_eq!(&buf, b"RT11\0\0\0\0");
    }

    #[test]
    fn test_file_image_set_size() {
        let dir = tempfile::tempdir().unwrap();
        let mut image = FileImage::open(dir.path().join("x.img"), true).unwrap();
        image.set_size(4096).unwrap();
        assert_eq!(image.size(), 4096);
        assert_eq!(std::fs::metadata(image.path()).unwrap().len(), 4096);
    }
}

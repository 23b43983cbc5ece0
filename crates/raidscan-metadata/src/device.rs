//! Block device abstraction
//!
//! Every metadata driver reads through `BlockDevice`, so the same code
//! examines real disks, image files and in-memory fixtures.

use std::io;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Read-only view of a device
pub trait BlockDevice: Send {
    /// Path the device was opened from
    fn path(&self) -> &str;

    /// Size in bytes
    fn size(&self) -> u64;

    /// Fill `buf` from `offset`; short reads are errors
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> io::Result<()>;

    /// Metadata name when the device is an assembled md container
    ///
    /// This is the cheap pre-check the dispatcher runs before content
    /// detection; `None` for ordinary devices.
    fn container_metadata(&self) -> Option<String> {
        None
    }

    /// Hardware serial number, when the device reports one
    fn serial(&self) -> Option<String> {
        None
    }

    /// Read `len` bytes from `offset` into a new buffer
    fn read_vec(&self, offset: u64, len: usize) -> io::Result<Vec<u8>> {
        let mut buf = vec![0u8; len];
        self.read_at(offset, &mut buf)?;
        Ok(buf)
    }
}

/// Opens devices by path
///
/// The examine engine opens every device through this seam; dropping the
/// returned handle closes the device.
pub trait DeviceOpener {
    fn open(&self, path: &Path) -> io::Result<Box<dyn BlockDevice>>;
}

/// In-memory device image
#[derive(Clone, Debug, Default)]
pub struct MemoryDevice {
    path: String,
    data: Vec<u8>,
    serial: Option<String>,
    container: Option<String>,
}

impl MemoryDevice {
    /// Create an image of `size` zero bytes
    pub fn new(path: impl Into<String>, size: usize) -> Self {
        Self::from_bytes(path, vec![0u8; size])
    }

    /// Wrap existing image bytes
    pub fn from_bytes(path: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            path: path.into(),
            data,
            serial: None,
            container: None,
        }
    }

    /// Set the reported serial number
    #[must_use]
    pub fn with_serial(mut self, serial: impl Into<String>) -> Self {
        self.serial = Some(serial.into());
        self
    }

    /// Report the device as an md container with the given metadata
    #[must_use]
    pub fn with_container(mut self, metadata: impl Into<String>) -> Self {
        self.container = Some(metadata.into());
        self
    }

    /// Copy `bytes` into the image at `offset`
    ///
    /// # Panics
    /// Panics if the write falls outside the image
    pub fn write_at(&mut self, offset: u64, bytes: &[u8]) {
        let start = usize::try_from(offset).unwrap_or(usize::MAX);
        self.data[start..start + bytes.len()].copy_from_slice(bytes);
    }

    /// Raw image bytes
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }
}

impl BlockDevice for MemoryDevice {
    fn path(&self) -> &str {
        &self.path
    }

    fn size(&self) -> u64 {
        self.data.len() as u64
    }

    fn read_at(&self, offset: u64, buf: &mut [u8]) -> io::Result<()> {
        let start = usize::try_from(offset)
            .ok()
            .filter(|start| start.saturating_add(buf.len()) <= self.data.len())
            .ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    format!("read of {} bytes at {offset} past end of {}", buf.len(), self.path),
                )
            })?;
        buf.copy_from_slice(&self.data[start..start + buf.len()]);
        Ok(())
    }

    fn container_metadata(&self) -> Option<String> {
        self.container.clone()
    }

    fn serial(&self) -> Option<String> {
        self.serial.clone()
    }
}

/// Open/close counters shared between an opener and its handles
#[derive(Clone, Debug, Default)]
pub struct OpenCounters {
    opened: Arc<AtomicUsize>,
    closed: Arc<AtomicUsize>,
}

impl OpenCounters {
    #[must_use]
    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn closed(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }

    /// Handles currently open
    #[must_use]
    pub fn outstanding(&self) -> usize {
        self.opened().saturating_sub(self.closed())
    }
}

/// Opener serving a fixed set of in-memory images
///
/// Paths not in the set fail with `NotFound`. Every handle it returns
/// is counted so callers can check that all of them were closed.
#[derive(Debug, Default)]
pub struct MemoryOpener {
    devices: Vec<MemoryDevice>,
    counters: OpenCounters,
}

impl MemoryOpener {
    #[must_use]
    pub fn new(devices: Vec<MemoryDevice>) -> Self {
        Self {
            devices,
            counters: OpenCounters::default(),
        }
    }

    /// Shared counters for the handles this opener hands out
    #[must_use]
    pub fn counters(&self) -> OpenCounters {
        self.counters.clone()
    }
}

impl DeviceOpener for MemoryOpener {
    fn open(&self, path: &Path) -> io::Result<Box<dyn BlockDevice>> {
        let wanted = path.to_string_lossy();
        let device = self
            .devices
            .iter()
            .find(|d| d.path == wanted)
            .cloned()
            .ok_or_else(|| io::Error::from(io::ErrorKind::NotFound))?;
        self.counters.opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(CountedDevice {
            inner: device,
            counters: self.counters.clone(),
        }))
    }
}

struct CountedDevice {
    inner: MemoryDevice,
    counters: OpenCounters,
}

impl BlockDevice for CountedDevice {
    fn path(&self) -> &str {
        self.inner.path()
    }

    fn size(&self) -> u64 {
        self.inner.size()
    }

    fn read_at(&self, offset: u64, buf: &mut [u8]) -> io::Result<()> {
        self.inner.read_at(offset, buf)
    }

    fn container_metadata(&self) -> Option<String> {
        self.inner.container_metadata()
    }

    fn serial(&self) -> Option<String> {
        self.inner.serial()
    }
}

impl Drop for CountedDevice {
    fn drop(&mut self) {
        self.counters.closed.fetch_add(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_device_read() {
        let mut dev = MemoryDevice::new("/dev/mem0", 8192);
        dev.write_at(4096, b"magic");

        let buf = dev.read_vec(4096, 5).unwrap();
        assert_eq!(&buf, b"magic");
        assert_eq!(dev.size(), 8192);

        let err = dev.read_vec(8190, 5).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }

    #[test]
    fn test_memory_opener_counts_handles() {
        let opener = MemoryOpener::new(vec![MemoryDevice::new("/dev/sda", 512)]);
        let counters = opener.counters();

        {
            let dev = opener.open(Path::new("/dev/sda")).unwrap();
            assert_eq!(dev.path(), "/dev/sda");
            assert_eq!(counters.outstanding(), 1);
        }
        assert_eq!(counters.opened(), 1);
        assert_eq!(counters.closed(), 1);

        let missing = opener.open(Path::new("/dev/sdz"));
        assert!(missing.is_err());
        assert_eq!(counters.opened(), 1);
    }
}

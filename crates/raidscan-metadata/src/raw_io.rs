//! Platform-specific raw device access
//!
//! Devices are opened read-only through the page cache; examining never
//! writes. On Linux the size of a block device comes from the
//! `BLKGETSIZE64` ioctl and container/serial information from sysfs.

use crate::device::{BlockDevice, DeviceOpener};
use std::fs::{self, File, OpenOptions};
use std::io;
use std::os::unix::fs::{FileExt, FileTypeExt, MetadataExt};
use std::path::Path;
use tracing::trace;

#[cfg(target_os = "linux")]
nix::ioctl_read!(blkgetsize64, 0x12, 114, u64);

/// Read-only handle on a block device or image file
///
/// The descriptor is closed when the handle is dropped.
#[derive(Debug)]
pub struct RawDevice {
    file: File,
    path: String,
    size: u64,
    rdev: Option<(u32, u32)>,
}

impl RawDevice {
    /// Open a device for examination
    pub fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        let path_str = path.as_ref().to_string_lossy().to_string();

        let file = OpenOptions::new().read(true).open(&path)?;
        let metadata = file.metadata()?;

        let (size, rdev) = if metadata.file_type().is_block_device() {
            let size = Self::get_block_device_size(&file)?;
            (size, Some(split_dev(metadata.rdev())))
        } else {
            (metadata.len(), None)
        };

        trace!("opened {} ({} bytes)", path_str, size);

        Ok(Self {
            file,
            path: path_str,
            size,
            rdev,
        })
    }

    /// Get block device size using ioctl
    #[cfg(target_os = "linux")]
    #[allow(unsafe_code)]
    fn get_block_device_size(file: &File) -> io::Result<u64> {
        use std::os::unix::io::AsRawFd;

        let mut size: u64 = 0;
        // SAFETY: the descriptor is open for the lifetime of `file` and
        // `size` is a valid u64 the kernel writes into.
        unsafe { blkgetsize64(file.as_raw_fd(), &raw mut size) }.map_err(io::Error::from)?;
        Ok(size)
    }

    /// Get block device size (non-Linux fallback)
    #[cfg(not(target_os = "linux"))]
    fn get_block_device_size(file: &File) -> io::Result<u64> {
        use std::io::{Seek, SeekFrom};
        let mut f = file;
        let size = f.seek(SeekFrom::End(0))?;
        f.seek(SeekFrom::Start(0))?;
        Ok(size)
    }

    fn sysfs_attr(&self, attr: &str) -> Option<String> {
        let (major, minor) = self.rdev?;
        let path = format!("/sys/dev/block/{major}:{minor}/{attr}");
        fs::read_to_string(path)
            .ok()
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
    }
}

impl BlockDevice for RawDevice {
    fn path(&self) -> &str {
        &self.path
    }

    fn size(&self) -> u64 {
        self.size
    }

    fn read_at(&self, offset: u64, buf: &mut [u8]) -> io::Result<()> {
        self.file.read_exact_at(buf, offset)
    }

    fn container_metadata(&self) -> Option<String> {
        if self.sysfs_attr("md/level")? != "container" {
            return None;
        }
        let version = self.sysfs_attr("md/metadata_version")?;
        version
            .strip_prefix("external:")
            .map(ToString::to_string)
            .or(Some(version))
    }

    fn serial(&self) -> Option<String> {
        self.sysfs_attr("device/serial")
            .or_else(|| self.sysfs_attr("../device/serial"))
    }
}

/// Opener for real devices and image files
#[derive(Clone, Copy, Debug, Default)]
pub struct RawOpener;

impl DeviceOpener for RawOpener {
    fn open(&self, path: &Path) -> io::Result<Box<dyn BlockDevice>> {
        Ok(Box::new(RawDevice::open(path)?))
    }
}

/// Split a Linux `dev_t` into major and minor numbers
#[allow(clippy::cast_possible_truncation)]
const fn split_dev(dev: u64) -> (u32, u32) {
    let major = ((dev >> 8) & 0xfff) | ((dev >> 32) & !0xfff);
    let minor = (dev & 0xff) | ((dev >> 12) & !0xff);
    (major as u32, minor as u32)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_raw_device_reads_image_file() {
        let mut temp = NamedTempFile::new().unwrap();
        let mut image = vec![0u8; 8192];
        image[4096..4101].copy_from_slice(b"hello");
        temp.write_all(&image).unwrap();
        temp.flush().unwrap();

        let dev = RawDevice::open(temp.path()).unwrap();
        assert_eq!(dev.size(), 8192);
        assert_eq!(dev.read_vec(4096, 5).unwrap(), b"hello");
        assert!(dev.read_vec(8190, 16).is_err());

        // Image files are never containers and have no serial
        assert!(dev.container_metadata().is_none());
        assert!(dev.serial().is_none());
    }

    #[test]
    fn test_raw_opener_missing_path() {
        let err = RawOpener
            .open(Path::new("/nonexistent/raidscan-test-device"))
            .err()
            .unwrap();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }

    #[test]
    fn test_split_dev() {
        // 8:16 is /dev/sdb on most systems
        assert_eq!(split_dev(0x810), (8, 16));
        // 259:0 (nvme) with the high minor encoding
        assert_eq!(split_dev(259 << 8), (259, 0));
    }
}

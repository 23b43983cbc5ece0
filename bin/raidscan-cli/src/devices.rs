//! Device enumeration for `--scan`

use anyhow::Result;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Kernel block devices that never carry array metadata
const SKIPPED_PREFIXES: &[&str] = &["ram", "loop", "sr", "fd"];

/// Every block device and partition known to the kernel
pub fn scan_devices() -> Result<Vec<PathBuf>> {
    let sys_block = Path::new("/sys/block");
    if !sys_block.exists() {
        debug!("{} not present, nothing to scan", sys_block.display());
        return Ok(Vec::new());
    }
    scan_devices_in(sys_block, Path::new("/dev"))
}

/// Enumerate `sys_block`, naming devices under `dev`
///
/// Disks come in name order, each followed by its partitions.
pub fn scan_devices_in(sys_block: &Path, dev: &Path) -> Result<Vec<PathBuf>> {
    let mut disks: Vec<String> = fs::read_dir(sys_block)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.file_name().to_string_lossy().into_owned())
        .filter(|name| !SKIPPED_PREFIXES.iter().any(|p| name.starts_with(p)))
        .collect();
    disks.sort();

    let mut devices = Vec::new();
    for disk in disks {
        devices.push(dev.join(&disk));

        let Ok(entries) = fs::read_dir(sys_block.join(&disk)) else {
            continue;
        };
        let mut partitions: Vec<String> = entries
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.path().join("partition").exists())
            .map(|entry| entry.file_name().to_string_lossy().into_owned())
            .filter(|name| name.starts_with(&disk))
            .collect();
        partitions.sort();
        devices.extend(partitions.iter().map(|p| dev.join(p)));
    }

    debug!("found {} block devices", devices.len());
    Ok(devices)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    /// Fake `/sys/block` with `disks` and `(disk, partition)` pairs
    fn fake_sysfs(disks: &[&str], partitions: &[(&str, &str)]) -> TempDir {
        let root = TempDir::new().unwrap();
        for disk in disks {
            let disk_dir = root.path().join(disk);
            fs::create_dir_all(disk_dir.join("queue")).unwrap();
            fs::write(disk_dir.join("size"), "2048\n").unwrap();
        }
        for (disk, part) in partitions {
            let part_dir = root.path().join(disk).join(part);
            fs::create_dir_all(&part_dir).unwrap();
            fs::write(part_dir.join("partition"), "1\n").unwrap();
        }
        root
    }

    #[test]
    fn test_disks_and_partitions_in_order() {
        let sysfs = fake_sysfs(
            &["sdb", "sda", "nvme0n1"],
            &[("sda", "sda2"), ("sda", "sda1"), ("nvme0n1", "nvme0n1p1")],
        );

        let devices = scan_devices_in(sysfs.path(), Path::new("/dev")).unwrap();
        let names: Vec<_> = devices.iter().map(|p| p.display().to_string()).collect();
        assert_eq!(
            names,
            [
                "/dev/nvme0n1",
                "/dev/nvme0n1p1",
                "/dev/sda",
                "/dev/sda1",
                "/dev/sda2",
                "/dev/sdb"
            ]
        );
    }

    #[test]
    fn test_virtual_devices_skipped() {
        let sysfs = fake_sysfs(&["loop0", "ram1", "sr0", "fd0", "vda"], &[]);

        let devices = scan_devices_in(sysfs.path(), Path::new("/dev")).unwrap();
        assert_eq!(devices, [PathBuf::from("/dev/vda")]);
    }
}

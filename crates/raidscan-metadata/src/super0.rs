//! md version 0.90 superblocks
//!
//! The superblock is 1024 little-endian words stored in the last 64 KiB
//! aligned block of the device:
//! ```text
//! word   0..32   generic constants (magic, versions, uuid0, ctime, level, ...)
//! word  32..64   generic state (utime, state, disk counts, csum, events)
//! word  64..128  personality (layout, chunk size)
//! word 128..992  27 disk descriptors of 32 words
//! word 992..1024 descriptor of this disk
//! ```

use crate::device::BlockDevice;
use crate::format::{
    FormatCapabilities, MetadataFormat, MetadataHandler, SuperResult, fold_csum, format_ctime,
};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use raidscan_common::{
    ArrayInfo, ArrayUuid, DiskInfo, DiskState, SuperError, human_size_brief, level_name,
};
use sha1::{Digest, Sha1};
use std::any::Any;
use std::fmt::Write as _;
use tracing::{debug, info, warn};

/// Magic number of a 0.90 superblock
pub const MD_SB_MAGIC: u32 = 0xa92b_4efc;

/// Superblock size in bytes
pub const MD_SB_BYTES: usize = 4096;

/// Superblock size in words
pub const MD_SB_WORDS: usize = MD_SB_BYTES / 4;

/// Space reserved at the end of the device
pub const MD_RESERVED_BYTES: u64 = 64 * 1024;

/// Number of disk descriptors in the superblock
pub const MD_SB_DISKS: usize = 27;

const MD_SB_DESCRIPTOR_WORDS: usize = 32;
const MD_SB_DISKS_WORD: usize = 128;
const MD_SB_THIS_DISK_WORD: usize = MD_SB_WORDS - MD_SB_DESCRIPTOR_WORDS;
const MD_SB_GENERIC_CONSTANT_WORDS: usize = 32;
const CSUM_WORD: usize = 38;

/// Bit in `state` marking a cleanly stopped array
pub const MD_SB_CLEAN: u32 = 0;

/// Superblock location for a device of `size` bytes
#[must_use]
pub const fn super_offset(size: u64) -> u64 {
    (size & !(MD_RESERVED_BYTES - 1)).saturating_sub(MD_RESERVED_BYTES)
}

/// One disk descriptor
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Super0Disk {
    pub number: u32,
    pub major: u32,
    pub minor: u32,
    pub raid_disk: u32,
    pub state: u32,
}

impl Super0Disk {
    fn from_words(words: &[u32]) -> Self {
        Self {
            number: words[0],
            major: words[1],
            minor: words[2],
            raid_disk: words[3],
            state: words[4],
        }
    }

    fn write_words(&self, words: &mut [u32]) {
        words[..5].copy_from_slice(&[
            self.number,
            self.major,
            self.minor,
            self.raid_disk,
            self.state,
        ]);
    }
}

/// Decoded 0.90 superblock
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Super0Header {
    pub major_version: u32,
    pub minor_version: u32,
    pub patch_version: u32,
    /// The four identifier words, in host order
    pub set_uuid: [u32; 4],
    pub ctime: u32,
    pub level: i32,
    /// Used size of each member, in KiB
    pub size: u32,
    pub nr_disks: u32,
    pub raid_disks: u32,
    pub md_minor: u32,
    pub utime: u32,
    pub state: u32,
    pub active_disks: u32,
    pub working_disks: u32,
    pub failed_disks: u32,
    pub spare_disks: u32,
    pub sb_csum: u32,
    pub events: u64,
    pub layout: u32,
    pub chunk_size: u32,
    pub disks: [Super0Disk; MD_SB_DISKS],
    pub this_disk: Super0Disk,
}

impl Super0Header {
    /// Decode from the raw word array
    #[allow(clippy::cast_possible_wrap)]
    #[must_use]
    pub fn from_words(words: &[u32]) -> Self {
        let mut disks = [Super0Disk::default(); MD_SB_DISKS];
        for (i, disk) in disks.iter_mut().enumerate() {
            let start = MD_SB_DISKS_WORD + i * MD_SB_DESCRIPTOR_WORDS;
            *disk = Super0Disk::from_words(&words[start..start + MD_SB_DESCRIPTOR_WORDS]);
        }
        Self {
            major_version: words[1],
            minor_version: words[2],
            patch_version: words[3],
            set_uuid: [words[5], words[13], words[14], words[15]],
            ctime: words[6],
            level: words[7] as i32,
            size: words[8],
            nr_disks: words[9],
            raid_disks: words[10],
            md_minor: words[11],
            utime: words[32],
            state: words[33],
            active_disks: words[34],
            working_disks: words[35],
            failed_disks: words[36],
            spare_disks: words[37],
            sb_csum: words[CSUM_WORD],
            events: u64::from(words[39]) | (u64::from(words[40]) << 32),
            layout: words[64],
            chunk_size: words[65],
            disks,
            this_disk: Super0Disk::from_words(&words[MD_SB_THIS_DISK_WORD..]),
        }
    }

    /// Encode into the raw word array
    #[allow(clippy::cast_sign_loss, clippy::cast_possible_truncation)]
    #[must_use]
    pub fn to_words(&self) -> Vec<u32> {
        let mut words = vec![0u32; MD_SB_WORDS];
        words[0] = MD_SB_MAGIC;
        words[1] = self.major_version;
        words[2] = self.minor_version;
        words[3] = self.patch_version;
        words[5] = self.set_uuid[0];
        words[6] = self.ctime;
        words[7] = self.level as u32;
        words[8] = self.size;
        words[9] = self.nr_disks;
        words[10] = self.raid_disks;
        words[11] = self.md_minor;
        words[13..16].copy_from_slice(&self.set_uuid[1..]);
        words[32] = self.utime;
        words[33] = self.state;
        words[34] = self.active_disks;
        words[35] = self.working_disks;
        words[36] = self.failed_disks;
        words[37] = self.spare_disks;
        words[CSUM_WORD] = self.sb_csum;
        words[39] = self.events as u32;
        words[40] = (self.events >> 32) as u32;
        words[64] = self.layout;
        words[65] = self.chunk_size;
        for (i, disk) in self.disks.iter().enumerate() {
            let start = MD_SB_DISKS_WORD + i * MD_SB_DESCRIPTOR_WORDS;
            disk.write_words(&mut words[start..]);
        }
        self.this_disk.write_words(&mut words[MD_SB_THIS_DISK_WORD..]);
        words
    }

    /// Serialize to bytes
    #[must_use]
    pub fn to_bytes(&self) -> Bytes {
        words_to_bytes(&self.to_words())
    }

    /// Compute the checksum of the encoded superblock
    #[must_use]
    pub fn compute_checksum(&self) -> u32 {
        checksum(&self.to_words())
    }

    /// Update the checksum field after modifying other fields
    pub fn update_checksum(&mut self) {
        self.sb_csum = self.compute_checksum();
    }

    /// Identifier bytes as stored on disk
    #[must_use]
    pub fn uuid(&self) -> ArrayUuid {
        let mut bytes = [0u8; 16];
        for (chunk, word) in bytes.chunks_exact_mut(4).zip(self.set_uuid) {
            chunk.copy_from_slice(&word.to_le_bytes());
        }
        ArrayUuid::from_bytes(bytes)
    }

    /// Identifier in the `%08x:%08x:%08x:%08x` form (one word before 0.90)
    #[must_use]
    pub fn uuid_string(&self) -> String {
        if self.minor_version >= 90 {
            self.uuid().to_md_string(true)
        } else {
            format!("{:08x}", self.set_uuid[0])
        }
    }

    /// Whether the identifier was derived from `homehost`
    #[must_use]
    pub fn is_local_to(&self, homehost: &str) -> bool {
        let digest = Sha1::digest(homehost.as_bytes());
        let mut stored = [0u8; 8];
        stored[..4].copy_from_slice(&self.set_uuid[2].to_le_bytes());
        stored[4..].copy_from_slice(&self.set_uuid[3].to_le_bytes());
        digest[..8] == stored
    }
}

fn words_to_bytes(words: &[u32]) -> Bytes {
    let mut buf = BytesMut::with_capacity(MD_SB_BYTES);
    for word in words {
        buf.put_u32_le(*word);
    }
    buf.freeze()
}

fn bytes_to_words(data: &[u8]) -> Vec<u32> {
    let mut buf = data;
    (0..MD_SB_WORDS).map(|_| buf.get_u32_le()).collect()
}

/// 0.90 checksum: 32-bit word sum with `sb_csum` zeroed, folded
fn checksum(words: &[u32]) -> u32 {
    let sum: u64 = words
        .iter()
        .enumerate()
        .filter(|(i, _)| *i != CSUM_WORD)
        .map(|(_, w)| u64::from(*w))
        .sum();
    fold_csum(sum)
}

/// The 0.90 format
#[derive(Debug)]
pub struct Super0Format;

/// Static descriptor registered in the format registry
pub static SUPER0: Super0Format = Super0Format;

impl MetadataFormat for Super0Format {
    fn name(&self) -> &'static str {
        "0.90"
    }

    fn capabilities(&self) -> FormatCapabilities {
        FormatCapabilities {
            name: "0.90",
            verbose: true,
            export: true,
            brief: true,
            ..Default::default()
        }
    }

    fn swap_uuid(&self) -> bool {
        true
    }

    fn accepts(&self, name: &str) -> bool {
        matches!(name, "0" | "0.90" | "0.90.0")
    }

    fn instantiate(&'static self, _name: &str) -> Box<dyn MetadataHandler> {
        Box::new(Super0Handler::default())
    }

    fn detect(&'static self, device: &dyn BlockDevice) -> Option<Box<dyn MetadataHandler>> {
        if device.size() < 2 * MD_RESERVED_BYTES {
            return None;
        }
        let mut magic = [0u8; 4];
        device.read_at(super_offset(device.size()), &mut magic).ok()?;
        (u32::from_le_bytes(magic) == MD_SB_MAGIC)
            .then(|| Box::new(Super0Handler::default()) as Box<dyn MetadataHandler>)
    }
}

/// Handler for one device's 0.90 superblock
#[derive(Clone, Debug, Default)]
pub struct Super0Handler {
    /// Raw words as read, kept for the sparc2.2 fixup
    raw: Vec<u32>,
    sb: Option<Super0Header>,
}

impl Super0Handler {
    /// Parsed superblock, once loaded
    #[must_use]
    pub const fn superblock(&self) -> Option<&Super0Header> {
        self.sb.as_ref()
    }

    fn sb(&self) -> &Super0Header {
        static EMPTY: std::sync::OnceLock<Super0Header> = std::sync::OnceLock::new();
        self.sb
            .as_ref()
            .unwrap_or_else(|| EMPTY.get_or_init(Super0Header::default))
    }
}

impl MetadataHandler for Super0Handler {
    fn format(&self) -> &'static dyn MetadataFormat {
        &SUPER0
    }

    fn load_super(&mut self, device: &dyn BlockDevice, devname: Option<&str>) -> SuperResult<()> {
        self.sb = None;
        self.raw.clear();

        let size = device.size();
        if size < 2 * MD_RESERVED_BYTES {
            if let Some(name) = devname {
                warn!("{name} is too small for md: size is {} sectors.", size / 512);
            }
            return Err(SuperError::TooSmall {
                size,
                required: 2 * MD_RESERVED_BYTES,
            });
        }

        let data = device.read_vec(super_offset(size), MD_SB_BYTES)?;
        let words = bytes_to_words(&data);
        if words[0] != MD_SB_MAGIC {
            if let Some(name) = devname {
                warn!(
                    "No super block found on {name} (Expected magic {MD_SB_MAGIC:08x}, got {:08x})",
                    words[0]
                );
            }
            return Err(SuperError::BadMagic {
                expected: MD_SB_MAGIC,
                found: words[0],
            });
        }
        if words[1] != 0 {
            if let Some(name) = devname {
                warn!("Cannot interpret superblock on {name} - version is {}", words[1]);
            }
            return Err(SuperError::UnsupportedVersion(format!(
                "{}.{}.{}",
                words[1], words[2], words[3]
            )));
        }

        debug!("loaded 0.90 superblock from {}", device.path());
        self.sb = Some(Super0Header::from_words(&words));
        self.raw = words;
        Ok(())
    }

    fn info(&self, _leg: usize) -> ArrayInfo {
        let sb = self.sb();
        let this = sb.this_disk;
        ArrayInfo {
            uuid: sb.uuid(),
            name: String::new(),
            level: sb.level,
            raid_disks: sb.raid_disks,
            disk: DiskInfo {
                number: i32::try_from(this.number).unwrap_or(-1),
                raid_disk: i32::try_from(this.raid_disk).unwrap_or(-1),
                state: DiskState::from_bits(this.state),
            },
            events: sb.events,
            cache_legs: 0,
        }
    }

    fn compare(&self, other: &dyn MetadataHandler) -> bool {
        let Some(other) = other.downcast_ref::<Self>() else {
            return false;
        };
        let (Some(a), Some(b)) = (&self.sb, &other.sb) else {
            return false;
        };
        let uuid_words = if a.minor_version >= 90 { 4 } else { 1 };
        a.set_uuid[..uuid_words] == b.set_uuid[..uuid_words]
            && a.ctime == b.ctime
            && a.level == b.level
            && a.layout == b.layout
            && a.size == b.size
            && a.raid_disks == b.raid_disks
    }

    fn compat_fixup(&mut self) {
        if self.raw.len() != MD_SB_WORDS {
            return;
        }
        // sparc 2.2 kernels wrote everything after events_lo one word late
        let start = MD_SB_GENERIC_CONSTANT_WORDS + 7;
        self.raw.copy_within(start + 1.., start);
        self.raw[CSUM_WORD] = checksum(&self.raw);
        self.sb = Some(Super0Header::from_words(&self.raw));
        info!("adjusted superblock for 2.2/sparc compatibility");
    }

    fn render_verbose(&self, homehost: Option<&str>) -> SuperResult<String> {
        let sb = self.sb();
        let mut out = String::new();
        let level = level_name(sb.level).unwrap_or("-unknown-");

        let _ = writeln!(out, "          Magic : {MD_SB_MAGIC:08x}");
        let _ = writeln!(
            out,
            "        Version : {}.{:02}.{:02}",
            sb.major_version, sb.minor_version, sb.patch_version
        );
        let _ = write!(out, "           UUID : {}", sb.uuid_string());
        if let Some(host) = homehost
            && sb.is_local_to(host)
        {
            let _ = write!(out, " (local to host {host})");
        }
        out.push('\n');
        let _ = writeln!(out, "  Creation Time : {}", format_ctime(u64::from(sb.ctime)));
        let _ = writeln!(out, "     Raid Level : {level}");
        if sb.level >= 0 {
            let _ = writeln!(
                out,
                "  Used Dev Size : {} ({})",
                sb.size,
                human_size_brief(u64::from(sb.size) * 1024)
            );
        }
        let _ = writeln!(out, "   Raid Devices : {}", sb.raid_disks);
        let _ = writeln!(out, "  Total Devices : {}", sb.nr_disks);
        let _ = writeln!(out, "Preferred Minor : {}", sb.md_minor);
        out.push('\n');
        let _ = writeln!(out, "    Update Time : {}", format_ctime(u64::from(sb.utime)));
        let state = if sb.state & (1 << MD_SB_CLEAN) != 0 {
            "clean"
        } else {
            "active"
        };
        let _ = writeln!(out, "          State : {state}");
        let _ = writeln!(out, " Active Devices : {}", sb.active_disks);
        let _ = writeln!(out, "Working Devices : {}", sb.working_disks);
        let _ = writeln!(out, " Failed Devices : {}", sb.failed_disks);
        let _ = writeln!(out, "  Spare Devices : {}", sb.spare_disks);
        let expected = checksum(&sb.to_words());
        if expected == sb.sb_csum {
            let _ = writeln!(out, "       Checksum : {:x} - correct", sb.sb_csum);
        } else {
            let _ = writeln!(
                out,
                "       Checksum : {:x} - expected {expected:x}",
                sb.sb_csum
            );
        }
        let _ = writeln!(out, "         Events : {}", sb.events);
        out.push('\n');
        let _ = writeln!(out, "      Number   Major   Minor   RaidDevice State");

        let row = |label: &str, d: &Super0Disk| {
            format!(
                "{label:>4} {:>5} {:>7} {:>8} {:>8}      {}\n",
                d.number,
                d.major,
                d.minor,
                d.raid_disk,
                DiskState::from_bits(d.state).describe()
            )
        };
        out.push_str(&row("this", &sb.this_disk));
        out.push('\n');
        let count = usize::try_from(sb.nr_disks.max(sb.raid_disks))
            .unwrap_or(MD_SB_DISKS)
            .min(MD_SB_DISKS);
        for (i, disk) in sb.disks.iter().take(count).enumerate() {
            out.push_str(&row(&i.to_string(), disk));
        }
        Ok(out)
    }

    fn render_export(&self) -> SuperResult<String> {
        let sb = self.sb();
        let mut out = String::new();
        let _ = writeln!(out, "MD_LEVEL={}", level_name(sb.level).unwrap_or("unknown"));
        let _ = writeln!(out, "MD_DEVICES={}", sb.raid_disks);
        let _ = writeln!(out, "MD_UUID={}", sb.uuid_string());
        let _ = writeln!(out, "MD_UPDATE_TIME={}", sb.utime);
        let _ = writeln!(out, "MD_EVENTS={}", sb.events);
        Ok(out)
    }

    fn render_brief(&self, verbose: bool) -> SuperResult<String> {
        let sb = self.sb();
        let devname = format!("/dev/md{}", sb.md_minor);
        let mut out = if verbose {
            format!(
                "ARRAY {devname} level={} num-devices={}",
                level_name(sb.level).unwrap_or("-unknown-"),
                sb.raid_disks
            )
        } else {
            format!("ARRAY {devname}")
        };
        let _ = writeln!(out, " UUID={}", sb.uuid_string());
        Ok(out)
    }

    fn clone_handler(&self) -> Box<dyn MetadataHandler> {
        Box::new(self.clone())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::device::MemoryDevice;

    pub(crate) const DEVICE_SIZE: usize = 1024 * 1024;

    pub(crate) fn sample_header(uuid: [u32; 4], this: u32, in_sync: bool) -> Super0Header {
        let active = DiskState::active_sync().bits();
        let mut sb = Super0Header {
            major_version: 0,
            minor_version: 90,
            patch_version: 0,
            set_uuid: uuid,
            ctime: 1_500_000_000,
            level: 5,
            size: 512,
            nr_disks: 3,
            raid_disks: 3,
            md_minor: 2,
            utime: 1_500_000_500,
            state: 1 << MD_SB_CLEAN,
            active_disks: 3,
            working_disks: 3,
            events: 0x1_0000_0005,
            layout: 2,
            chunk_size: 65536,
            ..Default::default()
        };
        for i in 0..3u32 {
            sb.disks[i as usize] = Super0Disk {
                number: i,
                major: 8,
                minor: 16 * i,
                raid_disk: i,
                state: active,
            };
        }
        sb.this_disk = sb.disks[this as usize];
        if !in_sync {
            sb.this_disk.state = 0;
        }
        sb.update_checksum();
        sb
    }

    pub(crate) fn device_with(path: &str, sb: &Super0Header) -> MemoryDevice {
        let mut dev = MemoryDevice::new(path, DEVICE_SIZE);
        dev.write_at(super_offset(DEVICE_SIZE as u64), &sb.to_bytes());
        dev
    }

    #[test]
    fn test_location() {
        assert_eq!(super_offset(1024 * 1024), 1024 * 1024 - 65536);
        assert_eq!(super_offset(1024 * 1024 + 4096), 1024 * 1024 - 65536);
    }

    #[test]
    fn test_words_roundtrip() {
        let sb = sample_header([1, 2, 3, 4], 1, true);
        let bytes = sb.to_bytes();
        assert_eq!(bytes.len(), MD_SB_BYTES);
        let parsed = Super0Header::from_words(&bytes_to_words(&bytes));
        assert_eq!(parsed, sb);
        assert_eq!(parsed.events, 0x1_0000_0005);
    }

    #[test]
    fn test_detect_load_and_info() {
        let sb = sample_header([0xdead_beef, 2, 3, 4], 1, true);
        let dev = device_with("/dev/sdb1", &sb);

        let mut handler = SUPER0.detect(&dev).unwrap();
        handler.load_super(&dev, Some("/dev/sdb1")).unwrap();
        let info = handler.info(0);
        assert_eq!(info.level, 5);
        assert_eq!(info.disk.raid_disk, 1);
        assert!(info.disk.state.is_in_sync());
        assert_eq!(
            info.uuid.to_md_string(true),
            "deadbeef:00000002:00000003:00000004"
        );

        assert!(SUPER0.detect(&MemoryDevice::new("/dev/x", DEVICE_SIZE)).is_none());
        assert!(SUPER0.detect(&MemoryDevice::new("/dev/y", 4096)).is_none());
    }

    #[test]
    fn test_too_small() {
        let mut handler = Super0Handler::default();
        let err = handler
            .load_super(&MemoryDevice::new("/dev/tiny", 65536), None)
            .unwrap_err();
        assert!(matches!(err, SuperError::TooSmall { .. }));
    }

    #[test]
    fn test_brief_and_export() {
        let sb = sample_header([0x0102_0304, 0x0506_0708, 0x090a_0b0c, 0x0d0e_0f10], 0, true);
        let mut handler = Super0Handler::default();
        handler.load_super(&device_with("/dev/sda1", &sb), None).unwrap();

        assert_eq!(
            handler.render_brief(false).unwrap(),
            "ARRAY /dev/md2 UUID=01020304:05060708:090a0b0c:0d0e0f10\n"
        );
        assert_eq!(
            handler.render_brief(true).unwrap(),
            "ARRAY /dev/md2 level=raid5 num-devices=3 UUID=01020304:05060708:090a0b0c:0d0e0f10\n"
        );
        assert_eq!(
            handler.render_export().unwrap(),
            format!(
                "MD_LEVEL=raid5\nMD_DEVICES=3\nMD_UUID=01020304:05060708:090a0b0c:0d0e0f10\nMD_UPDATE_TIME=1500000500\nMD_EVENTS={}\n",
                0x1_0000_0005u64
            )
        );
    }

    #[test]
    fn test_verbose_checksum_and_homehost() {
        let digest = Sha1::digest(b"storage01");
        let w2 = u32::from_le_bytes([digest[0], digest[1], digest[2], digest[3]]);
        let w3 = u32::from_le_bytes([digest[4], digest[5], digest[6], digest[7]]);
        let sb = sample_header([1, 2, w2, w3], 0, true);
        let mut handler = Super0Handler::default();
        handler.load_super(&device_with("/dev/sda1", &sb), None).unwrap();

        let text = handler.render_verbose(Some("storage01")).unwrap();
        assert!(text.contains("(local to host storage01)"));
        assert!(text.contains(" - correct"));
        assert!(text.contains("Raid Level : raid5"));

        let text = handler.render_verbose(Some("elsewhere")).unwrap();
        assert!(!text.contains("local to host"));
    }

    #[test]
    fn test_sparc_fixup_shifts_tail() {
        let sb = sample_header([1, 2, 3, 4], 2, true);
        let mut words = sb.to_words();
        // Simulate the sparc layout: everything from word 39 on is one word late
        words.copy_within(39..MD_SB_WORDS - 1, 40);
        words[39] = 0x5a5a_5a5a;
        let mut dev = MemoryDevice::new("/dev/sdd1", DEVICE_SIZE);
        dev.write_at(super_offset(DEVICE_SIZE as u64), &words_to_bytes(&words));

        let mut handler = Super0Handler::default();
        handler.load_super(&dev, None).unwrap();
        assert_ne!(handler.info(0).disk.raid_disk, 2);

        handler.compat_fixup();
        let fixed = handler.superblock().unwrap();
        assert_eq!(fixed.events, sb.events);
        assert_eq!(fixed.layout, sb.layout);
        assert_eq!(handler.info(0).disk.raid_disk, 2);
        assert_eq!(fixed.sb_csum, fixed.compute_checksum());
    }

    #[test]
    fn test_compare_requires_matching_geometry() {
        let load = |sb: &Super0Header| {
            let mut h = Super0Handler::default();
            h.load_super(&device_with("/dev/z", sb), None).unwrap();
            h
        };
        let a = load(&sample_header([1, 2, 3, 4], 0, true));
        let b = load(&sample_header([1, 2, 3, 4], 1, false));
        let mut other = sample_header([1, 2, 3, 4], 0, true);
        other.ctime += 1;
        other.update_checksum();
        let c = load(&other);

        assert!(a.compare(&b));
        assert!(!a.compare(&c));
    }
}

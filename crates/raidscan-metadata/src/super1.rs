//! md version 1.x superblocks
//!
//! Layout (all fields little-endian):
//! ```text
//! 0x000  magic, major_version, feature_map, pad
//! 0x010  set_uuid[16], set_name[32]
//! 0x040  ctime, level, layout, size, chunksize, raid_disks, bitmap_offset
//! 0x064  reshape fields (new_level .. new_offset)
//! 0x080  data_offset, data_size, super_offset, recovery_offset
//! 0x0A0  dev_number, cnt_corrected_read, device_uuid[16], devflags,
//!        bblog_shift, bblog_size, bblog_offset
//! 0x0C0  utime, events, resync_offset, sb_csum, max_dev, pad[32]
//! 0x100  dev_roles[max_dev] (u16)
//! ```
//!
//! The minor version only selects where the superblock lives: 1.0 near
//! the end of the device, 1.1 at sector 0, 1.2 at 4 KiB.

use crate::device::BlockDevice;
use crate::format::{
    FormatCapabilities, MetadataFormat, MetadataHandler, SuperResult, fold_csum, format_ctime,
    pad_nul, size_suffix, sum_le_words, trim_nul,
};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use raidscan_common::{
    ArrayInfo, ArrayUuid, DiskInfo, DiskState, SECTOR_SIZE, SuperError, human_size_brief,
    level_name,
};
use std::any::Any;
use std::fmt::Write as _;
use tracing::{debug, warn};

/// Magic number of a v1.x superblock
pub const MD_SB_MAGIC: u32 = 0xa92b_4efc;

/// Size of the fixed part of the superblock
pub const SB1_HEADER_SIZE: usize = 256;

/// Bytes read when loading (header plus the largest role table we accept)
const SB1_READ_SIZE: usize = 4096;

/// Largest role table that fits in `SB1_READ_SIZE`
const MAX_DEV_LIMIT: usize = (SB1_READ_SIZE - SB1_HEADER_SIZE) / 2;

/// Devices smaller than this many sectors cannot hold md metadata
const MIN_DEVICE_SECTORS: u64 = 24;

pub const MD_FEATURE_BITMAP_OFFSET: u32 = 1;
pub const MD_FEATURE_RECOVERY_OFFSET: u32 = 2;
pub const MD_FEATURE_RESHAPE_ACTIVE: u32 = 4;
pub const MD_FEATURE_BAD_BLOCKS: u32 = 8;

pub const ROLE_SPARE: u16 = 0xffff;
pub const ROLE_FAULTY: u16 = 0xfffe;
pub const ROLE_JOURNAL: u16 = 0xfffd;

/// Bad-block logs longer than this many sectors are treated as absent
const MAX_BBLOG_SECTORS: u16 = 100;

/// Offset of `sb_csum` within the header
const CSUM_OFFSET: usize = 0xD8;

/// Superblock location in sectors for a minor version
#[must_use]
pub const fn super_offset(minor: u8, device_sectors: u64) -> u64 {
    match minor {
        0 => device_sectors.saturating_sub(16) & !7,
        1 => 0,
        _ => 8,
    }
}

/// Minor version implied by a stored `super_offset`
#[must_use]
pub const fn minor_for_offset(super_offset: u64) -> u8 {
    if super_offset <= 4 {
        1
    } else if super_offset <= 8 {
        2
    } else {
        0
    }
}

/// Decoded v1.x superblock
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Super1Header {
    pub feature_map: u32,
    pub set_uuid: [u8; 16],
    pub set_name: String,
    pub ctime: u64,
    pub level: i32,
    pub layout: u32,
    /// Used size of each member, in sectors
    pub size: u64,
    pub chunksize: u32,
    pub raid_disks: u32,
    pub bitmap_offset: u32,
    pub new_level: u32,
    pub reshape_position: u64,
    pub delta_disks: u32,
    pub new_layout: u32,
    pub new_chunk: u32,
    pub new_offset: u32,
    pub data_offset: u64,
    pub data_size: u64,
    pub super_offset: u64,
    pub recovery_offset: u64,
    pub dev_number: u32,
    pub cnt_corrected_read: u32,
    pub device_uuid: [u8; 16],
    pub devflags: u8,
    pub bblog_shift: u8,
    pub bblog_size: u16,
    pub bblog_offset: i32,
    pub utime: u64,
    pub events: u64,
    pub resync_offset: u64,
    pub sb_csum: u32,
    /// Role of every device slot
    pub dev_roles: Vec<u16>,
}

impl Super1Header {
    /// Number of bytes covered by the checksum
    #[must_use]
    pub fn checksummed_len(&self) -> usize {
        SB1_HEADER_SIZE + 2 * self.dev_roles.len()
    }

    /// Serialize to bytes, padded to a whole sector
    #[allow(clippy::cast_possible_truncation)]
    pub fn to_bytes(&self) -> Bytes {
        let len = self.checksummed_len();
        let mut buf = BytesMut::with_capacity(len.next_multiple_of(SECTOR_SIZE as usize));

        buf.put_u32_le(MD_SB_MAGIC);
        buf.put_u32_le(1);
        buf.put_u32_le(self.feature_map);
        buf.put_u32_le(0);
        buf.put_slice(&self.set_uuid);
        buf.put_slice(&pad_nul::<32>(&self.set_name));
        buf.put_u64_le(self.ctime);
        buf.put_i32_le(self.level);
        buf.put_u32_le(self.layout);
        buf.put_u64_le(self.size);
        buf.put_u32_le(self.chunksize);
        buf.put_u32_le(self.raid_disks);
        buf.put_u32_le(self.bitmap_offset);
        buf.put_u32_le(self.new_level);
        buf.put_u64_le(self.reshape_position);
        buf.put_u32_le(self.delta_disks);
        buf.put_u32_le(self.new_layout);
        buf.put_u32_le(self.new_chunk);
        buf.put_u32_le(self.new_offset);
        buf.put_u64_le(self.data_offset);
        buf.put_u64_le(self.data_size);
        buf.put_u64_le(self.super_offset);
        buf.put_u64_le(self.recovery_offset);
        buf.put_u32_le(self.dev_number);
        buf.put_u32_le(self.cnt_corrected_read);
        buf.put_slice(&self.device_uuid);
        buf.put_u8(self.devflags);
        buf.put_u8(self.bblog_shift);
        buf.put_u16_le(self.bblog_size);
        buf.put_i32_le(self.bblog_offset);
        buf.put_u64_le(self.utime);
        buf.put_u64_le(self.events);
        buf.put_u64_le(self.resync_offset);
        buf.put_u32_le(self.sb_csum);
        buf.put_u32_le(self.dev_roles.len() as u32);
        buf.put_bytes(0, 32);
        for role in &self.dev_roles {
            buf.put_u16_le(*role);
        }

        buf.resize(len.next_multiple_of(SECTOR_SIZE as usize), 0);
        buf.freeze()
    }

    /// Parse and verify a superblock
    pub fn from_bytes(data: &[u8]) -> SuperResult<Self> {
        if data.len() < SB1_HEADER_SIZE {
            return Err(SuperError::NoSuperblock);
        }

        let mut buf = data;

        let magic = buf.get_u32_le();
        if magic != MD_SB_MAGIC {
            return Err(SuperError::BadMagic {
                expected: MD_SB_MAGIC,
                found: magic,
            });
        }
        let major = buf.get_u32_le();
        if major != 1 {
            return Err(SuperError::UnsupportedVersion(format!("{major}")));
        }

        let feature_map = buf.get_u32_le();
        buf.advance(4);
        let mut set_uuid = [0u8; 16];
        buf.copy_to_slice(&mut set_uuid);
        let mut name = [0u8; 32];
        buf.copy_to_slice(&mut name);
        let ctime = buf.get_u64_le();
        let level = buf.get_i32_le();
        let layout = buf.get_u32_le();
        let size = buf.get_u64_le();
        let chunksize = buf.get_u32_le();
        let raid_disks = buf.get_u32_le();
        let bitmap_offset = buf.get_u32_le();
        let new_level = buf.get_u32_le();
        let reshape_position = buf.get_u64_le();
        let delta_disks = buf.get_u32_le();
        let new_layout = buf.get_u32_le();
        let new_chunk = buf.get_u32_le();
        let new_offset = buf.get_u32_le();
        let data_offset = buf.get_u64_le();
        let data_size = buf.get_u64_le();
        let super_offset = buf.get_u64_le();
        let recovery_offset = buf.get_u64_le();
        let dev_number = buf.get_u32_le();
        let cnt_corrected_read = buf.get_u32_le();
        let mut device_uuid = [0u8; 16];
        buf.copy_to_slice(&mut device_uuid);
        let devflags = buf.get_u8();
        let bblog_shift = buf.get_u8();
        let bblog_size = buf.get_u16_le();
        let bblog_offset = buf.get_i32_le();
        let utime = buf.get_u64_le();
        let events = buf.get_u64_le();
        let resync_offset = buf.get_u64_le();
        let sb_csum = buf.get_u32_le();
        let max_dev = buf.get_u32_le() as usize;
        buf.advance(32);

        if max_dev > MAX_DEV_LIMIT || buf.remaining() < 2 * max_dev {
            return Err(SuperError::UnsupportedVersion(format!(
                "max_dev {max_dev} too large"
            )));
        }
        let dev_roles = (0..max_dev).map(|_| buf.get_u16_le()).collect();

        let sb = Self {
            feature_map,
            set_uuid,
            set_name: trim_nul(&name),
            ctime,
            level,
            layout,
            size,
            chunksize,
            raid_disks,
            bitmap_offset,
            new_level,
            reshape_position,
            delta_disks,
            new_layout,
            new_chunk,
            new_offset,
            data_offset,
            data_size,
            super_offset,
            recovery_offset,
            dev_number,
            cnt_corrected_read,
            device_uuid,
            devflags,
            bblog_shift,
            bblog_size,
            bblog_offset,
            utime,
            events,
            resync_offset,
            sb_csum,
            dev_roles,
        };

        let computed = checksum(&data[..sb.checksummed_len()]);
        if computed != sb_csum {
            return Err(SuperError::ChecksumMismatch {
                stored: sb_csum,
                computed,
            });
        }

        Ok(sb)
    }

    /// Compute the checksum of the serialized superblock
    #[must_use]
    pub fn compute_checksum(&self) -> u32 {
        let bytes = self.to_bytes();
        checksum(&bytes[..self.checksummed_len()])
    }

    /// Update the checksum field after modifying other fields
    pub fn update_checksum(&mut self) {
        self.sb_csum = self.compute_checksum();
    }

    /// Creation time in seconds (the low 40 bits)
    #[must_use]
    pub const fn ctime_secs(&self) -> u64 {
        self.ctime & 0xff_ffff_ffff
    }

    /// Update time in seconds (the low 40 bits)
    #[must_use]
    pub const fn utime_secs(&self) -> u64 {
        self.utime & 0xff_ffff_ffff
    }

    /// Array name without the `homehost:` prefix
    #[must_use]
    pub fn short_name(&self) -> Option<&str> {
        if self.set_name.is_empty() {
            return None;
        }
        Some(
            self.set_name
                .split_once(':')
                .map_or(self.set_name.as_str(), |(_, name)| name),
        )
    }

    /// Role of the device this superblock was read from
    #[must_use]
    pub fn this_role(&self) -> u16 {
        self.dev_roles
            .get(self.dev_number as usize)
            .copied()
            .unwrap_or(ROLE_SPARE)
    }

    /// Usable array size in bytes, when the level has a fixed data ratio
    #[must_use]
    pub fn array_size(&self) -> Option<u64> {
        let disks = u64::from(self.raid_disks);
        let (data_disks, denom) = match self.level {
            1 => (1, 1),
            4 | 5 => (disks.saturating_sub(1), 1),
            6 => (disks.saturating_sub(2), 1),
            10 => (
                disks,
                u64::from(self.layout & 0xff) * u64::from((self.layout >> 8) & 0xff),
            ),
            _ => (0, 1),
        };
        if data_disks == 0 || denom == 0 {
            return None;
        }
        self.size
            .checked_mul(SECTOR_SIZE)?
            .checked_mul(data_disks)
            .map(|bytes| bytes / denom)
    }
}

/// v1.x checksum: 32-bit word sum (trailing half word included), folded
fn checksum(data: &[u8]) -> u32 {
    let mut copy = data.to_vec();
    copy[CSUM_OFFSET..CSUM_OFFSET + 4].fill(0);
    fold_csum(sum_le_words(&copy))
}

fn uuid_string(bytes: &[u8; 16]) -> String {
    ArrayUuid::from_bytes(*bytes).to_md_string(false)
}

/// Quote a configuration value when it contains whitespace
fn quoted(value: &str) -> String {
    if value.chars().any(|c| c.is_whitespace() || c == '"') {
        format!("\"{}\"", value.replace('"', "\\\""))
    } else {
        value.to_string()
    }
}

/// The v1.x format family
#[derive(Debug)]
pub struct Super1Format;

/// Static descriptor registered in the format registry
pub static SUPER1: Super1Format = Super1Format;

impl MetadataFormat for Super1Format {
    fn name(&self) -> &'static str {
        "1.x"
    }

    fn capabilities(&self) -> FormatCapabilities {
        FormatCapabilities {
            name: "1.x",
            container: false,
            verbose: true,
            export: true,
            brief: true,
            brief_subarrays: false,
            brief_cache: false,
            badblocks: true,
        }
    }

    fn accepts(&self, name: &str) -> bool {
        matches!(name, "1" | "1.0" | "1.00" | "1.1" | "1.01" | "1.2" | "1.02" | "default")
    }

    fn instantiate(&'static self, name: &str) -> Box<dyn MetadataHandler> {
        let minor = match name {
            "1.0" | "1.00" => 0,
            "1.1" | "1.01" => 1,
            _ => 2,
        };
        Box::new(Super1Handler::new(Some(minor)))
    }

    fn detect(&'static self, device: &dyn BlockDevice) -> Option<Box<dyn MetadataHandler>> {
        let sectors = device.size() / SECTOR_SIZE;
        if sectors < MIN_DEVICE_SECTORS {
            return None;
        }
        let mut magic = [0u8; 4];
        let found = (0..=2u8).any(|minor| {
            let offset = super_offset(minor, sectors) * SECTOR_SIZE;
            device.read_at(offset, &mut magic).is_ok() && u32::from_le_bytes(magic) == MD_SB_MAGIC
        });
        found.then(|| Box::new(Super1Handler::new(None)) as Box<dyn MetadataHandler>)
    }
}

/// Handler for one device's v1.x superblock
#[derive(Clone, Debug)]
pub struct Super1Handler {
    /// Requested minor version; `None` probes all three locations
    minor: Option<u8>,
    sb: Option<Super1Header>,
}

impl Super1Handler {
    #[must_use]
    pub const fn new(minor: Option<u8>) -> Self {
        Self { minor, sb: None }
    }

    /// Parsed superblock, once loaded
    #[must_use]
    pub const fn superblock(&self) -> Option<&Super1Header> {
        self.sb.as_ref()
    }

    fn load_minor(device: &dyn BlockDevice, minor: u8) -> SuperResult<Super1Header> {
        let sectors = device.size() / SECTOR_SIZE;
        let offset = super_offset(minor, sectors);
        let available = device.size().saturating_sub(offset * SECTOR_SIZE);
        let len = usize::try_from(available.min(SB1_READ_SIZE as u64)).unwrap_or(SB1_READ_SIZE);
        let data = device.read_vec(offset * SECTOR_SIZE, len)?;

        let sb = Super1Header::from_bytes(&data)?;
        if sb.super_offset != offset {
            debug!(
                "superblock at sector {} claims offset {}",
                offset, sb.super_offset
            );
            return Err(SuperError::NoSuperblock);
        }
        Ok(sb)
    }

    fn sb(&self) -> &Super1Header {
        static EMPTY: std::sync::OnceLock<Super1Header> = std::sync::OnceLock::new();
        self.sb
            .as_ref()
            .unwrap_or_else(|| EMPTY.get_or_init(Super1Header::default))
    }

    fn minor_version(&self) -> u8 {
        minor_for_offset(self.sb().super_offset)
    }
}

impl MetadataHandler for Super1Handler {
    fn format(&self) -> &'static dyn MetadataFormat {
        &SUPER1
    }

    fn load_super(&mut self, device: &dyn BlockDevice, devname: Option<&str>) -> SuperResult<()> {
        self.sb = None;

        let sectors = device.size() / SECTOR_SIZE;
        if sectors < MIN_DEVICE_SECTORS {
            if let Some(name) = devname {
                warn!("{name} is too small for md: size is {sectors} sectors.");
            }
            return Err(SuperError::TooSmall {
                size: device.size(),
                required: MIN_DEVICE_SECTORS * SECTOR_SIZE,
            });
        }

        let minors: Vec<u8> = self.minor.map_or_else(|| vec![0, 1, 2], |m| vec![m]);
        let mut best: Option<Super1Header> = None;
        let mut first_error = None;

        for minor in minors {
            match Self::load_minor(device, minor) {
                Ok(sb) => {
                    if best.as_ref().is_none_or(|b| sb.ctime_secs() > b.ctime_secs()) {
                        best = Some(sb);
                    }
                }
                Err(e) => {
                    debug!("no 1.{} superblock on {}: {}", minor, device.path(), e);
                    if first_error.is_none() && !e.is_absent() {
                        first_error = Some(e);
                    }
                }
            }
        }

        match best {
            Some(sb) => {
                self.sb = Some(sb);
                Ok(())
            }
            None => {
                let err = first_error.unwrap_or(SuperError::NoSuperblock);
                if let Some(name) = devname {
                    warn!("cannot load 1.x superblock on {name}: {err}");
                }
                Err(err)
            }
        }
    }

    fn info(&self, _leg: usize) -> ArrayInfo {
        let sb = self.sb();
        let role = sb.this_role();
        let mut disk = DiskInfo {
            number: i32::try_from(sb.dev_number).unwrap_or(-1),
            raid_disk: -1,
            state: DiskState::default(),
        };
        match role {
            ROLE_SPARE => {}
            ROLE_FAULTY => disk.state = disk.state.with(DiskState::FAULTY),
            ROLE_JOURNAL => {
                disk.state = disk.state.with(DiskState::JOURNAL);
                disk.raid_disk = i32::from(role);
            }
            _ => {
                disk.state = DiskState::active_sync();
                disk.raid_disk = i32::from(role);
                if sb.feature_map & MD_FEATURE_RECOVERY_OFFSET != 0 {
                    disk.state = disk.state.without(DiskState::SYNC);
                }
            }
        }

        ArrayInfo {
            uuid: ArrayUuid::from_bytes(sb.set_uuid),
            name: sb.set_name.clone(),
            level: sb.level,
            raid_disks: sb.raid_disks,
            disk,
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
        a.set_uuid == b.set_uuid
            && a.ctime == b.ctime
            && a.level == b.level
            && a.layout == b.layout
            && a.size == b.size
            && a.chunksize == b.chunksize
            && a.raid_disks == b.raid_disks
    }

    fn render_verbose(&self, homehost: Option<&str>) -> SuperResult<String> {
        let sb = self.sb();
        let mut out = String::new();
        let level = level_name(sb.level).unwrap_or("-unknown-");

        let _ = writeln!(out, "          Magic : {MD_SB_MAGIC:x}");
        let _ = writeln!(out, "        Version : 1.{}", self.minor_version());
        let _ = writeln!(out, "    Feature Map : {:#x}", sb.feature_map);
        let _ = writeln!(out, "     Array UUID : {}", uuid_string(&sb.set_uuid));
        let _ = write!(out, "           Name : {}", sb.set_name);
        if let Some(host) = homehost
            && sb
                .set_name
                .split_once(':')
                .is_some_and(|(prefix, _)| prefix == host)
        {
            let _ = write!(out, "  (local to host {host})");
        }
        out.push('\n');
        let _ = writeln!(out, "  Creation Time : {}", format_ctime(sb.ctime_secs()));
        let _ = writeln!(out, "     Raid Level : {level}");
        let _ = writeln!(out, "   Raid Devices : {}", sb.raid_disks);
        out.push('\n');
        let _ = writeln!(
            out,
            " Avail Dev Size : {} sectors{}",
            sb.data_size,
            size_suffix(sb.data_size.saturating_mul(SECTOR_SIZE))
        );
        if let Some(array_size) = sb.array_size() {
            let _ = writeln!(
                out,
                "     Array Size : {} KiB{}",
                array_size / 1024,
                size_suffix(array_size)
            );
        }
        let _ = writeln!(out, "    Data Offset : {} sectors", sb.data_offset);
        let _ = writeln!(out, "   Super Offset : {} sectors", sb.super_offset);
        let state = if sb.resync_offset == u64::MAX {
            "clean"
        } else {
            "active"
        };
        let _ = writeln!(out, "          State : {state}");
        let _ = writeln!(out, "    Device UUID : {}", uuid_string(&sb.device_uuid));
        out.push('\n');
        let _ = writeln!(out, "    Update Time : {}", format_ctime(sb.utime_secs()));
        if sb.feature_map & MD_FEATURE_BAD_BLOCKS != 0 {
            let _ = writeln!(
                out,
                "  Bad Block Log : {} entries available at offset {} sectors",
                u32::from(sb.bblog_size) * 64,
                sb.bblog_offset
            );
        }
        let _ = writeln!(out, "       Checksum : {:x} - correct", sb.sb_csum);
        let _ = writeln!(out, "         Events : {}", sb.events);
        out.push('\n');

        let role = sb.this_role();
        let role_text = match role {
            ROLE_SPARE => "spare".to_string(),
            ROLE_FAULTY => "faulty".to_string(),
            ROLE_JOURNAL => "Journal".to_string(),
            r => format!("Active device {r}"),
        };
        let _ = writeln!(out, "   Device Role : {role_text}");
        let array_state: String = (0..sb.raid_disks)
            .map(|slot| {
                let present = sb
                    .dev_roles
                    .iter()
                    .any(|&r| u32::from(r) == slot && r < ROLE_JOURNAL);
                if present { 'A' } else { '.' }
            })
            .collect();
        let _ = writeln!(
            out,
            "   Array State : {array_state} ('A' == active, '.' == missing, 'R' == replacing)"
        );
        Ok(out)
    }

    fn render_export(&self) -> SuperResult<String> {
        let sb = self.sb();
        let mut out = String::new();
        let level = level_name(sb.level).unwrap_or("unknown");
        let _ = writeln!(out, "MD_LEVEL={level}");
        let _ = writeln!(out, "MD_DEVICES={}", sb.raid_disks);
        if !sb.set_name.is_empty() {
            let _ = writeln!(out, "MD_NAME={}", sb.set_name);
        }
        if sb.level > 0
            && let Some(size) = sb.array_size()
        {
            let _ = writeln!(out, "MD_ARRAY_SIZE={}", human_size_brief(size));
        }
        let _ = writeln!(out, "MD_UUID={}", uuid_string(&sb.set_uuid));
        let _ = writeln!(out, "MD_UPDATE_TIME={}", sb.utime_secs());
        let _ = writeln!(out, "MD_DEV_UUID={}", uuid_string(&sb.device_uuid));
        let _ = writeln!(out, "MD_EVENTS={}", sb.events);
        Ok(out)
    }

    fn render_brief(&self, verbose: bool) -> SuperResult<String> {
        let sb = self.sb();
        let mut out = String::from("ARRAY ");
        if let Some(name) = sb.short_name() {
            let _ = write!(out, "/dev/md/{name} ");
        }
        if verbose && let Some(level) = level_name(sb.level) {
            let _ = write!(out, " level={level}");
        }
        let _ = write!(out, " metadata=1.{} ", self.minor_version());
        if verbose {
            let _ = write!(out, "num-devices={} ", sb.raid_disks);
        }
        let _ = write!(out, "UUID={}", uuid_string(&sb.set_uuid));
        if !sb.set_name.is_empty() {
            let _ = write!(out, " name={}", quoted(&sb.set_name));
        }
        out.push('\n');
        Ok(out)
    }

    fn examine_badblocks(&self, device: &dyn BlockDevice, devname: &str) -> SuperResult<String> {
        let sb = self.sb.as_ref().ok_or(SuperError::NoSuperblock)?;

        if sb.bblog_size == 0 || sb.bblog_size > MAX_BBLOG_SECTORS || sb.bblog_offset == 0 {
            return Ok(format!("No bad-blocks list configured on {devname}\n"));
        }
        if sb.feature_map & MD_FEATURE_BAD_BLOCKS == 0 {
            return Ok(format!("Bad-blocks list is empty in {devname}\n"));
        }

        let start = sb
            .super_offset
            .checked_add_signed(i64::from(sb.bblog_offset))
            .ok_or(SuperError::NoSuperblock)?;
        let start = start
            .checked_mul(SECTOR_SIZE)
            .ok_or_else(|| SuperError::Corrupt(format!("bad-block log at sector {start}")))?;
        if sb.bblog_shift >= 64 {
            return Err(SuperError::Corrupt(format!("bad-block shift {}", sb.bblog_shift)));
        }
        let unit = 1u64 << sb.bblog_shift;
        let log = device.read_vec(start, usize::from(sb.bblog_size) * SECTOR_SIZE as usize)?;

        let mut out = format!("Bad-blocks on {devname}:\n");
        let mut buf = &log[..];
        while buf.remaining() >= 8 {
            let bb = buf.get_u64_le();
            if bb == u64::MAX {
                break;
            }
            let sector = (bb >> 10).saturating_mul(unit);
            let count = (bb & 0x3ff).saturating_mul(unit);
            let _ = writeln!(out, "{sector:>20} for {count} sectors");
        }
        Ok(out)
    }

    fn clone_handler(&self) -> Box<dyn MetadataHandler> {
        Box::new(self.clone())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

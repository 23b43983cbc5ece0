//! Intel Matrix Storage Manager containers
//!
//! Every member disk carries the same metadata block (MPB). Its first
//! sector, the anchor, is the second-to-last sector of the disk; when the
//! MPB is longer than a sector the remaining sectors are stored directly
//! before the anchor.
//!
//! ```text
//! 0x000  signature[32] ("Intel Raid ISM Cfg Sig. " + version)
//! 0x020  check_sum, mpb_size, family_num, generation_num
//! 0x030  error_log_size, attributes, num_disks, num_raid_devs,
//!        error_log_pos, fill, cache_size
//! 0x040  orig_family_num, pwr_cycle_count, bbm_log_size, filler[35]
//! 0x0D8  disk[num_disks]       48 bytes each
//!        dev[num_raid_devs]    volume header, vol state, map(s)
//! ```
//!
//! Volumes flagged with `DEV_NVC_VOLUME` are NV-cache volumes. Their data
//! region starts with the cache control record decoded by `nvcache`.

use crate::device::BlockDevice;
use crate::format::{
    FormatCapabilities, MetadataFormat, MetadataHandler, SuperResult, pad_nul, size_suffix,
    sum_le_words, trim_nul,
};
use crate::nvcache::{NvCacheControlData, NvCacheMode, ShutdownState};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use raidscan_common::{
    ArrayInfo, ArrayUuid, DiskInfo, DiskState, LEVEL_CONTAINER, SECTOR_SIZE, SuperError,
};
use sha1::{Digest, Sha1};
use std::any::Any;
use std::fmt::Write as _;
use tracing::{debug, warn};

/// Signature prefix of the MPB
pub const MPB_SIGNATURE: &[u8; MPB_SIG_LEN] = b"Intel Raid ISM Cfg Sig. ";

pub const MPB_SIG_LEN: usize = 24;

/// Version written by `ImsmSuper::default`
pub const MPB_VERSION_DEFAULT: &str = "1.3.00";

pub const MAX_RAID_SERIAL_LEN: usize = 16;

const MPB_HEADER_SIZE: usize = 0xD8;
const IMSM_DISK_SIZE: usize = 48;
const IMSM_DEV_HEADER_SIZE: usize = 56;
const IMSM_VOL_SIZE: usize = 32;
const IMSM_MAP_HEADER_SIZE: usize = 48;

/// Largest MPB accepted
const MAX_MPB_SIZE: u32 = 128 * 1024;

/// Sectors at the end of the disk up to and including the anchor
const ANCHOR_SECTORS_FROM_END: u64 = 2;

pub const SPARE_DISK: u32 = 0x01;
pub const CONFIGURED_DISK: u32 = 0x02;
pub const FAILED_DISK: u32 = 0x04;

pub const DEV_BOOTABLE: u32 = 1 << 0;
pub const DEV_READ_COALESCING: u32 = 1 << 2;
pub const DEV_WRITE_COALESCING: u32 = 1 << 3;
pub const DEV_LAST_SHUTDOWN_DIRTY: u32 = 1 << 4;
/// The volume is an NV cache accelerating another volume
pub const DEV_NVC_VOLUME: u32 = 1 << 13;

/// Disk index mask within a `disk_ord_tbl` entry
const ORD_INDEX_MASK: u32 = 0x00ff_ffff;
pub const IMSM_ORD_REBUILD: u32 = 1 << 24;

pub const IMSM_T_STATE_NORMAL: u8 = 0;
pub const IMSM_T_STATE_UNINITIALIZED: u8 = 1;
pub const IMSM_T_STATE_DEGRADED: u8 = 2;
pub const IMSM_T_STATE_FAILED: u8 = 3;

/// Byte offset of the anchor sector on a device of `size` bytes
#[must_use]
pub const fn anchor_offset(size: u64) -> u64 {
    (size / SECTOR_SIZE).saturating_sub(ANCHOR_SECTORS_FROM_END) * SECTOR_SIZE
}

/// Sectors occupied by an MPB of `mpb_size` bytes
#[must_use]
pub const fn mpb_sectors(mpb_size: u32) -> u64 {
    (mpb_size as u64).div_ceil(SECTOR_SIZE)
}

fn need(buf: &[u8], size: usize, what: &str) -> SuperResult<()> {
    if buf.len() < size {
        return Err(SuperError::UnsupportedVersion(format!(
            "truncated {what}: {} of {size} bytes",
            buf.len()
        )));
    }
    Ok(())
}

/// One physical disk record
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ImsmDisk {
    pub serial: [u8; MAX_RAID_SERIAL_LEN],
    /// Disk size in sectors
    pub total_blocks: u64,
    pub scsi_id: u32,
    pub status: u32,
    pub owner_cfg_num: u32,
}

impl ImsmDisk {
    #[must_use]
    pub fn new(serial: &str, total_blocks: u64, status: u32) -> Self {
        Self {
            serial: pad_nul(serial_tail(serial)),
            total_blocks,
            status,
            ..Default::default()
        }
    }

    #[must_use]
    pub fn serial(&self) -> String {
        trim_nul(&self.serial)
    }

    #[must_use]
    pub const fn is_spare(&self) -> bool {
        self.status & SPARE_DISK != 0
    }

    #[must_use]
    pub const fn is_configured(&self) -> bool {
        self.status & CONFIGURED_DISK != 0
    }

    #[must_use]
    pub const fn is_failed(&self) -> bool {
        self.status & FAILED_DISK != 0
    }

    /// md disk state bits for this record
    #[must_use]
    pub const fn disk_state(&self) -> DiskState {
        if self.is_failed() {
            DiskState::from_bits(0).with(DiskState::FAULTY)
        } else if self.is_configured() {
            DiskState::active_sync()
        } else {
            DiskState::from_bits(0)
        }
    }

    #[allow(clippy::cast_possible_truncation)]
    fn encode(&self, buf: &mut BytesMut) {
        buf.put_slice(&self.serial);
        buf.put_u32_le(self.total_blocks as u32);
        buf.put_u32_le(self.scsi_id);
        buf.put_u32_le(self.status);
        buf.put_u32_le(self.owner_cfg_num);
        buf.put_u32_le((self.total_blocks >> 32) as u32);
        buf.put_bytes(0, 12);
    }

    fn decode(buf: &mut &[u8]) -> SuperResult<Self> {
        need(buf, IMSM_DISK_SIZE, "disk record")?;
        let mut serial = [0u8; MAX_RAID_SERIAL_LEN];
        buf.copy_to_slice(&mut serial);
        let lo = buf.get_u32_le();
        let scsi_id = buf.get_u32_le();
        let status = buf.get_u32_le();
        let owner_cfg_num = buf.get_u32_le();
        let hi = buf.get_u32_le();
        buf.advance(12);
        Ok(Self {
            serial,
            total_blocks: (u64::from(hi) << 32) | u64::from(lo),
            scsi_id,
            status,
            owner_cfg_num,
        })
    }
}

/// Last `MAX_RAID_SERIAL_LEN` bytes of a drive serial, as stored in the MPB
fn serial_tail(serial: &str) -> &str {
    let serial = serial.trim();
    let mut start = serial.len().saturating_sub(MAX_RAID_SERIAL_LEN);
    while !serial.is_char_boundary(start) {
        start += 1;
    }
    &serial[start..]
}

/// Mapping of a volume onto its member disks
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ImsmMap {
    /// First sector of the volume on each member
    pub pba_of_lba0: u32,
    pub blocks_per_member: u32,
    pub num_data_stripes: u32,
    /// Chunk size in sectors
    pub blocks_per_strip: u16,
    pub map_state: u8,
    /// 0, 1, 5 or 10
    pub raid_level: u8,
    pub num_domains: u8,
    pub failed_disk_num: u8,
    pub ddf: u8,
    /// Disk index per slot, high byte holds flags
    pub disk_ord_tbl: Vec<u32>,
}

impl ImsmMap {
    /// Slot this disk index occupies
    #[must_use]
    pub fn slot_of(&self, disk_index: usize) -> Option<usize> {
        self.disk_ord_tbl
            .iter()
            .position(|ord| (ord & ORD_INDEX_MASK) as usize == disk_index)
    }

    #[allow(clippy::cast_possible_truncation)]
    fn encode(&self, buf: &mut BytesMut) {
        buf.put_u32_le(self.pba_of_lba0);
        buf.put_u32_le(self.blocks_per_member);
        buf.put_u32_le(self.num_data_stripes);
        buf.put_u16_le(self.blocks_per_strip);
        buf.put_u8(self.map_state);
        buf.put_u8(self.raid_level);
        buf.put_u8(self.disk_ord_tbl.len() as u8);
        buf.put_u8(self.num_domains);
        buf.put_u8(self.failed_disk_num);
        buf.put_u8(self.ddf);
        buf.put_bytes(0, 28);
        for ord in &self.disk_ord_tbl {
            buf.put_u32_le(*ord);
        }
    }

    fn decode(buf: &mut &[u8]) -> SuperResult<Self> {
        need(buf, IMSM_MAP_HEADER_SIZE, "volume map")?;
        let pba_of_lba0 = buf.get_u32_le();
        let blocks_per_member = buf.get_u32_le();
        let num_data_stripes = buf.get_u32_le();
        let blocks_per_strip = buf.get_u16_le();
        let map_state = buf.get_u8();
        let raid_level = buf.get_u8();
        let num_members = usize::from(buf.get_u8());
        let num_domains = buf.get_u8();
        let failed_disk_num = buf.get_u8();
        let ddf = buf.get_u8();
        buf.advance(28);
        need(buf, num_members * 4, "disk order table")?;
        let disk_ord_tbl = (0..num_members).map(|_| buf.get_u32_le()).collect();
        Ok(Self {
            pba_of_lba0,
            blocks_per_member,
            num_data_stripes,
            blocks_per_strip,
            map_state,
            raid_level,
            num_domains,
            failed_disk_num,
            ddf,
            disk_ord_tbl,
        })
    }

    fn encoded_len(&self) -> usize {
        IMSM_MAP_HEADER_SIZE + 4 * self.disk_ord_tbl.len()
    }
}

/// One volume (RAID device) record
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ImsmDev {
    pub volume: [u8; MAX_RAID_SERIAL_LEN],
    /// Volume size in sectors
    pub size: u64,
    pub status: u32,
    pub reserved_blocks: u32,
    pub migr_priority: u8,
    pub num_sub_vols: u8,
    pub tid: u8,
    pub cng_master_disk: u8,
    pub cache_policy: u16,
    pub cng_state: u8,
    pub cng_sub_state: u8,
    pub my_vol_raid_dev_num: u16,
    /// Raw `NvCacheMode` recorded by the option ROM
    pub nv_cache_mode: u8,
    pub nv_cache_flags: u8,
    pub curr_migr_unit: u32,
    pub checkpoint_id: u32,
    /// Nonzero while `migr_map` is present
    pub migr_state: u8,
    pub migr_type: u8,
    pub dirty: u8,
    pub fs_state: u8,
    pub verify_errors: u16,
    pub bad_blocks: u16,
    pub map: ImsmMap,
    /// Destination map, present while migrating
    pub migr_map: Option<ImsmMap>,
}

impl ImsmDev {
    #[must_use]
    pub fn name(&self) -> String {
        trim_nul(&self.volume)
    }

    #[must_use]
    pub const fn is_cache_volume(&self) -> bool {
        self.status & DEV_NVC_VOLUME != 0
    }

    /// md level of the volume
    #[must_use]
    pub fn md_level(&self) -> i32 {
        match self.map.raid_level {
            1 if self.map.disk_ord_tbl.len() > 2 => 10,
            level => i32::from(level),
        }
    }

    #[must_use]
    pub fn nv_cache_mode(&self) -> Option<NvCacheMode> {
        NvCacheMode::try_from(u16::from(self.nv_cache_mode)).ok()
    }

    #[allow(clippy::cast_possible_truncation)]
    fn encode(&self, buf: &mut BytesMut) {
        buf.put_slice(&self.volume);
        buf.put_u32_le(self.size as u32);
        buf.put_u32_le((self.size >> 32) as u32);
        buf.put_u32_le(self.status);
        buf.put_u32_le(self.reserved_blocks);
        buf.put_u8(self.migr_priority);
        buf.put_u8(self.num_sub_vols);
        buf.put_u8(self.tid);
        buf.put_u8(self.cng_master_disk);
        buf.put_u16_le(self.cache_policy);
        buf.put_u8(self.cng_state);
        buf.put_u8(self.cng_sub_state);
        buf.put_u16_le(self.my_vol_raid_dev_num);
        buf.put_u8(self.nv_cache_mode);
        buf.put_u8(self.nv_cache_flags);
        buf.put_bytes(0, 12);

        buf.put_u32_le(self.curr_migr_unit);
        buf.put_u32_le(self.checkpoint_id);
        let migr_state = if self.migr_map.is_some() {
            self.migr_state.max(1)
        } else {
            0
        };
        buf.put_u8(migr_state);
        buf.put_u8(self.migr_type);
        buf.put_u8(self.dirty);
        buf.put_u8(self.fs_state);
        buf.put_u16_le(self.verify_errors);
        buf.put_u16_le(self.bad_blocks);
        buf.put_bytes(0, 16);

        self.map.encode(buf);
        if let Some(map) = &self.migr_map {
            map.encode(buf);
        }
    }

    fn decode(buf: &mut &[u8]) -> SuperResult<Self> {
        need(buf, IMSM_DEV_HEADER_SIZE + IMSM_VOL_SIZE, "volume record")?;
        let mut volume = [0u8; MAX_RAID_SERIAL_LEN];
        buf.copy_to_slice(&mut volume);
        let size_low = buf.get_u32_le();
        let size_high = buf.get_u32_le();
        let status = buf.get_u32_le();
        let reserved_blocks = buf.get_u32_le();
        let migr_priority = buf.get_u8();
        let num_sub_vols = buf.get_u8();
        let tid = buf.get_u8();
        let cng_master_disk = buf.get_u8();
        let cache_policy = buf.get_u16_le();
        let cng_state = buf.get_u8();
        let cng_sub_state = buf.get_u8();
        let my_vol_raid_dev_num = buf.get_u16_le();
        let nv_cache_mode = buf.get_u8();
        let nv_cache_flags = buf.get_u8();
        buf.advance(12);

        let curr_migr_unit = buf.get_u32_le();
        let checkpoint_id = buf.get_u32_le();
        let migr_state = buf.get_u8();
        let migr_type = buf.get_u8();
        let dirty = buf.get_u8();
        let fs_state = buf.get_u8();
        let verify_errors = buf.get_u16_le();
        let bad_blocks = buf.get_u16_le();
        buf.advance(16);

        let map = ImsmMap::decode(buf)?;
        let migr_map = if migr_state == 0 {
            None
        } else {
            Some(ImsmMap::decode(buf)?)
        };

        Ok(Self {
            volume,
            size: (u64::from(size_high) << 32) | u64::from(size_low),
            status,
            reserved_blocks,
            migr_priority,
            num_sub_vols,
            tid,
            cng_master_disk,
            cache_policy,
            cng_state,
            cng_sub_state,
            my_vol_raid_dev_num,
            nv_cache_mode,
            nv_cache_flags,
            curr_migr_unit,
            checkpoint_id,
            migr_state,
            migr_type,
            dirty,
            fs_state,
            verify_errors,
            bad_blocks,
            map,
            migr_map,
        })
    }

    fn encoded_len(&self) -> usize {
        IMSM_DEV_HEADER_SIZE
            + IMSM_VOL_SIZE
            + self.map.encoded_len()
            + self.migr_map.as_ref().map_or(0, ImsmMap::encoded_len)
    }
}

/// Decoded metadata block
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ImsmSuper {
    /// Text following the signature prefix, e.g. `1.3.00`
    pub version: String,
    pub check_sum: u32,
    pub family_num: u32,
    pub generation_num: u32,
    pub error_log_size: u32,
    pub attributes: u32,
    pub error_log_pos: u8,
    pub cache_size: u32,
    pub orig_family_num: u32,
    pub pwr_cycle_count: u32,
    pub bbm_log_size: u32,
    pub disks: Vec<ImsmDisk>,
    pub devs: Vec<ImsmDev>,
}

impl Default for ImsmSuper {
    fn default() -> Self {
        Self {
            version: MPB_VERSION_DEFAULT.to_string(),
            check_sum: 0,
            family_num: 0,
            generation_num: 0,
            error_log_size: 0,
            attributes: 0,
            error_log_pos: 0,
            cache_size: 0,
            orig_family_num: 0,
            pwr_cycle_count: 0,
            bbm_log_size: 0,
            disks: Vec::new(),
            devs: Vec::new(),
        }
    }
}

impl ImsmSuper {
    /// Encoded size in bytes
    #[must_use]
    pub fn mpb_size(&self) -> usize {
        MPB_HEADER_SIZE
            + IMSM_DISK_SIZE * self.disks.len()
            + self.devs.iter().map(ImsmDev::encoded_len).sum::<usize>()
    }

    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn to_bytes(&self) -> Bytes {
        let mpb_size = self.mpb_size();
        let mut buf = BytesMut::with_capacity(mpb_size);

        buf.put_slice(MPB_SIGNATURE);
        buf.put_slice(&pad_nul::<{ 32 - MPB_SIG_LEN }>(&self.version));
        buf.put_u32_le(self.check_sum);
        buf.put_u32_le(mpb_size as u32);
        buf.put_u32_le(self.family_num);
        buf.put_u32_le(self.generation_num);
        buf.put_u32_le(self.error_log_size);
        buf.put_u32_le(self.attributes);
        buf.put_u8(self.disks.len() as u8);
        buf.put_u8(self.devs.len() as u8);
        buf.put_u8(self.error_log_pos);
        buf.put_u8(0);
        buf.put_u32_le(self.cache_size);
        buf.put_u32_le(self.orig_family_num);
        buf.put_u32_le(self.pwr_cycle_count);
        buf.put_u32_le(self.bbm_log_size);
        buf.put_bytes(0, 35 * 4);

        for disk in &self.disks {
            disk.encode(&mut buf);
        }
        for dev in &self.devs {
            dev.encode(&mut buf);
        }
        buf.freeze()
    }

    /// Decode and verify a complete MPB
    pub fn from_bytes(data: &[u8]) -> SuperResult<Self> {
        if data.len() < MPB_HEADER_SIZE || !data.starts_with(MPB_SIGNATURE) {
            return Err(SuperError::NoSuperblock);
        }

        let mut buf = data;
        let mut sig = [0u8; 32];
        buf.copy_to_slice(&mut sig);
        let version = trim_nul(&sig[MPB_SIG_LEN..]);
        let check_sum = buf.get_u32_le();
        let mpb_size = buf.get_u32_le();
        if (mpb_size as usize) < MPB_HEADER_SIZE || mpb_size > MAX_MPB_SIZE {
            return Err(SuperError::UnsupportedVersion(format!(
                "invalid mpb_size {mpb_size}"
            )));
        }
        let body = data.get(..mpb_size as usize).ok_or_else(|| {
            SuperError::UnsupportedVersion(format!(
                "mpb_size {mpb_size} exceeds {} bytes read",
                data.len()
            ))
        })?;

        let computed = checksum(body, check_sum);
        if computed != check_sum {
            return Err(SuperError::ChecksumMismatch {
                stored: check_sum,
                computed,
            });
        }

        let family_num = buf.get_u32_le();
        let generation_num = buf.get_u32_le();
        let error_log_size = buf.get_u32_le();
        let attributes = buf.get_u32_le();
        let num_disks = buf.get_u8();
        let num_raid_devs = buf.get_u8();
        let error_log_pos = buf.get_u8();
        buf.advance(1);
        let cache_size = buf.get_u32_le();
        let orig_family_num = buf.get_u32_le();
        let pwr_cycle_count = buf.get_u32_le();
        let bbm_log_size = buf.get_u32_le();

        let mut rest = &body[MPB_HEADER_SIZE..];
        let disks = (0..num_disks)
            .map(|_| ImsmDisk::decode(&mut rest))
            .collect::<SuperResult<Vec<_>>>()?;
        let devs = (0..num_raid_devs)
            .map(|_| ImsmDev::decode(&mut rest))
            .collect::<SuperResult<Vec<_>>>()?;

        Ok(Self {
            version,
            check_sum,
            family_num,
            generation_num,
            error_log_size,
            attributes,
            error_log_pos,
            cache_size,
            orig_family_num,
            pwr_cycle_count,
            bbm_log_size,
            disks,
            devs,
        })
    }

    #[must_use]
    pub fn compute_checksum(&self) -> u32 {
        checksum(&self.to_bytes(), self.check_sum)
    }

    pub fn update_checksum(&mut self) {
        self.check_sum = self.compute_checksum();
    }

    /// Family used for identity, the original one when the MPB was migrated
    #[must_use]
    pub const fn identity_family(&self) -> u32 {
        if self.orig_family_num == 0 {
            self.family_num
        } else {
            self.orig_family_num
        }
    }

    /// Container identifier, or a volume's when `vol` is given
    #[must_use]
    pub fn uuid(&self, vol: Option<usize>) -> ArrayUuid {
        let mut hasher = Sha1::new();
        hasher.update(MPB_SIGNATURE);
        hasher.update(self.identity_family().to_le_bytes());
        if let Some((index, dev)) = vol.and_then(|i| self.devs.get(i).map(|d| (i, d))) {
            hasher.update(u32::try_from(index).unwrap_or(u32::MAX).to_le_bytes());
            hasher.update(dev.volume);
        }
        let digest = hasher.finalize();
        let mut bytes = [0u8; 16];
        bytes.copy_from_slice(&digest[..16]);
        ArrayUuid::from_bytes(bytes)
    }

    /// Index of the disk record with this serial
    #[must_use]
    pub fn find_disk(&self, serial: &str) -> Option<usize> {
        let wanted = serial_tail(serial);
        self.disks.iter().position(|d| d.serial() == wanted)
    }
}

/// Word sum of the MPB excluding the stored checksum
#[allow(clippy::cast_possible_truncation)]
fn checksum(body: &[u8], stored: u32) -> u32 {
    (sum_le_words(body) as u32).wrapping_sub(stored)
}

fn read_mpb(device: &dyn BlockDevice) -> SuperResult<ImsmSuper> {
    let size = device.size();
    if size / SECTOR_SIZE < ANCHOR_SECTORS_FROM_END + 1 {
        return Err(SuperError::TooSmall {
            size,
            required: (ANCHOR_SECTORS_FROM_END + 1) * SECTOR_SIZE,
        });
    }
    let anchor = anchor_offset(size);
    let mut data = device.read_vec(anchor, SECTOR_SIZE as usize)?;
    if !data.starts_with(MPB_SIGNATURE) {
        return Err(SuperError::NoSuperblock);
    }

    let mpb_size = u32::from_le_bytes([data[36], data[37], data[38], data[39]]);
    let extra = mpb_sectors(mpb_size).saturating_sub(1);
    if extra > 0 && mpb_size <= MAX_MPB_SIZE {
        let offset = anchor
            .checked_sub(extra * SECTOR_SIZE)
            .ok_or(SuperError::TooSmall {
                size,
                required: (ANCHOR_SECTORS_FROM_END + 1 + extra) * SECTOR_SIZE,
            })?;
        #[allow(clippy::cast_possible_truncation)]
        let extended = device.read_vec(offset, (extra * SECTOR_SIZE) as usize)?;
        data.extend_from_slice(&extended);
    }
    ImsmSuper::from_bytes(&data)
}

/// The IMSM container format
#[derive(Debug)]
pub struct ImsmFormat;

/// Static descriptor registered in the format registry
pub static IMSM: ImsmFormat = ImsmFormat;

impl MetadataFormat for ImsmFormat {
    fn name(&self) -> &'static str {
        "imsm"
    }

    fn capabilities(&self) -> FormatCapabilities {
        FormatCapabilities {
            name: "imsm",
            container: true,
            verbose: true,
            export: true,
            brief: true,
            brief_subarrays: true,
            brief_cache: true,
            badblocks: false,
        }
    }

    fn accepts(&self, name: &str) -> bool {
        name == "imsm"
    }

    fn instantiate(&'static self, _name: &str) -> Box<dyn MetadataHandler> {
        Box::new(ImsmHandler::new())
    }

    fn detect(&'static self, device: &dyn BlockDevice) -> Option<Box<dyn MetadataHandler>> {
        if device.size() / SECTOR_SIZE < ANCHOR_SECTORS_FROM_END + 1 {
            return None;
        }
        let mut sig = [0u8; MPB_SIG_LEN];
        device.read_at(anchor_offset(device.size()), &mut sig).ok()?;
        (&sig == MPB_SIGNATURE).then(|| Box::new(ImsmHandler::new()) as Box<dyn MetadataHandler>)
    }
}

fn collect_legs(sb: &ImsmSuper, member: Option<usize>, device: &dyn BlockDevice) -> Vec<CacheLeg> {
    sb.devs
        .iter()
        .enumerate()
        .filter(|(_, dev)| dev.is_cache_volume())
        .map(|(vol, dev)| {
            let control = member
                .filter(|m| dev.map.slot_of(*m).is_some())
                .and_then(|_| read_control(dev, device));
            CacheLeg { vol, control }
        })
        .collect()
}

/// Control record at the start of a cache volume's data on this member
fn read_control(dev: &ImsmDev, device: &dyn BlockDevice) -> Option<NvCacheControlData> {
    let offset = u64::from(dev.map.pba_of_lba0) * SECTOR_SIZE;
    let result = device
        .read_vec(offset, NvCacheControlData::SIZE)
        .map_err(SuperError::from)
        .and_then(|data| NvCacheControlData::decode(&data));
    match result {
        Ok(control) => Some(control),
        Err(e) => {
            debug!(
                "no cache control data for {} on {}: {}",
                dev.name(),
                device.path(),
                e
            );
            None
        }
    }
}

/// Mode from the control record, else the one recorded in the volume
fn leg_mode(leg: &CacheLeg, dev: &ImsmDev) -> Option<NvCacheMode> {
    leg.control
        .as_ref()
        .and_then(NvCacheControlData::mode)
        .or_else(|| dev.nv_cache_mode())
}

/// A cache volume of the container
#[derive(Clone, Debug)]
struct CacheLeg {
    /// Index into `ImsmSuper::devs`
    vol: usize,
    /// Control record, when this disk holds the cache volume's data
    control: Option<NvCacheControlData>,
}

/// Handler for one device's view of an IMSM container
#[derive(Clone, Debug, Default)]
pub struct ImsmHandler {
    sb: Option<ImsmSuper>,
    /// Disk record of the device this was loaded from
    member: Option<usize>,
    legs: Vec<CacheLeg>,
}

impl ImsmHandler {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parsed metadata block, once loaded
    #[must_use]
    pub const fn superblock(&self) -> Option<&ImsmSuper> {
        self.sb.as_ref()
    }

    /// Disk record index the handler is bound to
    #[must_use]
    pub const fn member(&self) -> Option<usize> {
        self.member
    }

    fn loaded(&self) -> SuperResult<&ImsmSuper> {
        self.sb.as_ref().ok_or(SuperError::NoSuperblock)
    }

    fn base_disk(&self, sb: &ImsmSuper) -> DiskInfo {
        self.member
            .and_then(|m| sb.disks.get(m).map(|d| (m, d)))
            .map_or_else(DiskInfo::default, |(m, disk)| {
                let index = i32::try_from(m).unwrap_or(-1);
                DiskInfo {
                    number: index,
                    raid_disk: index,
                    state: disk.disk_state(),
                }
            })
    }

    fn write_disk(out: &mut String, index: usize, disk: &ImsmDisk) {
        let mut state = String::new();
        if disk.is_spare() {
            state.push_str(" spare");
        }
        if disk.is_configured() {
            state.push_str(" active");
        }
        if disk.is_failed() {
            state.push_str(" failed");
        }
        let _ = writeln!(out, "  Disk{index:02} Serial : {}", disk.serial());
        let _ = writeln!(out, "          State :{state}");
        let _ = writeln!(out, "             Id : {:08x}", disk.scsi_id);
        let _ = writeln!(
            out,
            "    Usable Size : {}{}",
            disk.total_blocks,
            size_suffix(disk.total_blocks.saturating_mul(SECTOR_SIZE))
        );
    }

    fn write_dev(&self, out: &mut String, sb: &ImsmSuper, index: usize, dev: &ImsmDev) {
        let map = &dev.map;
        let slots: String = map
            .disk_ord_tbl
            .iter()
            .map(|ord| {
                let failed = sb
                    .disks
                    .get((ord & ORD_INDEX_MASK) as usize)
                    .is_none_or(ImsmDisk::is_failed);
                if failed || ord & IMSM_ORD_REBUILD != 0 {
                    '_'
                } else {
                    'U'
                }
            })
            .collect();

        let _ = writeln!(out, "[{}]:", dev.name());
        let _ = writeln!(out, "       Subarray : {index}");
        let _ = writeln!(
            out,
            "           UUID : {}",
            sb.uuid(Some(index)).to_md_string(false)
        );
        let _ = writeln!(out, "     RAID Level : {}", dev.md_level());
        let _ = writeln!(out, "        Members : {}", map.disk_ord_tbl.len());
        let _ = writeln!(out, "          Slots : [{slots}]");
        match self.member.and_then(|m| map.slot_of(m)) {
            Some(slot) => {
                let _ = writeln!(out, "      This Slot : {slot}");
            }
            None => {
                let _ = writeln!(out, "      This Slot : ?");
            }
        }
        let _ = writeln!(
            out,
            "     Array Size : {}{}",
            dev.size,
            size_suffix(dev.size.saturating_mul(SECTOR_SIZE))
        );
        let _ = writeln!(
            out,
            "   Per Dev Size : {}{}",
            map.blocks_per_member,
            size_suffix(u64::from(map.blocks_per_member) * SECTOR_SIZE)
        );
        let _ = writeln!(out, "  Sector Offset : {}", map.pba_of_lba0);
        let _ = writeln!(out, "    Num Stripes : {}", map.num_data_stripes);
        let _ = writeln!(out, "     Chunk Size : {} KiB", map.blocks_per_strip / 2);
        let _ = writeln!(out, "       Reserved : {}", dev.reserved_blocks);
        let migrate = if dev.migr_map.is_some() {
            migration_name(dev.migr_type)
        } else {
            "idle"
        };
        let _ = writeln!(out, "  Migrate State : {migrate}");
        let _ = writeln!(out, "      Map State : {}", map_state_name(map.map_state));
        let _ = writeln!(
            out,
            "    Dirty State : {}",
            if dev.dirty == 0 { "clean" } else { "dirty" }
        );

        if let Some(leg) = self.legs.iter().find(|l| l.vol == index) {
            let mode = leg_mode(leg, dev).map_or("unknown", NvCacheMode::name);
            let _ = writeln!(out, "       NV Cache : {mode}");
            if let Some(control) = &leg.control {
                if let Some(vol) = control.hdr.volumes().first().filter(|v| v.is_associated()) {
                    let _ = writeln!(out, "    Accelerates : {}", trim_nul(&vol.acc_vol_name));
                }
                let _ = writeln!(out, "   Dirty Frames : {}", control.mpb.num_dirty_frames);
                let _ = writeln!(
                    out,
                    " Shutdown State : {}",
                    control
                        .mpb
                        .shutdown_state()
                        .map_or("unknown", ShutdownState::name)
                );
            }
        }
    }
}

const fn map_state_name(state: u8) -> &'static str {
    match state {
        IMSM_T_STATE_NORMAL => "normal",
        IMSM_T_STATE_UNINITIALIZED => "uninitialized",
        IMSM_T_STATE_DEGRADED => "degraded",
        IMSM_T_STATE_FAILED => "failed",
        _ => "unknown",
    }
}

const fn migration_name(migr_type: u8) -> &'static str {
    match migr_type {
        0 => "initialize",
        1 => "rebuild",
        2 => "check",
        3 => "general migration",
        4 => "state change",
        5 => "repair",
        _ => "unknown",
    }
}

impl MetadataHandler for ImsmHandler {
    fn format(&self) -> &'static dyn MetadataFormat {
        &IMSM
    }

    fn load_super(&mut self, device: &dyn BlockDevice, devname: Option<&str>) -> SuperResult<()> {
        self.sb = None;
        self.member = None;
        self.legs.clear();

        let sb = read_mpb(device).inspect_err(|e| {
            if let Some(name) = devname {
                warn!("cannot load imsm metadata on {name}: {e}");
            }
        })?;

        let Some(serial) = device.serial() else {
            if let Some(name) = devname {
                warn!("failed to retrieve serial for {name}");
            }
            return Err(SuperError::NoSuperblock);
        };
        let Some(member) = sb.find_disk(&serial) else {
            debug!("serial {} of {} is not in the metadata", serial, device.path());
            return Err(SuperError::NoSuperblock);
        };

        self.legs = collect_legs(&sb, Some(member), device);
        self.sb = Some(sb);
        self.member = Some(member);
        Ok(())
    }

    fn load_container(&mut self, device: &dyn BlockDevice, devname: Option<&str>) -> SuperResult<()> {
        self.sb = None;
        self.member = None;
        self.legs.clear();

        let sb = read_mpb(device).inspect_err(|e| {
            if let Some(name) = devname {
                warn!("cannot load imsm container on {name}: {e}");
            }
        })?;
        debug!(
            "loaded imsm container from {} without a member binding",
            device.path()
        );
        self.legs = collect_legs(&sb, None, device);
        self.sb = Some(sb);
        Ok(())
    }

    fn info(&self, leg: usize) -> ArrayInfo {
        let Some(sb) = &self.sb else {
            return ArrayInfo::default();
        };
        let disk = self.base_disk(sb);

        if let Some(cache) = leg.checked_sub(1).and_then(|i| self.legs.get(i)) {
            let dev = &sb.devs[cache.vol];
            let slot = self.member.and_then(|m| dev.map.slot_of(m));
            return ArrayInfo {
                uuid: sb.uuid(Some(cache.vol)),
                name: dev.name(),
                level: dev.md_level(),
                raid_disks: u32::try_from(dev.map.disk_ord_tbl.len()).unwrap_or(0),
                disk: DiskInfo {
                    raid_disk: slot.and_then(|s| i32::try_from(s).ok()).unwrap_or(-1),
                    ..disk
                },
                events: u64::from(sb.generation_num),
                cache_legs: 0,
            };
        }

        ArrayInfo {
            uuid: sb.uuid(None),
            name: String::new(),
            level: LEVEL_CONTAINER,
            raid_disks: u32::try_from(sb.disks.len()).unwrap_or(0),
            disk,
            events: u64::from(sb.generation_num),
            cache_legs: self.legs.len(),
        }
    }

    fn compare(&self, other: &dyn MetadataHandler) -> bool {
        let Some(other) = other.downcast_ref::<Self>() else {
            return false;
        };
        match (&self.sb, &other.sb) {
            (Some(a), Some(b)) => {
                a.family_num == b.family_num && a.orig_family_num == b.orig_family_num
            }
            _ => false,
        }
    }

    fn render_verbose(&self, _homehost: Option<&str>) -> SuperResult<String> {
        let sb = self.loaded()?;
        let mut out = String::new();
        let magic = String::from_utf8_lossy(MPB_SIGNATURE);
        let _ = writeln!(out, "          Magic : {}", magic.trim_end());
        let _ = writeln!(out, "        Version : {}", sb.version);
        let _ = writeln!(out, "    Orig Family : {:08x}", sb.orig_family_num);
        let _ = writeln!(out, "         Family : {:08x}", sb.family_num);
        let _ = writeln!(out, "     Generation : {:08x}", sb.generation_num);
        let _ = writeln!(out, "     Attributes : {:08x}", sb.attributes);
        let _ = writeln!(out, "           UUID : {}", sb.uuid(None).to_md_string(false));
        let _ = writeln!(out, "       Checksum : {:08x} correct", sb.check_sum);
        let _ = writeln!(out, "    MPB Sectors : {}", mpb_sectors(u32::try_from(sb.mpb_size()).unwrap_or(0)));
        let _ = writeln!(out, "          Disks : {}", sb.disks.len());
        let _ = writeln!(out, "   RAID Devices : {}", sb.devs.len());

        if let Some(m) = self.member {
            out.push('\n');
            Self::write_disk(&mut out, m, &sb.disks[m]);
        }
        for (index, dev) in sb.devs.iter().enumerate() {
            out.push('\n');
            self.write_dev(&mut out, sb, index, dev);
        }
        for (index, disk) in sb.disks.iter().enumerate() {
            if Some(index) != self.member {
                out.push('\n');
                Self::write_disk(&mut out, index, disk);
            }
        }
        Ok(out)
    }

    fn render_export(&self) -> SuperResult<String> {
        let sb = self.loaded()?;
        let mut out = String::new();
        let _ = writeln!(out, "MD_METADATA=imsm");
        let _ = writeln!(out, "MD_LEVEL=container");
        let _ = writeln!(out, "MD_UUID={}", sb.uuid(None).to_md_string(false));
        let _ = writeln!(out, "MD_DEVICES={}", sb.disks.len());
        Ok(out)
    }

    fn render_brief(&self, _verbose: bool) -> SuperResult<String> {
        let sb = self.loaded()?;
        Ok(format!(
            "ARRAY metadata=imsm UUID={}\n",
            sb.uuid(None).to_md_string(false)
        ))
    }

    fn render_brief_subarrays(&self, _verbose: i32) -> SuperResult<String> {
        let sb = self.loaded()?;
        let container = sb.uuid(None).to_md_string(false);
        let mut out = String::new();
        for (index, dev) in sb.devs.iter().enumerate() {
            if dev.is_cache_volume() {
                continue;
            }
            let _ = writeln!(
                out,
                "ARRAY /dev/md/{} container={container} member={index} UUID={}",
                dev.name(),
                sb.uuid(Some(index)).to_md_string(false)
            );
        }
        Ok(out)
    }

    fn render_brief_cache(&self, leg: usize) -> SuperResult<String> {
        let sb = self.loaded()?;
        let cache = leg
            .checked_sub(1)
            .and_then(|i| self.legs.get(i))
            .ok_or_else(|| SuperError::UnsupportedVersion(format!("no cache leg {leg}")))?;
        let dev = &sb.devs[cache.vol];
        let mode = leg_mode(cache, dev).map_or("unknown", NvCacheMode::name);

        let mut out = format!(
            "ARRAY /dev/md/{} container={} member={} UUID={} cache-mode={mode}",
            dev.name(),
            sb.uuid(None).to_md_string(false),
            cache.vol,
            sb.uuid(Some(cache.vol)).to_md_string(false)
        );
        if let Some(vol) = cache
            .control
            .as_ref()
            .and_then(|c| c.hdr.volumes().first().copied())
            .filter(|v| v.is_associated())
        {
            let _ = write!(out, " accelerates={}", trim_nul(&vol.acc_vol_name));
        }
        out.push('\n');
        Ok(out)
    }

    fn clone_handler(&self) -> Box<dyn MetadataHandler> {
        Box::new(self.clone())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

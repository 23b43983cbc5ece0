//! NV-cache (Smart Response) control metadata
//!
//! A cache volume starts with a control record: a configuration header
//! with one per-volume entry, followed by the packed metadata block
//! (`IsrtMpb`) describing where the frame metadata, delta log and segment
//! index live. Every record is packed with no padding and encoded
//! little-endian regardless of the host.
//!
//! ```text
//! NvCacheControlData (494 bytes)
//! +---------------------------+  0
//! | NvCacheConfigHeader (330) |  signature, version, lengths, num_volumes,
//! |   NvCacheVolConfig (160)  |  reserved words, vol_config[1]
//! +---------------------------+  330
//! | IsrtMpb (164)             |  packed md arrays, seg-num index/heap,
//! |                           |  delta log, shutdown state
//! +---------------------------+  494
//! ```

use bytes::{Buf, BufMut};
use raidscan_common::SuperError;
use std::fmt;

#[cfg(not(any(target_endian = "little", target_endian = "big")))]
compile_error!("target byte order must be either little or big endian");

/// Volumes a single cache device can accelerate
pub const MAX_NV_CACHE_VOLS: usize = 1;

/// Size of a cache frame
pub const ISRT_FRAME_SIZE: u32 = 8192;

/// Reserved words in a volume entry
pub const VOL_CONFIG_RESERVED: usize = 32;

/// Reserved words in the configuration header
pub const MD_HEADER_RESERVED: usize = 32;

/// Length of a volume serial / name field
pub const MAX_RAID_SERIAL_LEN: usize = 16;

/// Length of the configuration signature
pub const NVC_SIG_LEN: usize = 32;

/// Index of the cache device in a cache volume's member table
pub const ISRT_DEV_IDX: usize = 0;

/// Index of the accelerated device in a cache volume's member table
pub const ISRT_TARGET_DEV_IDX: usize = 1;

/// Configuration header signature
pub const NV_CACHE_CONFIG_SIG: &[u8; NVC_SIG_LEN] = b"Intel IMSM NV Cache Cfg. Sig.   ";

/// Largest supported cache, in GiB
pub const MAX_NVC_SIZE_GB: u64 = 128;

pub const NVC_FRAME_SIZE: u64 = ISRT_FRAME_SIZE as u64;
pub const NVC_FRAME_SIZE_IN_KB: u64 = NVC_FRAME_SIZE / 1024;
pub const NVC_FRAMES_PER_GB: u64 = 1024 * (1024 / NVC_FRAME_SIZE_IN_KB);
pub const MAX_NVC_FRAMES: u64 = MAX_NVC_SIZE_GB * NVC_FRAMES_PER_GB;
pub const SEGIDX_PAIRS_PER_NVC_FRAME: u64 = NVC_FRAME_SIZE / SegmentIndexPair::SIZE as u64;
pub const SEGHEAP_SEGS_PER_NVC_FRAME: u64 = NVC_FRAME_SIZE / 4;
pub const FRAMES_PER_SEGHEAP_FRAME: u64 = SEGIDX_PAIRS_PER_NVC_FRAME * SEGHEAP_SEGS_PER_NVC_FRAME;
pub const MAX_SEGHEAP_NVC_FRAMES: u64 = MAX_NVC_FRAMES / FRAMES_PER_SEGHEAP_FRAME;
pub const MAX_SEGHEAP_TOC_ENTRIES: usize = MAX_SEGHEAP_NVC_FRAMES as usize + 1;

pub const SEGMENTS_PER_PAGE_SHIFT: u32 = 6;
pub const SEGMENTS_PER_PAGE: u32 = 1 << SEGMENTS_PER_PAGE_SHIFT;
pub const SEGMENTS_PER_PAGE_MASK: u32 = SEGMENTS_PER_PAGE - 1;
pub const FRAME_SHIFT: u32 = 4;
pub const SECTORS_PER_FRAME: u32 = 1 << FRAME_SHIFT;
pub const FRAME_MASK: u32 = SECTORS_PER_FRAME - 1;

/// Caching mode of an accelerated volume
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum NvCacheMode {
    Off = 0,
    /// Power-fail recovery state
    OffToSafe = 1,
    /// Power-fail recovery state
    OffToPerf = 2,
    Safe = 3,
    SafeToOff = 4,
    Perf = 5,
    PerfToOff = 6,
    PerfToSafe = 7,
    IsFailing = 8,
    HasFailed = 9,
    /// Caching on the volume or the cache is disabled
    DisPerf = 10,
    /// Volume and cache are not associated
    DisSafe = 11,
}

impl NvCacheMode {
    /// Whether caching is active in this mode
    #[must_use]
    pub const fn is_enabled(self) -> bool {
        !matches!(self, Self::Off | Self::DisPerf | Self::DisSafe)
    }

    /// Get the mode name
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Off => "off",
            Self::OffToSafe => "off-to-safe",
            Self::OffToPerf => "off-to-perf",
            Self::Safe => "safe",
            Self::SafeToOff => "safe-to-off",
            Self::Perf => "perf",
            Self::PerfToOff => "perf-to-off",
            Self::PerfToSafe => "perf-to-safe",
            Self::IsFailing => "failing",
            Self::HasFailed => "failed",
            Self::DisPerf => "disabled-perf",
            Self::DisSafe => "disabled-safe",
        }
    }
}

impl TryFrom<u16> for NvCacheMode {
    type Error = u16;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        Ok(match value {
            0 => Self::Off,
            1 => Self::OffToSafe,
            2 => Self::OffToPerf,
            3 => Self::Safe,
            4 => Self::SafeToOff,
            5 => Self::Perf,
            6 => Self::PerfToOff,
            7 => Self::PerfToSafe,
            8 => Self::IsFailing,
            9 => Self::HasFailed,
            10 => Self::DisPerf,
            11 => Self::DisSafe,
            other => return Err(other),
        })
    }
}

impl fmt::Display for NvCacheMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Driver shutdown state recorded for crash and hibernate recovery
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum ShutdownState {
    Normal = 0,
    S4CrashDmpStart = 1,
    S4CrashDmpEnd = 2,
    S4CrashDmpFailed = 3,
}

impl ShutdownState {
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Normal => "normal",
            Self::S4CrashDmpStart => "crash-dump-started",
            Self::S4CrashDmpEnd => "crash-dump-complete",
            Self::S4CrashDmpFailed => "crash-dump-failed",
        }
    }
}

impl TryFrom<u32> for ShutdownState {
    type Error = u32;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        Ok(match value {
            0 => Self::Normal,
            1 => Self::S4CrashDmpStart,
            2 => Self::S4CrashDmpEnd,
            3 => Self::S4CrashDmpFailed,
            other => return Err(other),
        })
    }
}

fn need(data: &[u8], size: usize, what: &str) -> Result<(), SuperError> {
    if data.len() < size {
        return Err(SuperError::UnsupportedVersion(format!(
            "{what} truncated: {} of {size} bytes",
            data.len()
        )));
    }
    Ok(())
}

fn get_words<const N: usize>(buf: &mut &[u8]) -> [u32; N] {
    let mut words = [0u32; N];
    for word in &mut words {
        *word = buf.get_u32_le();
    }
    words
}

fn put_words(buf: &mut impl BufMut, words: &[u32]) {
    for word in words {
        buf.put_u32_le(*word);
    }
}

/// A (segment, index) entry of the segment-number index
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SegmentIndexPair {
    pub segment: u32,
    pub index: u32,
}

impl SegmentIndexPair {
    pub const SIZE: usize = 8;

    pub fn encode(&self, buf: &mut impl BufMut) {
        buf.put_u32_le(self.segment);
        buf.put_u32_le(self.index);
    }

    pub fn decode(data: &[u8]) -> Result<Self, SuperError> {
        need(data, Self::SIZE, "segment index pair")?;
        let mut buf = data;
        Ok(Self {
            segment: buf.get_u32_le(),
            index: buf.get_u32_le(),
        })
    }
}

/// Per-frame packed metadata
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct NvCachePackedMd {
    /// Disk segment currently assigned to the frame
    pub seg_num: u32,
    /// One validity bit per sector
    pub per_sector_validity: u16,
    pub flags: u8,
    /// Padding byte the driver repurposes for lock state
    pub locked: u8,
}

impl NvCachePackedMd {
    pub const SIZE: usize = 8;

    /// One or more sectors in the NAND page are bad
    pub const SECTORS_BAD: u8 = 1 << 0;
    pub const DIRTY: u8 = 1 << 1;
    pub const FRAME_TYPE_SHIFT: u8 = 2;
    const FRAME_TYPE_MASK: u8 = 0x7;
    /// Frame is in the clean area of the LRU list
    pub const IN_CLEAN_AREA: u8 = 1 << 5;
    /// Frame was trimmed after the last clean shutdown
    pub const TRIMMED: u8 = 1 << 6;

    #[must_use]
    pub const fn is_dirty(&self) -> bool {
        self.flags & Self::DIRTY != 0
    }

    #[must_use]
    pub const fn has_bad_sectors(&self) -> bool {
        self.flags & Self::SECTORS_BAD != 0
    }

    #[must_use]
    pub const fn in_clean_area(&self) -> bool {
        self.flags & Self::IN_CLEAN_AREA != 0
    }

    #[must_use]
    pub const fn is_trimmed(&self) -> bool {
        self.flags & Self::TRIMMED != 0
    }

    /// Frame type stored between the dirty and clean-area bits
    #[must_use]
    pub const fn frame_type(&self) -> u8 {
        (self.flags >> Self::FRAME_TYPE_SHIFT) & Self::FRAME_TYPE_MASK
    }

    pub fn encode(&self, buf: &mut impl BufMut) {
        buf.put_u32_le(self.seg_num);
        buf.put_u16_le(self.per_sector_validity);
        buf.put_u8(self.flags);
        buf.put_u8(self.locked);
    }

    pub fn decode(data: &[u8]) -> Result<Self, SuperError> {
        need(data, Self::SIZE, "packed metadata")?;
        let mut buf = data;
        Ok(Self {
            seg_num: buf.get_u32_le(),
            per_sector_validity: buf.get_u16_le(),
            flags: buf.get_u8(),
            locked: buf.get_u8(),
        })
    }
}

/// Configuration of one accelerated volume
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct NvCacheVolConfig {
    /// Unique id of the accelerated volume
    pub acc_vol_orig_family_num: u32,
    /// Zero together with the family when no volume is associated
    pub acc_vol_dev_id: u16,
    /// Raw `NvCacheMode` value
    pub nv_cache_mode: u16,
    /// Serial of the accelerated volume, empty when unassociated
    pub acc_vol_name: [u8; MAX_RAID_SERIAL_LEN],
    pub flags: u32,
    /// Power cycle count of the underlying device at last enumeration
    pub power_cycle_count: u32,
    pub expansion_space: [u32; VOL_CONFIG_RESERVED],
}

impl Default for NvCacheVolConfig {
    fn default() -> Self {
        Self {
            acc_vol_orig_family_num: 0,
            acc_vol_dev_id: 0,
            nv_cache_mode: NvCacheMode::Off as u16,
            acc_vol_name: [0; MAX_RAID_SERIAL_LEN],
            flags: 0,
            power_cycle_count: 0,
            expansion_space: [0; VOL_CONFIG_RESERVED],
        }
    }
}

impl NvCacheVolConfig {
    pub const SIZE: usize = 160;

    /// Decoded cache mode, `None` for values outside the known states
    #[must_use]
    pub fn mode(&self) -> Option<NvCacheMode> {
        NvCacheMode::try_from(self.nv_cache_mode).ok()
    }

    /// Whether a volume is associated with the cache
    #[must_use]
    pub const fn is_associated(&self) -> bool {
        self.acc_vol_name[0] != 0
    }

    pub fn encode(&self, buf: &mut impl BufMut) {
        buf.put_u32_le(self.acc_vol_orig_family_num);
        buf.put_u16_le(self.acc_vol_dev_id);
        buf.put_u16_le(self.nv_cache_mode);
        buf.put_slice(&self.acc_vol_name);
        buf.put_u32_le(self.flags);
        buf.put_u32_le(self.power_cycle_count);
        put_words(buf, &self.expansion_space);
    }

    pub fn decode(data: &[u8]) -> Result<Self, SuperError> {
        need(data, Self::SIZE, "volume config")?;
        let mut buf = data;
        let acc_vol_orig_family_num = buf.get_u32_le();
        let acc_vol_dev_id = buf.get_u16_le();
        let nv_cache_mode = buf.get_u16_le();
        let mut acc_vol_name = [0u8; MAX_RAID_SERIAL_LEN];
        buf.copy_to_slice(&mut acc_vol_name);
        Ok(Self {
            acc_vol_orig_family_num,
            acc_vol_dev_id,
            nv_cache_mode,
            acc_vol_name,
            flags: buf.get_u32_le(),
            power_cycle_count: buf.get_u32_le(),
            expansion_space: get_words(&mut buf),
        })
    }
}

/// Configuration header preceding the packed metadata block
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct NvCacheConfigHeader {
    pub signature: [u8; NVC_SIG_LEN],
    pub version_number: u16,
    /// Length of this header in bytes
    pub header_length: u16,
    /// Length of header and volume entries in bytes
    pub total_length: u32,
    /// Volumes with configuration entries (0 or 1)
    pub num_volumes: u16,
    pub expansion_space: [u32; MD_HEADER_RESERVED],
    pub vol_config_md: [NvCacheVolConfig; MAX_NV_CACHE_VOLS],
}

impl Default for NvCacheConfigHeader {
    #[allow(clippy::cast_possible_truncation)]
    fn default() -> Self {
        Self {
            signature: *NV_CACHE_CONFIG_SIG,
            version_number: 1,
            header_length: Self::SIZE as u16,
            total_length: Self::SIZE as u32,
            num_volumes: 0,
            expansion_space: [0; MD_HEADER_RESERVED],
            vol_config_md: [NvCacheVolConfig::default(); MAX_NV_CACHE_VOLS],
        }
    }
}

impl NvCacheConfigHeader {
    pub const SIZE: usize = 330;

    /// Entries actually in use
    #[must_use]
    pub fn volumes(&self) -> &[NvCacheVolConfig] {
        let n = usize::from(self.num_volumes).min(MAX_NV_CACHE_VOLS);
        &self.vol_config_md[..n]
    }

    pub fn encode(&self, buf: &mut impl BufMut) {
        buf.put_slice(&self.signature);
        buf.put_u16_le(self.version_number);
        buf.put_u16_le(self.header_length);
        buf.put_u32_le(self.total_length);
        buf.put_u16_le(self.num_volumes);
        put_words(buf, &self.expansion_space);
        for vol in &self.vol_config_md {
            vol.encode(buf);
        }
    }

    /// Decode and validate signature and length fields
    pub fn decode(data: &[u8]) -> Result<Self, SuperError> {
        need(data, Self::SIZE, "cache config header")?;
        let mut buf = data;
        let mut signature = [0u8; NVC_SIG_LEN];
        buf.copy_to_slice(&mut signature);
        if &signature != NV_CACHE_CONFIG_SIG {
            return Err(SuperError::NoSuperblock);
        }
        let version_number = buf.get_u16_le();
        let header_length = buf.get_u16_le();
        let total_length = buf.get_u32_le();
        if usize::from(header_length) > Self::SIZE
            || (total_length as usize) < usize::from(header_length)
        {
            return Err(SuperError::UnsupportedVersion(format!(
                "cache config lengths {header_length}/{total_length}"
            )));
        }
        let num_volumes = buf.get_u16_le();
        if usize::from(num_volumes) > MAX_NV_CACHE_VOLS {
            return Err(SuperError::UnsupportedVersion(format!(
                "{num_volumes} cache volumes"
            )));
        }
        let expansion_space = get_words(&mut buf);
        let mut vol_config_md = [NvCacheVolConfig::default(); MAX_NV_CACHE_VOLS];
        for vol in &mut vol_config_md {
            *vol = NvCacheVolConfig::decode(buf)?;
            buf.advance(NvCacheVolConfig::SIZE);
        }
        Ok(Self {
            signature,
            version_number,
            header_length,
            total_length,
            num_volumes,
            expansion_space,
            vol_config_md,
        })
    }
}

/// Packed metadata block locating the cache's on-media structures
///
/// Fields named `*_nba` are sector addresses on the cache device.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct IsrtMpb {
    /// Primary packed metadata array
    pub packed_md0_nba: u32,
    /// Secondary packed metadata array
    pub packed_md1_nba: u32,
    /// Which packed array (0 or 1) the delta log applies to
    pub md_base_for_delta_log: u32,
    pub packed_md_size: u32,
    pub aux_packed_md_nba: u32,
    pub aux_packed_md_size: u32,
    pub cache_frame0_nba: u32,
    pub seg_num_index_nba: u32,
    pub seg_num_heap_nba: u32,
    /// Whole pages; the tail of the last page is filled with `u32::MAX`
    pub seg_num_heap_size: u32,
    pub seg_heap_toc: [u32; MAX_SEGHEAP_TOC_ENTRIES],
    /// Start of the circular metadata delta log
    pub md_delta_log_nba: u32,
    pub md_delta_log_max_size: u32,
    pub orom_frames_to_sync_nba: u32,
    pub num_cache_frames: u32,
    pub cache_frame_size: u32,
    /// Added to host LBAs before shifting to a segment number
    pub lba_alignment: u32,
    /// Frames with a smaller generation number are invalid
    pub valid_frame_gen_num: u32,
    pub packed_md_frame_gen_num: u32,
    pub curr_clean_batch_num: u32,
    pub total_used_sectors: u32,
    pub orom_log_nba: u32,
    /// In 512-byte blocks
    pub orom_log_size: u32,
    pub s4_crash_dmp_extent_log_nba: u32,
    /// Raw `ShutdownState` value
    pub driver_shutdown_state: u32,
    pub validity_bits: u32,
    pub nvc_hdr_array_in_dram: u64,
    /// The log ends at the first record with a smaller generation
    pub curr_delta_log_gen_num: u32,
    pub md_delta_log_first: u32,
    pub md_delta_log_num_free_frames: u32,
    pub num_dirty_frames: u32,
    pub num_dirty_frames_at_mode_trans: u32,
}

impl IsrtMpb {
    pub const SIZE: usize = 164;

    /// Decoded shutdown state, `None` for unknown values
    #[must_use]
    pub fn shutdown_state(&self) -> Option<ShutdownState> {
        ShutdownState::try_from(self.driver_shutdown_state).ok()
    }

    /// Packed metadata array the delta log applies to
    #[must_use]
    pub const fn delta_log_base_nba(&self) -> u32 {
        if self.md_base_for_delta_log == 0 {
            self.packed_md0_nba
        } else {
            self.packed_md1_nba
        }
    }

    /// Array the next full packed-metadata write goes to
    #[must_use]
    pub const fn alternate_base_nba(&self) -> u32 {
        if self.md_base_for_delta_log == 0 {
            self.packed_md1_nba
        } else {
            self.packed_md0_nba
        }
    }

    pub fn encode(&self, buf: &mut impl BufMut) {
        put_words(
            buf,
            &[
                self.packed_md0_nba,
                self.packed_md1_nba,
                self.md_base_for_delta_log,
                self.packed_md_size,
                self.aux_packed_md_nba,
                self.aux_packed_md_size,
                self.cache_frame0_nba,
                self.seg_num_index_nba,
                self.seg_num_heap_nba,
                self.seg_num_heap_size,
            ],
        );
        put_words(buf, &self.seg_heap_toc);
        put_words(
            buf,
            &[
                self.md_delta_log_nba,
                self.md_delta_log_max_size,
                self.orom_frames_to_sync_nba,
                self.num_cache_frames,
                self.cache_frame_size,
                self.lba_alignment,
                self.valid_frame_gen_num,
                self.packed_md_frame_gen_num,
                self.curr_clean_batch_num,
                self.total_used_sectors,
                self.orom_log_nba,
                self.orom_log_size,
                self.s4_crash_dmp_extent_log_nba,
                self.driver_shutdown_state,
                self.validity_bits,
            ],
        );
        buf.put_u64_le(self.nvc_hdr_array_in_dram);
        put_words(
            buf,
            &[
                self.curr_delta_log_gen_num,
                self.md_delta_log_first,
                self.md_delta_log_num_free_frames,
                self.num_dirty_frames,
                self.num_dirty_frames_at_mode_trans,
            ],
        );
    }

    pub fn decode(data: &[u8]) -> Result<Self, SuperError> {
        need(data, Self::SIZE, "packed metadata block")?;
        let mut buf = data;
        let [
            packed_md0_nba,
            packed_md1_nba,
            md_base_for_delta_log,
            packed_md_size,
            aux_packed_md_nba,
            aux_packed_md_size,
            cache_frame0_nba,
            seg_num_index_nba,
            seg_num_heap_nba,
            seg_num_heap_size,
        ] = get_words::<10>(&mut buf);
        let seg_heap_toc = get_words(&mut buf);
        let [
            md_delta_log_nba,
            md_delta_log_max_size,
            orom_frames_to_sync_nba,
            num_cache_frames,
            cache_frame_size,
            lba_alignment,
            valid_frame_gen_num,
            packed_md_frame_gen_num,
            curr_clean_batch_num,
            total_used_sectors,
            orom_log_nba,
            orom_log_size,
            s4_crash_dmp_extent_log_nba,
            driver_shutdown_state,
            validity_bits,
        ] = get_words::<15>(&mut buf);
        let nvc_hdr_array_in_dram = buf.get_u64_le();
        let [
            curr_delta_log_gen_num,
            md_delta_log_first,
            md_delta_log_num_free_frames,
            num_dirty_frames,
            num_dirty_frames_at_mode_trans,
        ] = get_words::<5>(&mut buf);

        Ok(Self {
            packed_md0_nba,
            packed_md1_nba,
            md_base_for_delta_log,
            packed_md_size,
            aux_packed_md_nba,
            aux_packed_md_size,
            cache_frame0_nba,
            seg_num_index_nba,
            seg_num_heap_nba,
            seg_num_heap_size,
            seg_heap_toc,
            md_delta_log_nba,
            md_delta_log_max_size,
            orom_frames_to_sync_nba,
            num_cache_frames,
            cache_frame_size,
            lba_alignment,
            valid_frame_gen_num,
            packed_md_frame_gen_num,
            curr_clean_batch_num,
            total_used_sectors,
            orom_log_nba,
            orom_log_size,
            s4_crash_dmp_extent_log_nba,
            driver_shutdown_state,
            validity_bits,
            nvc_hdr_array_in_dram,
            curr_delta_log_gen_num,
            md_delta_log_first,
            md_delta_log_num_free_frames,
            num_dirty_frames,
            num_dirty_frames_at_mode_trans,
        })
    }
}

/// Complete control record at the start of a cache volume
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct NvCacheControlData {
    pub hdr: NvCacheConfigHeader,
    pub mpb: IsrtMpb,
}

impl NvCacheControlData {
    pub const SIZE: usize = NvCacheConfigHeader::SIZE + IsrtMpb::SIZE;

    /// Mode of the first configured volume
    #[must_use]
    pub fn mode(&self) -> Option<NvCacheMode> {
        self.hdr.volumes().first().and_then(NvCacheVolConfig::mode)
    }

    pub fn encode(&self, buf: &mut impl BufMut) {
        self.hdr.encode(buf);
        self.mpb.encode(buf);
    }

    pub fn decode(data: &[u8]) -> Result<Self, SuperError> {
        need(data, Self::SIZE, "cache control data")?;
        Ok(Self {
            hdr: NvCacheConfigHeader::decode(data)?,
            mpb: IsrtMpb::decode(&data[NvCacheConfigHeader::SIZE..])?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::BytesMut;

    fn encoded_len(encode: impl Fn(&mut BytesMut)) -> usize {
        let mut buf = BytesMut::new();
        encode(&mut buf);
        buf.len()
    }

    #[test]
    fn test_derived_constants() {
        assert_eq!(NVC_FRAME_SIZE_IN_KB, 8);
        assert_eq!(NVC_FRAMES_PER_GB, 128 * 1024);
        assert_eq!(MAX_NVC_FRAMES, 16 * 1024 * 1024);
        assert_eq!(SEGIDX_PAIRS_PER_NVC_FRAME, 1024);
        assert_eq!(SEGHEAP_SEGS_PER_NVC_FRAME, 2048);
        assert_eq!(FRAMES_PER_SEGHEAP_FRAME, 2 * 1024 * 1024);
        assert_eq!(MAX_SEGHEAP_NVC_FRAMES, 8);
        assert_eq!(MAX_SEGHEAP_TOC_ENTRIES, 9);
        assert_eq!(SEGMENTS_PER_PAGE, 64);
        assert_eq!(FRAME_MASK, 15);
    }

    #[test]
    fn test_record_sizes() {
        assert_eq!(
            encoded_len(|b| NvCacheVolConfig::default().encode(b)),
            NvCacheVolConfig::SIZE
        );
        assert_eq!(
            encoded_len(|b| NvCacheConfigHeader::default().encode(b)),
            NvCacheConfigHeader::SIZE
        );
        assert_eq!(encoded_len(|b| IsrtMpb::default().encode(b)), IsrtMpb::SIZE);
        assert_eq!(
            encoded_len(|b| NvCacheControlData::default().encode(b)),
            494
        );
        assert_eq!(
            encoded_len(|b| NvCachePackedMd::default().encode(b)),
            NvCachePackedMd::SIZE
        );
        assert_eq!(
            encoded_len(|b| SegmentIndexPair::default().encode(b)),
            SegmentIndexPair::SIZE
        );
    }

    #[test]
    fn test_field_offsets() {
        let mut data = NvCacheControlData::default();
        data.hdr.num_volumes = 1;
        data.hdr.vol_config_md[0].nv_cache_mode = NvCacheMode::Perf as u16;
        data.hdr.vol_config_md[0].acc_vol_name[..4].copy_from_slice(b"Vol0");
        data.mpb.seg_heap_toc[8] = 0xAABB_CCDD;
        data.mpb.driver_shutdown_state = ShutdownState::S4CrashDmpEnd as u32;
        data.mpb.nvc_hdr_array_in_dram = 0x0102_0304_0506_0708;
        data.mpb.num_dirty_frames_at_mode_trans = 0x1234_5678;

        let mut buf = BytesMut::new();
        data.encode(&mut buf);

        assert_eq!(&buf[..NVC_SIG_LEN], NV_CACHE_CONFIG_SIG);
        // num_volumes follows signature, version, header and total length
        assert_eq!(&buf[40..42], &[1, 0]);
        // vol_config_md[0] starts after 32 reserved words
        let vol = 42 + 4 * MD_HEADER_RESERVED;
        assert_eq!(vol, 170);
        assert_eq!(&buf[vol + 6..vol + 8], &[5, 0]);
        assert_eq!(&buf[vol + 8..vol + 12], b"Vol0");
        // seg_heap_toc[8] at mpb offset 40 + 8 * 4
        let mpb = NvCacheConfigHeader::SIZE;
        assert_eq!(&buf[mpb + 72..mpb + 76], &0xAABB_CCDDu32.to_le_bytes());
        assert_eq!(&buf[mpb + 128..mpb + 132], &2u32.to_le_bytes());
        assert_eq!(
            &buf[mpb + 136..mpb + 144],
            &0x0102_0304_0506_0708u64.to_le_bytes()
        );
        assert_eq!(&buf[mpb + 160..mpb + 164], &0x1234_5678u32.to_le_bytes());

        let decoded = NvCacheControlData::decode(&buf).unwrap();
        assert_eq!(decoded, data);
        assert_eq!(decoded.mode(), Some(NvCacheMode::Perf));
        assert_eq!(
            decoded.mpb.shutdown_state(),
            Some(ShutdownState::S4CrashDmpEnd)
        );
    }

    #[test]
    fn test_decode_validation() {
        let mut buf = BytesMut::new();
        NvCacheControlData::default().encode(&mut buf);

        assert!(NvCacheControlData::decode(&buf[..100]).is_err());

        let mut bad_sig = buf.to_vec();
        bad_sig[0] = b'X';
        assert!(matches!(
            NvCacheControlData::decode(&bad_sig),
            Err(SuperError::NoSuperblock)
        ));

        let mut bad_len = buf.to_vec();
        bad_len[34..36].copy_from_slice(&1000u16.to_le_bytes());
        assert!(NvCacheControlData::decode(&bad_len).is_err());

        let mut too_many = buf.to_vec();
        too_many[40..42].copy_from_slice(&2u16.to_le_bytes());
        assert!(NvCacheControlData::decode(&too_many).is_err());
    }

    #[test]
    fn test_cache_modes() {
        let enabled: Vec<u16> = (0..12)
            .filter(|m| NvCacheMode::try_from(*m).unwrap().is_enabled())
            .collect();
        assert_eq!(enabled, vec![1, 2, 3, 4, 5, 6, 7, 8, 9]);
        assert_eq!(NvCacheMode::try_from(12), Err(12));
        assert_eq!(NvCacheMode::PerfToSafe.to_string(), "perf-to-safe");
    }

    #[test]
    fn test_packed_md_flags() {
        let md = NvCachePackedMd {
            seg_num: 42,
            per_sector_validity: 0xffff,
            flags: NvCachePackedMd::DIRTY
                | (3 << NvCachePackedMd::FRAME_TYPE_SHIFT)
                | NvCachePackedMd::TRIMMED,
            locked: 1,
        };
        assert!(md.is_dirty());
        assert!(md.is_trimmed());
        assert!(!md.in_clean_area());
        assert!(!md.has_bad_sectors());
        assert_eq!(md.frame_type(), 3);

        let mut buf = BytesMut::new();
        md.encode(&mut buf);
        assert_eq!(&buf[..], &[42, 0, 0, 0, 0xff, 0xff, 0b0100_1110, 1]);
        assert_eq!(NvCachePackedMd::decode(&buf).unwrap(), md);
    }

    #[test]
    fn test_delta_log_base_selection() {
        let mut mpb = IsrtMpb {
            packed_md0_nba: 100,
            packed_md1_nba: 200,
            ..Default::default()
        };
        assert_eq!(mpb.delta_log_base_nba(), 100);
        assert_eq!(mpb.alternate_base_nba(), 200);
        mpb.md_base_for_delta_log = 1;
        assert_eq!(mpb.delta_log_base_nba(), 200);
        assert_eq!(mpb.alternate_base_nba(), 100);
    }
}

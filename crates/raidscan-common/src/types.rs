//! Core type definitions for raidscan
//!
//! This module defines the normalized snapshot every metadata driver
//! produces (`ArrayInfo`), the array identifier with its per-format
//! display rule, and the md per-disk state bits.

use derive_more::{From, Into};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Level value md uses for a container (no data layout of its own)
pub const LEVEL_CONTAINER: i32 = -100;

/// Sector size used by every on-disk format handled here
pub const SECTOR_SIZE: u64 = 512;

/// Array identifier as stored on disk
///
/// The 16 bytes are kept in on-disk order and compare bytewise. Formats
/// that store the identifier as four host-order 32-bit words declare
/// `swap`, which only changes how the words are displayed.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, From, Into)]
pub struct ArrayUuid(Uuid);

impl ArrayUuid {
    /// Identifier of all zeroes
    #[must_use]
    pub const fn nil() -> Self {
        Self(Uuid::nil())
    }

    /// Create from raw on-disk bytes
    #[must_use]
    pub const fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(Uuid::from_bytes(bytes))
    }

    /// Get as bytes
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 16] {
        self.0.as_bytes()
    }

    /// Byte-reverse each 32-bit word
    #[must_use]
    pub fn swapped(&self) -> Self {
        let mut bytes = *self.as_bytes();
        for word in bytes.chunks_exact_mut(4) {
            word.reverse();
        }
        Self::from_bytes(bytes)
    }

    /// Render as four colon-separated hex words, the md configuration form
    #[must_use]
    pub fn to_md_string(&self, swap: bool) -> String {
        let bytes = if swap { self.swapped() } else { *self };
        let mut out = String::with_capacity(35);
        for (i, b) in bytes.as_bytes().iter().enumerate() {
            if i != 0 && i % 4 == 0 {
                out.push(':');
            }
            out.push_str(&format!("{b:02x}"));
        }
        out
    }
}

impl fmt::Debug for ArrayUuid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ArrayUuid({})", self.to_md_string(false))
    }
}

impl fmt::Display for ArrayUuid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_md_string(false))
    }
}

/// md per-disk state word (`mdp_disk_t.state` bit numbers)
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, From, Into)]
pub struct DiskState(u32);

impl DiskState {
    pub const FAULTY: u32 = 0;
    pub const ACTIVE: u32 = 1;
    pub const SYNC: u32 = 2;
    pub const REMOVED: u32 = 3;
    pub const WRITE_MOSTLY: u32 = 9;
    pub const FAILFAST: u32 = 10;
    pub const REPLACEMENT: u32 = 17;
    pub const JOURNAL: u32 = 18;

    /// Create from the raw state word
    #[must_use]
    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    /// Active and in sync, the state of a healthy member
    #[must_use]
    pub const fn active_sync() -> Self {
        Self((1 << Self::ACTIVE) | (1 << Self::SYNC))
    }

    /// Raw state word
    #[must_use]
    pub const fn bits(self) -> u32 {
        self.0
    }

    /// Test a state bit
    #[must_use]
    pub const fn contains(self, bit: u32) -> bool {
        self.0 & (1 << bit) != 0
    }

    /// Set a state bit
    #[must_use]
    pub const fn with(self, bit: u32) -> Self {
        Self(self.0 | (1 << bit))
    }

    /// Clear a state bit
    #[must_use]
    pub const fn without(self, bit: u32) -> Self {
        Self(self.0 & !(1 << bit))
    }

    #[must_use]
    pub const fn is_in_sync(self) -> bool {
        self.contains(Self::SYNC)
    }

    #[must_use]
    pub const fn is_faulty(self) -> bool {
        self.contains(Self::FAULTY)
    }

    /// Words used by the verbose table ("active sync", "spare", ...)
    #[must_use]
    pub fn describe(self) -> String {
        let mut words = Vec::new();
        if self.is_faulty() {
            words.push("faulty");
        }
        if self.contains(Self::ACTIVE) {
            words.push("active");
        }
        if self.is_in_sync() {
            words.push("sync");
        }
        if self.contains(Self::REMOVED) {
            words.push("removed");
        }
        if self.contains(Self::WRITE_MOSTLY) {
            words.push("write-mostly");
        }
        if self.contains(Self::JOURNAL) {
            words.push("journal");
        }
        if words.is_empty() {
            words.push("spare");
        }
        words.join(" ")
    }
}

impl fmt::Debug for DiskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DiskState({:#x}: {})", self.0, self.describe())
    }
}

/// Role of the examined device inside its array
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiskInfo {
    /// Slot of the device record in the superblock
    pub number: i32,
    /// Position in the array, -1 when not an active member
    pub raid_disk: i32,
    /// State bits
    pub state: DiskState,
}

impl Default for DiskInfo {
    fn default() -> Self {
        Self {
            number: -1,
            raid_disk: -1,
            state: DiskState::default(),
        }
    }
}

/// Normalized snapshot produced by a metadata driver
///
/// Immutable once produced; the examine engine replaces a group's stored
/// snapshot with the most recent one.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArrayInfo {
    /// Array (or cache leg) identifier
    pub uuid: ArrayUuid,
    /// Array name, empty when the format has none
    pub name: String,
    /// md level number
    pub level: i32,
    /// Number of member slots
    pub raid_disks: u32,
    /// This device's role
    pub disk: DiskInfo,
    /// Update counter
    pub events: u64,
    /// Number of nested cache legs reachable from this identity
    pub cache_legs: usize,
}

impl ArrayInfo {
    /// Personality name for the level, when known
    #[must_use]
    pub fn level_name(&self) -> Option<&'static str> {
        level_name(self.level)
    }
}

/// Map an md level number to its personality name
#[must_use]
pub const fn level_name(level: i32) -> Option<&'static str> {
    match level {
        -1 => Some("linear"),
        0 => Some("raid0"),
        1 => Some("raid1"),
        4 => Some("raid4"),
        5 => Some("raid5"),
        6 => Some("raid6"),
        10 => Some("raid10"),
        -4 => Some("multipath"),
        -5 => Some("faulty"),
        LEVEL_CONTAINER => Some("container"),
        _ => None,
    }
}

/// Human-readable size in the brief JEDEC form (`1022.00MiB`)
///
/// Sizes under about 5 MiB render as an empty string.
#[must_use]
pub fn human_size_brief(bytes: u64) -> String {
    const MIB: u64 = 1 << 20;
    const GIB: u64 = 1 << 30;

    if bytes < 5000 * 1024 {
        String::new()
    } else if bytes < 2 * GIB {
        let centi = (u128::from(bytes) * 200 / u128::from(MIB)).div_ceil(2);
        format!("{}.{:02}MiB", centi / 100, centi % 100)
    } else {
        let centi = (u128::from(bytes) * 200 / u128::from(GIB)).div_ceil(2);
        format!("{}.{:02}GiB", centi / 100, centi % 100)
    }
}

/// Optional capability a metadata driver may or may not provide
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Capability {
    /// Multi-member container load
    LoadContainer,
    /// Full detail listing
    Verbose,
    /// KEY=value listing
    Export,
    /// Configuration-line listing
    Brief,
    /// Member arrays of a container in brief form
    BriefSubarrays,
    /// Cache legs in brief form
    BriefCache,
    /// Bad-block log listing
    Badblocks,
}

impl Capability {
    /// Get the capability name as it appears in diagnostics
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::LoadContainer => "container load",
            Self::Verbose => "detailed listing",
            Self::Export => "export listing",
            Self::Brief => "brief listing",
            Self::BriefSubarrays => "subarray listing",
            Self::BriefCache => "cache listing",
            Self::Badblocks => "badblocks",
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

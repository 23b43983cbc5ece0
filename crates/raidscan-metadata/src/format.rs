//! Metadata driver abstraction
//!
//! A driver has two halves:
//!
//! - `MetadataFormat`: a stateless, statically allocated descriptor for one
//!   on-disk format family. It sniffs devices and creates handlers.
//! - `MetadataHandler`: one device's parsed superblock. Handlers own their
//!   parsed buffers and release them on drop.
//!
//! Optional capabilities are advertised through `FormatCapabilities`; the
//! default method bodies report `SuperError::Unsupported`.

use crate::device::BlockDevice;
use raidscan_common::{ArrayInfo, Capability, SuperError, human_size_brief};
use chrono::{Local, TimeZone};
use std::any::Any;
use std::fmt;

/// Result type for driver operations
pub type SuperResult<T> = Result<T, SuperError>;

/// Capabilities of a metadata format
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FormatCapabilities {
    /// Format name for identification
    pub name: &'static str,
    /// Supports loading a multi-member container
    pub container: bool,
    /// Supports the full detail listing
    pub verbose: bool,
    /// Supports KEY=value output
    pub export: bool,
    /// Supports the brief configuration line
    pub brief: bool,
    /// Lists member arrays after the brief line
    pub brief_subarrays: bool,
    /// Lists cache legs in brief form
    pub brief_cache: bool,
    /// Can list the bad-block log
    pub badblocks: bool,
}

impl FormatCapabilities {
    /// Check a single capability
    #[must_use]
    pub const fn supports(&self, capability: Capability) -> bool {
        match capability {
            Capability::LoadContainer => self.container,
            Capability::Verbose => self.verbose,
            Capability::Export => self.export,
            Capability::Brief => self.brief,
            Capability::BriefSubarrays => self.brief_subarrays,
            Capability::BriefCache => self.brief_cache,
            Capability::Badblocks => self.badblocks,
        }
    }
}

/// Stateless descriptor of an on-disk metadata format family
pub trait MetadataFormat: Send + Sync {
    /// Family name, the driver identity used for grouping
    fn name(&self) -> &'static str;

    /// Get format capabilities
    fn capabilities(&self) -> FormatCapabilities;

    /// Whether identifiers are stored as host-order words
    fn swap_uuid(&self) -> bool {
        false
    }

    /// Whether `name` selects this format (`-m`/`--metadata` spelling)
    fn accepts(&self, name: &str) -> bool;

    /// Create an empty handler for the variant selected by `name`
    fn instantiate(&'static self, name: &str) -> Box<dyn MetadataHandler>;

    /// Read-only sniff of a device
    ///
    /// Returns an unloaded handler when the format's signature is present.
    fn detect(&'static self, device: &dyn BlockDevice) -> Option<Box<dyn MetadataHandler>>;
}

impl fmt::Debug for dyn MetadataFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MetadataFormat")
            .field("name", &self.name())
            .finish()
    }
}

/// Whether two formats are the same driver
#[must_use]
pub fn same_format(a: &dyn MetadataFormat, b: &dyn MetadataFormat) -> bool {
    a.name() == b.name()
}

/// One device's parsed metadata
pub trait MetadataHandler: Any + Send + fmt::Debug + 'static {
    /// The format this handler belongs to
    fn format(&self) -> &'static dyn MetadataFormat;

    /// Parse a single-device superblock
    ///
    /// `devname` is only passed when diagnostics may mention the device.
    fn load_super(&mut self, device: &dyn BlockDevice, devname: Option<&str>) -> SuperResult<()>;

    /// Parse a multi-member container header
    fn load_container(
        &mut self,
        _device: &dyn BlockDevice,
        _devname: Option<&str>,
    ) -> SuperResult<()> {
        Err(SuperError::Unsupported(Capability::LoadContainer))
    }

    /// Snapshot of the base identity (`leg == 0`) or of a cache leg
    fn info(&self, leg: usize) -> ArrayInfo;

    /// Whether both handlers describe the same array
    ///
    /// Handlers of different formats are never equal.
    fn compare(&self, other: &dyn MetadataHandler) -> bool;

    /// Apply the legacy sparc2.2 layout fixup; formats without one ignore it
    fn compat_fixup(&mut self) {}

    /// Full detail listing
    fn render_verbose(&self, _homehost: Option<&str>) -> SuperResult<String> {
        Err(SuperError::Unsupported(Capability::Verbose))
    }

    /// KEY=value listing
    fn render_export(&self) -> SuperResult<String> {
        Err(SuperError::Unsupported(Capability::Export))
    }

    /// Brief configuration line, newline terminated
    fn render_brief(&self, _verbose: bool) -> SuperResult<String> {
        Err(SuperError::Unsupported(Capability::Brief))
    }

    /// Brief lines for the member arrays of a container
    fn render_brief_subarrays(&self, _verbose: i32) -> SuperResult<String> {
        Err(SuperError::Unsupported(Capability::BriefSubarrays))
    }

    /// Brief line for one cache leg
    fn render_brief_cache(&self, _leg: usize) -> SuperResult<String> {
        Err(SuperError::Unsupported(Capability::BriefCache))
    }

    /// Bad-block log listing
    fn examine_badblocks(&self, _device: &dyn BlockDevice, _devname: &str) -> SuperResult<String> {
        Err(SuperError::Unsupported(Capability::Badblocks))
    }

    /// Independent copy of this handler and its parsed state
    fn clone_handler(&self) -> Box<dyn MetadataHandler>;

    /// Downcasting support for `compare`
    fn as_any(&self) -> &dyn Any;
}

impl dyn MetadataHandler {
    /// Downcast to a concrete handler type
    #[must_use]
    pub fn downcast_ref<T: MetadataHandler>(&self) -> Option<&T> {
        self.as_any().downcast_ref::<T>()
    }

    /// Capabilities of this handler's format
    #[must_use]
    pub fn capabilities(&self) -> FormatCapabilities {
        self.format().capabilities()
    }

    /// Whether both handlers come from the same driver
    #[must_use]
    pub fn same_format_as(&self, other: &dyn MetadataHandler) -> bool {
        same_format(self.format(), other.format())
    }
}

/// Sum a buffer as little-endian u32 words into a u64 accumulator
///
/// A trailing partial word is added as a zero-extended little-endian value.
#[must_use]
pub(crate) fn sum_le_words(data: &[u8]) -> u64 {
    let mut chunks = data.chunks_exact(4);
    let mut sum: u64 = chunks
        .by_ref()
        .map(|w| u64::from(u32::from_le_bytes([w[0], w[1], w[2], w[3]])))
        .sum();
    let rest = chunks.remainder();
    if !rest.is_empty() {
        let mut word = [0u8; 4];
        word[..rest.len()].copy_from_slice(rest);
        sum += u64::from(u32::from_le_bytes(word));
    }
    sum
}

/// Fold a 64-bit word sum into 32 bits
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub(crate) const fn fold_csum(sum: u64) -> u32 {
    ((sum & 0xffff_ffff) + (sum >> 32)) as u32
}

/// Trim a fixed-width, NUL-padded on-disk string
#[must_use]
pub(crate) fn trim_nul(bytes: &[u8]) -> String {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[..end]).into_owned()
}

/// Copy a string into a fixed-width, NUL-padded field
pub(crate) fn pad_nul<const N: usize>(value: &str) -> [u8; N] {
    let mut out = [0u8; N];
    let len = value.len().min(N);
    out[..len].copy_from_slice(&value.as_bytes()[..len]);
    out
}

/// Render a Unix timestamp the way `ctime(3)` does, without the newline
#[must_use]
pub(crate) fn format_ctime(secs: u64) -> String {
    i64::try_from(secs)
        .ok()
        .and_then(|secs| Local.timestamp_opt(secs, 0).single())
        .map_or_else(|| format!("@{secs}"), |t| t.format("%a %b %e %H:%M:%S %Y").to_string())
}

/// Size annotation appended after a raw count, empty for small sizes
#[must_use]
pub(crate) fn size_suffix(bytes: u64) -> String {
    let human = human_size_brief(bytes);
    if human.is_empty() {
        human
    } else {
        format!(" ({human})")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capability_lookup() {
        let caps = FormatCapabilities {
            name: "test",
            brief: true,
            badblocks: true,
            ..Default::default()
        };
        assert!(caps.supports(Capability::Brief));
        assert!(caps.supports(Capability::Badblocks));
        assert!(!caps.supports(Capability::Export));
        assert!(!caps.supports(Capability::LoadContainer));
    }

    #[test]
    fn test_word_sum_and_fold() {
        let data = [1u8, 0, 0, 0, 2, 0, 0, 0, 3, 0];
        assert_eq!(sum_le_words(&data), 6);
        assert_eq!(fold_csum(0x1_0000_0002), 3);
    }

    #[test]
    fn test_ctime_shape() {
        let text = format_ctime(1_600_000_000);
        assert_eq!(text.len(), 24);
        assert!(text.ends_with("2020"));
    }

    #[test]
    fn test_nul_strings() {
        let field: [u8; 8] = pad_nul("abc");
        assert_eq!(&field, b"abc\0\0\0\0\0");
        assert_eq!(trim_nul(&field), "abc");
        assert_eq!(trim_nul(b"abcdefgh"), "abcdefgh");
    }
}

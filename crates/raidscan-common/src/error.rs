//! Error types for raidscan
//!
//! Two layers: `SuperError` is what a metadata driver reports when it
//! cannot parse a device, `Error` is the per-device classification the
//! examine engine records and the CLI turns into an exit status.

use crate::types::Capability;
use thiserror::Error;

/// Common result type for raidscan operations
pub type Result<T> = std::result::Result<T, Error>;

/// Driver-level failure while reading or decoding a superblock
#[derive(Debug, Error)]
pub enum SuperError {
    #[error("no superblock found")]
    NoSuperblock,

    #[error("bad magic: expected {expected:#010x}, found {found:#010x}")]
    BadMagic { expected: u32, found: u32 },

    #[error("device too small: {size} bytes, need at least {required}")]
    TooSmall { size: u64, required: u64 },

    #[error("checksum mismatch: stored {stored:#010x}, computed {computed:#010x}")]
    ChecksumMismatch { stored: u32, computed: u32 },

    #[error("unsupported version: {0}")]
    UnsupportedVersion(String),

    #[error("corrupt superblock: {0}")]
    Corrupt(String),

    #[error("{0} is not supported")]
    Unsupported(Capability),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl SuperError {
    /// True when the device simply carries no recognizable header
    #[must_use]
    pub const fn is_absent(&self) -> bool {
        matches!(self, Self::NoSuperblock | Self::BadMagic { .. })
    }
}

/// Common error type for raidscan
#[derive(Debug, Error)]
pub enum Error {
    // Device errors
    #[error("cannot open {device}: {source}")]
    OpenFailed {
        device: String,
        #[source]
        source: std::io::Error,
    },

    // Metadata errors
    #[error("No md superblock detected on {device}.")]
    NoSuperblock { device: String },

    #[error("cannot load metadata from {device}: {reason}")]
    LoadFailed {
        device: String,
        #[source]
        reason: SuperError,
    },

    #[error("{format} metadata does not support {capability}")]
    UnsupportedCapability {
        format: String,
        capability: Capability,
    },

    #[error("unknown metadata format: {0}")]
    UnknownFormat(String),

    // Output errors
    #[error("cannot write report: {0}")]
    Output(#[source] std::io::Error),
}

impl Error {
    /// Create an open failure for a device
    pub fn open_failed(device: impl Into<String>, source: std::io::Error) -> Self {
        Self::OpenFailed {
            device: device.into(),
            source,
        }
    }

    /// Create a load failure for a device
    pub fn load_failed(device: impl Into<String>, reason: SuperError) -> Self {
        Self::LoadFailed {
            device: device.into(),
            reason,
        }
    }

    /// Create an unsupported-capability error
    pub fn unsupported(format: impl Into<String>, capability: Capability) -> Self {
        Self::UnsupportedCapability {
            format: format.into(),
            capability,
        }
    }

    /// Check if this failure sets a nonzero status when not scanning
    #[must_use]
    pub const fn is_fatal_unless_scanning(&self) -> bool {
        matches!(
            self,
            Self::OpenFailed { .. } | Self::NoSuperblock { .. } | Self::UnsupportedCapability { .. }
        )
    }

    /// Short classification name used in logs and reports
    #[must_use]
    pub const fn classification(&self) -> &'static str {
        match self {
            Self::OpenFailed { .. } => "open-failed",
            Self::NoSuperblock { .. } => "no-superblock",
            Self::LoadFailed { .. } => "load-failed",
            Self::UnsupportedCapability { .. } => "unsupported-capability",
            Self::UnknownFormat(_) => "unknown-format",
            Self::Output(_) => "output",
        }
    }
}

//! raidscan metadata layer - on-disk RAID superblocks
//!
//! This crate implements device access and the metadata drivers:
//! - Read-only block device access (raw devices and in-memory images)
//! - The driver abstraction (`MetadataFormat` / `MetadataHandler`)
//! - md v0.90 and v1.x superblocks
//! - IMSM containers with NV-cache volumes
//! - The NV-cache control metadata codec
//! - The format registry used for detection and `--metadata` lookup

pub mod device;
pub mod format;
pub mod imsm;
pub mod nvcache;
pub mod raw_io;
pub mod registry;
pub mod super0;
pub mod super1;

// Re-exports
pub use device::{BlockDevice, DeviceOpener, MemoryDevice, MemoryOpener, OpenCounters};
pub use format::{FormatCapabilities, MetadataFormat, MetadataHandler, SuperResult, same_format};
pub use imsm::{IMSM, ImsmFormat, ImsmHandler, ImsmSuper};
pub use nvcache::{NvCacheControlData, NvCacheMode, ShutdownState};
pub use raw_io::{RawDevice, RawOpener};
pub use registry::{FormatRegistry, FormatSelector};
pub use super0::{SUPER0, Super0Format, Super0Handler, Super0Header};
pub use super1::{SUPER1, Super1Format, Super1Handler, Super1Header};

//! raidscan examine engine
//!
//! Turns a list of device paths into a report:
//! - Format dispatch (forced format, container pre-check, detection)
//! - Array grouping with cache-leg resolution
//! - Verbose, export and brief rendering
//! - The single-device bad-block probe

pub mod badblocks;
pub mod dispatch;
pub mod examine;
pub mod group;
pub mod render;
pub mod report;

#[cfg(test)]
mod testing;

// Re-exports
pub use dispatch::{Dispatched, dispatch};
pub use examine::Examiner;
pub use group::{ArrayGroup, CacheGroup, GroupSet};
pub use report::{DeviceFailure, ExamineReport};

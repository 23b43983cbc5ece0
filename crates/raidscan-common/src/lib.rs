//! raidscan Common - Shared types and utilities
//!
//! This crate provides the identifier and snapshot types, the error
//! taxonomy and the run configuration shared by the metadata drivers,
//! the examine engine and the CLI.

pub mod config;
pub mod error;
pub mod types;

pub use config::{Config, DEFAULT_CONFIG_PATH, DeviceConfig, ExamineContext, ExamineDefaults};
pub use error::{Error, Result, SuperError};
pub use types::*;

//! Configuration types for raidscan
//!
//! `Config` mirrors the optional TOML file; `ExamineContext` is the
//! per-invocation option set handed to the examine engine.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Default location of the configuration file
pub const DEFAULT_CONFIG_PATH: &str = "/etc/raidscan/raidscan.toml";

/// Root configuration for raidscan
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Defaults for the examine command
    pub examine: ExamineDefaults,
    /// Device lists
    pub devices: DeviceConfig,
}

/// Defaults applied to every examine run unless overridden on the command line
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExamineDefaults {
    /// Host name used to decide whether an array is local
    pub homehost: Option<String>,
    /// Baseline verbosity
    pub verbose: i32,
}

/// Device selection
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    /// Devices examined by `--scan` when none are named
    ///
    /// Empty means enumerate every block device in the system.
    pub scan: Vec<PathBuf>,
}

/// Options for one examine invocation
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExamineContext {
    /// Suppress per-device open and format errors
    pub scan: bool,
    /// Group devices into one configuration line per array
    pub brief: bool,
    /// KEY=value output
    pub export: bool,
    /// Verbosity level; greater than zero adds detail to brief lines
    pub verbose: i32,
    /// Apply the sparc2.2 v0.90 superblock fixup
    pub compat_fixup: bool,
    /// Host name passed to verbose rendering
    pub homehost: Option<String>,
}

impl ExamineContext {
    /// Build a context seeded from the configuration file defaults
    #[must_use]
    pub fn from_defaults(defaults: &ExamineDefaults) -> Self {
        Self {
            verbose: defaults.verbose,
            homehost: defaults.homehost.clone(),
            ..Self::default()
        }
    }

    /// Whether the device name should be handed to drivers for diagnostics
    #[must_use]
    pub const fn pass_devname(&self) -> bool {
        !self.brief && !self.scan
    }

    /// Whether brief lines carry the verbose fields
    #[must_use]
    pub const fn is_verbose(&self) -> bool {
        self.verbose > 0
    }
}

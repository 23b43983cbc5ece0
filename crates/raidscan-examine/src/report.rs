//! Run outcome

use raidscan_common::{Error, Result};
use std::io::Write;
use tracing::debug;

/// Prefix for per-device diagnostics
pub const DIAG_PREFIX: &str = "raidscan";

/// A device that was skipped
#[derive(Debug)]
pub struct DeviceFailure {
    pub device: String,
    pub error: Error,
    /// A diagnostic line was written for it
    pub reported: bool,
    /// Counts against the exit status
    pub fatal: bool,
}

/// Outcome of one examine or badblocks run
#[derive(Debug, Default)]
pub struct ExamineReport {
    pub failures: Vec<DeviceFailure>,
    pub devices_scanned: usize,
    pub arrays: usize,
    pub cache_legs: usize,
}

impl ExamineReport {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// 0 when no failure counts against the run, 1 otherwise
    #[must_use]
    pub fn status(&self) -> i32 {
        i32::from(self.failures.iter().any(|f| f.fatal))
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status() == 0
    }

    /// Record a skipped device, writing its diagnostic when `reported`
    pub(crate) fn fail(
        &mut self,
        diag: &mut dyn Write,
        device: &str,
        error: Error,
        reported: bool,
        fatal: bool,
    ) -> Result<()> {
        debug!(
            "skipping {} ({}): {}",
            device,
            error.classification(),
            error
        );
        if reported {
            writeln!(diag, "{DIAG_PREFIX}: {error}").map_err(Error::Output)?;
        }
        self.failures.push(DeviceFailure {
            device: device.to_string(),
            error,
            reported,
            fatal,
        });
        Ok(())
    }
}

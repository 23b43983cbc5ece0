//! Bad-block log probe for a single device

use crate::examine::Examiner;
use crate::render::render_error;
use crate::report::ExamineReport;
use raidscan_common::{Capability, Error, Result};
use raidscan_metadata::FormatSelector;
use std::io::Write;
use std::path::Path;
use tracing::debug;

impl Examiner {
    /// List the bad-block log recorded in `path`'s superblock
    ///
    /// The listing is written only once it has been read completely; a
    /// failing probe leaves `out` untouched. With `brief`, a device without
    /// metadata is skipped quietly and the driver is not given the device
    /// name for its own diagnostics.
    pub fn examine_badblocks(
        &self,
        path: &Path,
        brief: bool,
        forced: Option<&FormatSelector>,
        out: &mut dyn Write,
        diag: &mut dyn Write,
    ) -> Result<ExamineReport> {
        let name = path.display().to_string();
        let mut report = ExamineReport::new();
        report.devices_scanned = 1;

        let device = match self.opener().open(path) {
            Ok(device) => device,
            Err(e) => {
                report.fail(diag, &name, Error::open_failed(&name, e), true, true)?;
                return Ok(report);
            }
        };

        let handler = match forced {
            Some(selector) => Some(selector.instantiate()),
            None => self.registry().guess(device.as_ref()),
        };
        let Some(mut handler) = handler else {
            let error = Error::NoSuperblock { device: name.clone() };
            report.fail(diag, &name, error, !brief, true)?;
            return Ok(report);
        };

        if !handler.capabilities().badblocks {
            let error = Error::unsupported(handler.format().name(), Capability::Badblocks);
            report.fail(diag, &name, error, true, true)?;
            return Ok(report);
        }

        let devname = (!brief).then_some(name.as_str());
        if let Err(e) = handler.load_super(device.as_ref(), devname) {
            report.fail(diag, &name, Error::load_failed(&name, e), false, true)?;
            return Ok(report);
        }

        match handler.examine_badblocks(device.as_ref(), &name) {
            Ok(listing) => {
                debug!("read bad-block log of {}", name);
                out.write_all(listing.as_bytes()).map_err(Error::Output)?;
                out.flush().map_err(Error::Output)?;
            }
            Err(e) => {
                let error = render_error(handler.as_ref(), &name, e);
                report.fail(diag, &name, error, true, true)?;
            }
        }
        Ok(report)
    }
}

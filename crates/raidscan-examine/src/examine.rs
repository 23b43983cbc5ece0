//! The examine engine
//!
//! `Examiner::examine` walks a device list once. Every device is opened,
//! dispatched to a driver and closed again before the next one is looked
//! at. Loaded drivers are rendered on the spot (verbose, export) or folded
//! into a `GroupSet` whose brief listing is written after the loop.
//!
//! Per-device failures never abort the run; they are classified into the
//! returned `ExamineReport`. Only a failing output stream ends a run early.

use crate::dispatch::{Dispatched, dispatch};
use crate::group::GroupSet;
use crate::render::{render_export, render_groups, render_verbose};
use crate::report::ExamineReport;
use raidscan_common::{Capability, Error, ExamineContext, Result};
use raidscan_metadata::{DeviceOpener, FormatRegistry, FormatSelector, RawOpener};
use std::io::Write;
use std::path::PathBuf;
use tracing::{debug, info};

/// Device examination front end
pub struct Examiner {
    registry: FormatRegistry,
    opener: Box<dyn DeviceOpener>,
}

impl Default for Examiner {
    fn default() -> Self {
        Self::new(FormatRegistry::builtin(), Box::new(RawOpener))
    }
}

impl Examiner {
    #[must_use]
    pub fn new(registry: FormatRegistry, opener: Box<dyn DeviceOpener>) -> Self {
        Self { registry, opener }
    }

    #[must_use]
    pub const fn registry(&self) -> &FormatRegistry {
        &self.registry
    }

    pub(crate) fn opener(&self) -> &dyn DeviceOpener {
        self.opener.as_ref()
    }

    /// Examine `devices` in order
    ///
    /// Report text goes to `out`, per-device diagnostics to `diag`. In
    /// brief mode nothing is written to `out` until every device has been
    /// read. `ctx.brief` takes precedence over `ctx.export`.
    pub fn examine(
        &self,
        devices: &[PathBuf],
        ctx: &ExamineContext,
        forced: Option<&FormatSelector>,
        out: &mut dyn Write,
        diag: &mut dyn Write,
    ) -> Result<ExamineReport> {
        let mut report = ExamineReport::new();
        let mut groups = GroupSet::new();

        for path in devices {
            let name = path.display().to_string();
            report.devices_scanned += 1;

            let loaded = {
                let device = match self.opener.open(path) {
                    Ok(device) => device,
                    Err(e) => {
                        let error = Error::open_failed(&name, e);
                        report.fail(diag, &name, error, !ctx.scan, !ctx.scan)?;
                        continue;
                    }
                };
                let devname = ctx.pass_devname().then_some(name.as_str());
                dispatch(&self.registry, device.as_ref(), forced, devname)
            };

            let Dispatched {
                mut handler,
                container,
            } = match loaded {
                Ok(loaded) => loaded,
                Err(error @ Error::NoSuperblock { .. }) => {
                    let reported = !(ctx.brief && ctx.scan);
                    report.fail(diag, &name, error, reported, !ctx.scan)?;
                    continue;
                }
                Err(error) => {
                    report.fail(diag, &name, error, false, false)?;
                    continue;
                }
            };

            if ctx.compat_fixup {
                handler.compat_fixup();
            }

            if ctx.brief {
                if handler.capabilities().brief {
                    groups.add(handler, container, &name);
                } else {
                    let error = Error::unsupported(handler.format().name(), Capability::Brief);
                    report.fail(diag, &name, error, !ctx.scan, !ctx.scan)?;
                }
                continue;
            }

            let rendered = if ctx.export {
                render_export(handler.as_ref(), &name, out)
            } else {
                render_verbose(handler.as_ref(), &name, ctx.homehost.as_deref(), out)
            };
            match rendered {
                Ok(()) => debug!("listed {} ({})", name, handler.format().name()),
                Err(Error::Output(e)) => return Err(Error::Output(e)),
                Err(error) => {
                    let fatal = error.is_fatal_unless_scanning() && !ctx.scan;
                    report.fail(diag, &name, error, !ctx.scan, fatal)?;
                }
            }
        }

        if ctx.brief {
            render_groups(&groups, ctx, out)?;
            report.arrays = groups.array_count();
            report.cache_legs = groups.cache_count();
        } else {
            out.flush().map_err(Error::Output)?;
        }

        info!(
            "examined {} devices: {} arrays, {} cache legs, {} skipped",
            report.devices_scanned,
            report.arrays,
            report.cache_legs,
            report.failures.len()
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MockDisk, mock_format, mock_format_with};
    use raidscan_common::ArrayUuid;
    use raidscan_metadata::{FormatCapabilities, MemoryDevice, MemoryOpener, OpenCounters};

    fn uuid(byte: u8) -> ArrayUuid {
        ArrayUuid::from_bytes([byte; 16])
    }

    fn examiner(
        format: &'static dyn raidscan_metadata::MetadataFormat,
        devices: Vec<MemoryDevice>,
    ) -> (Examiner, OpenCounters) {
        let opener = MemoryOpener::new(devices);
        let counters = opener.counters();
        (
            Examiner::new(FormatRegistry::new(vec![format]), Box::new(opener)),
            counters,
        )
    }

    fn paths(names: &[&str]) -> Vec<PathBuf> {
        names.iter().map(PathBuf::from).collect()
    }

    fn brief() -> ExamineContext {
        ExamineContext {
            brief: true,
            ..ExamineContext::default()
        }
    }

    fn run(examiner: &Examiner, names: &[&str], ctx: &ExamineContext) -> (ExamineReport, String, String) {
        let mut out = Vec::new();
        let mut diag = Vec::new();
        let report = examiner
            .examine(&paths(names), ctx, None, &mut out, &mut diag)
            .unwrap();
        (
            report,
            String::from_utf8(out).unwrap(),
            String::from_utf8(diag).unwrap(),
        )
    }

    #[test]
    fn test_brief_groups_with_spare() {
        let (format, handlers) = mock_format("mock", false);
        let (examiner, opens) = examiner(
            format,
            vec![
                MockDisk::new(uuid(1)).device("/dev/sda"),
                MockDisk::new(uuid(1)).spare().device("/dev/sdb"),
                MockDisk::new(uuid(1)).device("/dev/sdc"),
            ],
        );
        let ctx = ExamineContext {
            verbose: 1,
            ..brief()
        };

        let (report, out, diag) = run(&examiner, &["/dev/sda", "/dev/sdb", "/dev/sdc"], &ctx);
        assert_eq!(report.status(), 0);
        assert_eq!(report.arrays, 1);
        assert_eq!(report.devices_scanned, 3);
        assert!(diag.is_empty());
        assert_eq!(
            out,
            format!(
                "ARRAY metadata=mock level=raid1 UUID={}\n   spares=1   devices=/dev/sda,/dev/sdb,/dev/sdc\n",
                uuid(1).to_md_string(false)
            )
        );
        assert_eq!(opens.opened(), 3);
        assert_eq!(opens.outstanding(), 0);
        assert_eq!(handlers.outstanding(), 0);
    }

    #[test]
    fn test_bad_signature_is_reported_and_run_continues() {
        let (format, _) = mock_format("mock", false);
        let (examiner, opens) = examiner(
            format,
            vec![
                MemoryDevice::new("/dev/sda", 4096),
                MockDisk::new(uuid(2)).device("/dev/sdb"),
            ],
        );

        let (report, out, diag) = run(&examiner, &["/dev/sda", "/dev/sdb"], &ExamineContext::default());
        assert_eq!(report.status(), 1);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].device, "/dev/sda");
        assert_eq!(report.failures[0].error.classification(), "no-superblock");
        assert_eq!(diag, "raidscan: No md superblock detected on /dev/sda.\n");
        assert!(out.starts_with("/dev/sdb:\n"));
        assert_eq!(opens.outstanding(), 0);
    }

    #[test]
    fn test_scan_suppresses_open_and_format_errors() {
        let (format, _) = mock_format("mock", false);
        let (examiner, _) = examiner(
            format,
            vec![
                MemoryDevice::new("/dev/sda", 4096),
                MockDisk::new(uuid(3)).device("/dev/sdb"),
            ],
        );
        let ctx = ExamineContext {
            scan: true,
            ..brief()
        };

        let (report, out, diag) = run(&examiner, &["/dev/sda", "/dev/missing", "/dev/sdb"], &ctx);
        assert_eq!(report.status(), 0);
        assert_eq!(report.failures.len(), 2);
        assert!(report.failures.iter().all(|f| !f.reported));
        assert!(diag.is_empty());
        assert_eq!(
            out,
            format!("ARRAY metadata=mock UUID={}\n", uuid(3).to_md_string(false))
        );
    }

    #[test]
    fn test_open_failure_outside_scan() {
        let (format, _) = mock_format("mock", false);
        let (examiner, _) = examiner(format, vec![]);

        let (report, out, diag) = run(&examiner, &["/dev/gone"], &brief());
        assert_eq!(report.status(), 1);
        assert!(out.is_empty());
        assert!(diag.starts_with("raidscan: cannot open /dev/gone: "));
    }

    #[test]
    fn test_brief_no_superblock_still_reported_without_scan() {
        let (format, _) = mock_format("mock", false);
        let (examiner, _) = examiner(format, vec![MemoryDevice::new("/dev/sda", 4096)]);

        let (report, _, diag) = run(&examiner, &["/dev/sda"], &brief());
        assert_eq!(report.status(), 1);
        assert_eq!(diag, "raidscan: No md superblock detected on /dev/sda.\n");
    }

    #[test]
    fn test_load_failure_is_silent_and_not_fatal() {
        let (format, handlers) = mock_format("mock", false);
        let (examiner, opens) = examiner(
            format,
            vec![MockDisk::new(uuid(4)).container_only().device("/dev/sda")],
        );

        let (report, out, diag) = run(&examiner, &["/dev/sda"], &ExamineContext::default());
        assert_eq!(report.status(), 0);
        assert_eq!(report.failures[0].error.classification(), "load-failed");
        assert!(out.is_empty());
        assert!(diag.is_empty());
        assert_eq!(opens.outstanding(), 0);
        assert_eq!(handlers.outstanding(), 0);
    }

    #[test]
    fn test_cache_leg_collision_end_to_end() {
        let (format, handlers) = mock_format("mock", true);
        let (examiner, _) = examiner(
            format,
            vec![
                MockDisk::new(uuid(7)).device("/dev/md/fast"),
                MockDisk::new(uuid(9))
                    .container_only()
                    .with_legs(vec![uuid(7), uuid(8)])
                    .device("/dev/sdb"),
                MockDisk::new(uuid(9))
                    .container_only()
                    .with_legs(vec![uuid(7), uuid(8)])
                    .device("/dev/sdc"),
            ],
        );

        let (report, out, _) = run(&examiner, &["/dev/md/fast", "/dev/sdb", "/dev/sdc"], &brief());
        assert_eq!(report.arrays, 2);
        assert_eq!(report.cache_legs, 1);
        assert_eq!(
            out,
            format!(
                "ARRAY metadata=mock UUID={}\nARRAY metadata=mock UUID={}\nCACHE leg=2 UUID={}\n",
                uuid(9).to_md_string(false),
                uuid(7).to_md_string(false),
                uuid(8).to_md_string(false)
            )
        );
        assert_eq!(handlers.outstanding(), 0);
    }

    #[test]
    fn test_export_mode_and_missing_capability() {
        let caps = FormatCapabilities {
            name: "plain",
            verbose: true,
            brief: true,
            ..FormatCapabilities::default()
        };
        let (plain, _) = mock_format_with("plain", caps, false);
        let (examiner, _) = examiner(plain, vec![MockDisk::new(uuid(5)).device("/dev/sda")]);
        let ctx = ExamineContext {
            export: true,
            ..ExamineContext::default()
        };

        let (report, out, diag) = run(&examiner, &["/dev/sda"], &ctx);
        assert_eq!(report.status(), 1);
        assert!(out.is_empty());
        assert_eq!(diag, "raidscan: plain metadata does not support export listing\n");

        let (format, _) = mock_format("mock", false);
        let (examiner, _) = examiner_with(format, uuid(6));
        let (report, out, _) = run(&examiner, &["/dev/sda"], &ctx);
        assert_eq!(report.status(), 0);
        assert_eq!(out, format!("MD_UUID={}\n", uuid(6).to_md_string(false)));
    }

    fn examiner_with(
        format: &'static dyn raidscan_metadata::MetadataFormat,
        id: ArrayUuid,
    ) -> (Examiner, OpenCounters) {
        examiner(format, vec![MockDisk::new(id).device("/dev/sda")])
    }

    #[test]
    fn test_brief_without_capability() {
        let caps = FormatCapabilities {
            name: "terse",
            verbose: true,
            ..FormatCapabilities::default()
        };
        let (format, handlers) = mock_format_with("terse", caps, false);
        let (examiner, _) = examiner_with(format, uuid(1));

        let (report, out, diag) = run(&examiner, &["/dev/sda"], &brief());
        assert_eq!(report.status(), 1);
        assert!(out.is_empty());
        assert_eq!(diag, "raidscan: terse metadata does not support brief listing\n");
        assert_eq!(handlers.outstanding(), 0);

        let ctx = ExamineContext {
            scan: true,
            ..brief()
        };
        let (report, _, diag) = run(&examiner, &["/dev/sda"], &ctx);
        assert_eq!(report.status(), 0);
        assert!(diag.is_empty());
    }

    #[test]
    fn test_verbose_listing_per_device() {
        let (format, _) = mock_format("mock", false);
        let (examiner, _) = examiner(
            format,
            vec![
                MockDisk::new(uuid(1)).device("/dev/sda"),
                MockDisk::new(uuid(1)).device("/dev/sdb"),
            ],
        );
        let ctx = ExamineContext {
            homehost: Some("node1".into()),
            ..ExamineContext::default()
        };

        let (_, out, _) = run(&examiner, &["/dev/sda", "/dev/sdb"], &ctx);
        let id = uuid(1).to_md_string(false);
        assert_eq!(
            out,
            format!(
                "/dev/sda:\n           UUID : {id}\n       Homehost : node1\n/dev/sdb:\n           UUID : {id}\n       Homehost : node1\n"
            )
        );
    }

    #[test]
    fn test_rerun_is_identical() {
        let (format, _) = mock_format("mock", true);
        let (examiner, _) = examiner(
            format,
            vec![
                MockDisk::new(uuid(1)).device("/dev/sda"),
                MockDisk::new(uuid(2))
                    .container_only()
                    .with_legs(vec![uuid(3)])
                    .device("/dev/sdb"),
            ],
        );
        let ctx = ExamineContext {
            verbose: 1,
            ..brief()
        };

        let (_, first, _) = run(&examiner, &["/dev/sda", "/dev/sdb"], &ctx);
        let (_, second, _) = run(&examiner, &["/dev/sda", "/dev/sdb"], &ctx);
        assert_eq!(first, second);
    }

    #[test]
    fn test_empty_device_list() {
        let (format, _) = mock_format("mock", false);
        let (examiner, _) = examiner(format, vec![]);
        let (report, out, _) = run(&examiner, &[], &brief());
        assert!(report.is_success());
        assert!(out.is_empty());
    }
}

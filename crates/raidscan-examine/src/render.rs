//! Report rendering
//!
//! Verbose and export listings are written per device as soon as the
//! device is loaded. Brief listings are written once, from the grouped
//! state, after the whole device list has been read.

use crate::group::GroupSet;
use raidscan_common::{Capability, Error, ExamineContext, Result, SuperError};
use raidscan_metadata::MetadataHandler;
use std::io::Write;
use tracing::warn;

/// Map a driver render failure onto the engine taxonomy
pub(crate) fn render_error(handler: &dyn MetadataHandler, device: &str, err: SuperError) -> Error {
    match err {
        SuperError::Unsupported(capability) => Error::unsupported(handler.format().name(), capability),
        other => Error::load_failed(device, other),
    }
}

fn write_out(out: &mut dyn Write, text: &str) -> Result<()> {
    out.write_all(text.as_bytes()).map_err(Error::Output)
}

/// Full listing for one device, headed by its path
pub fn render_verbose(
    handler: &dyn MetadataHandler,
    device: &str,
    homehost: Option<&str>,
    out: &mut dyn Write,
) -> Result<()> {
    if !handler.capabilities().verbose {
        return Err(Error::unsupported(handler.format().name(), Capability::Verbose));
    }
    let text = handler
        .render_verbose(homehost)
        .map_err(|e| render_error(handler, device, e))?;
    write_out(out, &format!("{device}:\n"))?;
    write_out(out, &text)
}

/// KEY=value listing for one device
pub fn render_export(handler: &dyn MetadataHandler, device: &str, out: &mut dyn Write) -> Result<()> {
    if !handler.capabilities().export {
        return Err(Error::unsupported(handler.format().name(), Capability::Export));
    }
    let text = handler
        .render_export()
        .map_err(|e| render_error(handler, device, e))?;
    write_out(out, &text)
}

/// Brief listing of every group: arrays first, then cache legs
///
/// Only output failures are returned. A driver that fails to render a
/// group is logged and the group is left out.
pub fn render_groups(groups: &GroupSet, ctx: &ExamineContext, out: &mut dyn Write) -> Result<()> {
    let verbose = ctx.is_verbose();

    for group in groups.arrays() {
        let handler = group.handler();
        let caps = handler.capabilities();

        let brief = match handler.render_brief(verbose) {
            Ok(text) => text,
            Err(e) => {
                warn!("cannot list array {}: {}", group.info().uuid, e);
                continue;
            }
        };
        let mut text = brief;
        let mut fields = false;

        if group.spares() > 0 {
            text.push_str(&format!("   spares={}", group.spares()));
            fields = true;
        }
        if verbose {
            text.push_str("   devices");
            let mut sep = '=';
            for device in group.devices() {
                text.push(sep);
                text.push_str(device);
                sep = ',';
            }
            fields = true;
        }
        if caps.brief_subarrays {
            match handler.render_brief_subarrays(ctx.verbose) {
                Ok(subarrays) => {
                    if fields {
                        text.push('\n');
                    }
                    text.push_str(&subarrays);
                }
                Err(e) => warn!("cannot list subarrays of {}: {}", group.info().uuid, e),
            }
        }
        if fields {
            text.push('\n');
        }
        write_out(out, &text)?;
    }

    for cache in groups.caches() {
        let handler = cache.handler();
        if !handler.capabilities().brief_cache {
            continue;
        }
        match handler.render_brief_cache(cache.leg()) {
            Ok(text) => write_out(out, &text)?,
            Err(e) => warn!("cannot list cache leg {}: {}", cache.info().uuid, e),
        }
    }

    out.flush().map_err(Error::Output)
}

//! Format dispatch
//!
//! Picks the driver for an opened device and loads its metadata. The
//! driver is the forced one when `--metadata` was given, the container
//! format when the kernel already reports the device as an md container,
//! and otherwise whatever the registry detects on the device.

use raidscan_common::{Error, Result, SuperError};
use raidscan_metadata::{BlockDevice, FormatRegistry, FormatSelector, MetadataHandler};
use tracing::debug;

/// A loaded driver instance
#[derive(Debug)]
pub struct Dispatched {
    pub handler: Box<dyn MetadataHandler>,
    /// Loaded through `load_container` rather than `load_super`
    pub container: bool,
}

/// Select a driver for `device` and load it
///
/// `devname` is handed to the driver for its own diagnostics and may be
/// `None` to keep drivers quiet. Errors name the device by its path.
pub fn dispatch(
    registry: &FormatRegistry,
    device: &dyn BlockDevice,
    forced: Option<&FormatSelector>,
    devname: Option<&str>,
) -> Result<Dispatched> {
    let mut must_be_container = false;
    let handler = if let Some(selector) = forced {
        Some(selector.instantiate())
    } else if let Some(metadata) = device.container_metadata() {
        debug!("{} is a {} container", device.path(), metadata);
        must_be_container = true;
        registry.for_container(&metadata)
    } else {
        registry.guess(device)
    };

    let Some(mut handler) = handler else {
        return Err(Error::NoSuperblock {
            device: device.path().to_string(),
        });
    };

    let mut failure = None;
    if !must_be_container {
        match handler.load_super(device, devname) {
            Ok(()) => {
                return Ok(Dispatched {
                    handler,
                    container: false,
                });
            }
            Err(e) => failure = Some(e),
        }
    }

    if handler.capabilities().container {
        match handler.load_container(device, devname) {
            Ok(()) => {
                debug!("{} loaded as {} container", device.path(), handler.format().name());
                return Ok(Dispatched {
                    handler,
                    container: true,
                });
            }
            Err(e) => failure = Some(e),
        }
    }

    let reason = failure.unwrap_or(SuperError::NoSuperblock);
    debug!("cannot load {} on {}: {}", handler.format().name(), device.path(), reason);
    Err(Error::load_failed(device.path(), reason))
}

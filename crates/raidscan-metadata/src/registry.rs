//! Format registry
//!
//! Holds the metadata formats known to the tool in detection order and
//! resolves `--metadata` names to a format selection.

use crate::device::BlockDevice;
use crate::format::{MetadataFormat, MetadataHandler};
use crate::imsm::IMSM;
use crate::super0::SUPER0;
use crate::super1::SUPER1;
use raidscan_common::{Capability, Error};
use std::fmt;
use tracing::debug;

/// A format forced by name, together with the variant that was asked for
#[derive(Clone, Debug)]
pub struct FormatSelector {
    format: &'static dyn MetadataFormat,
    variant: String,
}

impl FormatSelector {
    #[must_use]
    pub fn new(format: &'static dyn MetadataFormat, variant: impl Into<String>) -> Self {
        Self {
            format,
            variant: variant.into(),
        }
    }

    #[must_use]
    pub fn format(&self) -> &'static dyn MetadataFormat {
        self.format
    }

    /// Name as given on the command line
    #[must_use]
    pub fn variant(&self) -> &str {
        &self.variant
    }

    /// Fresh, unloaded handler for this selection
    #[must_use]
    pub fn instantiate(&self) -> Box<dyn MetadataHandler> {
        self.format.instantiate(&self.variant)
    }
}

impl fmt::Display for FormatSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.variant)
    }
}

impl std::str::FromStr for FormatSelector {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        FormatRegistry::builtin()
            .select(s)
            .ok_or_else(|| Error::UnknownFormat(s.to_string()))
    }
}

/// Ordered set of metadata formats
#[derive(Clone, Debug)]
pub struct FormatRegistry {
    formats: Vec<&'static dyn MetadataFormat>,
}

impl Default for FormatRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

impl FormatRegistry {
    /// Registry with the given formats, probed in order
    #[must_use]
    pub fn new(formats: Vec<&'static dyn MetadataFormat>) -> Self {
        Self { formats }
    }

    /// The built-in formats
    ///
    /// Containers are probed first: an IMSM member can also carry md
    /// signatures in its volume data.
    #[must_use]
    pub fn builtin() -> Self {
        Self::new(vec![&IMSM, &SUPER1, &SUPER0])
    }

    /// Append a format to the probe order
    pub fn register(&mut self, format: &'static dyn MetadataFormat) {
        self.formats.push(format);
    }

    #[must_use]
    pub fn formats(&self) -> &[&'static dyn MetadataFormat] {
        &self.formats
    }

    /// Format accepting `name`
    #[must_use]
    pub fn lookup(&self, name: &str) -> Option<&'static dyn MetadataFormat> {
        self.formats.iter().copied().find(|f| f.accepts(name))
    }

    /// Resolve a `--metadata` value
    #[must_use]
    pub fn select(&self, name: &str) -> Option<FormatSelector> {
        self.lookup(name).map(|format| FormatSelector::new(format, name))
    }

    /// Handler for a device the kernel already reports as a container
    ///
    /// Only formats that can load containers qualify.
    #[must_use]
    pub fn for_container(&self, metadata: &str) -> Option<Box<dyn MetadataHandler>> {
        self.lookup(metadata)
            .filter(|f| f.capabilities().supports(Capability::LoadContainer))
            .map(|f| f.instantiate(metadata))
    }

    /// Sniff a device, returning an unloaded handler of the first match
    #[must_use]
    pub fn guess(&self, device: &dyn BlockDevice) -> Option<Box<dyn MetadataHandler>> {
        let found = self.formats.iter().find_map(|f| f.detect(device));
        match &found {
            Some(handler) => debug!("{} looks like {}", device.path(), handler.format().name()),
            None => debug!("no known metadata on {}", device.path()),
        }
        found
    }
}

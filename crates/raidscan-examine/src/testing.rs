//! Scripted metadata format for engine tests
//!
//! Device images carry a tiny header the mock driver understands:
//!
//! ```text
//! 0   "MOCKMETA"
//! 8   uuid[16]
//! 24  flags (bit 0 in sync, bit 1 container only)
//! 25  number of cache legs
//! 26  leg uuid[16] per leg
//! ```
//!
//! Every handler the format hands out is counted on creation and on drop.

use raidscan_common::{ArrayInfo, ArrayUuid, Capability, DiskInfo, DiskState, SuperError};
use raidscan_metadata::{
    BlockDevice, FormatCapabilities, MemoryDevice, MetadataFormat, MetadataHandler, SuperResult,
};
use std::any::Any;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

const MAGIC: &[u8; 8] = b"MOCKMETA";
const IMAGE_SIZE: usize = 4096;
const FLAG_IN_SYNC: u8 = 1;
const FLAG_CONTAINER_ONLY: u8 = 2;

/// Handler acquisition counters
#[derive(Clone, Debug, Default)]
pub struct MockCounters {
    acquired: Arc<AtomicUsize>,
    released: Arc<AtomicUsize>,
}

impl MockCounters {
    pub fn acquired(&self) -> usize {
        self.acquired.load(Ordering::SeqCst)
    }

    pub fn released(&self) -> usize {
        self.released.load(Ordering::SeqCst)
    }

    pub fn outstanding(&self) -> usize {
        self.acquired() - self.released()
    }
}

#[derive(Debug)]
pub struct MockFormat {
    name: &'static str,
    caps: FormatCapabilities,
    swap: bool,
    counters: MockCounters,
}

/// Leak a mock format with the usual capability set
pub fn mock_format(
    name: &'static str,
    container: bool,
) -> (&'static dyn MetadataFormat, MockCounters) {
    mock_format_with(
        name,
        FormatCapabilities {
            name,
            container,
            verbose: true,
            export: true,
            brief: true,
            brief_subarrays: false,
            brief_cache: container,
            badblocks: false,
        },
        false,
    )
}

/// Leak a mock format with explicit capabilities
pub fn mock_format_with(
    name: &'static str,
    caps: FormatCapabilities,
    swap: bool,
) -> (&'static dyn MetadataFormat, MockCounters) {
    let counters = MockCounters::default();
    let format: &'static MockFormat = Box::leak(Box::new(MockFormat {
        name,
        caps,
        swap,
        counters: counters.clone(),
    }));
    (format, counters)
}

impl MockFormat {
    fn handler(&'static self) -> MockHandler {
        self.counters.acquired.fetch_add(1, Ordering::SeqCst);
        MockHandler {
            format: self,
            disk: None,
        }
    }
}

impl MetadataFormat for MockFormat {
    fn name(&self) -> &'static str {
        self.name
    }

    fn capabilities(&self) -> FormatCapabilities {
        self.caps.clone()
    }

    fn swap_uuid(&self) -> bool {
        self.swap
    }

    fn accepts(&self, name: &str) -> bool {
        name == self.name
    }

    fn instantiate(&'static self, _name: &str) -> Box<dyn MetadataHandler> {
        Box::new(self.handler())
    }

    fn detect(&'static self, device: &dyn BlockDevice) -> Option<Box<dyn MetadataHandler>> {
        let mut magic = [0u8; 8];
        device.read_at(0, &mut magic).ok()?;
        (&magic == MAGIC).then(|| Box::new(self.handler()) as Box<dyn MetadataHandler>)
    }
}

/// Contents of one mock device
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MockDisk {
    pub uuid: ArrayUuid,
    pub in_sync: bool,
    pub container_only: bool,
    pub legs: Vec<ArrayUuid>,
}

impl MockDisk {
    pub fn new(uuid: ArrayUuid) -> Self {
        Self {
            uuid,
            in_sync: true,
            container_only: false,
            legs: Vec::new(),
        }
    }

    #[must_use]
    pub const fn spare(mut self) -> Self {
        self.in_sync = false;
        self
    }

    #[must_use]
    pub const fn container_only(mut self) -> Self {
        self.container_only = true;
        self
    }

    #[must_use]
    pub fn with_legs(mut self, legs: Vec<ArrayUuid>) -> Self {
        self.legs = legs;
        self
    }

    pub fn device(&self, path: &str) -> MemoryDevice {
        let mut image = Vec::with_capacity(IMAGE_SIZE);
        image.extend_from_slice(MAGIC);
        image.extend_from_slice(self.uuid.as_bytes());
        let mut flags = 0;
        if self.in_sync {
            flags |= FLAG_IN_SYNC;
        }
        if self.container_only {
            flags |= FLAG_CONTAINER_ONLY;
        }
        image.push(flags);
        image.push(u8::try_from(self.legs.len()).unwrap());
        for leg in &self.legs {
            image.extend_from_slice(leg.as_bytes());
        }
        image.resize(IMAGE_SIZE, 0);
        MemoryDevice::from_bytes(path, image)
    }

    fn read(device: &dyn BlockDevice) -> SuperResult<Self> {
        let image = device.read_vec(0, IMAGE_SIZE)?;
        if &image[..8] != MAGIC {
            return Err(SuperError::NoSuperblock);
        }
        let uuid = ArrayUuid::from_bytes(image[8..24].try_into().unwrap());
        let flags = image[24];
        let legs = (0..usize::from(image[25]))
            .map(|i| {
                let start = 26 + 16 * i;
                ArrayUuid::from_bytes(image[start..start + 16].try_into().unwrap())
            })
            .collect();
        Ok(Self {
            uuid,
            in_sync: flags & FLAG_IN_SYNC != 0,
            container_only: flags & FLAG_CONTAINER_ONLY != 0,
            legs,
        })
    }
}

#[derive(Debug)]
pub struct MockHandler {
    format: &'static MockFormat,
    disk: Option<MockDisk>,
}

impl Drop for MockHandler {
    fn drop(&mut self) {
        self.format.counters.released.fetch_add(1, Ordering::SeqCst);
    }
}

impl MockHandler {
    fn disk(&self) -> SuperResult<&MockDisk> {
        self.disk.as_ref().ok_or(SuperError::NoSuperblock)
    }
}

impl MetadataHandler for MockHandler {
    fn format(&self) -> &'static dyn MetadataFormat {
        self.format
    }

    fn load_super(&mut self, device: &dyn BlockDevice, _devname: Option<&str>) -> SuperResult<()> {
        let disk = MockDisk::read(device)?;
        if disk.container_only {
            return Err(SuperError::UnsupportedVersion("container member".into()));
        }
        self.disk = Some(disk);
        Ok(())
    }

    fn load_container(&mut self, device: &dyn BlockDevice, _devname: Option<&str>) -> SuperResult<()> {
        if !self.format.caps.container {
            return Err(SuperError::Unsupported(Capability::LoadContainer));
        }
        self.disk = Some(MockDisk::read(device)?);
        Ok(())
    }

    fn info(&self, leg: usize) -> ArrayInfo {
        let Some(disk) = &self.disk else {
            return ArrayInfo::default();
        };
        let uuid = match leg {
            0 => disk.uuid,
            n => disk.legs.get(n - 1).copied().unwrap_or(disk.uuid),
        };
        ArrayInfo {
            uuid,
            name: String::new(),
            level: 1,
            raid_disks: 2,
            disk: DiskInfo {
                number: 0,
                raid_disk: 0,
                state: if disk.in_sync {
                    DiskState::active_sync()
                } else {
                    DiskState::default()
                },
            },
            events: 1,
            cache_legs: if leg == 0 { disk.legs.len() } else { 0 },
        }
    }

    fn compare(&self, other: &dyn MetadataHandler) -> bool {
        let Some(other) = other.downcast_ref::<Self>() else {
            return false;
        };
        match (&self.disk, &other.disk) {
            (Some(a), Some(b)) => {
                self.format.name == other.format.name && a.uuid == b.uuid
            }
            _ => false,
        }
    }

    fn render_verbose(&self, homehost: Option<&str>) -> SuperResult<String> {
        Ok(format!(
            "           UUID : {}\n       Homehost : {}\n",
            self.disk()?.uuid.to_md_string(false),
            homehost.unwrap_or("<none>")
        ))
    }

    fn render_export(&self) -> SuperResult<String> {
        Ok(format!("MD_UUID={}\n", self.disk()?.uuid.to_md_string(false)))
    }

    fn render_brief(&self, verbose: bool) -> SuperResult<String> {
        let level = if verbose { " level=raid1" } else { "" };
        Ok(format!(
            "ARRAY metadata={}{level} UUID={}\n",
            self.format.name,
            self.disk()?.uuid.to_md_string(false)
        ))
    }

    fn render_brief_subarrays(&self, _verbose: i32) -> SuperResult<String> {
        Ok(format!(
            "ARRAY container={} member=0\n",
            self.disk()?.uuid.to_md_string(false)
        ))
    }

    fn render_brief_cache(&self, leg: usize) -> SuperResult<String> {
        Ok(format!(
            "CACHE leg={leg} UUID={}\n",
            self.info(leg).uuid.to_md_string(false)
        ))
    }

    fn clone_handler(&self) -> Box<dyn MetadataHandler> {
        let mut copy = self.format.handler();
        copy.disk.clone_from(&self.disk);
        Box::new(copy)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

//! Array grouping for brief listings
//!
//! `GroupSet` owns every driver instance that survives the device loop.
//! Devices describing the same array fold into one `ArrayGroup`; cache
//! legs reachable from a newly seen array become `CacheGroup`s unless an
//! array or leg of the same format already carries their identifier.
//!
//! Groups are kept in discovery order and listed newest first.

use raidscan_common::{ArrayInfo, ArrayUuid};
use raidscan_metadata::{MetadataFormat, MetadataHandler, same_format};
use tracing::debug;

/// One distinct array and the devices that belong to it
#[derive(Debug)]
pub struct ArrayGroup {
    handler: Box<dyn MetadataHandler>,
    info: ArrayInfo,
    spares: usize,
    devices: Vec<String>,
}

impl ArrayGroup {
    #[must_use]
    pub fn handler(&self) -> &dyn MetadataHandler {
        self.handler.as_ref()
    }

    /// Snapshot from the most recently added device
    #[must_use]
    pub const fn info(&self) -> &ArrayInfo {
        &self.info
    }

    #[must_use]
    pub const fn spares(&self) -> usize {
        self.spares
    }

    /// Member device paths in scan order
    #[must_use]
    pub fn devices(&self) -> &[String] {
        &self.devices
    }
}

/// A cache leg of a container, listed after all arrays
#[derive(Debug)]
pub struct CacheGroup {
    handler: Box<dyn MetadataHandler>,
    info: ArrayInfo,
    leg: usize,
}

impl CacheGroup {
    #[must_use]
    pub fn handler(&self) -> &dyn MetadataHandler {
        self.handler.as_ref()
    }

    #[must_use]
    pub const fn info(&self) -> &ArrayInfo {
        &self.info
    }

    /// Leg index within the owning container
    #[must_use]
    pub const fn leg(&self) -> usize {
        self.leg
    }
}

/// Accumulated arrays and cache legs of one run
#[derive(Debug, Default)]
pub struct GroupSet {
    arrays: Vec<ArrayGroup>,
    caches: Vec<CacheGroup>,
}

impl GroupSet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one loaded device into the set
    ///
    /// A matching group keeps its own handler and takes the new device's
    /// snapshot; the new handler is dropped. Otherwise the handler starts a
    /// new group and its cache legs are resolved.
    pub fn add(&mut self, handler: Box<dyn MetadataHandler>, container: bool, device: &str) {
        let index = if let Some(index) = self.find_array(handler.as_ref()) {
            let group = &mut self.arrays[index];
            group.info = handler.info(0);
            debug!("{} joins array {}", device, group.info.uuid);
            index
        } else {
            let info = handler.info(0);
            debug!("{} starts array {}", device, info.uuid);
            self.arrays.push(ArrayGroup {
                handler,
                info,
                spares: 0,
                devices: Vec::new(),
            });
            let index = self.arrays.len() - 1;
            self.resolve_cache_legs(index);
            index
        };

        let group = &mut self.arrays[index];
        if !container && !group.info.disk.state.is_in_sync() {
            group.spares += 1;
        }
        group.devices.push(device.to_string());
    }

    /// Arrays, newest first
    pub fn arrays(&self) -> impl Iterator<Item = &ArrayGroup> {
        self.arrays.iter().rev()
    }

    /// Cache legs, newest first
    pub fn caches(&self) -> impl Iterator<Item = &CacheGroup> {
        self.caches.iter().rev()
    }

    #[must_use]
    pub fn array_count(&self) -> usize {
        self.arrays.len()
    }

    #[must_use]
    pub fn cache_count(&self) -> usize {
        self.caches.len()
    }

    fn find_array(&self, handler: &dyn MetadataHandler) -> Option<usize> {
        self.arrays.iter().rposition(|group| {
            group.handler.same_format_as(handler) && group.handler.compare(handler)
        })
    }

    /// Whether an array or cache leg of `format` already carries `uuid`
    fn is_known(&self, format: &dyn MetadataFormat, uuid: &ArrayUuid) -> bool {
        let owned = |handler: &dyn MetadataHandler| same_format(handler.format(), format);
        self.arrays
            .iter()
            .any(|g| owned(g.handler()) && g.info.uuid == *uuid)
            || self
                .caches
                .iter()
                .any(|c| owned(c.handler()) && c.info.uuid == *uuid)
    }

    fn resolve_cache_legs(&mut self, index: usize) {
        let group = &self.arrays[index];
        let format = group.handler.format();
        let legs: Vec<(usize, ArrayInfo)> = (1..=group.info.cache_legs)
            .map(|leg| (leg, group.handler.info(leg)))
            .collect();

        for (leg, info) in legs {
            if self.is_known(format, &info.uuid) {
                debug!("cache leg {} ({}) is already listed", leg, info.uuid);
                continue;
            }
            debug!("cache leg {} ({}) added", leg, info.uuid);
            let handler = self.arrays[index].handler.clone_handler();
            self.caches.push(CacheGroup { handler, info, leg });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MockDisk, mock_format};
    use raidscan_metadata::{BlockDevice, MetadataFormat};
    use rand::seq::SliceRandom;

    fn uuid(byte: u8) -> ArrayUuid {
        ArrayUuid::from_bytes([byte; 16])
    }

    fn load(format: &'static dyn MetadataFormat, disk: &MockDisk) -> Box<dyn MetadataHandler> {
        let dev = disk.device("/dev/mock");
        let mut handler = format.detect(&dev).unwrap();
        if disk.container_only {
            handler.load_container(&dev as &dyn BlockDevice, None).unwrap();
        } else {
            handler.load_super(&dev, None).unwrap();
        }
        handler
    }

    #[test]
    fn test_three_devices_one_spare() {
        let (format, _) = mock_format("mock", false);
        let mut groups = GroupSet::new();
        groups.add(load(format, &MockDisk::new(uuid(1))), false, "/dev/sda");
        groups.add(load(format, &MockDisk::new(uuid(1)).spare()), false, "/dev/sdb");
        groups.add(load(format, &MockDisk::new(uuid(1))), false, "/dev/sdc");

        assert_eq!(groups.array_count(), 1);
        let group = groups.arrays().next().unwrap();
        assert_eq!(group.spares(), 1);
        assert_eq!(group.devices(), ["/dev/sda", "/dev/sdb", "/dev/sdc"]);
        assert!(group.info().disk.state.is_in_sync());
    }

    #[test]
    fn test_container_members_never_count_as_spares() {
        let (format, _) = mock_format("mock", true);
        let mut groups = GroupSet::new();
        let disk = MockDisk::new(uuid(2)).spare().container_only();
        groups.add(load(format, &disk), true, "/dev/sda");
        groups.add(load(format, &disk), true, "/dev/sdb");

        assert_eq!(groups.arrays().next().unwrap().spares(), 0);
    }

    #[test]
    fn test_grouping_is_order_independent() {
        let (format, _) = mock_format("mock", false);
        let mut disks = vec![
            ("/dev/sda", MockDisk::new(uuid(1))),
            ("/dev/sdb", MockDisk::new(uuid(2))),
            ("/dev/sdc", MockDisk::new(uuid(1)).spare()),
            ("/dev/sdd", MockDisk::new(uuid(3))),
            ("/dev/sde", MockDisk::new(uuid(2))),
        ];
        let mut rng = rand::thread_rng();

        for _ in 0..8 {
            disks.shuffle(&mut rng);
            let mut groups = GroupSet::new();
            for (path, disk) in &disks {
                groups.add(load(format, disk), false, path);
            }

            assert_eq!(groups.array_count(), 3);
            for group in groups.arrays() {
                let expected: Vec<&str> = disks
                    .iter()
                    .filter(|(_, d)| d.uuid == group.info().uuid)
                    .map(|(p, _)| *p)
                    .collect();
                assert_eq!(group.devices(), expected.as_slice());
            }
        }
    }

    #[test]
    fn test_same_uuid_different_format_stays_apart() {
        let (first, _) = mock_format("mock-a", false);
        let (second, _) = mock_format("mock-b", false);
        let mut groups = GroupSet::new();
        groups.add(load(first, &MockDisk::new(uuid(5))), false, "/dev/sda");
        groups.add(load(second, &MockDisk::new(uuid(5))), false, "/dev/sdb");
        assert_eq!(groups.array_count(), 2);
    }

    #[test]
    fn test_cache_leg_matching_known_array_is_skipped() {
        let (format, _) = mock_format("mock", true);
        let mut groups = GroupSet::new();
        groups.add(load(format, &MockDisk::new(uuid(7))), false, "/dev/md/cache");

        let container = MockDisk::new(uuid(9))
            .container_only()
            .with_legs(vec![uuid(7), uuid(8)]);
        groups.add(load(format, &container), true, "/dev/sdb");

        assert_eq!(groups.array_count(), 2);
        assert_eq!(groups.cache_count(), 1);
        let cache = groups.caches().next().unwrap();
        assert_eq!(cache.leg(), 2);
        assert_eq!(cache.info().uuid, uuid(8));

        // a second member of the same container does not resolve legs again
        groups.add(load(format, &container), true, "/dev/sdc");
        assert_eq!(groups.cache_count(), 1);
    }

    #[test]
    fn test_cache_leg_matching_other_format_array_is_kept() {
        let (plain, _) = mock_format("plain", false);
        let (format, _) = mock_format("mock", true);
        let mut groups = GroupSet::new();
        groups.add(load(plain, &MockDisk::new(uuid(7))), false, "/dev/md0");

        let container = MockDisk::new(uuid(9)).container_only().with_legs(vec![uuid(7)]);
        groups.add(load(format, &container), true, "/dev/sdb");
        assert_eq!(groups.cache_count(), 1);
        let cache = groups.caches().next().unwrap();
        assert_eq!(cache.handler().format().name(), "mock");
        assert_eq!(cache.info().uuid, uuid(7));
    }

    #[test]
    fn test_cache_leg_matching_other_format_leg_is_kept() {
        let (first, _) = mock_format("mock-a", true);
        let (second, _) = mock_format("mock-b", true);
        let mut groups = GroupSet::new();
        let a = MockDisk::new(uuid(1)).container_only().with_legs(vec![uuid(4)]);
        let b = MockDisk::new(uuid(2)).container_only().with_legs(vec![uuid(4)]);
        groups.add(load(first, &a), true, "/dev/sda");
        groups.add(load(second, &b), true, "/dev/sdb");
        assert_eq!(groups.cache_count(), 2);
    }

    #[test]
    fn test_duplicate_legs_across_containers() {
        let (format, _) = mock_format("mock", true);
        let mut groups = GroupSet::new();
        let a = MockDisk::new(uuid(1)).container_only().with_legs(vec![uuid(4)]);
        let b = MockDisk::new(uuid(2)).container_only().with_legs(vec![uuid(4)]);
        groups.add(load(format, &a), true, "/dev/sda");
        groups.add(load(format, &b), true, "/dev/sdb");
        assert_eq!(groups.cache_count(), 1);
    }

    #[test]
    fn test_latest_snapshot_wins() {
        let (format, _) = mock_format("mock", false);
        let mut groups = GroupSet::new();
        groups.add(load(format, &MockDisk::new(uuid(3))), false, "/dev/sda");
        assert!(groups.arrays().next().unwrap().info().disk.state.is_in_sync());

        groups.add(load(format, &MockDisk::new(uuid(3)).spare()), false, "/dev/sdb");
        let group = groups.arrays().next().unwrap();
        assert!(!group.info().disk.state.is_in_sync());
        assert_eq!(group.spares(), 1);
    }

    #[test]
    fn test_handlers_released_with_the_set() {
        let (format, counters) = mock_format("mock", true);
        let mut groups = GroupSet::new();
        let container = MockDisk::new(uuid(9))
            .container_only()
            .with_legs(vec![uuid(10), uuid(11)]);
        groups.add(load(format, &container), true, "/dev/sda");
        groups.add(load(format, &container), true, "/dev/sdb");

        // one kept array handler, one dropped duplicate, two cache copies
        assert_eq!(counters.acquired(), 4);
        assert_eq!(counters.outstanding(), 3);
        drop(groups);
        assert_eq!(counters.outstanding(), 0);
    }
}

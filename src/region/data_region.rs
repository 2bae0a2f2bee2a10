// src/region/data_region.rs

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::debug;

use crate::engine::{ErrorInfo, RtResult};
use crate::region::rect::{element_count, Range3, Rect};
use crate::region::tracker::RegionTracker;
use crate::types::{DeviceId, DevicePtr};

static NEXT_REGION_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RegionId(pub u64);

impl fmt::Display for RegionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "region#{}", self.0)
    }
}

/// One device replica of a data region.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Allocation {
    pub ptr: DevicePtr,
    pub bytes: usize,
}

#[derive(Debug, Default)]
struct RegionState {
    allocations: HashMap<DeviceId, Allocation>,
    tracker: RegionTracker,
}

pub type DataRegionPtr = Arc<DataRegion>;

/// A logical buffer with lazily created per-device replicas.
///
/// The region never allocates memory itself: the scheduler asks the
/// backend allocator on first touch and registers the result with
/// [`add_empty_allocation`](Self::add_empty_allocation). Allocation map and
/// tracker share one lock, which is the unit of mutual exclusion for a
/// region.
pub struct DataRegion {
    id: RegionId,
    name: Option<String>,
    element_size: usize,
    extent: Range3,
    state: Mutex<RegionState>,
}

impl fmt::Debug for DataRegion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DataRegion")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("element_size", &self.element_size)
            .field("extent", &self.extent)
            .finish_non_exhaustive()
    }
}

impl DataRegion {
    pub fn new(extent: Range3, element_size: usize) -> Self {
        Self {
            id: RegionId(NEXT_REGION_ID.fetch_add(1, Ordering::Relaxed)),
            name: None,
            element_size,
            extent,
            state: Mutex::new(RegionState::default()),
        }
    }

    pub fn named(name: impl Into<String>, extent: Range3, element_size: usize) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::new(extent, element_size)
        }
    }

    pub fn id(&self) -> RegionId {
        self.id
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Extent of the buffer in elements.
    pub fn get_num_elements(&self) -> Range3 {
        self.extent
    }

    pub fn get_element_size(&self) -> usize {
        self.element_size
    }

    pub fn byte_size(&self) -> usize {
        element_count(&self.extent) * self.element_size
    }

    pub fn whole(&self) -> Rect {
        Rect::whole(self.extent)
    }

    pub fn has_allocation(&self, device: DeviceId) -> bool {
        self.lock().allocations.contains_key(&device)
    }

    /// Register a freshly allocated (uninitialised) replica on `device`.
    ///
    /// The replica starts with no valid data. An existing allocation on the
    /// same device is replaced.
    pub fn add_empty_allocation(&self, device: DeviceId, ptr: DevicePtr, bytes: usize) {
        let mut state = self.lock();
        debug!(region = %self.id, %device, %ptr, bytes, "adding allocation");
        state.allocations.insert(device, Allocation { ptr, bytes });
        state.tracker.register_device(device);
    }

    /// Forget the replica on `device` and return it so the caller can free it.
    pub fn remove_allocation(&self, device: DeviceId) -> Option<Allocation> {
        let mut state = self.lock();
        let removed = state.allocations.remove(&device);
        if removed.is_some() {
            state.tracker.forget_device(device);
        }
        removed
    }

    /// Device pointer of the replica on `device`.
    pub fn get_memory(&self, device: DeviceId) -> RtResult<DevicePtr> {
        self.lock()
            .allocations
            .get(&device)
            .map(|a| a.ptr)
            .ok_or_else(|| {
                ErrorInfo::internal(format!(
                    "{} has no allocation on device {}",
                    self.id, device
                ))
            })
    }

    /// All replicas, ordered by device.
    pub fn allocations(&self) -> Vec<(DeviceId, Allocation)> {
        let mut out: Vec<_> = self
            .lock()
            .allocations
            .iter()
            .map(|(d, a)| (*d, *a))
            .collect();
        out.sort_by_key(|(d, _)| *d);
        out
    }

    pub fn get_outdated_regions(&self, device: DeviceId, rect: &Rect) -> Vec<Rect> {
        self.lock().tracker.get_outdated_regions(device, rect)
    }

    pub fn get_update_source_candidates(
        &self,
        device: DeviceId,
        rect: &Rect,
    ) -> Vec<(DeviceId, Rect)> {
        self.lock().tracker.get_update_source_candidates(device, rect)
    }

    pub fn mark_range_valid(&self, device: DeviceId, rect: &Rect) {
        self.lock().tracker.mark_range_valid(device, rect);
    }

    pub fn mark_range_current(&self, device: DeviceId, rect: &Rect) {
        self.lock().tracker.mark_range_current(device, rect);
    }

    /// Valid rectangles recorded for `device`.
    pub fn valid_regions(&self, device: DeviceId) -> Vec<Rect> {
        self.lock().tracker.valid_regions(device).to_vec()
    }

    /// Devices on which all of `rect` is valid, in registration order.
    pub fn valid_devices(&self, rect: &Rect) -> Vec<DeviceId> {
        let state = self.lock();
        state
            .tracker
            .devices()
            .filter(|d| state.tracker.is_valid(*d, rect))
            .collect()
    }

    /// Snapshot of the tracker, for diagnostics and tests.
    pub fn tracker(&self) -> RegionTracker {
        self.lock().tracker.clone()
    }

    fn lock(&self) -> MutexGuard<'_, RegionState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

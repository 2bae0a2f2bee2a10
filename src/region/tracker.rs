// src/region/tracker.rs

//! Per-device validity bookkeeping for one data region.

use tracing::trace;

use crate::region::rect::{coalesce, difference, subtract_from_all, Rect};
use crate::types::DeviceId;

#[derive(Debug, Clone, PartialEq, Eq)]
struct DeviceCoverage {
    device: DeviceId,
    /// Non-overlapping, coalesced, sorted.
    valid: Vec<Rect>,
}

/// Records, per device, which rectangles of a buffer hold up-to-date data.
///
/// Devices are kept in registration order; that order is what
/// [`get_update_source_candidates`](Self::get_update_source_candidates)
/// reports, and the scheduler always takes the first candidate. No cost or
/// topology information is taken into account.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegionTracker {
    devices: Vec<DeviceCoverage>,
}

impl RegionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `device` known without marking anything valid.
    ///
    /// Returns `false` if it was already registered.
    pub fn register_device(&mut self, device: DeviceId) -> bool {
        if self.position(device).is_some() {
            return false;
        }
        self.devices.push(DeviceCoverage {
            device,
            valid: Vec::new(),
        });
        true
    }

    /// Drop all knowledge about `device` (its replica is gone).
    pub fn forget_device(&mut self, device: DeviceId) {
        self.devices.retain(|d| d.device != device);
    }

    /// Registered devices in registration order.
    pub fn devices(&self) -> impl Iterator<Item = DeviceId> + '_ {
        self.devices.iter().map(|d| d.device)
    }

    /// Valid rectangles currently recorded for `device`.
    pub fn valid_regions(&self, device: DeviceId) -> &[Rect] {
        self.position(device)
            .map(|i| self.devices[i].valid.as_slice())
            .unwrap_or(&[])
    }

    /// Parts of `rect` that are not valid on `device`.
    pub fn get_outdated_regions(&self, device: DeviceId, rect: &Rect) -> Vec<Rect> {
        difference(rect, self.valid_regions(device))
    }

    /// Other devices holding valid data overlapping `rect`, each paired with
    /// the overlapping part.
    pub fn get_update_source_candidates(
        &self,
        device: DeviceId,
        rect: &Rect,
    ) -> Vec<(DeviceId, Rect)> {
        self.devices
            .iter()
            .filter(|d| d.device != device)
            .flat_map(|d| {
                d.valid
                    .iter()
                    .filter_map(move |v| v.intersection(rect).map(|overlap| (d.device, overlap)))
            })
            .collect()
    }

    /// Add `rect` to `device`'s valid set; other devices are untouched.
    pub fn mark_range_valid(&mut self, device: DeviceId, rect: &Rect) {
        if rect.is_empty() {
            return;
        }
        let idx = self.ensure(device);
        let coverage = &mut self.devices[idx];

        let added = difference(rect, &coverage.valid);
        if added.is_empty() {
            return;
        }
        trace!(%device, %rect, pieces = added.len(), "marking range valid");

        let mut valid = std::mem::take(&mut coverage.valid);
        valid.extend(added);
        coverage.valid = coalesce(valid);
    }

    /// Make `device` the only holder of valid data in `rect`.
    pub fn mark_range_current(&mut self, device: DeviceId, rect: &Rect) {
        if rect.is_empty() {
            return;
        }
        for coverage in self.devices.iter_mut().filter(|d| d.device != device) {
            if coverage.valid.iter().any(|v| v.intersects(rect)) {
                trace!(device = %coverage.device, %rect, "invalidating range");
                coverage.valid = coalesce(subtract_from_all(&coverage.valid, rect));
            }
        }
        self.mark_range_valid(device, rect);
    }

    /// Whether `rect` is entirely valid on `device`.
    pub fn is_valid(&self, device: DeviceId, rect: &Rect) -> bool {
        self.get_outdated_regions(device, rect).is_empty()
    }

    fn position(&self, device: DeviceId) -> Option<usize> {
        self.devices.iter().position(|d| d.device == device)
    }

    fn ensure(&mut self, device: DeviceId) -> usize {
        match self.position(device) {
            Some(idx) => idx,
            None => {
                self.register_device(device);
                self.devices.len() - 1
            }
        }
    }
}

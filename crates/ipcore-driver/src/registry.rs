//! Device registry
//!
//! Fixed-capacity table of attached devices, shared across all variants.
//! Attach reserves a slot before acquiring hardware resources and publishes
//! the device only once it is fully attached; a dropped [`Reservation`]
//! frees its slot, so every failed attach path leaves the table unchanged.
//!
//! Indices are reused: a reservation takes the lowest free slot.

use crate::device::Device;
use crate::error::{IpcoreError, Result};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

#[derive(Debug)]
enum Slot {
    Free,
    Reserved,
    Occupied(Arc<Device>),
}

/// Table of attached devices
#[derive(Debug)]
pub struct Registry {
    slots: Mutex<Vec<Slot>>,
}

impl Registry {
    /// Registry with room for `capacity` devices
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: Mutex::new((0..capacity).map(|_| Slot::Free).collect()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Slot>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Maximum number of devices
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.lock().len()
    }

    /// Reserve the lowest free index
    ///
    /// # Errors
    ///
    /// Returns `ResourceUnavailable` if every slot is taken.
    pub fn reserve(&self) -> Result<Reservation<'_>> {
        let mut slots = self.lock();
        let index = slots
            .iter()
            .position(|slot| matches!(slot, Slot::Free))
            .ok_or_else(|| {
                IpcoreError::resource_unavailable(format!(
                    "Device registry full ({} devices)",
                    slots.len()
                ))
            })?;
        slots[index] = Slot::Reserved;
        Ok(Reservation {
            registry: self,
            index,
            published: false,
        })
    }

    /// Device attached at `index`
    ///
    /// # Errors
    ///
    /// Returns `NoSuchDevice` if no device is published there.
    pub fn get(&self, index: usize) -> Result<Arc<Device>> {
        match self.lock().get(index) {
            Some(Slot::Occupied(device)) => Ok(Arc::clone(device)),
            _ => Err(IpcoreError::NoSuchDevice { index }),
        }
    }

    /// Every published device, in index order
    #[must_use]
    pub fn devices(&self) -> Vec<Arc<Device>> {
        self.lock()
            .iter()
            .filter_map(|slot| match slot {
                Slot::Occupied(device) => Some(Arc::clone(device)),
                _ => None,
            })
            .collect()
    }

    /// Number of published devices
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock()
            .iter()
            .filter(|slot| matches!(slot, Slot::Occupied(_)))
            .count()
    }

    /// Whether no device is published
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remove the device at `index`, freeing the slot
    pub fn remove(&self, index: usize) -> Option<Arc<Device>> {
        let mut slots = self.lock();
        let slot = slots.get_mut(index)?;
        if !matches!(slot, Slot::Occupied(_)) {
            return None;
        }
        match std::mem::replace(slot, Slot::Free) {
            Slot::Occupied(device) => Some(device),
            _ => None,
        }
    }
}

/// Slot held by an attach in progress
#[derive(Debug)]
#[must_use = "dropping a reservation frees the slot"]
pub struct Reservation<'a> {
    registry: &'a Registry,
    index: usize,
    published: bool,
}

impl Reservation<'_> {
    /// Reserved index
    #[must_use]
    pub const fn index(&self) -> usize {
        self.index
    }

    /// Make `device` visible at the reserved index
    pub fn publish(mut self, device: Arc<Device>) {
        self.registry.lock()[self.index] = Slot::Occupied(device);
        self.published = true;
    }
}

impl Drop for Reservation<'_> {
    fn drop(&mut self) {
        if !self.published {
            self.registry.lock()[self.index] = Slot::Free;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::simulated::SimulatedRegisters;
    use crate::platform::{InterruptLine, ResourceDescriptor};

    fn device(index: usize) -> Arc<Device> {
        Arc::new(Device::new(
            index,
            &ipcore_chip::catalog::CDC,
            ResourceDescriptor::new(0, 0x40, InterruptLine(0)),
            format!("cdc{index}"),
            Box::new(SimulatedRegisters::new(0x40)),
        ))
    }

    #[test]
    fn reserve_takes_lowest_free_slot() {
        let registry = Registry::new(3);
        let a = registry.reserve().unwrap();
        let b = registry.reserve().unwrap();
        assert_eq!((a.index(), b.index()), (0, 1));
        a.publish(device(0));
        drop(b);
        assert_eq!(registry.reserve().unwrap().index(), 1);
    }

    #[test]
    fn dropped_reservation_is_invisible() {
        let registry = Registry::new(2);
        let r = registry.reserve().unwrap();
        assert!(matches!(registry.get(r.index()), Err(IpcoreError::NoSuchDevice { index: 0 })));
        drop(r);
        assert!(registry.is_empty());
    }

    #[test]
    fn full_registry_rejects() {
        let registry = Registry::new(1);
        registry.reserve().unwrap().publish(device(0));
        assert!(matches!(
            registry.reserve(),
            Err(IpcoreError::ResourceUnavailable { .. })
        ));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn remove_frees_slot_for_reuse() {
        let registry = Registry::new(2);
        registry.reserve().unwrap().publish(device(0));
        registry.reserve().unwrap().publish(device(1));
        assert_eq!(registry.remove(0).unwrap().endpoint_name(), "cdc0");
        assert!(registry.remove(0).is_none());
        assert_eq!(registry.reserve().unwrap().index(), 0);
        let names: Vec<_> = registry
            .devices()
            .iter()
            .map(|d| d.endpoint_name().to_string())
            .collect();
        assert_eq!(names, ["cdc1"]);
    }
}

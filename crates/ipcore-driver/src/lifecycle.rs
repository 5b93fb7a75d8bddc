//! Attach and detach
//!
//! ```text
//! Unattached ─attach─▶ Attaching ─────────────▶ Attached ─detach─▶ Detaching ─▶ Gone
//!                          │ any failure                     (commands fail with DeviceGone)
//!                          ▼
//!                   acquisitions released in reverse order, nothing published
//! ```
//!
//! Attach acquisition order: registry slot, register window, version check,
//! interrupt handler, endpoint. Detach releases the interrupt first, so no
//! handler runs against a window that is being unmapped.

use crate::config::DriverConfig;
use crate::device::{Device, DeviceState};
use crate::error::{IpcoreError, Result};
use crate::irq;
use crate::mmio;
use crate::platform::{IrqHandler, PlatformServices, ResourceDescriptor};
use crate::registry::Registry;
use ipcore_chip::catalog::{self, PlatformDescriptor};
use ipcore_chip::regs;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Descriptor for `compatible`
///
/// # Errors
///
/// Returns `UnsupportedVariant` for unknown strings and for the stub variants
/// that have no descriptor.
pub fn resolve(compatible: &str) -> Result<&'static PlatformDescriptor> {
    catalog::lookup(compatible).ok_or_else(|| IpcoreError::unsupported_variant(compatible))
}

/// Endpoint name of a core at `base`
#[must_use]
pub fn endpoint_name(descriptor: &PlatformDescriptor, base: u64, qualified: bool) -> String {
    if qualified {
        format!("{base:x}.{}", descriptor.display_name)
    } else {
        descriptor.display_name.to_string()
    }
}

/// Attach the core described by `compatible` and `resource`
///
/// On success the device is `Attached`, its handler is bound and it is
/// published in `registry`. On failure nothing stays acquired.
///
/// # Errors
///
/// - `UnsupportedVariant` if `compatible` has no descriptor
/// - `ResourceUnavailable` if the registry is full, or mapping, interrupt
///   registration or endpoint creation fails
/// - `VersionMismatch` if the version register does not identify the variant
pub fn attach(
    registry: &Registry,
    services: &PlatformServices,
    config: &DriverConfig,
    compatible: &str,
    resource: ResourceDescriptor,
) -> Result<Arc<Device>> {
    let descriptor = resolve(compatible).inspect_err(|e| warn!("{e}"))?;
    let reservation = registry.reserve()?;
    let index = reservation.index();

    let regs = services
        .mapper
        .map(resource.base, resource.span)
        .map_err(|e| e.into_unavailable(&format!("Can't map {:#x}", resource.base)))?;

    let revision = mmio::read(&*regs, descriptor.version_register_id);
    if !descriptor.version_matches(revision) {
        let err = IpcoreError::VersionMismatch {
            compatible: descriptor.compatible(),
            found: revision & descriptor.version_mask,
            expected: descriptor.version_expected,
            mask: descriptor.version_mask,
        };
        warn!("{err}");
        return Err(err);
    }

    let name = endpoint_name(descriptor, resource.base, config.qualify_endpoint_names);
    let base = resource.base;
    let span = resource.span;
    let line = resource.irq;
    let device = Arc::new(Device::new(index, descriptor, resource, name, regs));

    let handler: IrqHandler = {
        let device = Arc::clone(&device);
        Arc::new(move || irq::dispatch(&device))
    };
    if let Err(e) = services
        .interrupts
        .request(line, descriptor.irq_label, handler)
    {
        abandon(&device);
        return Err(e.into_unavailable(&format!("Can't register irq {line}")));
    }

    if let Err(e) = services.endpoints.create(index, device.endpoint_name()) {
        services.interrupts.free(line);
        abandon(&device);
        return Err(e.into_unavailable("Can't create device"));
    }

    device.set_state(DeviceState::Attached);
    reservation.publish(Arc::clone(&device));

    let end = base + span.saturating_sub(1);
    info!(
        "{}: base {base:#x}-{end:#x}, irq {line}",
        device.endpoint_name()
    );
    info!("{}: IP core rev. {revision:#x}", device.endpoint_name());
    warn!(
        "{}: This is a preliminary driver, expect limited functionality",
        device.endpoint_name()
    );
    debug!(
        "{}: {} sub-device(s), registry index {index}",
        device.endpoint_name(),
        device.sub_devices().len()
    );
    Ok(device)
}

fn abandon(device: &Device) {
    drop(device.release_registers());
    device.set_state(DeviceState::Gone);
}

/// Detach the device at `index`
///
/// Waiters blocked in a wait are woken with `DeviceGone`.
///
/// # Errors
///
/// - `NoSuchDevice` if nothing is attached at `index`
/// - `DeviceGone` if another detach of the same device is in progress
pub fn detach(registry: &Registry, services: &PlatformServices, index: usize) -> Result<()> {
    let device = registry.get(index)?;
    if !device.transition(DeviceState::Attached, DeviceState::Detaching) {
        return Err(IpcoreError::DeviceGone);
    }

    services.interrupts.free(device.interrupt_line());
    device.cancel_waiters();
    services.endpoints.destroy(index);
    drop(device.release_registers());
    registry.remove(index);
    device.set_state(DeviceState::Gone);

    info!("{}: detached", device.endpoint_name());
    Ok(())
}

/// Number of registers a device's window holds
pub(crate) fn window_registers(device: &Device) -> u64 {
    regs::register_count(device.region_span())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::SimulatedPlatform;
    use crate::platform::InterruptLine;
    use ipcore_chip::compat;

    const BASE: u64 = 0xff20_0000;

    fn setup() -> (Arc<SimulatedPlatform>, PlatformServices, Registry, DriverConfig) {
        let platform = SimulatedPlatform::new();
        let services = platform.services();
        (platform, services, Registry::new(4), DriverConfig::default())
    }

    #[test]
    fn resolve_rejects_stubs_and_unknowns() {
        assert!(resolve(compat::CDC).is_ok());
        for compatible in [compat::FBD, compat::DSW, "tes,cdc-2.0", ""] {
            assert!(matches!(
                resolve(compatible),
                Err(IpcoreError::UnsupportedVariant { .. })
            ));
        }
    }

    #[test]
    fn endpoint_names() {
        assert_eq!(endpoint_name(&catalog::CDC, BASE, true), "ff200000.cdc");
        assert_eq!(endpoint_name(&catalog::D2D, BASE, false), "d2d");
    }

    #[test]
    fn attach_binds_irq_and_endpoint() {
        let (platform, services, registry, config) = setup();
        platform.install(BASE, 0x100).poke(0, 0x0004_0012);
        let resource = ResourceDescriptor::new(BASE, 0x100, InterruptLine(7));

        let dev = attach(&registry, &services, &config, compat::CDC, resource).unwrap();
        assert_eq!(dev.state(), DeviceState::Attached);
        assert_eq!(dev.endpoint_name(), "ff200000.cdc");
        assert!(platform.is_bound(InterruptLine(7)));
        assert_eq!(platform.endpoints().index_of("ff200000.cdc"), Some(0));
        assert_eq!(window_registers(&dev), 0x40);
    }

    #[test]
    fn unmapped_window_leaves_registry_empty() {
        let (_platform, services, registry, config) = setup();
        let resource = ResourceDescriptor::new(BASE, 0x100, InterruptLine(7));
        let err = attach(&registry, &services, &config, compat::WARP, resource).unwrap_err();
        assert!(matches!(err, IpcoreError::ResourceUnavailable { .. }));
        assert!(registry.is_empty());
        assert_eq!(registry.reserve().unwrap().index(), 0);
    }

    #[test]
    fn endpoint_failure_frees_irq() {
        let (platform, services, registry, mut config) = setup();
        config.qualify_endpoint_names = false;
        platform.install(BASE, 0x100);
        platform.install(BASE + 0x1000, 0x100);

        let first = ResourceDescriptor::new(BASE, 0x100, InterruptLine(1));
        attach(&registry, &services, &config, compat::DHD, first).unwrap();

        let second = ResourceDescriptor::new(BASE + 0x1000, 0x100, InterruptLine(2));
        let err = attach(&registry, &services, &config, compat::DHD, second).unwrap_err();
        assert!(matches!(err, IpcoreError::ResourceUnavailable { .. }));
        assert!(!platform.is_bound(InterruptLine(2)));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn detach_releases_everything() {
        let (platform, services, registry, config) = setup();
        platform.install(BASE, 0x100);
        let resource = ResourceDescriptor::new(BASE, 0x100, InterruptLine(3));
        let dev = attach(&registry, &services, &config, compat::D2D, resource).unwrap();

        detach(&registry, &services, dev.index()).unwrap();
        assert_eq!(dev.state(), DeviceState::Gone);
        assert!(!platform.is_bound(InterruptLine(3)));
        assert!(platform.endpoints().entries().is_empty());
        assert!(registry.is_empty());
        assert!(matches!(
            detach(&registry, &services, dev.index()),
            Err(IpcoreError::NoSuchDevice { .. })
        ));
    }
}

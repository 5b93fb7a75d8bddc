//! Driver façade: registry, platform services and configuration in one owner

use crate::backends::LinuxPlatform;
use crate::command::DeviceHandle;
use crate::config::DriverConfig;
use crate::device::Device;
use crate::discovery::{self, DiscoveredCore};
use crate::error::Result;
use crate::lifecycle;
use crate::platform::{PlatformServices, ResourceDescriptor};
use crate::registry::Registry;
use ipcore_chip::uapi::DRIVER_NAME;
use std::sync::Arc;

/// Loaded driver
///
/// Dropping the driver detaches every device, like module unload.
#[derive(Debug)]
pub struct Driver {
    config: DriverConfig,
    services: PlatformServices,
    registry: Registry,
}

impl Driver {
    /// Driver over `services`, with a registry sized by `config`
    #[must_use]
    pub fn new(config: DriverConfig, services: PlatformServices) -> Self {
        let registry = Registry::new(config.max_devices);
        tracing::debug!("{DRIVER_NAME}: registry holds {} devices", registry.capacity());
        Self {
            config,
            services,
            registry,
        }
    }

    /// Driver over `/dev/mem` and UIO, configured from the environment
    #[must_use]
    pub fn linux() -> Self {
        let config = DriverConfig::from_env();
        let services = LinuxPlatform::new(&config).services();
        Self::new(config, services)
    }

    /// Configuration in effect
    #[must_use]
    pub const fn config(&self) -> &DriverConfig {
        &self.config
    }

    /// Device registry
    #[must_use]
    pub const fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Attach one core
    ///
    /// # Errors
    ///
    /// See [`lifecycle::attach`].
    pub fn attach(&self, compatible: &str, resource: ResourceDescriptor) -> Result<Arc<Device>> {
        lifecycle::attach(
            &self.registry,
            &self.services,
            &self.config,
            compatible,
            resource,
        )
    }

    /// Discover cores and attach each one
    ///
    /// Returns one result per discovered core, in discovery order; a core
    /// that fails to attach does not stop the others.
    ///
    /// # Errors
    ///
    /// Returns an error only if discovery itself fails.
    pub fn attach_discovered(&self) -> Result<Vec<(DiscoveredCore, Result<Arc<Device>>)>> {
        let cores = discovery::discover(&self.config)?;
        Ok(cores
            .into_iter()
            .map(|core| {
                let result = self.attach(&core.compatible, core.resource.clone());
                (core, result)
            })
            .collect())
    }

    /// Detach the device at `index`
    ///
    /// # Errors
    ///
    /// See [`lifecycle::detach`].
    pub fn detach(&self, index: usize) -> Result<()> {
        lifecycle::detach(&self.registry, &self.services, index)
    }

    /// Open the endpoint of the device at `index`
    ///
    /// # Errors
    ///
    /// Returns `NoSuchDevice` if nothing is attached there.
    pub fn open(&self, index: usize) -> Result<DeviceHandle> {
        let device = self.registry.get(index)?;
        tracing::debug!("{}: opened", device.endpoint_name());
        Ok(DeviceHandle::new(device))
    }

    /// Attached devices, in index order
    #[must_use]
    pub fn devices(&self) -> Vec<Arc<Device>> {
        self.registry.devices()
    }

    /// Detach every device, highest index first
    pub fn shutdown(&self) {
        for device in self.registry.devices().iter().rev() {
            if let Err(e) = self.detach(device.index()) {
                tracing::warn!("{}: detach during shutdown failed: {e}", device.endpoint_name());
            }
        }
    }
}

impl Drop for Driver {
    fn drop(&mut self) {
        self.shutdown();
    }
}

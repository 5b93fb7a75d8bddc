//! Host platform services consumed by the driver core
//!
//! The driver never talks to the OS directly. Attach and detach go through
//! three narrow services, bundled in [`PlatformServices`]:
//!
//! - [`MemoryMapper`] turns a physical range into a [`RegisterIo`] window
//! - [`InterruptController`] binds a handler to an interrupt line
//! - [`EndpointNamer`] creates and destroys the user-visible endpoint
//!
//! Implementations live in [`crate::backends`].

use crate::device::SubDeviceRef;
use crate::error::Result;
use crate::mmio::RegisterIo;
use std::fmt::Debug;
use std::sync::Arc;

/// Hardware interrupt line number
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InterruptLine(pub u32);

impl std::fmt::Display for InterruptLine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Resources of one discovered core: register window, interrupt and the
/// streaming sub-devices wired to it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceDescriptor {
    /// Physical base address of the register window
    pub base: u64,
    /// Window length in bytes
    pub span: u64,
    /// Interrupt line
    pub irq: InterruptLine,
    /// Connected sub-devices, in attach order
    pub sub_devices: Vec<SubDeviceRef>,
}

impl ResourceDescriptor {
    /// Window and interrupt with no sub-devices
    #[must_use]
    pub const fn new(base: u64, span: u64, irq: InterruptLine) -> Self {
        Self {
            base,
            span,
            irq,
            sub_devices: Vec::new(),
        }
    }

    /// Attach a sub-device
    #[must_use]
    pub fn with_sub_device(mut self, sub: SubDeviceRef) -> Self {
        self.sub_devices.push(sub);
        self
    }
}

/// Interrupt handler bound to one device
///
/// Runs in the controller's dispatch context: must not block.
pub type IrqHandler = Arc<dyn Fn() + Send + Sync>;

/// Maps physical register windows
pub trait MemoryMapper: Debug + Send + Sync {
    /// Map `span` bytes at physical address `base`
    ///
    /// # Errors
    ///
    /// Returns `ResourceUnavailable` if the window cannot be mapped.
    fn map(&self, base: u64, span: u64) -> Result<Box<dyn RegisterIo>>;
}

/// Binds interrupt handlers to lines
pub trait InterruptController: Debug + Send + Sync {
    /// Register `handler` for `line`
    ///
    /// # Errors
    ///
    /// Returns `ResourceUnavailable` if the line is unknown or already bound.
    fn request(&self, line: InterruptLine, label: &'static str, handler: IrqHandler) -> Result<()>;

    /// Unbind `line`
    ///
    /// Returns once the handler can no longer run, including any invocation
    /// already in flight.
    fn free(&self, line: InterruptLine);
}

/// Creates and destroys user-visible endpoints
pub trait EndpointNamer: Debug + Send + Sync {
    /// Publish endpoint `name` for registry index `index`
    ///
    /// # Errors
    ///
    /// Returns `ResourceUnavailable` if the name or index is already taken.
    fn create(&self, index: usize, name: &str) -> Result<()>;

    /// Remove the endpoint of registry index `index`
    fn destroy(&self, index: usize);
}

/// The three services attach and detach depend on
#[derive(Debug, Clone)]
pub struct PlatformServices {
    /// Register window mapping
    pub mapper: Arc<dyn MemoryMapper>,
    /// Interrupt registration
    pub interrupts: Arc<dyn InterruptController>,
    /// Endpoint naming
    pub endpoints: Arc<dyn EndpointNamer>,
}

impl PlatformServices {
    /// Bundle one object implementing all three services
    pub fn from_shared<P>(platform: &Arc<P>) -> Self
    where
        P: MemoryMapper + InterruptController + EndpointNamer + 'static,
    {
        Self {
            mapper: Arc::clone(platform) as Arc<dyn MemoryMapper>,
            interrupts: Arc::clone(platform) as Arc<dyn InterruptController>,
            endpoints: Arc::clone(platform) as Arc<dyn EndpointNamer>,
        }
    }
}

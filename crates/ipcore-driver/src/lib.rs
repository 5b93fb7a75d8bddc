//! Userspace driver for TES IP cores (CDC, DHD, WARP, D2D).
//!
//! One generic driver core, parameterized by the per-variant
//! [`PlatformDescriptor`] from `ipcore-chip`. Adding a variant means adding a
//! descriptor, not code.
//!
//! # Layers
//!
//! ```text
//! Driver ─ attach/detach ─▶ Registry ◀── open ── DeviceHandle (command surface)
//!    │                         │                      │
//!    ▼                         ▼                      ▼
//! PlatformServices        Device (state, status word, register window)
//!   MemoryMapper                ▲
//!   InterruptController ── irq::dispatch
//!   EndpointNamer
//! ```
//!
//! Platforms:
//! - [`backends::LinuxPlatform`]: `/dev/mem` + UIO (requires root)
//! - [`backends::SimulatedPlatform`]: in-memory, for tests and dry runs
//!
//! # Quick start
//!
//! ```no_run
//! use ipcore_driver::Driver;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let driver = Driver::linux();
//! for (core, result) in driver.attach_discovered()? {
//!     match result {
//!         Ok(dev) => println!("{} attached as {}", core.compatible, dev.endpoint_name()),
//!         Err(e) => eprintln!("{}: {e}", core.compatible),
//!     }
//! }
//!
//! let handle = driver.open(0)?;
//! println!("rev {:#010x}", handle.read_register(0)?);
//! let status = handle.wait_for_interrupt()?;
//! println!("irq status {status:#010x}");
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::doc_markdown)]

pub mod backends;
mod command;
pub mod config;
mod device;
mod discovery;
mod driver;
mod error;
pub mod io;
pub mod irq;
pub mod lifecycle;
pub mod mmio;
pub mod platform;
pub mod protocol;
pub mod registry;

pub use command::DeviceHandle;
pub use config::DriverConfig;
pub use device::{Device, DeviceState, SubDeviceRef};
pub use discovery::{discover, DiscoveredCore};
pub use driver::Driver;
pub use error::{IpcoreError, Result};
pub use ipcore_chip::{ClearStrategy, PlatformDescriptor, Variant};
pub use platform::{InterruptLine, PlatformServices, ResourceDescriptor};
pub use protocol::{DeviceSettings, Request, Response};
pub use registry::Registry;

/// Commonly used types.
pub mod prelude {
    pub use crate::{
        DeviceHandle, DeviceSettings, DeviceState, Driver, DriverConfig, InterruptLine,
        IpcoreError, ResourceDescriptor, Result, SubDeviceRef,
    };
}

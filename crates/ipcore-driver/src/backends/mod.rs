//! Platform service implementations
//!
//! Two platforms available:
//! - **Linux**: `/dev/mem` register mapping + UIO interrupts (requires root
//!   and cores bound to `uio_pdrv_genirq`)
//! - **Simulated**: in-memory register files and software-raised interrupts
//!   (tests, CI, `ipcore simulate`)
//!
//! Both name endpoints through [`EndpointTable`].

pub mod endpoints;
pub mod linux;
pub mod simulated;

pub use endpoints::EndpointTable;
pub use linux::{DevMemMapper, LinuxPlatform, UioInterrupts};
pub use simulated::{SimulatedPlatform, SimulatedRegisters};

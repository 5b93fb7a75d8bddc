//! Silicon model for the TES IP core family (CDC, DHD, WARP, D2D).
//!
//! This crate has **no dependencies** and **no hardware access**. It is a
//! pure model of the cores as the driver sees them: device-tree compatible
//! strings, the per-variant platform descriptors, the interrupt-clear
//! strategies, the word-addressed register convention and the ioctl numbers
//! of the command surface.
//!
//! # Crate organisation
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`compat`] | Compatible strings and the [`compat::Variant`] enum |
//! | [`catalog`] | [`catalog::PlatformDescriptor`] table, one entry per variant |
//! | [`irq`] | Clear strategies and the D2D status/clear bit layout |
//! | [`regs`] | Word address → byte offset, shared register ids |
//! | [`uapi`] | ioctl type/numbers and the device-count limits |

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod catalog;
pub mod compat;
pub mod irq;
pub mod regs;
pub mod uapi;

pub use catalog::PlatformDescriptor;
pub use compat::Variant;
pub use irq::ClearStrategy;

//! Interrupt service routine
//!
//! One call per hardware interrupt, for the device bound at registration:
//!
//! 1. read the status register
//! 2. acknowledge exactly the bits read, per the variant's clear strategy
//! 3. OR the status into the pending word under the status lock
//! 4. wake every waiter
//!
//! Register access cannot fail at this layer and nothing here blocks: the
//! register read lock is only ever written by detach, after the handler has
//! been freed.

use crate::device::Device;
use crate::mmio;

/// Service one interrupt for `device`
pub fn dispatch(device: &Device) {
    let descriptor = device.descriptor();

    let status = {
        let guard = device.registers();
        let Some(regs) = guard.as_deref() else {
            tracing::trace!("{}: interrupt after release, ignored", device.endpoint_name());
            return;
        };

        let status = mmio::read(regs, descriptor.irq_status_register_id);
        let (clear_reg, clear_value) = descriptor.clear_write(status);
        mmio::write(regs, clear_reg, clear_value);
        status
    };

    device.post_status(status);
    tracing::trace!("{}: irq status {status:#010x}", device.endpoint_name());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::simulated::SimulatedRegisters;
    use crate::device::DeviceState;
    use crate::platform::{InterruptLine, ResourceDescriptor};
    use ipcore_chip::catalog::{self, PlatformDescriptor};
    use std::sync::Arc;

    fn device(desc: &'static PlatformDescriptor) -> (Device, Arc<SimulatedRegisters>) {
        let regs = Arc::new(SimulatedRegisters::new(0x100));
        let dev = Device::new(
            0,
            desc,
            ResourceDescriptor::new(0, 0x100, InterruptLine(0)),
            desc.display_name.to_string(),
            Box::new(Arc::clone(&regs)),
        );
        dev.set_state(DeviceState::Attached);
        (dev, regs)
    }

    #[test]
    fn cdc_writes_status_back_to_clear_register() {
        let (dev, regs) = device(&catalog::CDC);
        regs.poke(0x0e, 0x0000_0003);
        dispatch(&dev);
        assert_eq!(regs.peek(0x0f), 0x0000_0003);
        assert_eq!(dev.pending_status(), 0x3);
        assert_eq!((regs.reads(), regs.writes()), (1, 1));
    }

    #[test]
    fn dhd_clears_through_status_register() {
        let (dev, regs) = device(&catalog::DHD);
        regs.poke(0x06, 0x10);
        dispatch(&dev);
        assert_eq!(regs.last_offset(), Some(0x06 * 4));
        assert_eq!(dev.pending_status(), 0x10);
    }

    #[test]
    fn d2d_builds_ack_word() {
        let (dev, regs) = device(&catalog::D2D);
        regs.poke(0x00, 0x50);
        dispatch(&dev);
        assert_eq!(regs.peek(0x30), 0x36);
        assert_eq!(dev.pending_status(), 0x50);
    }

    #[test]
    fn status_accumulates_across_interrupts() {
        let (dev, regs) = device(&catalog::WARP);
        for status in [0x1, 0x2, 0x1, 0x8000_0000] {
            regs.poke(0x11, status);
            dispatch(&dev);
            assert_eq!(regs.peek(0x12), status, "acknowledges only what was read");
        }
        assert_eq!(dev.pending_status(), 0x8000_0003);
    }

    #[test]
    fn released_window_is_a_no_op() {
        let (dev, regs) = device(&catalog::CDC);
        drop(dev.release_registers());
        regs.poke(0x0e, 1);
        dispatch(&dev);
        assert_eq!(regs.reads() + regs.writes(), 0);
        assert_eq!(dev.pending_status(), 0);
    }
}

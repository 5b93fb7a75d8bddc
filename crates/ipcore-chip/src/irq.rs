//! Interrupt clear strategies.
//!
//! ## D2D bit layout
//!
//! Reconstructed from the C bitfield unions of the kernel driver
//! (LSB-first allocation). Confirm against the D2D datasheet before relying
//! on it bit-exactly.
//!
//! ```text
//! status word        bit  6    5      4     3..0
//!                         bus  dlist  enum  (gap)
//!
//! clear word         bit  5        4           3          2         1             0
//!                         ack_bus  enable_bus  ack_dlist  ack_enum  enable_dlist  enable_enum
//! ```
//!
//! The clear word always enables the bus and display-list interrupts, never
//! the enumeration interrupt, and acknowledges whichever flags were read.

/// D2D interrupt status register bits.
pub mod d2d_status {
    /// Enumeration interrupt fired.
    pub const ENUM: u32 = 1 << 4;
    /// Display-list interrupt fired.
    pub const DLIST: u32 = 1 << 5;
    /// Bus interrupt fired.
    pub const BUS: u32 = 1 << 6;
}

/// D2D interrupt clear/control register bits.
pub mod d2d_clear {
    /// Enable enumeration interrupt.
    pub const ENABLE_ENUM: u32 = 1 << 0;
    /// Enable display-list interrupt.
    pub const ENABLE_DLIST: u32 = 1 << 1;
    /// Acknowledge enumeration interrupt.
    pub const ACK_ENUM: u32 = 1 << 2;
    /// Acknowledge display-list interrupt.
    pub const ACK_DLIST: u32 = 1 << 3;
    /// Enable bus interrupt.
    pub const ENABLE_BUS: u32 = 1 << 4;
    /// Acknowledge bus interrupt.
    pub const ACK_BUS: u32 = 1 << 5;

    /// Enable bits asserted on every clear.
    pub const ALWAYS_ENABLED: u32 = ENABLE_DLIST | ENABLE_BUS;
}

/// How a fired interrupt is acknowledged back to hardware.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ClearStrategy {
    /// Write the status value just read back to the clear register.
    WriteBack,
    /// Build a control word of fixed enable bits plus one ack bit per
    /// fired flag (D2D layout).
    BitfieldAckEnableBus,
}

impl ClearStrategy {
    /// Value to write to the clear register for a raw `status` read.
    #[must_use]
    pub const fn clear_value(self, status: u32) -> u32 {
        match self {
            Self::WriteBack => status,
            Self::BitfieldAckEnableBus => bitfield_ack(status),
        }
    }
}

const fn bitfield_ack(status: u32) -> u32 {
    let mut word = d2d_clear::ALWAYS_ENABLED;
    if status & d2d_status::ENUM != 0 {
        word |= d2d_clear::ACK_ENUM;
    }
    if status & d2d_status::DLIST != 0 {
        word |= d2d_clear::ACK_DLIST;
    }
    if status & d2d_status::BUS != 0 {
        word |= d2d_clear::ACK_BUS;
    }
    word
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_back_is_identity() {
        for status in [0, 1, 0x8000_0001, u32::MAX] {
            assert_eq!(ClearStrategy::WriteBack.clear_value(status), status);
        }
    }

    #[test]
    fn bitfield_enum_and_bus() {
        let status = d2d_status::ENUM | d2d_status::BUS;
        assert_eq!(status, 0x50);

        let word = ClearStrategy::BitfieldAckEnableBus.clear_value(status);
        assert_eq!(word, 0x36);
        assert_ne!(word & d2d_clear::ENABLE_BUS, 0);
        assert_ne!(word & d2d_clear::ENABLE_DLIST, 0);
        assert_eq!(word & d2d_clear::ENABLE_ENUM, 0);
        assert_ne!(word & d2d_clear::ACK_BUS, 0);
        assert_ne!(word & d2d_clear::ACK_ENUM, 0);
        assert_eq!(word & d2d_clear::ACK_DLIST, 0);
    }

    #[test]
    fn bitfield_nothing_fired_only_enables() {
        assert_eq!(
            ClearStrategy::BitfieldAckEnableBus.clear_value(0),
            d2d_clear::ALWAYS_ENABLED
        );
    }

    #[test]
    fn bitfield_ignores_gap_and_high_bits() {
        let noise = 0x0000_000f | 0xffff_ff80;
        assert_eq!(
            ClearStrategy::BitfieldAckEnableBus.clear_value(noise),
            d2d_clear::ALWAYS_ENABLED
        );
        assert_eq!(
            ClearStrategy::BitfieldAckEnableBus.clear_value(noise | d2d_status::DLIST),
            d2d_clear::ALWAYS_ENABLED | d2d_clear::ACK_DLIST
        );
    }

    #[test]
    fn bitfield_all_flags() {
        let all = d2d_status::ENUM | d2d_status::DLIST | d2d_status::BUS;
        assert_eq!(ClearStrategy::BitfieldAckEnableBus.clear_value(all), 0x3e);
    }
}

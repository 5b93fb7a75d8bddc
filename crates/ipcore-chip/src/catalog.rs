//! Platform descriptors, the only thing that differs between variants.
//!
//! Every attached device holds a `&'static PlatformDescriptor` into this
//! table. Register ids are word addresses (see [`crate::regs`]).
//!
//! ```text
//! variant  name  version reg  mask        expected    status  clear  strategy
//! ───────  ────  ───────────  ──────────  ──────────  ──────  ─────  ─────────────────────
//! CDC      cdc   0x00         0xffffff00  0x00040000  0x0e    0x0f   WriteBack
//! DHD      dhd   0x00         0x00000000  0x00000000  0x06    -      WriteBack
//! WARP     warp  0x00         0x00000000  0x00000000  0x11    0x12   WriteBack
//! D2D      d2d   0x00         0x00000000  0x00000000  0x00    0x30   BitfieldAckEnableBus
//! ```
//!
//! DHD, WARP and D2D have no published version value yet; a zero mask makes
//! the identity check accept any revision.

use crate::compat::Variant;
use crate::irq::ClearStrategy;
use crate::regs;

/// Immutable per-variant constants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlatformDescriptor {
    /// Variant this descriptor belongs to.
    pub variant: Variant,
    /// Endpoint base name (`/dev/<name>`).
    pub display_name: &'static str,
    /// Word address of the version register.
    pub version_register_id: u32,
    /// Relevant bits of the version register.
    pub version_mask: u32,
    /// Expected value of the masked version register.
    pub version_expected: u32,
    /// Word address of the interrupt status register.
    pub irq_status_register_id: u32,
    /// Word address of the interrupt clear register; `None` clears by
    /// writing back to the status register.
    pub irq_clear_register_id: Option<u32>,
    /// How a fired interrupt is acknowledged.
    pub clear_strategy: ClearStrategy,
    /// Label the interrupt line is registered under.
    pub irq_label: &'static str,
}

/// CDC display controller.
pub const CDC: PlatformDescriptor = PlatformDescriptor {
    variant: Variant::Cdc,
    display_name: "cdc",
    version_register_id: regs::VERSION,
    version_mask: 0xffff_ff00,
    version_expected: 0x0004_0000,
    irq_status_register_id: 0x0e,
    irq_clear_register_id: Some(0x0f),
    clear_strategy: ClearStrategy::WriteBack,
    irq_label: "cdc_irq",
};

/// DHD graphics core. Status and clear share register 0x06.
pub const DHD: PlatformDescriptor = PlatformDescriptor {
    variant: Variant::Dhd,
    display_name: "dhd",
    version_register_id: regs::VERSION,
    version_mask: 0,
    version_expected: 0,
    irq_status_register_id: 0x06,
    irq_clear_register_id: None,
    clear_strategy: ClearStrategy::WriteBack,
    irq_label: "dhd_irq",
};

/// WARP image warping core.
pub const WARP: PlatformDescriptor = PlatformDescriptor {
    variant: Variant::Warp,
    display_name: "warp",
    version_register_id: regs::VERSION,
    version_mask: 0,
    version_expected: 0,
    irq_status_register_id: 0x11,
    irq_clear_register_id: Some(0x12),
    clear_strategy: ClearStrategy::WriteBack,
    irq_label: "warp_irq",
};

/// D2D 2D rendering core.
pub const D2D: PlatformDescriptor = PlatformDescriptor {
    variant: Variant::D2d,
    display_name: "d2d",
    version_register_id: regs::VERSION,
    version_mask: 0,
    version_expected: 0,
    irq_status_register_id: 0x00,
    irq_clear_register_id: Some(0x30),
    clear_strategy: ClearStrategy::BitfieldAckEnableBus,
    irq_label: "d2d_irq",
};

/// All supported descriptors, in match-table order.
pub const CATALOG: &[&PlatformDescriptor] = &[&CDC, &DHD, &WARP, &D2D];

/// Descriptor for a variant, `None` for the stubs.
#[must_use]
pub const fn descriptor(variant: Variant) -> Option<&'static PlatformDescriptor> {
    match variant {
        Variant::Cdc => Some(&CDC),
        Variant::Dhd => Some(&DHD),
        Variant::Warp => Some(&WARP),
        Variant::D2d => Some(&D2D),
        Variant::Fbd | Variant::Dsw => None,
    }
}

/// Look up a descriptor by exact compatible-string match.
#[must_use]
pub fn lookup(compatible: &str) -> Option<&'static PlatformDescriptor> {
    Variant::from_compatible(compatible).and_then(descriptor)
}

impl PlatformDescriptor {
    /// Whether a raw version register value identifies this variant.
    #[must_use]
    pub const fn version_matches(&self, raw: u32) -> bool {
        raw & self.version_mask == self.version_expected
    }

    /// Register the clear value is written to.
    #[must_use]
    pub const fn clear_register(&self) -> u32 {
        match self.irq_clear_register_id {
            Some(id) => id,
            None => self.irq_status_register_id,
        }
    }

    /// `(register, value)` acknowledging exactly the bits in `status`.
    #[must_use]
    pub const fn clear_write(&self, status: u32) -> (u32, u32) {
        (self.clear_register(), self.clear_strategy.clear_value(status))
    }

    /// Compatible string of this descriptor's variant.
    #[must_use]
    pub const fn compatible(&self) -> &'static str {
        self.variant.compatible()
    }
}

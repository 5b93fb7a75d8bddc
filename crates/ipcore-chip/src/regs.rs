//! Register addressing convention.
//!
//! Every TES core exposes a flat array of 32-bit registers. Register ids are
//! **word addresses**; the byte offset into the mapped window is `id * 4`.

// ── Geometry ─────────────────────────────────────────────────────────────────

/// Width of one register in bytes.
pub const REG_WIDTH: usize = 4;

/// `log2(REG_WIDTH)`, the shift from word address to byte offset.
pub const REG_SHIFT: u32 = 2;

// ── Shared register ids ──────────────────────────────────────────────────────

/// Version / revision register, id 0 on every catalogued core.
pub const VERSION: u32 = 0x00;

/// Byte offset of a register id.
#[must_use]
pub const fn byte_offset(id: u32) -> usize {
    (id as usize) << REG_SHIFT
}

/// Number of addressable registers in a window of `span` bytes.
#[must_use]
pub const fn register_count(span: u64) -> u64 {
    span >> REG_SHIFT
}

/// Whether a caller-supplied id falls inside a window of `span` bytes.
#[must_use]
pub const fn in_window(id: u64, span: u64) -> bool {
    id < register_count(span)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn word_address_to_byte_offset() {
        assert_eq!(byte_offset(0), 0);
        assert_eq!(byte_offset(1), 4);
        assert_eq!(byte_offset(0x0e), 0x38);
        assert_eq!(byte_offset(0x30), 0xc0);
    }

    #[test]
    fn window_bounds() {
        assert_eq!(register_count(0x1000), 0x400);
        assert!(in_window(0, 0x1000));
        assert!(in_window(0x3ff, 0x1000));
        assert!(!in_window(0x400, 0x1000));
        assert!(!in_window(u64::MAX, 0x1000));
        // a span that is not a multiple of four truncates
        assert!(!in_window(1, 7));
        assert!(!in_window(0, 3));
    }
}

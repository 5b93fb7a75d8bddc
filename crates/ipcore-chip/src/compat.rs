//! Device-tree compatible strings for the TES IP core family.
//!
//! Source: the `of_device_id` match table of the platform driver. FBD and DSW
//! have reserved compatibles but no descriptor yet; they are recognised here
//! so enumeration can name them, and rejected at attach.

/// Display controller (CDC 2.1).
pub const CDC: &str = "tes,cdc-2.1";
/// DHD graphics core.
pub const DHD: &str = "tes,dhd-1.0";
/// WARP image warping core.
pub const WARP: &str = "tes,warp-1.0";
/// D2D 2D rendering core.
pub const D2D: &str = "tes,d2d-1.0";
/// FBD frame buffer decompressor (stub).
pub const FBD: &str = "tes,fbd-1.0";
/// DSW display switch (stub).
pub const DSW: &str = "tes,dsw-1.0";

/// All compatibles the driver knows about, supported or not.
pub const ALL_COMPATIBLES: &[&str] = &[CDC, DHD, WARP, D2D, FBD, DSW];

/// IP core variant identified from a compatible string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Variant {
    /// CDC display controller.
    Cdc,
    /// DHD graphics core.
    Dhd,
    /// WARP image warping core.
    Warp,
    /// D2D 2D rendering core.
    D2d,
    /// FBD (no descriptor).
    Fbd,
    /// DSW (no descriptor).
    Dsw,
}

impl Variant {
    /// Every variant, in match-table order.
    pub const ALL: [Self; 6] = [
        Self::Cdc,
        Self::Dhd,
        Self::Warp,
        Self::D2d,
        Self::Fbd,
        Self::Dsw,
    ];

    /// Identify a variant by exact compatible-string match.
    #[must_use]
    pub fn from_compatible(compatible: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|variant| variant.compatible() == compatible)
    }

    /// The compatible string for this variant.
    #[must_use]
    pub const fn compatible(self) -> &'static str {
        match self {
            Self::Cdc => CDC,
            Self::Dhd => DHD,
            Self::Warp => WARP,
            Self::D2d => D2D,
            Self::Fbd => FBD,
            Self::Dsw => DSW,
        }
    }

    /// Whether the driver carries a platform descriptor for this variant.
    #[must_use]
    pub fn is_supported(self) -> bool {
        crate::catalog::descriptor(self).is_some()
    }
}

impl std::fmt::Display for Variant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.compatible())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compatible_round_trips_through_variant() {
        for variant in Variant::ALL {
            assert_eq!(Variant::from_compatible(variant.compatible()), Some(variant));
        }
    }

    #[test]
    fn match_is_exact() {
        assert_eq!(Variant::from_compatible("tes,cdc-2.1 "), None);
        assert_eq!(Variant::from_compatible("TES,CDC-2.1"), None);
        assert_eq!(Variant::from_compatible("tes,cdc"), None);
        assert_eq!(Variant::from_compatible(""), None);
    }

    #[test]
    fn stubs_are_unsupported() {
        assert!(!Variant::Fbd.is_supported());
        assert!(!Variant::Dsw.is_supported());
        assert!(Variant::Cdc.is_supported());
        assert!(Variant::D2d.is_supported());
    }
}

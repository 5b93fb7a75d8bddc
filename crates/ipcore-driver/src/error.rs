//! Error types for IP core driver operations

use thiserror::Error;

/// Result type alias for driver operations
pub type Result<T> = std::result::Result<T, IpcoreError>;

/// Errors that can occur while attaching or operating an IP core
#[derive(Debug, Error)]
pub enum IpcoreError {
    /// No platform descriptor for this compatible string
    #[error("Unsupported IP core variant: {compatible}")]
    UnsupportedVariant {
        /// Compatible string that failed to resolve
        compatible: String,
    },

    /// Hardware present but the version register does not match
    #[error("Unsupported {compatible} core version: {found:#010x} (expected {expected:#010x} under mask {mask:#010x})")]
    VersionMismatch {
        /// Variant being attached
        compatible: &'static str,
        /// Masked version register value
        found: u32,
        /// Expected masked value
        expected: u32,
        /// Mask applied to the raw register
        mask: u32,
    },

    /// Mapping, interrupt registration or endpoint creation failed
    #[error("Resource unavailable: {reason}")]
    ResourceUnavailable {
        /// Reason for failure
        reason: String,
    },

    /// Caller-supplied register id outside the mapped window
    #[error("Register id {id:#x} out of range (window holds {limit:#x} registers)")]
    OutOfRange {
        /// Requested register id
        id: u64,
        /// Number of registers in the window
        limit: u64,
    },

    /// Device detached (or detaching) while the call was made
    #[error("Device is gone")]
    DeviceGone,

    /// No device attached at this registry index
    #[error("No device attached at index {index}")]
    NoSuchDevice {
        /// Requested index
        index: usize,
    },

    /// ioctl number with the wrong type byte or an unknown command
    #[error("Invalid command {cmd:#010x}")]
    InvalidCommand {
        /// Raw ioctl number
        cmd: u32,
    },

    /// ioctl argument too short for the command's payload
    #[error("Invalid payload: need {expected} bytes, got {actual}")]
    InvalidPayload {
        /// Bytes required
        expected: usize,
        /// Bytes supplied
        actual: usize,
    },

    /// I/O error talking to the host platform
    #[error("I/O error: {source}")]
    Io {
        /// Underlying I/O error
        #[from]
        source: std::io::Error,
    },
}

impl IpcoreError {
    /// Create an unsupported variant error
    pub fn unsupported_variant(compatible: impl Into<String>) -> Self {
        Self::UnsupportedVariant {
            compatible: compatible.into(),
        }
    }

    /// Create a resource unavailable error
    pub fn resource_unavailable(reason: impl Into<String>) -> Self {
        Self::ResourceUnavailable {
            reason: reason.into(),
        }
    }

    /// Re-classify any error as `ResourceUnavailable`, keeping the message
    #[must_use]
    pub fn into_unavailable(self, context: &str) -> Self {
        match self {
            Self::ResourceUnavailable { .. } => self,
            other => Self::resource_unavailable(format!("{context}: {other}")),
        }
    }

    /// Attach-time errors end the attach attempt; command-time errors do not
    /// affect device state.
    #[must_use]
    pub const fn is_attach_error(&self) -> bool {
        matches!(
            self,
            Self::UnsupportedVariant { .. }
                | Self::VersionMismatch { .. }
                | Self::ResourceUnavailable { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn into_unavailable_wraps_other_kinds() {
        let err = IpcoreError::from(std::io::Error::other("busy")).into_unavailable("irq 7");
        match err {
            IpcoreError::ResourceUnavailable { reason } => {
                assert!(reason.starts_with("irq 7: "), "{reason}");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn into_unavailable_keeps_reason() {
        let err = IpcoreError::resource_unavailable("mmap failed").into_unavailable("ignored");
        assert_eq!(err.to_string(), "Resource unavailable: mmap failed");
    }

    #[test]
    fn version_mismatch_message() {
        let err = IpcoreError::VersionMismatch {
            compatible: "tes,cdc-2.1",
            found: 0x0003_0000,
            expected: 0x0004_0000,
            mask: 0xffff_ff00,
        };
        assert_eq!(
            err.to_string(),
            "Unsupported tes,cdc-2.1 core version: 0x00030000 (expected 0x00040000 under mask 0xffffff00)"
        );
        assert!(err.is_attach_error());
        assert!(!IpcoreError::DeviceGone.is_attach_error());
    }
}

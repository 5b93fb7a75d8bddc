//! Userspace interface constants: ioctl numbers and device limits.
//!
//! ioctl numbers use the Linux `_IOC` encoding:
//!
//! ```text
//! bits 31..30  29..16   15..8   7..0
//!      dir     size     type    nr
//! ```

/// Driver name.
pub const DRIVER_NAME: &str = "tes-ipcore";

/// Maximum number of attached cores, all variants combined.
pub const MAX_DEVICES: usize = 15;

/// Maximum number of connected streaming sub-devices per core.
pub const MAX_SUB_DEVICES: usize = 2;

/// Length of a sub-device name field in bytes.
pub const SUB_DEVICE_NAME_LEN: usize = 20;

/// ioctl type byte.
pub const IOCTL_TYPE: u8 = b't';

/// ioctl command numbers.
pub mod nr {
    /// Copy base address and span to userspace.
    pub const SETTINGS: u8 = 0x01;
    /// Write a register.
    pub const REG_WRITE: u8 = 0x02;
    /// Read a register.
    pub const REG_READ: u8 = 0x03;
    /// Copy the connected streaming sub-devices.
    pub const STREAM_DEV: u8 = 0x04;
    /// Number of connected streaming sub-devices.
    pub const STREAM_DEV_COUNT: u8 = 0x05;
}

/// Transfer direction field of an ioctl number.
pub mod dir {
    /// No data.
    pub const NONE: u32 = 0;
    /// Userspace writes, driver reads.
    pub const WRITE: u32 = 1;
    /// Driver writes, userspace reads.
    pub const READ: u32 = 2;
}

const NR_SHIFT: u32 = 0;
const TYPE_SHIFT: u32 = 8;
const SIZE_SHIFT: u32 = 16;
const DIR_SHIFT: u32 = 30;
const SIZE_MASK: u32 = (1 << 14) - 1;

/// Encode an ioctl number.
#[must_use]
pub const fn ioc(direction: u32, ty: u8, nr: u8, size: usize) -> u32 {
    #[allow(clippy::cast_possible_truncation)]
    let size = (size as u32) & SIZE_MASK;
    (direction << DIR_SHIFT) | (size << SIZE_SHIFT) | ((ty as u32) << TYPE_SHIFT) | ((nr as u32) << NR_SHIFT)
}

/// Type byte of an ioctl number.
#[must_use]
pub const fn ioc_type(cmd: u32) -> u8 {
    ((cmd >> TYPE_SHIFT) & 0xff) as u8
}

/// Command number of an ioctl number.
#[must_use]
pub const fn ioc_nr(cmd: u32) -> u8 {
    ((cmd >> NR_SHIFT) & 0xff) as u8
}

/// Argument size of an ioctl number.
#[must_use]
pub const fn ioc_size(cmd: u32) -> usize {
    ((cmd >> SIZE_SHIFT) & SIZE_MASK) as usize
}

/// Direction of an ioctl number.
#[must_use]
pub const fn ioc_dir(cmd: u32) -> u32 {
    cmd >> DIR_SHIFT
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_matches_linux_macros() {
        // _IOW('t', 2, 16 bytes)
        assert_eq!(ioc(dir::WRITE, IOCTL_TYPE, nr::REG_WRITE, 16), 0x4010_7402);
        // _IOWR('t', 3, 16 bytes)
        assert_eq!(
            ioc(dir::READ | dir::WRITE, IOCTL_TYPE, nr::REG_READ, 16),
            0xc010_7403
        );
        // _IOR('t', 1, 16 bytes)
        assert_eq!(ioc(dir::READ, IOCTL_TYPE, nr::SETTINGS, 16), 0x8010_7401);
    }

    #[test]
    fn decode_fields() {
        let cmd = ioc(dir::READ, IOCTL_TYPE, nr::STREAM_DEV, 48);
        assert_eq!(ioc_type(cmd), b't');
        assert_eq!(ioc_nr(cmd), nr::STREAM_DEV);
        assert_eq!(ioc_size(cmd), 48);
        assert_eq!(ioc_dir(cmd), dir::READ);
    }
}

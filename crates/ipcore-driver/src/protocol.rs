//! Request/response protocol of the command surface
//!
//! Requests arrive either as typed calls on [`crate::DeviceHandle`] or as an
//! ioctl number plus argument bytes. The argument layouts are fixed
//! `#[repr(C)]` records:
//!
//! ```text
//! RegAccess        offset: u64 | value: u32 | reserved: u32      16 bytes
//! SettingsRecord   base_phys: u64 | span: u64                    16 bytes
//! SubDeviceRecord  dev_name: [u8; 20] | layer: i32               24 bytes
//! ```
//!
//! All fields are native-endian. Only the direct offset/value register shape
//! is decoded.

use crate::device::SubDeviceRef;
use crate::error::{IpcoreError, Result};
use bytemuck::{Pod, Zeroable};
use bytes::{BufMut, Bytes, BytesMut};
use ipcore_chip::uapi::{self, dir, nr, IOCTL_TYPE, MAX_SUB_DEVICES, SUB_DEVICE_NAME_LEN};
use std::mem::size_of;

/// Register read/write argument
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct RegAccess {
    /// Register id (word address)
    pub offset: u64,
    /// Value written, or value read back
    pub value: u32,
    /// Zero
    pub reserved: u32,
}

/// Settings argument
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct SettingsRecord {
    /// Physical base address of the register window
    pub base_phys: u64,
    /// Window length in bytes
    pub span: u64,
}

/// One entry of the sub-device list
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct SubDeviceRecord {
    /// NUL-padded device name
    pub dev_name: [u8; SUB_DEVICE_NAME_LEN],
    /// Protocol layer
    pub layer: i32,
}

impl SubDeviceRecord {
    /// Name up to the first NUL
    #[must_use]
    pub fn name(&self) -> String {
        let end = self
            .dev_name
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(SUB_DEVICE_NAME_LEN);
        String::from_utf8_lossy(&self.dev_name[..end]).into_owned()
    }
}

impl From<&SubDeviceRef> for SubDeviceRecord {
    fn from(sub: &SubDeviceRef) -> Self {
        let mut record = Self {
            layer: sub.layer(),
            ..Self::default()
        };
        let name = sub.name().as_bytes();
        record.dev_name[..name.len()].copy_from_slice(name);
        record
    }
}

/// ioctl numbers
pub mod cmd {
    use super::{dir, nr, size_of, uapi, RegAccess, SettingsRecord, SubDeviceRecord};
    use super::{IOCTL_TYPE, MAX_SUB_DEVICES};

    /// Read the window settings
    pub const SETTINGS: u32 = uapi::ioc(dir::READ, IOCTL_TYPE, nr::SETTINGS, size_of::<SettingsRecord>());
    /// Write one register
    pub const REG_WRITE: u32 = uapi::ioc(dir::WRITE, IOCTL_TYPE, nr::REG_WRITE, size_of::<RegAccess>());
    /// Read one register
    pub const REG_READ: u32 =
        uapi::ioc(dir::READ | dir::WRITE, IOCTL_TYPE, nr::REG_READ, size_of::<RegAccess>());
    /// List connected sub-devices
    pub const STREAM_DEV: u32 = uapi::ioc(
        dir::READ,
        IOCTL_TYPE,
        nr::STREAM_DEV,
        MAX_SUB_DEVICES * size_of::<SubDeviceRecord>(),
    );
    /// Count connected sub-devices
    pub const STREAM_DEV_COUNT: u32 =
        uapi::ioc(dir::READ, IOCTL_TYPE, nr::STREAM_DEV_COUNT, size_of::<i32>());
}

/// Window settings of a device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceSettings {
    /// Physical base address
    pub base_physical_address: u64,
    /// Window length in bytes
    pub region_span: u64,
}

/// One command surface operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    /// Read register `id`
    ReadRegister {
        /// Register id
        id: u64,
    },
    /// Write `value` to register `id`
    WriteRegister {
        /// Register id
        id: u64,
        /// Value
        value: u32,
    },
    /// Window base and span
    GetSettings,
    /// Block until status is pending and consume it
    WaitForInterrupt,
    /// Connected sub-devices
    ListSubDevices,
    /// Number of connected sub-devices
    SubDeviceCount,
    /// Log bytes, touch no hardware
    DebugEcho(Bytes),
}

impl Request {
    /// Decode an ioctl number and its argument
    ///
    /// # Errors
    ///
    /// - `InvalidCommand` for a foreign type byte or unknown number
    /// - `InvalidPayload` if `arg` is shorter than the command's record
    pub fn from_ioctl(cmd: u32, arg: &[u8]) -> Result<Self> {
        if uapi::ioc_type(cmd) != IOCTL_TYPE {
            tracing::warn!("ioctl {cmd:#010x}: invalid type {:#04x}", uapi::ioc_type(cmd));
            return Err(IpcoreError::InvalidCommand { cmd });
        }

        // direction and size bits depend on the caller's header, only the
        // number selects the command
        match uapi::ioc_nr(cmd) {
            nr::SETTINGS => Ok(Self::GetSettings),
            nr::REG_READ => {
                let access = decode::<RegAccess>(arg)?;
                Ok(Self::ReadRegister { id: access.offset })
            }
            nr::REG_WRITE => {
                let access = decode::<RegAccess>(arg)?;
                Ok(Self::WriteRegister {
                    id: access.offset,
                    value: access.value,
                })
            }
            nr::STREAM_DEV => Ok(Self::ListSubDevices),
            nr::STREAM_DEV_COUNT => Ok(Self::SubDeviceCount),
            number => {
                tracing::warn!(
                    "ioctl {cmd:#010x}: unknown command {number} (dir {}, size {})",
                    uapi::ioc_dir(cmd),
                    uapi::ioc_size(cmd)
                );
                Err(IpcoreError::InvalidCommand { cmd })
            }
        }
    }
}

fn decode<T: Pod>(arg: &[u8]) -> Result<T> {
    let size = size_of::<T>();
    if arg.len() < size {
        return Err(IpcoreError::InvalidPayload {
            expected: size,
            actual: arg.len(),
        });
    }
    Ok(bytemuck::pod_read_unaligned(&arg[..size]))
}

/// Result of one request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    /// Value read from register `id`
    Register {
        /// Register id
        id: u64,
        /// Value read
        value: u32,
    },
    /// Register written
    Written,
    /// Window settings
    Settings(DeviceSettings),
    /// Consumed interrupt status
    Status(u32),
    /// Connected sub-devices
    SubDevices(Vec<SubDeviceRef>),
    /// Number of connected sub-devices
    Count(usize),
    /// Echoed byte count
    Consumed(usize),
}

impl Response {
    /// Output payload in wire layout
    #[must_use]
    pub fn to_bytes(&self) -> Bytes {
        let mut out = BytesMut::new();
        match self {
            Self::Register { id, value } => out.put_slice(bytemuck::bytes_of(&RegAccess {
                offset: *id,
                value: *value,
                reserved: 0,
            })),
            Self::Written | Self::Consumed(_) => {}
            Self::Settings(settings) => out.put_slice(bytemuck::bytes_of(&SettingsRecord {
                base_phys: settings.base_physical_address,
                span: settings.region_span,
            })),
            Self::Status(status) => out.put_u32_ne(*status),
            Self::SubDevices(subs) => {
                for sub in subs.iter().take(MAX_SUB_DEVICES) {
                    out.put_slice(bytemuck::bytes_of(&SubDeviceRecord::from(sub)));
                }
            }
            Self::Count(n) => out.put_i32_ne(i32::try_from(*n).unwrap_or(i32::MAX)),
        }
        out.freeze()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_layouts() {
        assert_eq!(size_of::<RegAccess>(), 16);
        assert_eq!(size_of::<SettingsRecord>(), 16);
        assert_eq!(size_of::<SubDeviceRecord>(), 24);
    }

    #[test]
    fn ioctl_numbers() {
        assert_eq!(cmd::SETTINGS, 0x8010_7401);
        assert_eq!(cmd::REG_WRITE, 0x4010_7402);
        assert_eq!(cmd::REG_READ, 0xc010_7403);
        assert_eq!(cmd::STREAM_DEV, 0x8030_7404);
        assert_eq!(cmd::STREAM_DEV_COUNT, 0x8004_7405);
    }

    #[test]
    fn decodes_register_write() {
        let arg = RegAccess {
            offset: 0x12,
            value: 0xcafe,
            reserved: 0,
        };
        let request = Request::from_ioctl(cmd::REG_WRITE, bytemuck::bytes_of(&arg)).unwrap();
        assert_eq!(request, Request::WriteRegister { id: 0x12, value: 0xcafe });
    }

    #[test]
    fn foreign_type_is_invalid() {
        let foreign = uapi::ioc(dir::READ, b'x', nr::SETTINGS, 16);
        assert!(matches!(
            Request::from_ioctl(foreign, &[]),
            Err(IpcoreError::InvalidCommand { .. })
        ));
        let unknown = uapi::ioc(dir::NONE, IOCTL_TYPE, 0x7f, 0);
        assert!(matches!(
            Request::from_ioctl(unknown, &[]),
            Err(IpcoreError::InvalidCommand { .. })
        ));
    }

    #[test]
    fn command_number_selects_request_whatever_the_size_field() {
        // _IOR('t', 1, 8 bytes), as a 32-bit header encodes SETTINGS
        let narrow = uapi::ioc(dir::READ, IOCTL_TYPE, nr::SETTINGS, 8);
        assert_eq!(Request::from_ioctl(narrow, &[]).unwrap(), Request::GetSettings);

        let arg = RegAccess {
            offset: 0x3,
            value: 0,
            reserved: 0,
        };
        let no_dir = uapi::ioc(dir::NONE, IOCTL_TYPE, nr::REG_READ, 12);
        assert_eq!(
            Request::from_ioctl(no_dir, bytemuck::bytes_of(&arg)).unwrap(),
            Request::ReadRegister { id: 0x3 }
        );

        let count = uapi::ioc(dir::READ, IOCTL_TYPE, nr::STREAM_DEV_COUNT, 8);
        assert_eq!(Request::from_ioctl(count, &[]).unwrap(), Request::SubDeviceCount);
    }

    #[test]
    fn short_argument_is_invalid_payload() {
        assert!(matches!(
            Request::from_ioctl(cmd::REG_READ, &[0; 8]),
            Err(IpcoreError::InvalidPayload { expected: 16, actual: 8 })
        ));
    }

    #[test]
    fn sub_device_list_holds_connected_entries_only() {
        let subs = vec![SubDeviceRef::new("hdmi0", 2), SubDeviceRef::new("lvds1", 0)];
        let bytes = Response::SubDevices(subs).to_bytes();
        assert_eq!(bytes.len(), 48);

        let first: SubDeviceRecord = bytemuck::pod_read_unaligned(&bytes[..24]);
        let second: SubDeviceRecord = bytemuck::pod_read_unaligned(&bytes[24..]);
        assert_eq!((first.name().as_str(), first.layer), ("hdmi0", 2));
        assert_eq!((second.name().as_str(), second.layer), ("lvds1", 0));

        assert!(Response::SubDevices(Vec::new()).to_bytes().is_empty());
    }

    #[test]
    fn full_length_name_has_no_terminator() {
        let sub = SubDeviceRef::new("abcdefghijklmnopqrst", 0);
        assert_eq!(SubDeviceRecord::from(&sub).name(), "abcdefghijklmnopqrst");
    }
}

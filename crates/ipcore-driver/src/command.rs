//! Command surface of an attached device
//!
//! A [`DeviceHandle`] is what opening an endpoint yields. Every call checks
//! the lifecycle state first and fails with `DeviceGone` once detach has
//! begun. Caller-supplied register ids are range-checked before any bus
//! access.
//!
//! Raw register access is not serialized against the interrupt handler;
//! touching the status or clear registers while interrupts are live races
//! with the handler exactly as it would in hardware.

use crate::device::{Device, SubDeviceRef};
use crate::error::{IpcoreError, Result};
use crate::lifecycle::window_registers;
use crate::mmio;
use crate::protocol::{DeviceSettings, Request, Response};
use bytes::Bytes;
use ipcore_chip::regs;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Bytes per line of echoed data
const ECHO_CHUNK: usize = 32;

/// Open handle to an attached device
#[derive(Debug, Clone)]
pub struct DeviceHandle {
    device: Arc<Device>,
}

impl DeviceHandle {
    pub(crate) const fn new(device: Arc<Device>) -> Self {
        Self { device }
    }

    /// Device this handle was opened on
    #[must_use]
    pub fn device(&self) -> &Device {
        &self.device
    }

    fn checked_id(&self, id: u64) -> Result<u32> {
        let limit = window_registers(&self.device);
        if !regs::in_window(id, self.device.region_span()) {
            return Err(IpcoreError::OutOfRange { id, limit });
        }
        u32::try_from(id).map_err(|_| IpcoreError::OutOfRange { id, limit })
    }

    /// Read register `id`
    ///
    /// # Errors
    ///
    /// - `DeviceGone` after detach has begun
    /// - `OutOfRange` if `id` is outside the window (no bus access)
    pub fn read_register(&self, id: u64) -> Result<u32> {
        self.device.ensure_attached()?;
        let id = self.checked_id(id)?;
        self.device.with_registers(|r| mmio::read(r, id))
    }

    /// Write `value` to register `id`
    ///
    /// # Errors
    ///
    /// As [`Self::read_register`].
    pub fn write_register(&self, id: u64, value: u32) -> Result<()> {
        self.device.ensure_attached()?;
        let id = self.checked_id(id)?;
        self.device.with_registers(|r| mmio::write(r, id, value))
    }

    /// Window base address and span
    ///
    /// # Errors
    ///
    /// `DeviceGone` after detach has begun.
    pub fn get_settings(&self) -> Result<DeviceSettings> {
        self.device.ensure_attached()?;
        Ok(DeviceSettings {
            base_physical_address: self.device.base_physical_address(),
            region_span: self.device.region_span(),
        })
    }

    /// Block until interrupt status is pending, then consume all of it
    ///
    /// Concurrent waiters race; exactly one receives a given status word.
    ///
    /// # Errors
    ///
    /// `DeviceGone` if the device is detached before or during the wait.
    pub fn wait_for_interrupt(&self) -> Result<u32> {
        self.device.ensure_attached()?;
        self.device.take_status()
    }

    /// As [`Self::wait_for_interrupt`], returning `None` after `timeout`
    ///
    /// # Errors
    ///
    /// `DeviceGone` if the device is detached before or during the wait.
    pub fn wait_for_interrupt_timeout(&self, timeout: Duration) -> Result<Option<u32>> {
        self.device.ensure_attached()?;
        self.device.take_status_timeout(timeout)
    }

    /// Connected sub-devices, in attach order
    ///
    /// # Errors
    ///
    /// `DeviceGone` after detach has begun.
    pub fn list_sub_devices(&self) -> Result<Vec<SubDeviceRef>> {
        self.device.ensure_attached()?;
        Ok(self.device.sub_devices().to_vec())
    }

    /// Number of connected sub-devices
    ///
    /// # Errors
    ///
    /// `DeviceGone` after detach has begun.
    pub fn sub_device_count(&self) -> Result<usize> {
        self.device.ensure_attached()?;
        Ok(self.device.sub_devices().len())
    }

    /// Log `data` and report it consumed; touches no hardware
    ///
    /// # Errors
    ///
    /// `DeviceGone` after detach has begun.
    pub fn debug_echo(&self, data: &[u8]) -> Result<usize> {
        self.device.ensure_attached()?;
        let name = self.device.endpoint_name();
        warn!("{name}: write is not supported, logging {} bytes", data.len());
        for (n, chunk) in data.chunks(ECHO_CHUNK).enumerate() {
            info!("{name}: [{:04x}] {}", n * ECHO_CHUNK, String::from_utf8_lossy(chunk));
        }
        Ok(data.len())
    }

    /// Execute one request
    ///
    /// # Errors
    ///
    /// Whatever the underlying operation returns.
    pub fn execute(&self, request: Request) -> Result<Response> {
        match request {
            Request::ReadRegister { id } => Ok(Response::Register {
                id,
                value: self.read_register(id)?,
            }),
            Request::WriteRegister { id, value } => {
                self.write_register(id, value)?;
                Ok(Response::Written)
            }
            Request::GetSettings => self.get_settings().map(Response::Settings),
            Request::WaitForInterrupt => self.wait_for_interrupt().map(Response::Status),
            Request::ListSubDevices => self.list_sub_devices().map(Response::SubDevices),
            Request::SubDeviceCount => self.sub_device_count().map(Response::Count),
            Request::DebugEcho(data) => self.debug_echo(&data).map(Response::Consumed),
        }
    }

    /// File-style read: wait for an interrupt and return its status
    ///
    /// Every read waits for and consumes the pending status. A 4-byte
    /// buffer receives it native-endian and 4 is returned; any other size
    /// discards it and returns 0.
    ///
    /// # Errors
    ///
    /// `DeviceGone` if the device is detached before or during the wait.
    pub fn read(&self, buf: &mut [u8]) -> Result<usize> {
        let bytes = self.execute(Request::WaitForInterrupt)?.to_bytes();
        let len = buf.len();
        match <&mut [u8; 4]>::try_from(buf) {
            Ok(out) => {
                out.copy_from_slice(&bytes);
                Ok(out.len())
            }
            Err(_) => {
                tracing::debug!(
                    "{}: {len}-byte read discards status",
                    self.device.endpoint_name()
                );
                Ok(0)
            }
        }
    }

    /// File-style write: [`Self::debug_echo`]
    ///
    /// # Errors
    ///
    /// `DeviceGone` after detach has begun.
    pub fn write(&self, data: &[u8]) -> Result<usize> {
        match self.execute(Request::DebugEcho(Bytes::copy_from_slice(data)))? {
            Response::Consumed(n) => Ok(n),
            _ => Ok(0),
        }
    }

    /// ioctl entry point: decode, execute, copy the response into `arg`
    ///
    /// Returns the number of bytes written back.
    ///
    /// # Errors
    ///
    /// - `InvalidCommand` / `InvalidPayload` from decoding
    /// - `InvalidPayload` if `arg` cannot hold the response
    /// - whatever the operation returns
    pub fn ioctl(&self, cmd: u32, arg: &mut [u8]) -> Result<usize> {
        let request = Request::from_ioctl(cmd, arg)?;
        let out = self.execute(request)?.to_bytes();
        let actual = arg.len();
        let dst = arg.get_mut(..out.len()).ok_or(IpcoreError::InvalidPayload {
            expected: out.len(),
            actual,
        })?;
        dst.copy_from_slice(&out);
        Ok(out.len())
    }
}

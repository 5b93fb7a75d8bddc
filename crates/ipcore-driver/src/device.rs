//! Attached IP core record
//!
//! A [`Device`] is created by [`crate::lifecycle::attach`] and shared (via
//! `Arc`) by the registry, the interrupt handler and every open
//! [`crate::DeviceHandle`]. Its mutable state is:
//!
//! - `state`: the lifecycle state, an atomic read on every command
//! - `regs`: the register window, `Some` exactly while attached
//! - `status`: pending interrupt bits, guarded by the status lock and paired
//!   with the `wake` condition variable
//!
//! The status lock is held only for a read-modify-write of the pending word,
//! never across a wait (the condition variable releases it).

use crate::error::{IpcoreError, Result};
use crate::mmio::RegisterIo;
use crate::platform::{InterruptLine, ResourceDescriptor};
use ipcore_chip::uapi::{MAX_SUB_DEVICES, SUB_DEVICE_NAME_LEN};
use ipcore_chip::PlatformDescriptor;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard};
use std::time::{Duration, Instant};

/// Lifecycle state of a device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum DeviceState {
    /// Not yet attached
    Unattached = 0,
    /// Resources being acquired
    Attaching = 1,
    /// Fully operational
    Attached = 2,
    /// Resources being released; commands are rejected
    Detaching = 3,
    /// Detached
    Gone = 4,
}

impl DeviceState {
    const fn from_u8(raw: u8) -> Self {
        match raw {
            0 => Self::Unattached,
            1 => Self::Attaching,
            2 => Self::Attached,
            3 => Self::Detaching,
            _ => Self::Gone,
        }
    }
}

/// Streaming sub-device connected to a core
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubDeviceRef {
    name: String,
    layer: i32,
}

impl SubDeviceRef {
    /// Create a reference; names longer than 20 bytes are truncated at a
    /// character boundary
    pub fn new(name: impl Into<String>, layer: i32) -> Self {
        let mut name = name.into();
        if name.len() > SUB_DEVICE_NAME_LEN {
            let mut end = SUB_DEVICE_NAME_LEN;
            while !name.is_char_boundary(end) {
                end -= 1;
            }
            tracing::warn!("Sub-device name {name:?} truncated to {SUB_DEVICE_NAME_LEN} bytes");
            name.truncate(end);
        }
        Self { name, layer }
    }

    /// Device name
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Protocol layer
    #[must_use]
    pub const fn layer(&self) -> i32 {
        self.layer
    }
}

#[derive(Debug, Default)]
struct StatusWord {
    /// Accumulated, not yet consumed interrupt bits
    pending: u32,
    /// Set by detach; wakes every waiter with `DeviceGone`
    cancelled: bool,
}

/// One attached IP core
#[derive(Debug)]
pub struct Device {
    index: usize,
    descriptor: &'static PlatformDescriptor,
    base: u64,
    span: u64,
    irq: InterruptLine,
    endpoint: String,
    sub_devices: Vec<SubDeviceRef>,
    state: AtomicU8,
    regs: RwLock<Option<Box<dyn RegisterIo>>>,
    status: Mutex<StatusWord>,
    wake: Condvar,
}

impl Device {
    pub(crate) fn new(
        index: usize,
        descriptor: &'static PlatformDescriptor,
        resource: ResourceDescriptor,
        endpoint: String,
        regs: Box<dyn RegisterIo>,
    ) -> Self {
        let mut sub_devices = resource.sub_devices;
        if sub_devices.len() > MAX_SUB_DEVICES {
            tracing::warn!(
                "{endpoint}: {} sub-devices connected, keeping the first {MAX_SUB_DEVICES}",
                sub_devices.len()
            );
            sub_devices.truncate(MAX_SUB_DEVICES);
        }

        Self {
            index,
            descriptor,
            base: resource.base,
            span: resource.span,
            irq: resource.irq,
            endpoint,
            sub_devices,
            state: AtomicU8::new(DeviceState::Attaching as u8),
            regs: RwLock::new(Some(regs)),
            status: Mutex::new(StatusWord::default()),
            wake: Condvar::new(),
        }
    }

    /// Registry index (minor number)
    #[must_use]
    pub const fn index(&self) -> usize {
        self.index
    }

    /// Platform descriptor of this variant
    #[must_use]
    pub const fn descriptor(&self) -> &'static PlatformDescriptor {
        self.descriptor
    }

    /// Physical base address of the register window
    #[must_use]
    pub const fn base_physical_address(&self) -> u64 {
        self.base
    }

    /// Register window length in bytes
    #[must_use]
    pub const fn region_span(&self) -> u64 {
        self.span
    }

    /// Interrupt line
    #[must_use]
    pub const fn interrupt_line(&self) -> InterruptLine {
        self.irq
    }

    /// User-visible endpoint name
    #[must_use]
    pub fn endpoint_name(&self) -> &str {
        &self.endpoint
    }

    /// Connected sub-devices, in attach order
    #[must_use]
    pub fn sub_devices(&self) -> &[SubDeviceRef] {
        &self.sub_devices
    }

    /// Current lifecycle state
    #[must_use]
    pub fn state(&self) -> DeviceState {
        DeviceState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Pending interrupt bits, without consuming them
    #[must_use]
    pub fn pending_status(&self) -> u32 {
        self.lock_status().pending
    }

    pub(crate) fn set_state(&self, state: DeviceState) {
        self.state.store(state as u8, Ordering::Release);
    }

    /// Move `from` → `to`; fails if another transition got there first
    pub(crate) fn transition(&self, from: DeviceState, to: DeviceState) -> bool {
        self.state
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub(crate) fn ensure_attached(&self) -> Result<()> {
        match self.state() {
            DeviceState::Attached => Ok(()),
            _ => Err(IpcoreError::DeviceGone),
        }
    }

    /// Read access to the register window (`None` once released)
    pub(crate) fn registers(&self) -> RwLockReadGuard<'_, Option<Box<dyn RegisterIo>>> {
        self.regs.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run `f` against the register window of an attached device
    pub(crate) fn with_registers<R>(&self, f: impl FnOnce(&dyn RegisterIo) -> R) -> Result<R> {
        self.ensure_attached()?;
        let guard = self.registers();
        let regs = guard.as_deref().ok_or(IpcoreError::DeviceGone)?;
        Ok(f(regs))
    }

    /// Take the register window out for release
    pub(crate) fn release_registers(&self) -> Option<Box<dyn RegisterIo>> {
        self.regs
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    fn lock_status(&self) -> MutexGuard<'_, StatusWord> {
        self.status.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Merge `status` into the pending word and wake every waiter
    pub(crate) fn post_status(&self, status: u32) {
        {
            let mut word = self.lock_status();
            word.pending |= status;
        }
        self.wake.notify_all();
    }

    /// Block until status is pending, then consume it
    pub(crate) fn take_status(&self) -> Result<u32> {
        let mut word = self.lock_status();
        loop {
            if let Some(result) = Self::try_take(&mut word) {
                return result;
            }
            word = self.wake.wait(word).unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// As [`Self::take_status`], giving up after `timeout`
    ///
    /// A timeout past the representable instants waits without bound.
    pub(crate) fn take_status_timeout(&self, timeout: Duration) -> Result<Option<u32>> {
        let Some(deadline) = Instant::now().checked_add(timeout) else {
            return self.take_status().map(Some);
        };
        let mut word = self.lock_status();
        loop {
            if let Some(result) = Self::try_take(&mut word) {
                return result.map(Some);
            }
            let now = Instant::now();
            if now >= deadline {
                return Ok(None);
            }
            word = self
                .wake
                .wait_timeout(word, deadline - now)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
    }

    fn try_take(word: &mut StatusWord) -> Option<Result<u32>> {
        if word.cancelled {
            return Some(Err(IpcoreError::DeviceGone));
        }
        if word.pending != 0 {
            return Some(Ok(std::mem::take(&mut word.pending)));
        }
        None
    }

    /// Fail every current and future waiter with `DeviceGone`
    pub(crate) fn cancel_waiters(&self) {
        {
            let mut word = self.lock_status();
            word.cancelled = true;
        }
        self.wake.notify_all();
    }
}

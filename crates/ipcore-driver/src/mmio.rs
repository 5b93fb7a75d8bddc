//! Memory-mapped register access for TES IP cores
//!
//! [`read`] and [`write`] translate a register id (word address) into a byte
//! offset and perform exactly one 32-bit bus access. They do no bounds
//! checking: the driver's own register ids come from the catalog, and
//! caller-supplied ids are range-checked by the command surface first.
//!
//! [`MappedRegion`] is the hardware window, mapped from `/dev/mem` with
//! `O_SYNC` so the kernel maps it uncached.

// MMIO registers are naturally aligned by hardware, so pointer casts are safe
#![allow(clippy::cast_ptr_alignment)]
#![allow(clippy::cast_possible_truncation)]

use crate::error::{IpcoreError, Result};
use ipcore_chip::regs;
use rustix::fs::OFlags;
use rustix::mm::{mmap, munmap, MapFlags, ProtFlags};
use std::fmt::Debug;
use std::fs::{File, OpenOptions};
use std::os::unix::fs::OpenOptionsExt;
use std::os::unix::io::AsFd;
use std::path::Path;
use std::ptr::NonNull;

/// A window of 32-bit registers on some bus
///
/// Implementations must perform one volatile access per call, in call order.
pub trait RegisterIo: Debug + Send + Sync {
    /// Read the register at `offset` bytes
    fn read32(&self, offset: usize) -> u32;

    /// Write the register at `offset` bytes
    fn write32(&self, offset: usize, value: u32);

    /// Window length in bytes
    fn len(&self) -> usize;

    /// Whether the window is empty
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T: RegisterIo + ?Sized> RegisterIo for std::sync::Arc<T> {
    fn read32(&self, offset: usize) -> u32 {
        (**self).read32(offset)
    }

    fn write32(&self, offset: usize, value: u32) {
        (**self).write32(offset, value);
    }

    fn len(&self) -> usize {
        (**self).len()
    }
}

/// Read register `id` (word address)
#[inline]
pub fn read(region: &dyn RegisterIo, id: u32) -> u32 {
    let value = region.read32(regs::byte_offset(id));
    tracing::trace!("Read reg {id:#x} = {value:#010x}");
    value
}

/// Write register `id` (word address)
#[inline]
pub fn write(region: &dyn RegisterIo, id: u32, value: u32) {
    tracing::trace!("Write reg {id:#x} = {value:#010x}");
    region.write32(regs::byte_offset(id), value);
}

/// Physical register window mapped through `/dev/mem`
pub struct MappedRegion {
    /// Start of the page-aligned mapping
    map: NonNull<u8>,
    /// Length of the page-aligned mapping
    map_len: usize,
    /// Offset of the register window inside the mapping
    page_offset: usize,
    /// Register window length
    len: usize,
    /// Physical base address of the window
    phys: u64,
    _file: File,
}

impl std::fmt::Debug for MappedRegion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MappedRegion")
            .field("phys", &format_args!("{:#x}", self.phys))
            .field("len", &format_args!("{:#x}", self.len))
            .field("map", &format_args!("{:p}", self.map))
            .finish_non_exhaustive()
    }
}

// SAFETY: Send - MappedRegion owns the mapping exclusively. Moving between threads
// doesn't invalidate it (mmap'd memory is process-wide). No thread-local state.
unsafe impl Send for MappedRegion {}

// SAFETY: Sync - every access is a single volatile 32-bit load or store; the
// hardware serialises concurrent bus accesses. No other interior state is mutated.
unsafe impl Sync for MappedRegion {}

impl MappedRegion {
    /// Map `len` bytes of physical memory at `phys`
    ///
    /// # Errors
    ///
    /// Returns `ResourceUnavailable` if:
    /// - `len` is zero
    /// - the memory device cannot be opened (usually missing `CAP_SYS_RAWIO`)
    /// - `mmap` fails
    pub fn map_physical(dev_mem: &Path, phys: u64, len: usize) -> Result<Self> {
        if len == 0 {
            return Err(IpcoreError::resource_unavailable(format!(
                "Zero-length register window at {phys:#x}"
            )));
        }

        // O_SYNC on /dev/mem selects an uncached mapping
        #[allow(clippy::cast_possible_wrap)]
        let sync_flag = OFlags::SYNC.bits() as i32;

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .custom_flags(sync_flag)
            .open(dev_mem)
            .map_err(|e| {
                IpcoreError::resource_unavailable(format!(
                    "Cannot open {}: {e}",
                    dev_mem.display()
                ))
            })?;

        let page = rustix::param::page_size() as u64;
        let aligned = phys & !(page - 1);
        let page_offset = (phys - aligned) as usize;
        let map_len = (page_offset + len).next_multiple_of(page as usize);

        // SAFETY: mmap necessary for MMIO - maps the physical window into the process.
        // Invariants: (1) file is an open /dev/mem fd kept alive in the struct;
        // (2) offset is page-aligned; (3) map_len is non-zero and page-rounded;
        // (4) returned pointer is valid for map_len bytes or we return Err.
        let ptr = unsafe {
            mmap(
                std::ptr::null_mut(),
                map_len,
                ProtFlags::READ | ProtFlags::WRITE,
                MapFlags::SHARED,
                file.as_fd(),
                aligned,
            )
            .map_err(|e| {
                IpcoreError::resource_unavailable(format!(
                    "mmap of {len:#x} bytes at {phys:#x} failed: {e}"
                ))
            })?
        };

        let map = NonNull::new(ptr.cast::<u8>()).ok_or_else(|| {
            IpcoreError::resource_unavailable(format!("mmap at {phys:#x} returned null"))
        })?;

        tracing::debug!("Mapped IO from {phys:#x} to {map:p} (+{page_offset:#x}), {len:#x} bytes");

        Ok(Self {
            map,
            map_len,
            page_offset,
            len,
            phys,
            _file: file,
        })
    }

    /// Physical base address
    #[must_use]
    pub const fn phys(&self) -> u64 {
        self.phys
    }

    fn register_ptr(&self, offset: usize) -> *mut u32 {
        debug_assert!(
            offset + regs::REG_WIDTH <= self.len,
            "register offset {offset:#x} outside {:#x}-byte window",
            self.len
        );
        // SAFETY: page_offset + offset stays inside the mapping as long as the caller
        // honours the window length (checked in debug builds above).
        unsafe { self.map.as_ptr().add(self.page_offset + offset).cast::<u32>() }
    }
}

impl RegisterIo for MappedRegion {
    fn read32(&self, offset: usize) -> u32 {
        // SAFETY: read_volatile necessary for MMIO - hardware can change value.
        // Invariants: (1) pointer from mmap, valid for map_len; (2) u32 aligned;
        // (3) caller keeps offset + 4 <= len.
        unsafe { std::ptr::read_volatile(self.register_ptr(offset)) }
    }

    fn write32(&self, offset: usize, value: u32) {
        // SAFETY: write_volatile necessary for MMIO - triggers hardware side effects.
        // Invariants as for read32.
        unsafe { std::ptr::write_volatile(self.register_ptr(offset), value) }
    }

    fn len(&self) -> usize {
        self.len
    }
}

impl Drop for MappedRegion {
    fn drop(&mut self) {
        // SAFETY: munmap necessary - releases the mapping created in map_physical.
        // Invariants: (1) map/map_len are exactly what mmap returned/was given;
        // (2) Drop runs at most once; (3) no references outlive self.
        unsafe {
            if let Err(e) = munmap(self.map.as_ptr().cast(), self.map_len) {
                tracing::error!("munmap of {:#x} failed during drop: {e}", self.phys);
            }
        }
        tracing::debug!("Unmapped register window at {:#x}", self.phys);
    }
}

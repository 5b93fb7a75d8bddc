//! Simulated platform
//!
//! Register files backed by atomics, interrupts raised from software. This
//! lets every lifecycle and dispatch path run without hardware:
//!
//! ```text
//! install(base, span) ──▶ SimulatedRegisters ◀── map(base, span)
//!                              ▲ peek/poke (no bus access counted)
//! raise(line) ──▶ bound IrqHandler ──▶ irq::dispatch ──▶ read32/write32
//! ```
//!
//! `raise` runs the handler on the calling thread while holding the line
//! table lock, so `free` waits for an in-flight handler the way the kernel's
//! `free_irq` does.

use crate::backends::EndpointTable;
use crate::error::{IpcoreError, Result};
use crate::mmio::RegisterIo;
use crate::platform::{
    EndpointNamer, InterruptController, InterruptLine, IrqHandler, MemoryMapper, PlatformServices,
};
use ipcore_chip::regs;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, trace};

/// Value read from outside the register file, like an undecoded bus address
pub const BUS_FLOAT: u32 = 0xffff_ffff;

const NO_ACCESS: usize = usize::MAX;

/// In-memory register file with bus access counters
#[derive(Debug)]
pub struct SimulatedRegisters {
    words: Vec<AtomicU32>,
    reads: AtomicUsize,
    writes: AtomicUsize,
    last_offset: AtomicUsize,
}

impl SimulatedRegisters {
    /// Zeroed register file covering `span` bytes
    #[must_use]
    pub fn new(span: usize) -> Self {
        Self {
            words: (0..span / regs::REG_WIDTH).map(|_| AtomicU32::new(0)).collect(),
            reads: AtomicUsize::new(0),
            writes: AtomicUsize::new(0),
            last_offset: AtomicUsize::new(NO_ACCESS),
        }
    }

    /// Back-door read of register `id`; not counted as a bus access
    ///
    /// # Panics
    ///
    /// Panics if `id` is outside the register file.
    #[must_use]
    pub fn peek(&self, id: u32) -> u32 {
        self.words[id as usize].load(Ordering::SeqCst)
    }

    /// Back-door write of register `id`; not counted as a bus access
    ///
    /// # Panics
    ///
    /// Panics if `id` is outside the register file.
    pub fn poke(&self, id: u32, value: u32) {
        self.words[id as usize].store(value, Ordering::SeqCst);
    }

    /// Bus reads so far
    #[must_use]
    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    /// Bus writes so far
    #[must_use]
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Byte offset of the most recent bus access
    #[must_use]
    pub fn last_offset(&self) -> Option<usize> {
        match self.last_offset.load(Ordering::SeqCst) {
            NO_ACCESS => None,
            offset => Some(offset),
        }
    }

    fn word(&self, offset: usize) -> Option<&AtomicU32> {
        self.last_offset.store(offset, Ordering::SeqCst);
        self.words.get(offset / regs::REG_WIDTH)
    }
}

impl RegisterIo for SimulatedRegisters {
    fn read32(&self, offset: usize) -> u32 {
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.word(offset)
            .map_or(BUS_FLOAT, |word| word.load(Ordering::SeqCst))
    }

    fn write32(&self, offset: usize, value: u32) {
        self.writes.fetch_add(1, Ordering::SeqCst);
        match self.word(offset) {
            Some(word) => word.store(value, Ordering::SeqCst),
            None => trace!("Write to {offset:#x} outside register file dropped"),
        }
    }

    fn len(&self) -> usize {
        self.words.len() * regs::REG_WIDTH
    }
}

struct BoundLine {
    label: &'static str,
    handler: IrqHandler,
}

impl std::fmt::Debug for BoundLine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoundLine")
            .field("label", &self.label)
            .finish_non_exhaustive()
    }
}

/// Software platform implementing every service
#[derive(Debug, Default)]
pub struct SimulatedPlatform {
    windows: Mutex<HashMap<u64, Arc<SimulatedRegisters>>>,
    lines: Mutex<HashMap<InterruptLine, BoundLine>>,
    failing_lines: Mutex<HashSet<InterruptLine>>,
    endpoints: EndpointTable,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl SimulatedPlatform {
    /// Empty platform
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Service bundle backed by this platform
    #[must_use]
    pub fn services(self: &Arc<Self>) -> PlatformServices {
        PlatformServices::from_shared(self)
    }

    /// Install a register file of `span` bytes at physical address `base`
    pub fn install(&self, base: u64, span: usize) -> Arc<SimulatedRegisters> {
        let regs = Arc::new(SimulatedRegisters::new(span));
        lock(&self.windows).insert(base, Arc::clone(&regs));
        debug!("Simulated register file at {base:#x}, {span:#x} bytes");
        regs
    }

    /// Make the next `request` for `line` fail
    pub fn fail_interrupt(&self, line: InterruptLine) {
        lock(&self.failing_lines).insert(line);
    }

    /// Fire `line`; returns `false` if no handler is bound
    pub fn raise(&self, line: InterruptLine) -> bool {
        let lines = lock(&self.lines);
        match lines.get(&line) {
            Some(bound) => {
                trace!("Raising irq {line} ({})", bound.label);
                (bound.handler)();
                true
            }
            None => false,
        }
    }

    /// Whether a handler is bound to `line`
    #[must_use]
    pub fn is_bound(&self, line: InterruptLine) -> bool {
        lock(&self.lines).contains_key(&line)
    }

    /// Endpoint table
    #[must_use]
    pub const fn endpoints(&self) -> &EndpointTable {
        &self.endpoints
    }
}

impl MemoryMapper for SimulatedPlatform {
    fn map(&self, base: u64, span: u64) -> Result<Box<dyn RegisterIo>> {
        let windows = lock(&self.windows);
        let regs = windows.get(&base).ok_or_else(|| {
            IpcoreError::resource_unavailable(format!("No register file at {base:#x}"))
        })?;
        if (regs.len() as u64) < span {
            return Err(IpcoreError::resource_unavailable(format!(
                "Register file at {base:#x} is {:#x} bytes, {span:#x} requested",
                regs.len()
            )));
        }
        Ok(Box::new(Arc::clone(regs)))
    }
}

impl InterruptController for SimulatedPlatform {
    fn request(&self, line: InterruptLine, label: &'static str, handler: IrqHandler) -> Result<()> {
        if lock(&self.failing_lines).remove(&line) {
            return Err(IpcoreError::resource_unavailable(format!(
                "Can't register irq {line}"
            )));
        }
        let mut lines = lock(&self.lines);
        if let Some(bound) = lines.get(&line) {
            return Err(IpcoreError::resource_unavailable(format!(
                "Irq {line} already bound to {}",
                bound.label
            )));
        }
        lines.insert(line, BoundLine { label, handler });
        debug!("Bound irq {line} to {label}");
        Ok(())
    }

    fn free(&self, line: InterruptLine) {
        if let Some(bound) = lock(&self.lines).remove(&line) {
            debug!("Freed irq {line} ({})", bound.label);
        }
    }
}

impl EndpointNamer for SimulatedPlatform {
    fn create(&self, index: usize, name: &str) -> Result<()> {
        self.endpoints.create(index, name)
    }

    fn destroy(&self, index: usize) {
        self.endpoints.destroy(index);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicBool;

    #[test]
    fn reads_outside_the_file_float_high() {
        let regs = SimulatedRegisters::new(0x10);
        assert_eq!(regs.read32(0x10), BUS_FLOAT);
        regs.write32(0x40, 1);
        assert_eq!((regs.reads(), regs.writes()), (1, 1));
    }

    #[test]
    fn map_requires_installed_window() {
        let platform = SimulatedPlatform::new();
        assert!(platform.map(0x1000, 0x100).is_err());
        platform.install(0x1000, 0x100);
        assert!(platform.map(0x1000, 0x100).is_ok());
        assert!(platform.map(0x1000, 0x200).is_err());
    }

    #[test]
    fn raise_runs_bound_handler() {
        let platform = SimulatedPlatform::new();
        let fired = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&fired);
        platform
            .request(InterruptLine(9), "test_irq", Arc::new(move || flag.store(true, Ordering::SeqCst)))
            .unwrap();

        assert!(platform.raise(InterruptLine(9)));
        assert!(fired.load(Ordering::SeqCst));

        platform.free(InterruptLine(9));
        assert!(!platform.raise(InterruptLine(9)));
    }

    #[test]
    fn line_binding_is_exclusive() {
        let platform = SimulatedPlatform::new();
        platform.request(InterruptLine(1), "a", Arc::new(|| {})).unwrap();
        assert!(platform.request(InterruptLine(1), "b", Arc::new(|| {})).is_err());
    }

    #[test]
    fn injected_failure_is_one_shot() {
        let platform = SimulatedPlatform::new();
        platform.fail_interrupt(InterruptLine(2));
        assert!(platform.request(InterruptLine(2), "a", Arc::new(|| {})).is_err());
        assert!(platform.request(InterruptLine(2), "a", Arc::new(|| {})).is_ok());
    }
}

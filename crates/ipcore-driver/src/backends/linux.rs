//! Linux userspace platform
//!
//! Register windows come from `/dev/mem`, interrupts from the UIO node of
//! each core. One worker thread per bound line waits on the node, runs the
//! handler and unmasks the line again:
//!
//! ```text
//! loop {
//!     wait(/dev/uioN)  ──▶ handler()  ──▶ write(1u32)
//! }
//! ```
//!
//! `free` stops and joins the worker, so it returns only once the handler
//! can no longer run.

use crate::backends::EndpointTable;
use crate::config::DriverConfig;
use crate::error::{IpcoreError, Result};
use crate::io::UioHandle;
use crate::mmio::{MappedRegion, RegisterIo};
use crate::platform::{
    EndpointNamer, InterruptController, InterruptLine, IrqHandler, MemoryMapper, PlatformServices,
};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::JoinHandle;

/// Poll period of interrupt workers; bounds how long `free` can block
const WAIT_SLICE_MS: i32 = 100;

/// Maps register windows through `/dev/mem`
#[derive(Debug, Clone)]
pub struct DevMemMapper {
    dev_mem: PathBuf,
}

impl DevMemMapper {
    /// Mapper over the memory device named by `config`
    #[must_use]
    pub fn new(config: &DriverConfig) -> Self {
        Self {
            dev_mem: config.dev_mem(),
        }
    }
}

impl MemoryMapper for DevMemMapper {
    fn map(&self, base: u64, span: u64) -> Result<Box<dyn RegisterIo>> {
        let len = usize::try_from(span).map_err(|_| {
            IpcoreError::resource_unavailable(format!("Window of {span:#x} bytes too large"))
        })?;
        let region = MappedRegion::map_physical(&self.dev_mem, base, len)?;
        tracing::debug!(
            "Mapped {:#x}+{span:#x} from {}",
            region.phys(),
            self.dev_mem.display()
        );
        Ok(Box::new(region))
    }
}

#[derive(Debug)]
struct Worker {
    stop: Arc<AtomicBool>,
    thread: JoinHandle<()>,
}

/// Interrupt delivery through UIO device nodes
#[derive(Debug)]
pub struct UioInterrupts {
    config: DriverConfig,
    workers: Mutex<HashMap<InterruptLine, Worker>>,
}

impl UioInterrupts {
    /// Controller for the UIO nodes under `config.dev_root`
    #[must_use]
    pub fn new(config: &DriverConfig) -> Self {
        Self {
            config: config.clone(),
            workers: Mutex::new(HashMap::new()),
        }
    }

    fn run(uio: &UioHandle, line: InterruptLine, handler: &IrqHandler, stop: &AtomicBool) {
        while !stop.load(Ordering::Acquire) {
            match uio.wait(WAIT_SLICE_MS) {
                Ok(Some(count)) => {
                    tracing::trace!("irq {line}: event {count}");
                    handler();
                    if let Err(e) = uio.enable() {
                        tracing::error!("irq {line}: cannot re-enable: {e}");
                        break;
                    }
                }
                Ok(None) => {}
                Err(e) => {
                    tracing::error!("irq {line}: wait on {} failed: {e}", uio.path().display());
                    break;
                }
            }
        }
        tracing::debug!("irq {line}: worker stopped");
    }
}

impl InterruptController for UioInterrupts {
    fn request(&self, line: InterruptLine, label: &'static str, handler: IrqHandler) -> Result<()> {
        let mut workers = self.workers.lock().unwrap_or_else(PoisonError::into_inner);
        if workers.contains_key(&line) {
            return Err(IpcoreError::resource_unavailable(format!(
                "Irq {line} already bound"
            )));
        }

        let uio = UioHandle::open(&self.config.uio_node(line.0))?;
        uio.enable()
            .map_err(|e| e.into_unavailable(&format!("Can't enable irq {line}")))?;

        let stop = Arc::new(AtomicBool::new(false));
        let thread = {
            let stop = Arc::clone(&stop);
            std::thread::Builder::new()
                .name(format!("{label}-{line}"))
                .spawn(move || Self::run(&uio, line, &handler, &stop))
                .map_err(|e| {
                    IpcoreError::resource_unavailable(format!("Can't register irq {line}: {e}"))
                })?
        };

        workers.insert(line, Worker { stop, thread });
        tracing::debug!("Bound irq {line} to {label}");
        Ok(())
    }

    fn free(&self, line: InterruptLine) {
        let worker = self
            .workers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&line);
        if let Some(worker) = worker {
            worker.stop.store(true, Ordering::Release);
            if worker.thread.join().is_err() {
                tracing::error!("irq {line}: handler panicked");
            }
            tracing::debug!("Freed irq {line}");
        }
    }
}

/// `/dev/mem` mapping, UIO interrupts and an in-memory endpoint table
#[derive(Debug)]
pub struct LinuxPlatform {
    mapper: DevMemMapper,
    interrupts: UioInterrupts,
    endpoints: EndpointTable,
}

impl LinuxPlatform {
    /// Platform rooted at the paths in `config`
    #[must_use]
    pub fn new(config: &DriverConfig) -> Arc<Self> {
        Arc::new(Self {
            mapper: DevMemMapper::new(config),
            interrupts: UioInterrupts::new(config),
            endpoints: EndpointTable::new(),
        })
    }

    /// Service bundle backed by this platform
    #[must_use]
    pub fn services(self: &Arc<Self>) -> PlatformServices {
        PlatformServices::from_shared(self)
    }

    /// Endpoint table
    #[must_use]
    pub const fn endpoints(&self) -> &EndpointTable {
        &self.endpoints
    }
}

impl MemoryMapper for LinuxPlatform {
    fn map(&self, base: u64, span: u64) -> Result<Box<dyn RegisterIo>> {
        self.mapper.map(base, span)
    }
}

impl InterruptController for LinuxPlatform {
    fn request(&self, line: InterruptLine, label: &'static str, handler: IrqHandler) -> Result<()> {
        self.interrupts.request(line, label, handler)
    }

    fn free(&self, line: InterruptLine) {
        self.interrupts.free(line);
    }
}

impl EndpointNamer for LinuxPlatform {
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
    use std::sync::atomic::AtomicUsize;

    fn config(dir: &std::path::Path) -> DriverConfig {
        DriverConfig {
            dev_root: dir.to_path_buf(),
            sysfs_root: dir.to_path_buf(),
            ..DriverConfig::default()
        }
    }

    #[test]
    fn missing_dev_mem_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let mapper = DevMemMapper::new(&config(dir.path()));
        assert!(matches!(
            mapper.map(0xff20_0000, 0x1000),
            Err(IpcoreError::ResourceUnavailable { .. })
        ));
    }

    #[test]
    fn missing_uio_node_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let irqs = UioInterrupts::new(&config(dir.path()));
        let result = irqs.request(InterruptLine(4), "cdc_irq", Arc::new(|| {}));
        assert!(matches!(result, Err(IpcoreError::ResourceUnavailable { .. })));
    }

    #[test]
    fn free_joins_worker() {
        // A regular file stands in for /dev/uio0; the worker reads EOF and exits
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("uio0"), b"").unwrap();

        let irqs = UioInterrupts::new(&config(dir.path()));
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        irqs.request(
            InterruptLine(0),
            "test_irq",
            Arc::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
        )
        .unwrap();
        assert!(irqs.request(InterruptLine(0), "test_irq", Arc::new(|| {})).is_err());

        irqs.free(InterruptLine(0));
        let after_free = calls.load(Ordering::SeqCst);
        std::thread::sleep(std::time::Duration::from_millis(20));
        assert_eq!(calls.load(Ordering::SeqCst), after_free);
        irqs.free(InterruptLine(0)); // already free
    }
}

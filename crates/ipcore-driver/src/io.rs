//! UIO device node I/O
//!
//! A core bound to `uio_pdrv_genirq` exposes its interrupt as `/dev/uioN`:
//!
//! - writing a native-endian `1u32` unmasks the interrupt
//! - a 4-byte read blocks until it fires and returns the total event count
//!
//! [`UioHandle::wait`] polls first, so callers can bound every wait and
//! check for shutdown between interrupts.

use crate::error::{IpcoreError, Result};
use rustix::event::{poll, PollFd, PollFlags};
use rustix::io::{read, write, Errno};
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

/// Open UIO device node
#[derive(Debug)]
pub struct UioHandle {
    file: File,
    path: PathBuf,
}

impl UioHandle {
    /// Open `path` read-write
    ///
    /// # Errors
    ///
    /// Returns `ResourceUnavailable` if the node cannot be opened.
    pub fn open(path: &Path) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .map_err(|e| {
                IpcoreError::resource_unavailable(format!("Cannot open {}: {e}", path.display()))
            })?;
        tracing::debug!("Opened {}", path.display());
        Ok(Self {
            file,
            path: path.to_path_buf(),
        })
    }

    /// Device node path
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Unmask the interrupt
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the write fails.
    pub fn enable(&self) -> Result<()> {
        let n = write(&self.file, &1u32.to_ne_bytes()).map_err(std::io::Error::from)?;
        if n != 4 {
            return Err(IpcoreError::resource_unavailable(format!(
                "Short write ({n} bytes) re-enabling {}",
                self.path.display()
            )));
        }
        Ok(())
    }

    /// Wait up to `timeout_ms` for the interrupt; returns the event count
    ///
    /// `Ok(None)` on timeout or when interrupted by a signal.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if polling or reading fails.
    pub fn wait(&self, timeout_ms: i32) -> Result<Option<u32>> {
        let mut fds = [PollFd::new(&self.file, PollFlags::IN)];
        match poll(&mut fds, timeout_ms) {
            Ok(0) | Err(Errno::INTR) => return Ok(None),
            Ok(_) => {}
            Err(e) => return Err(std::io::Error::from(e).into()),
        }

        let mut count = [0u8; 4];
        match read(&self.file, &mut count) {
            Ok(4) => Ok(Some(u32::from_ne_bytes(count))),
            Ok(n) => Err(IpcoreError::resource_unavailable(format!(
                "Short read ({n} bytes) from {}",
                self.path.display()
            ))),
            Err(Errno::INTR | Errno::AGAIN) => Ok(None),
            Err(e) => Err(std::io::Error::from(e).into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_missing_node_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let err = UioHandle::open(&dir.path().join("uio0")).unwrap_err();
        assert!(matches!(err, IpcoreError::ResourceUnavailable { .. }));
    }

    #[test]
    fn enable_writes_one() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("uio0");
        std::fs::write(&path, b"").unwrap();

        let handle = UioHandle::open(&path).unwrap();
        assert_eq!(handle.path(), path);
        handle.enable().unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), 1u32.to_ne_bytes());
    }

    #[test]
    fn wait_reads_event_count() {
        // Regular files always poll readable
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("uio1");
        std::fs::write(&path, 7u32.to_ne_bytes()).unwrap();

        let handle = UioHandle::open(&path).unwrap();
        assert_eq!(handle.wait(10).unwrap(), Some(7));
    }

    #[test]
    #[ignore] // Requires a core bound to uio_pdrv_genirq
    fn wait_on_real_uio() {
        let handle = UioHandle::open(Path::new("/dev/uio0")).expect("open /dev/uio0");
        handle.enable().expect("enable");
        println!("uio0 events: {:?}", handle.wait(1000).expect("wait"));
    }
}

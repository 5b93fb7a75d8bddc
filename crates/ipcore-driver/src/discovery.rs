//! Runtime core discovery
//!
//! Finds TES cores bound to `uio_pdrv_genirq` by scanning
//! `{sysfs}/class/uio/uio*`. For each node:
//!
//! ```text
//! device/of_node/compatible         NUL-separated; first catalogued entry wins
//! device/of_node/tes,stream-names   optional, NUL-separated sub-device names
//! device/of_node/tes,stream-layers  optional, big-endian u32 per name
//! maps/map0/addr, maps/map0/size    register window (hex)
//! ```
//!
//! The UIO index doubles as the interrupt line handed to the UIO backend.

use crate::config::DriverConfig;
use crate::device::SubDeviceRef;
use crate::error::{IpcoreError, Result};
use crate::platform::{InterruptLine, ResourceDescriptor};
use ipcore_chip::compat::ALL_COMPATIBLES;
use std::path::Path;

/// A core found during discovery
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredCore {
    /// UIO device index
    pub uio_index: u32,
    /// Matched compatible string (may be a stub variant)
    pub compatible: String,
    /// Window, interrupt line and sub-devices
    pub resource: ResourceDescriptor,
}

/// Scan sysfs for UIO-bound TES cores, sorted by UIO index
///
/// Nodes that are not TES cores, or whose attributes cannot be read, are
/// skipped with a log message.
///
/// # Errors
///
/// Returns an I/O error if the UIO class directory cannot be read.
pub fn discover(config: &DriverConfig) -> Result<Vec<DiscoveredCore>> {
    let class = config.uio_class();
    tracing::info!("Discovering TES IP cores under {}...", class.display());

    let mut cores = Vec::new();
    for entry in std::fs::read_dir(&class)?.flatten() {
        let file_name = entry.file_name();
        let Some(uio_index) = file_name
            .to_str()
            .and_then(|n| n.strip_prefix("uio"))
            .and_then(|n| n.parse::<u32>().ok())
        else {
            continue;
        };

        match probe_node(&entry.path(), uio_index) {
            Ok(Some(core)) => {
                tracing::info!(
                    "uio{uio_index}: {} at {:#x} ({:#x} bytes)",
                    core.compatible,
                    core.resource.base,
                    core.resource.span
                );
                cores.push(core);
            }
            Ok(None) => tracing::debug!("uio{uio_index}: not a TES core"),
            Err(e) => tracing::warn!("uio{uio_index}: skipped: {e}"),
        }
    }

    cores.sort_by_key(|core| core.uio_index);
    tracing::info!("Discovered {} TES IP core(s)", cores.len());
    Ok(cores)
}

fn probe_node(node: &Path, uio_index: u32) -> Result<Option<DiscoveredCore>> {
    let of_node = node.join("device").join("of_node");
    let Ok(raw) = std::fs::read(of_node.join("compatible")) else {
        return Ok(None);
    };
    let Some(compatible) = split_nul(&raw)
        .into_iter()
        .find(|c| ALL_COMPATIBLES.contains(&c.as_str()))
    else {
        return Ok(None);
    };

    let map0 = node.join("maps").join("map0");
    let base = read_hex_sysfs(&map0.join("addr"))?;
    let span = read_hex_sysfs(&map0.join("size"))?;

    let mut resource = ResourceDescriptor::new(base, span, InterruptLine(uio_index));
    for sub in read_sub_devices(&of_node) {
        resource = resource.with_sub_device(sub);
    }

    Ok(Some(DiscoveredCore {
        uio_index,
        compatible,
        resource,
    }))
}

fn read_sub_devices(of_node: &Path) -> Vec<SubDeviceRef> {
    let Ok(names) = std::fs::read(of_node.join("tes,stream-names")) else {
        return Vec::new();
    };
    let layers: Vec<i32> = std::fs::read(of_node.join("tes,stream-layers"))
        .map(|raw| {
            raw.chunks_exact(4)
                .map(|cell| i32::from_be_bytes([cell[0], cell[1], cell[2], cell[3]]))
                .collect()
        })
        .unwrap_or_default();

    split_nul(&names)
        .into_iter()
        .enumerate()
        .map(|(i, name)| {
            let layer = layers
                .get(i)
                .copied()
                .unwrap_or_else(|| i32::try_from(i).unwrap_or(i32::MAX));
            SubDeviceRef::new(name, layer)
        })
        .collect()
}

/// Entries of a NUL-separated device tree string list
fn split_nul(raw: &[u8]) -> Vec<String> {
    raw.split(|&b| b == 0)
        .filter(|s| !s.is_empty())
        .map(|s| String::from_utf8_lossy(s).into_owned())
        .collect()
}

/// Read a hexadecimal value from sysfs
fn read_hex_sysfs(path: &Path) -> Result<u64> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        IpcoreError::resource_unavailable(format!("Cannot read {}: {e}", path.display()))
    })?;

    let trimmed = content.trim().trim_start_matches("0x");

    u64::from_str_radix(trimmed, 16).map_err(|e| {
        IpcoreError::resource_unavailable(format!("Invalid hex value in {}: {e}", path.display()))
    })
}

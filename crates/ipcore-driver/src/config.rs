//! Driver configuration
//!
//! Defaults match the kernel driver (15 devices, base-address-qualified
//! endpoint names). Environment variables override them:
//!
//! | Variable | Field |
//! |----------|-------|
//! | `IPCORE_MAX_DEVICES` | [`DriverConfig::max_devices`] |
//! | `IPCORE_QUALIFY_NAMES` | [`DriverConfig::qualify_endpoint_names`] (`0`/`1`, `false`/`true`) |
//! | `IPCORE_SYSFS_ROOT` | [`DriverConfig::sysfs_root`] |
//! | `IPCORE_DEV_ROOT` | [`DriverConfig::dev_root`] |

use ipcore_chip::uapi::MAX_DEVICES;
use std::path::PathBuf;
use tracing::{debug, warn};

/// Runtime configuration shared by enumeration, attach and the Linux backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriverConfig {
    /// Registry capacity, all variants combined
    pub max_devices: usize,

    /// Name endpoints `"{base:x}.{name}"` instead of `"{name}"`, so several
    /// instances of one variant can coexist
    pub qualify_endpoint_names: bool,

    /// Root of sysfs (`/sys`), scanned for UIO-bound cores
    pub sysfs_root: PathBuf,

    /// Root of the device nodes (`/dev`), for `mem` and `uio*`
    pub dev_root: PathBuf,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            max_devices: MAX_DEVICES,
            qualify_endpoint_names: true,
            sysfs_root: PathBuf::from("/sys"),
            dev_root: PathBuf::from("/dev"),
        }
    }
}

impl DriverConfig {
    /// Defaults overridden from the process environment
    #[must_use]
    pub fn from_env() -> Self {
        Self::default().with_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary key lookup
    #[must_use]
    pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(raw) = lookup("IPCORE_MAX_DEVICES") {
            match raw.trim().parse::<usize>() {
                Ok(n) if n > 0 => self.max_devices = n,
                _ => warn!("Ignoring IPCORE_MAX_DEVICES={raw:?}: expected a positive integer"),
            }
        }

        if let Some(raw) = lookup("IPCORE_QUALIFY_NAMES") {
            match parse_flag(&raw) {
                Some(flag) => self.qualify_endpoint_names = flag,
                None => warn!("Ignoring IPCORE_QUALIFY_NAMES={raw:?}: expected 0/1 or true/false"),
            }
        }

        if let Some(root) = lookup("IPCORE_SYSFS_ROOT") {
            self.sysfs_root = PathBuf::from(root);
        }

        if let Some(root) = lookup("IPCORE_DEV_ROOT") {
            self.dev_root = PathBuf::from(root);
        }

        debug!("Driver configuration: {self:?}");
        self
    }

    /// Physical memory device (`/dev/mem`)
    #[must_use]
    pub fn dev_mem(&self) -> PathBuf {
        self.dev_root.join("mem")
    }

    /// UIO device node for an interrupt line (`/dev/uioN`)
    #[must_use]
    pub fn uio_node(&self, line: u32) -> PathBuf {
        self.dev_root.join(format!("uio{line}"))
    }

    /// UIO class directory (`/sys/class/uio`)
    #[must_use]
    pub fn uio_class(&self) -> PathBuf {
        self.sysfs_root.join("class").join("uio")
    }
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_match_kernel_driver() {
        let config = DriverConfig::default();
        assert_eq!(config.max_devices, 15);
        assert!(config.qualify_endpoint_names);
        assert_eq!(config.dev_mem(), PathBuf::from("/dev/mem"));
        assert_eq!(config.uio_node(3), PathBuf::from("/dev/uio3"));
        assert_eq!(config.uio_class(), PathBuf::from("/sys/class/uio"));
    }

    #[test]
    fn overrides_apply() {
        let config = DriverConfig::default().with_overrides(lookup(&[
            ("IPCORE_MAX_DEVICES", "4"),
            ("IPCORE_QUALIFY_NAMES", "false"),
            ("IPCORE_SYSFS_ROOT", "/tmp/sys"),
            ("IPCORE_DEV_ROOT", "/tmp/dev"),
        ]));
        assert_eq!(config.max_devices, 4);
        assert!(!config.qualify_endpoint_names);
        assert_eq!(config.uio_class(), PathBuf::from("/tmp/sys/class/uio"));
        assert_eq!(config.dev_mem(), PathBuf::from("/tmp/dev/mem"));
    }

    #[test]
    fn malformed_overrides_are_ignored() {
        let config = DriverConfig::default().with_overrides(lookup(&[
            ("IPCORE_MAX_DEVICES", "0"),
            ("IPCORE_QUALIFY_NAMES", "maybe"),
        ]));
        assert_eq!(config, DriverConfig::default());
    }
}

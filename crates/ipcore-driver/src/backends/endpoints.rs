//! In-memory endpoint name table

use crate::error::{IpcoreError, Result};
use crate::platform::EndpointNamer;
use std::collections::BTreeMap;
use std::sync::{Mutex, PoisonError};

/// Endpoint names by registry index; names are unique
#[derive(Debug, Default)]
pub struct EndpointTable {
    names: Mutex<BTreeMap<usize, String>>,
}

impl EndpointTable {
    /// Empty table
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Name of the endpoint at `index`
    #[must_use]
    pub fn name(&self, index: usize) -> Option<String> {
        self.lock().get(&index).cloned()
    }

    /// Index of the endpoint called `name`
    #[must_use]
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.lock()
            .iter()
            .find_map(|(index, n)| (n == name).then_some(*index))
    }

    /// All `(index, name)` pairs in index order
    #[must_use]
    pub fn entries(&self) -> Vec<(usize, String)> {
        self.lock()
            .iter()
            .map(|(index, name)| (*index, name.clone()))
            .collect()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeMap<usize, String>> {
        self.names.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl EndpointNamer for EndpointTable {
    fn create(&self, index: usize, name: &str) -> Result<()> {
        let mut names = self.lock();
        if let Some(existing) = names.get(&index) {
            return Err(IpcoreError::resource_unavailable(format!(
                "Endpoint index {index} already used by {existing}"
            )));
        }
        if names.values().any(|n| n == name) {
            return Err(IpcoreError::resource_unavailable(format!(
                "Can't create device: {name} already exists"
            )));
        }
        names.insert(index, name.to_string());
        tracing::debug!("Created endpoint {name} (index {index})");
        Ok(())
    }

    fn destroy(&self, index: usize) {
        if let Some(name) = self.lock().remove(&index) {
            tracing::debug!("Destroyed endpoint {name} (index {index})");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_are_unique() {
        let table = EndpointTable::new();
        table.create(0, "cdc").unwrap();
        assert!(matches!(
            table.create(1, "cdc"),
            Err(IpcoreError::ResourceUnavailable { .. })
        ));
        table.create(1, "ff200000.cdc").unwrap();
        assert_eq!(table.index_of("ff200000.cdc"), Some(1));
        assert_eq!(table.entries().len(), 2);
    }

    #[test]
    fn destroy_frees_name() {
        let table = EndpointTable::new();
        table.create(3, "d2d").unwrap();
        table.destroy(3);
        assert_eq!(table.name(3), None);
        table.create(4, "d2d").unwrap();
        table.destroy(99); // unknown index is ignored
        assert_eq!(table.name(4).as_deref(), Some("d2d"));
    }
}

//! Structure Registry - two-way cache between SWC structure codes and catalog keys
//!
//! Populated once from the full structure identifier catalog, then read
//! without locking. The catalog is not expected to change while the service
//! runs, so there is no invalidation.

use once_cell::sync::OnceCell;
use std::collections::HashMap;

use crate::error::StorageResult;
use crate::models::StructureIdentifier;
use crate::store::SwcStore;

/// Lookup tables built from one catalog snapshot.
#[derive(Debug)]
struct StructureMaps {
    by_value: HashMap<i32, String>,
    by_id: HashMap<String, i32>,
    entries: Vec<StructureIdentifier>,
}

impl StructureMaps {
    fn build(entries: Vec<StructureIdentifier>) -> Self {
        let mut by_value = HashMap::with_capacity(entries.len());
        let mut by_id = HashMap::with_capacity(entries.len());

        for entry in &entries {
            // first entry for a code wins
            by_value.entry(entry.value).or_insert_with(|| entry.id.clone());
            by_id.insert(entry.id.clone(), entry.value);
        }

        Self {
            by_value,
            by_id,
            entries,
        }
    }
}

/// Compute-once registry of structure identifiers.
#[derive(Debug, Default)]
pub struct StructureRegistry {
    maps: OnceCell<StructureMaps>,
}

impl StructureRegistry {
    /// Empty registry; populate with [`load_with`](Self::load_with) or [`load_from`](Self::load_from).
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry populated from an in-memory catalog (used by tests and the CLI).
    pub fn from_entries(entries: Vec<StructureIdentifier>) -> Self {
        let registry = Self::new();
        if !entries.is_empty() {
            let _ = registry.maps.set(StructureMaps::build(entries));
        }
        registry
    }

    /// Populate the registry once.
    ///
    /// Concurrent callers block until the first loader finishes; only one
    /// loader runs. An empty catalog leaves the registry unpopulated so a
    /// later call can retry. Returns whether the registry is populated.
    pub fn load_with<F>(&self, load: F) -> StorageResult<bool>
    where
        F: FnOnce() -> StorageResult<Vec<StructureIdentifier>>,
    {
        let result = self.maps.get_or_try_init(|| {
            let entries = load().map_err(Some)?;
            if entries.is_empty() {
                return Err(None);
            }
            Ok(StructureMaps::build(entries))
        });

        match result {
            Ok(_) => Ok(true),
            Err(None) => Ok(false),
            Err(Some(e)) => Err(e),
        }
    }

    /// Populate from the store's catalog if not already populated.
    pub fn load_from(&self, store: &SwcStore) -> StorageResult<bool> {
        self.load_with(|| store.structure_identifiers())
    }

    pub fn is_loaded(&self) -> bool {
        self.maps.get().is_some()
    }

    /// Catalog key for an SWC structure code.
    pub fn id_for_value(&self, value: i32) -> Option<&str> {
        self.maps.get()?.by_value.get(&value).map(String::as_str)
    }

    /// SWC structure code for a catalog key.
    pub fn value_for_id(&self, id: &str) -> Option<i32> {
        self.maps.get()?.by_id.get(id).copied()
    }

    /// All cached entries, in catalog order.
    pub fn entries(&self) -> &[StructureIdentifier] {
        self.maps.get().map(|m| m.entries.as_slice()).unwrap_or(&[])
    }
}

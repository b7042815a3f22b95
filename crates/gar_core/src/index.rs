//! Two-phase resource construction.
//!
//! Many directories describe a file in one section and the chunks that make it up in a later
//! one. Plugins register placeholder resources under a stable key while reading the first
//! section, then resolve the later sections by key and attach decode plans.

use indexmap::IndexMap;
use std::{fmt::Debug, hash::Hash};
use tracing::trace;

use crate::error::{Error, Result};
use crate::exporter::Exporter;
use crate::resource::Resource;

/// Placeholder resources keyed by hash, checksum or index
#[derive(Debug, Clone)]
pub struct ResourceIndex<K> {
    entries: IndexMap<K, Resource>,
}

impl<K> Default for ResourceIndex<K> {
    fn default() -> Self {
        Self {
            entries: IndexMap::new(),
        }
    }
}

impl<K: Hash + Eq + Debug> ResourceIndex<K> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: IndexMap::with_capacity(capacity),
        }
    }

    /// Register a resource, returning the one previously stored under the same key
    pub fn insert(&mut self, key: K, resource: Resource) -> Option<Resource> {
        self.entries.insert(key, resource)
    }

    pub fn get(&self, key: &K) -> Option<&Resource> {
        self.entries.get(key)
    }

    pub fn contains(&self, key: &K) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Mutate the resource registered under `key`
    pub fn resolve<F>(&mut self, key: &K, update: F) -> Result<()>
    where
        F: FnOnce(&mut Resource) -> Result<()>,
    {
        let resource = self
            .entries
            .get_mut(key)
            .ok_or_else(|| Error::UnresolvedKey(format!("{key:?}")))?;
        trace!(?key, name = resource.name(), "resolving resource");
        update(resource)
    }

    /// Attach a decode plan to the resource registered under `key`
    pub fn attach_exporter(&mut self, key: &K, exporter: impl Into<Exporter>) -> Result<()> {
        let exporter = exporter.into();
        self.resolve(key, |resource| {
            resource.set_exporter(exporter);
            Ok(())
        })
    }

    /// Iterate in registration order
    pub fn iter(&self) -> impl Iterator<Item = (&K, &Resource)> {
        self.entries.iter()
    }

    /// Finish the build, keeping registration order
    pub fn into_resources(self) -> Vec<Resource> {
        self.entries.into_values().collect()
    }
}

//! Name-addressed registry of data sources

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::error::{Result, SourceError};
use crate::info::SourceInfo;
use crate::source::DataSource;

/// Observes data source changes. Observation happens after the source has
/// been added (resp. removed) and outside the registry lock.
pub trait DataSourcesObserver: Send + Sync {
    /// A source was added under its name.
    fn source_added(&self, source: &dyn DataSource);

    /// A source was removed.
    fn source_removed(&self, source: &dyn DataSource);
}

/// A flat collection of named data sources with a single observer.
#[derive(Default)]
pub struct DataSources {
    sources: RwLock<HashMap<String, Arc<dyn DataSource>>>,
    observer: RwLock<Option<Arc<dyn DataSourcesObserver>>>,
}

impl DataSources {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the (single) observer of source changes; `None` disables
    /// observation.
    pub fn set_observer(&self, observer: Option<Arc<dyn DataSourcesObserver>>) {
        *self.observer.write() = observer;
    }

    /// The named source, if defined.
    pub fn get(&self, name: &str) -> Option<Arc<dyn DataSource>> {
        self.sources.read().get(name).cloned()
    }

    /// The named source matched case-insensitively. Exact matches win; used
    /// by the RESP surface, which matches source names in any case.
    pub fn get_insensitive(&self, name: &str) -> Option<Arc<dyn DataSource>> {
        let sources = self.sources.read();
        if let Some(ds) = sources.get(name) {
            return Some(Arc::clone(ds));
        }
        sources
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, ds)| Arc::clone(ds))
    }

    /// Add a source, rejecting duplicate names.
    pub fn add(&self, source: Arc<dyn DataSource>) -> Result<()> {
        let name = source.name().to_owned();
        {
            let mut sources = self.sources.write();
            if sources.contains_key(&name) {
                return Err(SourceError::AlreadyDefined(name));
            }
            sources.insert(name, Arc::clone(&source));
        }
        if let Some(obs) = self.observer.read().clone() {
            obs.source_added(source.as_ref());
        }
        Ok(())
    }

    /// Remove a source by name, returning it if one was defined.
    pub fn remove(&self, name: &str) -> Option<Arc<dyn DataSource>> {
        let removed = self.sources.write().remove(name);
        if let Some(ref ds) = removed {
            if let Some(obs) = self.observer.read().clone() {
                obs.source_removed(ds.as_ref());
            }
        }
        removed
    }

    /// Info about all sources, keyed by name in sorted order.
    pub fn info(&self) -> BTreeMap<String, SourceInfo> {
        self.sources
            .read()
            .iter()
            .map(|(name, ds)| (name.clone(), SourceInfo::of(ds.as_ref())))
            .collect()
    }

    /// Number of registered sources.
    pub fn len(&self) -> usize {
        self.sources.read().len()
    }

    /// True when no sources are registered.
    pub fn is_empty(&self) -> bool {
        self.sources.read().is_empty()
    }
}

#[cfg(test)]
#[path = "registry_test.rs"]
mod tests;

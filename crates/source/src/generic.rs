//! Generic (format-agnostic) data source capabilities
//!
//! Applications implement [`GenericDataSource`] and override the capability
//! accessors for whatever the source supports. The marshaled layer probes the
//! accessors once at construction and never guesses: a source without
//! `as_getable` answers snapshots with `NotGetable`, a source without
//! `as_watchable` answers watches with `NotWatchable`.

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use bytes::Bytes;
use thiserror::Error;

use crate::error::Result;

/// An opaque application value. Serialized only when at least one subscriber
/// of the chosen format is attached.
pub type Item = serde_json::Value;

/// Arbitrary descriptive data about a source, exposed by `/meta/nouns`.
pub type Attrs = serde_json::Map<String, serde_json::Value>;

/// The watcher handed to [`WatchableSource::set_watcher`]. Both single-item
/// and batch pushes are provided.
///
/// Implementations should keep producing only while the handoff accepts
/// items: a `false` return means the source went inactive and production can
/// stop. `active` is the cheap pre-check for sources that would otherwise
/// build items just to have them thrown away.
pub trait GenericDataWatcher: Send + Sync {
    /// True while at least one subscriber is attached downstream.
    fn active(&self) -> bool;

    /// Hand a single item over; returns false once the watcher is inactive.
    fn handle_item(&self, item: Item) -> bool;

    /// Hand a batch of items over; returns false once the watcher is inactive.
    fn handle_items(&self, items: Vec<Item>) -> bool;
}

/// A cloneable weak reference to a [`GenericDataWatcher`].
///
/// Sources hold the last handle passed to `set_watcher`. The back-reference
/// is weak so that the marshaled source (which also owns the generic source)
/// does not form a reference cycle; a handle whose watcher is gone reports
/// inactive and drops items.
#[derive(Clone, Default)]
pub struct WatcherHandle {
    inner: Option<Weak<dyn GenericDataWatcher>>,
}

impl WatcherHandle {
    /// Wrap a weak watcher reference.
    pub fn new(watcher: Weak<dyn GenericDataWatcher>) -> Self {
        Self {
            inner: Some(watcher),
        }
    }

    fn upgrade(&self) -> Option<Arc<dyn GenericDataWatcher>> {
        self.inner.as_ref()?.upgrade()
    }

    /// True while the watcher is alive and has subscribers.
    pub fn active(&self) -> bool {
        self.upgrade().is_some_and(|w| w.active())
    }

    /// Push one item; false if the watcher is gone or inactive.
    pub fn handle_item(&self, item: Item) -> bool {
        match self.upgrade() {
            Some(w) => w.handle_item(item),
            None => false,
        }
    }

    /// Push a batch; false if the watcher is gone or inactive.
    pub fn handle_items(&self, items: Vec<Item>) -> bool {
        match self.upgrade() {
            Some(w) => w.handle_items(items),
            None => false,
        }
    }
}

impl std::fmt::Debug for WatcherHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WatcherHandle")
            .field("alive", &self.upgrade().is_some())
            .finish()
    }
}

/// A format-agnostic data source.
///
/// Only `name` is required; every capability defaults to "not supported".
pub trait GenericDataSource: Send + Sync {
    /// The unique noun path for this source, e.g. `/request_log`.
    fn name(&self) -> &str;

    /// Arbitrary descriptive attributes; may be empty.
    fn attrs(&self) -> Attrs {
        Attrs::new()
    }

    /// A text template implementing the "text" format, if any.
    fn text_template(&self) -> Option<Arc<dyn TextTemplate>> {
        None
    }

    /// Source-declared formats beyond the built-in json and templated text.
    fn formats(&self) -> HashMap<String, Arc<dyn GenericDataFormat>> {
        HashMap::new()
    }

    /// Snapshot capability.
    fn as_getable(&self) -> Option<&dyn GetableSource> {
        None
    }

    /// Watch capability.
    fn as_watchable(&self) -> Option<&dyn WatchableSource> {
        None
    }

    /// Initial-snapshot-on-watch capability.
    fn as_watch_initable(&self) -> Option<&dyn WatchInitableSource> {
        None
    }

    /// Activation-hook capability.
    fn as_activatable(&self) -> Option<&dyn ActivatableSource> {
        None
    }
}

/// Snapshot support for a generic source.
pub trait GetableSource: Send + Sync {
    /// Return the data currently available for the source.
    fn get(&self) -> Item;
}

/// Watch support for a generic source.
pub trait WatchableSource: Send + Sync {
    /// Set the current (singular) watcher. Implementations should retain the
    /// last passed handle and push items through it until it returns false.
    fn set_watcher(&self, watcher: WatcherHandle);
}

/// Optional hook invoked on the inactive-to-active transition.
pub trait ActivatableSource: Send + Sync {
    /// Called exactly once each time the first subscriber attaches after the
    /// source was idle. May start whatever resources produce items.
    fn activate(&self);
}

/// Optional initial data for new watch streams.
pub trait WatchInitableSource: Send + Sync {
    /// Initial item delivered to a subscriber before any streamed item.
    fn watch_init(&self) -> Item;
}

/// A data marshaling protocol plus a framing protocol for watch streams.
///
/// Any marshaling or framing error is fatal to the affected stream only: the
/// failing subscriber is torn down, others are unaffected.
pub trait GenericDataFormat: Send + Sync {
    /// Serialize a [`GetableSource::get`] value.
    fn marshal_get(&self, item: &Item) -> Result<Bytes>;

    /// Serialize a [`WatchInitableSource::watch_init`] value.
    fn marshal_init(&self, item: &Item) -> Result<Bytes>;

    /// Serialize an item pushed through a watcher.
    fn marshal_item(&self, item: &Item) -> Result<Bytes>;

    /// Wrap a marshaled item for a watch byte stream.
    fn frame_item(&self, item: Bytes) -> Result<Bytes>;
}

/// Rendering errors from a [`TextTemplate`].
#[derive(Error, Debug, Clone)]
pub enum TemplateError {
    /// The template defines no block for this operation
    #[error("no {0:?} template block defined")]
    MissingBlock(&'static str),

    /// The template engine failed to render
    #[error("template rendering failed: {0}")]
    Render(String),
}

/// The seam to whatever text-template engine a source uses.
///
/// Each method corresponds to a named template block; a source only defines
/// the blocks it supports and the rest error with
/// [`TemplateError::MissingBlock`], which fails that operation only.
pub trait TextTemplate: Send + Sync {
    /// Render the "get" block for a snapshot.
    fn render_get(&self, item: &Item) -> std::result::Result<String, TemplateError> {
        let _ = item;
        Err(TemplateError::MissingBlock("get"))
    }

    /// Render the "init" block for the first element of a watch stream.
    fn render_init(&self, item: &Item) -> std::result::Result<String, TemplateError> {
        let _ = item;
        Err(TemplateError::MissingBlock("init"))
    }

    /// Render the "item" block for a streamed item.
    fn render_item(&self, item: &Item) -> std::result::Result<String, TemplateError> {
        let _ = item;
        Err(TemplateError::MissingBlock("item"))
    }
}

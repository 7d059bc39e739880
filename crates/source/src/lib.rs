//! Scry Source - data source traits and registry
//!
//! A *data source* is a named, process-local origin of snapshot and/or
//! streamed items. This crate defines the two levels of the source model:
//!
//! - **Generic sources** ([`GenericDataSource`]): what applications implement.
//!   A generic source exposes optional capabilities (snapshot, watch,
//!   watch-init, activate hook, text template, extra formats) through probing
//!   accessors; items are untyped [`Item`] values serialized lazily by a
//!   format codec.
//! - **Marshaled sources** ([`DataSource`]): what the registry and the
//!   protocol servers consume. A marshaled source owns serialization and
//!   subscriber fan-out for a wrapped generic source (see `scry_marshaled`).
//!
//! The [`DataSources`] registry maps names to sources, rejects duplicates and
//! notifies a single observer after each add/remove.

mod error;
mod generic;
mod info;
mod item;
mod registry;
mod source;

pub use error::{MultiError, Result, SourceError};
pub use generic::{
    ActivatableSource, Attrs, GenericDataFormat, GenericDataSource, GenericDataWatcher,
    GetableSource, Item, TemplateError, TextTemplate, WatchInitableSource, WatchableSource,
    WatcherHandle,
};
pub use info::SourceInfo;
pub use item::{ItemDataSource, ItemWatcher, ItemWatcherFn};
pub use registry::{DataSources, DataSourcesObserver};
pub use source::{DataSource, DrainableSource, WatchSink};

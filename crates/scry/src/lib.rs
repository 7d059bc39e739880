//! Scry - on-demand introspection of operational data
//!
//! Applications register named data sources (request logs, tracing taps,
//! counters) that clients consult as a snapshot (Get) or a live stream
//! (Watch) over one TCP endpoint speaking both HTTP/REST and RESP. Sources
//! stay dormant until the first subscriber attaches, so debug-heavy sources
//! cost nothing when nobody is looking.
//!
//! # Quick start
//!
//! ```ignore
//! use scry::{ScryConfig, add_generic_source};
//!
//! // a watchable source pushes items through the watcher handle it is given
//! add_generic_source(my_request_log)?;
//!
//! // one endpoint, two protocols
//! scry::configure(ScryConfig::default().with_listen("localhost:4040")).await?;
//! ```
//!
//! Then `curl localhost:4040/request_log`, or `redis-cli -p 4040 monitor`
//! away.

mod config;
mod report;

pub use config::{ConfigError, ConfiguredServer, ScryConfig, LISTEN_ENV};
pub use report::{LogReporter, ReportError};

pub use scry_marshaled::{
    LdJsonFormat, MarshaledConfig, MarshaledSource, StringifyFormat, TemplatedFormat,
};
pub use scry_meta::{NounsSource, NOUNS_NAME};
pub use scry_serve::{router, serve_auto, ChunkBuf, ItemBuf, Servable};
pub use scry_source::{
    ActivatableSource, Attrs, DataSource, DataSources, DataSourcesObserver, DrainableSource,
    GenericDataFormat, GenericDataSource, GenericDataWatcher, GetableSource, Item, ItemDataSource,
    ItemWatcher, MultiError, SourceError, SourceInfo, TemplateError, TextTemplate,
    WatchInitableSource, WatchSink, WatchableSource, WatcherHandle,
};

/// The demultiplexing server building blocks, for custom wiring.
pub use scry_demux as demux;
/// The RESP wire codec, also useful for test clients.
pub use scry_resp as resp;

use std::sync::{Arc, OnceLock};

static DEFAULT_SOURCES: OnceLock<Arc<DataSources>> = OnceLock::new();
static THE_SERVER: OnceLock<Arc<ConfiguredServer>> = OnceLock::new();

/// Build a fresh registry wired with its `/meta/nouns` source and observer.
pub fn new_sources() -> Arc<DataSources> {
    let sources = Arc::new(DataSources::new());
    let nouns = NounsSource::new(&sources);
    // a fresh registry cannot already define /meta/nouns
    let _ = sources.add(MarshaledSource::new(nouns.clone()));
    sources.set_observer(Some(nouns));
    sources
}

/// The process-wide default registry, created on first use.
pub fn default_sources() -> Arc<DataSources> {
    Arc::clone(DEFAULT_SOURCES.get_or_init(new_sources))
}

/// Add a data source to the default registry. Errors if a source with the
/// same name is already defined.
pub fn add_source(source: Arc<dyn DataSource>) -> scry_source::Result<()> {
    default_sources().add(source)
}

/// Wrap a generic data source and add it to the default registry.
pub fn add_generic_source(source: Arc<dyn GenericDataSource>) -> scry_source::Result<()> {
    add_source(MarshaledSource::new(source))
}

/// Set up scry over the default registry and start the configured server.
/// Returns `AlreadyConfigured` when called more than once.
pub async fn configure(config: ScryConfig) -> Result<Arc<ConfiguredServer>, ConfigError> {
    let server = ConfiguredServer::with_sources(config, default_sources());
    if THE_SERVER.set(Arc::clone(&server)).is_err() {
        return Err(ConfigError::AlreadyConfigured);
    }
    server.start().await?;
    Ok(server)
}

/// The configured server, if `configure` has been called.
pub fn default_server() -> Option<Arc<ConfiguredServer>> {
    THE_SERVER.get().cloned()
}

//! Configuration and server lifecycle

use std::io;
use std::net::SocketAddr;
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Deserialize;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

use scry_serve::{serve_auto, ListenError, Servable};
use scry_source::DataSources;

/// Environment variable overriding the configured listen address. Read at
/// configuration time; a non-empty value supersedes any programmatic
/// setting.
pub const LISTEN_ENV: &str = "SCRY_LISTEN";

/// Errors from configuring and running the server.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// `configure` was called more than once
    #[error("scry already configured")]
    AlreadyConfigured,

    /// The server is already listening
    #[error("scry server already started")]
    AlreadyStarted,

    /// The server is disabled by configuration
    #[error("scry server disabled")]
    Disabled,

    /// Bind or shutdown failure
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl From<ConfigError> for ListenError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::AlreadyStarted => ListenError::AlreadyStarted,
            ConfigError::Io(err) => ListenError::Io(err),
            ConfigError::AlreadyConfigured | ConfigError::Disabled => ListenError::NotConfigured,
        }
    }
}

/// Configuration for scry.
///
/// With no listen address scry starts no listener of its own; sources can
/// still be served by mounting [`scry_serve::router`] into an existing HTTP
/// server.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ScryConfig {
    /// Whether the configured server starts at all; defaults to true.
    pub enabled: Option<bool>,

    /// `host:port` to listen on; empty host means all interfaces. Superseded
    /// by `$SCRY_LISTEN` when that is non-empty.
    pub listen: String,
}

impl ScryConfig {
    /// Set the listen address.
    pub fn with_listen(mut self, addr: impl Into<String>) -> Self {
        self.listen = addr.into();
        self
    }

    /// Disable or enable the configured server.
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = Some(enabled);
        self
    }
}

struct ServerState {
    addr: Option<SocketAddr>,
    cancel: Option<CancellationToken>,
    task: Option<JoinHandle<io::Result<()>>>,
}

/// Manages the lifecycle of a configured scry server: one TCP endpoint
/// serving both the HTTP and the RESP surface.
pub struct ConfiguredServer {
    sources: Arc<DataSources>,
    enabled: bool,
    listen_addr: Mutex<String>,
    state: Mutex<ServerState>,
    selfref: Weak<ConfiguredServer>,
}

impl ConfiguredServer {
    /// A server over an explicit registry. The `SCRY_LISTEN` environment
    /// variable, when non-empty, supersedes `config.listen`.
    pub fn with_sources(config: ScryConfig, sources: Arc<DataSources>) -> Arc<Self> {
        let listen = match std::env::var(LISTEN_ENV) {
            Ok(env_listen) if !env_listen.is_empty() => env_listen,
            _ => config.listen,
        };
        Arc::new_cyclic(|selfref| Self {
            sources,
            enabled: config.enabled.unwrap_or(true),
            listen_addr: Mutex::new(listen),
            state: Mutex::new(ServerState {
                addr: None,
                cancel: None,
                task: None,
            }),
            selfref: selfref.clone(),
        })
    }

    /// True if the configured server is enabled.
    pub fn enabled(&self) -> bool {
        self.enabled
    }

    /// The configured listen address string.
    pub fn listen_addr(&self) -> String {
        self.listen_addr.lock().clone()
    }

    /// The current listening address, if any.
    pub fn addr(&self) -> Option<SocketAddr> {
        self.state.lock().addr
    }

    /// The registry this server serves.
    pub fn sources(&self) -> &Arc<DataSources> {
        &self.sources
    }

    /// Start listening and serving.
    ///
    /// A no-op when disabled or when no listen address is configured;
    /// `AlreadyStarted` when the server is already bound.
    pub async fn start(&self) -> Result<(), ConfigError> {
        if !self.enabled {
            return Ok(());
        }
        let listen = self.listen_addr();
        if listen.is_empty() {
            return Ok(());
        }
        self.start_listening(&listen).await.map(|_| ())
    }

    /// Start the server on the given address, updating the configured listen
    /// address on success.
    pub async fn start_on(&self, addr: &str) -> Result<SocketAddr, ConfigError> {
        if !self.enabled {
            return Err(ConfigError::Disabled);
        }
        let bound = self.start_listening(addr).await?;
        *self.listen_addr.lock() = addr.to_owned();
        Ok(bound)
    }

    async fn start_listening(&self, addr: &str) -> Result<SocketAddr, ConfigError> {
        if self.state.lock().cancel.is_some() {
            return Err(ConfigError::AlreadyStarted);
        }

        let listener = TcpListener::bind(normalize_listen_addr(addr)).await?;
        let local = listener.local_addr()?;

        let mut state = self.state.lock();
        if state.cancel.is_some() {
            // lost a start race; drop the extra listener
            return Err(ConfigError::AlreadyStarted);
        }

        let cancel = CancellationToken::new();
        let servable: Option<Arc<dyn Servable>> = Some(Arc::new(IndirectServer {
            server: self.selfref.clone(),
        }));
        let task = tokio::spawn(serve_auto(
            Arc::clone(&self.sources),
            listener,
            servable,
            cancel.clone(),
        ));

        state.addr = Some(local);
        state.cancel = Some(cancel);
        state.task = Some(task);
        drop(state);

        info!(addr = %local, "scry server listening");
        Ok(local)
    }

    /// Stop the server if it is running; idempotent.
    pub async fn stop(&self) -> Result<(), ConfigError> {
        let (cancel, task) = {
            let mut state = self.state.lock();
            state.addr = None;
            (state.cancel.take(), state.task.take())
        };
        let Some(cancel) = cancel else {
            return Ok(());
        };
        cancel.cancel();
        if let Some(task) = task {
            if let Ok(result) = task.await {
                result?;
            }
        }
        info!("scry server stopped");
        Ok(())
    }
}

/// `host:port` with an empty host listens on all interfaces.
fn normalize_listen_addr(addr: &str) -> String {
    match addr.strip_prefix(':') {
        Some(port) => format!("0.0.0.0:{port}"),
        None => addr.to_owned(),
    }
}

/// Late-bound server reference for the `/listen` endpoint; the serve task
/// must not keep its own server alive.
struct IndirectServer {
    server: Weak<ConfiguredServer>,
}

#[async_trait]
impl Servable for IndirectServer {
    fn addr(&self) -> Option<SocketAddr> {
        self.server.upgrade().and_then(|server| server.addr())
    }

    async fn start_on(&self, addr: &str) -> Result<SocketAddr, ListenError> {
        match self.server.upgrade() {
            Some(server) => server.start_on(addr).await.map_err(ListenError::from),
            None => Err(ListenError::NotConfigured),
        }
    }

    async fn stop(&self) -> Result<(), ListenError> {
        match self.server.upgrade() {
            Some(server) => {
                // finish the shutdown off-request so the reply is written
                // before the serve task winds down
                tokio::spawn(async move {
                    let _ = server.stop().await;
                });
                Ok(())
            }
            None => Err(ListenError::NotConfigured),
        }
    }
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;

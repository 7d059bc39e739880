//! HTTP/REST surface for data sources
//!
//! Hosts a source registry REST-fully under a path prefix:
//!
//! - `GET <prefix>/<name>[?format=f]` - snapshot
//! - `WATCH <prefix>/<name>[?format=f]`, or `GET ...?watch=1` for clients
//!   that cannot send custom method strings - chunked watch stream
//! - `GET <prefix>/` - snapshot of `/meta/nouns`
//! - `GET|POST <prefix>/listen` - server discovery and lifecycle, present
//!   only when a [`Servable`] is supplied
//!
//! Status mapping: 400 unsupported format, 404 unknown name, 405 with
//! `Allow: GET, WATCH`, 501 for sources that do not support the operation,
//! 500 otherwise.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Body;
use axum::extract::{Path, Query, State};
use axum::http::{header, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{any, get};
use axum::{Form, Router};
use bytes::Bytes;
use serde::Deserialize;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::warn;

use scry_meta::NOUNS_NAME;
use scry_source::{DataSource, DataSources, SourceError, WatchSink};

use crate::chan_buf::ChunkBuf;

/// Formats preferred when a request names none, in order.
const DEFAULT_FORMATS: [&str; 2] = ["text", "json"];

/// Errors from starting or stopping the listening server via `/listen`.
#[derive(Debug, Error)]
pub enum ListenError {
    /// The server is already bound
    #[error("server already started")]
    AlreadyStarted,

    /// No server was configured behind this handler
    #[error("server not configured")]
    NotConfigured,

    /// Bind or shutdown failure
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// A minimal server lifecycle surface for the `/listen` endpoint.
#[async_trait]
pub trait Servable: Send + Sync {
    /// The current listening address, if any.
    fn addr(&self) -> Option<SocketAddr>;

    /// Start listening on the given `host:port`.
    async fn start_on(&self, addr: &str) -> Result<SocketAddr, ListenError>;

    /// Stop the server if it is running.
    async fn stop(&self) -> Result<(), ListenError>;
}

#[derive(Clone)]
struct HttpState {
    sources: Arc<DataSources>,
    servable: Option<Arc<dyn Servable>>,
}

/// Build the REST router over a source registry at a path prefix (empty for
/// root). A non-`None` `servable` additionally exposes `<prefix>/listen`.
pub fn router(
    sources: Arc<DataSources>,
    prefix: &str,
    servable: Option<Arc<dyn Servable>>,
) -> Router {
    let with_listen = servable.is_some();
    let state = HttpState { sources, servable };

    let mut inner = Router::new()
        .route("/", any(handle_index))
        .route("/{*name}", any(handle_named));
    if with_listen {
        inner = inner.route("/listen", get(listen_status).post(listen_control));
    }
    let inner = inner.with_state(state);

    if prefix.is_empty() {
        inner
    } else {
        Router::new().nest(prefix, inner)
    }
}

async fn handle_index(
    State(state): State<HttpState>,
    method: Method,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    serve_source(&state, NOUNS_NAME, &method, &params).await
}

async fn handle_named(
    State(state): State<HttpState>,
    Path(name): Path<String>,
    method: Method,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let name = format!("/{name}");
    serve_source(&state, &name, &method, &params).await
}

async fn serve_source(
    state: &HttpState,
    name: &str,
    method: &Method,
    params: &HashMap<String, String>,
) -> Response {
    let Some(source) = state.sources.get(name) else {
        return (StatusCode::NOT_FOUND, "404 page not found\n").into_response();
    };

    if *method == Method::GET {
        // ?watch=1 is the convenience for http clients that don't easily
        // support custom method strings
        let watch = params.get("watch").is_some_and(|v| !v.is_empty());
        if watch {
            do_watch(source, params).await
        } else {
            do_get(source, params)
        }
    } else if method.as_str().eq_ignore_ascii_case("WATCH") {
        do_watch(source, params).await
    } else {
        (
            StatusCode::METHOD_NOT_ALLOWED,
            [(header::ALLOW, "GET, WATCH")],
            "405 Invalid Method\n",
        )
            .into_response()
    }
}

fn do_get(source: Arc<dyn DataSource>, params: &HashMap<String, String>) -> Response {
    let format = match determine_format(source.as_ref(), params.get("format")) {
        Ok(format) => format,
        Err(response) => return response,
    };

    let mut buf = Vec::new();
    match source.get(&format, &mut buf) {
        Ok(()) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, content_type_for(&format))],
            buf,
        )
            .into_response(),
        Err(SourceError::NotGetable) => {
            (StatusCode::NOT_IMPLEMENTED, "501 source does not support Get\n").into_response()
        }
        Err(SourceError::UnsupportedFormat) => unsupported_format(),
        Err(err) => internal_error(source.name(), err),
    }
}

async fn do_watch(source: Arc<dyn DataSource>, params: &HashMap<String, String>) -> Response {
    let format = match determine_format(source.as_ref(), params.get("format")) {
        Ok(format) => format,
        Err(response) => return response,
    };

    let (ready_tx, mut ready_rx) = mpsc::channel(1);
    let buf = Arc::new(ChunkBuf::new(ready_tx, ()));

    match source.watch(&format, buf.clone()) {
        Ok(()) => {}
        Err(SourceError::NotWatchable) => {
            return (
                StatusCode::NOT_IMPLEMENTED,
                "501 source does not support Watch\n",
            )
                .into_response();
        }
        Err(SourceError::UnsupportedFormat) => return unsupported_format(),
        Err(err) => return internal_error(source.name(), err),
    }

    // forward drained chunks into the response body; a dropped body means
    // the client went away, which closes the buffer and gets this
    // subscription evicted on the next delivery
    let (body_tx, body_rx) = mpsc::channel::<Result<Bytes, std::io::Error>>(1);
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = body_tx.closed() => break,
                ready = ready_rx.recv() => match ready {
                    Some(()) => {
                        let data = buf.drain();
                        if data.is_empty() {
                            continue;
                        }
                        if body_tx.send(Ok(Bytes::from(data))).await.is_err() {
                            break;
                        }
                    }
                    None => break,
                },
            }
        }
        let _ = buf.close();
    });

    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, content_type_for(&format))],
        Body::from_stream(ReceiverStream::new(body_rx)),
    )
        .into_response()
}

/// Pick the response format: an explicit `format=` wins (400 if the source
/// does not list it), then the first supported default, then whatever the
/// source lists first.
fn determine_format(
    source: &dyn DataSource,
    requested: Option<&String>,
) -> Result<String, Response> {
    let formats = source.formats();

    if let Some(want) = requested.filter(|want| !want.is_empty()) {
        for format in &formats {
            if format.eq_ignore_ascii_case(want) {
                return Ok(format.clone());
            }
        }
        return Err(unsupported_format());
    }

    for preferred in DEFAULT_FORMATS {
        for format in &formats {
            if format.eq_ignore_ascii_case(preferred) {
                return Ok(format.clone());
            }
        }
    }

    match formats.into_iter().next() {
        Some(format) => Ok(format),
        None => Err(unsupported_format()),
    }
}

fn content_type_for(format: &str) -> &'static str {
    match format {
        "json" => "application/json",
        "text" => "text/plain",
        "html" => "text/html",
        _ => "application/octet",
    }
}

fn unsupported_format() -> Response {
    (
        StatusCode::BAD_REQUEST,
        "400 Bad Request\nUnsupported Format\n",
    )
        .into_response()
}

fn internal_error(name: &str, err: SourceError) -> Response {
    warn!(source = name, error = %err, "data source serve failed");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        "500 Internal Server Error\n",
    )
        .into_response()
}

// ============================================================================
// /listen
// ============================================================================

#[derive(Deserialize)]
struct ListenForm {
    #[serde(default)]
    address: String,
    #[serde(default)]
    stop: String,
}

async fn listen_status(State(state): State<HttpState>) -> Response {
    let Some(servable) = &state.servable else {
        return (StatusCode::NOT_FOUND, "404 page not found\n").into_response();
    };
    match servable.addr() {
        Some(addr) => (StatusCode::OK, format!("{addr}\n")).into_response(),
        None => (
            StatusCode::SERVICE_UNAVAILABLE,
            "503 Not Listening\nServer not started, POST an address to start it.\n",
        )
            .into_response(),
    }
}

async fn listen_control(
    State(state): State<HttpState>,
    Form(form): Form<ListenForm>,
) -> Response {
    let Some(servable) = &state.servable else {
        return (StatusCode::NOT_FOUND, "404 page not found\n").into_response();
    };

    if !form.stop.is_empty() {
        return match servable.addr() {
            None => (StatusCode::OK, "not running\n").into_response(),
            Some(_) => match servable.stop().await {
                Ok(()) => (StatusCode::OK, "stopped\n").into_response(),
                Err(err) => (StatusCode::OK, err.to_string()).into_response(),
            },
        };
    }

    if form.address.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            "400 Missing \"address\" form value.\n",
        )
            .into_response();
    }

    match servable.start_on(&form.address).await {
        Ok(addr) => (StatusCode::CREATED, format!("{addr}\n")).into_response(),
        Err(err) => (
            StatusCode::SERVICE_UNAVAILABLE,
            format!("503 Unable to start server\nstart failed: {err}\n"),
        )
            .into_response(),
    }
}

#[cfg(test)]
#[path = "http_test.rs"]
mod tests;

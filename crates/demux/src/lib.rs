//! Scry Demux - one listening endpoint, many wire protocols
//!
//! A [`DemuxServer`] accepts TCP connections and routes each one to the
//! first [`Detector`] whose predicate matches the connection's leading
//! bytes:
//!
//! ```text
//! accept ──▶ read leading bytes ──▶ detector 1? ──▶ handler + BufConn
//!                     │                  no
//!                     ▼                  ▼
//!              (wait for more)      detector 2? ...
//! ```
//!
//! The winning handler receives a [`BufConn`] that transparently replays the
//! already-read bytes before falling through to the socket, so detection is
//! invisible to protocol code. [`ListenerShim`] adapts a detector slot into
//! an `axum::serve::Listener` so an entire HTTP server can sit behind one
//! detector, Go-`net.Listener`-style.

mod buf_conn;
mod detector;
mod listener;
mod server;

pub use buf_conn::BufConn;
pub use detector::{ConnHandler, Detector};
pub use listener::{listener_shim, ListenerShim, ShimHandle};
pub use server::DemuxServer;

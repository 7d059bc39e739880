//! Scry Serve - protocol surfaces over the source registry
//!
//! One listening endpoint serves two protocols, demultiplexed by the first
//! byte of each connection:
//!
//! - an HTTP/REST surface: `GET <prefix>/<name>` for snapshots and
//!   `WATCH <prefix>/<name>` (or `GET ...?watch=1`) for chunked streams
//! - a RESP surface: `LS`, `GET`, `WATCH` and `MONITOR` commands, with many
//!   watched sources multiplexed into one reply stream
//!
//! Subscribers never touch sockets directly: each one owns a chunk or item
//! buffer that the source pump fills and signals, and the connection task
//! drains on its own schedule. A slow consumer therefore stalls only its own
//! buffer; the source sheds it rather than blocking producers.

mod auto;
mod chan_buf;
mod http;
mod item_buf;
mod redis;

pub use auto::{resp_detector, serve_auto};
pub use chan_buf::ChunkBuf;
pub use http::{router, ListenError, Servable};
pub use item_buf::ItemBuf;
pub use redis::serve_resp_connection;

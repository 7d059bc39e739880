//! Scry Marshaled - the marshaled-source engine
//!
//! [`MarshaledSource`] wraps a format-agnostic [`scry_source::GenericDataSource`]
//! and provides one or more serialized formats for it:
//!
//! ```text
//! application source ──HandleItem(s)──▶ bounded handoff ──▶ pump task
//!                                                              │
//!                                               per-format MarshaledWatcher
//!                                                 │                  │
//!                                          byte-stream subs     item subs
//!                                          (framed writes)   (marshaled bytes)
//! ```
//!
//! The source is dormant until the first subscriber attaches: subscribing
//! allocates fresh handoff channels, starts exactly one pump task and fires
//! the wrapped source's activate hook. When the last subscriber is gone, or
//! the producer outruns the pump past the bounded handoff wait, the source
//! sheds all subscribers and deactivates. Debug-heavy sources therefore cost
//! nothing when nobody is looking.

mod json;
mod source;
mod template;
mod watcher;

pub use json::LdJsonFormat;
pub use source::{MarshaledConfig, MarshaledSource};
pub use template::{StringifyFormat, TemplatedFormat};

use bytes::{BufMut, Bytes, BytesMut};

/// Append the newline record delimiter used by the built-in stream framings.
pub(crate) fn frame_line(item: Bytes) -> Bytes {
    let mut framed = BytesMut::with_capacity(item.len() + 1);
    framed.extend_from_slice(&item);
    framed.put_u8(b'\n');
    framed.freeze()
}

//! The marshaled-level source interface consumed by registry and protocols

use std::io;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::Result;
use crate::generic::Attrs;
use crate::item::ItemDataSource;

/// A byte sink attached to a watch stream.
///
/// Writes happen from the source's pump; the subscriber that created the sink
/// drains it from its own task. A write error evicts the sink from the
/// stream; `close` is called when the stream tears the subscriber down.
pub trait WatchSink: Send + Sync {
    /// Append framed stream bytes.
    fn write(&self, buf: &[u8]) -> Result<()>;

    /// Release the sink; idempotent.
    fn close(&self) -> Result<()> {
        Ok(())
    }
}

/// The low-level interface implemented by all registered data sources.
///
/// On formats, implementations must support "json", should support "text",
/// and may support anything else that makes sense for them. At this level
/// sources are responsible for both item marshaling and stream framing:
/// "json" streams are compact records separated by `\n`, "text" streams are
/// newline-separated logical units.
pub trait DataSource: Send + Sync {
    /// The unique noun path for this source.
    fn name(&self) -> &str;

    /// Supported format names, sorted.
    fn formats(&self) -> Vec<String>;

    /// Arbitrary descriptive data, exposed by `/meta/nouns`.
    fn attrs(&self) -> Attrs;

    /// Format and write any available snapshot data in one call.
    ///
    /// Returns `NotGetable` when the source has no snapshot operation and
    /// `UnsupportedFormat` for unknown formats (case-insensitive lookup).
    fn get(&self, format: &str, out: &mut dyn io::Write) -> Result<()>;

    /// Attach a framed byte-stream subscriber.
    ///
    /// Any initial data is written before this returns; an initial write
    /// error aborts the subscription. The sink is retained and written to
    /// until it errors.
    fn watch(&self, format: &str, sink: Arc<dyn WatchSink>) -> Result<()>;

    /// Marshaled-but-unframed subscription support, if any.
    fn as_item_source(&self) -> Option<&dyn ItemDataSource> {
        None
    }

    /// Drain support, if any.
    fn as_drainable(&self) -> Option<&dyn DrainableSource> {
        None
    }
}

/// A source that can be drained: flush pending items, close any remaining
/// subscribers and go inactive.
#[async_trait]
pub trait DrainableSource: Send + Sync {
    /// Synchronously-observable and idempotent drain.
    async fn drain(&self);
}

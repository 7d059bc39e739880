//! Per-subscriber byte accumulator with one-shot ready signaling

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::debug;

use scry_source::{Result, SourceError, WatchSink};

struct Inner {
    data: Vec<u8>,
    closed: bool,
    pending: bool,
}

/// A growable byte buffer bridging a source pump to a consumer task.
///
/// The pump appends via [`WatchSink::write`]; the first append since the last
/// drain sends the buffer's token on the ready channel. The pending flag
/// coalesces bursts of writes into one ready event, so the consumer never
/// counts, it just drains when signaled, and the channel holds at most one
/// outstanding signal per buffer.
///
/// The token identifies the buffer to consumers selecting over many buffers
/// on one channel; use `()` for a single buffer.
pub struct ChunkBuf<T> {
    inner: Mutex<Inner>,
    ready: mpsc::Sender<T>,
    token: T,
}

impl<T: Clone + Send + Sync + 'static> ChunkBuf<T> {
    /// A buffer signaling `token` on `ready`.
    pub fn new(ready: mpsc::Sender<T>, token: T) -> Self {
        Self {
            inner: Mutex::new(Inner {
                data: Vec::new(),
                closed: false,
                pending: false,
            }),
            ready,
            token,
        }
    }

    /// Take everything written since the previous drain, leaving the buffer
    /// empty and re-arming the ready signal.
    pub fn drain(&self) -> Vec<u8> {
        let mut inner = self.inner.lock();
        inner.pending = false;
        std::mem::take(&mut inner.data)
    }

    /// True once the buffer was closed.
    pub fn is_closed(&self) -> bool {
        self.inner.lock().closed
    }
}

impl<T: Clone + Send + Sync + 'static> WatchSink for ChunkBuf<T> {
    fn write(&self, buf: &[u8]) -> Result<()> {
        let signal = {
            let mut inner = self.inner.lock();
            if inner.closed {
                return Err(SourceError::BufferClosed);
            }
            inner.data.extend_from_slice(buf);
            if !buf.is_empty() && !inner.pending {
                inner.pending = true;
                true
            } else {
                false
            }
        };
        // send outside the lock; the pending flag bounds this to one
        // outstanding signal, so a full channel is a bug, not backpressure
        if signal && self.ready.try_send(self.token.clone()).is_err() {
            debug!("chunk buffer ready channel rejected signal");
        }
        Ok(())
    }

    fn close(&self) -> Result<()> {
        self.inner.lock().closed = true;
        Ok(())
    }
}

#[cfg(test)]
#[path = "chan_buf_test.rs"]
mod tests;

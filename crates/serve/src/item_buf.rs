//! Per-subscriber queue of marshaled items with one-shot ready signaling

use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::debug;

use scry_source::{ItemWatcher, Result, SourceError};

struct Inner {
    items: Vec<Bytes>,
    closed: bool,
    pending: bool,
}

/// The item-stream analog of [`crate::ChunkBuf`]: stores already-marshaled
/// items instead of framed bytes, with the same pending-flag ready contract.
pub struct ItemBuf<T> {
    inner: Mutex<Inner>,
    ready: mpsc::Sender<T>,
    token: T,
}

impl<T: Clone + Send + Sync + 'static> ItemBuf<T> {
    /// A buffer signaling `token` on `ready`.
    pub fn new(ready: mpsc::Sender<T>, token: T) -> Self {
        Self {
            inner: Mutex::new(Inner {
                items: Vec::new(),
                closed: false,
                pending: false,
            }),
            ready,
            token,
        }
    }

    /// Take all items queued since the previous drain.
    pub fn drain(&self) -> Vec<Bytes> {
        let mut inner = self.inner.lock();
        inner.pending = false;
        std::mem::take(&mut inner.items)
    }

    /// True once the buffer was closed.
    pub fn is_closed(&self) -> bool {
        self.inner.lock().closed
    }

    fn put(&self, items: &[Bytes]) -> Result<bool> {
        let mut inner = self.inner.lock();
        if inner.closed {
            return Err(SourceError::ItemBufferClosed);
        }
        inner.items.extend(items.iter().cloned());
        if !items.is_empty() && !inner.pending {
            inner.pending = true;
            return Ok(true);
        }
        Ok(false)
    }

    fn signal(&self) {
        if self.ready.try_send(self.token.clone()).is_err() {
            debug!("item buffer ready channel rejected signal");
        }
    }
}

impl<T: Clone + Send + Sync + 'static> ItemWatcher for ItemBuf<T> {
    fn handle_item(&self, item: Bytes) -> Result<()> {
        if self.put(std::slice::from_ref(&item))? {
            self.signal();
        }
        Ok(())
    }

    fn handle_items(&self, items: &[Bytes]) -> Result<()> {
        if self.put(items)? {
            self.signal();
        }
        Ok(())
    }

    fn close(&self) -> Result<()> {
        self.inner.lock().closed = true;
        Ok(())
    }
}

#[cfg(test)]
#[path = "item_buf_test.rs"]
mod tests;

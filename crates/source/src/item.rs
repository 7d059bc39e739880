//! Marshaled-but-unframed item subscriptions
//!
//! Protocols that do their own framing (the RESP monitor) subscribe through
//! [`ItemDataSource::watch_items`] and receive serialized item bytes without
//! the format's stream framing applied.

use std::sync::Arc;

use bytes::Bytes;

use crate::error::Result;

/// Implemented by sources that can hand out marshaled, unframed item streams.
pub trait ItemDataSource: Send + Sync {
    /// All of the semantics of [`crate::DataSource::watch`], over an
    /// [`ItemWatcher`] instead of a byte sink.
    fn watch_items(&self, format: &str, watcher: Arc<dyn ItemWatcher>) -> Result<()>;
}

/// A subscriber receiving marshaled items. Any error return means the watcher
/// must not be called with more items; it is evicted from the stream.
pub trait ItemWatcher: Send + Sync {
    /// Receive a single marshaled item; returns any framing or write error.
    fn handle_item(&self, item: Bytes) -> Result<()>;

    /// Receive a batch of marshaled items; returns any framing or write error.
    fn handle_items(&self, items: &[Bytes]) -> Result<()>;

    /// Release the watcher; idempotent.
    fn close(&self) -> Result<()> {
        Ok(())
    }
}

/// Convenience [`ItemWatcher`] over a per-item function.
pub struct ItemWatcherFn<F>(pub F);

impl<F> ItemWatcher for ItemWatcherFn<F>
where
    F: Fn(&[u8]) -> Result<()> + Send + Sync,
{
    fn handle_item(&self, item: Bytes) -> Result<()> {
        (self.0)(&item)
    }

    fn handle_items(&self, items: &[Bytes]) -> Result<()> {
        for item in items {
            (self.0)(item)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SourceError;
    use parking_lot::Mutex;

    #[test]
    fn test_item_watcher_fn_forwards_each_item() {
        let seen = Mutex::new(Vec::new());
        let watcher = ItemWatcherFn(|item: &[u8]| {
            seen.lock().push(item.to_vec());
            Ok(())
        });

        watcher.handle_item(Bytes::from_static(b"a")).unwrap();
        watcher
            .handle_items(&[Bytes::from_static(b"b"), Bytes::from_static(b"c")])
            .unwrap();

        assert_eq!(*seen.lock(), vec![b"a".to_vec(), b"b".to_vec(), b"c".to_vec()]);
    }

    #[test]
    fn test_item_watcher_fn_stops_batch_on_error() {
        let count = Mutex::new(0usize);
        let watcher = ItemWatcherFn(|_: &[u8]| {
            let mut count = count.lock();
            *count += 1;
            if *count >= 2 {
                return Err(SourceError::ItemBufferClosed);
            }
            Ok(())
        });

        let items = [
            Bytes::from_static(b"a"),
            Bytes::from_static(b"b"),
            Bytes::from_static(b"c"),
        ];
        assert!(watcher.handle_items(&items).is_err());
        assert_eq!(*count.lock(), 2, "delivery stops at the first error");
    }
}

//! Per-format subscriber fan-out
//!
//! A `MarshaledWatcher` manages every subscriber of one format on one
//! marshaled source. The source calls `emit`/`emit_batch` for each data item
//! as long as any format still has a live subscriber; once the last watcher
//! goes idle the underlying generic source watch is ended.

use std::sync::Arc;

use bytes::Bytes;
use parking_lot::Mutex;
use tracing::warn;

use scry_source::{
    GenericDataFormat, GenericDataSource, Item, ItemWatcher, MultiError, Result, SourceError,
    WatchSink,
};

/// All subscribers of a single format on a single marshaled source.
pub(crate) struct MarshaledWatcher {
    source: Arc<dyn GenericDataSource>,
    format: Arc<dyn GenericDataFormat>,
    dfw: Arc<DefaultFrameWatcher>,
    watchers: Mutex<Vec<Arc<dyn ItemWatcher>>>,
}

impl MarshaledWatcher {
    pub(crate) fn new(
        source: Arc<dyn GenericDataSource>,
        format: Arc<dyn GenericDataFormat>,
    ) -> Self {
        Self {
            dfw: Arc::new(DefaultFrameWatcher::new(Arc::clone(&format))),
            source,
            format,
            watchers: Mutex::new(Vec::new()),
        }
    }

    /// Attach a framed byte-stream subscriber, writing any initial snapshot
    /// first. The shared default-frame watcher joins the subscriber list when
    /// its first writer arrives.
    pub(crate) fn add_sink(&self, sink: Arc<dyn WatchSink>) -> Result<()> {
        if let Some(initable) = self.source.as_watch_initable() {
            self.dfw.write_init(&initable.watch_init(), sink.as_ref())?;
        }
        if self.dfw.add_writer(sink) == 1 {
            self.watchers.lock().push(Arc::clone(&self.dfw) as Arc<dyn ItemWatcher>);
        }
        Ok(())
    }

    /// Attach an item subscriber, delivering any initial snapshot as a single
    /// marshaled item first.
    pub(crate) fn add_item_watcher(&self, watcher: Arc<dyn ItemWatcher>) -> Result<()> {
        if let Some(initable) = self.source.as_watch_initable() {
            let buf = self
                .format
                .marshal_init(&initable.watch_init())
                .map_err(|err| {
                    warn!(source = self.source.name(), error = %err, "initial marshaling error");
                    err
                })?;
            watcher.handle_item(buf)?;
        }
        self.watchers.lock().push(watcher);
        Ok(())
    }

    /// Serialize one item and deliver it to every subscriber, evicting any
    /// that fail. Survivor order is the attach order. Returns true while at
    /// least one subscriber remains.
    pub(crate) fn emit(&self, item: &Item) -> bool {
        let mut watchers = self.watchers.lock();
        if watchers.is_empty() {
            return false;
        }
        let data = match self.format.marshal_item(item) {
            Ok(data) => data,
            Err(err) => {
                warn!(source = self.source.name(), error = %err, "item marshaling error");
                return false;
            }
        };
        watchers.retain(|watcher| watcher.handle_item(data.clone()).is_ok());
        !watchers.is_empty()
    }

    /// Batch variant of [`emit`]: each item is marshaled once and the full
    /// list handed to every subscriber.
    pub(crate) fn emit_batch(&self, items: &[Item]) -> bool {
        let mut watchers = self.watchers.lock();
        if watchers.is_empty() {
            return false;
        }
        let mut data = Vec::with_capacity(items.len());
        for item in items {
            match self.format.marshal_item(item) {
                Ok(buf) => data.push(buf),
                Err(err) => {
                    warn!(source = self.source.name(), error = %err, "item marshaling error");
                    return false;
                }
            }
        }
        watchers.retain(|watcher| watcher.handle_items(&data).is_ok());
        !watchers.is_empty()
    }

    /// Close and drop every subscriber of this format.
    pub(crate) fn close(&self) -> Option<SourceError> {
        let drained = std::mem::take(&mut *self.watchers.lock());
        let mut errs = Vec::new();
        for watcher in drained {
            if let Err(err) = watcher.close() {
                errs.push(err);
            }
        }
        MultiError::as_error(errs)
    }

    #[cfg(test)]
    pub(crate) fn subscriber_count(&self) -> usize {
        self.watchers.lock().len()
    }
}

/// The shared framing subscriber for byte-stream (`watch`) subscriptions.
///
/// One instance per format accepts marshaled bytes, frames them and writes to
/// every attached sink; a failing sink is removed alone. When the last sink
/// is gone it returns [`SourceError::AllWritersDone`] so the parent watcher
/// drops it from the subscriber list.
pub(crate) struct DefaultFrameWatcher {
    format: Arc<dyn GenericDataFormat>,
    writers: Mutex<Vec<Arc<dyn WatchSink>>>,
}

impl DefaultFrameWatcher {
    fn new(format: Arc<dyn GenericDataFormat>) -> Self {
        Self {
            format,
            writers: Mutex::new(Vec::new()),
        }
    }

    /// Marshal, frame and write initial snapshot data to one sink.
    fn write_init(&self, init: &Item, sink: &dyn WatchSink) -> Result<()> {
        let buf = self.format.marshal_init(init).map_err(|err| {
            warn!(error = %err, "initial marshaling error");
            err
        })?;
        let buf = self.format.frame_item(buf).map_err(|err| {
            warn!(error = %err, "initial framing error");
            err
        })?;
        sink.write(&buf)?;
        Ok(())
    }

    /// Attach a sink, returning the new writer count.
    fn add_writer(&self, sink: Arc<dyn WatchSink>) -> usize {
        let mut writers = self.writers.lock();
        writers.push(sink);
        writers.len()
    }

    fn write_framed(&self, item: Bytes) -> Result<()> {
        let mut writers = self.writers.lock();
        if writers.is_empty() {
            return Err(SourceError::AllWritersDone);
        }
        let buf = self.format.frame_item(item).map_err(|err| {
            warn!(error = %err, "item framing error");
            err
        })?;
        writers.retain(|writer| writer.write(&buf).is_ok());
        if writers.is_empty() {
            return Err(SourceError::AllWritersDone);
        }
        Ok(())
    }
}

impl ItemWatcher for DefaultFrameWatcher {
    fn handle_item(&self, item: Bytes) -> Result<()> {
        self.write_framed(item)
    }

    fn handle_items(&self, items: &[Bytes]) -> Result<()> {
        for item in items {
            self.write_framed(item.clone())?;
        }
        Ok(())
    }

    fn close(&self) -> Result<()> {
        let drained = std::mem::take(&mut *self.writers.lock());
        let mut errs = Vec::new();
        for writer in drained {
            if let Err(err) = writer.close() {
                errs.push(err);
            }
        }
        match MultiError::as_error(errs) {
            None => Ok(()),
            Some(err) => Err(err),
        }
    }
}

#[cfg(test)]
#[path = "watcher_test.rs"]
mod tests;

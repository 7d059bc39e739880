//! The marshaled data source
//!
//! `MarshaledSource` wraps a format-agnostic source and provides one or more
//! formats for it. It implements:
//!
//! - [`DataSource`] to satisfy the registry and the low level protocols
//! - [`ItemDataSource`] so higher level protocols may add their own framing
//! - [`GenericDataWatcher`] inwardly, as the handoff target of the wrapped
//!   generic source

use std::collections::HashMap;
use std::io::{self, Write};
use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::warn;

use scry_source::{
    Attrs, DataSource, DrainableSource, GenericDataFormat, GenericDataSource, GenericDataWatcher,
    Item, ItemDataSource, ItemWatcher, Result, SourceError, WatchSink, WatcherHandle,
};

use crate::json::LdJsonFormat;
use crate::template::{StringifyFormat, TemplatedFormat};
use crate::watcher::MarshaledWatcher;

/// Default capacity of the single-item handoff channel
const DEFAULT_MAX_ITEMS: usize = 100;

/// Default capacity of the batch handoff channel
const DEFAULT_MAX_BATCHES: usize = 100;

/// Default bounded wait before a stalled handoff sheds all watchers
const DEFAULT_MAX_WAIT: Duration = Duration::from_micros(100);

/// Tuning knobs for a marshaled source.
///
/// The handoff wait is the backpressure policy: producers wait at most this
/// long for the pump before the source deactivates and sheds its watchers.
/// It must be bounded and non-zero.
#[derive(Debug, Clone, Copy)]
pub struct MarshaledConfig {
    /// Capacity of the single-item handoff channel
    pub max_items: usize,
    /// Capacity of the batch handoff channel
    pub max_batches: usize,
    /// Bounded handoff wait before shedding watchers
    pub max_wait: Duration,
}

impl Default for MarshaledConfig {
    fn default() -> Self {
        Self {
            max_items: DEFAULT_MAX_ITEMS,
            max_batches: DEFAULT_MAX_BATCHES,
            max_wait: DEFAULT_MAX_WAIT,
        }
    }
}

impl MarshaledConfig {
    /// Override the bounded handoff wait.
    pub fn with_max_wait(mut self, max_wait: Duration) -> Self {
        self.max_wait = max_wait;
        self
    }
}

struct PumpState {
    active: bool,
    epoch: u64,
    item_tx: Option<flume::Sender<Item>>,
    items_tx: Option<flume::Sender<Vec<Item>>>,
    pump: Option<JoinHandle<()>>,
}

/// A format-providing wrapper around one generic data source.
pub struct MarshaledSource {
    source: Arc<dyn GenericDataSource>,
    formats: HashMap<String, Arc<dyn GenericDataFormat>>,
    format_names: Vec<String>,
    watchers: HashMap<String, Arc<MarshaledWatcher>>,
    watchable: bool,
    config: MarshaledConfig,
    state: Mutex<PumpState>,
    selfref: Weak<MarshaledSource>,
}

enum Subscription {
    Sink(Arc<dyn WatchSink>),
    Items(Arc<dyn ItemWatcher>),
}

impl MarshaledSource {
    /// Wrap a generic source with the built-in formats.
    pub fn new(source: Arc<dyn GenericDataSource>) -> Arc<Self> {
        Self::with_formats(source, HashMap::new())
    }

    /// Wrap a generic source with integrator-supplied formats in addition to
    /// the built-in ones.
    pub fn with_formats(
        source: Arc<dyn GenericDataSource>,
        formats: HashMap<String, Arc<dyn GenericDataFormat>>,
    ) -> Arc<Self> {
        Self::with_config(source, formats, MarshaledConfig::default())
    }

    /// Wrap a generic source with explicit formats and tuning.
    pub fn with_config(
        source: Arc<dyn GenericDataSource>,
        formats: HashMap<String, Arc<dyn GenericDataFormat>>,
        config: MarshaledConfig,
    ) -> Arc<Self> {
        let mut formats: HashMap<String, Arc<dyn GenericDataFormat>> = formats
            .into_iter()
            .map(|(name, format)| (name.to_ascii_lowercase(), format))
            .collect();

        // source-defined formats win over integrator-supplied ones
        for (name, format) in source.formats() {
            formats.insert(name.to_ascii_lowercase(), format);
        }

        // standard json protocol
        formats
            .entry("json".to_owned())
            .or_insert_with(|| Arc::new(LdJsonFormat));

        // convenience templated text protocol, stringification when the
        // source has no template
        if !formats.contains_key("text") {
            let text: Arc<dyn GenericDataFormat> = match source.text_template() {
                Some(template) => Arc::new(TemplatedFormat::new(template)),
                None => Arc::new(StringifyFormat),
            };
            formats.insert("text".to_owned(), text);
        }

        let mut format_names: Vec<String> = formats.keys().cloned().collect();
        format_names.sort();

        let watchers = formats
            .iter()
            .map(|(name, format)| {
                (
                    name.clone(),
                    Arc::new(MarshaledWatcher::new(
                        Arc::clone(&source),
                        Arc::clone(format),
                    )),
                )
            })
            .collect();

        let watchable = source.as_watchable().is_some();
        let this = Arc::new_cyclic(|selfref| Self {
            source,
            formats,
            format_names,
            watchers,
            watchable,
            config,
            state: Mutex::new(PumpState {
                active: false,
                epoch: 0,
                item_tx: None,
                items_tx: None,
                pump: None,
            }),
            selfref: selfref.clone(),
        });

        if let Some(watchable) = this.source.as_watchable() {
            let watcher: Weak<dyn GenericDataWatcher> = this.selfref.clone();
            watchable.set_watcher(WatcherHandle::new(watcher));
        }

        this
    }

    /// True while any subscriber is attached. A false return here also means
    /// `handle_item` and `handle_items` will refuse new data.
    pub fn is_active(&self) -> bool {
        let state = self.state.lock();
        state.active && state.item_tx.is_some() && state.items_tx.is_some()
    }

    fn subscribe(&self, format: &str, subscription: Subscription) -> Result<()> {
        if !self.watchable {
            return Err(SourceError::NotWatchable);
        }
        let watcher = self
            .watchers
            .get(&format.to_ascii_lowercase())
            .ok_or(SourceError::UnsupportedFormat)?;

        // init marshaling and the first sink write happen outside the state
        // mutex; it guards only the activation fields
        match subscription {
            Subscription::Sink(sink) => watcher.add_sink(sink)?,
            Subscription::Items(items) => watcher.add_item_watcher(items)?,
        }

        let acted = {
            let mut state = self.state.lock();
            let acted = !state.active;
            if acted {
                self.start_pump(&mut state);
            }
            acted
        };
        if acted {
            if let Some(activatable) = self.source.as_activatable() {
                activatable.activate();
            }
        }
        Ok(())
    }

    /// Flip the active bit, allocate fresh handoff channels and start exactly
    /// one pump task. Caller holds the state lock.
    fn start_pump(&self, state: &mut PumpState) {
        state.active = true;
        let (item_tx, item_rx) = flume::bounded(self.config.max_items);
        let (items_tx, items_rx) = flume::bounded(self.config.max_batches);
        state.item_tx = Some(item_tx);
        state.items_tx = Some(items_tx);
        state.epoch += 1;
        let epoch = state.epoch;
        if let Some(this) = self.selfref.upgrade() {
            state.pump = Some(tokio::spawn(this.run_pump(item_rx, items_rx, epoch)));
        }
    }

    async fn run_pump(
        self: Arc<Self>,
        item_rx: flume::Receiver<Item>,
        items_rx: flume::Receiver<Vec<Item>>,
        epoch: u64,
    ) {
        let mut stop = false;
        let mut item_open = true;
        let mut items_open = true;

        loop {
            if !self.state.lock().active {
                break;
            }
            tokio::select! {
                item = item_rx.recv_async(), if item_open => match item {
                    Ok(item) => {
                        let mut any = false;
                        for watcher in self.watchers.values() {
                            if watcher.emit(&item) {
                                any = true;
                            }
                        }
                        if !any {
                            stop = true;
                            break;
                        }
                    }
                    Err(_) => item_open = false,
                },
                items = items_rx.recv_async(), if items_open => match items {
                    Ok(items) => {
                        let mut any = false;
                        for watcher in self.watchers.values() {
                            if watcher.emit_batch(&items) {
                                any = true;
                            }
                        }
                        if !any {
                            stop = true;
                            break;
                        }
                    }
                    Err(_) => items_open = false,
                },
                else => break,
            }
        }

        let close = {
            let mut state = self.state.lock();
            if state.epoch == epoch {
                state.item_tx = None;
                state.items_tx = None;
            }
            if stop {
                state.active = false;
            }
            stop
        };
        if close {
            self.close_watchers();
        }
    }

    /// Deactivate after a stalled handoff: clear the active flag and close
    /// every subscriber of every format.
    fn shed(&self) -> bool {
        let stop = {
            let mut state = self.state.lock();
            std::mem::replace(&mut state.active, false)
        };
        if stop {
            self.close_watchers();
        }
        false
    }

    fn close_watchers(&self) {
        for watcher in self.watchers.values() {
            if let Some(err) = watcher.close() {
                warn!(source = self.source.name(), error = %err, "error closing watchers");
            }
        }
    }

}

impl DataSource for MarshaledSource {
    fn name(&self) -> &str {
        self.source.name()
    }

    fn formats(&self) -> Vec<String> {
        self.format_names.clone()
    }

    fn attrs(&self) -> Attrs {
        self.source.attrs()
    }

    fn get(&self, format: &str, out: &mut dyn io::Write) -> Result<()> {
        let getable = self.source.as_getable().ok_or(SourceError::NotGetable)?;
        let codec = self
            .formats
            .get(&format.to_ascii_lowercase())
            .ok_or(SourceError::UnsupportedFormat)?;
        let buf = codec.marshal_get(&getable.get()).map_err(|err| {
            warn!(source = self.source.name(), error = %err, "get marshaling error");
            err
        })?;
        out.write_all(&buf)?;
        Ok(())
    }

    fn watch(&self, format: &str, sink: Arc<dyn WatchSink>) -> Result<()> {
        self.subscribe(format, Subscription::Sink(sink))
    }

    fn as_item_source(&self) -> Option<&dyn ItemDataSource> {
        Some(self)
    }

    fn as_drainable(&self) -> Option<&dyn DrainableSource> {
        Some(self)
    }
}

impl ItemDataSource for MarshaledSource {
    fn watch_items(&self, format: &str, watcher: Arc<dyn ItemWatcher>) -> Result<()> {
        self.subscribe(format, Subscription::Items(watcher))
    }
}

#[async_trait]
impl DrainableSource for MarshaledSource {
    /// Close the handoff channels, wait for the pump to finish, then close
    /// any remaining watchers and go inactive. Idempotent.
    async fn drain(&self) {
        let (pump, any) = {
            let mut state = self.state.lock();
            let had_items = state.item_tx.take().is_some();
            let had_batches = state.items_tx.take().is_some();
            (state.pump.take(), had_items || had_batches)
        };
        if any {
            if let Some(pump) = pump {
                let _ = pump.await;
            }
        }
        let stop = {
            let mut state = self.state.lock();
            std::mem::replace(&mut state.active, false)
        };
        if stop {
            self.close_watchers();
        }
    }
}

impl GenericDataWatcher for MarshaledSource {
    fn active(&self) -> bool {
        self.is_active()
    }

    fn handle_item(&self, item: Item) -> bool {
        let tx = {
            let state = self.state.lock();
            if !state.active {
                return false;
            }
            state.item_tx.clone()
        };
        let Some(tx) = tx else {
            return false;
        };
        match tx.send_timeout(item, self.config.max_wait) {
            Ok(()) => true,
            Err(_) => self.shed(),
        }
    }

    fn handle_items(&self, items: Vec<Item>) -> bool {
        let tx = {
            let state = self.state.lock();
            if !state.active {
                return false;
            }
            state.items_tx.clone()
        };
        let Some(tx) = tx else {
            return false;
        };
        match tx.send_timeout(items, self.config.max_wait) {
            Ok(()) => true,
            Err(_) => self.shed(),
        }
    }
}

#[cfg(test)]
#[path = "source_test.rs"]
mod tests;

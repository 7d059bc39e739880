//! Reporting observed items to a logging function
//!
//! A [`LogReporter`] tails a source's "text" items into a caller-supplied
//! sink function, by default structured `tracing` output. Useful for wiring
//! a debug source into ordinary process logs without a client attached.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use thiserror::Error;
use tracing::info;

use scry_source::{DataSource, ItemWatcher, SourceError};

/// Errors from starting a reporter.
#[derive(Debug, Error)]
pub enum ReportError {
    /// The source cannot hand out marshaled item streams
    #[error("raw sources unsupported, only item data sources")]
    RawSource,

    /// The underlying watch failed
    #[error(transparent)]
    Source(#[from] SourceError),
}

type ReportSink = Box<dyn Fn(&str, &str) + Send + Sync>;

/// Forwards a source's "text" items to a formatting function.
pub struct LogReporter {
    source: Arc<dyn DataSource>,
    sink: ReportSink,
    stopped: AtomicBool,
}

impl LogReporter {
    /// A reporter logging each item through `tracing` at info level.
    pub fn new(source: Arc<dyn DataSource>) -> Arc<Self> {
        Self::with_sink(source, |name, line| {
            info!(source = name, "{line}");
        })
    }

    /// A reporter with a custom sink; the sink receives the source name and
    /// one item line per call and handles its own framing.
    pub fn with_sink(
        source: Arc<dyn DataSource>,
        sink: impl Fn(&str, &str) + Send + Sync + 'static,
    ) -> Arc<Self> {
        Arc::new(Self {
            source,
            sink: Box::new(sink),
            stopped: AtomicBool::new(false),
        })
    }

    /// The reported source.
    pub fn source(&self) -> &Arc<dyn DataSource> {
        &self.source
    }

    /// Clear any stop flag and start watching the source.
    pub fn start(self: &Arc<Self>) -> Result<(), ReportError> {
        self.stopped.store(false, Ordering::SeqCst);
        let item_source = self.source.as_item_source().ok_or(ReportError::RawSource)?;
        let result = item_source.watch_items("text", Arc::clone(self) as Arc<dyn ItemWatcher>);
        if let Err(err) = result {
            self.stopped.store(true, Ordering::SeqCst);
            return Err(err.into());
        }
        Ok(())
    }

    /// Flag the reporter stopped; the next delivery errors out and removes
    /// the watcher resource.
    pub fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
    }
}

impl ItemWatcher for LogReporter {
    fn handle_item(&self, item: Bytes) -> scry_source::Result<()> {
        if self.stopped.load(Ordering::SeqCst) {
            return Err(SourceError::AllWritersDone);
        }
        let line = String::from_utf8_lossy(&item);
        (self.sink)(self.source.name(), &line);
        Ok(())
    }

    fn handle_items(&self, items: &[Bytes]) -> scry_source::Result<()> {
        if self.stopped.load(Ordering::SeqCst) {
            return Err(SourceError::AllWritersDone);
        }
        let name = self.source.name();
        for item in items {
            let line = String::from_utf8_lossy(item);
            (self.sink)(name, &line);
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "report_test.rs"]
mod tests;

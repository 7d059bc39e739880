//! Tests for per-format fan-out and eviction

use super::*;
use crate::json::LdJsonFormat;
use serde_json::json;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

struct NullSource;

impl GenericDataSource for NullSource {
    fn name(&self) -> &str {
        "/null"
    }
}

/// Sink that records framed writes and can be told to start failing
#[derive(Default)]
struct TestSink {
    data: Mutex<Vec<u8>>,
    writes: AtomicUsize,
    fail_after: Option<usize>,
    closed: AtomicBool,
}

impl TestSink {
    fn failing_after(n: usize) -> Self {
        Self {
            fail_after: Some(n),
            ..Default::default()
        }
    }

    fn text(&self) -> String {
        String::from_utf8(self.data.lock().clone()).unwrap()
    }
}

impl WatchSink for TestSink {
    fn write(&self, buf: &[u8]) -> scry_source::Result<()> {
        let n = self.writes.fetch_add(1, Ordering::SeqCst);
        if let Some(limit) = self.fail_after {
            if n >= limit {
                return Err(SourceError::BufferClosed);
            }
        }
        self.data.lock().extend_from_slice(buf);
        Ok(())
    }

    fn close(&self) -> scry_source::Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

fn watcher() -> MarshaledWatcher {
    MarshaledWatcher::new(Arc::new(NullSource), Arc::new(LdJsonFormat))
}

// ============================================================================
// Emit and eviction
// ============================================================================

#[test]
fn test_emit_without_subscribers_is_false() {
    let mw = watcher();
    assert!(!mw.emit(&json!(1)));
}

#[test]
fn test_emit_writes_framed_items_in_order() {
    let mw = watcher();
    let sink = Arc::new(TestSink::default());
    mw.add_sink(sink.clone()).unwrap();

    for i in 0..3 {
        assert!(mw.emit(&json!({ "i": i })));
    }
    assert_eq!(sink.text(), "{\"i\":0}\n{\"i\":1}\n{\"i\":2}\n");
}

#[test]
fn test_failing_sink_is_isolated() {
    let mw = watcher();
    let failing = Arc::new(TestSink::failing_after(1));
    let healthy = Arc::new(TestSink::default());
    mw.add_sink(failing.clone()).unwrap();
    mw.add_sink(healthy.clone()).unwrap();

    // first item reaches both, second evicts the failing sink only
    assert!(mw.emit(&json!(1)));
    assert!(mw.emit(&json!(2)));
    assert!(mw.emit(&json!(3)));

    assert_eq!(failing.text(), "1\n");
    assert_eq!(healthy.text(), "1\n2\n3\n");
}

#[test]
fn test_last_sink_failure_empties_watcher() {
    let mw = watcher();
    let failing = Arc::new(TestSink::failing_after(0));
    mw.add_sink(failing).unwrap();
    assert_eq!(mw.subscriber_count(), 1);

    // the frame watcher loses its only writer and evicts itself
    assert!(!mw.emit(&json!(1)));
    assert_eq!(mw.subscriber_count(), 0);
}

#[test]
fn test_emit_batch_marshals_once_per_item() {
    let mw = watcher();
    let sink = Arc::new(TestSink::default());
    mw.add_sink(sink.clone()).unwrap();

    assert!(mw.emit_batch(&[json!(1), json!(2)]));
    assert_eq!(sink.text(), "1\n2\n");
}

// ============================================================================
// Item subscribers
// ============================================================================

#[derive(Default)]
struct TestItemWatcher {
    items: Mutex<Vec<Bytes>>,
    fail: AtomicBool,
    closed: AtomicBool,
}

impl ItemWatcher for TestItemWatcher {
    fn handle_item(&self, item: Bytes) -> scry_source::Result<()> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(SourceError::ItemBufferClosed);
        }
        self.items.lock().push(item);
        Ok(())
    }

    fn handle_items(&self, items: &[Bytes]) -> scry_source::Result<()> {
        for item in items {
            self.handle_item(item.clone())?;
        }
        Ok(())
    }

    fn close(&self) -> scry_source::Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

#[test]
fn test_item_watchers_get_unframed_bytes() {
    let mw = watcher();
    let iw = Arc::new(TestItemWatcher::default());
    mw.add_item_watcher(iw.clone()).unwrap();

    assert!(mw.emit(&json!({ "v": 1 })));
    let items = iw.items.lock();
    assert_eq!(items.len(), 1);
    assert_eq!(&items[0][..], br#"{"v":1}"#);
}

#[test]
fn test_failed_item_watcher_does_not_disturb_survivors() {
    let mw = watcher();
    let flaky = Arc::new(TestItemWatcher::default());
    let steady = Arc::new(TestItemWatcher::default());
    mw.add_item_watcher(flaky.clone()).unwrap();
    mw.add_item_watcher(steady.clone()).unwrap();

    assert!(mw.emit(&json!(1)));
    flaky.fail.store(true, Ordering::SeqCst);
    assert!(mw.emit(&json!(2)));
    assert!(mw.emit(&json!(3)));

    assert_eq!(flaky.items.lock().len(), 1);
    assert_eq!(steady.items.lock().len(), 3);
    assert_eq!(mw.subscriber_count(), 1);
}

#[test]
fn test_close_closes_every_subscriber() {
    let mw = watcher();
    let sink = Arc::new(TestSink::default());
    let iw = Arc::new(TestItemWatcher::default());
    mw.add_sink(sink.clone()).unwrap();
    mw.add_item_watcher(iw.clone()).unwrap();

    assert!(mw.close().is_none());
    assert!(sink.closed.load(Ordering::SeqCst));
    assert!(iw.closed.load(Ordering::SeqCst));
    assert_eq!(mw.subscriber_count(), 0);
}

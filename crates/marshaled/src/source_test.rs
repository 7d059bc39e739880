//! Tests for the marshaled source engine

use super::*;
use bytes::Bytes;
use serde_json::json;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use scry_source::{ActivatableSource, GetableSource, WatchInitableSource, WatchableSource};

/// Watchable test source driven by the tests themselves
#[derive(Default)]
struct TestSource {
    watcher: Mutex<WatcherHandle>,
    activations: AtomicUsize,
    init: Option<Item>,
    snapshot: Option<Item>,
}

impl TestSource {
    fn watchable() -> Self {
        Self::default()
    }

    fn with_init(init: Item) -> Self {
        Self {
            init: Some(init),
            ..Default::default()
        }
    }

    fn with_snapshot(snapshot: Item) -> Self {
        Self {
            snapshot: Some(snapshot),
            ..Default::default()
        }
    }

    fn emit(&self, item: Item) -> bool {
        let watcher = self.watcher.lock().clone();
        watcher.handle_item(item)
    }

    fn emit_batch(&self, items: Vec<Item>) -> bool {
        let watcher = self.watcher.lock().clone();
        watcher.handle_items(items)
    }

    fn activations(&self) -> usize {
        self.activations.load(Ordering::SeqCst)
    }
}

impl GenericDataSource for TestSource {
    fn name(&self) -> &str {
        "/test"
    }

    fn as_watchable(&self) -> Option<&dyn WatchableSource> {
        Some(self)
    }

    fn as_activatable(&self) -> Option<&dyn ActivatableSource> {
        Some(self)
    }

    fn as_watch_initable(&self) -> Option<&dyn WatchInitableSource> {
        self.init.as_ref().map(|_| self as &dyn WatchInitableSource)
    }

    fn as_getable(&self) -> Option<&dyn GetableSource> {
        self.snapshot.as_ref().map(|_| self as &dyn GetableSource)
    }
}

impl WatchableSource for TestSource {
    fn set_watcher(&self, watcher: WatcherHandle) {
        *self.watcher.lock() = watcher;
    }
}

impl ActivatableSource for TestSource {
    fn activate(&self) {
        self.activations.fetch_add(1, Ordering::SeqCst);
    }
}

impl WatchInitableSource for TestSource {
    fn watch_init(&self) -> Item {
        self.init.clone().unwrap()
    }
}

impl GetableSource for TestSource {
    fn get(&self) -> Item {
        self.snapshot.clone().unwrap()
    }
}

/// Sink collecting framed bytes
#[derive(Default)]
struct CollectSink {
    data: Mutex<Vec<u8>>,
    closed: AtomicBool,
    slow: Option<Duration>,
}

impl CollectSink {
    fn text(&self) -> String {
        String::from_utf8(self.data.lock().clone()).unwrap()
    }

    fn lines(&self) -> usize {
        self.data.lock().iter().filter(|b| **b == b'\n').count()
    }
}

impl WatchSink for CollectSink {
    fn write(&self, buf: &[u8]) -> Result<()> {
        if let Some(pause) = self.slow {
            std::thread::sleep(pause);
        }
        self.data.lock().extend_from_slice(buf);
        Ok(())
    }

    fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

async fn wait_until(what: &str, cond: impl Fn() -> bool) {
    for _ in 0..400 {
        if cond() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("timed out waiting for {what}");
}

// ============================================================================
// Formats and snapshots
// ============================================================================

#[tokio::test]
async fn test_template_less_source_gets_stringified_text() {
    let mds = MarshaledSource::new(Arc::new(TestSource::with_snapshot(json!({"v": 1}))));
    assert_eq!(mds.formats(), vec!["json".to_owned(), "text".to_owned()]);

    let mut out = Vec::new();
    mds.get("text", &mut out).unwrap();
    assert_eq!(out, br#"{"v":1}"#);
}

#[tokio::test]
async fn test_source_declared_formats_are_merged() {
    struct CsvFormat;

    impl GenericDataFormat for CsvFormat {
        fn marshal_get(&self, item: &Item) -> Result<Bytes> {
            Ok(Bytes::from(format!("v,{item}").into_bytes()))
        }

        fn marshal_init(&self, item: &Item) -> Result<Bytes> {
            self.marshal_get(item)
        }

        fn marshal_item(&self, item: &Item) -> Result<Bytes> {
            self.marshal_get(item)
        }

        fn frame_item(&self, item: Bytes) -> Result<Bytes> {
            Ok(item)
        }
    }

    struct CsvSource;

    impl GenericDataSource for CsvSource {
        fn name(&self) -> &str {
            "/csv"
        }

        fn formats(&self) -> HashMap<String, Arc<dyn GenericDataFormat>> {
            let mut formats: HashMap<String, Arc<dyn GenericDataFormat>> = HashMap::new();
            formats.insert("csv".to_owned(), Arc::new(CsvFormat));
            formats
        }

        fn as_getable(&self) -> Option<&dyn GetableSource> {
            Some(self)
        }
    }

    impl GetableSource for CsvSource {
        fn get(&self) -> Item {
            json!(7)
        }
    }

    let mds = MarshaledSource::new(Arc::new(CsvSource));
    assert_eq!(
        mds.formats(),
        vec!["csv".to_owned(), "json".to_owned(), "text".to_owned()]
    );

    let mut out = Vec::new();
    mds.get("csv", &mut out).unwrap();
    assert_eq!(out, b"v,7");
}

#[tokio::test]
async fn test_get_writes_snapshot() {
    let mds = MarshaledSource::new(Arc::new(TestSource::with_snapshot(json!({"hello": "world"}))));

    let mut out = Vec::new();
    mds.get("json", &mut out).unwrap();
    assert_eq!(out, br#"{"hello":"world"}"#);

    // format lookup is case-insensitive
    let mut out = Vec::new();
    mds.get("JSON", &mut out).unwrap();
    assert_eq!(out, br#"{"hello":"world"}"#);
}

#[tokio::test]
async fn test_get_without_snapshot_support() {
    let mds = MarshaledSource::new(Arc::new(TestSource::watchable()));
    let err = mds.get("json", &mut Vec::new()).unwrap_err();
    assert!(matches!(err, SourceError::NotGetable));
}

#[tokio::test]
async fn test_unknown_format_is_rejected() {
    let mds = MarshaledSource::new(Arc::new(TestSource::with_snapshot(json!(null))));
    let err = mds.get("yaml", &mut Vec::new()).unwrap_err();
    assert!(matches!(err, SourceError::UnsupportedFormat));

    let err = mds
        .watch("yaml", Arc::new(CollectSink::default()))
        .unwrap_err();
    assert!(matches!(err, SourceError::UnsupportedFormat));
}

#[tokio::test]
async fn test_watch_on_get_only_source() {
    struct GetOnly;

    impl GenericDataSource for GetOnly {
        fn name(&self) -> &str {
            "/get_only"
        }

        fn as_getable(&self) -> Option<&dyn GetableSource> {
            Some(self)
        }
    }

    impl GetableSource for GetOnly {
        fn get(&self) -> Item {
            json!(1)
        }
    }

    let mds = MarshaledSource::new(Arc::new(GetOnly));
    let err = mds
        .watch("json", Arc::new(CollectSink::default()))
        .unwrap_err();
    assert!(matches!(err, SourceError::NotWatchable));
}

// ============================================================================
// Activation
// ============================================================================

#[tokio::test]
async fn test_first_watcher_activates_once() {
    let source = Arc::new(TestSource::watchable());
    let mds = MarshaledSource::new(source.clone());

    let sink = Arc::new(CollectSink::default());
    mds.watch("json", sink.clone()).unwrap();
    assert_eq!(source.activations(), 1, "first watcher causes activation");
    assert!(mds.is_active());

    assert!(source.emit(json!({"hello": "world"})));
    wait_until("first item", || sink.lines() == 1).await;
    assert_eq!(sink.text(), "{\"hello\":\"world\"}\n");

    let second = Arc::new(CollectSink::default());
    mds.watch("json", second.clone()).unwrap();
    assert_eq!(
        source.activations(),
        1,
        "second watcher does not cause activation"
    );

    assert!(source.emit(json!({"hello": "world2"})));
    wait_until("both sinks", || sink.lines() == 2 && second.lines() == 1).await;
}

#[tokio::test]
async fn test_reactivation_after_drain() {
    let source = Arc::new(TestSource::watchable());
    let mds = MarshaledSource::new(source.clone());

    let sink = Arc::new(CollectSink::default());
    mds.watch("json", sink.clone()).unwrap();
    assert_eq!(source.activations(), 1);

    mds.drain().await;
    assert!(!mds.is_active());
    assert!(sink.closed.load(Ordering::SeqCst));
    assert!(!source.emit(json!(1)), "inactive source refuses items");

    // drain is idempotent
    mds.drain().await;

    let sink = Arc::new(CollectSink::default());
    mds.watch("json", sink.clone()).unwrap();
    assert_eq!(source.activations(), 2, "new watch re-activates");
    assert!(source.emit(json!(2)));
    wait_until("item after reactivation", || sink.lines() == 1).await;
}

// ============================================================================
// Ordering and batches
// ============================================================================

#[derive(Default)]
struct CollectItems {
    items: Mutex<Vec<Bytes>>,
}

impl ItemWatcher for CollectItems {
    fn handle_item(&self, item: Bytes) -> Result<()> {
        self.items.lock().push(item);
        Ok(())
    }

    fn handle_items(&self, items: &[Bytes]) -> Result<()> {
        self.items.lock().extend(items.iter().cloned());
        Ok(())
    }
}

#[tokio::test]
async fn test_items_arrive_in_production_order() {
    let source = Arc::new(TestSource::watchable());
    let mds = MarshaledSource::new(source.clone());

    let collector = Arc::new(CollectItems::default());
    mds.watch_items("json", collector.clone()).unwrap();

    for i in 0..50 {
        assert!(source.emit(json!({ "i": i })));
    }
    wait_until("all items", || collector.items.lock().len() == 50).await;

    let items = collector.items.lock();
    for (i, item) in items.iter().enumerate() {
        assert_eq!(&item[..], format!("{{\"i\":{i}}}").as_bytes());
    }
}

#[tokio::test]
async fn test_batches_fan_out() {
    let source = Arc::new(TestSource::watchable());
    let mds = MarshaledSource::new(source.clone());

    let collector = Arc::new(CollectItems::default());
    mds.watch_items("json", collector.clone()).unwrap();

    assert!(source.emit_batch(vec![json!(1), json!(2), json!(3)]));
    wait_until("batch items", || collector.items.lock().len() == 3).await;
}

// ============================================================================
// Watch init
// ============================================================================

#[tokio::test]
async fn test_watch_init_precedes_stream() {
    let source = Arc::new(TestSource::with_init(json!({"init": true})));
    let mds = MarshaledSource::new(source.clone());

    let sink = Arc::new(CollectSink::default());
    mds.watch("json", sink.clone()).unwrap();
    assert_eq!(sink.text(), "{\"init\":true}\n", "init data written framed");

    assert!(source.emit(json!({"init": false})));
    wait_until("streamed item", || sink.lines() == 2).await;
    assert_eq!(sink.text(), "{\"init\":true}\n{\"init\":false}\n");
}

#[tokio::test]
async fn test_watch_items_init_is_unframed() {
    let source = Arc::new(TestSource::with_init(json!({"init": true})));
    let mds = MarshaledSource::new(source.clone());

    let collector = Arc::new(CollectItems::default());
    mds.watch_items("json", collector.clone()).unwrap();

    let items = collector.items.lock();
    assert_eq!(items.len(), 1);
    assert_eq!(&items[0][..], br#"{"init":true}"#);
}

// ============================================================================
// Backpressure shedding
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_slow_watcher_sheds_source() {
    let source = Arc::new(TestSource::watchable());
    let mds = MarshaledSource::with_config(
        source.clone(),
        HashMap::new(),
        MarshaledConfig::default().with_max_wait(Duration::from_micros(100)),
    );

    let sink = Arc::new(CollectSink {
        slow: Some(Duration::from_millis(10)),
        ..Default::default()
    });
    mds.watch("json", sink.clone()).unwrap();

    // a producer far outrunning the pump must be refused within the bounded
    // handoff wait instead of blocking
    let mut refused = false;
    for i in 0..10_000 {
        if !source.emit(json!({ "i": i })) {
            refused = true;
            break;
        }
        tokio::task::yield_now().await;
    }
    assert!(refused, "producer should be refused after the handoff stalls");

    wait_until("source deactivation", || !mds.is_active()).await;
    wait_until("sink closed", || sink.closed.load(Ordering::SeqCst)).await;
    assert!(!source.emit(json!("late")), "no items accepted after shed");
}

//! Reporter tests

use super::*;
use crate::MarshaledSource;
use parking_lot::Mutex;
use scry_source::{GenericDataSource, TemplateError, TextTemplate, WatchableSource, WatcherHandle};
use serde_json::json;
use std::time::Duration;

struct LineTemplate;

impl TextTemplate for LineTemplate {
    fn render_item(&self, item: &scry_source::Item) -> Result<String, TemplateError> {
        Ok(format!("saw {item}"))
    }
}

#[derive(Default)]
struct TestSource {
    watcher: Mutex<WatcherHandle>,
}

impl TestSource {
    fn emit(&self, item: scry_source::Item) -> bool {
        self.watcher.lock().clone().handle_item(item)
    }
}

impl GenericDataSource for TestSource {
    fn name(&self) -> &str {
        "/reported"
    }

    fn text_template(&self) -> Option<std::sync::Arc<dyn TextTemplate>> {
        Some(std::sync::Arc::new(LineTemplate))
    }

    fn as_watchable(&self) -> Option<&dyn WatchableSource> {
        Some(self)
    }
}

impl WatchableSource for TestSource {
    fn set_watcher(&self, watcher: WatcherHandle) {
        *self.watcher.lock() = watcher;
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

#[tokio::test]
async fn test_reporter_forwards_text_items() {
    let source = Arc::new(TestSource::default());
    let mds = MarshaledSource::new(source.clone());

    let lines = Arc::new(Mutex::new(Vec::new()));
    let sink_lines = Arc::clone(&lines);
    let reporter = LogReporter::with_sink(mds.clone(), move |name, line| {
        sink_lines.lock().push(format!("{name}: {line}"));
    });

    reporter.start().unwrap();
    wait_until("activation", || mds.is_active()).await;

    assert!(source.emit(json!(1)));
    wait_until("reported line", || !lines.lock().is_empty()).await;
    assert_eq!(lines.lock()[0], "/reported: saw 1");
}

#[tokio::test]
async fn test_stopped_reporter_is_evicted() {
    let source = Arc::new(TestSource::default());
    let mds = MarshaledSource::new(source.clone());

    let reporter = LogReporter::with_sink(mds.clone(), |_, _| {});
    reporter.start().unwrap();
    wait_until("activation", || mds.is_active()).await;

    reporter.stop();

    // the next delivery errors out, evicting the only subscriber
    for i in 0..400 {
        if !mds.is_active() {
            break;
        }
        source.emit(json!(i));
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert!(!mds.is_active(), "source should go idle after eviction");
}

#[tokio::test]
async fn test_reporter_requires_watchable_source() {
    struct GetOnly;

    impl GenericDataSource for GetOnly {
        fn name(&self) -> &str {
            "/get_only"
        }
    }

    let mds = MarshaledSource::new(Arc::new(GetOnly));
    let reporter = LogReporter::with_sink(mds, |_, _| {});
    assert!(matches!(
        reporter.start(),
        Err(ReportError::Source(scry_source::SourceError::NotWatchable))
    ));
}

#[tokio::test]
async fn test_reporter_rejects_raw_sources() {
    // below the marshaled layer there is no item subscription to attach to
    struct RawOnly;

    impl scry_source::DataSource for RawOnly {
        fn name(&self) -> &str {
            "/raw"
        }

        fn formats(&self) -> Vec<String> {
            vec!["text".to_owned()]
        }

        fn attrs(&self) -> scry_source::Attrs {
            scry_source::Attrs::new()
        }

        fn get(&self, _format: &str, _out: &mut dyn std::io::Write) -> scry_source::Result<()> {
            Err(scry_source::SourceError::NotGetable)
        }

        fn watch(
            &self,
            _format: &str,
            _sink: Arc<dyn scry_source::WatchSink>,
        ) -> scry_source::Result<()> {
            Ok(())
        }
    }

    let reporter = LogReporter::with_sink(Arc::new(RawOnly), |_, _| {});
    assert!(matches!(reporter.start(), Err(ReportError::RawSource)));
}

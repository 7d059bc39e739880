//! Tests for the data source registry

use super::*;
use crate::generic::Attrs;
use crate::source::WatchSink;
use parking_lot::Mutex;
use std::io;
use std::sync::Arc;

/// Minimal registered source for registry tests
struct FixedSource {
    name: &'static str,
}

impl DataSource for FixedSource {
    fn name(&self) -> &str {
        self.name
    }

    fn formats(&self) -> Vec<String> {
        vec!["json".into()]
    }

    fn attrs(&self) -> Attrs {
        Attrs::new()
    }

    fn get(&self, _format: &str, _out: &mut dyn io::Write) -> crate::Result<()> {
        Ok(())
    }

    fn watch(&self, _format: &str, _sink: Arc<dyn WatchSink>) -> crate::Result<()> {
        Err(crate::SourceError::NotWatchable)
    }
}

#[derive(Default)]
struct RecordingObserver {
    events: Mutex<Vec<String>>,
}

impl DataSourcesObserver for RecordingObserver {
    fn source_added(&self, source: &dyn DataSource) {
        self.events.lock().push(format!("add {}", source.name()));
    }

    fn source_removed(&self, source: &dyn DataSource) {
        self.events.lock().push(format!("remove {}", source.name()));
    }
}

#[test]
fn test_add_and_get() {
    let dss = DataSources::new();
    dss.add(Arc::new(FixedSource { name: "/foo" })).unwrap();

    assert!(dss.get("/foo").is_some());
    assert!(dss.get("/bar").is_none());
    assert_eq!(dss.len(), 1);
}

#[test]
fn test_add_rejects_duplicates() {
    let dss = DataSources::new();
    dss.add(Arc::new(FixedSource { name: "/foo" })).unwrap();

    let err = dss.add(Arc::new(FixedSource { name: "/foo" })).unwrap_err();
    assert!(matches!(err, crate::SourceError::AlreadyDefined(name) if name == "/foo"));
}

#[test]
fn test_remove_returns_source() {
    let dss = DataSources::new();
    dss.add(Arc::new(FixedSource { name: "/foo" })).unwrap();

    let removed = dss.remove("/foo").expect("expected a removed source");
    assert_eq!(removed.name(), "/foo");
    assert!(dss.remove("/foo").is_none());
    assert!(dss.is_empty());
}

#[test]
fn test_case_insensitive_lookup() {
    let dss = DataSources::new();
    dss.add(Arc::new(FixedSource { name: "/Foo" })).unwrap();

    assert!(dss.get("/foo").is_none());
    assert_eq!(dss.get_insensitive("/foo").unwrap().name(), "/Foo");
    assert_eq!(dss.get_insensitive("/Foo").unwrap().name(), "/Foo");
}

#[test]
fn test_observer_sees_add_and_remove_in_order() {
    let dss = DataSources::new();
    let obs = Arc::new(RecordingObserver::default());
    dss.set_observer(Some(obs.clone()));

    dss.add(Arc::new(FixedSource { name: "/foo" })).unwrap();
    dss.add(Arc::new(FixedSource { name: "/bar" })).unwrap();
    dss.remove("/foo");

    assert_eq!(
        *obs.events.lock(),
        vec!["add /foo", "add /bar", "remove /foo"]
    );
}

#[test]
fn test_observer_not_called_for_rejected_add() {
    let dss = DataSources::new();
    let obs = Arc::new(RecordingObserver::default());
    dss.set_observer(Some(obs.clone()));

    dss.add(Arc::new(FixedSource { name: "/foo" })).unwrap();
    let _ = dss.add(Arc::new(FixedSource { name: "/foo" }));

    assert_eq!(*obs.events.lock(), vec!["add /foo"]);
}

#[test]
fn test_info_is_sorted_by_name() {
    let dss = DataSources::new();
    dss.add(Arc::new(FixedSource { name: "/b" })).unwrap();
    dss.add(Arc::new(FixedSource { name: "/a" })).unwrap();

    let names: Vec<_> = dss.info().into_keys().collect();
    assert_eq!(names, vec!["/a", "/b"]);
}

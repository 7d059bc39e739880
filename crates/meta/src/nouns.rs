//! The `/meta/nouns` data source

use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use serde::Serialize;

use scry_source::{
    DataSource, DataSources, DataSourcesObserver, GenericDataSource, GetableSource, Item,
    SourceInfo, TemplateError, TextTemplate, WatchInitableSource, WatchableSource, WatcherHandle,
};

/// The name of the meta nouns data source.
pub const NOUNS_NAME: &str = "/meta/nouns";

/// A data source that describes other data sources.
///
/// Snapshot and watch-init both return the registry's current info map;
/// registered as the registry observer it emits one add or remove event per
/// mutation to the current subscriber.
pub struct NounsSource {
    sources: Weak<DataSources>,
    watcher: Mutex<WatcherHandle>,
}

impl NounsSource {
    /// Create a nouns source over a registry. The back-reference is weak;
    /// the registry owns the (marshaled) nouns source, not the other way
    /// around.
    pub fn new(sources: &Arc<DataSources>) -> Arc<Self> {
        Arc::new(Self {
            sources: Arc::downgrade(sources),
            watcher: Mutex::new(WatcherHandle::default()),
        })
    }

    fn info(&self) -> Item {
        let Some(sources) = self.sources.upgrade() else {
            return Item::Object(Default::default());
        };
        serde_json::to_value(sources.info()).unwrap_or(Item::Null)
    }

    fn push_event(&self, event: &SourceEvent<'_>) {
        let watcher = self.watcher.lock().clone();
        if !watcher.active() {
            return;
        }
        if let Ok(item) = serde_json::to_value(event) {
            watcher.handle_item(item);
        }
    }
}

#[derive(Serialize)]
struct SourceEvent<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    name: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    info: Option<SourceInfo>,
}

impl GenericDataSource for NounsSource {
    fn name(&self) -> &str {
        NOUNS_NAME
    }

    fn text_template(&self) -> Option<Arc<dyn TextTemplate>> {
        Some(Arc::new(NounsTemplate))
    }

    fn as_getable(&self) -> Option<&dyn GetableSource> {
        Some(self)
    }

    fn as_watchable(&self) -> Option<&dyn WatchableSource> {
        Some(self)
    }

    fn as_watch_initable(&self) -> Option<&dyn WatchInitableSource> {
        Some(self)
    }
}

impl GetableSource for NounsSource {
    fn get(&self) -> Item {
        self.info()
    }
}

impl WatchInitableSource for NounsSource {
    /// Watch streams start out with the same snapshot of the world that Get
    /// returns.
    fn watch_init(&self) -> Item {
        self.info()
    }
}

impl WatchableSource for NounsSource {
    fn set_watcher(&self, watcher: WatcherHandle) {
        *self.watcher.lock() = watcher;
    }
}

impl DataSourcesObserver for NounsSource {
    fn source_added(&self, source: &dyn DataSource) {
        self.push_event(&SourceEvent {
            kind: "add",
            name: source.name(),
            info: Some(SourceInfo {
                formats: source.formats(),
                attrs: source.attrs(),
            }),
        });
    }

    fn source_removed(&self, source: &dyn DataSource) {
        self.push_event(&SourceEvent {
            kind: "remove",
            name: source.name(),
            info: None,
        });
    }
}

/// Text rendering for the nouns source; only the "get" block is defined, so
/// text watch streams fail at init while text snapshots work.
struct NounsTemplate;

impl TextTemplate for NounsTemplate {
    fn render_get(&self, item: &Item) -> Result<String, TemplateError> {
        let map = item
            .as_object()
            .ok_or_else(|| TemplateError::Render("expected a source info map".into()))?;
        let mut out = String::from("Data Sources:\n");
        for (name, info) in map {
            let formats: Vec<&str> = info
                .get("formats")
                .and_then(|formats| formats.as_array())
                .map(|formats| formats.iter().filter_map(|f| f.as_str()).collect())
                .unwrap_or_default();
            out.push_str(&format!("{name} formats: [{}]\n", formats.join(" ")));
        }
        Ok(out)
    }
}

#[cfg(test)]
#[path = "nouns_test.rs"]
mod tests;

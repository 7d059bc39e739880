//! Text formats: templated rendering and the stringify fallback

use bytes::Bytes;

use scry_source::{GenericDataFormat, Item, Result, TextTemplate};

use crate::frame_line;

use std::sync::Arc;

/// Implements the "text" format by rendering a source-supplied
/// [`TextTemplate`]. Each operation maps to the template block of the same
/// name; a missing block fails that operation only.
pub struct TemplatedFormat {
    template: Arc<dyn TextTemplate>,
}

impl TemplatedFormat {
    /// Wrap a text template as a format codec.
    pub fn new(template: Arc<dyn TextTemplate>) -> Self {
        Self { template }
    }
}

impl GenericDataFormat for TemplatedFormat {
    fn marshal_get(&self, item: &Item) -> Result<Bytes> {
        let text = self.template.render_get(item)?;
        Ok(Bytes::from(text.into_bytes()))
    }

    fn marshal_init(&self, item: &Item) -> Result<Bytes> {
        let text = self.template.render_init(item)?;
        Ok(Bytes::from(text.into_bytes()))
    }

    fn marshal_item(&self, item: &Item) -> Result<Bytes> {
        let text = self.template.render_item(item)?;
        Ok(Bytes::from(text.into_bytes()))
    }

    fn frame_item(&self, item: Bytes) -> Result<Bytes> {
        Ok(frame_line(item))
    }
}

/// A last-resort text codec that stringifies items: plain strings verbatim,
/// everything else in compact JSON form. Installed as the "text" format for
/// sources that supply no text template.
#[derive(Debug, Clone, Copy, Default)]
pub struct StringifyFormat;

fn stringify(item: &Item) -> Bytes {
    let text = match item {
        Item::String(s) => s.clone(),
        other => other.to_string(),
    };
    Bytes::from(text.into_bytes())
}

impl GenericDataFormat for StringifyFormat {
    fn marshal_get(&self, item: &Item) -> Result<Bytes> {
        Ok(stringify(item))
    }

    fn marshal_init(&self, item: &Item) -> Result<Bytes> {
        Ok(stringify(item))
    }

    fn marshal_item(&self, item: &Item) -> Result<Bytes> {
        Ok(stringify(item))
    }

    fn frame_item(&self, item: Bytes) -> Result<Bytes> {
        Ok(frame_line(item))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scry_source::{SourceError, TemplateError};
    use serde_json::json;

    struct ItemOnlyTemplate;

    impl TextTemplate for ItemOnlyTemplate {
        fn render_item(&self, item: &Item) -> std::result::Result<String, TemplateError> {
            Ok(format!("item: {item}"))
        }
    }

    #[test]
    fn test_missing_block_fails_that_operation_only() {
        let format = TemplatedFormat::new(Arc::new(ItemOnlyTemplate));

        let err = format.marshal_get(&json!(1)).unwrap_err();
        assert!(matches!(
            err,
            SourceError::Template(TemplateError::MissingBlock("get"))
        ));
        let err = format.marshal_init(&json!(1)).unwrap_err();
        assert!(matches!(
            err,
            SourceError::Template(TemplateError::MissingBlock("init"))
        ));

        let buf = format.marshal_item(&json!(1)).unwrap();
        assert_eq!(&buf[..], b"item: 1");
    }

    #[test]
    fn test_stringify_plain_strings_verbatim() {
        let buf = StringifyFormat.marshal_item(&json!("hello")).unwrap();
        assert_eq!(&buf[..], b"hello");

        let buf = StringifyFormat.marshal_item(&json!({"v": 1})).unwrap();
        assert_eq!(&buf[..], br#"{"v":1}"#);
    }
}

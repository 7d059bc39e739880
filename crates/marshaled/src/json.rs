//! Line-delimited JSON, the required format for every source

use bytes::Bytes;

use scry_source::{GenericDataFormat, Item, Result};

use crate::frame_line;

/// The usual line-delimited JSON: compact records separated by `\n`.
#[derive(Debug, Clone, Copy, Default)]
pub struct LdJsonFormat;

impl GenericDataFormat for LdJsonFormat {
    fn marshal_get(&self, item: &Item) -> Result<Bytes> {
        Ok(serde_json::to_vec(item)?.into())
    }

    fn marshal_init(&self, item: &Item) -> Result<Bytes> {
        Ok(serde_json::to_vec(item)?.into())
    }

    fn marshal_item(&self, item: &Item) -> Result<Bytes> {
        Ok(serde_json::to_vec(item)?.into())
    }

    fn frame_item(&self, item: Bytes) -> Result<Bytes> {
        Ok(frame_line(item))
    }
}

//! RESP value model

use bytes::Bytes;

/// One RESP protocol value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RespValue {
    /// `+...` simple string
    Simple(String),
    /// `-...` error
    Error(String),
    /// `:N` integer
    Int(i64),
    /// `$N` bulk string
    Bulk(Bytes),
    /// `$-1` null bulk string
    NullBulk,
    /// `*N` array
    Array(Vec<RespValue>),
    /// `*-1` null array
    NullArray,
}

impl RespValue {
    /// The value as text, for command and argument words. Only simple and
    /// bulk strings qualify; integers, nulls and nested values do not.
    pub fn as_text(&self) -> Option<String> {
        match self {
            RespValue::Simple(s) => Some(s.clone()),
            RespValue::Bulk(b) => String::from_utf8(b.to_vec()).ok(),
            _ => None,
        }
    }

    /// Convenience bulk-string constructor.
    pub fn bulk(data: impl Into<Bytes>) -> Self {
        RespValue::Bulk(data.into())
    }
}

//! RESP frame reader

use bytes::Bytes;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt};

use crate::error::{RespError, Result};
use crate::value::RespValue;

/// Reads RESP values from a buffered byte stream, validating framing
/// strictly: every line must end `\r\n`, integers are digits only.
pub struct RespReader<R> {
    reader: R,
}

impl<R: AsyncBufRead + Unpin> RespReader<R> {
    /// Wrap a buffered reader.
    pub fn new(reader: R) -> Self {
        Self { reader }
    }

    /// Read the next value. Returns `None` on a clean end of stream, that
    /// is, when the peer disconnects between values; EOF inside a value is
    /// an error.
    pub async fn read_value(&mut self) -> Result<Option<RespValue>> {
        let tag = match self.reader.read_u8().await {
            Ok(tag) => tag,
            Err(err) if err.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        Ok(Some(self.read_tagged(tag).await?))
    }

    async fn read_required(&mut self) -> Result<RespValue> {
        let tag = self.reader.read_u8().await?;
        self.read_tagged(tag).await
    }

    async fn read_tagged(&mut self, tag: u8) -> Result<RespValue> {
        match tag {
            b'+' => Ok(RespValue::Simple(self.read_line().await?)),
            b'-' => Ok(RespValue::Error(self.read_line().await?)),
            b':' => Ok(RespValue::Int(self.read_integer().await?)),
            b'$' => self.read_bulk().await,
            b'*' => self.read_array().await,
            other => Err(RespError::UnknownTag(other as char)),
        }
    }

    async fn read_bulk(&mut self) -> Result<RespValue> {
        let len = self.read_integer().await?;
        if len < 0 {
            return Ok(RespValue::NullBulk);
        }
        let mut buf = vec![0u8; len as usize];
        self.reader.read_exact(&mut buf).await?;
        self.expect(b'\r', RespError::MissingCr).await?;
        self.expect(b'\n', RespError::MissingLf).await?;
        Ok(RespValue::Bulk(Bytes::from(buf)))
    }

    async fn read_array(&mut self) -> Result<RespValue> {
        let len = self.read_integer().await?;
        if len < 0 {
            return Ok(RespValue::NullArray);
        }
        let mut items = Vec::with_capacity((len as usize).min(64));
        for _ in 0..len {
            let item = Box::pin(self.read_required()).await?;
            items.push(item);
        }
        Ok(RespValue::Array(items))
    }

    /// Read `[-]digits\r\n`.
    async fn read_integer(&mut self) -> Result<i64> {
        let mut value: i64 = 0;
        let mut digits = 0;
        let mut byte = self.reader.read_u8().await?;
        let negative = byte == b'-';
        if negative {
            byte = self.reader.read_u8().await?;
        }
        while byte != b'\r' {
            if !byte.is_ascii_digit() {
                return Err(RespError::BadInteger);
            }
            value = value * 10 + i64::from(byte - b'0');
            digits += 1;
            byte = self.reader.read_u8().await?;
        }
        if digits == 0 {
            return Err(RespError::BadInteger);
        }
        self.expect(b'\n', RespError::MissingLf).await?;
        Ok(if negative { -value } else { value })
    }

    /// Read a `\r\n`-terminated line without the terminator.
    async fn read_line(&mut self) -> Result<String> {
        let mut buf = Vec::new();
        let n = self.reader.read_until(b'\r', &mut buf).await?;
        if n == 0 || buf.last() != Some(&b'\r') {
            return Err(RespError::MissingCr);
        }
        buf.pop();
        self.expect(b'\n', RespError::MissingLf).await?;
        String::from_utf8(buf).map_err(|_| RespError::InvalidUtf8)
    }

    async fn expect(&mut self, want: u8, err: RespError) -> Result<()> {
        let got = self.reader.read_u8().await?;
        if got != want {
            return Err(err);
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "reader_test.rs"]
mod tests;

//! RESP frame writer

use tokio::io::{AsyncWrite, AsyncWriteExt};

use crate::error::Result;
use crate::value::RespValue;

/// Writes RESP values to a byte stream. Helpers exist both for full values
/// and for streaming a bulk string of known length as header, raw bytes and
/// footer.
pub struct RespWriter<W> {
    writer: W,
}

impl<W: AsyncWrite + Unpin> RespWriter<W> {
    /// Wrap a writer.
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    /// Write a `*N\r\n` array header.
    pub async fn write_array_header(&mut self, len: usize) -> Result<()> {
        self.writer
            .write_all(format!("*{len}\r\n").as_bytes())
            .await?;
        Ok(())
    }

    /// Write a `:N\r\n` integer.
    pub async fn write_integer(&mut self, value: i64) -> Result<()> {
        self.writer
            .write_all(format!(":{value}\r\n").as_bytes())
            .await?;
        Ok(())
    }

    /// Write a `$-1\r\n` null bulk string.
    pub async fn write_null(&mut self) -> Result<()> {
        self.writer.write_all(b"$-1\r\n").await?;
        Ok(())
    }

    /// Write a `*-1\r\n` null array.
    pub async fn write_null_array(&mut self) -> Result<()> {
        self.writer.write_all(b"*-1\r\n").await?;
        Ok(())
    }

    /// Write a `+...\r\n` simple string.
    pub async fn write_simple_string(&mut self, value: &str) -> Result<()> {
        self.writer.write_all(b"+").await?;
        self.writer.write_all(value.as_bytes()).await?;
        self.writer.write_all(b"\r\n").await?;
        Ok(())
    }

    /// Write a `+...\r\n` simple string from raw bytes.
    pub async fn write_simple_bytes(&mut self, value: &[u8]) -> Result<()> {
        self.writer.write_all(b"+").await?;
        self.writer.write_all(value).await?;
        self.writer.write_all(b"\r\n").await?;
        Ok(())
    }

    /// Write a `$N\r\n...\r\n` bulk string.
    pub async fn write_bulk_bytes(&mut self, value: &[u8]) -> Result<()> {
        self.write_bulk_header(value.len()).await?;
        self.writer.write_all(value).await?;
        self.write_bulk_footer().await
    }

    /// Write a `$N\r\n...\r\n` bulk string from text.
    pub async fn write_bulk_string(&mut self, value: &str) -> Result<()> {
        self.write_bulk_bytes(value.as_bytes()).await
    }

    /// Write a `$N\r\n` bulk string header for streaming.
    pub async fn write_bulk_header(&mut self, len: usize) -> Result<()> {
        self.writer
            .write_all(format!("${len}\r\n").as_bytes())
            .await?;
        Ok(())
    }

    /// Write the `\r\n` bulk string footer for streaming.
    pub async fn write_bulk_footer(&mut self) -> Result<()> {
        self.writer.write_all(b"\r\n").await?;
        Ok(())
    }

    /// Write the raw bytes of a streamed bulk string body.
    pub async fn write_raw(&mut self, value: &[u8]) -> Result<()> {
        self.writer.write_all(value).await?;
        Ok(())
    }

    /// Write a `-ERR ...\r\n` error reply.
    pub async fn write_error(&mut self, message: &str) -> Result<()> {
        // a CR or LF inside the message would break framing
        let message = message.replace(['\r', '\n'], " ");
        self.writer.write_all(b"-ERR ").await?;
        self.writer.write_all(message.as_bytes()).await?;
        self.writer.write_all(b"\r\n").await?;
        Ok(())
    }

    /// Write a `-TYPE ...\r\n` error with an explicit error type word.
    pub async fn write_error_string(&mut self, kind: &str, message: &str) -> Result<()> {
        let message = message.replace(['\r', '\n'], " ");
        self.writer.write_all(b"-").await?;
        self.writer.write_all(kind.as_bytes()).await?;
        self.writer.write_all(b" ").await?;
        self.writer.write_all(message.as_bytes()).await?;
        self.writer.write_all(b"\r\n").await?;
        Ok(())
    }

    /// Write any value, recursing into arrays.
    pub async fn write_value(&mut self, value: &RespValue) -> Result<()> {
        match value {
            RespValue::Simple(s) => self.write_simple_string(s).await,
            RespValue::Error(s) => {
                self.writer.write_all(b"-").await?;
                self.writer.write_all(s.as_bytes()).await?;
                self.writer.write_all(b"\r\n").await?;
                Ok(())
            }
            RespValue::Int(n) => self.write_integer(*n).await,
            RespValue::Bulk(data) => self.write_bulk_bytes(data).await,
            RespValue::NullBulk => self.write_null().await,
            RespValue::Array(items) => {
                self.write_array_header(items.len()).await?;
                for item in items {
                    Box::pin(self.write_value(item)).await?;
                }
                Ok(())
            }
            RespValue::NullArray => self.write_null_array().await,
        }
    }

    /// Flush the underlying writer.
    pub async fn flush(&mut self) -> Result<()> {
        self.writer.flush().await?;
        Ok(())
    }
}

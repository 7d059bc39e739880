//! RESP framing errors

use std::io;
use thiserror::Error;

/// Errors from reading or writing RESP frames
#[derive(Error, Debug)]
pub enum RespError {
    /// I/O error on the underlying connection
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// First byte of a value was not a RESP tag
    #[error("unknown RESP type {0:?}")]
    UnknownTag(char),

    /// Line not terminated by CR
    #[error("missing CR")]
    MissingCr,

    /// CR not followed by LF
    #[error("missing LF after CR")]
    MissingLf,

    /// Non-digit byte while scanning an integer
    #[error("invalid byte while scanning integer, expected [0-9]")]
    BadInteger,

    /// Simple string or error line was not valid UTF-8
    #[error("invalid UTF-8 in line")]
    InvalidUtf8,
}

/// Result type for RESP operations
pub type Result<T> = std::result::Result<T, RespError>;

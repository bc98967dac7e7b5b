//! Crate-wide error type.
//!
//! One enum for the whole public surface, rather than a per-module
//! error-enum split — this crate has a single on-disk format, so a
//! single `Error` is the natural home for every variant in the format's
//! error-handling design.

use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// The requested (symbol, date) file does not exist.
    #[error("file not found: {0}")]
    NotFound(String),

    /// `Appender::open` was called with options that disagree with the
    /// header already stored on disk. Depth/scale/chunk_size/version are
    /// immutable for the lifetime of a file.
    #[error("incompatible header: {0}")]
    IncompatibleHeader(String),

    /// Unknown record tag, a delta record with no anchor, a bitmask with
    /// bits beyond `2*depth`, or any other structurally invalid byte
    /// stream. Never papered over.
    #[error("corrupt stream: {0}")]
    CorruptStream(String),

    /// `Appender::append` was called with a timestamp strictly less than
    /// the previous event's timestamp.
    #[error("out of order: timestamp {ts} precedes last appended timestamp {last}")]
    OutOfOrder { ts: i64, last: i64 },

    /// `Appender::append` was called with a timestamp outside the file's
    /// UTC day.
    #[error("out of range: timestamp {ts} does not fall on {date}")]
    OutOfRange { ts: i64, date: String },

    /// A user-supplied filter panicked or returned an error while
    /// processing the pipeline. Filters do not define new error kinds of
    /// their own — any failure they report is wrapped here.
    #[error("filter error: {0}")]
    Filter(String),

    /// Underlying I/O failure.
    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

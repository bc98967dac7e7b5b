//! # secdb — per-symbol, per-day market microstructure store
//!
//! Format guarantees:
//! - A single `.secdb` file holds one `(symbol, date)` partition: a
//!   header, a fixed-size chunkmap, then an append-only event stream.
//! - Timestamps never decrease within a file; every byte written once
//!   is never rewritten except the chunkmap's zero-to-offset patch.
//! - The first event of any chunk bucket is always a full MD snapshot;
//!   later MDs in the same bucket are deltas against the previous one.
//! - A handle is strictly one of {Appender, Reader} — converting between
//!   the two modes means closing and reopening.
//! - Readers tolerate a torn trailing record (truncate logically, return
//!   end-of-stream); any other corruption is a hard decode failure.

pub mod api;
pub mod appender;
pub mod chunkmap;
pub mod config;
pub mod discovery;
pub mod error;
pub mod filter;
pub mod header;
pub mod reader;
pub mod record;
pub mod varint;

pub use api::{
    append, chunk_count_for, close_appender, common_dates, dates, events, info, init_reader,
    open_append, open_read, read_event, stocks, Emission, FilterSpec, Info,
};
pub use appender::Appender;
pub use chunkmap::ChunkMap;
pub use error::{Error, Result};
pub use filter::{Bound, Candle, CandleFilter, Filter, FilteredEvents, RangeFilter};
pub use header::{FileHeader, OpenOptions};
pub use reader::{EventIterator, ReaderState};
pub use record::{Event, Level, Md, Trade};

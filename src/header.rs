//! File header — format anchor at offset 0.
//!
//! # On-disk layout
//!
//! A sequence of ASCII `key=value\n` lines terminated by a blank line:
//!
//! ```text
//! version=2
//! symbol=AAPL
//! date=2012-01-15
//! depth=2
//! scale=100
//! chunk_size=300000
//!
//! <chunkmap follows immediately>
//! ```
//!
//! Required keys: `version`, `symbol`, `date`, `depth`, `scale`,
//! `chunk_size`. Unknown keys are ignored on read so the header can grow
//! without breaking old readers — the same forward-compatibility stance
//! as a length-prefixed header's reserved `header_size` field, just
//! text-shaped instead of length-prefixed.
//!
//! `depth`, `scale`, `chunk_size`, and `version` are immutable for the
//! lifetime of a file: `Appender::open` on an existing file must supply
//! matching values or fail with `Error::IncompatibleHeader`.

use crate::error::{Error, Result};
use std::io::{Read, Write};

pub const CURRENT_VERSION: u32 = 2;
pub const DEFAULT_SCALE: u32 = 100;
pub const DEFAULT_CHUNK_SIZE_MS: u64 = 300_000;
pub const MS_PER_DAY: u64 = 86_400_000;
pub const MAX_DEPTH: u32 = 32;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileHeader {
    pub version: u32,
    pub symbol: String,
    pub date: String,
    pub depth: u32,
    pub scale: u32,
    pub chunk_size: u64,
}

/// Options accepted by `Appender::open` when creating a new file.
/// `depth` (default 1), `scale` (default 100), `chunk_size`
/// (default 300_000).
#[derive(Debug, Clone, Copy)]
pub struct OpenOptions {
    pub depth: u32,
    pub scale: u32,
    pub chunk_size: u64,
}

impl Default for OpenOptions {
    fn default() -> Self {
        Self { depth: 1, scale: DEFAULT_SCALE, chunk_size: DEFAULT_CHUNK_SIZE_MS }
    }
}

impl FileHeader {
    pub fn new(symbol: impl Into<String>, date: impl Into<String>, opts: OpenOptions) -> Result<Self> {
        let symbol = symbol.into();
        let date = date.into();
        if symbol.is_empty() {
            return Err(Error::CorruptStream("symbol must be non-empty".into()));
        }
        validate_date(&date)?;
        if opts.depth < 1 || opts.depth > MAX_DEPTH {
            return Err(Error::CorruptStream(format!(
                "depth {} out of range 1..=32",
                opts.depth
            )));
        }
        if opts.scale == 0 {
            return Err(Error::CorruptStream("scale must be positive".into()));
        }
        if opts.chunk_size == 0 {
            return Err(Error::CorruptStream("chunk_size must be positive".into()));
        }
        Ok(Self {
            version: CURRENT_VERSION,
            symbol,
            date,
            depth: opts.depth,
            scale: opts.scale,
            chunk_size: opts.chunk_size,
        })
    }

    /// Fail if `opts` disagrees with this header's immutable fields.
    pub fn check_compatible(&self, symbol: &str, date: &str, opts: OpenOptions) -> Result<()> {
        if self.symbol != symbol || self.date != date {
            return Err(Error::IncompatibleHeader(format!(
                "file holds ({}, {}) but ({symbol}, {date}) was requested",
                self.symbol, self.date
            )));
        }
        if self.depth != opts.depth || self.scale != opts.scale || self.chunk_size != opts.chunk_size {
            return Err(Error::IncompatibleHeader(format!(
                "stored depth={}/scale={}/chunk_size={} disagrees with requested depth={}/scale={}/chunk_size={}",
                self.depth, self.scale, self.chunk_size, opts.depth, opts.scale, opts.chunk_size
            )));
        }
        Ok(())
    }

    pub fn chunk_count(&self) -> usize {
        ((MS_PER_DAY + self.chunk_size - 1) / self.chunk_size) as usize
    }

    /// Epoch-ms of this header's day at `00:00:00.000` UTC.
    pub fn day_start_ms(&self) -> Result<i64> {
        let date = chrono::NaiveDate::parse_from_str(&self.date, "%Y-%m-%d")
            .map_err(|_| Error::CorruptStream(format!("invalid date {:?}", self.date)))?;
        Ok(date.and_hms_opt(0, 0, 0).expect("midnight is always valid").and_utc().timestamp_millis())
    }

    /// Bucket index for an absolute `timestamp_ms` (epoch ms):
    /// `floor(ms_of_day / chunk_size)` where `ms_of_day` is the
    /// timestamp's offset from this header's day start.
    pub fn bucket_of(&self, timestamp_ms: i64) -> Result<usize> {
        let ms_of_day = timestamp_ms - self.day_start_ms()?;
        if ms_of_day < 0 || ms_of_day as u64 >= MS_PER_DAY {
            return Err(Error::OutOfRange { ts: timestamp_ms, date: self.date.clone() });
        }
        Ok((ms_of_day as u64 / self.chunk_size) as usize)
    }

    pub fn write<W: Write>(&self, w: &mut W) -> Result<usize> {
        let mut body = Vec::new();
        body.extend_from_slice(format!("version={}\n", self.version).as_bytes());
        body.extend_from_slice(format!("symbol={}\n", self.symbol).as_bytes());
        body.extend_from_slice(format!("date={}\n", self.date).as_bytes());
        body.extend_from_slice(format!("depth={}\n", self.depth).as_bytes());
        body.extend_from_slice(format!("scale={}\n", self.scale).as_bytes());
        body.extend_from_slice(format!("chunk_size={}\n", self.chunk_size).as_bytes());
        body.push(b'\n');
        w.write_all(&body)?;
        Ok(body.len())
    }

    /// Parse a header from the start of `r`. Returns the header and the
    /// number of bytes consumed, which is the chunkmap's byte offset.
    pub fn read<R: Read>(r: &mut R) -> Result<(Self, usize)> {
        let mut raw = Vec::new();
        let mut byte = [0u8; 1];
        let mut consumed = 0usize;
        let mut last_was_newline = false;
        loop {
            r.read_exact(&mut byte)?;
            consumed += 1;
            if byte[0] == b'\n' {
                if last_was_newline {
                    break;
                }
                last_was_newline = true;
            } else {
                last_was_newline = false;
            }
            raw.push(byte[0]);
        }

        let text = String::from_utf8(raw)
            .map_err(|e| Error::CorruptStream(format!("header is not valid UTF-8: {e}")))?;

        let mut version = None;
        let mut symbol = None;
        let mut date = None;
        let mut depth = None;
        let mut scale = None;
        let mut chunk_size = None;

        for line in text.split('\n').filter(|l| !l.is_empty()) {
            let (key, value) = line.split_once('=').ok_or_else(|| {
                Error::CorruptStream(format!("malformed header line: {line:?}"))
            })?;
            match key {
                "version" => version = Some(parse_u32(value, "version")?),
                "symbol" => symbol = Some(value.to_string()),
                "date" => date = Some(value.to_string()),
                "depth" => depth = Some(parse_u32(value, "depth")?),
                "scale" => scale = Some(parse_u32(value, "scale")?),
                "chunk_size" => chunk_size = Some(parse_u64(value, "chunk_size")?),
                _ => {} // unknown keys are ignored on read
            }
        }

        let header = FileHeader {
            version: version.ok_or_else(|| missing("version"))?,
            symbol: symbol.ok_or_else(|| missing("symbol"))?,
            date: date.ok_or_else(|| missing("date"))?,
            depth: depth.ok_or_else(|| missing("depth"))?,
            scale: scale.ok_or_else(|| missing("scale"))?,
            chunk_size: chunk_size.ok_or_else(|| missing("chunk_size"))?,
        };
        Ok((header, consumed))
    }
}

fn missing(key: &str) -> Error {
    Error::CorruptStream(format!("header missing required key {key:?}"))
}

fn parse_u32(value: &str, key: &str) -> Result<u32> {
    value
        .parse()
        .map_err(|_| Error::CorruptStream(format!("header key {key:?} is not a valid u32: {value:?}")))
}

fn parse_u64(value: &str, key: &str) -> Result<u64> {
    value
        .parse()
        .map_err(|_| Error::CorruptStream(format!("header key {key:?} is not a valid u64: {value:?}")))
}

/// Accepts `YYYY-MM-DD` only for the header's own `date` field (the
/// looser `YYYY/MM/DD`/`YYYY.MM.DD` forms are a discovery-layer
/// convenience for parsing filenames, not a stored format).
fn validate_date(date: &str) -> Result<()> {
    chrono::NaiveDate::parse_from_str(date, "%Y-%m-%d")
        .map(|_| ())
        .map_err(|_| Error::CorruptStream(format!("invalid date {date:?}, expected YYYY-MM-DD")))
}

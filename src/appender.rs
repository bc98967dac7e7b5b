//! Append-mode state machine.
//!
//! Maintains `last_md` (the most recently written/seen MD, full or
//! reconstructed from deltas) and `current_chunk` (the bucket of the
//! last MD): a full MD is emitted whenever an MD lands in a new bucket
//! or no anchor exists yet, a delta otherwise; Trades never touch either
//! piece of state.
//!
//! Shaped like a container-format writer that owns the underlying file,
//! the parsed header, and an in-memory index, mutating both as events
//! come in rather than deferring all bookkeeping to `close()`.

use crate::chunkmap::ChunkMap;
use crate::error::{Error, Result};
use crate::header::{FileHeader, OpenOptions};
use crate::record::{encode_delta_md, encode_full_md, encode_trade, Event, Md};
use std::fs::{self, File, OpenOptions as FsOpenOptions};
use std::io::{Seek, SeekFrom, Write};
use std::path::Path;

pub struct Appender {
    file: File,
    header: FileHeader,
    chunkmap: ChunkMap,
    chunkmap_offset: u64,
    event_stream_offset: u64,
    last_md: Option<Md>,
    current_chunk: Option<usize>,
    last_timestamp: Option<i64>,
}

impl Appender {
    /// Open `path` for append, creating it (with a fresh header and
    /// zeroed chunkmap) if absent. If the file exists, its stored header
    /// must be compatible with `opts` or this fails with
    /// `Error::IncompatibleHeader`.
    pub fn open(path: &Path, symbol: &str, date: &str, opts: OpenOptions) -> Result<Self> {
        if path.exists() {
            Self::open_existing(path, symbol, date, opts)
        } else {
            Self::create(path, symbol, date, opts)
        }
    }

    fn create(path: &Path, symbol: &str, date: &str, opts: OpenOptions) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let header = FileHeader::new(symbol, date, opts)?;
        let mut file = FsOpenOptions::new().read(true).write(true).create(true).truncate(true).open(path)?;

        let header_len = header.write(&mut file)?;
        let chunkmap_offset = header_len as u64;
        let chunkmap = ChunkMap::zeroed(header.chunk_count());
        chunkmap.write(&mut file)?;
        let event_stream_offset = chunkmap_offset + chunkmap.byte_len() as u64;

        tracing::debug!(symbol, date, depth = opts.depth, "created new secdb file");

        Ok(Self {
            file,
            header,
            chunkmap,
            chunkmap_offset,
            event_stream_offset,
            last_md: None,
            current_chunk: None,
            last_timestamp: None,
        })
    }

    fn open_existing(path: &Path, symbol: &str, date: &str, opts: OpenOptions) -> Result<Self> {
        let mut file = FsOpenOptions::new().read(true).write(true).open(path)?;
        let (header, header_len) = FileHeader::read(&mut file)?;
        header.check_compatible(symbol, date, opts)?;

        let chunkmap_offset = header_len as u64;
        let chunkmap = ChunkMap::read(&mut file, header.chunk_count())?;
        let event_stream_offset = chunkmap_offset + chunkmap.byte_len() as u64;

        let (last_md, current_chunk, last_timestamp, good_end) =
            recover_tail_state(&mut file, &header, event_stream_offset)?;

        // Drop any torn trailing bytes so the next append doesn't leave
        // garbage between the last complete record and the new one.
        file.set_len(good_end)?;
        file.seek(SeekFrom::Start(good_end))?;

        tracing::debug!(
            symbol,
            date,
            recovered_chunk = ?current_chunk,
            "reopened secdb file for append"
        );

        Ok(Self {
            file,
            header,
            chunkmap,
            chunkmap_offset,
            event_stream_offset,
            last_md,
            current_chunk,
            last_timestamp,
        })
    }

    pub fn header(&self) -> &FileHeader {
        &self.header
    }

    /// Append one event, enforcing monotonic timestamps and the
    /// full-vs-delta MD policy.
    pub fn append(&mut self, event: &Event) -> Result<()> {
        let ts = event.timestamp();
        if let Some(last) = self.last_timestamp {
            if ts < last {
                tracing::warn!(ts, last, "rejecting out-of-order append");
                return Err(Error::OutOfOrder { ts, last });
            }
        }
        let bucket = self.header.bucket_of(ts)?;

        match event {
            Event::Md(md) => {
                if md.depth() != self.header.depth as usize {
                    return Err(Error::CorruptStream(format!(
                        "MD has depth {} but file depth is {}",
                        md.depth(),
                        self.header.depth
                    )));
                }
                let needs_full = self.current_chunk != Some(bucket) || self.last_md.is_none();
                if needs_full {
                    if self.chunkmap.is_absent(bucket) {
                        let offset = self.file.stream_position()?;
                        self.chunkmap.set(bucket, offset);
                        ChunkMap::patch_entry(&mut self.file, self.chunkmap_offset, bucket, offset)?;
                        self.file.seek(SeekFrom::End(0))?;
                    }
                    encode_full_md(&mut self.file, md)?;
                } else {
                    let prev = self.last_md.as_ref().expect("checked above");
                    encode_delta_md(&mut self.file, prev, md)?;
                }
                self.last_md = Some(md.clone());
                self.current_chunk = Some(bucket);
            }
            Event::Trade(t) => {
                encode_trade(&mut self.file, t)?;
            }
        }

        self.last_timestamp = Some(ts);
        Ok(())
    }

    /// Flush and fsync. Also called on `Drop`.
    pub fn close(mut self) -> Result<()> {
        self.flush_and_sync()
    }

    fn flush_and_sync(&mut self) -> Result<()> {
        self.file.flush()?;
        self.file.sync_all()?;
        Ok(())
    }
}

impl Drop for Appender {
    fn drop(&mut self) {
        let _ = self.flush_and_sync();
    }
}

/// Scan forward from `event_stream_offset` to the end of the file,
/// decoding events to recover `last_md`/`current_chunk`/last timestamp.
/// Tolerates a torn trailing record exactly as the Reader does; returns
/// the byte offset just past the last successfully decoded record so
/// the caller can truncate away anything after it.
fn recover_tail_state(
    file: &mut File,
    header: &FileHeader,
    event_stream_offset: u64,
) -> Result<(Option<Md>, Option<usize>, Option<i64>, u64)> {
    file.seek(SeekFrom::Start(event_stream_offset))?;

    let mut last_md: Option<Md> = None;
    let mut current_chunk: Option<usize> = None;
    let mut last_timestamp: Option<i64> = None;
    let mut good_end = event_stream_offset;

    loop {
        let pos = file.stream_position()?;
        match crate::reader::decode_one(file, header.depth as usize, &last_md) {
            Ok(Some(event)) => {
                let ts = event.timestamp();
                if let Event::Md(md) = &event {
                    current_chunk = Some(header.bucket_of(md.timestamp)?);
                    last_md = Some(md.clone());
                }
                last_timestamp = Some(ts);
                good_end = file.stream_position()?;
            }
            Ok(None) => break,
            Err(Error::Io(ref io_err)) if io_err.kind() == std::io::ErrorKind::UnexpectedEof => {
                // Torn trailing bytes: stop recovering here, matching the
                // reader's own torn-tail tolerance. `pos` marks where the
                // incomplete record begins.
                let _ = pos;
                break;
            }
            Err(e) => return Err(e),
        }
    }

    Ok((last_md, current_chunk, last_timestamp, good_end))
}

//! Read-mode scanner.
//!
//! Modeled on a container-format reader that owns the reader, the parsed
//! header, and an in-memory index, combined with a torn-tail decode
//! discipline: a `read_exact` that comes back `UnexpectedEof` ends the
//! scan cleanly rather than failing it, while any other I/O or format
//! error still propagates. `ReaderState` generalizes the "read the index,
//! release nothing" posture one step further — read the whole event
//! region up front and release the file descriptor: readers may
//! materialize and drop the fd; only appenders hold one open.

use crate::chunkmap::ChunkMap;
use crate::error::{Error, Result};
use crate::header::FileHeader;
use crate::record::{decode_delta_md, decode_full_md, decode_trade, Event, Md, TAG_DELTA_MD, TAG_FULL_MD, TAG_TRADE};
use std::fs::File;
use std::io::{self, Cursor, Read};
use std::path::Path;

/// Decode one record from `r`, given the stream's `depth` and the
/// current reconstruction anchor `last_md`. Shared by the Reader and by
/// `Appender::open_existing`'s tail-recovery scan, since both need the
/// same peek-tag/dispatch/torn-tail rules.
///
/// Returns `Ok(None)` both on a clean end-of-stream (no bytes left) and
/// on a torn trailing record (an `UnexpectedEof` partway through a
/// record body) — the caller cannot and need not distinguish the two.
/// Any other decode failure (unknown tag, delta record with no anchor,
/// an out-of-range bitmask bit) is a hard `Err`.
pub(crate) fn decode_one<R: Read>(r: &mut R, depth: usize, last_md: &Option<Md>) -> Result<Option<Event>> {
    let mut tag = [0u8; 1];
    match r.read_exact(&mut tag) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    }

    let decoded = match tag[0] {
        TAG_FULL_MD => decode_full_md(r, depth).map(Event::Md),
        TAG_DELTA_MD => {
            let prev = last_md
                .as_ref()
                .ok_or_else(|| Error::CorruptStream("delta MD record with no anchor snapshot".into()))?;
            decode_delta_md(r, prev).map(Event::Md)
        }
        TAG_TRADE => decode_trade(r).map(Event::Trade),
        other => Err(Error::CorruptStream(format!("unknown record tag {other:#04x}"))),
    };

    match decoded {
        Ok(event) => Ok(Some(event)),
        Err(Error::Io(e)) if e.kind() == io::ErrorKind::UnexpectedEof => Ok(None),
        Err(e) => Err(e),
    }
}

/// A fully-materialized, file-descriptor-free snapshot of one `.secdb`
/// file: parsed header, chunkmap, and the entire event region in memory.
/// Cheap to keep around (no open handle); `iter()`/`iter_from()` spawn
/// cursors over the shared buffer.
pub struct ReaderState {
    header: FileHeader,
    chunkmap: ChunkMap,
    event_stream_offset: u64,
    buffer: Vec<u8>,
}

impl ReaderState {
    pub fn open(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(Error::NotFound(path.display().to_string()));
        }
        let mut file = File::open(path)?;
        let (header, header_len) = FileHeader::read(&mut file)?;
        let chunkmap = ChunkMap::read(&mut file, header.chunk_count())?;
        let event_stream_offset = header_len as u64 + chunkmap.byte_len() as u64;
        let mut buffer = Vec::new();
        file.read_to_end(&mut buffer)?;
        tracing::debug!(symbol = %header.symbol, date = %header.date, bytes = buffer.len(), "opened secdb file for read");
        Ok(Self { header, chunkmap, event_stream_offset, buffer })
    }

    pub fn header(&self) -> &FileHeader {
        &self.header
    }

    pub fn iter(&self) -> EventIterator<'_> {
        EventIterator { state: self, pos: 0, last_md: None }
    }

    /// Bucket indices with a populated chunkmap entry, ascending. Used by
    /// `api::info`'s `presence` field.
    pub fn present_chunk_indices(&self) -> Vec<usize> {
        (0..self.chunkmap.len()).filter(|&b| !self.chunkmap.is_absent(b)).collect()
    }
}

/// Pull-based cursor over a `ReaderState`'s event buffer. Each call to
/// `read_one` decodes exactly one event (reconstructing a full MD from
/// the running `last_md` anchor when the record is a delta) and advances
/// past it.
pub struct EventIterator<'a> {
    state: &'a ReaderState,
    pos: usize,
    last_md: Option<Md>,
}

impl<'a> EventIterator<'a> {
    pub fn read_one(&mut self) -> Result<Option<Event>> {
        let mut cursor = Cursor::new(&self.state.buffer[self.pos..]);
        let depth = self.state.header.depth as usize;
        match decode_one(&mut cursor, depth, &self.last_md)? {
            Some(event) => {
                self.pos += cursor.position() as usize;
                if let Event::Md(md) = &event {
                    self.last_md = Some(md.clone());
                }
                Ok(Some(event))
            }
            None => Ok(None),
        }
    }

    pub fn collect_all(&mut self) -> Result<Vec<Event>> {
        let mut out = Vec::new();
        while let Some(event) = self.read_one()? {
            out.push(event);
        }
        Ok(out)
    }

    /// Land on the first event with `timestamp >= target_ts`:
    /// find the largest populated chunkmap bucket `<= bucket_of(target)`,
    /// jump there, reset the reconstruction anchor (the record at that
    /// offset is always a full MD), and scan forward discarding events
    /// strictly before `target_ts`.
    ///
    /// If no bucket at or before the target is populated, rewinds to the
    /// very start of the stream instead — everything in the file is then
    /// ahead of `target_ts`, so there is nothing upstream to skip.
    pub fn seek(&mut self, target_ts: i64) -> Result<()> {
        let bucket = self.state.header.bucket_of(target_ts)?;
        match self.state.chunkmap.floor_populated(bucket) {
            Some(b) => {
                let absolute = self.state.chunkmap.get(b) as u64;
                self.pos = (absolute - self.state.event_stream_offset) as usize;
                self.last_md = None;
            }
            None => {
                self.pos = 0;
                self.last_md = None;
            }
        }

        loop {
            let landing_pos = self.pos;
            let landing_last_md = self.last_md.clone();
            match self.read_one()? {
                Some(event) if event.timestamp() < target_ts => continue,
                Some(_) => {
                    self.pos = landing_pos;
                    self.last_md = landing_last_md;
                    break;
                }
                None => {
                    self.pos = landing_pos;
                    self.last_md = landing_last_md;
                    break;
                }
            }
        }
        Ok(())
    }
}

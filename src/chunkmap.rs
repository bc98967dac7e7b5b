//! Chunkmap — the sole random-access index into the event stream.
//!
//! A fixed-size array of `N` entries, one per time bucket of the day,
//! each a big-endian `u32` absolute byte offset of the first full MD in
//! that bucket (0 = absent). Written zeroed at file creation and patched
//! in place by the Appender as each bucket's first MD is flushed — the
//! same "reserve, then patch at a known fixed offset" shape as a
//! superblock header reserved at offset 0 and rewritten once its real
//! contents are known, except here every entry (not just one header) is
//! independently patchable because the array is fixed-width.

use crate::error::Result;
use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use std::io::{Read, Seek, SeekFrom, Write};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkMap {
    entries: Vec<u32>,
}

impl ChunkMap {
    pub fn zeroed(count: usize) -> Self {
        Self { entries: vec![0u32; count] }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, bucket: usize) -> u32 {
        self.entries[bucket]
    }

    pub fn is_absent(&self, bucket: usize) -> bool {
        self.entries[bucket] == 0
    }

    pub fn set(&mut self, bucket: usize, offset: u64) {
        self.entries[bucket] = offset as u32;
    }

    /// Largest populated bucket `<= bucket`, if any.
    pub fn floor_populated(&self, bucket: usize) -> Option<usize> {
        (0..=bucket.min(self.entries.len().saturating_sub(1)))
            .rev()
            .find(|&b| self.entries[b] != 0)
    }

    pub fn byte_len(&self) -> usize {
        self.entries.len() * 4
    }

    pub fn write<W: Write>(&self, w: &mut W) -> Result<()> {
        for &offset in &self.entries {
            w.write_u32::<BigEndian>(offset)?;
        }
        Ok(())
    }

    pub fn read<R: Read>(r: &mut R, count: usize) -> Result<Self> {
        let mut entries = Vec::with_capacity(count);
        for _ in 0..count {
            entries.push(r.read_u32::<BigEndian>()?);
        }
        Ok(Self { entries })
    }

    /// Overwrite entry `bucket` in place on a seekable, writable stream
    /// whose chunkmap begins at `chunkmap_offset`.
    pub fn patch_entry<S: Write + Seek>(
        stream: &mut S,
        chunkmap_offset: u64,
        bucket: usize,
        offset: u64,
    ) -> Result<()> {
        let pos = chunkmap_offset + (bucket as u64) * 4;
        stream.seek(SeekFrom::Start(pos))?;
        stream.write_u32::<BigEndian>(offset as u32)?;
        Ok(())
    }
}

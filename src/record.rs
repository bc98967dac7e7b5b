//! Event records — market-data snapshots and trades.
//!
//! # On-disk record layouts
//!
//! ```text
//! Full MD   tag=0xC0  timestamp(8B BE)  [SVarint(price) UVarint(size)] * depth bid
//!                                       [SVarint(price) UVarint(size)] * depth ask
//! Delta MD  tag=0x80  UVarint(Δts)  bitmask(ceil(2*depth/8) bytes)
//!                                   [SVarint(Δprice) SVarint(Δsize)] * popcount(bitmask)
//! Trade     tag=0xA0  timestamp(8B BE)  UVarint(trade_id)  SVarint(price)  UVarint(volume)
//! ```
//!
//! Bitmask bit order, from the LSB of the first byte: `[bid0, bid1, ...,
//! bid_{d-1}, ask0, ..., ask_{d-1}]`. A level's bit is set exactly when
//! either its price or its size changed relative to the anchor MD.
//!
//! Tag bytes are chosen so the first byte of any record is unambiguous;
//! an unrecognised tag is always `Error::CorruptStream` — there is no
//! forward-compatible "skip unknown record" path, matching a block
//! header's "unknown `block_type` is a hard decode failure" rule.

use crate::error::{Error, Result};
use crate::varint::{read_svarint, read_uvarint, write_svarint, write_uvarint};
use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use std::io::{Read, Write};

pub const TAG_FULL_MD: u8 = 0xC0;
pub const TAG_DELTA_MD: u8 = 0x80;
pub const TAG_TRADE: u8 = 0xA0;

/// One price level: `(price, size)`. A missing level is `(0, 0)`.
pub type Level = (i64, u64);

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Md {
    pub timestamp: i64,
    pub bid: Vec<Level>,
    pub ask: Vec<Level>,
}

impl Md {
    pub fn depth(&self) -> usize {
        self.bid.len()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Trade {
    pub timestamp: i64,
    pub trade_id: u64,
    pub price: i64,
    pub volume: u64,
}

/// CLI ingestion/output shape: `{"MD": {...}}` / `{"Trade": {...}}`, via
/// serde's external tagging (the default for a plain enum). The on-disk
/// encoding in this module has nothing to do with this representation —
/// JSON is only the `secdb append`/`secdb dump` stdio boundary.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum Event {
    #[serde(rename = "MD")]
    Md(Md),
    Trade(Trade),
}

impl Event {
    pub fn timestamp(&self) -> i64 {
        match self {
            Event::Md(md) => md.timestamp,
            Event::Trade(t) => t.timestamp,
        }
    }
}

// ── Full MD ──────────────────────────────────────────────────────────────

pub fn encode_full_md<W: Write>(w: &mut W, md: &Md) -> Result<()> {
    w.write_u8(TAG_FULL_MD)?;
    w.write_i64::<BigEndian>(md.timestamp)?;
    for &(price, size) in &md.bid {
        write_svarint(w, price)?;
        write_uvarint(w, size)?;
    }
    for &(price, size) in &md.ask {
        write_svarint(w, price)?;
        write_uvarint(w, size)?;
    }
    Ok(())
}

/// Decode the body of a full MD record (the tag byte has already been
/// consumed by the caller's dispatch).
pub fn decode_full_md<R: Read>(r: &mut R, depth: usize) -> Result<Md> {
    let timestamp = r.read_i64::<BigEndian>()?;
    let mut bid = Vec::with_capacity(depth);
    for _ in 0..depth {
        bid.push((read_svarint(r)?, read_uvarint(r)?));
    }
    let mut ask = Vec::with_capacity(depth);
    for _ in 0..depth {
        ask.push((read_svarint(r)?, read_uvarint(r)?));
    }
    Ok(Md { timestamp, bid, ask })
}

// ── Delta MD ─────────────────────────────────────────────────────────────

fn bitmask_bytes(depth: usize) -> usize {
    (2 * depth + 7) / 8
}

fn bit_is_set(mask: &[u8], bit: usize) -> bool {
    mask[bit / 8] & (1 << (bit % 8)) != 0
}

fn set_bit(mask: &mut [u8], bit: usize) {
    mask[bit / 8] |= 1 << (bit % 8);
}

pub fn encode_delta_md<W: Write>(w: &mut W, prev: &Md, cur: &Md) -> Result<()> {
    debug_assert_eq!(prev.depth(), cur.depth());
    let depth = cur.depth();
    let dt = cur.timestamp - prev.timestamp;
    if dt < 0 {
        return Err(Error::OutOfOrder { ts: cur.timestamp, last: prev.timestamp });
    }

    let mut mask = vec![0u8; bitmask_bytes(depth)];
    let mut changed = Vec::with_capacity(2 * depth);
    for i in 0..depth {
        let (pp, ps) = prev.bid[i];
        let (cp, cs) = cur.bid[i];
        if pp != cp || ps != cs {
            set_bit(&mut mask, i);
            changed.push((cp - pp, cs as i64 - ps as i64));
        }
    }
    for i in 0..depth {
        let (pp, ps) = prev.ask[i];
        let (cp, cs) = cur.ask[i];
        if pp != cp || ps != cs {
            set_bit(&mut mask, depth + i);
            changed.push((cp - pp, cs as i64 - ps as i64));
        }
    }

    w.write_u8(TAG_DELTA_MD)?;
    write_uvarint(w, dt as u64)?;
    w.write_all(&mask)?;
    for (dprice, dsize) in changed {
        write_svarint(w, dprice)?;
        write_svarint(w, dsize)?;
    }
    Ok(())
}

/// Decode the body of a delta MD record against `prev`, the previous
/// reconstructed MD. Fails with `CorruptStream` if the bitmask names a
/// bit beyond `2*depth`, which can only happen for a truncated or
/// foreign stream since the writer never sets such a bit.
pub fn decode_delta_md<R: Read>(r: &mut R, prev: &Md) -> Result<Md> {
    let depth = prev.depth();
    let dt = read_uvarint(r)? as i64;
    let mut mask = vec![0u8; bitmask_bytes(depth)];
    r.read_exact(&mut mask)?;

    // Any set bit at or beyond 2*depth is unrepresentable - the mask is
    // sized exactly to 2*depth bits, so a correctly-sized mask cannot
    // have such a bit, but a corrupt high byte with padding bits set
    // must still be rejected rather than silently ignored.
    let total_bits = mask.len() * 8;
    for bit in (2 * depth)..total_bits {
        if bit_is_set(&mask, bit) {
            return Err(Error::CorruptStream(format!(
                "delta MD bitmask bit {bit} exceeds 2*depth={}",
                2 * depth
            )));
        }
    }

    let mut bid = prev.bid.clone();
    let mut ask = prev.ask.clone();
    for i in 0..depth {
        if bit_is_set(&mask, i) {
            let dprice = read_svarint(r)?;
            let dsize = read_svarint(r)?;
            bid[i] = (bid[i].0 + dprice, (bid[i].1 as i64 + dsize) as u64);
        }
    }
    for i in 0..depth {
        if bit_is_set(&mask, depth + i) {
            let dprice = read_svarint(r)?;
            let dsize = read_svarint(r)?;
            ask[i] = (ask[i].0 + dprice, (ask[i].1 as i64 + dsize) as u64);
        }
    }

    Ok(Md { timestamp: prev.timestamp + dt, bid, ask })
}

// ── Trade ────────────────────────────────────────────────────────────────

pub fn encode_trade<W: Write>(w: &mut W, t: &Trade) -> Result<()> {
    w.write_u8(TAG_TRADE)?;
    w.write_i64::<BigEndian>(t.timestamp)?;
    write_uvarint(w, t.trade_id)?;
    write_svarint(w, t.price)?;
    write_uvarint(w, t.volume)?;
    Ok(())
}

pub fn decode_trade<R: Read>(r: &mut R) -> Result<Trade> {
    let timestamp = r.read_i64::<BigEndian>()?;
    let trade_id = read_uvarint(r)?;
    let price = read_svarint(r)?;
    let volume = read_uvarint(r)?;
    Ok(Trade { timestamp, trade_id, price, volume })
}

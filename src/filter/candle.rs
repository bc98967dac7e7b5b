//! `candle(period)`: aggregates MDs and Trades into OHLC+volume candles.
//!
//! Per bucket, `open`/`close` track whichever source is authoritative
//! for that bucket — an MD's mid-price if the bucket saw any MD, else
//! the first/last trade price — while `high`/`low` track trade prices
//! if the bucket saw any trade, else mid-prices. The two choices are
//! independent: a bucket with both MDs and trades takes `open`/`close`
//! from the MDs but `high`/`low` from the trades.

use super::{Emission, Filter};
use crate::record::Event;
use smallvec::{smallvec, SmallVec};

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct Candle {
    pub time: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: u64,
}

#[derive(Default)]
struct Bucket {
    start: i64,
    first_md_mid: Option<f64>,
    last_md_mid: Option<f64>,
    first_trade_price: Option<f64>,
    last_trade_price: Option<f64>,
    trade_range: Option<(f64, f64)>,
    mid_range: Option<(f64, f64)>,
    volume: u64,
}

impl Bucket {
    fn new(start: i64) -> Self {
        Self { start, ..Default::default() }
    }

    fn observe_md(&mut self, mid: f64) {
        if self.first_md_mid.is_none() {
            self.first_md_mid = Some(mid);
        }
        self.last_md_mid = Some(mid);
        self.mid_range = Some(match self.mid_range {
            Some((lo, hi)) => (lo.min(mid), hi.max(mid)),
            None => (mid, mid),
        });
    }

    fn observe_trade(&mut self, price: f64, volume: u64) {
        if self.first_trade_price.is_none() {
            self.first_trade_price = Some(price);
        }
        self.last_trade_price = Some(price);
        self.trade_range = Some(match self.trade_range {
            Some((lo, hi)) => (lo.min(price), hi.max(price)),
            None => (price, price),
        });
        self.volume += volume;
    }

    fn finish(self) -> Option<Candle> {
        let open = self.first_md_mid.or(self.first_trade_price)?;
        let close = if self.first_md_mid.is_some() {
            self.last_md_mid.expect("md observed")
        } else {
            self.last_trade_price.expect("at least one event observed")
        };
        let (low, high) = self.trade_range.or(self.mid_range).expect("at least one event observed");
        Some(Candle { time: self.start, open, high, low, close, volume: self.volume })
    }
}

pub struct CandleFilter {
    period: Option<u64>,
    current: Option<Bucket>,
}

impl CandleFilter {
    /// `period` in ms; `None` means "the entire stream is one candle".
    pub fn new(period: Option<u64>) -> Self {
        Self { period, current: None }
    }

    fn bucket_start(&self, ts: i64) -> i64 {
        match self.period {
            Some(p) if p > 0 => (ts / p as i64) * p as i64,
            _ => i64::MIN,
        }
    }

    fn mid_price(md: &crate::record::Md) -> Option<f64> {
        let bid = md.bid.first()?;
        let ask = md.ask.first()?;
        if bid.1 == 0 || ask.1 == 0 {
            return None;
        }
        Some((bid.0 as f64 + ask.0 as f64) / 2.0)
    }
}

impl Filter for CandleFilter {
    fn step(&mut self, input: Option<Emission>) -> SmallVec<[Emission; 2]> {
        match input {
            None => match self.current.take().and_then(Bucket::finish) {
                Some(c) => smallvec![Emission::Candle(c)],
                None => SmallVec::new(),
            },
            Some(Emission::Event(event)) => {
                let mut out = SmallVec::new();
                let bucket_start = self.bucket_start(event.timestamp());

                let rolls_over = match &self.current {
                    Some(b) => b.start != bucket_start,
                    None => false,
                };
                if rolls_over {
                    if let Some(c) = self.current.take().and_then(Bucket::finish) {
                        out.push(Emission::Candle(c));
                    }
                }
                let bucket = self.current.get_or_insert_with(|| Bucket::new(bucket_start));
                match &event {
                    Event::Md(md) => {
                        if let Some(mid) = Self::mid_price(md) {
                            bucket.observe_md(mid);
                        }
                    }
                    Event::Trade(t) => bucket.observe_trade(t.price as f64, t.volume),
                }
                out
            }
            Some(other) => smallvec![other],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{Md, Trade};

    fn md(ts: i64, bid: i64, ask: i64) -> Emission {
        Emission::Event(Event::Md(Md { timestamp: ts, bid: vec![(bid, 1)], ask: vec![(ask, 1)] }))
    }

    fn trade(ts: i64, price: i64, volume: u64) -> Emission {
        Emission::Event(Event::Trade(Trade { timestamp: ts, trade_id: 1, price, volume }))
    }

    #[test]
    fn single_candle_for_whole_stream_when_period_is_none() {
        let mut f = CandleFilter::new(None);
        assert!(f.step(Some(md(0, 100, 102))).is_empty());
        assert!(f.step(Some(trade(5, 101, 10))).is_empty());
        let out = f.step(None);
        assert_eq!(out.len(), 1);
        let Emission::Candle(c) = &out[0] else { panic!() };
        assert_eq!(c.open, 101.0); // mid of first MD
        assert_eq!(c.volume, 10);
    }

    #[test]
    fn emits_on_bucket_boundary_crossing() {
        let mut f = CandleFilter::new(Some(100));
        assert!(f.step(Some(md(10, 100, 102))).is_empty());
        let out = f.step(Some(md(150, 200, 202)));
        assert_eq!(out.len(), 1);
        let Emission::Candle(c) = &out[0] else { panic!() };
        assert_eq!(c.time, 0);
        assert_eq!(c.open, 101.0);
        assert_eq!(c.close, 101.0);
    }

    #[test]
    fn high_low_prefer_trades_over_mids_when_both_present() {
        let mut f = CandleFilter::new(None);
        f.step(Some(md(0, 100, 102))); // mid 101
        f.step(Some(trade(1, 50, 1)));
        f.step(Some(trade(2, 500, 1)));
        let out = f.step(None);
        let Emission::Candle(c) = &out[0] else { panic!() };
        assert_eq!(c.low, 50.0);
        assert_eq!(c.high, 500.0);
    }

    #[test]
    fn no_events_yields_no_candle() {
        let mut f = CandleFilter::new(None);
        assert!(f.step(None).is_empty());
    }
}

//! Programmatic surface tying the lower modules together: the
//! `(symbol, date) → path`-aware wrappers around `Appender`/`ReaderState`,
//! filter-pipeline construction, and the small read-only `info` record.
//!
//! Every function here takes `root` explicitly, same as `discovery` —
//! `config::root()` supplies the process-wide default at the CLI layer
//! (`main.rs`), this module never reaches for global state itself.

use crate::discovery;
use crate::error::{Error, Result};
use crate::filter::{Bound, CandleFilter, Filter, FilteredEvents, RangeFilter};
use crate::header::OpenOptions;
use crate::reader::{EventIterator, ReaderState};
use crate::record::Event;
use crate::appender::Appender;
use std::path::{Path, PathBuf};

pub use crate::filter::Emission;

/// One stage of a filter pipeline, described independently of any
/// particular `Reader`/`Appender` instance so it can be built from a CLI
/// flag or a config struct before a file is even open.
#[derive(Debug, Clone)]
pub enum FilterSpec {
    /// Time-clip the stream. `start`/`end` of `None` means open-ended.
    Range { start: Option<Bound>, end: Option<Bound> },
    /// Aggregate into OHLC+volume candles. `period_ms` of `None` means
    /// "the whole stream is one candle."
    Candle { period_ms: Option<u64> },
}

/// `discovery::parse_date` accepts `YYYY-MM-DD`, `YYYY/MM/DD`, and
/// `YYYY.MM.DD`, but the on-disk header only ever stores the canonical
/// `YYYY-MM-DD` form. Any non-canonical `date` must be normalized before
/// it reaches `Appender::open`/`FileHeader::new`, which validate strictly.
fn canonical_date(date: &str) -> Result<String> {
    Ok(discovery::parse_date(date)?.format("%Y-%m-%d").to_string())
}

/// Open `(symbol, date)` under `root` for append, creating the file (and
/// its parent directories) if absent.
pub fn open_append(root: &Path, symbol: &str, date: &str, opts: OpenOptions) -> Result<Appender> {
    let date = canonical_date(date)?;
    let path = discovery::path(root, symbol, &date)?;
    Appender::open(&path, symbol, &date, opts)
}

/// Open `(symbol, date)` under `root` for read, materializing the event
/// region into memory as a detached, file-descriptor-free snapshot.
pub fn open_read(root: &Path, symbol: &str, date: &str) -> Result<ReaderState> {
    let date = canonical_date(date)?;
    let path = discovery::path(root, symbol, &date)?;
    ReaderState::open(&path)
}

/// Build a filter pipeline over `state`'s event stream. A `Range` stage
/// in first position also performs the upfront seek to `start`, letting
/// it skip straight to the right chunk instead of scanning from zero.
pub fn init_reader<'a>(state: &'a ReaderState, filters: &[FilterSpec]) -> Result<FilteredEvents<EventIterator<'a>>> {
    let day_start = state.header().day_start_ms()?;
    let mut iter = state.iter();
    let mut stages: Vec<Box<dyn Filter>> = Vec::with_capacity(filters.len());

    for (i, spec) in filters.iter().enumerate() {
        match spec {
            FilterSpec::Range { start, end } => {
                let start_ms = start.map(|b| b.resolve(day_start));
                let end_ms = end.map(|b| b.resolve(day_start));
                if i == 0 {
                    if let Some(s) = start_ms {
                        iter.seek(s)?;
                    }
                }
                stages.push(Box::new(RangeFilter::new(start_ms, end_ms)));
            }
            FilterSpec::Candle { period_ms } => {
                stages.push(Box::new(CandleFilter::new(*period_ms)));
            }
        }
    }

    Ok(FilteredEvents::new(iter, stages))
}

/// Convenience: open, filter, and collect every emission in one call.
pub fn events(root: &Path, symbol: &str, date: &str, filters: &[FilterSpec]) -> Result<Vec<Emission>> {
    let state = open_read(root, symbol, date)?;
    let mut pipeline = init_reader(&state, filters)?;
    pipeline.collect_all()
}

/// Sorted distinct symbols with at least one stored file under `root`.
pub fn stocks(root: &Path) -> Vec<String> {
    discovery::symbols(root)
}

/// Sorted dates stored for `symbol` under `root`.
pub fn dates(root: &Path, symbol: &str) -> Vec<String> {
    discovery::dates(root, symbol)
}

/// Sorted intersection of dates across every symbol in `symbols`.
pub fn common_dates(root: &Path, symbols: &[String]) -> Vec<String> {
    discovery::common_dates(root, symbols)
}

/// `{path, symbol, date, version, scale, depth, interval, presence}`,
/// where `presence = (chunk_count, present_chunk_indices)`.
#[derive(Debug, Clone)]
pub struct Info {
    pub path: PathBuf,
    pub symbol: String,
    pub date: String,
    pub version: u32,
    pub scale: u32,
    pub depth: u32,
    pub interval: u64,
    pub chunk_count: usize,
    pub present_chunk_indices: Vec<usize>,
}

/// Read `(symbol, date)`'s header and chunkmap occupancy under `root`
/// without materializing the event stream into `Event`s.
pub fn info(root: &Path, symbol: &str, date: &str) -> Result<Info> {
    let date = canonical_date(date)?;
    let path = discovery::path(root, symbol, &date)?;
    if !path.exists() {
        return Err(Error::NotFound(path.display().to_string()));
    }
    let state = ReaderState::open(&path)?;
    let h = state.header();
    Ok(Info {
        path,
        symbol: h.symbol.clone(),
        date: h.date.clone(),
        version: h.version,
        scale: h.scale,
        depth: h.depth,
        interval: h.chunk_size,
        chunk_count: h.chunk_count(),
        present_chunk_indices: state.present_chunk_indices(),
    })
}

/// Read a single event back out of a pull-based pipeline. `None` is the
/// end signal; the iterator itself carries all mutable cursor state.
pub fn read_event<'a>(pipeline: &mut FilteredEvents<EventIterator<'a>>) -> Result<Option<Emission>> {
    pipeline.read_one()
}

/// Append one `Event` and propagate any failure untouched — kept as a
/// free function so the language-neutral `append(Appender, Event) →
/// Appender | Error` signature has a direct Rust analogue even though
/// the idiomatic call is `appender.append(&event)`.
pub fn append(appender: &mut Appender, event: &Event) -> Result<()> {
    appender.append(event)
}

/// Flush and fsync an `Appender`, consuming it.
pub fn close_appender(appender: Appender) -> Result<()> {
    appender.close()
}

/// Chunkmap entry count for a given `chunk_size`, exposed for callers
/// that want `info`-equivalent arithmetic without opening a file.
pub fn chunk_count_for(chunk_size: u64) -> usize {
    ((crate::header::MS_PER_DAY + chunk_size - 1) / chunk_size) as usize
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{Md, Trade};
    use tempfile::tempdir;

    #[test]
    fn open_append_then_open_read_round_trip() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        let opts = OpenOptions { depth: 2, scale: 100, chunk_size: 300_000 };
        let mut app = open_append(root, "X", "2012-01-15", opts).unwrap();
        append(
            &mut app,
            &Event::Md(Md {
                timestamp: 1_326_601_810_453,
                bid: vec![(45010, 100), (44956, 1000)],
                ask: vec![(45243, 20), (45415, 40)],
            }),
        )
        .unwrap();
        close_appender(app).unwrap();

        let evs = events(root, "X", "2012-01-15", &[]).unwrap();
        assert_eq!(evs.len(), 1);
        match &evs[0] {
            Emission::Event(Event::Md(md)) => {
                assert_eq!(md.bid, vec![(45010, 100), (44956, 1000)]);
                assert_eq!(md.ask, vec![(45243, 20), (45415, 40)]);
            }
            other => panic!("expected MD, got {other:?}"),
        }
    }

    #[test]
    fn range_filter_as_first_stage_seeks_the_reader() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        let opts = OpenOptions { depth: 1, scale: 100, chunk_size: 60_000 };
        let mut app = open_append(root, "X", "1970-01-01", opts).unwrap();
        append(&mut app, &Event::Md(Md { timestamp: 0, bid: vec![(100, 1)], ask: vec![(101, 1)] })).unwrap();
        append(&mut app, &Event::Md(Md { timestamp: 10, bid: vec![(102, 1)], ask: vec![(103, 1)] })).unwrap();
        append(&mut app, &Event::Md(Md { timestamp: 70_000, bid: vec![(104, 1)], ask: vec![(105, 1)] })).unwrap();
        close_appender(app).unwrap();

        let filters = vec![FilterSpec::Range { start: Some(Bound::Absolute(60_000)), end: None }];
        let evs = events(root, "X", "1970-01-01", &filters).unwrap();
        assert_eq!(evs.len(), 1);
        assert_eq!(evs[0], Emission::Event(Event::Md(Md { timestamp: 70_000, bid: vec![(104, 1)], ask: vec![(105, 1)] })));
    }

    #[test]
    fn candle_filter_emits_bucketed_ohlc() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        let opts = OpenOptions { depth: 1, scale: 100, chunk_size: 300_000 };
        let mut app = open_append(root, "X", "1970-01-01", opts).unwrap();
        append(&mut app, &Event::Trade(Trade { timestamp: 1, trade_id: 1, price: 10, volume: 5 })).unwrap();
        append(&mut app, &Event::Trade(Trade { timestamp: 1_000, trade_id: 2, price: 12, volume: 3 })).unwrap();
        append(&mut app, &Event::Trade(Trade { timestamp: 3_600_001, trade_id: 3, price: 9, volume: 1 })).unwrap();
        close_appender(app).unwrap();

        let filters = vec![FilterSpec::Candle { period_ms: Some(3_600_000) }];
        let evs = events(root, "X", "1970-01-01", &filters).unwrap();
        assert_eq!(evs.len(), 2);
        let Emission::Candle(c0) = &evs[0] else { panic!() };
        assert_eq!((c0.open, c0.high, c0.low, c0.close, c0.volume), (10.0, 12.0, 10.0, 12.0, 8));
        let Emission::Candle(c1) = &evs[1] else { panic!() };
        assert_eq!((c1.open, c1.high, c1.low, c1.close, c1.volume), (9.0, 9.0, 9.0, 9.0, 1));
    }

    #[test]
    fn info_reports_header_and_presence() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        let opts = OpenOptions { depth: 1, scale: 100, chunk_size: 60_000 };
        let mut app = open_append(root, "X", "1970-01-01", opts).unwrap();
        append(&mut app, &Event::Md(Md { timestamp: 0, bid: vec![(100, 1)], ask: vec![(101, 1)] })).unwrap();
        append(&mut app, &Event::Md(Md { timestamp: 70_000, bid: vec![(100, 1)], ask: vec![(101, 1)] })).unwrap();
        close_appender(app).unwrap();

        let i = info(root, "X", "1970-01-01").unwrap();
        assert_eq!(i.depth, 1);
        assert_eq!(i.interval, 60_000);
        assert_eq!(i.present_chunk_indices, vec![0, 1]);
    }

    #[test]
    fn stocks_dates_common_dates_intersect() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        let opts = OpenOptions::default();
        for (symbol, date) in [("A", "2020-01-01"), ("A", "2020-01-02"), ("A", "2020-01-03"), ("B", "2020-01-02"), ("B", "2020-01-03"), ("B", "2020-01-04")] {
            close_appender(open_append(root, symbol, date, opts).unwrap()).unwrap();
        }
        assert_eq!(stocks(root), vec!["A".to_string(), "B".to_string()]);
        let common = common_dates(root, &["A".to_string(), "B".to_string()]);
        assert_eq!(common, vec!["2020-01-02".to_string(), "2020-01-03".to_string()]);
    }
}

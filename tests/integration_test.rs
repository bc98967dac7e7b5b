use secdb::{Appender, Event, Md, OpenOptions, ReaderState, Trade};
use tempfile::tempdir;

fn opts(depth: u32, scale: u32, chunk_size: u64) -> OpenOptions {
    OpenOptions { depth, scale, chunk_size }
}

#[test]
fn append_then_read_back_round_trip() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("X-2012-01-15.secdb");

    let mut app = Appender::open(&path, "X", "2012-01-15", opts(2, 100, 300_000)).unwrap();
    app.append(&Event::Md(Md {
        timestamp: 1_326_601_810_453,
        bid: vec![(45010, 100), (44956, 1000)],
        ask: vec![(45243, 20), (45415, 40)],
    }))
    .unwrap();
    app.close().unwrap();

    let state = ReaderState::open(&path).unwrap();
    let events = state.iter().collect_all().unwrap();
    assert_eq!(events.len(), 1);
    let Event::Md(md) = &events[0] else { panic!("expected MD") };
    assert_eq!(md.timestamp, 1_326_601_810_453);
    assert_eq!(md.bid, vec![(45010, 100), (44956, 1000)]);
    assert_eq!(md.ask, vec![(45243, 20), (45415, 40)]);
}

#[test]
fn delta_encoded_events_then_seek() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("X-1970-01-01.secdb");

    let mut app = Appender::open(&path, "X", "1970-01-01", opts(1, 1, 60_000)).unwrap();
    app.append(&Event::Md(Md { timestamp: 0, bid: vec![(100, 10)], ask: vec![(0, 0)] })).unwrap();
    app.append(&Event::Md(Md { timestamp: 10, bid: vec![(101, 10)], ask: vec![(0, 0)] })).unwrap();
    app.append(&Event::Md(Md { timestamp: 70_000, bid: vec![(102, 10)], ask: vec![(0, 0)] })).unwrap();
    app.close().unwrap();

    let state = ReaderState::open(&path).unwrap();

    // chunkmap[0] anchors the first MD, chunkmap[1] anchors the third.
    let mut it = state.iter();
    it.seek(60_000).unwrap();
    let remaining = it.collect_all().unwrap();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].timestamp(), 70_000);
}

/// Out-of-order rejection leaves the file with only the first event.
#[test]
fn out_of_order_append_is_rejected() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("X-1970-01-01.secdb");

    let mut app = Appender::open(&path, "X", "1970-01-01", opts(1, 100, 300_000)).unwrap();
    app.append(&Event::Md(Md { timestamp: 100, bid: vec![(1, 1)], ask: vec![(2, 1)] })).unwrap();
    let err = app
        .append(&Event::Md(Md { timestamp: 50, bid: vec![(3, 1)], ask: vec![(4, 1)] }))
        .unwrap_err();
    assert!(matches!(err, secdb::Error::OutOfOrder { .. }));
    app.close().unwrap();

    let state = ReaderState::open(&path).unwrap();
    let events = state.iter().collect_all().unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].timestamp(), 100);
}

/// A detached `ReaderState` survives the backing file being deleted,
/// because the event region is fully materialized on open.
#[test]
fn detached_reader_survives_file_deletion() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("X-1970-01-01.secdb");

    let mut app = Appender::open(&path, "X", "1970-01-01", opts(1, 100, 300_000)).unwrap();
    app.append(&Event::Trade(Trade { timestamp: 1, trade_id: 1, price: 10, volume: 1 })).unwrap();
    app.append(&Event::Trade(Trade { timestamp: 2, trade_id: 2, price: 11, volume: 2 })).unwrap();
    app.close().unwrap();

    let state = ReaderState::open(&path).unwrap();
    std::fs::remove_file(&path).unwrap();

    let events = state.iter().collect_all().unwrap();
    assert_eq!(events.len(), 2);
}

/// `common_dates` is the sorted intersection across symbols.
#[test]
fn common_dates_intersects_across_symbols() {
    let dir = tempdir().unwrap();
    let root = dir.path();

    let make = |symbol: &str, date: &str| {
        let path = secdb::api::open_append(root, symbol, date, opts(1, 100, 300_000)).unwrap();
        secdb::close_appender(path).unwrap();
    };
    make("A", "2020-01-01");
    make("A", "2020-01-02");
    make("A", "2020-01-03");
    make("B", "2020-01-02");
    make("B", "2020-01-03");
    make("B", "2020-01-04");

    let common = secdb::common_dates(root, &["A".to_string(), "B".to_string()]);
    assert_eq!(common, vec!["2020-01-02".to_string(), "2020-01-03".to_string()]);
}

/// Appender reopen recovers `last_md`/`current_chunk` well enough that a
/// delta appended after reopening decodes correctly against the anchor
/// written in the prior process.
#[test]
fn reopening_an_appender_recovers_delta_anchor_state() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("X-1970-01-01.secdb");
    let o = opts(1, 100, 300_000);

    let mut app = Appender::open(&path, "X", "1970-01-01", o).unwrap();
    app.append(&Event::Md(Md { timestamp: 0, bid: vec![(100, 10)], ask: vec![(200, 5)] })).unwrap();
    app.close().unwrap();

    let mut app = Appender::open(&path, "X", "1970-01-01", o).unwrap();
    app.append(&Event::Md(Md { timestamp: 1, bid: vec![(101, 10)], ask: vec![(200, 5)] })).unwrap();
    app.close().unwrap();

    let state = ReaderState::open(&path).unwrap();
    let events = state.iter().collect_all().unwrap();
    assert_eq!(events.len(), 2);
    let Event::Md(second) = &events[1] else { panic!() };
    assert_eq!(second.bid, vec![(101, 10)]);
}

/// `Appender::open` rejects a reopen whose options disagree with the
/// file's stored header.
#[test]
fn reopen_with_mismatched_depth_is_incompatible() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("X-1970-01-01.secdb");
    Appender::open(&path, "X", "1970-01-01", opts(1, 100, 300_000)).unwrap().close().unwrap();

    let err = Appender::open(&path, "X", "1970-01-01", opts(2, 100, 300_000)).unwrap_err();
    assert!(matches!(err, secdb::Error::IncompatibleHeader(_)));
}

/// Every decoded MD carries exactly `depth` levels per side, including
/// ones reconstructed from deltas.
#[test]
fn snapshot_completeness_holds_through_deltas() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("X-1970-01-01.secdb");
    let mut app = Appender::open(&path, "X", "1970-01-01", opts(4, 100, 300_000)).unwrap();
    let full = Md {
        timestamp: 0,
        bid: vec![(10, 1), (9, 1), (8, 1), (7, 1)],
        ask: vec![(11, 1), (12, 1), (13, 1), (14, 1)],
    };
    app.append(&Event::Md(full.clone())).unwrap();
    let mut delta = full.clone();
    delta.timestamp = 1;
    delta.bid[0].0 += 1;
    app.append(&Event::Md(delta)).unwrap();
    app.close().unwrap();

    let state = ReaderState::open(&path).unwrap();
    for event in state.iter().collect_all().unwrap() {
        let Event::Md(md) = event else { panic!() };
        assert_eq!(md.bid.len(), 4);
        assert_eq!(md.ask.len(), 4);
    }
}

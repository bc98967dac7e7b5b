//! File discovery — maps `(symbol, date)` to a path under a root
//! directory and lists what's already there.
//!
//! Grounded on `arx-core::crud`'s use of `walkdir::WalkDir` for recursive
//! enumeration, adapted to walk `<root>/stock/**/*.secdb` and parse
//! `(symbol, date)` back out of each filename.
//!
//! `root` is always an explicit parameter here, never read from global
//! state — that belongs one layer up, in `config`.

use crate::error::{Error, Result};
use chrono::NaiveDate;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// `<root>/stock/<YYYY>/<MM>/<symbol>-<YYYY-MM-DD>.secdb`
pub fn path(root: &Path, symbol: &str, date: &str) -> Result<PathBuf> {
    let parsed = parse_date(date)?;
    Ok(root
        .join("stock")
        .join(format!("{:04}", parsed.format("%Y")))
        .join(format!("{:02}", parsed.format("%m")))
        .join(format!("{symbol}-{}.secdb", parsed.format("%Y-%m-%d"))))
}

/// Accepts `YYYY-MM-DD`, `YYYY/MM/DD`, `YYYY.MM.DD`.
pub fn parse_date(date: &str) -> Result<NaiveDate> {
    for fmt in ["%Y-%m-%d", "%Y/%m/%d", "%Y.%m.%d"] {
        if let Ok(d) = NaiveDate::parse_from_str(date, fmt) {
            return Ok(d);
        }
    }
    Err(Error::CorruptStream(format!("unrecognized date format: {date:?}")))
}

/// Parses `<symbol>-<YYYY-MM-DD>.secdb` back into `(symbol, date)`. The
/// date is always the trailing 10 characters (`YYYY-MM-DD`); splitting
/// from the right rather than on the first `-` lets symbols themselves
/// contain hyphens (e.g. ticker class suffixes like `BRK-A`).
fn parse_filename(name: &str) -> Option<(String, String)> {
    let stem = name.strip_suffix(".secdb")?;
    if stem.len() < 12 {
        return None;
    }
    let split_at = stem.len() - 10;
    let (symbol_part, date) = stem.split_at(split_at);
    let symbol = symbol_part.strip_suffix('-')?;
    if symbol.is_empty() {
        return None;
    }
    NaiveDate::parse_from_str(date, "%Y-%m-%d").ok()?;
    Some((symbol.to_string(), date.to_string()))
}

fn walk_secdb_files(root: &Path) -> Vec<(String, String)> {
    let stock_dir = root.join("stock");
    WalkDir::new(&stock_dir)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter_map(|e| e.file_name().to_str().map(str::to_owned))
        .filter_map(|name| parse_filename(&name))
        .collect()
}

/// Distinct, sorted symbols with at least one stored file under `root`.
pub fn symbols(root: &Path) -> Vec<String> {
    walk_secdb_files(root).into_iter().map(|(s, _)| s).collect::<BTreeSet<_>>().into_iter().collect()
}

/// Sorted dates stored for `symbol` under `root`.
pub fn dates(root: &Path, symbol: &str) -> Vec<String> {
    walk_secdb_files(root)
        .into_iter()
        .filter(|(s, _)| s == symbol)
        .map(|(_, d)| d)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Sorted intersection of `dates(root, s)` across every `s` in `symbols`.
pub fn common_dates(root: &Path, symbols: &[String]) -> Vec<String> {
    let mut sets = symbols.iter().map(|s| dates(root, s).into_iter().collect::<BTreeSet<_>>());
    let Some(mut acc) = sets.next() else {
        return Vec::new();
    };
    for set in sets {
        acc = acc.intersection(&set).cloned().collect();
    }
    acc.into_iter().collect()
}

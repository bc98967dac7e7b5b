//! `range(start, end)`: drops events before `start`, ends the stream
//! once an event lands after `end`.
//!
//! Resolving a time-of-day triple `(hh, mm, ss)` against the file's date
//! and performing the upfront seek when this is the first filter stacked
//! directly on a Reader both happen one layer up, in `api` — by the time
//! a `RangeFilter` is constructed it only ever sees absolute epoch-ms
//! bounds and only ever clips.

use super::{Emission, Filter};
use smallvec::{smallvec, SmallVec};

/// Either an absolute timestamp or a time-of-day triple to be resolved
/// against a file's date. Only the triple form needs the file's date, so
/// it is only meaningful as the first filter applied directly to a
/// Reader (see `api::init_reader`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bound {
    Absolute(i64),
    TimeOfDay { hh: u32, mm: u32, ss: u32 },
}

impl Bound {
    pub fn resolve(self, day_start_ms: i64) -> i64 {
        match self {
            Bound::Absolute(ts) => ts,
            Bound::TimeOfDay { hh, mm, ss } => {
                day_start_ms + (hh as i64 * 3_600_000) + (mm as i64 * 60_000) + (ss as i64 * 1_000)
            }
        }
    }
}

pub struct RangeFilter {
    start: Option<i64>,
    end: Option<i64>,
    finished: bool,
}

impl RangeFilter {
    pub fn new(start: Option<i64>, end: Option<i64>) -> Self {
        Self { start, end, finished: false }
    }
}

impl Filter for RangeFilter {
    fn step(&mut self, input: Option<Emission>) -> SmallVec<[Emission; 2]> {
        let Some(emission) = input else {
            return SmallVec::new();
        };
        let Emission::Event(event) = &emission else {
            return smallvec![emission];
        };
        let ts = event.timestamp();
        if let Some(start) = self.start {
            if ts < start {
                return SmallVec::new();
            }
        }
        if let Some(end) = self.end {
            if ts > end {
                self.finished = true;
                return SmallVec::new();
            }
        }
        smallvec![emission]
    }

    fn is_finished(&self) -> bool {
        self.finished
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{Event, Md};

    fn md_at(ts: i64) -> Emission {
        Emission::Event(Event::Md(Md { timestamp: ts, bid: vec![(1, 1)], ask: vec![(2, 1)] }))
    }

    #[test]
    fn drops_events_before_start() {
        let mut f = RangeFilter::new(Some(100), None);
        assert!(f.step(Some(md_at(50))).is_empty());
        assert_eq!(f.step(Some(md_at(100))).len(), 1);
    }

    #[test]
    fn finishes_once_past_end() {
        let mut f = RangeFilter::new(None, Some(100));
        assert_eq!(f.step(Some(md_at(50))).len(), 1);
        assert!(f.step(Some(md_at(150))).is_empty());
        assert!(f.is_finished());
    }

    #[test]
    fn time_of_day_bound_resolves_against_day_start() {
        let bound = Bound::TimeOfDay { hh: 1, mm: 0, ss: 0 };
        assert_eq!(bound.resolve(1_000), 1_000 + 3_600_000);
    }
}

//! Stackable stateful transformers between the raw event source and the
//! consumer.
//!
//! Shaped like a single-method `Codec` trait (one clear transform per
//! type) composed with a block-copy loop that pulls one item at a time
//! and hands it to the next step. This generalizes both into a `Filter`
//! trait with one required method, passing a plain owned value between
//! stages rather than inventing a stream type per pipeline combination —
//! here the shared currency is `Emission`.

mod candle;
mod range;

pub use candle::{Candle, CandleFilter};
pub use range::{Bound, RangeFilter};

use crate::error::Result;
use crate::record::Event;
use smallvec::SmallVec;
use std::collections::VecDeque;

/// What flows between pipeline stages. Most filters only ever touch the
/// `Event` variant; `candle` is the one built-in that turns events into
/// a different shape, so the shared currency has to be an enum rather
/// than bare `Event`.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
#[serde(untagged)]
pub enum Emission {
    Event(Event),
    Candle(Candle),
}

/// One stage of a filter pipeline.
///
/// `step(None, ..)` is the `end` signal: it is delivered exactly once,
/// after the upstream source is exhausted, and gives a stage a last
/// chance to flush buffered state (the trailing candle). A stage that
/// needs to end the stream early — `range`'s `timestamp > end` case —
/// overrides `is_finished` instead of trying to smuggle an end signal
/// out through `step`'s return value.
pub trait Filter {
    fn step(&mut self, input: Option<Emission>) -> SmallVec<[Emission; 2]>;

    /// Once true, the pipeline flushes this stage (and everything after
    /// it) and stops pulling from upstream, even if the source has more
    /// to give.
    fn is_finished(&self) -> bool {
        false
    }
}

/// Anything that can be pulled from one event at a time. Implemented by
/// `reader::EventIterator`; kept as its own trait so the pipeline isn't
/// coupled to the Reader specifically.
pub trait EventSource {
    fn read_one(&mut self) -> Result<Option<Event>>;
}

impl<'a> EventSource for crate::reader::EventIterator<'a> {
    fn read_one(&mut self) -> Result<Option<Event>> {
        crate::reader::EventIterator::read_one(self)
    }
}

/// A source wired through a stack of filters, exposed as its own
/// pull-based iterator so it composes with a plain `EventIterator`
/// without special cases downstream.
pub struct FilteredEvents<S: EventSource> {
    source: S,
    stages: Vec<Box<dyn Filter>>,
    queue: VecDeque<Emission>,
    done: bool,
}

impl<S: EventSource> FilteredEvents<S> {
    pub fn new(source: S, stages: Vec<Box<dyn Filter>>) -> Self {
        Self { source, stages, queue: VecDeque::new(), done: false }
    }

    pub fn read_one(&mut self) -> Result<Option<Emission>> {
        loop {
            if let Some(emission) = self.queue.pop_front() {
                return Ok(Some(emission));
            }
            if self.done {
                return Ok(None);
            }
            match self.source.read_one()? {
                Some(event) => self.push_through(Some(Emission::Event(event))),
                None => {
                    self.push_through(None);
                    self.done = true;
                }
            }
        }
    }

    pub fn collect_all(&mut self) -> Result<Vec<Emission>> {
        let mut out = Vec::new();
        while let Some(e) = self.read_one()? {
            out.push(e);
        }
        Ok(out)
    }

    /// Feed `input` (or the `end` signal, if `None`) through every stage
    /// in order, queuing whatever comes out the far end. A stage that
    /// reports `is_finished()` after a normal event gets its own `end`
    /// call right there, cascading through the rest of the stack, and
    /// the pipeline stops pulling from `source` afterward.
    fn push_through(&mut self, input: Option<Emission>) {
        let is_natural_end = input.is_none();
        let mut batch: Vec<Option<Emission>> = vec![input];
        let mut ended_early = false;

        for stage in self.stages.iter_mut() {
            let mut next_batch = Vec::new();
            for item in batch {
                let was_end_call = item.is_none();
                for emitted in stage.step(item) {
                    next_batch.push(Some(emitted));
                }
                if was_end_call {
                    next_batch.push(None);
                }
            }
            if !is_natural_end && !ended_early && stage.is_finished() {
                for emitted in stage.step(None) {
                    next_batch.push(Some(emitted));
                }
                next_batch.push(None);
                ended_early = true;
            }
            batch = next_batch;
        }

        for item in batch.into_iter().flatten() {
            self.queue.push_back(item);
        }
        if ended_early {
            self.done = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{Md, Trade};

    struct VecSource(std::vec::IntoIter<Event>);

    impl EventSource for VecSource {
        fn read_one(&mut self) -> Result<Option<Event>> {
            Ok(self.0.next())
        }
    }

    fn md(ts: i64) -> Event {
        Event::Md(Md { timestamp: ts, bid: vec![(1, 1)], ask: vec![(2, 1)] })
    }

    fn trade(ts: i64, price: i64, volume: u64) -> Event {
        Event::Trade(Trade { timestamp: ts, trade_id: 1, price, volume })
    }

    /// A `range` stage feeding a `candle` stage clips before bucketing:
    /// events dropped by the clip never reach the candle aggregation.
    #[test]
    fn range_feeding_candle_clips_before_bucketing() {
        let events = vec![trade(0, 10, 1), trade(50, 20, 2), trade(150, 30, 3)];
        let source = VecSource(events.into_iter());
        let stages: Vec<Box<dyn Filter>> =
            vec![Box::new(RangeFilter::new(Some(100), None)), Box::new(CandleFilter::new(Some(100)))];
        let mut pipeline = FilteredEvents::new(source, stages);
        let out = pipeline.collect_all().unwrap();
        assert_eq!(out.len(), 1);
        let Emission::Candle(c) = &out[0] else { panic!("expected candle") };
        assert_eq!(c.time, 100);
        assert_eq!(c.open, 30.0);
    }

    #[test]
    fn end_signal_flushes_every_stage_in_order() {
        let events = vec![md(0), trade(1, 5, 2)];
        let source = VecSource(events.into_iter());
        let stages: Vec<Box<dyn Filter>> = vec![Box::new(CandleFilter::new(None))];
        let mut pipeline = FilteredEvents::new(source, stages);
        let out = pipeline.collect_all().unwrap();
        assert_eq!(out.len(), 1);
        assert!(matches!(out[0], Emission::Candle(_)));
    }
}

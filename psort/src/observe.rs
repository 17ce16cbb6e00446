//! Phase timing reports

use std::time::{Duration, Instant};
use strum::{Display, EnumIter, IntoStaticStr};

/// Stage of the sort protocol on one rank
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Display, EnumIter, IntoStaticStr)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[non_exhaustive]
pub enum Phase {
    /// Argument checks and parameter derivation
    Init,
    /// First local sort of the input keys
    #[strum(serialize = "LOCAL_SORT_1")]
    LocalSort1,
    /// Splitting the sorted input into per-rank runs
    Bucketize,
    /// Sharing send counts
    MapExchange,
    /// Moving keys to their owning ranks
    DataExchange,
    /// Final local sort of the received keys
    #[strum(serialize = "LOCAL_SORT_2")]
    LocalSort2,
    /// Protocol complete
    Done,
}

/// Timing of one completed phase
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
#[non_exhaustive]
pub struct PhaseReport {
    /// Rank that ran the phase
    pub rank: usize,
    /// Which phase
    pub phase: Phase,
    /// Wall time spent in the phase
    pub elapsed: Duration,
    /// Keys held by the rank when the phase ended
    pub count: usize,
}

/// Sink for [`PhaseReport`]s, called once per phase in protocol order
pub trait Observer {
    /// Receive one report.
    fn report(&mut self, report: &PhaseReport);
}

impl<F: FnMut(&PhaseReport)> Observer for F {
    fn report(&mut self, report: &PhaseReport) {
        self(report)
    }
}

/// Tracks the running phase and reports each one as it ends
pub(crate) struct Timeline<'a> {
    /// Rank being timed
    rank: usize,
    /// Where reports go
    observer: &'a mut dyn Observer,
    /// Start of the running phase
    started: Instant,
}

impl<'a> Timeline<'a> {
    /// Start timing the first phase on `rank`.
    pub(crate) fn start(rank: usize, observer: &'a mut dyn Observer) -> Self {
        Self {
            rank,
            observer,
            started: Instant::now(),
        }
    }

    /// End `phase` with `count` keys held, and start timing the next one.
    pub(crate) fn finish(&mut self, phase: Phase, count: usize) {
        let now = Instant::now();
        let report = PhaseReport {
            rank: self.rank,
            phase,
            elapsed: now - self.started,
            count,
        };
        tracing::debug!(
            rank = report.rank,
            phase = %report.phase,
            elapsed_us = report.elapsed.as_micros() as u64,
            count,
            "phase complete"
        );
        self.observer.report(&report);
        self.started = now;
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use strum::IntoEnumIterator;

    #[test]
    fn phase_names() {
        let names: Vec<String> = Phase::iter().map(|p| p.to_string()).collect();
        assert_eq!(
            names,
            [
                "INIT",
                "LOCAL_SORT_1",
                "BUCKETIZE",
                "MAP_EXCHANGE",
                "DATA_EXCHANGE",
                "LOCAL_SORT_2",
                "DONE"
            ]
        );
    }

    #[test]
    fn closure_observer_sees_reports_in_order() {
        let mut seen = Vec::new();
        let mut observer = |r: &PhaseReport| seen.push((r.phase, r.count));
        let mut timeline = Timeline::start(3, &mut observer);
        timeline.finish(Phase::Init, 10);
        timeline.finish(Phase::LocalSort1, 10);
        drop(timeline);
        assert_eq!(seen, vec![(Phase::Init, 10), (Phase::LocalSort1, 10)]);
    }
}

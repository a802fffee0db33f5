//! The per-tick snapshot handed to the frame callback.

use std::time::{Duration, Instant};

use crate::tracker::{TrackerId, TrackerResult};

use super::stats::StatsSnapshot;

/// Clock values for one tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SessionTime {
    /// Time since the session became active.
    pub elapsed: Duration,
    /// Time since the previous tick; zero on the first tick.
    pub delta: Duration,
    /// Tick number, starting at 0.
    pub tick: u64,
}

/// All tracker results for one tick.
#[derive(Debug, Clone)]
pub struct Frame {
    pub(crate) results: Vec<TrackerResult>,
    pub(crate) timestamp: Instant,
    pub(crate) time: SessionTime,
    pub(crate) ended_sources: Vec<bool>,
    pub(crate) stats: Option<StatsSnapshot>,
}

impl Frame {
    /// One result per tracker, in attachment order.
    pub fn results(&self) -> &[TrackerResult] {
        &self.results
    }

    pub fn result(&self, tracker: TrackerId) -> Option<&TrackerResult> {
        self.results.iter().find(|r| r.tracker == tracker)
    }

    pub fn timestamp(&self) -> Instant {
        self.timestamp
    }

    pub fn delta(&self) -> Duration {
        self.time.delta
    }

    pub fn time(&self) -> &SessionTime {
        &self.time
    }

    /// True once source `index` reported the end of its stream.
    pub fn source_ended(&self, index: usize) -> bool {
        self.ended_sources.get(index).copied().unwrap_or(false)
    }

    pub fn all_sources_ended(&self) -> bool {
        self.ended_sources.iter().all(|&e| e)
    }

    pub fn stats(&self) -> Option<&StatsSnapshot> {
        self.stats.as_ref()
    }
}

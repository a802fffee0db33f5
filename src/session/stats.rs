//! Runtime statistics, collected when `SessionOptions::stats` is set.

use std::time::{Duration, Instant};

use tracing::info;

use crate::tracker::TrackerId;

const LOG_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, PartialEq)]
pub struct TrackerStats {
    pub tracker: TrackerId,
    pub processed: u64,
    pub errors: u64,
    pub last_processing: Duration,
    pub total_processing: Duration,
}

impl TrackerStats {
    fn new(tracker: TrackerId) -> Self {
        Self {
            tracker,
            processed: 0,
            errors: 0,
            last_processing: Duration::ZERO,
            total_processing: Duration::ZERO,
        }
    }

    pub fn mean_processing(&self) -> Duration {
        if self.processed == 0 {
            return Duration::ZERO;
        }
        let nanos = self.total_processing.as_nanos() / u128::from(self.processed);
        Duration::from_nanos(u64::try_from(nanos).unwrap_or(u64::MAX))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StatsSnapshot {
    pub ticks: u64,
    pub frames_delivered: u64,
    /// Tick rate measured over the last full second.
    pub ticks_per_second: f64,
    pub trackers: Vec<TrackerStats>,
    /// Samples each source replaced before they were consumed.
    pub dropped_samples: Vec<u64>,
}

pub(crate) struct Stats {
    snapshot: StatsSnapshot,
    window_start: Instant,
    window_ticks: u64,
}

impl Stats {
    pub(crate) fn new(trackers: &[TrackerId], sources: usize, now: Instant) -> Self {
        Self {
            snapshot: StatsSnapshot {
                ticks: 0,
                frames_delivered: 0,
                ticks_per_second: 0.0,
                trackers: trackers.iter().map(|&id| TrackerStats::new(id)).collect(),
                dropped_samples: vec![0; sources],
            },
            window_start: now,
            window_ticks: 0,
        }
    }

    pub(crate) fn record_tick(&mut self) {
        self.snapshot.ticks += 1;
        self.window_ticks += 1;
    }

    pub(crate) fn record_processing(&mut self, tracker: usize, elapsed: Duration, ok: bool) {
        let Some(t) = self.snapshot.trackers.get_mut(tracker) else {
            return;
        };
        if ok {
            t.processed += 1;
            t.last_processing = elapsed;
            t.total_processing += elapsed;
        } else {
            t.errors += 1;
        }
    }

    pub(crate) fn record_dropped(&mut self, source: usize, dropped: u64) {
        if let Some(d) = self.snapshot.dropped_samples.get_mut(source) {
            *d = dropped;
        }
    }

    pub(crate) fn record_delivered(&mut self) {
        self.snapshot.frames_delivered += 1;
    }

    /// Close the measurement window once a second and log a summary.
    pub(crate) fn roll_window(&mut self, now: Instant) {
        let span = now.saturating_duration_since(self.window_start);
        if span < LOG_INTERVAL {
            return;
        }
        self.snapshot.ticks_per_second = self.window_ticks as f64 / span.as_secs_f64();
        self.window_start = now;
        self.window_ticks = 0;
        self.log();
    }

    pub(crate) fn log(&self) {
        let s = &self.snapshot;
        info!(
            "stats: {} ticks, {} frames, {:.1} ticks/s, dropped samples {:?}",
            s.ticks, s.frames_delivered, s.ticks_per_second, s.dropped_samples
        );
        for t in &s.trackers {
            info!(
                "stats: {} processed {} (errors {}), mean {:.2} ms",
                t.tracker,
                t.processed,
                t.errors,
                t.mean_processing().as_secs_f64() * 1e3
            );
        }
    }

    pub(crate) fn snapshot(&self) -> StatsSnapshot {
        self.snapshot.clone()
    }
}

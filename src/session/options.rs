//! Session construction options.

use std::time::{Duration, Instant};

use crossbeam_channel::Receiver;
use serde::Deserialize;

use crate::error::{ArError, ArResult};
use crate::source::Source;
use crate::tracker::Tracker;
use crate::viewport::ViewportConfig;

/// Default tick rate of [`FrameClock::Interval`].
pub const DEFAULT_FPS: f64 = 30.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionMode {
    /// Full-surface presentation.
    #[default]
    Immersive,
    /// Embedded in a larger layout.
    Inline,
}

impl std::fmt::Display for SessionMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionMode::Immersive => write!(f, "immersive"),
            SessionMode::Inline => write!(f, "inline"),
        }
    }
}

/// What drives [`Session::run`](super::Session::run).
#[derive(Debug, Clone)]
pub enum FrameClock {
    /// Fixed rate, in ticks per second.
    Interval(f64),
    /// One tick per received instant. `run` returns when the sender is dropped.
    Manual(Receiver<Instant>),
}

impl Default for FrameClock {
    fn default() -> Self {
        FrameClock::Interval(DEFAULT_FPS)
    }
}

impl FrameClock {
    pub(crate) fn period(&self) -> Option<Duration> {
        match self {
            FrameClock::Interval(fps) => Some(Duration::from_secs_f64(1.0 / fps)),
            FrameClock::Manual(_) => None,
        }
    }
}

/// A tracker and the index of the source that feeds it.
pub struct TrackerBinding {
    pub tracker: Box<dyn Tracker>,
    pub source: usize,
}

pub struct SessionOptions {
    pub mode: SessionMode,
    pub viewport: ViewportConfig,
    /// Source 0 is the primary source; its intrinsics drive the projection.
    pub sources: Vec<Box<dyn Source>>,
    pub trackers: Vec<TrackerBinding>,
    /// Collect and log per-tick statistics.
    pub stats: bool,
    pub gizmos: bool,
    pub clock: FrameClock,
}

impl SessionOptions {
    pub fn new(viewport: ViewportConfig) -> Self {
        Self {
            mode: SessionMode::default(),
            viewport,
            sources: Vec::new(),
            trackers: Vec::new(),
            stats: false,
            gizmos: false,
            clock: FrameClock::default(),
        }
    }

    pub fn with_mode(mut self, mode: SessionMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_source(mut self, source: impl Source + 'static) -> Self {
        self.sources.push(Box::new(source));
        self
    }

    /// Attach a tracker fed by source `source`.
    pub fn with_tracker(mut self, tracker: impl Tracker + 'static, source: usize) -> Self {
        self.trackers.push(TrackerBinding {
            tracker: Box::new(tracker),
            source,
        });
        self
    }

    pub fn with_stats(mut self, stats: bool) -> Self {
        self.stats = stats;
        self
    }

    pub fn with_gizmos(mut self, visible: bool) -> Self {
        self.gizmos = visible;
        self
    }

    pub fn with_clock(mut self, clock: FrameClock) -> Self {
        self.clock = clock;
        self
    }

    pub(crate) fn validate(&self) -> ArResult<()> {
        if self.sources.is_empty() {
            return Err(ArError::InvalidOptions("at least one source is required".into()));
        }
        for (i, binding) in self.trackers.iter().enumerate() {
            if binding.source >= self.sources.len() {
                return Err(ArError::InvalidOptions(format!(
                    "tracker {} is bound to source {}, but only {} sources are configured",
                    i,
                    binding.source,
                    self.sources.len()
                )));
            }
            if binding.tracker.id().is_some() {
                return Err(ArError::InvalidOptions(format!(
                    "tracker {} is already bound to a session",
                    i
                )));
            }
        }
        if let FrameClock::Interval(fps) = self.clock {
            if !fps.is_finite() || fps <= 0.0 {
                return Err(ArError::InvalidOptions(format!("frame rate {} is not positive", fps)));
            }
        }
        Ok(())
    }
}

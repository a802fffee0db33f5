//! Per-tick tracker output.

use std::time::Duration;

use crate::events::TargetRef;
use crate::geometry::Pose;
use crate::viewport::Viewer;

use super::{TargetState, TrackerId};

/// Live instance of a target that is Tracking or Lost.
#[derive(Debug, Clone, PartialEq)]
pub struct Trackable {
    pub target: TargetRef,
    /// Model transform of the target.
    pub pose: Pose,
    pub state: TargetState,
    pub confidence: f32,
}

impl Trackable {
    pub fn name(&self) -> &str {
        &self.target.name
    }
}

/// Output of one tracker for one tick.
#[derive(Debug, Clone)]
pub struct TrackerResult {
    pub tracker: TrackerId,
    /// Trackables in reference-database order.
    pub trackables: Vec<Trackable>,
    pub viewer: Viewer,
    /// Time spent in `process`.
    pub processing_time: Duration,
    /// True when this is a previous tick's result reused after a processing error.
    pub stale: bool,
}

impl TrackerResult {
    pub fn empty(tracker: TrackerId, viewer: Viewer) -> Self {
        Self {
            tracker,
            trackables: Vec::new(),
            viewer,
            processing_time: Duration::ZERO,
            stale: false,
        }
    }

    pub fn trackable(&self, name: &str) -> Option<&Trackable> {
        self.trackables.iter().find(|t| t.name() == name)
    }
}

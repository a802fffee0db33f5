//! Typed target events raised by trackers.

use std::sync::Arc;

use crate::geometry::Pose;
use crate::tracker::TrackerId;

/// Listener channel an event is delivered on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    TargetFound,
    TargetLost,
}

/// Identity of a registered target: the tracker that owns it and its slot
/// in that tracker's reference database.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TargetRef {
    pub tracker: TrackerId,
    pub index: usize,
    pub name: Arc<str>,
}

impl std::fmt::Display for TargetRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.tracker, self.name)
    }
}

/// A target state transition.
#[derive(Debug, Clone, PartialEq)]
pub enum TargetEvent {
    /// NotTracked -> Tracking. `pose` is the first pose of the new trackable.
    TargetFound { target: TargetRef, pose: Pose },
    /// Tracking/Lost -> NotTracked. `last_pose` is the last pose that was observed.
    TargetLost { target: TargetRef, last_pose: Pose },
}

impl TargetEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            TargetEvent::TargetFound { .. } => EventKind::TargetFound,
            TargetEvent::TargetLost { .. } => EventKind::TargetLost,
        }
    }

    pub fn target(&self) -> &TargetRef {
        match self {
            TargetEvent::TargetFound { target, .. } | TargetEvent::TargetLost { target, .. } => {
                target
            }
        }
    }

    /// Current pose of the target as known when the event was raised.
    pub fn pose(&self) -> &Pose {
        match self {
            TargetEvent::TargetFound { pose, .. } => pose,
            TargetEvent::TargetLost { last_pose, .. } => last_pose,
        }
    }
}

//! Per-target tracking state machine.
//!
//! NotTracked -> Tracking on detection. Tracking tolerates up to
//! `loss_threshold` consecutive misses, then moves to Lost (or straight to
//! NotTracked when the grace window is zero). Lost keeps the target's
//! identity for `grace_window` missed ticks; a detection inside the window
//! resumes Tracking without a new `TargetFound`.

use serde::Deserialize;

use crate::geometry::Pose;

/// State of one registered target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TargetState {
    /// Not detected; detection is attempted every tick.
    #[default]
    NotTracked,
    /// Detected; pose refined every tick.
    Tracking,
    /// Recently missed; attempting re-acquisition within the grace window.
    Lost,
}

/// Loss-handling parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct TrackingPolicy {
    /// Consecutive misses tolerated while Tracking before the target is Lost.
    pub loss_threshold: u32,
    /// Missed ticks a Lost target keeps its identity.
    pub grace_window: u32,
}

impl Default for TrackingPolicy {
    fn default() -> Self {
        Self {
            loss_threshold: 2,
            grace_window: 10,
        }
    }
}

/// Detection outcome for one target on one tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Observation {
    Detected { pose: Pose, confidence: f32 },
    Missed,
    /// Detection still in flight; nothing new is known.
    Pending,
}

/// State change produced by an observation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// NotTracked -> Tracking. Raises `TargetFound`.
    Found,
    /// Tracking -> Lost.
    Suspended,
    /// Lost -> Tracking.
    Reacquired,
    /// Tracking/Lost -> NotTracked. Raises `TargetLost`.
    Dropped,
}

#[derive(Debug, Clone, Default)]
pub struct TargetTracker {
    state: TargetState,
    /// Consecutive misses while Tracking.
    misses: u32,
    /// Missed ticks spent in Lost.
    grace_used: u32,
    pose: Option<Pose>,
    confidence: f32,
}

impl TargetTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> TargetState {
        self.state
    }

    /// Last observed pose; `None` while NotTracked.
    pub fn pose(&self) -> Option<&Pose> {
        self.pose.as_ref()
    }

    pub fn confidence(&self) -> f32 {
        self.confidence
    }

    pub fn observe(&mut self, observation: Observation, policy: &TrackingPolicy) -> Option<Transition> {
        match (self.state, observation) {
            (_, Observation::Pending) => None,

            (TargetState::NotTracked, Observation::Detected { pose, confidence }) => {
                self.update_pose(pose, confidence);
                self.state = TargetState::Tracking;
                Some(Transition::Found)
            }
            (TargetState::NotTracked, Observation::Missed) => None,

            (TargetState::Tracking, Observation::Detected { pose, confidence }) => {
                self.update_pose(pose, confidence);
                self.misses = 0;
                None
            }
            (TargetState::Tracking, Observation::Missed) => {
                self.misses += 1;
                if self.misses <= policy.loss_threshold {
                    return None;
                }
                self.misses = 0;
                if policy.grace_window == 0 {
                    self.reset();
                    Some(Transition::Dropped)
                } else {
                    self.state = TargetState::Lost;
                    self.grace_used = 0;
                    Some(Transition::Suspended)
                }
            }

            (TargetState::Lost, Observation::Detected { pose, confidence }) => {
                self.update_pose(pose, confidence);
                self.state = TargetState::Tracking;
                self.grace_used = 0;
                Some(Transition::Reacquired)
            }
            (TargetState::Lost, Observation::Missed) => {
                self.grace_used += 1;
                if self.grace_used >= policy.grace_window {
                    self.reset();
                    Some(Transition::Dropped)
                } else {
                    None
                }
            }
        }
    }

    /// Discard identity. Used when the target is dropped or the tracker stops.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    fn update_pose(&mut self, pose: Pose, confidence: f32) {
        self.pose = Some(pose);
        self.confidence = confidence;
    }
}

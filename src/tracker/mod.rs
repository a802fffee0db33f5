//! Trackers: detectors that turn samples into trackables.
//!
//! A tracker owns a [`ReferenceDatabase`], a state machine per registered
//! target, and an event queue. The session attaches it, starts it (which
//! locks the database), calls [`Tracker::process`] once per tick, and stops
//! it when the session ends.

pub mod backend;
pub mod database;
pub mod image_tracker;
pub mod result;
pub mod signature;
pub mod state;

pub use backend::{Detection, DetectionBackend, DetectionOutcome, DetectionWorker};
pub use database::{ReferenceDatabase, ReferenceTarget};
pub use image_tracker::{Execution, ImageTracker, ImageTrackerOptions};
pub use result::{Trackable, TrackerResult};
pub use signature::SignatureMatcher;
pub use state::{Observation, TargetState, TargetTracker, TrackingPolicy, Transition};

use crate::error::ArResult;
use crate::events::{EventKind, ListenerId, TargetEvent, TrackerEvents};
use crate::source::Sample;
use crate::viewport::Viewer;

/// Identifier a session assigns to an attached tracker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TrackerId(pub u32);

impl TrackerId {
    pub fn new(id: u32) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for TrackerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "T{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackerKind {
    Image,
}

impl std::fmt::Display for TrackerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TrackerKind::Image => write!(f, "image"),
        }
    }
}

/// Capability interface every tracker kind implements.
pub trait Tracker: Send {
    fn kind(&self) -> TrackerKind;

    /// Id assigned by the session, once attached.
    fn id(&self) -> Option<TrackerId>;

    /// Bind to a session. A tracker can be attached only once.
    fn attach(&mut self, id: TrackerId) -> ArResult<()>;

    fn database(&self) -> &ReferenceDatabase;

    /// Mutable access for building the database. Fails once started.
    fn database_mut(&mut self) -> ArResult<&mut ReferenceDatabase>;

    fn events(&mut self) -> &mut TrackerEvents;

    /// Lock the database and get ready to process samples.
    fn start(&mut self) -> ArResult<()>;

    /// Produce this tick's result. Detection may span several ticks.
    fn process(&mut self, sample: &Sample, viewer: &Viewer) -> ArResult<TrackerResult>;

    /// Stop background work and drop undelivered events.
    fn stop(&mut self);

    fn add_event_listener<F>(&mut self, kind: EventKind, handler: F) -> ListenerId
    where
        Self: Sized,
        F: FnMut(&TargetEvent) + Send + 'static,
    {
        self.events().add_listener(kind, handler)
    }
}

//! Image tracker: finds registered reference images in camera samples.
//!
//! Each tick the tracker turns the backend's detections into one
//! [`Observation`] per target, advances that target's state machine, and
//! queues `TargetFound` / `TargetLost` events for the transitions. With
//! [`Execution::Background`] detection runs on a worker thread; ticks that
//! complete while a job is in flight observe `Pending` and leave every
//! target unchanged.

use std::sync::Arc;
use std::time::Instant;

use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::error::{ArError, ArResult, DatabaseError};
use crate::events::{EventSender, TargetEvent, TargetRef, TrackerEvents};
use crate::source::Sample;
use crate::viewport::Viewer;

use super::{
    Detection, DetectionBackend, DetectionWorker, Observation, ReferenceDatabase, TargetState,
    TargetTracker, Trackable, Tracker, TrackerId, TrackerKind, TrackerResult, TrackingPolicy,
    Transition,
};

/// Where detection runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Execution {
    /// On a worker thread; results may arrive ticks later.
    #[default]
    Background,
    /// Synchronously inside `process`.
    Inline,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ImageTrackerOptions {
    pub policy: TrackingPolicy,
    pub execution: Execution,
}

pub struct ImageTracker {
    id: Option<TrackerId>,
    options: ImageTrackerOptions,
    database: ReferenceDatabase,
    targets: Vec<TargetTracker>,
    names: Vec<Arc<str>>,
    /// Owned here until started in background mode, then moved to the worker.
    backend: Option<Box<dyn DetectionBackend>>,
    worker: Option<DetectionWorker>,
    events: TrackerEvents,
    /// Producer side of `events`, used for state transitions.
    events_tx: EventSender,
    running: bool,
    stopped: bool,
}

impl ImageTracker {
    pub fn new(backend: impl DetectionBackend + 'static) -> Self {
        Self::with_options(backend, ImageTrackerOptions::default())
    }

    pub fn with_policy(backend: impl DetectionBackend + 'static, policy: TrackingPolicy) -> Self {
        Self::with_options(
            backend,
            ImageTrackerOptions {
                policy,
                ..ImageTrackerOptions::default()
            },
        )
    }

    pub fn with_options(backend: impl DetectionBackend + 'static, options: ImageTrackerOptions) -> Self {
        let events = TrackerEvents::new();
        let events_tx = events.sender();
        Self {
            id: None,
            options,
            database: ReferenceDatabase::new(),
            targets: Vec::new(),
            names: Vec::new(),
            backend: Some(Box::new(backend)),
            worker: None,
            events,
            events_tx,
            running: false,
            stopped: false,
        }
    }

    pub fn policy(&self) -> &TrackingPolicy {
        &self.options.policy
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Current state of a registered target.
    pub fn target_state(&self, name: &str) -> Option<TargetState> {
        let idx = self.database.position(name)?;
        Some(self.targets.get(idx).map(|t| t.state()).unwrap_or_default())
    }

    fn target_ref(&self, id: TrackerId, index: usize) -> TargetRef {
        TargetRef {
            tracker: id,
            index,
            name: self.names[index].clone(),
        }
    }

    fn observations(&self, detections: &[Detection], viewer: &Viewer) -> Vec<Observation> {
        let mut observations = vec![Observation::Missed; self.targets.len()];
        for d in detections {
            let Some(slot) = observations.get_mut(d.target) else {
                warn!("image tracker: detection for unknown target {}", d.target);
                continue;
            };
            if let Observation::Detected { confidence, .. } = slot {
                if *confidence >= d.confidence {
                    continue;
                }
            }
            *slot = Observation::Detected {
                pose: viewer.pose.compose(&d.pose),
                confidence: d.confidence,
            };
        }
        observations
    }

    /// Run detection for this tick. `None` means nothing new is known yet.
    fn detect(&mut self, id: TrackerId, sample: &Sample) -> ArResult<Option<Vec<Detection>>> {
        let failed = |reason: String| ArError::TrackerProcessing { tracker: id, reason };
        match self.options.execution {
            Execution::Inline => {
                let backend = self
                    .backend
                    .as_mut()
                    .ok_or(ArError::InvalidState("detection backend missing"))?;
                backend
                    .detect(sample)
                    .map(Some)
                    .map_err(|e| failed(format!("{:#}", e)))
            }
            Execution::Background => {
                let worker = self
                    .worker
                    .as_mut()
                    .ok_or(ArError::InvalidState("detection worker missing"))?;
                let finished = worker.try_collect();
                if worker.submit(sample) {
                    debug!("{}: sample {} submitted for detection", id, sample.seq);
                }
                match finished {
                    Some(outcome) => {
                        debug!("{}: detection for sample {} finished", id, outcome.sample_seq);
                        outcome.detections.map(Some).map_err(failed)
                    }
                    None if worker.is_dead() => Err(failed("detection worker stopped".into())),
                    None => Ok(None),
                }
            }
        }
    }
}

impl Tracker for ImageTracker {
    fn kind(&self) -> TrackerKind {
        TrackerKind::Image
    }

    fn id(&self) -> Option<TrackerId> {
        self.id
    }

    fn attach(&mut self, id: TrackerId) -> ArResult<()> {
        if self.id.is_some() {
            return Err(ArError::InvalidState("tracker is already bound to a session"));
        }
        self.id = Some(id);
        Ok(())
    }

    fn database(&self) -> &ReferenceDatabase {
        &self.database
    }

    fn database_mut(&mut self) -> ArResult<&mut ReferenceDatabase> {
        if self.running || self.stopped || self.database.is_locked() {
            return Err(DatabaseError::Locked.into());
        }
        Ok(&mut self.database)
    }

    fn events(&mut self) -> &mut TrackerEvents {
        &mut self.events
    }

    fn start(&mut self) -> ArResult<()> {
        let id = self
            .id
            .ok_or(ArError::InvalidState("tracker is not attached to a session"))?;
        if self.running || self.stopped {
            return Err(ArError::InvalidState("tracker was already started"));
        }
        if self.database.is_empty() {
            return Err(DatabaseError::Empty.into());
        }

        let mut backend = self
            .backend
            .take()
            .ok_or(ArError::InvalidState("detection backend missing"))?;
        if let Err(e) = backend.train(self.database.targets()) {
            self.backend = Some(backend);
            return Err(DatabaseError::Untrainable(format!("{:#}", e)).into());
        }

        self.database.lock();
        self.targets = vec![TargetTracker::new(); self.database.len()];
        self.names = self
            .database
            .targets()
            .iter()
            .map(|t| Arc::from(t.name.as_str()))
            .collect();

        match self.options.execution {
            Execution::Inline => self.backend = Some(backend),
            Execution::Background => {
                let worker = DetectionWorker::spawn(backend, &id.to_string())
                    .map_err(|e| ArError::UnsupportedEnvironment(format!("{:#}", e)))?;
                self.worker = Some(worker);
            }
        }

        self.running = true;
        info!(
            "{}: image tracker started with {} targets ({:?})",
            id,
            self.database.len(),
            self.options.execution
        );
        Ok(())
    }

    fn process(&mut self, sample: &Sample, viewer: &Viewer) -> ArResult<TrackerResult> {
        let id = self.id.ok_or(ArError::InvalidState("tracker is not attached"))?;
        if !self.running {
            return Err(ArError::InvalidState("tracker is not running"));
        }
        let t_start = Instant::now();

        let observations = match self.detect(id, sample)? {
            Some(detections) => self.observations(&detections, viewer),
            None => vec![Observation::Pending; self.targets.len()],
        };

        let policy = self.options.policy;
        for (idx, observation) in observations.into_iter().enumerate() {
            let last_pose = self.targets[idx].pose().copied();
            let Some(transition) = self.targets[idx].observe(observation, &policy) else {
                continue;
            };
            let target = self.target_ref(id, idx);
            match transition {
                Transition::Found => {
                    let pose = self.targets[idx].pose().copied().unwrap_or_default();
                    info!("{}: target found: {}", id, target.name);
                    self.events_tx.enqueue(TargetEvent::TargetFound { target, pose });
                }
                Transition::Dropped => {
                    info!("{}: target lost: {}", id, target.name);
                    self.events_tx.enqueue(TargetEvent::TargetLost {
                        target,
                        last_pose: last_pose.unwrap_or_default(),
                    });
                }
                Transition::Suspended => debug!("{}: {} lost, grace window open", id, target.name),
                Transition::Reacquired => debug!("{}: {} re-acquired", id, target.name),
            }
        }

        let trackables = self
            .targets
            .iter()
            .enumerate()
            .filter_map(|(idx, t)| {
                let pose = *t.pose()?;
                Some(Trackable {
                    target: self.target_ref(id, idx),
                    pose,
                    state: t.state(),
                    confidence: t.confidence(),
                })
            })
            .collect();

        Ok(TrackerResult {
            tracker: id,
            trackables,
            viewer: viewer.clone(),
            processing_time: t_start.elapsed(),
            stale: false,
        })
    }

    fn stop(&mut self) {
        if let Some(mut worker) = self.worker.take() {
            worker.cancel();
        }
        let discarded = self.events.discard_pending();
        if discarded > 0 {
            debug!("image tracker: discarded {} undelivered events", discarded);
        }
        for t in &mut self.targets {
            t.reset();
        }
        if self.running {
            info!("{}: image tracker stopped", self.id.map(|i| i.to_string()).unwrap_or_default());
        }
        self.running = false;
        self.stopped = true;
    }
}

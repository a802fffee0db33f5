//! Session and frame loop.
//!
//! A [`Session`] owns the viewport, the sources and the trackers. Each tick
//! polls every source, runs every tracker on its bound source's newest
//! sample, delivers the tracker's queued events to its listeners, and hands
//! the aggregated [`Frame`] to the armed callback. The callback must re-arm
//! itself; an unarmed session does not tick.

pub mod control;
pub mod frame;
pub mod options;
pub mod stats;

pub use control::{FrameCallback, FrameControl, SessionHandle};
pub use frame::{Frame, SessionTime};
pub use options::{FrameClock, SessionMode, SessionOptions, TrackerBinding};
pub use stats::{StatsSnapshot, TrackerStats};

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, Sender, select, unbounded};
use tracing::{debug, info, warn};

use crate::error::{ArError, ArResult};
use crate::events::TrackerEvents;
use crate::source::{Sample, SamplePoll, Source};
use crate::tracker::{Tracker, TrackerId, TrackerResult};
use crate::viewport::{Dimensions, Viewport};

use control::Command;
use stats::Stats;

/// How long a suspended loop waits on the control channel before checking
/// whether any handle is left.
const SUSPEND_POLL: Duration = Duration::from_millis(50);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    #[default]
    Initializing,
    Active,
    Paused,
    Terminated,
}

pub struct Session {
    state: SessionState,
    mode: SessionMode,
    viewport: Viewport,
    sources: Vec<Box<dyn Source>>,
    trackers: Vec<Box<dyn Tracker>>,
    tracker_ids: Vec<TrackerId>,
    /// Source index feeding each tracker.
    bindings: Vec<usize>,
    /// Newest sample of each source.
    latest: Vec<Option<Sample>>,
    ended: Vec<bool>,
    /// Last result of each tracker, reused after a processing error.
    previous: Vec<Option<TrackerResult>>,
    callback: Option<FrameCallback>,
    clock: FrameClock,
    control_tx: Sender<Command>,
    control_rx: Receiver<Command>,
    end_requested: Arc<AtomicBool>,
    handle_token: Arc<()>,
    started_at: Instant,
    last_tick: Option<Instant>,
    tick: u64,
    stats: Option<Stats>,
    on_end: Vec<Box<dyn FnOnce() + Send>>,
}

impl Session {
    /// Validate options, build the viewport, open every source and start
    /// every tracker. Anything acquired is released again on failure.
    pub(crate) fn start(options: SessionOptions) -> ArResult<Self> {
        options.validate()?;
        let SessionOptions {
            mode,
            viewport,
            sources,
            trackers,
            stats,
            gizmos,
            clock,
        } = options;

        let mut viewport = Viewport::new(viewport)?;
        viewport.gizmos.visible = gizmos;

        let (bindings, trackers): (Vec<usize>, Vec<Box<dyn Tracker>>) =
            trackers.into_iter().map(|b| (b.source, b.tracker)).unzip();
        let n_sources = sources.len();
        let n_trackers = trackers.len();
        let (control_tx, control_rx) = unbounded();

        let mut session = Self {
            state: SessionState::Initializing,
            mode,
            viewport,
            sources,
            trackers,
            tracker_ids: Vec::with_capacity(n_trackers),
            bindings,
            latest: vec![None; n_sources],
            ended: vec![false; n_sources],
            previous: vec![None; n_trackers],
            callback: None,
            clock,
            control_tx,
            control_rx,
            end_requested: Arc::new(AtomicBool::new(false)),
            handle_token: Arc::new(()),
            started_at: Instant::now(),
            last_tick: None,
            tick: 0,
            stats: None,
            on_end: Vec::new(),
        };

        if let Err(e) = session.acquire() {
            warn!("session: start failed, releasing resources: {}", e);
            session.release();
            session.state = SessionState::Terminated;
            return Err(e);
        }

        let now = Instant::now();
        if stats {
            session.stats = Some(Stats::new(&session.tracker_ids, n_sources, now));
        }
        session.started_at = now;
        session.state = SessionState::Active;
        info!(
            "session: active ({} mode, {} sources, {} trackers, surface {}x{})",
            session.mode,
            n_sources,
            n_trackers,
            session.viewport.size().width,
            session.viewport.size().height
        );
        Ok(session)
    }

    fn acquire(&mut self) -> ArResult<()> {
        for (i, source) in self.sources.iter_mut().enumerate() {
            source.open().map_err(|e| ArError::SourceUnavailable {
                source_index: i,
                reason: format!("{:#}", e),
            })?;
            debug!("session: source {} ({}) opened", i, source.kind());
        }
        for (i, tracker) in self.trackers.iter_mut().enumerate() {
            let id = TrackerId::new(i as u32);
            tracker.attach(id)?;
            tracker.start()?;
            self.tracker_ids.push(id);
        }
        if let Some(k) = self.sources.first().and_then(|s| s.intrinsics()) {
            self.viewport.bind_intrinsics(k);
        }
        Ok(())
    }

    /// Stop trackers and close sources. Idempotent.
    fn release(&mut self) {
        self.callback = None;
        for tracker in &mut self.trackers {
            tracker.stop();
        }
        for source in &mut self.sources {
            source.close();
        }
        while self.control_rx.try_recv().is_ok() {}
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn mode(&self) -> SessionMode {
        self.mode
    }

    pub fn viewport(&self) -> &Viewport {
        &self.viewport
    }

    pub fn tracker_ids(&self) -> &[TrackerId] {
        &self.tracker_ids
    }

    pub fn tracker(&self, id: TrackerId) -> Option<&dyn Tracker> {
        let idx = self.tracker_ids.iter().position(|&t| t == id)?;
        Some(self.trackers[idx].as_ref())
    }

    /// Event queue and listeners of an attached tracker.
    pub fn tracker_events(&mut self, id: TrackerId) -> Option<&mut TrackerEvents> {
        let idx = self.tracker_ids.iter().position(|&t| t == id)?;
        Some(self.trackers[idx].events())
    }

    /// Ticks run so far.
    pub fn ticks(&self) -> u64 {
        self.tick
    }

    pub fn is_armed(&self) -> bool {
        self.callback.is_some()
    }

    pub fn handle(&self) -> SessionHandle {
        SessionHandle {
            tx: self.control_tx.clone(),
            end_requested: self.end_requested.clone(),
            _token: self.handle_token.clone(),
        }
    }

    /// Arm the loop: `callback` receives the next frame.
    pub fn request_animation_frame<F>(&mut self, callback: F) -> ArResult<()>
    where
        F: FnMut(&Frame, &mut FrameControl) + Send + 'static,
    {
        if self.state == SessionState::Terminated {
            return Err(ArError::InvalidState("session has ended"));
        }
        self.callback = Some(Box::new(callback));
        Ok(())
    }

    /// Register a listener invoked once when the session ends. Runs
    /// immediately if it already has.
    pub fn on_end<F>(&mut self, listener: F)
    where
        F: FnOnce() + Send + 'static,
    {
        if self.state == SessionState::Terminated {
            listener();
        } else {
            self.on_end.push(Box::new(listener));
        }
    }

    pub fn pause(&mut self) {
        if self.state == SessionState::Active {
            self.state = SessionState::Paused;
            info!("session: paused at tick {}", self.tick);
        }
    }

    pub fn resume(&mut self) {
        if self.state == SessionState::Paused {
            self.state = SessionState::Active;
            info!("session: resumed");
        }
    }

    /// Resize the surface. Later frames carry the new projection.
    pub fn resize(&mut self, size: Dimensions) -> ArResult<()> {
        self.viewport.resize(size)
    }

    pub fn set_gizmos_visible(&mut self, visible: bool) {
        self.viewport.gizmos.visible = visible;
    }

    /// Run one tick if the session is active and armed. Returns whether a
    /// frame was delivered.
    pub fn step(&mut self) -> bool {
        self.apply_commands();
        if self.end_requested.load(Ordering::SeqCst) {
            self.end();
        }
        if self.state != SessionState::Active {
            return false;
        }
        let Some(mut callback) = self.callback.take() else {
            return false;
        };

        let frame = self.tick();
        if self.end_requested.load(Ordering::SeqCst) {
            self.end();
            return false;
        }

        let mut control = FrameControl::default();
        callback(&frame, &mut control);
        if let Some(stats) = &mut self.stats {
            stats.record_delivered();
        }
        self.apply_control(control, callback);
        true
    }

    fn tick(&mut self) -> Frame {
        let now = Instant::now();
        let delta = self
            .last_tick
            .map(|t| now.saturating_duration_since(t))
            .unwrap_or_default();
        self.last_tick = Some(now);
        let time = SessionTime {
            elapsed: now.saturating_duration_since(self.started_at),
            delta,
            tick: self.tick,
        };
        self.tick += 1;

        self.poll_sources();

        let viewer = self.viewport.viewer();
        let mut results = Vec::with_capacity(self.trackers.len());
        for (i, tracker) in self.trackers.iter_mut().enumerate() {
            let id = self.tracker_ids[i];
            tracker.events().dispatch_pending();

            let result = match &self.latest[self.bindings[i]] {
                None => TrackerResult::empty(id, viewer.clone()),
                Some(sample) => {
                    let t_start = Instant::now();
                    let outcome = tracker.process(sample, &viewer);
                    if let Some(stats) = &mut self.stats {
                        stats.record_processing(i, t_start.elapsed(), outcome.is_ok());
                    }
                    match outcome {
                        Ok(result) => result,
                        Err(e) => {
                            warn!("session: {}; reusing previous result", e);
                            let previous = self.previous[i]
                                .clone()
                                .unwrap_or_else(|| TrackerResult::empty(id, viewer.clone()));
                            TrackerResult {
                                stale: true,
                                ..previous
                            }
                        }
                    }
                }
            };

            tracker.events().dispatch_pending();
            self.previous[i] = Some(result.clone());
            results.push(result);
        }

        let stats = self.stats.as_mut().map(|stats| {
            stats.record_tick();
            for (i, source) in self.sources.iter().enumerate() {
                stats.record_dropped(i, source.dropped_samples());
            }
            stats.roll_window(now);
            stats.snapshot()
        });

        Frame {
            results,
            timestamp: now,
            time,
            ended_sources: self.ended.clone(),
            stats,
        }
    }

    fn poll_sources(&mut self) {
        for (i, source) in self.sources.iter_mut().enumerate() {
            if self.ended[i] {
                continue;
            }
            match source.poll() {
                SamplePoll::Ready(sample) => self.latest[i] = Some(sample),
                SamplePoll::Pending => {}
                SamplePoll::Ended => {
                    self.ended[i] = true;
                    info!("session: source {} ({}) ended", i, source.kind());
                }
            }
        }
    }

    fn apply_control(&mut self, control: FrameControl, callback: FrameCallback) {
        if control.end {
            self.end();
            return;
        }
        if let Some(size) = control.resize {
            self.apply_resize(size);
        }
        if let Some(visible) = control.gizmos {
            self.set_gizmos_visible(visible);
        }
        if control.pause {
            self.pause();
        }
        if control.rearm && self.callback.is_none() {
            self.callback = Some(callback);
        }
    }

    fn apply_commands(&mut self) {
        while let Ok(cmd) = self.control_rx.try_recv() {
            self.apply_command(cmd);
        }
    }

    fn apply_command(&mut self, cmd: Command) {
        match cmd {
            Command::RequestFrame(callback) => {
                if self.state != SessionState::Terminated {
                    self.callback = Some(callback);
                }
            }
            Command::Pause => self.pause(),
            Command::Resume => self.resume(),
            Command::End => self.end(),
            Command::Resize(size) => self.apply_resize(size),
            Command::SetGizmosVisible(visible) => self.set_gizmos_visible(visible),
        }
    }

    fn apply_resize(&mut self, size: Dimensions) {
        if let Err(e) = self.viewport.resize(size) {
            warn!("session: {}", e);
        }
    }

    fn has_handles(&self) -> bool {
        Arc::strong_count(&self.handle_token) > 1
    }

    /// Drive the loop from the configured [`FrameClock`] until the session
    /// ends, the clock stops, or the loop is suspended with no handle left
    /// to re-arm it.
    pub fn run(&mut self) -> ArResult<()> {
        if self.state == SessionState::Initializing {
            return Err(ArError::InvalidState("session is not started"));
        }
        let ticks = match &self.clock {
            FrameClock::Manual(rx) => rx.clone(),
            FrameClock::Interval(_) => {
                let period = self.clock.period().unwrap_or(Duration::from_millis(33));
                crossbeam_channel::tick(period)
            }
        };
        let control = self.control_rx.clone();
        info!("session: frame loop running");

        loop {
            self.apply_commands();
            if self.end_requested.load(Ordering::SeqCst) {
                self.end();
            }
            if self.state == SessionState::Terminated {
                break;
            }

            if self.callback.is_none() || self.state == SessionState::Paused {
                if !self.has_handles() {
                    info!("session: suspended with no handle left to resume it");
                    break;
                }
                if let Ok(cmd) = control.recv_timeout(SUSPEND_POLL) {
                    self.apply_command(cmd);
                }
                continue;
            }

            select! {
                recv(ticks) -> tick => match tick {
                    Ok(_) => {
                        self.step();
                    }
                    Err(_) => {
                        info!("session: frame clock stopped");
                        break;
                    }
                },
                recv(control) -> cmd => {
                    if let Ok(cmd) = cmd {
                        self.apply_command(cmd);
                    }
                }
            }
        }
        Ok(())
    }

    /// End the session: no frame is delivered afterwards. Stops trackers,
    /// closes sources and notifies `on_end` listeners. Idempotent.
    pub fn end(&mut self) {
        if self.state == SessionState::Terminated {
            return;
        }
        self.end_requested.store(true, Ordering::SeqCst);
        self.state = SessionState::Terminated;
        self.release();
        if let Some(stats) = &self.stats {
            stats.log();
        }
        info!("session: ended after {} ticks", self.tick);
        for listener in self.on_end.drain(..) {
            listener();
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.end();
    }
}

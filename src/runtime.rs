//! Runtime context: capability checks and session construction.

use tracing::info;

use crate::error::{ArError, ArResult};
use crate::session::{Session, SessionMode, SessionOptions};

/// What the host can run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Capabilities {
    /// Threads available for capture and detection work.
    pub worker_threads: usize,
    pub modes: Vec<SessionMode>,
}

impl Capabilities {
    pub fn detect() -> Self {
        let worker_threads = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        Self {
            worker_threads,
            modes: vec![SessionMode::Immersive, SessionMode::Inline],
        }
    }
}

/// Entry point for starting sessions. Holds no session state; every session
/// owns its own resources.
#[derive(Debug, Clone)]
pub struct RuntimeContext {
    capabilities: Capabilities,
}

impl Default for RuntimeContext {
    fn default() -> Self {
        Self::new()
    }
}

impl RuntimeContext {
    pub fn new() -> Self {
        Self::with_capabilities(Capabilities::detect())
    }

    pub fn with_capabilities(capabilities: Capabilities) -> Self {
        Self { capabilities }
    }

    pub fn capabilities(&self) -> &Capabilities {
        &self.capabilities
    }

    /// Whether any kind of session can run here.
    pub fn is_supported(&self) -> bool {
        self.capabilities.worker_threads > 0 && !self.capabilities.modes.is_empty()
    }

    pub fn supports(&self, mode: SessionMode) -> bool {
        self.is_supported() && self.capabilities.modes.contains(&mode)
    }

    /// Open sources, start trackers and return an active session.
    ///
    /// Nothing is opened when the mode is unsupported. If a source or
    /// tracker fails to start, everything acquired so far is released.
    pub fn start_session(&self, options: SessionOptions) -> ArResult<Session> {
        if !self.supports(options.mode) {
            return Err(ArError::UnsupportedEnvironment(format!(
                "{} sessions are not supported ({} worker threads, modes {:?})",
                options.mode, self.capabilities.worker_threads, self.capabilities.modes
            )));
        }
        info!(
            "runtime: starting {} session with {} sources and {} trackers",
            options.mode,
            options.sources.len(),
            options.trackers.len()
        );
        Session::start(options)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::{Duration, Instant};

    use parking_lot::Mutex;

    use super::*;
    use crate::error::DatabaseError;
    use crate::geometry::CameraIntrinsics;
    use crate::session::{FrameClock, SessionState};
    use crate::source::{SamplePoll, Source, SourceKind};
    use crate::testing::{Scene, target, video};
    use crate::tracker::{ImageTracker, Tracker};
    use crate::viewport::ViewportConfig;

    struct CountingSource {
        opened: Arc<AtomicUsize>,
    }

    impl Source for CountingSource {
        fn kind(&self) -> SourceKind {
            SourceKind::Camera
        }
        fn open(&mut self) -> anyhow::Result<()> {
            self.opened.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
        fn poll(&mut self) -> SamplePoll {
            SamplePoll::Pending
        }
        fn close(&mut self) {}
        fn intrinsics(&self) -> Option<CameraIntrinsics> {
            None
        }
    }

    fn options() -> SessionOptions {
        SessionOptions::new(ViewportConfig::with_surface("canvas", 640, 480))
    }

    #[test]
    fn test_host_capabilities_support_both_modes() {
        let ctx = RuntimeContext::new();
        assert!(ctx.is_supported());
        assert!(ctx.supports(SessionMode::Immersive));
        assert!(ctx.supports(SessionMode::Inline));
    }

    #[test]
    fn test_unsupported_mode_opens_nothing() {
        let ctx = RuntimeContext::with_capabilities(Capabilities {
            worker_threads: 4,
            modes: vec![SessionMode::Inline],
        });
        let opened = Arc::new(AtomicUsize::new(0));
        let result = ctx.start_session(
            options()
                .with_mode(SessionMode::Immersive)
                .with_source(CountingSource { opened: opened.clone() }),
        );
        assert!(matches!(result.err(), Some(ArError::UnsupportedEnvironment(_))));
        assert_eq!(opened.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_duplicate_batch_leaves_database_untouched() {
        let scene = Scene::new();
        let mut tracker = ImageTracker::new(scene.backend());
        let db = tracker.database_mut().unwrap();
        let err = db
            .add([target("mage"), target("cat"), target("mage")])
            .unwrap_err();
        assert_eq!(err, DatabaseError::DuplicateTargetName("mage".into()));
        assert!(db.is_empty());

        let result = RuntimeContext::new().start_session(options().with_source(video(3)).with_tracker(tracker, 0));
        assert!(matches!(
            result.err(),
            Some(ArError::TargetDatabase(DatabaseError::Empty))
        ));
    }

    #[test]
    fn test_background_tracker_session_end_to_end() {
        let scene = Scene::new();
        scene.show(0);
        let mut tracker = ImageTracker::new(scene.backend());
        tracker.database_mut().unwrap().add([target("mage")]).unwrap();

        let (tx, rx) = crossbeam_channel::unbounded();
        let mut session = RuntimeContext::new()
            .start_session(
                options()
                    .with_source(video(200))
                    .with_tracker(tracker, 0)
                    .with_clock(FrameClock::Manual(rx)),
            )
            .unwrap();

        let found = Arc::new(AtomicUsize::new(0));
        let f = found.clone();
        let id = session.tracker_ids()[0];
        session
            .tracker_events(id)
            .unwrap()
            .add_listener(crate::events::EventKind::TargetFound, move |_| {
                f.fetch_add(1, Ordering::SeqCst);
            });

        let first_seen: Arc<Mutex<Option<u64>>> = Arc::default();
        let s = first_seen.clone();
        session
            .request_animation_frame(move |frame, control| {
                if !frame.results()[0].trackables.is_empty() {
                    s.lock().get_or_insert(frame.time().tick);
                    control.end();
                }
                control.request_animation_frame();
            })
            .unwrap();

        let feeder = std::thread::spawn(move || {
            for _ in 0..150 {
                if tx.send(Instant::now()).is_err() {
                    break;
                }
                std::thread::sleep(Duration::from_millis(5));
            }
        });
        session.run().unwrap();
        drop(session);
        feeder.join().unwrap();

        assert!(first_seen.lock().is_some());
        assert_eq!(found.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_tracker_cannot_join_two_sessions() {
        let scene = Scene::new();
        let mut tracker = ImageTracker::new(scene.backend());
        tracker.database_mut().unwrap().add([target("mage")]).unwrap();
        tracker.attach(crate::tracker::TrackerId::new(9)).unwrap();

        let result = RuntimeContext::new().start_session(options().with_source(video(3)).with_tracker(tracker, 0));
        assert!(matches!(result.err(), Some(ArError::InvalidOptions(_))));
    }

    #[test]
    fn test_session_state_after_start() {
        let session = RuntimeContext::new()
            .start_session(options().with_source(video(3)).with_stats(true))
            .unwrap();
        assert_eq!(session.state(), SessionState::Active);
        assert_eq!(session.mode(), SessionMode::Immersive);
    }
}

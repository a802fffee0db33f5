//! Detection backends and the background detection worker.
//!
//! A [`DetectionBackend`] is the vision algorithm: it is trained once on the
//! reference targets and then asked to find them in samples. The tracker
//! either calls it inline during `process` or hands samples to a
//! [`DetectionWorker`] thread, which may take several ticks per sample.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};

use anyhow::{Context, Result};
use crossbeam_channel::{Receiver, Sender, TryRecvError, TrySendError, bounded, unbounded};
use tracing::{debug, warn};

use crate::geometry::Pose;
use crate::source::Sample;

use super::ReferenceTarget;

/// A target found in a sample.
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    /// Index of the target in the reference database.
    pub target: usize,
    /// Target pose in the camera frame (GL convention, -Z forward).
    pub pose: Pose,
    pub confidence: f32,
}

/// The vision algorithm behind an image tracker.
pub trait DetectionBackend: Send {
    /// Prepare for the given targets. Called once, before any `detect`.
    fn train(&mut self, targets: &[ReferenceTarget]) -> Result<()>;

    /// Find trained targets in `sample`.
    fn detect(&mut self, sample: &Sample) -> Result<Vec<Detection>>;
}

/// Finished detection job.
#[derive(Debug)]
pub struct DetectionOutcome {
    pub sample_seq: u64,
    pub detections: std::result::Result<Vec<Detection>, String>,
}

/// Runs a backend on its own thread, one sample at a time.
pub struct DetectionWorker {
    job_tx: Option<Sender<Sample>>,
    result_rx: Receiver<DetectionOutcome>,
    cancelled: Arc<AtomicBool>,
    in_flight: bool,
    /// The worker thread is gone without being cancelled.
    dead: bool,
    handle: Option<JoinHandle<()>>,
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("detection backend panicked: {}", s)
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("detection backend panicked: {}", s)
    } else {
        "detection backend panicked".to_string()
    }
}

impl DetectionWorker {
    pub fn spawn(mut backend: Box<dyn DetectionBackend>, name: &str) -> Result<Self> {
        let (job_tx, job_rx) = bounded::<Sample>(1);
        let (result_tx, result_rx) = unbounded::<DetectionOutcome>();
        let cancelled = Arc::new(AtomicBool::new(false));
        let flag = cancelled.clone();

        let handle = thread::Builder::new()
            .name(format!("ar-detect-{}", name))
            .spawn(move || {
                for sample in job_rx.iter() {
                    if flag.load(Ordering::SeqCst) {
                        break;
                    }
                    let detections =
                        match panic::catch_unwind(AssertUnwindSafe(|| backend.detect(&sample))) {
                            Ok(result) => result.map_err(|e| format!("{:#}", e)),
                            Err(payload) => Err(panic_message(payload.as_ref())),
                        };
                    // Results that finish after cancellation are discarded.
                    if flag.load(Ordering::SeqCst) {
                        break;
                    }
                    let outcome = DetectionOutcome {
                        sample_seq: sample.seq,
                        detections,
                    };
                    if result_tx.send(outcome).is_err() {
                        break;
                    }
                }
                debug!("detection worker exiting");
            })
            .context("failed to spawn detection worker")?;

        Ok(Self {
            job_tx: Some(job_tx),
            result_rx,
            cancelled,
            in_flight: false,
            dead: false,
            handle: Some(handle),
        })
    }

    pub fn is_busy(&self) -> bool {
        self.in_flight
    }

    /// True once the worker thread has exited on its own. No further results
    /// will arrive.
    pub fn is_dead(&self) -> bool {
        self.dead
    }

    /// Hand a sample to the worker if it is idle. Returns false if busy or stopped.
    pub fn submit(&mut self, sample: &Sample) -> bool {
        if self.in_flight {
            return false;
        }
        let Some(tx) = &self.job_tx else {
            return false;
        };
        match tx.try_send(sample.clone()) {
            Ok(()) => {
                self.in_flight = true;
                true
            }
            Err(TrySendError::Full(_)) => false,
            Err(TrySendError::Disconnected(_)) => {
                if !self.dead {
                    warn!("detection worker is gone");
                }
                self.dead = true;
                false
            }
        }
    }

    /// Collect a finished job without blocking.
    pub fn try_collect(&mut self) -> Option<DetectionOutcome> {
        if self.cancelled.load(Ordering::SeqCst) {
            return None;
        }
        match self.result_rx.try_recv() {
            Ok(outcome) => {
                self.in_flight = false;
                Some(outcome)
            }
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => {
                if !self.dead {
                    warn!("detection worker exited unexpectedly");
                }
                self.dead = true;
                self.in_flight = false;
                None
            }
        }
    }

    /// Stop accepting work and wait for the thread. An in-flight job is allowed
    /// to finish; its result is dropped.
    pub fn cancel(&mut self) {
        self.cancelled.store(true, Ordering::SeqCst);
        self.job_tx = None;
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("detection worker panicked");
            }
        }
        while self.result_rx.try_recv().is_ok() {}
        self.in_flight = false;
    }
}

impl Drop for DetectionWorker {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, Instant};

    use image::GrayImage;

    use super::*;
    use crate::geometry::CameraIntrinsics;

    /// Reports every trained target in every sample, after a delay.
    struct SlowEverything {
        targets: usize,
        delay: Duration,
    }

    impl DetectionBackend for SlowEverything {
        fn train(&mut self, targets: &[ReferenceTarget]) -> Result<()> {
            self.targets = targets.len();
            Ok(())
        }

        fn detect(&mut self, _sample: &Sample) -> Result<Vec<Detection>> {
            thread::sleep(self.delay);
            Ok((0..self.targets)
                .map(|target| Detection {
                    target,
                    pose: Pose::identity(),
                    confidence: 1.0,
                })
                .collect())
        }
    }

    /// Panics on every call.
    struct Panicking;

    impl DetectionBackend for Panicking {
        fn train(&mut self, _targets: &[ReferenceTarget]) -> Result<()> {
            Ok(())
        }

        fn detect(&mut self, _sample: &Sample) -> Result<Vec<Detection>> {
            panic!("feature buffer overflow");
        }
    }

    fn sample(seq: u64) -> Sample {
        Sample::new(seq, 0, GrayImage::new(8, 8), CameraIntrinsics::from_fov(8, 8, 1.0))
    }

    fn wait_collect(worker: &mut DetectionWorker) -> Option<DetectionOutcome> {
        let deadline = Instant::now() + Duration::from_secs(2);
        while Instant::now() < deadline {
            if let Some(outcome) = worker.try_collect() {
                return Some(outcome);
            }
            thread::sleep(Duration::from_millis(1));
        }
        None
    }

    #[test]
    fn test_worker_runs_one_job_at_a_time() {
        let backend = SlowEverything {
            targets: 2,
            delay: Duration::from_millis(20),
        };
        let mut worker = DetectionWorker::spawn(Box::new(backend), "test").unwrap();

        assert!(worker.submit(&sample(1)));
        assert!(worker.is_busy());
        assert!(!worker.submit(&sample(2)));

        let outcome = wait_collect(&mut worker).expect("worker never finished");
        assert_eq!(outcome.sample_seq, 1);
        assert_eq!(outcome.detections.unwrap().len(), 2);
        assert!(!worker.is_busy());
        assert!(worker.submit(&sample(3)));
    }

    #[test]
    fn test_cancel_discards_in_flight_result() {
        let backend = SlowEverything {
            targets: 1,
            delay: Duration::from_millis(30),
        };
        let mut worker = DetectionWorker::spawn(Box::new(backend), "test").unwrap();
        assert!(worker.submit(&sample(1)));
        worker.cancel();

        assert!(worker.try_collect().is_none());
        assert!(!worker.submit(&sample(2)));
    }

    #[test]
    fn test_backend_panic_becomes_failed_outcome() {
        let mut worker = DetectionWorker::spawn(Box::new(Panicking), "test").unwrap();
        assert!(worker.submit(&sample(1)));
        let outcome = wait_collect(&mut worker).expect("worker never reported");
        let err = outcome.detections.unwrap_err();
        assert!(err.contains("feature buffer overflow"), "{}", err);

        // The thread survives and keeps taking work.
        assert!(!worker.is_dead());
        assert!(worker.submit(&sample(2)));
        assert!(wait_collect(&mut worker).is_some());
    }
}

use anyhow::{Context, Result};
use tracing::{debug, info};

use ar_runtime::events::EventKind;
use ar_runtime::io::config::{SessionConfig, SourceConfig};
use ar_runtime::logging::init_tracing;
use ar_runtime::session::{FrameClock, SessionOptions};
use ar_runtime::source::{Camera, Source, TestPatternDevice, Video};
use ar_runtime::tracker::{ImageTracker, ImageTrackerOptions, SignatureMatcher, Tracker};
use ar_runtime::RuntimeContext;

fn build_source(config: &SessionConfig) -> Result<Box<dyn Source>> {
    match &config.source {
        SourceConfig::Video {
            frames,
            image_dir,
            playback,
            ..
        } => {
            let mut video = Video::from_frame_list(frames.clone(), image_dir.clone()).with_playback(*playback);
            if let Some([fx, fy, cx, cy]) = config.video_pinhole() {
                video = video.with_pinhole(fx, fy, cx, cy);
            }
            println!("Video: frames from {}", frames.display());
            Ok(Box::new(video))
        }
        SourceConfig::TestPattern { seed, noise, .. } => {
            let camera_config = config
                .camera_config()
                .context("test pattern source without camera settings")?;
            println!(
                "Camera: synthetic {:?} @ {} fps (seed {})",
                camera_config.resolution, camera_config.fps, seed
            );
            let device = TestPatternDevice::new(*seed).with_noise(*noise);
            Ok(Box::new(Camera::new(camera_config, Box::new(device))))
        }
    }
}

fn main() -> Result<()> {
    init_tracing();

    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "session.yaml".to_string());
    println!("Loading session config from: {}", config_path);
    let config = SessionConfig::load(&config_path)?;

    let ctx = RuntimeContext::new();
    if !ctx.supports(config.mode) {
        anyhow::bail!("{} sessions are not supported on this host", config.mode);
    }

    let targets = config.load_targets()?;
    println!("Loaded {} reference targets", targets.len());

    let matcher = SignatureMatcher::new().with_min_score(config.detection.min_score);
    let mut tracker = ImageTracker::with_options(
        matcher,
        ImageTrackerOptions {
            policy: config.tracking,
            execution: config.detection.execution,
        },
    );
    tracker.database_mut()?.add(targets)?;
    tracker.add_event_listener(EventKind::TargetFound, |event| {
        let t = event.pose().translation;
        println!("+ {} found at [{:.2}, {:.2}, {:.2}]", event.target(), t.x, t.y, t.z);
    });
    tracker.add_event_listener(EventKind::TargetLost, |event| {
        println!("- {} lost", event.target());
    });

    let mut options = SessionOptions::new(config.viewport_config())
        .with_mode(config.mode)
        .with_stats(config.stats)
        .with_gizmos(config.gizmos)
        .with_clock(FrameClock::Interval(config.fps))
        .with_tracker(tracker, 0);
    options.sources.push(build_source(&config)?);

    let mut session = ctx.start_session(options)?;
    session.on_end(|| info!("session finished"));
    session.request_animation_frame(|frame, control| {
        for result in frame.results() {
            for t in &result.trackables {
                let m = t.pose.matrix();
                debug!(
                    "tick {} {} {:?} conf {:.2} at [{:.2}, {:.2}, {:.2}]",
                    frame.time().tick,
                    t.target,
                    t.state,
                    t.confidence,
                    m[(0, 3)],
                    m[(1, 3)],
                    m[(2, 3)]
                );
            }
        }
        if frame.all_sources_ended() {
            control.end();
        } else {
            control.request_animation_frame();
        }
    })?;

    session.run()?;
    println!("Processed {} ticks", session.ticks());
    Ok(())
}

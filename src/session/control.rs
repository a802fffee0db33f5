//! Frame-loop control: in-callback [`FrameControl`] and cross-thread [`SessionHandle`].

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crossbeam_channel::Sender;

use crate::viewport::Dimensions;

use super::Frame;

/// Per-frame callback. Re-arms itself through [`FrameControl::request_animation_frame`].
pub type FrameCallback = Box<dyn FnMut(&Frame, &mut FrameControl) + Send>;

pub(crate) enum Command {
    RequestFrame(FrameCallback),
    Pause,
    Resume,
    End,
    Resize(Dimensions),
    SetGizmosVisible(bool),
}

/// Requests made from inside a frame callback. They take effect after the
/// callback returns.
#[derive(Debug, Default)]
pub struct FrameControl {
    pub(crate) rearm: bool,
    pub(crate) end: bool,
    pub(crate) pause: bool,
    pub(crate) resize: Option<Dimensions>,
    pub(crate) gizmos: Option<bool>,
}

impl FrameControl {
    /// Schedule the same callback for the next tick.
    pub fn request_animation_frame(&mut self) {
        self.rearm = true;
    }

    pub fn end(&mut self) {
        self.end = true;
    }

    pub fn pause(&mut self) {
        self.pause = true;
    }

    pub fn resize(&mut self, size: Dimensions) {
        self.resize = Some(size);
    }

    pub fn set_gizmos_visible(&mut self, visible: bool) {
        self.gizmos = Some(visible);
    }
}

/// Controls a running session from any thread.
///
/// Commands are applied at the start of the next tick. `end` also takes
/// effect immediately: no frame is delivered once it has returned.
#[derive(Clone)]
pub struct SessionHandle {
    pub(crate) tx: Sender<Command>,
    pub(crate) end_requested: Arc<AtomicBool>,
    /// Lets the session count live handles.
    pub(crate) _token: Arc<()>,
}

impl SessionHandle {
    fn send(&self, cmd: Command) -> bool {
        !self.is_ended() && self.tx.send(cmd).is_ok()
    }

    pub fn request_animation_frame<F>(&self, callback: F) -> bool
    where
        F: FnMut(&Frame, &mut FrameControl) + Send + 'static,
    {
        self.send(Command::RequestFrame(Box::new(callback)))
    }

    pub fn pause(&self) -> bool {
        self.send(Command::Pause)
    }

    pub fn resume(&self) -> bool {
        self.send(Command::Resume)
    }

    pub fn resize(&self, size: Dimensions) -> bool {
        self.send(Command::Resize(size))
    }

    pub fn set_gizmos_visible(&self, visible: bool) -> bool {
        self.send(Command::SetGizmosVisible(visible))
    }

    pub fn end(&self) {
        self.end_requested.store(true, Ordering::SeqCst);
        let _ = self.tx.send(Command::End);
    }

    pub fn is_ended(&self) -> bool {
        self.end_requested.load(Ordering::SeqCst)
    }
}

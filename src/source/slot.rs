//! Single-slot sample mailbox with drop-oldest backpressure.
//!
//! A producer thread publishes samples; the tick takes at most one. If the
//! tick does not keep pace, the newest sample replaces the pending one and
//! the replaced sample is counted as dropped.

use parking_lot::Mutex;

use super::Sample;

#[derive(Default)]
struct SlotState {
    pending: Option<Sample>,
    dropped: u64,
    closed: bool,
}

#[derive(Default)]
pub struct LatestSlot {
    state: Mutex<SlotState>,
}

impl LatestSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `sample`, replacing any pending one. Returns true if a sample was dropped.
    pub fn publish(&self, sample: Sample) -> bool {
        let mut state = self.state.lock();
        if state.closed {
            return false;
        }
        let replaced = state.pending.replace(sample).is_some();
        if replaced {
            state.dropped += 1;
        }
        replaced
    }

    pub fn take(&self) -> Option<Sample> {
        self.state.lock().pending.take()
    }

    pub fn dropped(&self) -> u64 {
        self.state.lock().dropped
    }

    /// Mark the producer as finished. Pending samples are kept until taken.
    pub fn close(&self) {
        self.state.lock().closed = true;
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }
}

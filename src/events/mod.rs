//! Target events: FIFO dispatch queue and per-tracker listener bus.
//!
//! A tracker enqueues [`TargetEvent`]s as its targets change state; the
//! session drains each tracker's queue into that tracker's [`EventBus`]
//! during the tick, before the frame is handed to the consumer.

pub mod bus;
pub mod event;
pub mod queue;

pub use bus::{EventBus, ListenerId};
pub use event::{EventKind, TargetEvent, TargetRef};
pub use queue::{EventDispatchQueue, EventSender};

/// Queue plus listeners owned by one tracker.
#[derive(Default)]
pub struct TrackerEvents {
    queue: EventDispatchQueue,
    bus: EventBus,
}

impl TrackerEvents {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sender(&self) -> EventSender {
        self.queue.sender()
    }

    pub fn add_listener<F>(&mut self, kind: EventKind, handler: F) -> ListenerId
    where
        F: FnMut(&TargetEvent) + Send + 'static,
    {
        self.bus.add_listener(kind, handler)
    }

    pub fn remove_listener(&mut self, id: ListenerId) -> bool {
        self.bus.remove_listener(id)
    }

    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    /// Drain the queue fully, delivering each event to its listeners in FIFO order.
    /// Returns the number of events dispatched.
    pub fn dispatch_pending(&mut self) -> usize {
        let mut n = 0;
        while let Some(event) = self.queue.dequeue() {
            self.bus.dispatch(&event);
            n += 1;
        }
        n
    }

    /// Drop pending events without delivering them.
    pub fn discard_pending(&self) -> usize {
        self.queue.clear()
    }
}

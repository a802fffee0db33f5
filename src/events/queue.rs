//! EventDispatchQueue: FIFO hand-off between event producers and the tick.
//!
//! Producers may run on any thread (detection workers, capture threads) and
//! hold an [`EventSender`]. The single consumer is the session tick, which
//! drains the queue once per tick. The queue is an unbounded crossbeam
//! channel, so an enqueue that happens-before a drain is visible to it.

use crossbeam_channel::{Receiver, Sender, TryRecvError, unbounded};

use super::TargetEvent;

/// Per-tracker FIFO event queue.
pub struct EventDispatchQueue {
    tx: Sender<TargetEvent>,
    rx: Receiver<TargetEvent>,
}

/// Cloneable producer handle for an [`EventDispatchQueue`].
#[derive(Clone)]
pub struct EventSender {
    tx: Sender<TargetEvent>,
}

impl EventSender {
    /// Append an event. Returns false if the queue has been dropped.
    pub fn enqueue(&self, event: TargetEvent) -> bool {
        self.tx.send(event).is_ok()
    }
}

impl EventDispatchQueue {
    pub fn new() -> Self {
        let (tx, rx) = unbounded();
        Self { tx, rx }
    }

    pub fn sender(&self) -> EventSender {
        EventSender {
            tx: self.tx.clone(),
        }
    }

    /// Append to the tail.
    pub fn enqueue(&self, event: TargetEvent) {
        // Cannot fail: `self` holds the receiving end.
        let _ = self.tx.send(event);
    }

    /// Remove and return the head, or `None` when empty.
    pub fn dequeue(&self) -> Option<TargetEvent> {
        match self.rx.try_recv() {
            Ok(event) => Some(event),
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => None,
        }
    }

    /// Dequeue until empty, in FIFO order.
    pub fn drain(&self) -> impl Iterator<Item = TargetEvent> + '_ {
        self.rx.try_iter()
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    /// Discard every pending event.
    pub fn clear(&self) -> usize {
        self.drain().count()
    }
}

impl Default for EventDispatchQueue {
    fn default() -> Self {
        Self::new()
    }
}

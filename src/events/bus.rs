//! Per-tracker listener registry.

use super::{EventKind, TargetEvent};

/// Handle returned by [`EventBus::add_listener`], used to unregister.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type Handler = Box<dyn FnMut(&TargetEvent) + Send>;

/// Typed listener registry. Handlers of one kind run in registration order.
#[derive(Default)]
pub struct EventBus {
    listeners: Vec<(ListenerId, EventKind, Handler)>,
    next_id: u64,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_listener<F>(&mut self, kind: EventKind, handler: F) -> ListenerId
    where
        F: FnMut(&TargetEvent) + Send + 'static,
    {
        let id = ListenerId(self.next_id);
        self.next_id += 1;
        self.listeners.push((id, kind, Box::new(handler)));
        id
    }

    pub fn remove_listener(&mut self, id: ListenerId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(lid, _, _)| *lid != id);
        self.listeners.len() != before
    }

    /// Deliver `event` to every listener of its kind. Returns the number of handlers run.
    pub fn dispatch(&mut self, event: &TargetEvent) -> usize {
        let kind = event.kind();
        let mut invoked = 0;
        for (_, k, handler) in self.listeners.iter_mut() {
            if *k == kind {
                handler(event);
                invoked += 1;
            }
        }
        invoked
    }

    pub fn listener_count(&self, kind: EventKind) -> usize {
        self.listeners.iter().filter(|(_, k, _)| *k == kind).count()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use parking_lot::Mutex;

    use super::*;
    use crate::events::TargetRef;
    use crate::geometry::Pose;
    use crate::tracker::TrackerId;

    fn target() -> TargetRef {
        TargetRef {
            tracker: TrackerId::new(0),
            index: 0,
            name: Arc::from("poster"),
        }
    }

    #[test]
    fn test_dispatch_by_kind_in_registration_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut bus = EventBus::new();
        for tag in ["a", "b"] {
            let log = log.clone();
            bus.add_listener(EventKind::TargetFound, move |e| {
                log.lock().push(format!("{tag}:{}", e.target().name));
            });
        }
        let lost_log = log.clone();
        bus.add_listener(EventKind::TargetLost, move |_| lost_log.lock().push("lost".into()));

        let found = TargetEvent::TargetFound {
            target: target(),
            pose: Pose::identity(),
        };
        assert_eq!(bus.dispatch(&found), 2);
        assert_eq!(*log.lock(), vec!["a:poster", "b:poster"]);
    }

    #[test]
    fn test_remove_listener() {
        let mut bus = EventBus::new();
        let id = bus.add_listener(EventKind::TargetLost, |_| {});
        assert_eq!(bus.listener_count(EventKind::TargetLost), 1);
        assert!(bus.remove_listener(id));
        assert!(!bus.remove_listener(id));

        let lost = TargetEvent::TargetLost {
            target: target(),
            last_pose: Pose::identity(),
        };
        assert_eq!(bus.dispatch(&lost), 0);
    }
}

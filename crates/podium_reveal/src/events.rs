//! Podium event bus
//!
//! Typed fan-out of gold card state to sibling components that are not
//! reachable through direct wiring (the other cards' wiggle, for example).

use podium_animation::Timestamp;
use slotmap::{new_key_type, SlotMap};
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

/// Events published by the gold card
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PodiumEvent {
    /// The card finished expanding; `at` is the time since the bus was created
    GoldCardExpanded { at: Timestamp },
    GoldCardCollapsed { at: Timestamp },
}

new_key_type! {
    /// Handle to a registered listener
    pub struct ListenerId;
}

type Listener = Arc<dyn Fn(&PodiumEvent) + Send + Sync>;

struct BusInner {
    listeners: SlotMap<ListenerId, Listener>,
}

/// Shared event bus
///
/// Cloning yields another handle to the same bus.
#[derive(Clone)]
pub struct EventBus {
    inner: Arc<Mutex<BusInner>>,
    origin: tokio::time::Instant,
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(BusInner {
                listeners: SlotMap::with_key(),
            })),
            origin: tokio::time::Instant::now(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, BusInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Time since the bus was created, for event timestamps
    pub fn now(&self) -> Timestamp {
        self.origin.elapsed()
    }

    /// Listen for events; dropping the subscription stops listening
    pub fn subscribe<F>(&self, listener: F) -> EventSubscription
    where
        F: Fn(&PodiumEvent) + Send + Sync + 'static,
    {
        let id = self.lock().listeners.insert(Arc::new(listener));
        EventSubscription {
            bus: Arc::downgrade(&self.inner),
            id: Some(id),
        }
    }

    pub fn listener_count(&self) -> usize {
        self.lock().listeners.len()
    }

    /// Deliver `event` to every listener registered at the time of the call
    pub fn emit(&self, event: PodiumEvent) {
        let listeners: Vec<Listener> = self.lock().listeners.values().cloned().collect();
        tracing::debug!("EventBus: {:?} -> {} listeners", event, listeners.len());
        for listener in listeners {
            if panic::catch_unwind(AssertUnwindSafe(|| listener(&event))).is_err() {
                tracing::error!("EventBus: listener panicked handling {:?}", event);
            }
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Live event subscription; unsubscribes when dropped
pub struct EventSubscription {
    bus: Weak<Mutex<BusInner>>,
    id: Option<ListenerId>,
}

impl EventSubscription {
    pub fn unsubscribe(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if let (Some(id), Some(bus)) = (self.id.take(), self.bus.upgrade()) {
            bus.lock()
                .unwrap_or_else(PoisonError::into_inner)
                .listeners
                .remove(id);
        }
    }
}

impl Drop for EventSubscription {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[test]
    fn test_emit_reaches_all_listeners() {
        let bus = EventBus::new();
        let count = Arc::new(AtomicUsize::new(0));
        let subs: Vec<_> = (0..3)
            .map(|_| {
                let count = Arc::clone(&count);
                bus.subscribe(move |_| {
                    count.fetch_add(1, Ordering::SeqCst);
                })
            })
            .collect();

        bus.emit(PodiumEvent::GoldCardExpanded { at: Duration::ZERO });
        assert_eq!(count.load(Ordering::SeqCst), 3);

        drop(subs);
        assert_eq!(bus.listener_count(), 0);
        bus.emit(PodiumEvent::GoldCardCollapsed { at: Duration::ZERO });
        assert_eq!(count.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_panicking_listener_is_isolated() {
        let bus = EventBus::new();
        let _bad = bus.subscribe(|_| panic!("listener failure"));
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let _good = bus.subscribe(move |event| sink.lock().unwrap().push(*event));

        let event = PodiumEvent::GoldCardExpanded { at: Duration::from_millis(5) };
        bus.emit(event);
        assert_eq!(*seen.lock().unwrap(), vec![event]);
    }

    #[test]
    fn test_listener_may_subscribe_during_emit() {
        let bus = EventBus::new();
        let nested = Arc::new(Mutex::new(Vec::new()));
        let _sub = {
            let bus_handle = bus.clone();
            let nested = Arc::clone(&nested);
            bus.subscribe(move |_| {
                nested.lock().unwrap().push(bus_handle.subscribe(|_| {}));
            })
        };
        bus.emit(PodiumEvent::GoldCardCollapsed { at: Duration::ZERO });
        assert_eq!(bus.listener_count(), 2);
    }
}

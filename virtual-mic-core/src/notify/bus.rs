use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;

use parking_lot::RwLock;
use serde::Serialize;

use crate::models::events::{EngineEvent, Severity};
use crate::traits::engine_observer::EngineObserver;

/// Handle returned by `subscribe*`, used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct SubscriptionId(u64);

#[derive(Clone)]
enum Subscriber {
    Observer(Arc<dyn EngineObserver>),
    Channel(Sender<EngineEvent>),
}

#[derive(Default)]
struct BusState {
    next_id: u64,
    subscribers: Vec<(SubscriptionId, Subscriber)>,
}

/// Fire-and-forget fan-out of engine events to registered subscribers.
///
/// Events reach every subscriber in emission order. Nothing is buffered for
/// late subscribers and a slow or gone subscriber never blocks the engine:
/// channel subscribers whose receiver was dropped are pruned on the next
/// emit. Cloning shares the subscriber list.
#[derive(Clone, Default)]
pub struct NotificationBus {
    state: Arc<RwLock<BusState>>,
}

impl NotificationBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, observer: Arc<dyn EngineObserver>) -> SubscriptionId {
        self.register(Subscriber::Observer(observer))
    }

    /// Subscribe through a channel instead of a callback.
    pub fn subscribe_channel(&self) -> (SubscriptionId, Receiver<EngineEvent>) {
        let (tx, rx) = mpsc::channel();
        (self.register(Subscriber::Channel(tx)), rx)
    }

    /// Returns `false` if `id` was not subscribed.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut state = self.state.write();
        let before = state.subscribers.len();
        state.subscribers.retain(|(sid, _)| *sid != id);
        state.subscribers.len() != before
    }

    pub fn subscriber_count(&self) -> usize {
        self.state.read().subscribers.len()
    }

    pub fn emit(&self, event: EngineEvent) {
        if let EngineEvent::Log { message, severity } = &event {
            log::log!(severity.as_log_level(), "{}", message);
        }

        // Deliver outside the lock so observers may (un)subscribe re-entrantly.
        let subscribers: Vec<(SubscriptionId, Subscriber)> = self.state.read().subscribers.clone();
        let mut gone = Vec::new();
        for (id, subscriber) in &subscribers {
            match subscriber {
                Subscriber::Observer(observer) => observer.on_event(&event),
                Subscriber::Channel(tx) => {
                    if tx.send(event.clone()).is_err() {
                        gone.push(*id);
                    }
                }
            }
        }

        if !gone.is_empty() {
            self.state
                .write()
                .subscribers
                .retain(|(id, _)| !gone.contains(id));
        }
    }

    pub fn log(&self, message: impl Into<String>, severity: Severity) {
        self.emit(EngineEvent::log(message, severity));
    }

    fn register(&self, subscriber: Subscriber) -> SubscriptionId {
        let mut state = self.state.write();
        state.next_id += 1;
        let id = SubscriptionId(state.next_id);
        state.subscribers.push((id, subscriber));
        id
    }
}

use crate::models::events::EngineEvent;

/// Receiver of engine notifications.
///
/// Called synchronously on the thread that drives the engine, in emission
/// order. Implementations should hand the event off rather than block.
pub trait EngineObserver: Send + Sync {
    fn on_event(&self, event: &EngineEvent);
}

use crate::domain::events::{EventListener, LifecycleEvent};
use std::sync::Arc;
use tokio::sync::RwLock;

/// Fan-out of lifecycle events to every subscribed listener
pub struct EventBus {
    listeners: Arc<RwLock<Vec<Arc<dyn EventListener>>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            listeners: Arc::new(RwLock::new(Vec::new())),
        }
    }

    pub async fn subscribe(&self, listener: Arc<dyn EventListener>) {
        self.listeners.write().await.push(listener);
    }

    /// Listeners are called in subscription order on the publishing task.
    pub async fn publish(&self, event: LifecycleEvent) {
        let listeners = self.listeners.read().await;
        for listener in listeners.iter() {
            listener.on_event(&event);
        }
    }

    pub async fn subscriber_count(&self) -> usize {
        self.listeners.read().await.len()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for EventBus {
    fn clone(&self) -> Self {
        Self {
            listeners: Arc::clone(&self.listeners),
        }
    }
}

/// Keeps every event it sees.
#[derive(Default)]
pub struct RecordingListener {
    events: std::sync::Mutex<Vec<LifecycleEvent>>,
}

impl RecordingListener {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<LifecycleEvent> {
        self.events
            .lock()
            .map(|e| e.clone())
            .unwrap_or_default()
    }
}

impl EventListener for RecordingListener {
    fn on_event(&self, event: &LifecycleEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::events::LoggingListener;
    use uuid::Uuid;

    #[tokio::test]
    async fn test_event_bus_subscribe() {
        let bus = EventBus::new();
        assert_eq!(bus.subscriber_count().await, 0);

        bus.subscribe(Arc::new(LoggingListener)).await;
        bus.subscribe(Arc::new(LoggingListener)).await;
        assert_eq!(bus.subscriber_count().await, 2);
    }

    #[tokio::test]
    async fn test_event_bus_publish_reaches_every_listener() {
        let bus = EventBus::new();
        let first = Arc::new(RecordingListener::new());
        let second = Arc::new(RecordingListener::new());
        bus.subscribe(first.clone()).await;
        bus.subscribe(second.clone()).await;

        let model_id = Uuid::new_v4();
        bus.publish(LifecycleEvent::ModelArchived { model_id }).await;

        assert_eq!(first.events(), vec![LifecycleEvent::ModelArchived { model_id }]);
        assert_eq!(second.events().len(), 1);
    }

    #[test]
    fn test_event_bus_clone_shares_listeners() {
        let bus1 = EventBus::new();
        let bus2 = bus1.clone();

        tokio_test::block_on(bus1.subscribe(Arc::new(LoggingListener)));
        assert_eq!(tokio_test::block_on(bus2.subscriber_count()), 1);
    }
}

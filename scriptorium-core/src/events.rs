//! # Event system for Scriptorium
//!
//! The event bus carries the editor's transient notifications (saves,
//! failures, publish transitions, validation problems) to whoever presents
//! them. Handlers subscribe per event type with a priority; events are either
//! dispatched immediately or queued until [`EventBus::process_events`] runs.

use crate::{Error, Result};
use scriptorium_api::{Event, EventHandler, EventType};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, error, warn};
use uuid::Uuid;

/// Central event bus for editor notifications.
///
/// # Example
///
/// ```rust
/// use scriptorium_core::events::EventBus;
/// use scriptorium_api::{Event, EventType};
///
/// # tokio_test::block_on(async {
/// let mut event_bus = EventBus::new();
/// event_bus.initialize().await?;
///
/// let event = Event::new(EventType::PostSaved, "Draft saved");
/// event_bus.emit(event).await?;
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// # });
/// ```
pub struct EventBus {
    /// Event handlers organized by event type
    handlers: Arc<RwLock<HashMap<EventType, Vec<HandlerEntry>>>>,
    /// Events waiting for `process_events`
    event_queue: Arc<Mutex<VecDeque<Event>>>,
    initialized: bool,
    max_queue_size: usize,
    /// Queue events instead of dispatching them on emit
    async_processing: bool,
}

/// Handler entry for the event bus.
/// Does not derive Debug because dyn EventHandler does not implement Debug.
struct HandlerEntry {
    id: Uuid,
    handler: Arc<Mutex<dyn EventHandler>>,
    /// Higher runs first
    priority: i32,
}

impl EventBus {
    /// Create a new queueing event bus.
    pub fn new() -> Self {
        Self {
            handlers: Arc::new(RwLock::new(HashMap::new())),
            event_queue: Arc::new(Mutex::new(VecDeque::new())),
            initialized: false,
            max_queue_size: 1000,
            async_processing: true,
        }
    }

    /// Create an initialized bus that dispatches on emit.
    ///
    /// This is the mode editors use: notices reach handlers as soon as the
    /// save or publish that produced them completes.
    ///
    /// # Example
    ///
    /// ```rust
    /// use scriptorium_core::events::EventBus;
    ///
    /// let bus = EventBus::immediate();
    /// assert!(bus.is_initialized());
    /// ```
    pub fn immediate() -> Self {
        let mut bus = Self::new();
        bus.async_processing = false;
        bus.initialized = true;
        bus
    }

    /// Initialize the event bus.
    ///
    /// # Errors
    ///
    /// Returns an error if initialization fails.
    pub async fn initialize(&mut self) -> Result<()> {
        if self.initialized {
            warn!("Event bus is already initialized");
            return Ok(());
        }

        debug!("Initializing event bus");
        self.initialized = true;
        Ok(())
    }

    /// Shutdown the event bus, dropping all handlers and pending events.
    ///
    /// # Errors
    ///
    /// Returns an error if shutdown fails.
    pub async fn shutdown(&mut self) -> Result<()> {
        if !self.initialized {
            return Ok(());
        }

        debug!("Shutting down event bus");
        self.handlers.write().await.clear();
        self.event_queue.lock().await.clear();

        self.initialized = false;
        debug!("Event bus shutdown completed");
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Subscribe to events of a specific type.
    ///
    /// Returns the subscription id used by [`unsubscribe`](Self::unsubscribe).
    ///
    /// # Example
    ///
    /// ```rust
    /// use scriptorium_core::events::EventBus;
    /// use scriptorium_api::{EventType, EventHandler, Event};
    /// use std::sync::Arc;
    /// use tokio::sync::Mutex;
    ///
    /// struct Toaster;
    /// impl EventHandler for Toaster {
    ///     fn handle(&mut self, event: &Event) -> anyhow::Result<()> {
    ///         println!("{}", event.data());
    ///         Ok(())
    ///     }
    /// }
    ///
    /// # tokio_test::block_on(async {
    /// let bus = EventBus::immediate();
    /// let handler = Arc::new(Mutex::new(Toaster));
    /// let id = bus.subscribe(EventType::SaveFailed, handler, 0).await?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// # });
    /// ```
    pub async fn subscribe(
        &self,
        event_type: EventType,
        handler: Arc<Mutex<dyn EventHandler>>,
        priority: i32,
    ) -> Result<Uuid> {
        if !self.initialized {
            return Err(Error::generic("Event bus not initialized"));
        }

        let id = Uuid::new_v4();
        let entry = HandlerEntry {
            id,
            handler,
            priority,
        };

        let mut handlers = self.handlers.write().await;
        let type_handlers = handlers.entry(event_type).or_default();
        type_handlers.push(entry);
        type_handlers.sort_by(|a, b| b.priority.cmp(&a.priority));

        debug!(
            "Subscribed handler {:?} to {:?} events with priority {}",
            id, event_type, priority
        );
        Ok(id)
    }

    /// Subscribe one handler to every event type.
    ///
    /// All entries share the returned subscription id.
    pub async fn subscribe_all(
        &self,
        handler: Arc<Mutex<dyn EventHandler>>,
        priority: i32,
    ) -> Result<Uuid> {
        if !self.initialized {
            return Err(Error::generic("Event bus not initialized"));
        }

        let id = Uuid::new_v4();
        let mut handlers = self.handlers.write().await;
        for event_type in EventType::all() {
            let type_handlers = handlers.entry(event_type).or_default();
            type_handlers.push(HandlerEntry {
                id,
                handler: Arc::clone(&handler),
                priority,
            });
            type_handlers.sort_by(|a, b| b.priority.cmp(&a.priority));
        }

        debug!("Subscribed handler {:?} to all events", id);
        Ok(id)
    }

    /// Remove every handler registered under `subscription_id`.
    pub async fn unsubscribe(&self, subscription_id: Uuid) -> Result<()> {
        let mut handlers = self.handlers.write().await;

        for type_handlers in handlers.values_mut() {
            type_handlers.retain(|entry| entry.id != subscription_id);
        }

        debug!("Unsubscribed handler {:?}", subscription_id);
        Ok(())
    }

    /// Emit an event to all subscribers.
    ///
    /// # Errors
    ///
    /// Returns an error if the bus is not initialized.
    pub async fn emit(&self, event: Event) -> Result<()> {
        if !self.initialized {
            return Err(Error::generic("Event bus not initialized"));
        }

        if self.async_processing {
            self.queue_event(event).await
        } else {
            self.process_event_immediately(event).await
        }
    }

    /// Dispatch all queued events.
    pub async fn process_events(&self) -> Result<()> {
        if !self.initialized {
            return Ok(());
        }

        let mut processed_count = 0;

        loop {
            let event = {
                let mut queue = self.event_queue.lock().await;
                queue.pop_front()
            };

            match event {
                Some(event) => {
                    if let Err(e) = self.process_event_immediately(event).await {
                        error!("Event processing error: {}", e);
                    }
                    processed_count += 1;
                }
                None => break,
            }
        }

        if processed_count > 0 {
            debug!("Processed {} events", processed_count);
        }

        Ok(())
    }

    /// Number of events waiting to be processed.
    pub async fn queue_size(&self) -> usize {
        self.event_queue.lock().await.len()
    }

    /// Number of handlers registered for an event type.
    pub async fn handler_count(&self, event_type: EventType) -> usize {
        let handlers = self.handlers.read().await;
        handlers.get(&event_type).map_or(0, |h| h.len())
    }

    pub fn set_max_queue_size(&mut self, max_size: usize) {
        self.max_queue_size = max_size;
    }

    pub fn set_async_processing(&mut self, async_mode: bool) {
        self.async_processing = async_mode;
    }

    async fn queue_event(&self, event: Event) -> Result<()> {
        let mut queue = self.event_queue.lock().await;

        if queue.len() >= self.max_queue_size {
            warn!("Event queue is full, dropping oldest event");
            queue.pop_front();
        }

        debug!("Queued event: {:?}", event.event_type());
        queue.push_back(event);
        Ok(())
    }

    async fn process_event_immediately(&self, event: Event) -> Result<()> {
        let handlers = self.handlers.read().await;

        if let Some(type_handlers) = handlers.get(&event.event_type()) {
            debug!(
                "Processing {:?} event for {} handlers",
                event.event_type(),
                type_handlers.len()
            );

            for handler_entry in type_handlers {
                let mut handler = handler_entry.handler.lock().await;
                if let Err(e) = handler.handle(&event) {
                    error!(
                        "Handler {:?} failed to process {:?} event: {}",
                        handler_entry.id,
                        event.event_type(),
                        e
                    );
                }
            }
        }

        Ok(())
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Handler that records every event it sees.
///
/// Front ends drain it to show notices; tests use it to assert on what an
/// editor reported.
///
/// # Example
///
/// ```rust
/// use scriptorium_core::events::{EventBus, EventLog};
/// use scriptorium_api::{Event, EventType};
///
/// # tokio_test::block_on(async {
/// let bus = EventBus::immediate();
/// let log = EventLog::new();
/// bus.subscribe_all(log.handler(), 0).await?;
///
/// bus.emit(Event::new(EventType::SaveFailed, "Save failed: offline")).await?;
/// assert_eq!(log.messages(EventType::SaveFailed), vec!["Save failed: offline"]);
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// # });
/// ```
#[derive(Debug, Clone, Default)]
pub struct EventLog {
    events: Arc<std::sync::Mutex<Vec<Event>>>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// A handler feeding this log, ready to subscribe.
    pub fn handler(&self) -> Arc<Mutex<dyn EventHandler>> {
        Arc::new(Mutex::new(self.clone()))
    }

    /// Snapshot of all recorded events, oldest first.
    pub fn events(&self) -> Vec<Event> {
        match self.events.lock() {
            Ok(events) => events.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Recorded events of one type.
    pub fn of_type(&self, event_type: EventType) -> Vec<Event> {
        self.events()
            .into_iter()
            .filter(|e| e.event_type() == event_type)
            .collect()
    }

    /// Messages of the recorded events of one type.
    pub fn messages(&self, event_type: EventType) -> Vec<String> {
        self.of_type(event_type)
            .into_iter()
            .map(|e| e.data().to_string())
            .collect()
    }

    pub fn count(&self, event_type: EventType) -> usize {
        self.of_type(event_type).len()
    }

    /// Remove and return everything recorded so far.
    pub fn drain(&self) -> Vec<Event> {
        match self.events.lock() {
            Ok(mut events) => std::mem::take(&mut *events),
            Err(poisoned) => std::mem::take(&mut *poisoned.into_inner()),
        }
    }
}

impl EventHandler for EventLog {
    fn handle(&mut self, event: &Event) -> anyhow::Result<()> {
        self.events
            .lock()
            .map_err(|_| anyhow::anyhow!("event log poisoned"))?
            .push(event.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct TestHandler {
        call_count: Arc<AtomicUsize>,
    }

    impl TestHandler {
        fn new(call_count: Arc<AtomicUsize>) -> Self {
            Self { call_count }
        }
    }

    impl EventHandler for TestHandler {
        fn handle(&mut self, _event: &Event) -> anyhow::Result<()> {
            self.call_count.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_event_bus_creation() {
        let event_bus = EventBus::new();
        assert!(!event_bus.initialized);
        assert_eq!(event_bus.max_queue_size, 1000);
        assert!(event_bus.async_processing);

        let immediate = EventBus::immediate();
        assert!(immediate.initialized);
        assert!(!immediate.async_processing);
    }

    #[tokio::test]
    async fn test_subscribe_requires_initialization() {
        let event_bus = EventBus::new();
        let call_count = Arc::new(AtomicUsize::new(0));
        let handler = Arc::new(Mutex::new(TestHandler::new(call_count)));

        assert!(event_bus
            .subscribe(EventType::PostSaved, handler, 0)
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_queued_emission() {
        let mut event_bus = EventBus::new();
        event_bus.initialize().await.unwrap();

        let call_count = Arc::new(AtomicUsize::new(0));
        let handler = Arc::new(Mutex::new(TestHandler::new(Arc::clone(&call_count))));
        event_bus
            .subscribe(EventType::PostSaved, handler, 0)
            .await
            .unwrap();

        event_bus
            .emit(Event::new(EventType::PostSaved, "saved"))
            .await
            .unwrap();
        assert_eq!(call_count.load(Ordering::SeqCst), 0);
        assert_eq!(event_bus.queue_size().await, 1);

        event_bus.process_events().await.unwrap();
        assert_eq!(call_count.load(Ordering::SeqCst), 1);
        assert_eq!(event_bus.queue_size().await, 0);
    }

    #[tokio::test]
    async fn test_immediate_emission() {
        let event_bus = EventBus::immediate();
        let call_count = Arc::new(AtomicUsize::new(0));
        let handler = Arc::new(Mutex::new(TestHandler::new(Arc::clone(&call_count))));
        event_bus
            .subscribe(EventType::SaveFailed, handler, 0)
            .await
            .unwrap();

        event_bus
            .emit(Event::new(EventType::SaveFailed, "offline"))
            .await
            .unwrap();
        event_bus
            .emit(Event::new(EventType::PostSaved, "ignored"))
            .await
            .unwrap();

        assert_eq!(call_count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_event_unsubscription() {
        let event_bus = EventBus::immediate();
        let log = EventLog::new();

        let id = event_bus.subscribe_all(log.handler(), 0).await.unwrap();
        assert_eq!(event_bus.handler_count(EventType::PostPublished).await, 1);

        event_bus.unsubscribe(id).await.unwrap();
        assert_eq!(event_bus.handler_count(EventType::PostPublished).await, 0);
    }

    #[tokio::test]
    async fn test_handler_priority() {
        let event_bus = EventBus::immediate();
        let call_order = Arc::new(std::sync::Mutex::new(Vec::new()));

        for (label, priority) in [(1, 0), (2, 10), (3, 5)] {
            let call_order = Arc::clone(&call_order);
            let handler = Arc::new(Mutex::new(move |_: &Event| -> anyhow::Result<()> {
                call_order.lock().unwrap().push(label);
                Ok(())
            }));
            event_bus
                .subscribe(EventType::PostPublished, handler, priority)
                .await
                .unwrap();
        }

        event_bus
            .emit(Event::new(EventType::PostPublished, "Post published successfully!"))
            .await
            .unwrap();

        assert_eq!(*call_order.lock().unwrap(), vec![2, 3, 1]);
    }

    #[tokio::test]
    async fn test_failing_handler_does_not_stop_others() {
        let event_bus = EventBus::immediate();
        let failing = Arc::new(Mutex::new(|_: &Event| -> anyhow::Result<()> {
            anyhow::bail!("toast surface unavailable")
        }));
        event_bus
            .subscribe(EventType::SaveFailed, failing, 10)
            .await
            .unwrap();

        let log = EventLog::new();
        event_bus
            .subscribe(EventType::SaveFailed, log.handler(), 0)
            .await
            .unwrap();

        event_bus
            .emit(Event::new(EventType::SaveFailed, "Save failed: offline"))
            .await
            .unwrap();
        assert_eq!(log.count(EventType::SaveFailed), 1);
    }

    #[tokio::test]
    async fn test_event_bus_shutdown() {
        let mut event_bus = EventBus::new();
        event_bus.initialize().await.unwrap();

        let log = EventLog::new();
        event_bus
            .subscribe(EventType::PostSaved, log.handler(), 0)
            .await
            .unwrap();

        assert!(event_bus.shutdown().await.is_ok());
        assert!(!event_bus.initialized);
        assert_eq!(event_bus.handler_count(EventType::PostSaved).await, 0);
        assert!(event_bus
            .emit(Event::new(EventType::PostSaved, ""))
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_max_queue_size() {
        let mut event_bus = EventBus::new();
        event_bus.set_max_queue_size(2);
        event_bus.initialize().await.unwrap();

        for label in ["1", "2", "3"] {
            event_bus
                .queue_event(Event::new(EventType::ContentChanged, label))
                .await
                .unwrap();
        }
        assert_eq!(event_bus.queue_size().await, 2);
    }

    #[tokio::test]
    async fn test_event_log_drain() {
        let event_bus = EventBus::immediate();
        let log = EventLog::new();
        event_bus.subscribe_all(log.handler(), 0).await.unwrap();

        event_bus
            .emit(Event::new(EventType::TitleChanged, "a"))
            .await
            .unwrap();
        event_bus
            .emit(Event::new(EventType::PostDeleted, "b"))
            .await
            .unwrap();

        assert_eq!(log.events().len(), 2);
        assert_eq!(log.drain().len(), 2);
        assert!(log.events().is_empty());
    }
}

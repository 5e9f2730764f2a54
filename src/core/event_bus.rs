//! Typed pub/sub event bus shared by the widgets of one page.
//!
//! - Subscribers register per event type and are called synchronously on emit
//! - Every emitted event is also queued for deferred `poll()` by the host loop
//!
//! Callback order: FIFO within one event type. No ordering across types.
//!
//! Widgets do not inherit emitter behaviour; each one is handed an
//! [`EventEmitter`] (or a [`WidgetEmitter`]) at construction.

use log::{trace, warn};
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

/// Maximum events in queue before oldest are evicted
const MAX_QUEUE_SIZE: usize = 1000;

/// Marker trait for events. Events must be Send + Sync + 'static.
pub trait Event: Any + Send + Sync + 'static {
    fn as_any(&self) -> &dyn Any;
    fn type_name(&self) -> &'static str;
}

impl<T: Any + Send + Sync + 'static> Event for T {
    fn as_any(&self) -> &dyn Any {
        self
    }
    fn type_name(&self) -> &'static str {
        std::any::type_name::<T>()
    }
}

type Callback = Arc<dyn Fn(&dyn Any) + Send + Sync>;
type Subscribers = Arc<RwLock<HashMap<TypeId, Vec<Callback>>>>;
type Queue = Arc<Mutex<Vec<BoxedEvent>>>;

/// Boxed event for queue storage
pub type BoxedEvent = Box<dyn Event>;

/// Pub/sub bus with deferred queue.
#[derive(Clone)]
pub struct EventBus {
    subscribers: Subscribers,
    queue: Queue,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            subscribers: Arc::new(RwLock::new(HashMap::new())),
            queue: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Subscribe to events of type E.
    ///
    /// The callback runs on the emitting thread, inside `emit()`. Widgets
    /// that must not be re-entered forward the event into their own inbox:
    /// ```ignore
    /// let tx = inbox_tx.clone();
    /// bus.subscribe::<SelectedPartEvent, _>(move |e| {
    ///     let _ = tx.send(Message::Upstream(Upstream::Selected(e.0.clone())));
    /// });
    /// ```
    pub fn subscribe<E, F>(&self, callback: F)
    where
        E: Event,
        F: Fn(&E) + Send + Sync + 'static,
    {
        let wrapped: Callback = Arc::new(move |any: &dyn Any| {
            if let Some(event) = any.downcast_ref::<E>() {
                callback(event);
            }
        });
        self.subscribers
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .entry(TypeId::of::<E>())
            .or_default()
            .push(wrapped);
    }

    /// Invoke subscribers immediately, then queue for `poll()`.
    pub fn emit<E: Event + Clone>(&self, event: E) {
        dispatch(&self.subscribers, &self.queue, event);
    }

    /// Drain every event emitted since the last poll.
    pub fn poll(&self) -> Vec<BoxedEvent> {
        std::mem::take(&mut *self.queue.lock().unwrap_or_else(|e| e.into_inner()))
    }

    /// Emitter handle for widgets
    pub fn emitter(&self) -> EventEmitter {
        EventEmitter {
            subscribers: Arc::clone(&self.subscribers),
            queue: Arc::clone(&self.queue),
        }
    }

    /// Remove every subscriber of type E
    pub fn unsubscribe_all<E: Event>(&self) {
        self.subscribers
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&TypeId::of::<E>());
    }

    pub fn has_subscribers<E: Event>(&self) -> bool {
        self.subscribers
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(&TypeId::of::<E>())
            .is_some_and(|v| !v.is_empty())
    }

    pub fn queue_len(&self) -> usize {
        self.queue.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

fn dispatch<E: Event + Clone>(subscribers: &Subscribers, queue: &Queue, event: E) {
    // Clone the callback list so a subscriber may subscribe/emit without deadlocking
    let callbacks: Vec<Callback> = subscribers
        .read()
        .unwrap_or_else(|e| e.into_inner())
        .get(&TypeId::of::<E>())
        .cloned()
        .unwrap_or_default();
    trace!("Emit {} to {} subscriber(s)", event.type_name(), callbacks.len());
    for cb in &callbacks {
        cb(&event);
    }

    let mut queue = queue.lock().unwrap_or_else(|e| e.into_inner());
    if queue.len() >= MAX_QUEUE_SIZE {
        let evict_count = queue.len() / 2;
        warn!("EventBus queue full ({} events), evicting oldest {}", queue.len(), evict_count);
        queue.drain(0..evict_count);
    }
    queue.push(Box::new(event));
}

/// Cloneable emit-only handle.
#[derive(Clone)]
pub struct EventEmitter {
    subscribers: Subscribers,
    queue: Queue,
}

impl std::fmt::Debug for EventEmitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventEmitter")
            .field("subscriber_types", &self.subscribers.read().map(|s| s.len()).unwrap_or(0))
            .field("queue_len", &self.queue.lock().map(|q| q.len()).unwrap_or(0))
            .finish()
    }
}

impl EventEmitter {
    pub fn emit<E: Event + Clone>(&self, event: E) {
        dispatch(&self.subscribers, &self.queue, event);
    }
}

/// Optional emitter held by a widget (no-op until wired to a bus)
#[derive(Clone, Default, Debug)]
pub struct WidgetEmitter {
    inner: Option<EventEmitter>,
}

impl WidgetEmitter {
    /// No-op emitter
    pub fn dummy() -> Self {
        Self { inner: None }
    }

    pub fn from_emitter(emitter: EventEmitter) -> Self {
        Self { inner: Some(emitter) }
    }

    pub fn emit<E: Event + Clone>(&self, event: E) {
        if let Some(ref emitter) = self.inner {
            emitter.emit(event);
        }
    }
}

/// Downcast a polled event to a concrete type.
///
/// Derefs to `dyn Event` first: calling `as_any()` on the `Box` itself would
/// hit the blanket impl for `Box<dyn Event>` and never match.
#[inline]
pub fn downcast_event<E: Event>(event: &BoxedEvent) -> Option<&E> {
    (**event).as_any().downcast_ref::<E>()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[derive(Clone, Debug)]
    struct FrameShown {
        position: u32,
    }

    #[derive(Clone, Debug)]
    struct PartPicked(String);

    #[test]
    fn test_subscribe_emit_immediate() {
        let bus = EventBus::new();
        let sum = Arc::new(AtomicU32::new(0));
        let s = Arc::clone(&sum);
        bus.subscribe::<FrameShown, _>(move |e| {
            s.fetch_add(e.position, Ordering::SeqCst);
        });

        bus.emit(FrameShown { position: 10 });
        assert_eq!(sum.load(Ordering::SeqCst), 10);
        bus.emit(FrameShown { position: 5 });
        assert_eq!(sum.load(Ordering::SeqCst), 15);
        // Other types don't reach the subscriber
        bus.emit(PartPicked("sole".into()));
        assert_eq!(sum.load(Ordering::SeqCst), 15);
    }

    #[test]
    fn test_poll_and_downcast() {
        let bus = EventBus::new();
        bus.emit(FrameShown { position: 3 });
        bus.emit(PartPicked("laces".into()));

        let events = bus.poll();
        assert_eq!(events.len(), 2);
        assert_eq!(downcast_event::<FrameShown>(&events[0]).map(|e| e.position), Some(3));
        assert!(downcast_event::<FrameShown>(&events[1]).is_none());
        assert_eq!(downcast_event::<PartPicked>(&events[1]).map(|e| e.0.as_str()), Some("laces"));
        assert!(events[1].type_name().ends_with("PartPicked"));
        assert_eq!(bus.poll().len(), 0);
    }

    #[test]
    fn test_emitter_handles() {
        let bus = EventBus::new();
        let count = Arc::new(AtomicU32::new(0));
        let c = Arc::clone(&count);
        bus.subscribe::<PartPicked, _>(move |_| {
            c.fetch_add(1, Ordering::SeqCst);
        });
        assert!(bus.has_subscribers::<PartPicked>());

        WidgetEmitter::from_emitter(bus.emitter()).emit(PartPicked("front".into()));
        WidgetEmitter::dummy().emit(PartPicked("front".into()));
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(bus.queue_len(), 1);

        bus.unsubscribe_all::<PartPicked>();
        bus.emitter().emit(PartPicked("front".into()));
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(bus.queue_len(), 2);
    }

    #[test]
    fn test_subscriber_may_emit() {
        let bus = EventBus::new();
        let inner = bus.clone();
        bus.subscribe::<PartPicked, _>(move |e| {
            inner.emit(FrameShown { position: e.0.len() as u32 });
        });
        bus.emit(PartPicked("sole".into()));
        assert_eq!(bus.poll().len(), 2);
    }

    #[test]
    fn test_queue_eviction() {
        let bus = EventBus::new();
        for i in 0..(MAX_QUEUE_SIZE as u32 + 1) {
            bus.emit(FrameShown { position: i });
        }
        assert_eq!(bus.queue_len(), MAX_QUEUE_SIZE / 2 + 1);
    }
}

//! Subscription manager (C7): per-entity event sinks with first/last
//! subscriber lifecycle callbacks.
//!
//! The source used a descriptor (`Event`) that lazily attached an
//! `EventInstance` to whichever instance read it through attribute
//! access. That's a source-language packaging trick; here an
//! `EventInstance` is just a field the owning domain object constructs
//! directly, wiring its subscribe/unsubscribe callbacks at construction
//! time instead of through reflection.

use std::sync::{Arc, Mutex, Weak};

use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

use crate::error::ClientError;

pub type Handler<T> = dyn Fn(&T) + Send + Sync;

enum HandlerSlot<T> {
    Strong(Arc<Handler<T>>),
    Weak(Weak<Handler<T>>),
    Stream(mpsc::UnboundedSender<T>),
}

impl<T> Clone for HandlerSlot<T> {
    fn clone(&self) -> Self {
        match self {
            HandlerSlot::Strong(h) => HandlerSlot::Strong(h.clone()),
            HandlerSlot::Weak(w) => HandlerSlot::Weak(w.clone()),
            HandlerSlot::Stream(tx) => HandlerSlot::Stream(tx.clone()),
        }
    }
}

impl<T> HandlerSlot<T> {
    fn is_alive(&self) -> bool {
        match self {
            HandlerSlot::Strong(_) => true,
            HandlerSlot::Weak(w) => w.upgrade().is_some(),
            HandlerSlot::Stream(tx) => !tx.is_closed(),
        }
    }

    fn ptr_eq_strong(&self, target: &Arc<Handler<T>>) -> bool {
        match self {
            HandlerSlot::Strong(h) => Arc::ptr_eq(h, target),
            HandlerSlot::Weak(w) => w.upgrade().map(|h| Arc::ptr_eq(&h, target)).unwrap_or(false),
            HandlerSlot::Stream(_) => false,
        }
    }

    fn invoke(&self, value: &T)
    where
        T: Clone,
    {
        match self {
            HandlerSlot::Strong(h) => h(value),
            HandlerSlot::Weak(w) => {
                if let Some(h) = w.upgrade() {
                    h(value)
                }
            }
            HandlerSlot::Stream(tx) => {
                let _ = tx.send(value.clone());
            }
        }
    }
}

/// One event sink: handlers attached to a single owner for a single
/// event type.
pub struct EventInstance<T> {
    handlers: Mutex<Vec<HandlerSlot<T>>>,
    on_subscribe: Option<Arc<dyn Fn() + Send + Sync>>,
    on_unsubscribe: Option<Arc<dyn Fn() + Send + Sync>>,
}

impl<T> EventInstance<T> {
    pub fn new(
        on_subscribe: Option<Arc<dyn Fn() + Send + Sync>>,
        on_unsubscribe: Option<Arc<dyn Fn() + Send + Sync>>,
    ) -> Self {
        Self {
            handlers: Mutex::new(Vec::new()),
            on_subscribe,
            on_unsubscribe,
        }
    }

    /// Drop dead weak/stream handlers and fire `on_unsubscribe` if that
    /// emptied the sink.
    fn prune(&self) {
        let mut guard = self.handlers.lock().unwrap();
        let had_handlers = !guard.is_empty();
        guard.retain(|slot| slot.is_alive());
        let now_empty = guard.is_empty();
        drop(guard);

        if had_handlers && now_empty {
            if let Some(cb) = &self.on_unsubscribe {
                cb();
            }
        }
    }

    pub fn has_subscribers(&self) -> bool {
        self.prune();
        !self.handlers.lock().unwrap().is_empty()
    }

    fn add(&self, slot: HandlerSlot<T>) {
        let mut guard = self.handlers.lock().unwrap();
        let had_handlers = !guard.is_empty();
        guard.push(slot);
        drop(guard);

        if !had_handlers {
            if let Some(cb) = &self.on_subscribe {
                cb();
            }
        }
    }

    pub fn add_strong(&self, handler: Arc<Handler<T>>) {
        self.add(HandlerSlot::Strong(handler));
    }

    pub fn add_weak(&self, handler: Weak<Handler<T>>) {
        self.add(HandlerSlot::Weak(handler));
    }

    /// Remove a previously-added strong or weak handler by identity.
    /// Fails with `NotSubscribed` if it isn't present.
    pub fn remove(&self, handler: &Arc<Handler<T>>) -> Result<(), ClientError> {
        let mut guard = self.handlers.lock().unwrap();
        let had_handlers = !guard.is_empty();
        let position = guard.iter().position(|slot| slot.ptr_eq_strong(handler));
        let Some(position) = position else {
            return Err(ClientError::NotSubscribed);
        };
        guard.remove(position);
        let now_empty = guard.is_empty();
        drop(guard);

        if had_handlers && now_empty {
            if let Some(cb) = &self.on_unsubscribe {
                cb();
            }
        }
        Ok(())
    }

    /// Subscribe an async stream of emitted values. Dropping the stream
    /// drops the receiver, which the next `emit` or `has_subscribers`
    /// call will notice and prune like a dead weak handler.
    pub fn subscribe_stream(&self) -> UnboundedReceiverStream<T> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.add(HandlerSlot::Stream(tx));
        UnboundedReceiverStream::new(rx)
    }

    /// Dispatch `value` to every live handler, in subscription order.
    pub fn emit(&self, value: &T)
    where
        T: Clone,
    {
        self.prune();
        let snapshot: Vec<HandlerSlot<T>> = self.handlers.lock().unwrap().clone();
        for slot in &snapshot {
            slot.invoke(value);
        }
    }

    /// Re-invoke the first-subscriber callback without an intervening
    /// unsubscribe, for a subscription whose parameters changed (e.g. a
    /// market depth request's row count) and whose wire stream must be
    /// reconfigured in place.
    pub fn reconfigure(&self) {
        if let Some(cb) = &self.on_subscribe {
            cb();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio_stream::StreamExt;

    #[test]
    fn first_subscriber_fires_on_subscribe_once() {
        let subscribes = Arc::new(AtomicUsize::new(0));
        let s = subscribes.clone();
        let event: EventInstance<i32> = EventInstance::new(
            Some(Arc::new(move || {
                s.fetch_add(1, Ordering::SeqCst);
            })),
            None,
        );

        let h1: Arc<Handler<i32>> = Arc::new(|_: &i32| {});
        let h2: Arc<Handler<i32>> = Arc::new(|_: &i32| {});
        event.add_strong(h1);
        event.add_strong(h2);

        assert_eq!(subscribes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn last_subscriber_fires_on_unsubscribe() {
        let unsubscribes = Arc::new(AtomicUsize::new(0));
        let u = unsubscribes.clone();
        let event: EventInstance<i32> = EventInstance::new(
            None,
            Some(Arc::new(move || {
                u.fetch_add(1, Ordering::SeqCst);
            })),
        );

        let h1: Arc<Handler<i32>> = Arc::new(|_: &i32| {});
        event.add_strong(h1.clone());
        event.remove(&h1).unwrap();

        assert_eq!(unsubscribes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn removing_absent_handler_fails() {
        let event: EventInstance<i32> = EventInstance::new(None, None);
        let h: Arc<Handler<i32>> = Arc::new(|_: &i32| {});
        assert!(matches!(event.remove(&h), Err(ClientError::NotSubscribed)));
    }

    #[test]
    fn emit_calls_every_live_handler() {
        let total = Arc::new(AtomicUsize::new(0));
        let event: EventInstance<i32> = EventInstance::new(None, None);

        let t1 = total.clone();
        let h1: Arc<Handler<i32>> = Arc::new(move |v: &i32| {
            t1.fetch_add(*v as usize, Ordering::SeqCst);
        });
        let t2 = total.clone();
        let h2: Arc<Handler<i32>> = Arc::new(move |v: &i32| {
            t2.fetch_add(*v as usize, Ordering::SeqCst);
        });
        event.add_strong(h1);
        event.add_strong(h2);

        event.emit(&5);
        assert_eq!(total.load(Ordering::SeqCst), 10);
    }

    #[test]
    fn weak_handler_drops_silently_and_triggers_last_unsubscribe() {
        let unsubscribes = Arc::new(AtomicUsize::new(0));
        let u = unsubscribes.clone();
        let event: EventInstance<i32> = EventInstance::new(
            None,
            Some(Arc::new(move || {
                u.fetch_add(1, Ordering::SeqCst);
            })),
        );

        let owner: Arc<Handler<i32>> = Arc::new(|_: &i32| {});
        event.add_weak(Arc::downgrade(&owner));
        assert!(event.has_subscribers());

        drop(owner);
        assert!(!event.has_subscribers());
        assert_eq!(unsubscribes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn stream_subscription_receives_emitted_values() {
        let event: EventInstance<i32> = EventInstance::new(None, None);
        let mut stream = event.subscribe_stream();
        event.emit(&7);
        let received = stream.next().await;
        assert_eq!(received, Some(7));
    }
}

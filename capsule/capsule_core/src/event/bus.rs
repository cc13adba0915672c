//! Synchronous, type-keyed publish/subscribe dispatcher.
//!
//! Events are dispatched on the posting thread, in subscription order, to
//! every handler registered for the event's exact type. Nothing is queued:
//! when `post` returns, every matching handler has run.

use crate::id::SubscriptionId;
use log::{debug, error, trace};
use parking_lot::{ReentrantMutex, RwLock};
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// How the bus may invoke a handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// One invocation at a time. Re-entrant posts from inside the handler
    /// on the same thread are still delivered.
    Serial,

    /// The handler may run on several threads at once and guards its own state.
    Concurrent,
}

type ErasedHandler = Box<dyn Fn(&dyn Any) + Send + Sync>;
type ErasedFilter = Box<dyn Fn(&dyn Any) -> bool + Send + Sync>;

struct Subscriber {
    id: SubscriptionId,
    name: String,
    delivery: Delivery,
    live: AtomicBool,
    serial: ReentrantMutex<()>,
    filter: ErasedFilter,
    handler: ErasedHandler,
}

impl Subscriber {
    fn deliver(&self, event: &dyn Any) {
        // Unsubscribed after the snapshot was taken.
        if !self.live.load(Ordering::Acquire) {
            return;
        }
        // Rejected events never wait for the serial lock.
        if !(self.filter)(event) {
            return;
        }

        match self.delivery {
            Delivery::Serial => {
                let _guard = self.serial.lock();
                if self.live.load(Ordering::Acquire) {
                    self.invoke(event);
                }
            }
            Delivery::Concurrent => self.invoke(event),
        }
    }

    fn invoke(&self, event: &dyn Any) {
        if catch_unwind(AssertUnwindSafe(|| (self.handler)(event))).is_err() {
            error!("Event handler '{}' ({}) panicked", self.name, self.id);
        }
    }
}

/// In-process event bus.
#[derive(Default)]
pub struct EventBus {
    subscribers: RwLock<HashMap<TypeId, Vec<Arc<Subscriber>>>>,
}

impl EventBus {
    /// Create an empty bus.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for every event of type `E`.
    ///
    /// # Arguments
    ///
    /// * `name` - Diagnostic name used in log output.
    /// * `delivery` - Whether the handler tolerates concurrent invocation.
    /// * `handler` - Callback receiving each posted event.
    ///
    /// # Returns
    ///
    /// The handle to pass to [`unsubscribe`](Self::unsubscribe).
    pub fn subscribe<E, F>(
        &self,
        name: impl Into<String>,
        delivery: Delivery,
        handler: F,
    ) -> SubscriptionId
    where
        E: Any + Send + Sync,
        F: Fn(&E) + Send + Sync + 'static,
    {
        self.subscribe_filtered(name, delivery, |_: &E| true, handler)
    }

    /// Register `handler` for the events of type `E` accepted by `filter`.
    ///
    /// The filter runs on the posting thread before delivery, so a `Serial`
    /// handler is only locked for events it actually handles. It must not
    /// block.
    pub fn subscribe_filtered<E, P, F>(
        &self,
        name: impl Into<String>,
        delivery: Delivery,
        filter: P,
        handler: F,
    ) -> SubscriptionId
    where
        E: Any + Send + Sync,
        P: Fn(&E) -> bool + Send + Sync + 'static,
        F: Fn(&E) + Send + Sync + 'static,
    {
        let subscriber = Arc::new(Subscriber {
            id: SubscriptionId::new(),
            name: name.into(),
            delivery,
            live: AtomicBool::new(true),
            serial: ReentrantMutex::new(()),
            filter: Box::new(move |event: &dyn Any| {
                event.downcast_ref::<E>().is_some_and(|event| filter(event))
            }),
            handler: Box::new(move |event: &dyn Any| {
                if let Some(event) = event.downcast_ref::<E>() {
                    handler(event);
                }
            }),
        });
        let id = subscriber.id;

        debug!(
            "Subscribing '{}' ({}) to {}",
            subscriber.name,
            id,
            std::any::type_name::<E>()
        );
        self.subscribers
            .write()
            .entry(TypeId::of::<E>())
            .or_default()
            .push(subscriber);

        id
    }

    /// Remove a subscription.
    ///
    /// Returns `false` if the handle is unknown or was already removed.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subscribers = self.subscribers.write();
        for list in subscribers.values_mut() {
            if let Some(pos) = list.iter().position(|s| s.id == id) {
                let removed = list.remove(pos);
                removed.live.store(false, Ordering::Release);
                debug!("Unsubscribed '{}' ({})", removed.name, id);
                return true;
            }
        }
        false
    }

    /// Dispatch `event` to every handler subscribed to its type.
    pub fn post<E>(&self, event: E)
    where
        E: Any + Send + Sync,
    {
        // The lock is not held during dispatch so handlers may subscribe,
        // unsubscribe and post freely.
        let targets = self
            .subscribers
            .read()
            .get(&TypeId::of::<E>())
            .cloned()
            .unwrap_or_default();

        trace!(
            "Posting {} to {} handler(s)",
            std::any::type_name::<E>(),
            targets.len()
        );
        for subscriber in targets {
            subscriber.deliver(&event);
        }
    }

    /// Number of live subscriptions for events of type `E`.
    pub fn subscription_count<E: Any>(&self) -> usize {
        self.subscribers
            .read()
            .get(&TypeId::of::<E>())
            .map_or(0, Vec::len)
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let subscribers = self.subscribers.read();
        f.debug_struct("EventBus")
            .field("event_types", &subscribers.len())
            .field(
                "subscriptions",
                &subscribers.values().map(Vec::len).sum::<usize>(),
            )
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::atomic::AtomicUsize;
    use std::thread;

    #[derive(Debug)]
    struct Ping(u32);

    #[derive(Debug)]
    struct Pong;

    #[test]
    fn test_post_reaches_only_matching_type() {
        let bus = EventBus::new();
        let pings = Arc::new(AtomicUsize::new(0));
        let pongs = Arc::new(AtomicUsize::new(0));

        let counter = pings.clone();
        bus.subscribe::<Ping, _>("pings", Delivery::Concurrent, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        let counter = pongs.clone();
        bus.subscribe::<Pong, _>("pongs", Delivery::Concurrent, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        bus.post(Ping(1));
        bus.post(Ping(2));
        bus.post(Pong);

        assert_eq!(pings.load(Ordering::SeqCst), 2);
        assert_eq!(pongs.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_handler_observes_post_order() {
        let bus = EventBus::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let sink = seen.clone();
        bus.subscribe::<Ping, _>("order", Delivery::Serial, move |ping| {
            sink.lock().push(ping.0);
        });

        for i in 0..5 {
            bus.post(Ping(i));
        }
        assert_eq!(*seen.lock(), vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_unsubscribe() {
        let bus = EventBus::new();
        let count = Arc::new(AtomicUsize::new(0));

        let counter = count.clone();
        let id = bus.subscribe::<Ping, _>("once", Delivery::Serial, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(bus.subscription_count::<Ping>(), 1);

        bus.post(Ping(0));
        assert!(bus.unsubscribe(id));
        assert!(!bus.unsubscribe(id));
        bus.post(Ping(1));

        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(bus.subscription_count::<Ping>(), 0);
    }

    #[test]
    fn test_unsubscribe_during_dispatch_skips_later_handler() {
        let bus = Arc::new(EventBus::new());
        let late_calls = Arc::new(AtomicUsize::new(0));
        let late_id = Arc::new(Mutex::new(None));

        let remover_bus = bus.clone();
        let target = late_id.clone();
        bus.subscribe::<Ping, _>("remover", Delivery::Serial, move |_| {
            if let Some(id) = *target.lock() {
                remover_bus.unsubscribe(id);
            }
        });
        let counter = late_calls.clone();
        let id = bus.subscribe::<Ping, _>("late", Delivery::Serial, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        *late_id.lock() = Some(id);

        bus.post(Ping(0));
        assert_eq!(late_calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_reentrant_post_from_serial_handler() {
        let bus = Arc::new(EventBus::new());
        let seen = Arc::new(Mutex::new(Vec::new()));

        let inner_bus = bus.clone();
        let sink = seen.clone();
        bus.subscribe::<Ping, _>("echo", Delivery::Serial, move |ping| {
            sink.lock().push(ping.0);
            if ping.0 < 3 {
                inner_bus.post(Ping(ping.0 + 1));
            }
        });

        bus.post(Ping(0));
        assert_eq!(*seen.lock(), vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_panicking_handler_does_not_stop_delivery() {
        let bus = EventBus::new();
        let count = Arc::new(AtomicUsize::new(0));

        bus.subscribe::<Ping, _>("boom", Delivery::Concurrent, |_| panic!("boom"));
        let counter = count.clone();
        bus.subscribe::<Ping, _>("after", Delivery::Concurrent, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        bus.post(Ping(0));
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_serial_handler_never_overlaps() {
        let bus = Arc::new(EventBus::new());
        let running = Arc::new(AtomicUsize::new(0));
        let overlaps = Arc::new(AtomicUsize::new(0));

        let (r, o) = (running.clone(), overlaps.clone());
        bus.subscribe::<Ping, _>("serial", Delivery::Serial, move |_| {
            if r.fetch_add(1, Ordering::SeqCst) > 0 {
                o.fetch_add(1, Ordering::SeqCst);
            }
            thread::yield_now();
            r.fetch_sub(1, Ordering::SeqCst);
        });

        let handles: Vec<_> = (0..4)
            .map(|t| {
                let bus = bus.clone();
                thread::spawn(move || {
                    for i in 0..200 {
                        bus.post(Ping(t * 1000 + i));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(overlaps.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_filter_runs_before_serial_lock() {
        let bus = Arc::new(EventBus::new());
        let (entered_tx, entered_rx) = std::sync::mpsc::channel();
        let (release_tx, release_rx) = std::sync::mpsc::channel::<()>();
        let entered_tx = Mutex::new(entered_tx);
        let release_rx = Mutex::new(release_rx);
        let handled = Arc::new(Mutex::new(Vec::new()));

        let sink = handled.clone();
        bus.subscribe_filtered::<Ping, _, _>(
            "even",
            Delivery::Serial,
            |ping| ping.0 % 2 == 0,
            move |ping| {
                sink.lock().push(ping.0);
                if ping.0 == 0 {
                    entered_tx.lock().send(()).unwrap();
                    release_rx.lock().recv().unwrap();
                }
            },
        );

        let blocker = {
            let bus = bus.clone();
            thread::spawn(move || bus.post(Ping(0)))
        };
        entered_rx.recv().unwrap();

        // The handler is busy on the other thread; an odd event is rejected
        // without waiting for it.
        bus.post(Ping(1));
        release_tx.send(()).unwrap();
        blocker.join().unwrap();

        bus.post(Ping(2));
        assert_eq!(*handled.lock(), vec![0, 2]);
    }
}

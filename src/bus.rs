//! In-process notification bus with topic routing.
//!
//! This module provides [`NotificationBus`], a publish/subscribe channel used
//! by storage engines to emit recipe lifecycle events. Delivery is
//! at-least-once: every [`Delivery`] must be explicitly acknowledged, and a
//! rejected or dropped delivery is requeued with its
//! [`redelivered`](Envelope::redelivered) flag set.
//!
//! Two reset operations are deliberately distinct:
//!
//! - [`purge`](NotificationBus::purge) — soft reset: discards queued,
//!   undelivered messages while keeping subscription bindings intact.
//!   Appropriate between independent test scenarios.
//! - [`nuke`](NotificationBus::nuke) — hard reset: tears down every binding
//!   and closes the bus. Irreversible; used only at full shutdown.
//!
//! # Ordering
//!
//! Messages published by a single publisher under the same routing key are
//! delivered to each subscription in publish order. No ordering guarantee
//! exists across routing keys, and redelivery may reorder a rejected message
//! ahead of newer ones.
//!
//! # Example
//!
//! ```
//! use recipes_storage::bus::NotificationBus;
//! use serde_json::json;
//!
//! # tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap().block_on(async {
//! let bus = NotificationBus::new();
//! let sub = bus.subscribe("*.notifications.recipe.*");
//!
//! bus.publish("app.notifications.recipe.saved", json!({"id": 1}));
//!
//! let delivery = sub.recv().await.expect("delivery");
//! assert_eq!(delivery.routing_key(), "app.notifications.recipe.saved");
//! delivery.ack();
//! # });
//! ```

use std::{
    collections::VecDeque,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::Notify;
use tracing::{debug, trace};

use crate::routing::TopicPattern;

/// Topic-based publish/subscribe bus.
///
/// Cheaply cloneable via [`Arc`]; all clones share the same bindings. The bus
/// performs no I/O — it is the in-process stand-in for a broker, with the
/// same observable contract (topic bindings, explicit acknowledgment,
/// purge/nuke lifecycle).
#[derive(Clone, Default)]
pub struct NotificationBus {
    inner: Arc<BusInner>,
}

#[derive(Default)]
struct BusInner {
    bindings: Mutex<Vec<Arc<SubQueue>>>,
    /// Cleared by `nuke`; a closed bus drops publishes and hands out
    /// already-closed subscriptions.
    closed: AtomicBool,
}

struct SubQueue {
    pattern: TopicPattern,
    pending: Mutex<VecDeque<Message>>,
    notify: Notify,
    open: AtomicBool,
}

#[derive(Clone)]
struct Message {
    routing_key: String,
    content: Value,
    redelivered: bool,
}

impl SubQueue {
    fn new(pattern: TopicPattern) -> Self {
        Self {
            pattern,
            pending: Mutex::new(VecDeque::new()),
            notify: Notify::new(),
            open: AtomicBool::new(true),
        }
    }

    fn push(&self, message: Message) {
        if !self.open.load(Ordering::Acquire) {
            return;
        }
        self.pending.lock().push_back(message);
        self.notify.notify_one();
    }

    /// Redelivery goes to the front so a rejected message is retried before
    /// newer ones.
    fn requeue(&self, mut message: Message) {
        if !self.open.load(Ordering::Acquire) {
            trace!(routing_key = %message.routing_key, "dropping requeue on cancelled subscription");
            return;
        }
        message.redelivered = true;
        self.pending.lock().push_front(message);
        self.notify.notify_one();
    }

    fn pop(&self) -> Option<Message> {
        self.pending.lock().pop_front()
    }

    fn close(&self) {
        self.open.store(false, Ordering::Release);
        self.pending.lock().clear();
        self.notify.notify_waiters();
    }
}

impl NotificationBus {
    /// Creates an empty bus with no bindings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Publishes a message to every subscription whose pattern matches the
    /// routing key.
    ///
    /// Fire-and-forget: there is no confirmation and no error path. A publish
    /// on a nuked bus is silently dropped, as is a publish that matches no
    /// binding.
    pub fn publish(&self, routing_key: &str, content: Value) {
        if self.inner.closed.load(Ordering::Acquire) {
            trace!(%routing_key, "publish dropped: bus is nuked");
            return;
        }
        let bindings = self.inner.bindings.lock();
        let mut matched = 0usize;
        for queue in bindings.iter() {
            if queue.pattern.matches(routing_key) {
                queue.push(Message {
                    routing_key: routing_key.to_owned(),
                    content: content.clone(),
                    redelivered: false,
                });
                matched += 1;
            }
        }
        trace!(%routing_key, matched, "published notification");
    }

    /// Subscribes to all routing keys matching the given topic pattern.
    ///
    /// The returned [`Subscription`] owns its queue; messages published after
    /// this call and matching the pattern are buffered until received. On a
    /// nuked bus the subscription is created already closed.
    #[must_use]
    pub fn subscribe(&self, pattern: &str) -> Subscription {
        let queue = Arc::new(SubQueue::new(TopicPattern::parse(pattern)));
        if self.inner.closed.load(Ordering::Acquire) {
            queue.close();
        } else {
            self.inner.bindings.lock().push(Arc::clone(&queue));
        }
        debug!(%pattern, "subscription created");
        Subscription { bus: Arc::clone(&self.inner), queue }
    }

    /// Discards all queued, undelivered messages without touching bindings.
    ///
    /// In-flight deliveries are unaffected; one that is subsequently nacked
    /// or dropped will still be requeued.
    pub fn purge(&self) {
        let bindings = self.inner.bindings.lock();
        for queue in bindings.iter() {
            queue.pending.lock().clear();
        }
        debug!(bindings = bindings.len(), "bus purged");
    }

    /// Tears down all bindings and closes the bus.
    ///
    /// Every subscription is closed (pending messages dropped, waiting
    /// receivers woken with `None`), and subsequent publishes are discarded.
    /// This is irreversible; create a new bus to re-provision.
    pub fn nuke(&self) {
        self.inner.closed.store(true, Ordering::Release);
        let drained: Vec<_> = std::mem::take(&mut *self.inner.bindings.lock());
        for queue in &drained {
            queue.close();
        }
        debug!(bindings = drained.len(), "bus nuked");
    }

    /// Total number of queued, undelivered messages across all bindings.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.inner.bindings.lock().iter().map(|q| q.pending.lock().len()).sum()
    }
}

/// Handle to an active topic subscription.
///
/// Dropping the subscription cancels it. Cancellation stops delivery
/// promptly: the binding is removed, queued messages are dropped, and any
/// task blocked in [`recv`](Subscription::recv) is woken with `None`.
pub struct Subscription {
    bus: Arc<BusInner>,
    queue: Arc<SubQueue>,
}

impl Subscription {
    /// Receives the next delivery, waiting if the queue is empty.
    ///
    /// Returns `None` once the subscription has been cancelled (or the bus
    /// nuked) and the queue is drained.
    pub async fn recv(&self) -> Option<Delivery> {
        loop {
            // Register interest before checking the queue so a push between
            // the check and the await still wakes us.
            let notified = self.queue.notify.notified();
            if let Some(message) = self.queue.pop() {
                return Some(Delivery { queue: Arc::clone(&self.queue), message, settled: false });
            }
            if !self.queue.open.load(Ordering::Acquire) {
                return None;
            }
            notified.await;
        }
    }

    /// Receives the next delivery without waiting.
    pub fn try_recv(&self) -> Option<Delivery> {
        self.queue
            .pop()
            .map(|message| Delivery { queue: Arc::clone(&self.queue), message, settled: false })
    }

    /// Cancels the subscription and releases its resources.
    ///
    /// Idempotent. Messages already handed out as [`Delivery`] values are
    /// dropped on requeue rather than redelivered, since this queue has no
    /// other consumers.
    pub fn cancel(&self) {
        let mut bindings = self.bus.bindings.lock();
        bindings.retain(|q| !Arc::ptr_eq(q, &self.queue));
        drop(bindings);
        self.queue.close();
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// Delivery metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    /// The routing key the message was published under.
    pub routing_key: String,
    /// Whether this message was previously delivered and requeued.
    pub redelivered: bool,
}

/// A single message handed to a subscriber.
///
/// Every delivery must be settled with [`ack`](Delivery::ack) or
/// [`nack`](Delivery::nack). A delivery dropped without settlement is
/// treated as rejected and requeued, which keeps the at-least-once guarantee
/// when a consumer task dies mid-message.
pub struct Delivery {
    queue: Arc<SubQueue>,
    message: Message,
    /// Set by `ack`/`nack`; `Drop` requeues anything still unsettled.
    settled: bool,
}

impl Delivery {
    /// The routing key this message was published under.
    #[must_use]
    pub fn routing_key(&self) -> &str {
        &self.message.routing_key
    }

    /// The message content.
    #[must_use]
    pub fn content(&self) -> &Value {
        &self.message.content
    }

    /// Delivery metadata.
    #[must_use]
    pub fn envelope(&self) -> Envelope {
        Envelope {
            routing_key: self.message.routing_key.clone(),
            redelivered: self.message.redelivered,
        }
    }

    /// Acknowledges the message, removing it permanently.
    pub fn ack(mut self) {
        self.settled = true;
    }

    /// Rejects the message, requeuing it for redelivery.
    pub fn nack(mut self) {
        self.settled = true;
        self.queue.requeue(self.message.clone());
    }
}

impl Drop for Delivery {
    fn drop(&mut self) {
        if !self.settled {
            self.queue.requeue(self.message.clone());
        }
    }
}

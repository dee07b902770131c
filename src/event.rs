//! Typed publish/subscribe events with mixed sync and async subscribers.
//!
//! An [`Event<T>`] is a broadcast channel: any number of subscribers, no
//! polling. Subscribers come in two flavors held in one concurrently-safe
//! set:
//!
//! - **sync** callbacks (`Fn(&T)`) — a plain observer list
//! - **async** callbacks (`Fn(T) -> CallbackFuture`) — futures awaited
//!   sequentially, subscriber N+1 does not start until N completes
//!
//! [`Event::invoke`] is the blocking entry point: async subscribers are
//! driven to completion on the shared [`EventRuntime`] before it returns, so
//! callers on a background thread observe full completion.
//! [`Event::invoke_async`] awaits the same work without blocking a thread;
//! async-aware callers should use it exclusively.
//!
//! # Subscriber failures
//!
//! An async subscriber that returns an error aborts dispatch of the
//! remaining subscribers for that invocation; the error is logged and
//! returned to the invoker. This fail-fast behavior is deliberate — see
//! DESIGN.md.
//!
//! # Leak guard
//!
//! Subscriptions past [`SUBSCRIBER_LIMIT`] are rejected with a diagnostic
//! instead of growing the set without bound. Rejection is fail-soft: the
//! event keeps working for everyone already subscribed.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::{Mutex, RwLock};
use thiserror::Error;

use crate::runtime::EventRuntime;

/// Maximum live subscriptions per event before new ones are rejected.
pub const SUBSCRIBER_LIMIT: usize = 100;

/// Error type subscribers may produce.
pub type CallbackError = Box<dyn std::error::Error + Send + Sync>;

/// Boxed future returned by async subscriber callbacks.
pub type CallbackFuture = Pin<Box<dyn Future<Output = Result<(), CallbackError>> + Send>>;

/// Errors surfaced by event operations.
#[derive(Debug, Error)]
pub enum EventError {
    /// The event already holds [`SUBSCRIBER_LIMIT`] subscriptions.
    #[error("subscriber limit of {} reached; subscription rejected", SUBSCRIBER_LIMIT)]
    SubscriberLimit,
    /// An async subscriber returned an error; remaining dispatch was aborted.
    #[error("event subscriber failed: {0}")]
    Subscriber(CallbackError),
    /// The event's subscriptions were cleared while a waiter was blocked.
    #[error("event was torn down while waiting")]
    Closed,
}

/// Token identifying one subscription, used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Subscription(u64);

enum Callback<T> {
    Sync(Box<dyn Fn(&T) + Send + Sync>),
    Async(Box<dyn Fn(T) -> CallbackFuture + Send + Sync>),
}

struct Entry<T> {
    id: u64,
    callback: Arc<Callback<T>>,
}

struct Inner<T> {
    subscribers: RwLock<Vec<Entry<T>>>,
    next_id: AtomicU64,
    invocations: AtomicU64,
}

/// A typed broadcast event.
///
/// Handles are cheap to clone and share one subscriber set. The args type
/// `T` must be `Clone` because each async subscriber receives its own copy.
pub struct Event<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for Event<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> Default for Event<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Event<T> {
    /// Creates an event with no subscribers.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                subscribers: RwLock::new(Vec::new()),
                next_id: AtomicU64::new(0),
                invocations: AtomicU64::new(0),
            }),
        }
    }

    fn insert(&self, callback: Callback<T>) -> Result<Subscription, EventError> {
        let mut subscribers = self.inner.subscribers.write();
        if subscribers.len() >= SUBSCRIBER_LIMIT {
            log::error!(
                "event subscriber limit ({SUBSCRIBER_LIMIT}) reached; \
                 rejecting new subscription — possible subscription leak"
            );
            return Err(EventError::SubscriberLimit);
        }
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        subscribers.push(Entry {
            id,
            callback: Arc::new(callback),
        });
        Ok(Subscription(id))
    }

    /// Subscribes a synchronous callback.
    ///
    /// Returns [`EventError::SubscriberLimit`] if the leak guard rejects the
    /// subscription.
    pub fn subscribe(
        &self,
        callback: impl Fn(&T) + Send + Sync + 'static,
    ) -> Result<Subscription, EventError> {
        self.insert(Callback::Sync(Box::new(callback)))
    }

    /// Subscribes an asynchronous callback.
    ///
    /// The callback is handed its own clone of the args and returns a boxed
    /// future. During dispatch, futures run one at a time in subscription
    /// order.
    pub fn subscribe_async(
        &self,
        callback: impl Fn(T) -> CallbackFuture + Send + Sync + 'static,
    ) -> Result<Subscription, EventError> {
        self.insert(Callback::Async(Box::new(callback)))
    }

    /// Removes a subscription (sync or async).
    ///
    /// Returns `true` if the subscription was still live.
    pub fn unsubscribe(&self, subscription: Subscription) -> bool {
        let mut subscribers = self.inner.subscribers.write();
        let before = subscribers.len();
        subscribers.retain(|entry| entry.id != subscription.0);
        subscribers.len() != before
    }

    /// Drops every subscription. Blocked [`wait_until`](Self::wait_until)
    /// callers observe [`EventError::Closed`].
    pub fn clear_subscriptions(&self) {
        self.inner.subscribers.write().clear();
    }

    /// Number of live subscriptions (sync and async combined).
    pub fn subscriber_count(&self) -> usize {
        self.inner.subscribers.read().len()
    }

    /// How many times this event has been invoked (either entry point).
    pub fn invocation_count(&self) -> u64 {
        self.inner.invocations.load(Ordering::Relaxed)
    }

    fn snapshot(&self) -> Vec<Arc<Callback<T>>> {
        self.inner
            .subscribers
            .read()
            .iter()
            .map(|entry| Arc::clone(&entry.callback))
            .collect()
    }
}

impl<T: Clone + Send + Sync + 'static> Event<T> {
    /// Invokes every subscriber, blocking until all have completed.
    ///
    /// Sync subscribers run on the calling thread. Async subscribers are
    /// driven to completion on the shared [`EventRuntime`] before the next
    /// subscriber starts, so when this returns the full subscriber list has
    /// observed the invocation.
    ///
    /// The first failing async subscriber aborts dispatch of the remaining
    /// subscribers and its error is returned.
    pub fn invoke(&self, args: T) -> Result<(), EventError> {
        self.inner.invocations.fetch_add(1, Ordering::Relaxed);
        for callback in self.snapshot() {
            match &*callback {
                Callback::Sync(f) => f(&args),
                Callback::Async(f) => {
                    let future = f(args.clone());
                    let result = EventRuntime::global().run(future).recv();
                    Self::check(result)?;
                }
            }
        }
        Ok(())
    }

    /// Invokes every subscriber, awaiting each async subscriber in turn.
    ///
    /// Ordering between subscribers is sequential: subscriber N+1 does not
    /// start until subscriber N completes. The first failing subscriber
    /// aborts dispatch of the remainder.
    pub async fn invoke_async(&self, args: T) -> Result<(), EventError> {
        self.inner.invocations.fetch_add(1, Ordering::Relaxed);
        for callback in self.snapshot() {
            match &*callback {
                Callback::Sync(f) => f(&args),
                Callback::Async(f) => {
                    let result = f(args.clone()).await;
                    Self::check(Some(result))?;
                }
            }
        }
        Ok(())
    }

    fn check(result: Option<Result<(), CallbackError>>) -> Result<(), EventError> {
        let error = match result {
            Some(Ok(())) => return Ok(()),
            Some(Err(error)) => error,
            None => CallbackError::from("async subscriber was dropped before completing"),
        };
        log::error!("event subscriber failed, aborting remaining dispatch: {error}");
        Err(EventError::Subscriber(error))
    }

    /// Blocks until the event fires with args matching `predicate`.
    ///
    /// Subscribes internally and unsubscribes once the predicate first holds;
    /// the matching args are returned. Completes only when the predicate is
    /// satisfied or the event is torn down — callers needing a timeout must
    /// race this against one externally.
    pub fn wait_until(
        &self,
        predicate: impl Fn(&T) -> bool + Send + Sync + 'static,
    ) -> Result<T, EventError> {
        let (sender, receiver) = std::sync::mpsc::channel();
        let slot = Mutex::new(Some(sender));
        let subscription = self.subscribe(move |args| {
            if predicate(args)
                && let Some(sender) = slot.lock().take()
            {
                let _ = sender.send(args.clone());
            }
        })?;

        let result = receiver.recv();
        self.unsubscribe(subscription);
        result.map_err(|_| EventError::Closed)
    }

    /// Async variant of [`wait_until`](Self::wait_until).
    ///
    /// Not separately cancelable: the returned future resolves when the
    /// predicate first holds or the event is torn down.
    pub async fn wait_until_async(
        &self,
        predicate: impl Fn(&T) -> bool + Send + Sync + 'static,
    ) -> Result<T, EventError> {
        let (sender, receiver) = tokio::sync::oneshot::channel();
        let slot = Mutex::new(Some(sender));
        let subscription = self.subscribe(move |args| {
            if predicate(args)
                && let Some(sender) = slot.lock().take()
            {
                let _ = sender.send(args.clone());
            }
        })?;

        let result = receiver.await;
        self.unsubscribe(subscription);
        result.map_err(|_| EventError::Closed)
    }
}

impl<T> std::fmt::Debug for Event<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Event")
            .field("subscribers", &self.subscriber_count())
            .field("invocations", &self.invocation_count())
            .finish()
    }
}

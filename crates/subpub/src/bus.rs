//! The bus — subject registry, publish fan-out, and shutdown coordination.
//!
//! ```text
//! publish(subject, msg)
//!     │  (read lock, try_send per subscriber)
//!     ├──► [queue 1] ──► delivery task 1 ──► handler1.handle()
//!     ├──► [queue 2] ──► delivery task 2 ──► handler2.handle()
//!     └──► [queue N] ──► delivery task N ──► handlerN.handle()
//! ```
//!
//! Each subscription owns a bounded queue and one async delivery task. The
//! task waits on its queue without holding a thread and hands each message to
//! the handler on Tokio's blocking pool, so only handlers that are running
//! occupy blocking threads. Publish never waits: a full queue drops the
//! message for that subscriber only. Removing a registry entry drops the
//! queue's only sender, so the delivery task drains what is buffered and then
//! exits.

use std::any::Any;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard, Weak};
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::sync::{OnceCell, mpsc};
use tokio_util::task::TaskTracker;
use tracing::{debug, error, trace, warn};

use crate::config::BusConfig;
use crate::error::BusError;
use crate::handler::MessageHandler;
use crate::registry::{Entry, Registry};
use crate::subscription::{Subscription, SubscriptionId};

/// State shared by every [`Bus`] clone and referenced weakly by subscriptions.
pub(crate) struct Shared<M> {
    registry: RwLock<Registry<M>>,
    /// Outstanding delivery tasks.
    tracker: TaskTracker,
    runtime: Handle,
    config: BusConfig,
    /// Outcome of the one shutdown sequence.
    shutdown: OnceCell<Result<(), BusError>>,
}

impl<M> Shared<M> {
    pub(crate) fn read(&self) -> RwLockReadGuard<'_, Registry<M>> {
        self.registry.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn write(&self) -> RwLockWriteGuard<'_, Registry<M>> {
        self.registry.write().unwrap_or_else(PoisonError::into_inner)
    }
}

/// An in-process publish/subscribe bus keyed by subject.
///
/// Cloning a `Bus` yields another handle to the same registry. Delivery tasks
/// are spawned on the Tokio runtime the bus was created in.
pub struct Bus<M> {
    shared: Arc<Shared<M>>,
}

impl<M> Clone for Bus<M> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<M> std::fmt::Debug for Bus<M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let registry = self.shared.read();
        f.debug_struct("Bus")
            .field("config", &self.shared.config)
            .field("closed", &registry.is_closed())
            .field("subjects", &registry.subject_count())
            .field("outstanding", &self.shared.tracker.len())
            .finish()
    }
}

impl<M: Send + 'static> Bus<M> {
    /// Create a bus with the default configuration on the current runtime.
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime.
    #[must_use]
    pub fn new() -> Self {
        Self::build(BusConfig::default(), Handle::current())
    }

    /// Create a bus with the given configuration on the current runtime.
    ///
    /// # Errors
    ///
    /// Returns [`BusError::InvalidConfig`] if the configuration is rejected.
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime.
    pub fn with_config(config: BusConfig) -> Result<Self, BusError> {
        Self::with_runtime(config, Handle::current())
    }

    /// Create a bus whose delivery tasks run on the given runtime.
    ///
    /// # Errors
    ///
    /// Returns [`BusError::InvalidConfig`] if the configuration is rejected.
    pub fn with_runtime(config: BusConfig, runtime: Handle) -> Result<Self, BusError> {
        config.validate()?;
        Ok(Self::build(config, runtime))
    }

    fn build(config: BusConfig, runtime: Handle) -> Self {
        Self {
            shared: Arc::new(Shared {
                registry: RwLock::new(Registry::new()),
                tracker: TaskTracker::new(),
                runtime,
                config,
                shutdown: OnceCell::new(),
            }),
        }
    }

    /// Register `handler` for messages published on `subject`.
    ///
    /// Starts the subscription's delivery task before returning. Any subject
    /// string is accepted, including the empty string.
    ///
    /// # Errors
    ///
    /// Returns [`BusError::Closed`] if the bus has been closed.
    pub fn subscribe<H>(&self, subject: impl Into<String>, handler: H) -> Result<Subscription<M>, BusError>
    where
        H: MessageHandler<M>,
    {
        let subject = subject.into();
        let id = SubscriptionId::new();
        let (sender, receiver) = mpsc::channel(self.shared.config.queue_capacity);

        // Register and spawn under one lock so close never sees half a subscription.
        let mut registry = self.shared.write();
        if registry.is_closed() {
            return Err(BusError::Closed);
        }
        registry.insert(subject.clone(), id, sender);

        let task_subject = subject.clone();
        let bus = Arc::downgrade(&self.shared);
        self.shared.tracker.spawn_on(
            async move { deliver(receiver, handler, &task_subject, id, &bus).await },
            &self.shared.runtime,
        );
        drop(registry);

        debug!(subject, subscription_id = %id, "subscribed");
        Ok(Subscription::new(id, subject, Arc::downgrade(&self.shared)))
    }

    /// Publish `message` to every subscriber of `subject`.
    ///
    /// Never blocks: a subscriber whose queue is full misses this message.
    /// Returns how many subscriber queues accepted it; zero subscribers is
    /// not an error.
    ///
    /// # Errors
    ///
    /// Returns [`BusError::Closed`] if the bus has been closed.
    pub fn publish(&self, subject: &str, message: M) -> Result<usize, BusError>
    where
        M: Clone,
    {
        let registry = self.shared.read();
        if registry.is_closed() {
            return Err(BusError::Closed);
        }

        let subscribers = registry.subscribers(subject);
        let mut accepted = 0usize;
        if let Some((last, rest)) = subscribers.split_last() {
            for entry in rest {
                accepted += offer(entry, subject, message.clone());
            }
            accepted += offer(last, subject, message);
        }

        trace!(subject, subscribers = subscribers.len(), accepted, "published");
        Ok(accepted)
    }

    /// Close the bus and wait up to `timeout` for delivery tasks to finish.
    ///
    /// Subscribe and publish fail from the moment this is called. Every queue
    /// is closed, and already-buffered messages are still delivered. Only the
    /// first call runs the shutdown; concurrent callers wait on it and later
    /// callers get its outcome straight away.
    ///
    /// # Errors
    ///
    /// Returns [`BusError::DeadlineExceeded`] if tasks were still running when
    /// `timeout` elapsed. They are left to finish in the background.
    pub async fn close(&self, timeout: Duration) -> Result<(), BusError> {
        self.shared
            .shutdown
            .get_or_init(|| self.shutdown(timeout))
            .await
            .clone()
    }

    async fn shutdown(&self, timeout: Duration) -> Result<(), BusError> {
        let drained = self.shared.write().close();
        let subscriptions = drained.len();
        // Dropping the senders closes every remaining queue.
        drop(drained);
        self.shared.tracker.close();

        debug!(
            subscriptions,
            outstanding = self.shared.tracker.len(),
            ?timeout,
            "bus closing"
        );

        if tokio::time::timeout(timeout, self.shared.tracker.wait())
            .await
            .is_err()
        {
            warn!(
                outstanding = self.shared.tracker.len(),
                ?timeout,
                "shutdown deadline exceeded, delivery tasks left running"
            );
            return Err(BusError::DeadlineExceeded { timeout });
        }

        debug!("bus closed");
        Ok(())
    }

    /// Returns `true` once [`Bus::close`] has been called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.shared.read().is_closed()
    }

    /// Returns the number of subscriptions on `subject`.
    #[must_use]
    pub fn subscriber_count(&self, subject: &str) -> usize {
        self.shared.read().subscribers(subject).len()
    }

    /// Returns the number of subjects with at least one subscription.
    #[must_use]
    pub fn subject_count(&self) -> usize {
        self.shared.read().subject_count()
    }

    /// Returns the total number of subscriptions across all subjects.
    #[must_use]
    pub fn total_subscriptions(&self) -> usize {
        self.shared.read().total_subscriptions()
    }

    /// Returns the number of delivery tasks that have not yet exited.
    #[must_use]
    pub fn outstanding_tasks(&self) -> usize {
        self.shared.tracker.len()
    }

    /// Returns the bus configuration.
    #[must_use]
    pub fn config(&self) -> BusConfig {
        self.shared.config
    }
}

/// Try to enqueue one message; returns 1 if the queue accepted it.
fn offer<M>(entry: &Entry<M>, subject: &str, message: M) -> usize {
    match entry.sender.try_send(message) {
        Ok(()) => 1,
        Err(mpsc::error::TrySendError::Full(_)) => {
            trace!(subject, subscription_id = %entry.id, "queue full, message dropped");
            0
        }
        Err(mpsc::error::TrySendError::Closed(_)) => {
            trace!(subject, subscription_id = %entry.id, "delivery task gone, message dropped");
            0
        }
    }
}

/// Delivery task body: drain the queue into the handler until it closes.
///
/// Waiting on the queue is async. Each handler call moves the handler onto the
/// blocking pool and gets it back when the call returns, so calls stay
/// sequential. A panicking handler ends this subscription only. Its queue is
/// closed and its registry entry removed.
async fn deliver<M, H>(
    mut receiver: mpsc::Receiver<M>,
    mut handler: H,
    subject: &str,
    id: SubscriptionId,
    bus: &Weak<Shared<M>>,
) where
    M: Send + 'static,
    H: MessageHandler<M>,
{
    while let Some(message) = receiver.recv().await {
        let call = tokio::task::spawn_blocking(move || {
            handler.handle(message);
            handler
        });
        match call.await {
            Ok(returned) => handler = returned,
            Err(err) if err.is_panic() => {
                let payload = err.into_panic();
                error!(
                    subject,
                    subscription_id = %id,
                    panic = panic_message(payload.as_ref()),
                    "handler panicked, stopping delivery"
                );
                receiver.close();
                if let Some(shared) = bus.upgrade() {
                    shared.write().remove(subject, id);
                }
                return;
            }
            Err(err) => {
                debug!(subject, subscription_id = %id, %err, "handler call cancelled");
                return;
            }
        }
    }
    trace!(subject, subscription_id = %id, "delivery task finished");
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(msg) = payload.downcast_ref::<&'static str>() {
        *msg
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.as_str()
    } else {
        "unknown panic"
    }
}

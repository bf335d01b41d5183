//! Subscription handles.

use std::fmt;
use std::sync::Weak;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::debug;
use uuid::Uuid;

use crate::bus::Shared;

/// Unique identifier of a subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(Uuid);

impl SubscriptionId {
    /// Allocate a fresh random identifier.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SubscriptionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// A live registration of one handler against one subject.
///
/// Returned by [`Bus::subscribe`](crate::Bus::subscribe). Dropping the handle
/// does not unsubscribe; call [`Subscription::unsubscribe`] or close the bus.
/// The handle only holds a weak reference to the bus.
pub struct Subscription<M> {
    id: SubscriptionId,
    subject: String,
    bus: Weak<Shared<M>>,
    unsubscribed: AtomicBool,
}

impl<M> Subscription<M> {
    pub(crate) fn new(id: SubscriptionId, subject: String, bus: Weak<Shared<M>>) -> Self {
        Self {
            id,
            subject,
            bus,
            unsubscribed: AtomicBool::new(false),
        }
    }

    /// Returns the subscription's identifier.
    #[must_use]
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Returns the subject this subscription listens on.
    #[must_use]
    pub fn subject(&self) -> &str {
        &self.subject
    }

    /// Remove this subscription from the bus.
    ///
    /// Messages already queued are still delivered, then the delivery task
    /// exits. Safe to call any number of times, from any number of threads;
    /// only the first call does anything. A no-op once the bus is closed or
    /// dropped.
    pub fn unsubscribe(&self) {
        if self.unsubscribed.swap(true, Ordering::AcqRel) {
            return;
        }
        let Some(shared) = self.bus.upgrade() else {
            return;
        };
        let removed = shared.write().remove(&self.subject, self.id);
        debug!(
            subject = self.subject,
            subscription_id = %self.id,
            removed,
            "unsubscribed"
        );
    }
}

impl<M> fmt::Debug for Subscription<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("subject", &self.subject)
            .field("unsubscribed", &self.unsubscribed.load(Ordering::Acquire))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_are_unique() {
        assert_ne!(SubscriptionId::new(), SubscriptionId::new());
    }

    #[test]
    fn test_unsubscribe_without_bus_is_noop() {
        let sub: Subscription<u32> = Subscription::new(SubscriptionId::new(), "orders".into(), Weak::new());
        sub.unsubscribe();
        sub.unsubscribe();
        assert_eq!(sub.subject(), "orders");
    }
}

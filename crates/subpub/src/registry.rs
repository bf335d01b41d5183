//! Subject registry — tracks live subscriptions per subject.
//!
//! The registry itself is not synchronised; the bus keeps it behind a
//! read/write lock. Each entry owns the only sender for its subscription's
//! queue, so removing an entry is what closes the queue.

use std::collections::HashMap;

use tokio::sync::mpsc;

use crate::subscription::SubscriptionId;

/// A registered subscription as seen by publishers.
#[derive(Debug)]
pub(crate) struct Entry<M> {
    /// The subscription this entry belongs to.
    pub(crate) id: SubscriptionId,
    /// Sending half of the subscription's delivery queue.
    pub(crate) sender: mpsc::Sender<M>,
}

/// Mapping from subject to the subscriptions registered against it.
#[derive(Debug)]
pub(crate) struct Registry<M> {
    /// Subscriptions keyed by subject, in registration order.
    subjects: HashMap<String, Vec<Entry<M>>>,
    /// Set once by [`Registry::close`]; never reset.
    closed: bool,
}

impl<M> Registry<M> {
    /// Create a new empty, open registry.
    pub(crate) fn new() -> Self {
        Self {
            subjects: HashMap::new(),
            closed: false,
        }
    }

    /// Returns `true` once the registry has been closed.
    pub(crate) fn is_closed(&self) -> bool {
        self.closed
    }

    /// Append a subscription to a subject, creating the subject if needed.
    pub(crate) fn insert(&mut self, subject: String, id: SubscriptionId, sender: mpsc::Sender<M>) {
        self.subjects
            .entry(subject)
            .or_default()
            .push(Entry { id, sender });
    }

    /// Remove a subscription from a subject.
    ///
    /// Returns `true` if the subscription was found. The removed entry's
    /// sender is dropped, closing the queue. If no subscriptions remain, the
    /// subject is removed entirely.
    pub(crate) fn remove(&mut self, subject: &str, id: SubscriptionId) -> bool {
        let Some(entries) = self.subjects.get_mut(subject) else {
            return false;
        };
        let Some(pos) = entries.iter().position(|entry| entry.id == id) else {
            return false;
        };
        entries.remove(pos);
        if entries.is_empty() {
            self.subjects.remove(subject);
        }
        true
    }

    /// Returns the subscriptions registered for a subject.
    pub(crate) fn subscribers(&self, subject: &str) -> &[Entry<M>] {
        self.subjects
            .get(subject)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Mark the registry closed and take every entry out of it.
    ///
    /// Returns an empty list if it was already closed.
    pub(crate) fn close(&mut self) -> Vec<Entry<M>> {
        self.closed = true;
        self.subjects.drain().flat_map(|(_, entries)| entries).collect()
    }

    /// Returns the number of subjects with at least one subscription.
    pub(crate) fn subject_count(&self) -> usize {
        self.subjects.len()
    }

    /// Returns the total number of subscriptions across all subjects.
    pub(crate) fn total_subscriptions(&self) -> usize {
        self.subjects.values().map(Vec::len).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn insert(registry: &mut Registry<u32>, subject: &str) -> (SubscriptionId, mpsc::Receiver<u32>) {
        let id = SubscriptionId::new();
        let (tx, rx) = mpsc::channel(4);
        registry.insert(subject.to_string(), id, tx);
        (id, rx)
    }

    #[test]
    fn test_insert_new_subject() {
        let mut registry = Registry::new();
        let (id, _rx) = insert(&mut registry, "orders");
        assert_eq!(registry.subject_count(), 1);
        assert_eq!(registry.subscribers("orders").len(), 1);
        assert_eq!(registry.subscribers("orders")[0].id, id);
    }

    #[test]
    fn test_insert_keeps_registration_order() {
        let mut registry = Registry::new();
        let (first, _rx1) = insert(&mut registry, "orders");
        let (second, _rx2) = insert(&mut registry, "orders");
        let ids: Vec<_> = registry.subscribers("orders").iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![first, second]);
        assert_eq!(registry.subject_count(), 1);
        assert_eq!(registry.total_subscriptions(), 2);
    }

    #[test]
    fn test_unknown_subject_has_no_subscribers() {
        let registry: Registry<u32> = Registry::new();
        assert!(registry.subscribers("missing").is_empty());
    }

    #[test]
    fn test_remove_closes_queue() {
        let mut registry = Registry::new();
        let (id, mut rx) = insert(&mut registry, "orders");
        assert!(registry.remove("orders", id));
        assert!(rx.try_recv().is_err());
        assert!(rx.is_closed());
    }

    #[test]
    fn test_remove_last_subscription_removes_subject() {
        let mut registry = Registry::new();
        let (id, _rx) = insert(&mut registry, "orders");
        assert!(registry.remove("orders", id));
        assert_eq!(registry.subject_count(), 0);
    }

    #[test]
    fn test_remove_twice_is_noop() {
        let mut registry = Registry::new();
        let (id, _rx) = insert(&mut registry, "orders");
        let (_other, _rx2) = insert(&mut registry, "orders");
        assert!(registry.remove("orders", id));
        assert!(!registry.remove("orders", id));
        assert_eq!(registry.total_subscriptions(), 1);
    }

    #[test]
    fn test_close_drains_everything() {
        let mut registry = Registry::new();
        let (_a, _rx1) = insert(&mut registry, "orders");
        let (_b, _rx2) = insert(&mut registry, "payments");
        let drained = registry.close();
        assert_eq!(drained.len(), 2);
        assert!(registry.is_closed());
        assert_eq!(registry.subject_count(), 0);
        assert!(registry.close().is_empty());
    }
}

//! Subscription management for view observers.
//!
//! Callbacks are shared with the notifier thread, so each subscription
//! carries an `active` flag that is cleared on unsubscribe; a notification
//! already in flight checks it before calling back.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use hashbrown::HashMap;

use crate::update::ViewUpdate;

/// Unique identifier for a subscription within one view.
pub type SubscriptionId = u64;

/// Callback type for update notifications.
pub type UpdateCallback = Arc<dyn Fn(&ViewUpdate) + Send + Sync>;

/// A subscription to view updates.
#[derive(Clone)]
pub struct Subscription {
    id: SubscriptionId,
    callback: UpdateCallback,
    active: Arc<AtomicBool>,
}

impl Subscription {
    pub fn new<F>(id: SubscriptionId, callback: F) -> Self
    where
        F: Fn(&ViewUpdate) + Send + Sync + 'static,
    {
        Self {
            id,
            callback: Arc::new(callback),
            active: Arc::new(AtomicBool::new(true)),
        }
    }

    #[inline]
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    #[inline]
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Deactivates this subscription and every clone of it.
    #[inline]
    pub fn deactivate(&self) {
        self.active.store(false, Ordering::Release);
    }

    /// Calls back if still active.
    pub fn notify(&self, update: &ViewUpdate) {
        if self.is_active() {
            (self.callback)(update);
        }
    }
}

/// Manages the subscriptions of one view.
pub struct SubscriptionManager {
    subscriptions: HashMap<SubscriptionId, Subscription>,
    next_id: SubscriptionId,
}

impl Default for SubscriptionManager {
    fn default() -> Self {
        Self::new()
    }
}

impl SubscriptionManager {
    pub fn new() -> Self {
        Self {
            subscriptions: HashMap::new(),
            next_id: 1,
        }
    }

    /// Subscribes `callback`; returns the id to unsubscribe with.
    pub fn subscribe<F>(&mut self, callback: F) -> SubscriptionId
    where
        F: Fn(&ViewUpdate) + Send + Sync + 'static,
    {
        let id = self.next_id;
        self.next_id += 1;
        self.subscriptions.insert(id, Subscription::new(id, callback));
        id
    }

    /// Unsubscribes by id. Returns true if the subscription was live.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        match self.subscriptions.remove(&id) {
            Some(sub) => {
                sub.deactivate();
                true
            }
            None => false,
        }
    }

    /// Returns clones of the live subscriptions, in subscription order.
    pub fn targets(&self) -> Vec<Subscription> {
        let mut targets: Vec<Subscription> = self.subscriptions.values().cloned().collect();
        targets.sort_by_key(Subscription::id);
        targets
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.subscriptions.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.subscriptions.is_empty()
    }

    /// Deactivates and drops every subscription.
    pub fn clear(&mut self) {
        for (_, sub) in self.subscriptions.drain() {
            sub.deactivate();
        }
    }
}

//! Per-token tick routing
//!
//! Subscribers register a callback against a `(segment, token)` key; the
//! feed loop publishes each decoded update to that key's subscribers.
//! Callbacks run synchronously on the publishing thread, so they must not
//! block and must not call back into the router.
//!
//! Every subscription carries an owner id so a strategy teardown can revoke
//! all of its subscriptions in one call without tracking the individual ids.

use arka_core::{Segment, UnifiedUpdate};
use std::collections::HashMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

/// Callback invoked on the feed thread for each matching update.
pub type TickCallback = Arc<dyn Fn(&UnifiedUpdate) + Send + Sync>;

/// Identifies the component that created a subscription (a strategy id, a
/// service name hash). Revocation is scoped to this id.
pub type OwnerId = u64;

/// Handle for one subscription, unique for the router's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

struct Subscription {
    id: SubscriptionId,
    owner: OwnerId,
    callback: TickCallback,
}

type TokenKey = (Segment, u32);

/// Per-token publish/subscribe fan-out.
pub struct TickRouter {
    subs: RwLock<HashMap<TokenKey, Vec<Arc<Subscription>>>>,
    by_owner: RwLock<HashMap<OwnerId, Vec<(TokenKey, SubscriptionId)>>>,
    next_id: AtomicU64,
    published: AtomicU64,
    delivered: AtomicU64,
    panicked: AtomicU64,
}

impl Default for TickRouter {
    fn default() -> Self {
        Self::new()
    }
}

impl TickRouter {
    pub fn new() -> Self {
        Self {
            subs: RwLock::new(HashMap::new()),
            by_owner: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            published: AtomicU64::new(0),
            delivered: AtomicU64::new(0),
            panicked: AtomicU64::new(0),
        }
    }

    pub fn subscribe(
        &self,
        owner: OwnerId,
        segment: Segment,
        token: u32,
        callback: TickCallback,
    ) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let key = (segment, token);
        let sub = Arc::new(Subscription { id, owner, callback });

        // Lock order: subs before by_owner, same as revoke_owner.
        let mut subs = self.subs.write().unwrap();
        subs.entry(key).or_default().push(sub);
        drop(subs);

        self.by_owner.write().unwrap().entry(owner).or_default().push((key, id));
        id
    }

    /// Remove one subscription. Unknown ids are a no-op.
    pub fn unsubscribe(&self, segment: Segment, token: u32, id: SubscriptionId) {
        let key = (segment, token);
        let mut subs = self.subs.write().unwrap();
        if let Some(list) = subs.get_mut(&key) {
            list.retain(|s| s.id != id);
            if list.is_empty() {
                subs.remove(&key);
            }
        }
        drop(subs);

        let mut by_owner = self.by_owner.write().unwrap();
        for list in by_owner.values_mut() {
            list.retain(|(k, sid)| !(*k == key && *sid == id));
        }
        by_owner.retain(|_, list| !list.is_empty());
    }

    /// Remove every subscription created under `owner`. Returns the count
    /// removed. Used on strategy stop/delete so a torn-down strategy can
    /// never receive another tick.
    pub fn revoke_owner(&self, owner: OwnerId) -> usize {
        let Some(keys) = self.by_owner.write().unwrap().remove(&owner) else {
            return 0;
        };
        let mut subs = self.subs.write().unwrap();
        for (key, id) in &keys {
            if let Some(list) = subs.get_mut(key) {
                list.retain(|s| s.id != *id);
                if list.is_empty() {
                    subs.remove(key);
                }
            }
        }
        keys.len()
    }

    /// Deliver one update to the token's subscribers.
    ///
    /// The subscriber list is copied under the read lock and callbacks run
    /// after it is released, so a callback that subscribes or unsubscribes
    /// other tokens cannot deadlock. A panicking callback is counted and
    /// isolated; remaining subscribers still receive the update.
    pub fn publish(&self, update: &UnifiedUpdate) {
        self.published.fetch_add(1, Ordering::Relaxed);
        let key = (update.segment, update.token);
        let targets: Vec<Arc<Subscription>> = {
            let subs = self.subs.read().unwrap();
            match subs.get(&key) {
                Some(list) => list.clone(),
                None => return,
            }
        };
        for sub in targets {
            let cb = &sub.callback;
            if catch_unwind(AssertUnwindSafe(|| cb(update))).is_err() {
                self.panicked.fetch_add(1, Ordering::Relaxed);
                log::error!(
                    "subscriber {} of owner {} panicked on {}:{}",
                    sub.id.0,
                    sub.owner,
                    update.segment,
                    update.token
                );
            } else {
                self.delivered.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    pub fn subscriber_count(&self, segment: Segment, token: u32) -> usize {
        self.subs.read().unwrap().get(&(segment, token)).map_or(0, Vec::len)
    }

    pub fn published(&self) -> u64 {
        self.published.load(Ordering::Relaxed)
    }

    pub fn delivered(&self) -> u64 {
        self.delivered.load(Ordering::Relaxed)
    }

    pub fn panicked(&self) -> u64 {
        self.panicked.load(Ordering::Relaxed)
    }
}

// =============================================================================
// Access Controller — free-tier quota and subscription state
// =============================================================================
//
//   Unregistered ──register──▶ Registered(usage 0..=limit) ──activate──▶ Subscribed
//
// The operator account bypasses all of it: `is_admin` is the single place that
// decides this, and every quota or subscription check goes through it.
//
// Concurrency: `lock_user` hands out a per-identifier async mutex. The signal
// service holds it from `authorize` until `charge`, so two requests from the
// same user cannot both pass against a stale count. Different users never
// contend. A lock entry lives only while someone holds or waits on it.
// Account writes go through the store's atomic `upsert`.
// =============================================================================

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::OwnedMutexGuard;
use tracing::{debug, info, warn};

use crate::access::store::{Increment, UserAccount, UserStore};
use crate::error::SignalError;
use crate::types::UserId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DenyReason {
    QuotaExceeded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AccessDecision {
    Permit,
    Deny(DenyReason),
}

type LockTable = Arc<Mutex<HashMap<UserId, Arc<tokio::sync::Mutex<()>>>>>;

/// Held per-user lock. Dropping the last holder removes the table entry.
pub struct UserLock {
    id: UserId,
    table: LockTable,
    _guard: OwnedMutexGuard<()>,
}

impl Drop for UserLock {
    fn drop(&mut self) {
        let mut locks = self.table.lock();
        // One reference from the table, one from our guard.
        if locks.get(&self.id).is_some_and(|lock| Arc::strong_count(lock) == 2) {
            locks.remove(&self.id);
        }
    }
}

pub struct AccessController {
    store: Arc<dyn UserStore>,
    admin: Option<UserId>,
    free_signal_limit: u32,
    user_locks: LockTable,
}

impl AccessController {
    pub fn new(store: Arc<dyn UserStore>, admin: Option<UserId>, free_signal_limit: u32) -> Self {
        Self {
            store,
            admin,
            free_signal_limit,
            user_locks: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Whether `id` is the operator account.
    pub fn is_admin(&self, id: &UserId) -> bool {
        self.admin.as_ref() == Some(id)
    }

    pub fn free_signal_limit(&self) -> u32 {
        self.free_signal_limit
    }

    pub fn account(&self, id: &UserId) -> Option<UserAccount> {
        self.store.get(id)
    }

    pub fn user_count(&self) -> usize {
        self.store.len()
    }

    /// Never charged: the operator, or a subscribed account.
    pub fn is_quota_exempt(&self, id: &UserId) -> bool {
        self.is_admin(id) || self.store.get(id).is_some_and(|acct| acct.subscribed)
    }

    /// Serialise quota-affecting work for one identifier.
    pub async fn lock_user(&self, id: &UserId) -> UserLock {
        let lock = {
            let mut locks = self.user_locks.lock();
            locks.entry(id.clone()).or_default().clone()
        };
        UserLock {
            id: id.clone(),
            table: self.user_locks.clone(),
            _guard: lock.lock_owned().await,
        }
    }

    #[cfg(test)]
    fn tracked_locks(&self) -> usize {
        self.user_locks.lock().len()
    }

    /// Idempotent registration.
    ///
    /// An existing account keeps its state. A blank display name (left by an
    /// activation that arrived first) is filled in, and the operator account
    /// is forced back to subscribed with zero usage on every call.
    pub fn register(&self, id: &UserId, display_name: &str) -> UserAccount {
        let is_admin = self.is_admin(id);
        let (acct, created) = self.store.upsert(UserAccount::new(id.clone(), display_name), &mut |acct| {
            if acct.display_name.is_empty() {
                acct.display_name = display_name.to_string();
            }
            if is_admin {
                if !acct.subscribed || acct.free_signals_used != 0 {
                    debug!(user = %acct.id, "re-asserting operator subscription");
                }
                acct.subscribed = true;
                acct.free_signals_used = 0;
            }
        });
        if created {
            info!(user = %id, "user registered");
        }
        acct
    }

    /// Decide whether `id` may receive a signal now. Does not mutate.
    pub fn authorize(&self, id: &UserId) -> Result<AccessDecision, SignalError> {
        if self.is_admin(id) {
            return Ok(AccessDecision::Permit);
        }

        let acct = self
            .store
            .get(id)
            .ok_or_else(|| SignalError::UnknownUser(id.clone()))?;

        if acct.subscribed || acct.free_signals_used < self.free_signal_limit {
            Ok(AccessDecision::Permit)
        } else {
            Ok(AccessDecision::Deny(DenyReason::QuotaExceeded))
        }
    }

    /// Consume one free signal. A no-op for the operator and for subscribers.
    ///
    /// Call only after a signal was actually produced.
    pub fn charge(&self, id: &UserId) -> Result<(), SignalError> {
        if self.is_admin(id) {
            return Ok(());
        }

        let acct = self
            .store
            .get(id)
            .ok_or_else(|| SignalError::UnknownUser(id.clone()))?;
        if acct.subscribed {
            return Ok(());
        }

        match self.store.increment_with_ceiling(id, self.free_signal_limit) {
            Increment::Applied(used) => {
                debug!(user = %id, used, limit = self.free_signal_limit, "free signal charged");
                Ok(())
            }
            Increment::AtCeiling(used) => {
                warn!(user = %id, used, "charge attempted at quota ceiling");
                Err(SignalError::QuotaExceeded(id.clone()))
            }
            Increment::Missing => Err(SignalError::UnknownUser(id.clone())),
        }
    }

    /// Mark `id` subscribed and reset its usage. Creates the account when the
    /// identifier has never been seen. Idempotent.
    pub async fn activate_subscription(&self, id: &UserId) -> UserAccount {
        let _guard = self.lock_user(id).await;

        let mut was_subscribed = false;
        let (acct, _) = self.store.upsert(UserAccount::new(id.clone(), ""), &mut |acct| {
            was_subscribed = acct.subscribed;
            acct.subscribed = true;
            acct.free_signals_used = 0;
        });

        if !was_subscribed {
            info!(user = %id, "subscription activated");
        }
        acct
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::store::InMemoryUserStore;

    const ADMIN: &str = "1000";

    fn uid(s: &str) -> UserId {
        UserId::parse(s).unwrap()
    }

    fn controller() -> AccessController {
        AccessController::new(Arc::new(InMemoryUserStore::new()), Some(uid(ADMIN)), 2)
    }

    #[test]
    fn unknown_user_is_an_error() {
        let ac = controller();
        assert!(matches!(ac.authorize(&uid("5")), Err(SignalError::UnknownUser(_))));
        assert!(matches!(ac.charge(&uid("5")), Err(SignalError::UnknownUser(_))));
    }

    #[test]
    fn quota_allows_exactly_the_limit() {
        let ac = controller();
        let u = uid("5");
        ac.register(&u, "bob");

        for _ in 0..2 {
            assert_eq!(ac.authorize(&u).unwrap(), AccessDecision::Permit);
            ac.charge(&u).unwrap();
        }
        assert_eq!(
            ac.authorize(&u).unwrap(),
            AccessDecision::Deny(DenyReason::QuotaExceeded)
        );
        assert_eq!(ac.account(&u).unwrap().free_signals_used, 2);
    }

    #[test]
    fn authorize_does_not_mutate() {
        let ac = controller();
        let u = uid("5");
        ac.register(&u, "bob");
        for _ in 0..10 {
            ac.authorize(&u).unwrap();
        }
        assert_eq!(ac.account(&u).unwrap().free_signals_used, 0);
    }

    #[test]
    fn register_twice_keeps_state() {
        let ac = controller();
        let u = uid("5");
        ac.register(&u, "bob");
        ac.charge(&u).unwrap();
        let again = ac.register(&u, "robert");
        assert_eq!(again.display_name, "bob");
        assert_eq!(again.free_signals_used, 1);
        assert!(!again.subscribed);
        assert_eq!(ac.user_count(), 1);
    }

    #[test]
    fn admin_is_self_healing_on_register() {
        let store = Arc::new(InMemoryUserStore::new());
        let ac = AccessController::new(store.clone(), Some(uid(ADMIN)), 2);

        store.upsert(UserAccount::new(uid(ADMIN), "ops"), &mut |a| a.free_signals_used = 7);

        let acct = ac.register(&uid(ADMIN), "ops");
        assert!(acct.subscribed);
        assert_eq!(acct.free_signals_used, 0);
    }

    #[test]
    fn admin_never_blocked_or_charged() {
        let store = Arc::new(InMemoryUserStore::new());
        let ac = AccessController::new(store.clone(), Some(uid(ADMIN)), 2);
        let admin = uid(ADMIN);

        // Even an unregistered, unsubscribed admin record is exempt.
        assert_eq!(ac.authorize(&admin).unwrap(), AccessDecision::Permit);

        store.upsert(UserAccount::new(admin.clone(), "ops"), &mut |a| a.free_signals_used = 99);
        for _ in 0..5 {
            assert_eq!(ac.authorize(&admin).unwrap(), AccessDecision::Permit);
            ac.charge(&admin).unwrap();
        }
        assert_eq!(ac.account(&admin).unwrap().free_signals_used, 99);
    }

    #[tokio::test]
    async fn activation_resets_usage_and_lifts_quota() {
        let ac = controller();
        let u = uid("5");
        ac.register(&u, "bob");
        ac.charge(&u).unwrap();
        ac.charge(&u).unwrap();
        assert!(matches!(ac.authorize(&u).unwrap(), AccessDecision::Deny(_)));

        let acct = ac.activate_subscription(&u).await;
        assert!(acct.subscribed);
        assert_eq!(acct.free_signals_used, 0);

        for _ in 0..10 {
            assert_eq!(ac.authorize(&u).unwrap(), AccessDecision::Permit);
            ac.charge(&u).unwrap();
        }
        assert_eq!(ac.account(&u).unwrap().free_signals_used, 0);

        let again = ac.activate_subscription(&u).await;
        assert!(again.subscribed);
    }

    #[tokio::test]
    async fn activation_creates_unknown_account() {
        let ac = controller();
        let acct = ac.activate_subscription(&uid("77")).await;
        assert!(acct.subscribed);
        assert_eq!(ac.user_count(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn locked_authorize_charge_never_overspends() {
        let ac = Arc::new(controller());
        let u = uid("5");
        ac.register(&u, "bob");

        let mut handles = Vec::new();
        for _ in 0..16 {
            let ac = ac.clone();
            let u = u.clone();
            handles.push(tokio::spawn(async move {
                let _guard = ac.lock_user(&u).await;
                if ac.authorize(&u).unwrap() == AccessDecision::Permit {
                    tokio::task::yield_now().await;
                    ac.charge(&u).unwrap();
                    true
                } else {
                    false
                }
            }));
        }

        let mut served = 0;
        for h in handles {
            if h.await.unwrap() {
                served += 1;
            }
        }
        assert_eq!(served, 2);
        assert_eq!(ac.account(&u).unwrap().free_signals_used, 2);
    }

    #[tokio::test]
    async fn lock_entries_are_dropped_with_their_last_holder() {
        let ac = controller();
        for i in 0..50 {
            let _guard = ac.lock_user(&uid(&format!("guest_{i}"))).await;
        }
        assert_eq!(ac.tracked_locks(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn lock_entry_survives_while_contended() {
        let ac = Arc::new(controller());
        let u = uid("5");

        let first = ac.lock_user(&u).await;
        let (release, released) = tokio::sync::oneshot::channel::<()>();
        let waiter = {
            let ac = ac.clone();
            let u = u.clone();
            tokio::spawn(async move {
                let _second = ac.lock_user(&u).await;
                let _ = released.await;
            })
        };
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        drop(first);
        assert_eq!(ac.tracked_locks(), 1);

        release.send(()).unwrap();
        waiter.await.unwrap();
        assert_eq!(ac.tracked_locks(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn racing_register_and_activation_keep_both_effects() {
        let ac = Arc::new(controller());

        let mut handles = Vec::new();
        for i in 0..64 {
            let u = uid(&format!("{}", 2000 + i));
            let (ac1, u1) = (ac.clone(), u.clone());
            handles.push(tokio::spawn(async move {
                ac1.register(&u1, "bob");
            }));
            let (ac2, u2) = (ac.clone(), u);
            handles.push(tokio::spawn(async move {
                ac2.activate_subscription(&u2).await;
            }));
        }
        for h in handles {
            h.await.unwrap();
        }

        for i in 0..64 {
            let acct = ac.account(&uid(&format!("{}", 2000 + i))).unwrap();
            assert!(acct.subscribed);
            assert_eq!(acct.display_name, "bob");
            assert_eq!(acct.free_signals_used, 0);
        }
    }

    #[tokio::test]
    async fn exemption_follows_admin_and_subscription() {
        let ac = controller();
        let u = uid("5");
        assert!(ac.is_quota_exempt(&uid(ADMIN)));
        assert!(!ac.is_quota_exempt(&u));
        ac.register(&u, "bob");
        assert!(!ac.is_quota_exempt(&u));
        ac.activate_subscription(&u).await;
        assert!(ac.is_quota_exempt(&u));
    }
}

// =============================================================================
// User Store — account table behind a swappable interface
// =============================================================================
//
// The access controller is the only writer. The in-memory store keeps state
// for the process lifetime; a persistent store only has to honour the same
// operations, with `upsert` and `increment_with_ceiling` atomic per key.
// =============================================================================

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;

use crate::types::UserId;

/// One requester.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UserAccount {
    pub id: UserId,
    pub display_name: String,
    /// Free signals consumed. Only ever reset by subscription activation.
    pub free_signals_used: u32,
    pub subscribed: bool,
    pub created_at: DateTime<Utc>,
}

impl UserAccount {
    /// Fresh, unsubscribed account with zero usage.
    pub fn new(id: UserId, display_name: impl Into<String>) -> Self {
        Self {
            id,
            display_name: display_name.into(),
            free_signals_used: 0,
            subscribed: false,
            created_at: Utc::now(),
        }
    }
}

/// Result of [`UserStore::increment_with_ceiling`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Increment {
    /// Usage was bumped; carries the new count.
    Applied(u32),
    /// Usage already sits at the ceiling; carries the unchanged count.
    AtCeiling(u32),
    Missing,
}

pub trait UserStore: Send + Sync {
    fn get(&self, id: &UserId) -> Option<UserAccount>;

    /// Apply `update` to the account under `fresh.id`, inserting `fresh`
    /// first when there is none. Atomic per key. Returns the stored account
    /// and whether it was created.
    fn upsert(&self, fresh: UserAccount, update: &mut dyn FnMut(&mut UserAccount)) -> (UserAccount, bool);

    /// Atomically add one to `free_signals_used` unless it is already
    /// `>= ceiling`.
    fn increment_with_ceiling(&self, id: &UserId, ceiling: u32) -> Increment;

    fn len(&self) -> usize;
}

/// Process-lifetime store.
#[derive(Default)]
pub struct InMemoryUserStore {
    accounts: RwLock<HashMap<UserId, UserAccount>>,
}

impl InMemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl UserStore for InMemoryUserStore {
    fn get(&self, id: &UserId) -> Option<UserAccount> {
        self.accounts.read().get(id).cloned()
    }

    fn upsert(&self, fresh: UserAccount, update: &mut dyn FnMut(&mut UserAccount)) -> (UserAccount, bool) {
        let mut accounts = self.accounts.write();
        let created = !accounts.contains_key(&fresh.id);
        let acct = accounts.entry(fresh.id.clone()).or_insert(fresh);
        update(acct);
        (acct.clone(), created)
    }

    fn increment_with_ceiling(&self, id: &UserId, ceiling: u32) -> Increment {
        let mut accounts = self.accounts.write();
        match accounts.get_mut(id) {
            None => Increment::Missing,
            Some(acct) if acct.free_signals_used >= ceiling => Increment::AtCeiling(acct.free_signals_used),
            Some(acct) => {
                acct.free_signals_used += 1;
                Increment::Applied(acct.free_signals_used)
            }
        }
    }

    fn len(&self) -> usize {
        self.accounts.read().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn uid(s: &str) -> UserId {
        UserId::parse(s).unwrap()
    }

    #[test]
    fn upsert_keeps_existing_fields() {
        let store = InMemoryUserStore::new();
        let (_, created) = store.upsert(UserAccount::new(uid("1"), "alice"), &mut |_| {});
        assert!(created);

        let (acct, created) = store.upsert(UserAccount::new(uid("1"), ""), &mut |a| a.subscribed = true);
        assert!(!created);
        assert_eq!(acct.display_name, "alice");
        assert!(acct.subscribed);
        assert_eq!(store.get(&uid("1")).unwrap(), acct);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn upsert_applies_update_to_fresh_account() {
        let store = InMemoryUserStore::new();
        let (acct, created) = store.upsert(UserAccount::new(uid("2"), "bob"), &mut |a| a.free_signals_used = 5);
        assert!(created);
        assert_eq!(acct.free_signals_used, 5);
        assert_eq!(acct.display_name, "bob");
    }

    #[test]
    fn increment_stops_at_ceiling() {
        let store = InMemoryUserStore::new();
        store.upsert(UserAccount::new(uid("1"), ""), &mut |_| {});
        assert_eq!(store.increment_with_ceiling(&uid("1"), 2), Increment::Applied(1));
        assert_eq!(store.increment_with_ceiling(&uid("1"), 2), Increment::Applied(2));
        assert_eq!(store.increment_with_ceiling(&uid("1"), 2), Increment::AtCeiling(2));
        assert_eq!(store.get(&uid("1")).unwrap().free_signals_used, 2);
    }

    #[test]
    fn increment_on_missing_account() {
        let store = InMemoryUserStore::new();
        assert_eq!(store.increment_with_ceiling(&uid("404"), 2), Increment::Missing);
        assert_eq!(store.len(), 0);
    }
}

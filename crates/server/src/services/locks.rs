//! Per-user mutual exclusion.
//!
//! Checkout and cart mutations for one user run one at a time; different
//! users never wait on each other.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, Weak};

use ai_store_core::Email;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Map size above which dead entries are pruned on the next lock.
const PRUNE_THRESHOLD: usize = 1024;

/// Registry of per-user async locks.
///
/// Entries are held weakly, so a user's lock lives only while someone holds
/// or waits for it.
#[derive(Debug, Default)]
pub struct UserLocks {
    locks: Mutex<HashMap<String, Weak<AsyncMutex<()>>>>,
}

impl UserLocks {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `user`'s cart.
    pub async fn lock(&self, user: &Email) -> OwnedMutexGuard<()> {
        self.entry(user).lock_owned().await
    }

    fn entry(&self, user: &Email) -> Arc<AsyncMutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);

        if let Some(lock) = locks.get(user.as_str()).and_then(Weak::upgrade) {
            return lock;
        }

        if locks.len() >= PRUNE_THRESHOLD {
            locks.retain(|_, lock| lock.strong_count() > 0);
        }

        let lock = Arc::new(AsyncMutex::new(()));
        locks.insert(user.as_str().to_owned(), Arc::downgrade(&lock));
        lock
    }

    /// Number of users with a live lock.
    #[must_use]
    pub fn active(&self) -> usize {
        self.locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .filter(|lock| lock.strong_count() > 0)
            .count()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn email(s: &str) -> Email {
        Email::parse(s).unwrap()
    }

    #[tokio::test]
    async fn test_same_user_is_exclusive() {
        let locks = UserLocks::new();
        let alice = email("alice@store.kr");

        let guard = locks.lock(&alice).await;
        let blocked = tokio::time::timeout(Duration::from_millis(50), locks.lock(&alice)).await;
        assert!(blocked.is_err());

        drop(guard);
        let again = tokio::time::timeout(Duration::from_millis(50), locks.lock(&alice)).await;
        assert!(again.is_ok());
    }

    #[tokio::test]
    async fn test_different_users_do_not_block() {
        let locks = UserLocks::new();
        let _alice = locks.lock(&email("alice@store.kr")).await;

        let bob = tokio::time::timeout(
            Duration::from_millis(50),
            locks.lock(&email("bob@store.kr")),
        )
        .await;
        assert!(bob.is_ok());
    }

    #[tokio::test]
    async fn test_released_locks_are_dropped() {
        let locks = UserLocks::new();
        {
            let _guard = locks.lock(&email("alice@store.kr")).await;
            assert_eq!(locks.active(), 1);
        }
        assert_eq!(locks.active(), 0);
    }
}

//! Per-user serialization of scheduler operations.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::types::UserId;

/// Idle entries are dropped once the table grows past this many users.
const PRUNE_THRESHOLD: usize = 1024;

/// One async mutex per user. Operations for different users never contend.
#[derive(Default)]
pub struct UserLocks {
    locks: DashMap<UserId, Arc<Mutex<()>>>,
}

impl UserLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `user`'s scheduling state.
    pub async fn lock(&self, user: UserId) -> OwnedMutexGuard<()> {
        let lock = self.locks.entry(user).or_default().clone();
        if self.locks.len() > PRUNE_THRESHOLD {
            self.prune();
        }
        lock.lock_owned().await
    }

    /// Drop the mutexes nobody holds or waits on. Returns how many were removed.
    pub fn prune(&self) -> usize {
        let before = self.locks.len();
        self.locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        before.saturating_sub(self.locks.len())
    }

    /// Number of users with a live entry.
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}

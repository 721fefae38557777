//! Per-user mutual exclusion around token refresh.
//!
//! MercadoLibre refresh tokens are single use, so two requests refreshing the
//! same account concurrently would leave one of them holding a dead token.
//! Callers take the user's lock, re-read the token, and only refresh if it is
//! still expiring. Coordination is in-process only.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

#[derive(Default)]
pub struct RefreshLocks {
    locks: Mutex<HashMap<i64, Arc<Mutex<()>>>>,
}

impl RefreshLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive refresh rights on `user_id`; released on drop.
    pub async fn acquire(&self, user_id: i64) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().await;
            // Drop entries nobody holds or waits on.
            locks.retain(|id, l| *id == user_id || Arc::strong_count(l) > 1);
            locks.entry(user_id).or_default().clone()
        };
        lock.lock_owned().await
    }

    pub async fn tracked(&self) -> usize {
        self.locks.lock().await.len()
    }
}

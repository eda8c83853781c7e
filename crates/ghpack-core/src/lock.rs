//! Per-target mutual exclusion.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::OwnedMutexGuard;

/// Registry of async locks keyed by resource name.
///
/// Runs for the same name share `<storage>/<name>` and `<storage>/<name>.zip`,
/// so they must not interleave. Runs for different names never contend.
#[derive(Debug, Default)]
pub struct TargetLocks {
    inner: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

/// Held for the duration of one run; releases the name on drop.
#[derive(Debug)]
pub struct TargetGuard {
    _guard: OwnedMutexGuard<()>,
}

impl TargetLocks {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait until no other run holds `name`, then hold it.
    pub async fn acquire(&self, name: &str) -> TargetGuard {
        let lock = {
            let mut map = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
            // Drop entries nobody holds or waits on.
            map.retain(|_, m| Arc::strong_count(m) > 1);
            Arc::clone(map.entry(name.to_string()).or_default())
        };

        TargetGuard {
            _guard: lock.lock_owned().await,
        }
    }

    #[cfg(test)]
    fn active(&self) -> usize {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .filter(|m| Arc::strong_count(m) > 1)
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_same_name_waits() {
        let locks = Arc::new(TargetLocks::new());
        let first = locks.acquire("hello").await;

        let locks2 = Arc::clone(&locks);
        let waiter = tokio::spawn(async move {
            let _g = locks2.acquire("hello").await;
        });

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!waiter.is_finished());

        drop(first);
        tokio::time::timeout(Duration::from_secs(5), waiter)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_different_names_do_not_contend() {
        let locks = TargetLocks::new();
        let _a = locks.acquire("a").await;
        let _b = tokio::time::timeout(Duration::from_secs(1), locks.acquire("b"))
            .await
            .unwrap();
        assert_eq!(locks.active(), 2);
    }

    #[tokio::test]
    async fn test_released_names_are_pruned() {
        let locks = TargetLocks::new();
        drop(locks.acquire("a").await);
        drop(locks.acquire("b").await);
        assert_eq!(locks.active(), 0);
        assert!(locks.inner.lock().unwrap().len() <= 1);
    }
}

//! Per-key asynchronous mutual exclusion with optional self-termination.
//!
//! A self-terminating key serves exactly one critical section: when its first
//! holder exits, every pending and future `enter` on that key passes through
//! without waiting. This turns "compute once, then read the cache" into a
//! lock that costs nothing after warm-up. Terminated entries are removed by
//! [`KeyedLock::sweep`], usually driven by [`KeyedLock::spawn_sweeper`].

use std::fmt;
use std::hash::Hash;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

struct LockEntry {
    semaphore: Arc<Semaphore>,
    self_terminating: bool,
    terminated: AtomicBool,
}

impl LockEntry {
    fn new(self_terminating: bool) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(1)),
            self_terminating,
            terminated: AtomicBool::new(false),
        }
    }

    fn is_terminated(&self) -> bool {
        self.terminated.load(Ordering::Acquire)
    }

    // Closing the semaphore wakes every waiter with an error, which `enter`
    // treats as passage.
    fn terminate(&self) {
        self.terminated.store(true, Ordering::Release);
        self.semaphore.close();
    }
}

/// Registry of per-key binary semaphores.
pub struct KeyedLock<K> {
    entries: DashMap<K, Arc<LockEntry>>,
}

impl<K> Default for KeyedLock<K>
where
    K: Eq + Hash,
{
    fn default() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }
}

impl<K> fmt::Debug for KeyedLock<K>
where
    K: Eq + Hash,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyedLock")
            .field("entries", &self.entries.len())
            .finish()
    }
}

impl<K> KeyedLock<K>
where
    K: Eq + Hash + Send + Sync + 'static,
{
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Enters the critical section of `key`.
    ///
    /// The mode of the first `enter` on a key wins; `self_terminating` is
    /// ignored for a key that already has an entry.
    pub async fn enter(&self, key: K, self_terminating: bool) -> KeyedLockGuard {
        let entry = Arc::clone(
            self.entries
                .entry(key)
                .or_insert_with(|| Arc::new(LockEntry::new(self_terminating)))
                .value(),
        );

        if entry.is_terminated() {
            return KeyedLockGuard::passthrough(entry);
        }

        match Arc::clone(&entry.semaphore).acquire_owned().await {
            Ok(permit) => KeyedLockGuard {
                entry,
                permit: Some(permit),
            },
            Err(_closed) => KeyedLockGuard::passthrough(entry),
        }
    }

    /// Whether `key` has an entry that has been terminated but not swept yet.
    #[must_use]
    pub fn is_terminated(&self, key: &K) -> bool {
        self.entries
            .get(key)
            .is_some_and(|entry| entry.is_terminated())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Removes terminated entries; returns how many were removed.
    pub fn sweep(&self) -> usize {
        let mut removed = 0;
        self.entries.retain(|_, entry| {
            let keep = !entry.is_terminated();
            if !keep {
                removed += 1;
            }
            keep
        });
        removed
    }

    /// Runs [`sweep`](Self::sweep) every `period` until `cancel` fires.
    pub fn spawn_sweeper(self: &Arc<Self>, period: Duration, cancel: CancellationToken) -> JoinHandle<()> {
        let locks = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // first tick completes immediately
            ticker.tick().await;

            loop {
                tokio::select! {
                    () = cancel.cancelled() => {
                        tracing::debug!("keyed lock sweeper stopped");
                        break;
                    }
                    _ = ticker.tick() => {
                        let removed = locks.sweep();
                        if removed > 0 {
                            tracing::debug!(removed, remaining = locks.len(), "swept terminated keyed locks");
                        }
                    }
                }
            }
        })
    }
}

/// Holder of a key's critical section; exits on drop.
#[must_use = "the critical section ends as soon as the guard is dropped"]
pub struct KeyedLockGuard {
    entry: Arc<LockEntry>,
    permit: Option<OwnedSemaphorePermit>,
}

impl KeyedLockGuard {
    fn passthrough(entry: Arc<LockEntry>) -> Self {
        Self {
            entry,
            permit: None,
        }
    }

    /// `false` when the key was already terminated and nothing was held.
    #[must_use]
    pub const fn is_exclusive(&self) -> bool {
        self.permit.is_some()
    }

    pub fn exit(self) {
        drop(self);
    }
}

impl Drop for KeyedLockGuard {
    fn drop(&mut self) {
        if let Some(permit) = self.permit.take() {
            if self.entry.self_terminating {
                self.entry.terminate();
            }
            drop(permit);
        }
    }
}

impl fmt::Debug for KeyedLockGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyedLockGuard")
            .field("exclusive", &self.is_exclusive())
            .field("self_terminating", &self.entry.self_terminating)
            .finish()
    }
}

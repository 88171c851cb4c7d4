use std::sync::Mutex;
use std::sync::MutexGuard;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::error;

static POISON_RECOVERY_COUNT: AtomicU64 = AtomicU64::new(0);

/// Number of times a poisoned lock was recovered since process start.
pub fn poison_recovery_count() -> u64 {
    POISON_RECOVERY_COUNT.load(Ordering::Relaxed)
}

/// Locks `lock`, recovering the inner state if a previous holder panicked.
///
/// `name` identifies the lock in the error log so a recovery can be traced
/// back to the bridge state or the snapshot registry.
pub fn mutex_lock_or_recover<'a, T>(lock: &'a Mutex<T>, name: &'static str) -> MutexGuard<'a, T> {
    lock.lock().unwrap_or_else(|poisoned| {
        POISON_RECOVERY_COUNT.fetch_add(1, Ordering::Relaxed);
        error!(
            lock = name,
            "Mutex poisoned - a task panicked while holding this lock; recovering inner state"
        );
        poisoned.into_inner()
    })
}

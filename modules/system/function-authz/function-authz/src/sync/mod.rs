pub mod keyed_lock;

pub use keyed_lock::{DEFAULT_SWEEP_INTERVAL, KeyedLock, KeyedLockGuard};

//! Lock helpers shared by the bus, the dispatch buffer and the memory hub.

use std::sync::{Mutex, MutexGuard};

/// Acquire mutex guard, ignoring poisoning.
///
/// Every guarded value in this crate stays consistent across a panic (pushes,
/// takes and state swaps), so a poisoned lock is still safe to use.
pub(crate) fn lock_ignore_poison<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    match m.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

use std::sync::{Mutex, MutexGuard, PoisonError};

pub trait MutexExt<T> {
    /// Locks, recovering the data of a poisoned mutex. Guarded state here is
    /// plain data that is never left half-updated across a panic.
    fn locked(&self) -> MutexGuard<'_, T>;
}

impl<T> MutexExt<T> for Mutex<T> {
    fn locked(&self) -> MutexGuard<'_, T> {
        self.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

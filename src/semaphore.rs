use std::{
    sync::{Condvar, Mutex, PoisonError},
    time::Duration,
};

/// Counting semaphore built from a mutex-guarded counter and a condition
/// variable, with a bounded acquire so callers can re-check for shutdown.
pub struct Semaphore {
    value: Mutex<usize>,
    cond_var: Condvar,
}

impl Semaphore {
    pub fn new(value: usize) -> Self {
        Self {
            value: Mutex::new(value),
            cond_var: Condvar::new(),
        }
    }

    /// Takes one permit, waiting at most `timeout` for it to show up.
    /// Returns `false` if the wait timed out without taking a permit.
    pub fn acquire_timeout(&self, timeout: Duration) -> bool {
        let guard = self.value.lock().unwrap_or_else(PoisonError::into_inner);
        let (mut guard, _) = self
            .cond_var
            .wait_timeout_while(guard, timeout, |value| *value == 0)
            .unwrap_or_else(PoisonError::into_inner);
        if *guard == 0 {
            return false;
        }
        *guard -= 1;
        true
    }

    pub fn release(&self) {
        *self.value.lock().unwrap_or_else(PoisonError::into_inner) += 1;
        self.cond_var.notify_one();
    }

    /// Permits currently free to take.
    pub fn available(&self) -> usize {
        *self.value.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for Semaphore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Semaphore")
            .field("available", &self.available())
            .finish()
    }
}

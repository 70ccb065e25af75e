use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Condvar, Mutex, PoisonError,
    },
    time::Duration,
};

struct Inner {
    set: AtomicBool,
    lock: Mutex<()>,
    cond_var: Condvar,
}

/// One-way cancellation flag shared by every worker of a session.
///
/// Cloning hands out another handle to the same flag. Once `set` has been
/// called the flag stays set for as long as any handle lives.
#[derive(Clone)]
pub struct StopSignal {
    inner: Arc<Inner>,
}

impl StopSignal {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                set: AtomicBool::new(false),
                lock: Mutex::new(()),
                cond_var: Condvar::new(),
            }),
        }
    }

    /// Raises the flag. Calling it more than once has no further effect.
    pub fn set(&self) {
        if self.inner.set.swap(true, Ordering::Release) {
            return;
        }
        // taking the lock orders the store before any sleeper re-checks
        let _guard = self
            .inner
            .lock
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        self.inner.cond_var.notify_all();
    }

    pub fn is_set(&self) -> bool {
        self.inner.set.load(Ordering::Acquire)
    }

    /// Sleeps for `duration` unless the flag is raised first.
    ///
    /// Returns `true` when the full duration elapsed and `false` when the
    /// sleep was cut short by the signal.
    pub fn sleep(&self, duration: Duration) -> bool {
        let guard = self
            .inner
            .lock
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let (_guard, _) = self
            .inner
            .cond_var
            .wait_timeout_while(guard, duration, |_| !self.is_set())
            .unwrap_or_else(PoisonError::into_inner);
        !self.is_set()
    }
}

impl Default for StopSignal {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for StopSignal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StopSignal")
            .field("set", &self.is_set())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::{thread, time::Instant};

    use super::*;

    #[test]
    fn test_set_is_one_way() {
        let stop = StopSignal::new();
        assert!(!stop.is_set());
        stop.set();
        stop.set();
        assert!(stop.is_set());
        assert!(stop.clone().is_set());
    }

    #[test]
    fn test_sleep_runs_full_duration_when_unset() {
        let stop = StopSignal::new();
        let start = Instant::now();
        assert!(stop.sleep(Duration::from_millis(30)));
        assert!(start.elapsed() >= Duration::from_millis(30));
    }

    #[test]
    fn test_sleep_wakes_on_set() {
        let stop = StopSignal::new();
        let start = Instant::now();
        thread::scope(|s| {
            s.spawn(|| {
                thread::sleep(Duration::from_millis(20));
                stop.set();
            });
            assert!(!stop.sleep(Duration::from_secs(10)));
        });
        assert!(start.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn test_sleep_after_set_returns_immediately() {
        let stop = StopSignal::new();
        stop.set();
        let start = Instant::now();
        assert!(!stop.sleep(Duration::from_secs(10)));
        assert!(start.elapsed() < Duration::from_secs(1));
    }
}

use std::{
    collections::VecDeque,
    sync::{Condvar, Mutex, MutexGuard, PoisonError},
    time::Duration,
};

use super::BoundedBuffer;
use crate::{
    error::{Cancelled, ConfigError},
    stop::StopSignal,
};

/// Bounded buffer guarded by one mutex and two condition variables.
///
/// Waits on `not_full`/`not_empty` are capped at `poll_interval` so a
/// blocked caller notices the stop signal even if nobody notifies it.
pub struct MonitorBuffer<T> {
    capacity: usize,
    poll_interval: Duration,
    queue: Mutex<VecDeque<T>>,
    not_full: Condvar,
    not_empty: Condvar,
}

impl<T> MonitorBuffer<T> {
    pub fn new(capacity: usize, poll_interval: Duration) -> Result<Self, ConfigError> {
        if capacity == 0 {
            return Err(ConfigError::ZeroCapacity);
        }
        Ok(Self {
            capacity,
            poll_interval,
            queue: Mutex::new(VecDeque::with_capacity(capacity)),
            not_full: Condvar::new(),
            not_empty: Condvar::new(),
        })
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<T>> {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn wait<'a>(
        &self,
        cond_var: &Condvar,
        guard: MutexGuard<'a, VecDeque<T>>,
    ) -> MutexGuard<'a, VecDeque<T>> {
        let (guard, _) = cond_var
            .wait_timeout(guard, self.poll_interval)
            .unwrap_or_else(PoisonError::into_inner);
        guard
    }
}

impl<T: Send> BoundedBuffer<T> for MonitorBuffer<T> {
    fn put(&self, item: T, stop: &StopSignal) -> Result<usize, Cancelled> {
        let mut queue = self.lock();
        loop {
            if stop.is_set() {
                tracing::trace!("monitor put cancelled");
                return Err(Cancelled);
            }
            if queue.len() < self.capacity {
                break;
            }
            queue = self.wait(&self.not_full, queue);
        }

        queue.push_back(item);
        let len = queue.len();
        debug_assert!(len <= self.capacity, "monitor buffer over capacity");
        self.not_empty.notify_one();
        Ok(len)
    }

    fn get(&self, stop: &StopSignal) -> Result<T, Cancelled> {
        let mut queue = self.lock();
        let item = loop {
            if stop.is_set() {
                tracing::trace!("monitor get cancelled");
                return Err(Cancelled);
            }
            if let Some(item) = queue.pop_front() {
                break item;
            }
            queue = self.wait(&self.not_empty, queue);
        };

        self.not_full.notify_one();
        Ok(item)
    }

    fn len(&self) -> usize {
        self.lock().len()
    }

    fn capacity(&self) -> usize {
        self.capacity
    }

    fn contents(&self) -> Vec<T>
    where
        T: Clone,
    {
        self.lock().iter().cloned().collect()
    }
}

use std::{
    cell::UnsafeCell,
    collections::VecDeque,
    ops::{Deref, DerefMut},
    time::Duration,
};

use super::BoundedBuffer;
use crate::{
    error::{Cancelled, ConfigError},
    semaphore::Semaphore,
    stop::StopSignal,
};

/// Bounded buffer coordinated by three counting semaphores.
///
/// `empty_slots` starts at capacity, `filled_slots` at zero, and `mutex` is a
/// binary semaphore that owns the queue. A caller that is cancelled after
/// taking a slot permit hands that permit back before returning, so
/// `empty_slots + filled_slots + in-flight operations == capacity` always holds.
pub struct SemaphoreBuffer<T> {
    capacity: usize,
    poll_interval: Duration,
    empty_slots: Semaphore,
    filled_slots: Semaphore,
    mutex: Semaphore,
    queue: UnsafeCell<VecDeque<T>>,
}

// The queue is only reached through a QueueGuard, which holds the single
// `mutex` permit.
unsafe impl<T: Send> Sync for SemaphoreBuffer<T> {}

/// Free and filled permit counts next to the queue length.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PermitSnapshot {
    pub empty_slots: usize,
    pub filled_slots: usize,
    pub len: usize,
}

impl PermitSnapshot {
    /// True when no permit has leaked. Only meaningful while no put or get
    /// is between its two acquires or between its release calls.
    pub fn is_conserved(&self, capacity: usize) -> bool {
        self.empty_slots + self.filled_slots == capacity && self.filled_slots == self.len
    }
}

struct QueueGuard<'a, T> {
    buffer: &'a SemaphoreBuffer<T>,
}

impl<T> Deref for QueueGuard<'_, T> {
    type Target = VecDeque<T>;

    fn deref(&self) -> &Self::Target {
        unsafe { &*self.buffer.queue.get() }
    }
}

impl<T> DerefMut for QueueGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        unsafe { &mut *self.buffer.queue.get() }
    }
}

impl<T> Drop for QueueGuard<'_, T> {
    fn drop(&mut self) {
        self.buffer.mutex.release();
    }
}

impl<T> SemaphoreBuffer<T> {
    pub fn new(capacity: usize, poll_interval: Duration) -> Result<Self, ConfigError> {
        if capacity == 0 {
            return Err(ConfigError::ZeroCapacity);
        }
        Ok(Self {
            capacity,
            poll_interval,
            empty_slots: Semaphore::new(capacity),
            filled_slots: Semaphore::new(0),
            mutex: Semaphore::new(1),
            queue: UnsafeCell::new(VecDeque::with_capacity(capacity)),
        })
    }

    /// Retries a bounded acquire on `sem` until it succeeds or `stop` is set.
    fn acquire(&self, sem: &Semaphore, stop: &StopSignal) -> bool {
        while !stop.is_set() {
            if sem.acquire_timeout(self.poll_interval) {
                return true;
            }
        }
        false
    }

    fn lock(&self, stop: &StopSignal) -> Option<QueueGuard<'_, T>> {
        if self.acquire(&self.mutex, stop) {
            Some(QueueGuard { buffer: self })
        } else {
            None
        }
    }

    fn lock_uncancellable(&self) -> QueueGuard<'_, T> {
        while !self.mutex.acquire_timeout(self.poll_interval) {}
        QueueGuard { buffer: self }
    }

    pub fn permits(&self) -> PermitSnapshot {
        let queue = self.lock_uncancellable();
        PermitSnapshot {
            empty_slots: self.empty_slots.available(),
            filled_slots: self.filled_slots.available(),
            len: queue.len(),
        }
    }
}

impl<T: Send> BoundedBuffer<T> for SemaphoreBuffer<T> {
    fn put(&self, item: T, stop: &StopSignal) -> Result<usize, Cancelled> {
        if !self.acquire(&self.empty_slots, stop) {
            tracing::trace!("semaphore put cancelled waiting for a free slot");
            return Err(Cancelled);
        }
        let Some(mut queue) = self.lock(stop) else {
            self.empty_slots.release();
            tracing::trace!("semaphore put cancelled waiting for the mutex");
            return Err(Cancelled);
        };

        queue.push_back(item);
        let len = queue.len();
        debug_assert!(len <= self.capacity, "semaphore buffer over capacity");
        drop(queue);
        self.filled_slots.release();
        Ok(len)
    }

    fn get(&self, stop: &StopSignal) -> Result<T, Cancelled> {
        if !self.acquire(&self.filled_slots, stop) {
            tracing::trace!("semaphore get cancelled waiting for an item");
            return Err(Cancelled);
        }
        let Some(mut queue) = self.lock(stop) else {
            self.filled_slots.release();
            tracing::trace!("semaphore get cancelled waiting for the mutex");
            return Err(Cancelled);
        };

        let Some(item) = queue.pop_front() else {
            panic!("filled-slot permit taken from an empty semaphore buffer");
        };
        drop(queue);
        self.empty_slots.release();
        Ok(item)
    }

    fn len(&self) -> usize {
        self.lock_uncancellable().len()
    }

    fn capacity(&self) -> usize {
        self.capacity
    }

    fn contents(&self) -> Vec<T>
    where
        T: Clone,
    {
        self.lock_uncancellable().iter().cloned().collect()
    }
}

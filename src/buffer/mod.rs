//! Bounded FIFO buffers shared between producer and consumer threads.
//!
//! Two disciplines implement the same [`BoundedBuffer`] contract:
//!
//! - [`MonitorBuffer`]: one mutex, two condition variables (not-full, not-empty).
//! - [`SemaphoreBuffer`]: three counting semaphores (empty slots, filled slots,
//!   binary mutex).
//!
//! Neither discipline has a wait that an outside flag can interrupt, so every
//! blocking wait is bounded by a poll interval and re-checks the
//! [`StopSignal`] when it wakes up. Cancellation latency is therefore at most
//! about one poll interval.

mod monitor;
mod semaphore;

use std::{fmt, str::FromStr, sync::Arc, time::Duration};

pub use monitor::MonitorBuffer;
pub use semaphore::{PermitSnapshot, SemaphoreBuffer};

use crate::{
    error::{Cancelled, ConfigError},
    stop::StopSignal,
};

/// Capacity-limited FIFO queue with blocking, cancellable `put`/`get`.
///
/// Items come out in exactly the order they went in, across all producers.
/// Which of several blocked producers gets the next free slot (or which
/// blocked consumer gets the next item) is left to the scheduler and is not
/// fair or deterministic in either implementation.
pub trait BoundedBuffer<T>: Send + Sync {
    /// Appends `item`, blocking while the buffer is full.
    ///
    /// Returns the occupancy right after the insert. If `stop` is set before
    /// a slot is secured the item is dropped and `Cancelled` is returned.
    fn put(&self, item: T, stop: &StopSignal) -> Result<usize, Cancelled>;

    /// Removes the head item, blocking while the buffer is empty.
    fn get(&self, stop: &StopSignal) -> Result<T, Cancelled>;

    fn len(&self) -> usize;

    fn capacity(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy of the queued items, head first.
    fn contents(&self) -> Vec<T>
    where
        T: Clone;

    fn status(&self) -> BufferStatus {
        BufferStatus::of(self.len(), self.capacity())
    }
}

/// Coarse fill level of a buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferStatus {
    Empty,
    Available,
    Full,
}

impl BufferStatus {
    pub fn of(len: usize, capacity: usize) -> Self {
        if len == 0 {
            BufferStatus::Empty
        } else if len >= capacity {
            BufferStatus::Full
        } else {
            BufferStatus::Available
        }
    }
}

impl fmt::Display for BufferStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BufferStatus::Empty => f.write_str("Empty"),
            BufferStatus::Available => f.write_str("Available"),
            BufferStatus::Full => f.write_str("Full"),
        }
    }
}

/// Synchronization discipline picked when a session starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Mode {
    Monitor,
    Semaphore,
}

impl Mode {
    pub fn build<T: Send + 'static>(
        self,
        capacity: usize,
        poll_interval: Duration,
    ) -> Result<Arc<dyn BoundedBuffer<T>>, ConfigError> {
        Ok(match self {
            Mode::Monitor => Arc::new(MonitorBuffer::new(capacity, poll_interval)?),
            Mode::Semaphore => Arc::new(SemaphoreBuffer::new(capacity, poll_interval)?),
        })
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Monitor => f.write_str("Monitor"),
            Mode::Semaphore => f.write_str("Semaphore"),
        }
    }
}

impl FromStr for Mode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "monitor" => Ok(Mode::Monitor),
            "semaphore" => Ok(Mode::Semaphore),
            other => Err(format!("unknown mode '{other}', expected monitor or semaphore")),
        }
    }
}

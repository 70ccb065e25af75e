//! Bounded producer/consumer buffer with two interchangeable synchronization
//! disciplines (monitor and counting semaphores), plus the worker loops and
//! session plumbing that drive it.

pub mod buffer;
pub mod config;
pub mod error;
pub mod event;
pub mod semaphore;
pub mod session;
pub mod stop;
pub mod worker;

pub use buffer::{
    BoundedBuffer, BufferStatus, Mode, MonitorBuffer, PermitSnapshot, SemaphoreBuffer,
};
pub use config::{DelayRange, SessionConfig, TimingConfig};
pub use error::{Cancelled, ConfigError, SessionError, SessionResult};
pub use event::{Direction, Event, Item, Role, WorkerId, WorkerState};
pub use session::{Session, Simulator, Snapshot};
pub use stop::StopSignal;
pub use worker::{Counters, TIMELINE_LIMIT};

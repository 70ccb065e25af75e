//! Event records handed to whatever observes a running session.
//!
//! Workers push events through an [`EventSink`] backed by an unbounded
//! crossbeam channel. Sending never blocks, and a sink whose receiver has
//! gone away just drops events, so a slow or absent observer can never
//! stall the buffer.

use std::{fmt, time::Instant};

use crossbeam::channel::{self, Receiver, Sender};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Role {
    Producer,
    Consumer,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Producer => write!(f, "producer"),
            Role::Consumer => write!(f, "consumer"),
        }
    }
}

/// Identity of a worker thread, rendered as `P1`, `C2`, ... (1-based).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WorkerId {
    pub role: Role,
    pub index: usize,
}

impl WorkerId {
    pub fn producer(index: usize) -> Self {
        Self {
            role: Role::Producer,
            index,
        }
    }

    pub fn consumer(index: usize) -> Self {
        Self {
            role: Role::Consumer,
            index,
        }
    }
}

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.role {
            Role::Producer => write!(f, "P{}", self.index),
            Role::Consumer => write!(f, "C{}", self.index),
        }
    }
}

/// Lifecycle of a worker. `Ready` is initial, `Stopped` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WorkerState {
    Ready,
    Running,
    Waiting,
    Stopped,
}

impl fmt::Display for WorkerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            WorkerState::Ready => "Ready",
            WorkerState::Running => "Running",
            WorkerState::Waiting => "Waiting",
            WorkerState::Stopped => "Stopped",
        };
        f.write_str(name)
    }
}

/// Value moved through the buffer: producer identity plus its own sequence
/// number. The sequence says nothing about cross-producer consume order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Item {
    pub producer: WorkerId,
    pub seq: u64,
}

impl fmt::Display for Item {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.producer, self.seq)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Produced,
    Consumed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Item {
        worker: WorkerId,
        direction: Direction,
        label: String,
        at: Instant,
    },
    State {
        worker: WorkerId,
        state: WorkerState,
        at: Instant,
    },
    Occupancy {
        len: usize,
        at: Instant,
    },
}

impl Event {
    pub fn at(&self) -> Instant {
        match self {
            Event::Item { at, .. } | Event::State { at, .. } | Event::Occupancy { at, .. } => *at,
        }
    }
}

#[derive(Clone)]
pub struct EventSink {
    tx: Sender<Event>,
}

pub fn create() -> (EventSink, Receiver<Event>) {
    let (tx, rx) = channel::unbounded();
    (EventSink { tx }, rx)
}

impl EventSink {
    /// Queues `event` for the observer. Returns `false` when the receiver is
    /// gone and the event was discarded.
    pub fn emit(&self, event: Event) -> bool {
        if self.tx.send(event).is_err() {
            tracing::trace!("event receiver dropped, discarding event");
            return false;
        }
        true
    }

    pub fn item(&self, worker: WorkerId, direction: Direction, item: &Item) {
        self.emit(Event::Item {
            worker,
            direction,
            label: item.to_string(),
            at: Instant::now(),
        });
    }

    pub fn state(&self, worker: WorkerId, state: WorkerState) {
        self.emit(Event::State {
            worker,
            state,
            at: Instant::now(),
        });
    }

    pub fn occupancy(&self, len: usize) {
        self.emit(Event::Occupancy {
            len,
            at: Instant::now(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_labels() {
        let p = WorkerId::producer(1);
        assert_eq!(p.to_string(), "P1");
        assert_eq!(WorkerId::consumer(3).to_string(), "C3");
        assert_eq!(Item { producer: p, seq: 4 }.to_string(), "P1-4");
    }

    #[test]
    fn test_sink_delivers_in_order() {
        let (sink, rx) = create();
        let worker = WorkerId::producer(1);
        sink.state(worker, WorkerState::Running);
        sink.item(worker, Direction::Produced, &Item { producer: worker, seq: 1 });
        sink.occupancy(1);

        let events: Vec<_> = rx.try_iter().collect();
        assert_eq!(events.len(), 3);
        assert!(matches!(
            events[0],
            Event::State { state: WorkerState::Running, .. }
        ));
        match &events[1] {
            Event::Item { label, direction, .. } => {
                assert_eq!(label, "P1-1");
                assert_eq!(*direction, Direction::Produced);
            }
            other => panic!("unexpected event {other:?}"),
        }
        assert!(matches!(events[2], Event::Occupancy { len: 1, .. }));
        assert!(events[0].at() <= events[2].at());
    }

    #[test]
    fn test_sink_without_receiver_does_not_block() {
        let (sink, rx) = create();
        assert!(sink.emit(Event::Occupancy {
            len: 0,
            at: Instant::now(),
        }));
        drop(rx);
        for _ in 0..1000 {
            sink.occupancy(0);
        }
        assert!(!sink.emit(Event::Occupancy {
            len: 0,
            at: Instant::now(),
        }));
    }
}

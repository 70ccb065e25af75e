//! Session lifecycle: one buffer, one stop signal, N producers, M consumers.

use std::{
    collections::HashSet,
    sync::Arc,
    thread::JoinHandle,
    time::{Duration, Instant},
};

use crossbeam::channel::{self, Receiver};

use crate::{
    buffer::{BoundedBuffer, BufferStatus, Mode},
    config::SessionConfig,
    error::{SessionError, SessionResult},
    event::{self, Event, EventSink, Item, Role, WorkerId, WorkerState},
    stop::StopSignal,
    worker::{Counters, StateBoard, Worker},
};

/// Point-in-time view of a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    pub mode: Mode,
    pub capacity: usize,
    pub occupancy: usize,
    pub status: BufferStatus,
    pub produced: u64,
    pub consumed: u64,
    pub peak: usize,
    pub workers: Vec<(WorkerId, WorkerState)>,
}

impl Snapshot {
    /// Every worker has stopped and nothing is left in the buffer.
    pub fn is_finished(&self) -> bool {
        self.occupancy == 0
            && self
                .workers
                .iter()
                .all(|(_, state)| *state == WorkerState::Stopped)
    }
}

pub struct Session {
    config: SessionConfig,
    buffer: Arc<dyn BoundedBuffer<Item>>,
    stop: StopSignal,
    counters: Arc<Counters>,
    board: Arc<StateBoard>,
    workers: Vec<WorkerId>,
    handles: Vec<JoinHandle<()>>,
    done: Receiver<WorkerId>,
    stopped: HashSet<WorkerId>,
    // released once every worker is joined, which disconnects the receiver
    sink: Option<EventSink>,
}

impl Session {
    /// Validates `config`, builds the buffer and spawns every worker.
    ///
    /// The returned receiver is the only one. Once it is dropped, workers
    /// discard their events instead of queueing them.
    pub fn start(config: SessionConfig) -> SessionResult<(Self, Receiver<Event>)> {
        config.validate()?;
        let buffer = config
            .mode
            .build::<Item>(config.capacity, config.poll_interval)?;

        let workers: Vec<WorkerId> = (1..=config.producers)
            .map(WorkerId::producer)
            .chain((1..=config.consumers).map(WorkerId::consumer))
            .collect();

        let stop = StopSignal::new();
        let counters = Arc::new(Counters::default());
        let board = Arc::new(StateBoard::new(workers.iter().copied()));
        let (sink, events) = event::create();
        let (done_tx, done) = channel::unbounded();

        let mut session = Self {
            config,
            buffer,
            stop,
            counters,
            board,
            workers: workers.clone(),
            handles: Vec::with_capacity(workers.len()),
            done,
            stopped: HashSet::new(),
            sink: Some(sink.clone()),
        };

        for id in workers {
            let worker = Worker {
                id,
                buffer: Arc::clone(&session.buffer),
                stop: session.stop.clone(),
                delay: config.timing.for_role(id.role),
                events: sink.clone(),
                counters: Arc::clone(&session.counters),
                board: Arc::clone(&session.board),
            };
            match worker.spawn(done_tx.clone()) {
                Ok(handle) => session.handles.push(handle),
                Err(err) => {
                    tracing::error!(worker = %id, error = %err, "failed to spawn worker");
                    session.stop.set();
                    for handle in session.handles.drain(..) {
                        let _ = handle.join();
                    }
                    return Err(SessionError::Spawn(err));
                }
            }
        }

        tracing::info!(
            mode = %config.mode,
            capacity = config.capacity,
            producers = config.producers,
            consumers = config.consumers,
            "simulation started"
        );
        Ok((session, events))
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn buffer(&self) -> &dyn BoundedBuffer<Item> {
        self.buffer.as_ref()
    }

    pub fn is_stopping(&self) -> bool {
        self.stop.is_set()
    }

    /// Every worker has reported `Stopped` to a `stop` call.
    pub fn is_done(&self) -> bool {
        self.stopped.len() == self.workers.len()
    }

    pub fn snapshot(&self) -> Snapshot {
        let occupancy = self.buffer.len();
        Snapshot {
            mode: self.config.mode,
            capacity: self.config.capacity,
            occupancy,
            status: BufferStatus::of(occupancy, self.config.capacity),
            produced: self.counters.produced(),
            consumed: self.counters.consumed(),
            peak: self.counters.peak(),
            workers: self.board.states(),
        }
    }

    pub fn timeline(&self, id: WorkerId) -> Vec<(WorkerState, Instant)> {
        self.board.timeline(id)
    }

    /// Raises the stop signal and waits up to `timeout` for every worker to
    /// reach `Stopped`.
    ///
    /// Calling it again after a timeout keeps waiting for the stragglers.
    /// Once every worker is joined, further calls just return a snapshot.
    pub fn stop(&mut self, timeout: Duration) -> SessionResult<Snapshot> {
        if self.is_done() && self.handles.is_empty() {
            return Ok(self.snapshot());
        }
        if !self.stop.is_set() {
            tracing::info!("stopping simulation");
            self.stop.set();
        }

        let deadline = Instant::now() + timeout;
        while self.stopped.len() < self.workers.len() {
            match self.done.recv_deadline(deadline) {
                Ok(id) => {
                    self.stopped.insert(id);
                }
                Err(_) => break,
            }
        }

        let pending: Vec<WorkerId> = self
            .workers
            .iter()
            .filter(|id| !self.stopped.contains(id))
            .copied()
            .collect();
        if !pending.is_empty() {
            tracing::warn!(?pending, "workers still running after stop timeout");
            return Err(SessionError::StopTimeout { pending });
        }

        for handle in self.handles.drain(..) {
            if handle.join().is_err() {
                tracing::error!("worker thread panicked");
            }
        }

        let snapshot = self.snapshot();
        if let Some(sink) = self.sink.take() {
            sink.occupancy(snapshot.occupancy);
        }
        if snapshot.is_finished() {
            tracing::info!(
                produced = snapshot.produced,
                consumed = snapshot.consumed,
                peak = snapshot.peak,
                "simulation finished"
            );
        } else {
            tracing::info!(
                produced = snapshot.produced,
                consumed = snapshot.consumed,
                left = snapshot.occupancy,
                "simulation stopped with items left in the buffer"
            );
        }
        Ok(snapshot)
    }

    pub fn producers(&self) -> impl Iterator<Item = WorkerId> + '_ {
        self.workers.iter().copied().filter(|id| id.role == Role::Producer)
    }

    pub fn consumers(&self) -> impl Iterator<Item = WorkerId> + '_ {
        self.workers.iter().copied().filter(|id| id.role == Role::Consumer)
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        // workers notice within one poll interval and exit on their own
        self.stop.set();
    }
}

/// Holds at most one session at a time.
pub struct Simulator {
    session: Option<Session>,
    stop_timeout: Duration,
}

impl Default for Simulator {
    fn default() -> Self {
        Self::new(Duration::from_secs(2))
    }
}

impl Simulator {
    pub fn new(stop_timeout: Duration) -> Self {
        Self {
            session: None,
            stop_timeout,
        }
    }

    /// Starts a new session and returns its event receiver.
    ///
    /// Fails with `AlreadyRunning` until every worker of the current session
    /// has stopped, even if a stop is already under way. A finished session
    /// is discarded.
    pub fn start(&mut self, config: SessionConfig) -> SessionResult<Receiver<Event>> {
        if self.is_running() {
            return Err(SessionError::AlreadyRunning);
        }
        let (session, events) = Session::start(config)?;
        self.session = Some(session);
        Ok(events)
    }

    /// Stops the current session. After a `StopTimeout`, calling it again
    /// waits for the remaining workers.
    pub fn stop(&mut self) -> SessionResult<Snapshot> {
        match self.session.as_mut() {
            Some(session) if !session.is_done() => session.stop(self.stop_timeout),
            _ => Err(SessionError::NotRunning),
        }
    }

    /// Stops the current session, if any, and throws its state away.
    pub fn reset(&mut self) -> SessionResult<()> {
        let Some(mut session) = self.session.take() else {
            return Ok(());
        };
        if let Err(err) = session.stop(self.stop_timeout) {
            tracing::warn!(error = %err, "reset before all workers stopped");
            self.session = Some(session);
            return Err(err);
        }
        tracing::info!("simulation reset");
        Ok(())
    }

    /// True while the current session still has workers that have not
    /// stopped.
    pub fn is_running(&self) -> bool {
        self.session.as_ref().is_some_and(|session| !session.is_done())
    }

    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    pub fn snapshot(&self) -> Option<Snapshot> {
        self.session.as_ref().map(Session::snapshot)
    }
}

//! Producer and consumer loops.
//!
//! A worker moves `Ready -> Running -> Waiting -> Running -> ... -> Stopped`.
//! It is `Waiting` only while inside `put`/`get`, and it stops the first time
//! one of those calls is cancelled or the stop signal cuts its pacing sleep.

use std::{
    collections::{HashMap, VecDeque},
    sync::{
        atomic::{AtomicU64, AtomicUsize, Ordering},
        Arc, Mutex, PoisonError,
    },
    thread::{self, JoinHandle},
    time::Instant,
};

use crossbeam::channel::Sender;

use crate::{
    buffer::BoundedBuffer,
    config::DelayRange,
    event::{Direction, EventSink, Item, Role, WorkerId, WorkerState},
    stop::StopSignal,
};

/// Running totals for a session.
#[derive(Debug, Default)]
pub struct Counters {
    produced: AtomicU64,
    consumed: AtomicU64,
    peak: AtomicUsize,
}

impl Counters {
    pub fn record_produced(&self, occupancy: usize) {
        self.produced.fetch_add(1, Ordering::Relaxed);
        self.peak.fetch_max(occupancy, Ordering::Relaxed);
    }

    pub fn record_consumed(&self) {
        self.consumed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn produced(&self) -> u64 {
        self.produced.load(Ordering::Relaxed)
    }

    pub fn consumed(&self) -> u64 {
        self.consumed.load(Ordering::Relaxed)
    }

    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::Relaxed)
    }
}

/// Transitions kept per worker. Older entries are dropped first, so a long
/// session holds a sliding window instead of its whole history.
pub const TIMELINE_LIMIT: usize = 256;

#[derive(Debug, Clone)]
struct WorkerRecord {
    state: WorkerState,
    timeline: VecDeque<(WorkerState, Instant)>,
}

impl WorkerRecord {
    fn new() -> Self {
        Self {
            state: WorkerState::Ready,
            timeline: VecDeque::new(),
        }
    }
}

/// Current state and transition history of every worker in a session.
#[derive(Debug, Default)]
pub struct StateBoard {
    workers: Mutex<HashMap<WorkerId, WorkerRecord>>,
}

impl StateBoard {
    pub fn new(ids: impl IntoIterator<Item = WorkerId>) -> Self {
        let workers = ids
            .into_iter()
            .map(|id| (id, WorkerRecord::new()))
            .collect();
        Self {
            workers: Mutex::new(workers),
        }
    }

    fn set(&self, id: WorkerId, state: WorkerState, at: Instant) {
        let mut workers = self.workers.lock().unwrap_or_else(PoisonError::into_inner);
        let record = workers.entry(id).or_insert_with(WorkerRecord::new);
        record.state = state;
        if record.timeline.len() == TIMELINE_LIMIT {
            record.timeline.pop_front();
        }
        record.timeline.push_back((state, at));
    }

    pub fn state(&self, id: WorkerId) -> Option<WorkerState> {
        self.workers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&id)
            .map(|record| record.state)
    }

    /// Every worker with its current state, producers first, by index.
    pub fn states(&self) -> Vec<(WorkerId, WorkerState)> {
        let mut states: Vec<_> = self
            .workers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(id, record)| (*id, record.state))
            .collect();
        states.sort_by_key(|(id, _)| *id);
        states
    }

    /// The last [`TIMELINE_LIMIT`] transitions of `id`, oldest first.
    pub fn timeline(&self, id: WorkerId) -> Vec<(WorkerState, Instant)> {
        self.workers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&id)
            .map(|record| record.timeline.iter().copied().collect())
            .unwrap_or_default()
    }
}

/// Everything one worker thread needs, shared with the rest of its session.
#[derive(Clone)]
pub struct Worker {
    pub id: WorkerId,
    pub buffer: Arc<dyn BoundedBuffer<Item>>,
    pub stop: StopSignal,
    pub delay: DelayRange,
    pub events: EventSink,
    pub counters: Arc<Counters>,
    pub board: Arc<StateBoard>,
}

impl Worker {
    /// Runs the loop on a named thread. `done` receives the worker id once
    /// the worker has reached `Stopped`.
    pub fn spawn(self, done: Sender<WorkerId>) -> std::io::Result<JoinHandle<()>> {
        thread::Builder::new()
            .name(self.id.to_string())
            .spawn(move || {
                let id = self.id;
                self.run();
                // the session may already have given up waiting
                let _ = done.send(id);
            })
    }

    pub fn run(&self) {
        match self.id.role {
            Role::Producer => self.produce(),
            Role::Consumer => self.consume(),
        }
        self.report(WorkerState::Stopped);
        tracing::debug!(worker = %self.id, "worker stopped");
    }

    fn report(&self, state: WorkerState) {
        let at = Instant::now();
        self.board.set(self.id, state, at);
        self.events.state(self.id, state);
    }

    fn pace(&self) -> bool {
        let delay = self.delay.sample(&mut rand::thread_rng());
        self.stop.sleep(delay)
    }

    fn produce(&self) {
        self.report(WorkerState::Running);
        let mut seq = 1;
        while self.pace() {
            let item = Item {
                producer: self.id,
                seq,
            };
            tracing::trace!(worker = %self.id, item = %item, "trying to produce");
            self.report(WorkerState::Waiting);

            let Ok(occupancy) = self.buffer.put(item, &self.stop) else {
                break;
            };
            self.counters.record_produced(occupancy);
            self.events.item(self.id, Direction::Produced, &item);
            self.events.occupancy(occupancy);
            tracing::debug!(worker = %self.id, item = %item, occupancy, "produced");

            self.report(WorkerState::Running);
            seq += 1;
        }
    }

    fn consume(&self) {
        self.report(WorkerState::Running);
        while self.pace() {
            tracing::trace!(worker = %self.id, "trying to consume");
            self.report(WorkerState::Waiting);

            let Ok(item) = self.buffer.get(&self.stop) else {
                break;
            };
            self.counters.record_consumed();
            let occupancy = self.buffer.len();
            self.events.item(self.id, Direction::Consumed, &item);
            self.events.occupancy(occupancy);
            tracing::debug!(worker = %self.id, item = %item, occupancy, "consumed");

            self.report(WorkerState::Running);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use crossbeam::channel;

    use super::*;
    use crate::{
        buffer::Mode,
        event::{self, Event},
    };

    const POLL: Duration = Duration::from_millis(10);

    fn worker(
        id: WorkerId,
        buffer: &Arc<dyn BoundedBuffer<Item>>,
        stop: &StopSignal,
    ) -> (Worker, channel::Receiver<Event>) {
        let (events, rx) = event::create();
        let worker = Worker {
            id,
            buffer: Arc::clone(buffer),
            stop: stop.clone(),
            delay: DelayRange::fixed(Duration::ZERO),
            events,
            counters: Arc::new(Counters::default()),
            board: Arc::new(StateBoard::new([id])),
        };
        (worker, rx)
    }

    fn states(rx: &channel::Receiver<Event>) -> Vec<WorkerState> {
        rx.try_iter()
            .filter_map(|event| match event {
                Event::State { state, .. } => Some(state),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_counters() {
        let counters = Counters::default();
        counters.record_produced(2);
        counters.record_produced(1);
        counters.record_consumed();
        assert_eq!(counters.produced(), 2);
        assert_eq!(counters.consumed(), 1);
        assert_eq!(counters.peak(), 2);
    }

    #[test]
    fn test_producer_fills_then_stops() {
        for mode in [Mode::Monitor, Mode::Semaphore] {
            let buffer: Arc<dyn BoundedBuffer<Item>> = mode.build(3, POLL).unwrap();
            let stop = StopSignal::new();
            let (producer, rx) = worker(WorkerId::producer(1), &buffer, &stop);

            thread::scope(|s| {
                s.spawn(|| producer.run());
                while buffer.len() < 3 {
                    thread::yield_now();
                }
                thread::sleep(POLL * 3);
                stop.set();
            });

            let labels: Vec<_> = buffer.contents().iter().map(Item::to_string).collect();
            assert_eq!(labels, ["P1-1", "P1-2", "P1-3"]);
            assert_eq!(producer.counters.produced(), 3);
            assert_eq!(producer.counters.peak(), 3);
            assert_eq!(producer.board.state(producer.id), Some(WorkerState::Stopped));

            let seen = states(&rx);
            assert_eq!(seen.first(), Some(&WorkerState::Running));
            assert_eq!(seen.last(), Some(&WorkerState::Stopped));
            // the fourth put was the one cancelled, so the worker was waiting
            assert_eq!(seen[seen.len() - 2], WorkerState::Waiting);
        }
    }

    #[test]
    fn test_consumer_drains_in_order() {
        for mode in [Mode::Monitor, Mode::Semaphore] {
            let buffer: Arc<dyn BoundedBuffer<Item>> = mode.build(4, POLL).unwrap();
            let stop = StopSignal::new();
            let producer = WorkerId::producer(2);
            for seq in 1..=4 {
                buffer.put(Item { producer, seq }, &stop).unwrap();
            }
            let (consumer, rx) = worker(WorkerId::consumer(1), &buffer, &stop);

            thread::scope(|s| {
                s.spawn(|| consumer.run());
                while consumer.counters.consumed() < 4 {
                    thread::yield_now();
                }
                stop.set();
            });

            let consumed: Vec<_> = rx
                .try_iter()
                .filter_map(|event| match event {
                    Event::Item {
                        direction: Direction::Consumed,
                        label,
                        ..
                    } => Some(label),
                    _ => None,
                })
                .collect();
            assert_eq!(consumed, ["P2-1", "P2-2", "P2-3", "P2-4"]);
            assert!(buffer.is_empty());
            assert_eq!(consumer.board.state(consumer.id), Some(WorkerState::Stopped));
        }
    }

    #[test]
    fn test_worker_stopped_before_start_never_touches_buffer() {
        let buffer: Arc<dyn BoundedBuffer<Item>> = Mode::Monitor.build(1, POLL).unwrap();
        let stop = StopSignal::new();
        stop.set();
        let (producer, rx) = worker(WorkerId::producer(1), &buffer, &stop);
        producer.run();

        assert!(buffer.is_empty());
        assert_eq!(states(&rx), [WorkerState::Running, WorkerState::Stopped]);
    }

    #[test]
    fn test_spawn_reports_done() {
        let buffer: Arc<dyn BoundedBuffer<Item>> = Mode::Semaphore.build(1, POLL).unwrap();
        let stop = StopSignal::new();
        let (consumer, _rx) = worker(WorkerId::consumer(2), &buffer, &stop);
        let (done_tx, done_rx) = channel::unbounded();

        let handle = consumer.spawn(done_tx).unwrap();
        thread::sleep(POLL * 2);
        stop.set();
        assert_eq!(
            done_rx.recv_timeout(Duration::from_secs(2)),
            Ok(WorkerId::consumer(2))
        );
        handle.join().unwrap();
    }

    #[test]
    fn test_board_timeline() {
        let id = WorkerId::consumer(1);
        let board = StateBoard::new([id]);
        assert_eq!(board.state(id), Some(WorkerState::Ready));
        let now = Instant::now();
        board.set(id, WorkerState::Running, now);
        board.set(id, WorkerState::Waiting, now);
        assert_eq!(board.state(id), Some(WorkerState::Waiting));
        let timeline: Vec<_> = board.timeline(id).into_iter().map(|(s, _)| s).collect();
        assert_eq!(timeline, [WorkerState::Running, WorkerState::Waiting]);
        assert!(board.timeline(WorkerId::producer(9)).is_empty());
    }

    #[test]
    fn test_board_timeline_keeps_latest_window() {
        let id = WorkerId::producer(1);
        let board = StateBoard::new([id]);
        let start = Instant::now();
        for i in 0..TIMELINE_LIMIT as u64 + 10 {
            board.set(id, WorkerState::Waiting, start + Duration::from_millis(i));
        }
        board.set(id, WorkerState::Stopped, start + Duration::from_secs(60));

        let timeline = board.timeline(id);
        assert_eq!(timeline.len(), TIMELINE_LIMIT);
        // the 11 oldest entries were evicted
        assert_eq!(timeline[0].1, start + Duration::from_millis(11));
        assert_eq!(timeline.last().map(|(s, _)| *s), Some(WorkerState::Stopped));
        assert_eq!(board.state(id), Some(WorkerState::Stopped));
    }
}

use std::{mem, sync::Arc, thread};

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use parking_lot::{Condvar, Mutex};
use tracing::{debug, error};

use crate::{
    error::{ResponseError, TransmissionError},
    response::{Response, ResponseChannel},
    telemetry::Telemetry,
};

use super::{
    worker::{Batch, Batcher, Collector, Worker},
    QueuedEvent, Transmission, TransmissionConfiguration, Transport,
};

enum EngineState {
    Stopped,
    Running { tx: Sender<QueuedEvent>, threads: Vec<thread::JoinHandle<()>> },
    Draining,
}

/// Batches events and sends them through a [`Transport`] from a pool of worker threads.
///
/// Events on the bounded ingestion queue are grouped by destination in a single collector thread, which hands each
/// batch to one of `max_concurrent_batches` workers once it is full or its flush interval has elapsed. Every event
/// that reaches the queue produces exactly one response.
pub(crate) struct TransmissionEngine {
    config: TransmissionConfiguration,
    transport: Arc<dyn Transport>,
    responses: Arc<ResponseChannel>,
    telemetry: Telemetry,
    state: Mutex<EngineState>,
    drained: Condvar,
}

impl TransmissionEngine {
    pub fn new(
        config: TransmissionConfiguration,
        transport: Arc<dyn Transport>,
        responses: Arc<ResponseChannel>,
        telemetry: Telemetry,
    ) -> Self {
        TransmissionEngine {
            config,
            transport,
            responses,
            telemetry,
            state: Mutex::new(EngineState::Stopped),
            drained: Condvar::new(),
        }
    }

    fn spawn_worker(&self, id: usize, rx: Receiver<Batch>) -> Result<thread::JoinHandle<()>, TransmissionError> {
        let worker =
            Worker::new(id, rx, Arc::clone(&self.transport), Arc::clone(&self.responses), self.telemetry.clone());

        thread::Builder::new()
            .name(format!("libhoney-transmission-{id}"))
            .spawn(move || worker.run())
            .map_err(TransmissionError::Spawn)
    }

    fn spawn_collector(
        &self,
        rx: Receiver<QueuedEvent>,
        batches: Sender<Batch>,
    ) -> Result<thread::JoinHandle<()>, TransmissionError> {
        let collector = Collector::new(
            rx,
            batches,
            Batcher::new(self.config.max_batch_size, self.config.flush_interval),
            Arc::clone(&self.responses),
            self.telemetry.clone(),
        );

        thread::Builder::new()
            .name("libhoney-collector".to_owned())
            .spawn(move || collector.run())
            .map_err(TransmissionError::Spawn)
    }

    /// Spawns the workers and the collector, returning the ingestion queue and every thread handle.
    ///
    /// The collector's handle comes first, so joining in order lets it hand off its last batches before the workers
    /// are waited on.
    fn spawn_threads(&self) -> Result<(Sender<QueuedEvent>, Vec<thread::JoinHandle<()>>), TransmissionError> {
        let (tx, rx) = bounded(self.config.pending_work_capacity);
        let (batch_tx, batch_rx) = bounded(0);

        let mut threads = Vec::with_capacity(self.config.max_concurrent_batches + 1);
        for id in 0..self.config.max_concurrent_batches {
            match self.spawn_worker(id, batch_rx.clone()) {
                Ok(handle) => threads.push(handle),
                Err(e) => {
                    // Closing the batch queue lets the workers spawned so far exit.
                    drop(batch_tx);
                    join_threads(threads);
                    return Err(e);
                }
            }
        }

        match self.spawn_collector(rx, batch_tx) {
            Ok(handle) => threads.insert(0, handle),
            Err(e) => {
                join_threads(threads);
                return Err(e);
            }
        }

        Ok((tx, threads))
    }
}

impl Transmission for TransmissionEngine {
    fn start(&self) -> Result<(), TransmissionError> {
        let mut state = self.state.lock();
        if !matches!(*state, EngineState::Stopped) {
            return Err(TransmissionError::AlreadyRunning);
        }

        let (tx, threads) = self.spawn_threads().map_err(|e| {
            error!(error = %e, "Failed to spawn transmission threads.");
            e
        })?;

        debug!(
            workers = self.config.max_concurrent_batches,
            pending_work_capacity = self.config.pending_work_capacity,
            "Transmission started."
        );
        *state = EngineState::Running { tx, threads };
        Ok(())
    }

    fn add(&self, event: QueuedEvent) -> Result<(), TransmissionError> {
        let tx = match &*self.state.lock() {
            EngineState::Running { tx, .. } => tx.clone(),
            _ => return Err(TransmissionError::NotRunning),
        };

        if self.config.block_on_send {
            tx.send(event).map_err(|_| TransmissionError::NotRunning)?;
        } else {
            match tx.try_send(event) {
                Ok(()) => {}
                Err(TrySendError::Full(event)) => {
                    debug!(dataset = %event.destination.dataset, "Pending work queue full, dropping event.");
                    self.telemetry.queue_overflow.increment(1);
                    self.responses.deliver(Response::new(event.metadata, Err(ResponseError::QueueOverflow)));
                    return Ok(());
                }
                Err(TrySendError::Disconnected(_)) => return Err(TransmissionError::NotRunning),
            }
        }

        self.telemetry.events_enqueued.increment(1);
        Ok(())
    }

    fn stop(&self) {
        let (tx, threads) = {
            let mut state = self.state.lock();
            loop {
                match mem::replace(&mut *state, EngineState::Draining) {
                    EngineState::Running { tx, threads } => break (tx, threads),
                    // Another caller is draining; wait for it to finish.
                    EngineState::Draining => self.drained.wait(&mut state),
                    EngineState::Stopped => {
                        *state = EngineState::Stopped;
                        return;
                    }
                }
            }
        };

        debug!("Stopping transmission, flushing queued events.");
        drop(tx);
        join_threads(threads);

        *self.state.lock() = EngineState::Stopped;
        self.drained.notify_all();
        debug!("Transmission stopped.");
    }
}

impl Drop for TransmissionEngine {
    fn drop(&mut self) {
        self.stop();
    }
}

fn join_threads(threads: Vec<thread::JoinHandle<()>>) {
    for handle in threads {
        if handle.join().is_err() {
            error!("Transmission thread panicked.");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{
        collections::HashMap,
        sync::{
            atomic::{AtomicUsize, Ordering},
            Arc,
        },
        thread,
        time::{Duration, Instant},
    };

    use chrono::Utc;

    use super::{EngineState, TransmissionEngine};
    use crate::{
        error::{ResponseError, TransmissionError, TransportError},
        response::{Delivery, Metadata, ResponseChannel},
        telemetry::Telemetry,
        transmission::{Destination, Payload, QueuedEvent, Transmission, TransmissionConfiguration, Transport},
    };

    #[derive(Default)]
    struct CountingTransport {
        batches: AtomicUsize,
        events: AtomicUsize,
    }

    impl Transport for CountingTransport {
        fn send(&self, _: &Destination, batch: &[Payload]) -> Vec<Result<Delivery, TransportError>> {
            self.batches.fetch_add(1, Ordering::SeqCst);
            self.events.fetch_add(batch.len(), Ordering::SeqCst);
            batch.iter().map(|_| Ok(Delivery { status_code: 202, ..Default::default() })).collect()
        }
    }

    fn config(workers: usize, capacity: usize, max_batch_size: usize) -> TransmissionConfiguration {
        TransmissionConfiguration {
            max_batch_size,
            flush_interval: Duration::from_secs(60),
            max_concurrent_batches: workers,
            pending_work_capacity: capacity,
            block_on_send: false,
        }
    }

    fn event(seq: usize) -> QueuedEvent {
        let mut data = HashMap::new();
        data.insert("seq".to_owned(), seq.into());

        QueuedEvent {
            destination: Destination {
                api_host: "http://localhost".to_owned(),
                write_key: "key".to_owned(),
                dataset: "engine".to_owned(),
            },
            payload: Payload { data, timestamp: Utc::now(), sample_rate: 1 },
            metadata: Metadata::new(seq),
        }
    }

    #[test]
    fn add_requires_running_engine() {
        let responses = Arc::new(ResponseChannel::new(8, false, Telemetry::new()));
        let engine = TransmissionEngine::new(
            config(1, 4, 10),
            Arc::new(CountingTransport::default()),
            responses,
            Telemetry::new(),
        );

        assert!(matches!(engine.add(event(0)), Err(TransmissionError::NotRunning)));

        engine.start().unwrap();
        assert!(matches!(engine.start(), Err(TransmissionError::AlreadyRunning)));
        engine.add(event(1)).unwrap();

        engine.stop();
        assert!(matches!(engine.add(event(2)), Err(TransmissionError::NotRunning)));

        // Stopping twice is a no-op.
        engine.stop();
    }

    #[test]
    fn stop_flushes_partial_batches() {
        let transport = Arc::new(CountingTransport::default());
        let responses = Arc::new(ResponseChannel::new(64, false, Telemetry::new()));
        let rx = responses.receiver();
        let engine = TransmissionEngine::new(
            config(4, 32, 100),
            Arc::clone(&transport) as Arc<dyn Transport>,
            Arc::clone(&responses),
            Telemetry::new(),
        );

        engine.start().unwrap();
        for seq in 0..20 {
            engine.add(event(seq)).unwrap();
        }
        engine.stop();

        assert_eq!(transport.events.load(Ordering::SeqCst), 20);
        let mut seqs: Vec<usize> =
            rx.try_iter().map(|response| *response.metadata.downcast_ref::<usize>().unwrap()).collect();
        seqs.sort_unstable();
        assert_eq!(seqs, (0..20).collect::<Vec<_>>());
    }

    #[test]
    fn restarts_after_stop() {
        let transport = Arc::new(CountingTransport::default());
        let responses = Arc::new(ResponseChannel::new(8, false, Telemetry::new()));
        let engine = TransmissionEngine::new(
            config(2, 8, 1),
            Arc::clone(&transport) as Arc<dyn Transport>,
            responses,
            Telemetry::new(),
        );

        engine.start().unwrap();
        engine.add(event(0)).unwrap();
        engine.stop();

        engine.start().unwrap();
        engine.add(event(1)).unwrap();
        engine.stop();

        assert_eq!(transport.batches.load(Ordering::SeqCst), 2);
    }

    struct StallingTransport {
        entered: crossbeam_channel::Sender<()>,
        gate: crossbeam_channel::Receiver<()>,
    }

    impl Transport for StallingTransport {
        fn send(&self, _: &Destination, batch: &[Payload]) -> Vec<Result<Delivery, TransportError>> {
            let _ = self.entered.send(());
            let _ = self.gate.recv();
            batch.iter().map(|_| Ok(Delivery::default())).collect()
        }
    }

    /// Returns a transport that stalls every send until `release` is dropped, and a receiver signalled on each send.
    fn stalling() -> (StallingTransport, crossbeam_channel::Receiver<()>, crossbeam_channel::Sender<()>) {
        let (release, gate) = crossbeam_channel::bounded(0);
        let (entered_tx, entered) = crossbeam_channel::unbounded();
        (StallingTransport { entered: entered_tx, gate }, entered, release)
    }

    #[test]
    fn overflow_is_reported_as_response() {
        let (transport, entered, release) = stalling();
        let responses = Arc::new(ResponseChannel::new(8, false, Telemetry::new()));
        let rx = responses.receiver();
        let engine = TransmissionEngine::new(config(1, 1, 1), Arc::new(transport), responses, Telemetry::new());

        engine.start().unwrap();

        // The first event occupies the only worker, which then stalls inside the transport.
        engine.add(event(0)).unwrap();
        entered.recv_timeout(Duration::from_secs(1)).unwrap();

        // The second is held by the collector, waiting for a free worker.
        engine.add(event(1)).unwrap();
        thread::sleep(Duration::from_millis(100));

        // The third fills the queue, the fourth overflows it.
        engine.add(event(2)).unwrap();
        engine.add(event(3)).unwrap();

        let overflow = rx.recv_timeout(Duration::from_secs(1)).unwrap();
        assert_eq!(overflow.metadata.downcast_ref::<usize>(), Some(&3));
        assert!(matches!(overflow.outcome, Err(ResponseError::QueueOverflow)));

        drop(release);
        engine.stop();

        let delivered = rx.try_iter().filter(|response| response.is_success()).count();
        assert_eq!(delivered, 3);
    }

    #[test]
    fn concurrent_stop_waits_for_drain() {
        let (transport, entered, release) = stalling();
        let responses = Arc::new(ResponseChannel::new(8, false, Telemetry::new()));
        let rx = responses.receiver();
        let engine = TransmissionEngine::new(config(1, 4, 1), Arc::new(transport), responses, Telemetry::new());

        engine.start().unwrap();
        engine.add(event(0)).unwrap();
        entered.recv_timeout(Duration::from_secs(1)).unwrap();

        thread::scope(|scope| {
            let first = scope.spawn(|| engine.stop());

            let waiting_since = Instant::now();
            while !matches!(*engine.state.lock(), EngineState::Draining) {
                assert!(waiting_since.elapsed() < Duration::from_secs(1), "first stop never started draining");
                thread::sleep(Duration::from_millis(1));
            }

            let second = scope.spawn(|| {
                engine.stop();
                rx.try_iter().count()
            });
            thread::sleep(Duration::from_millis(100));
            assert!(!second.is_finished());

            drop(release);
            assert_eq!(second.join().unwrap(), 1);
            first.join().unwrap();
        });

        assert!(matches!(*engine.state.lock(), EngineState::Stopped));
    }
}

use std::{
    collections::HashMap,
    panic::{self, AssertUnwindSafe},
    sync::Arc,
    time::{Duration, Instant},
};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use tracing::{debug, error, trace, warn};

use crate::{
    error::{ResponseError, TransportError},
    response::{Metadata, Response, ResponseChannel},
    telemetry::Telemetry,
};

use super::{Destination, Payload, QueuedEvent, Transport};

/// A closed batch, ready to be dispatched.
#[derive(Debug)]
pub(super) struct Batch {
    pub destination: Destination,
    pub events: Vec<QueuedEvent>,
}

struct OpenBatch {
    events: Vec<QueuedEvent>,
    // `None` when the flush interval reaches past what an `Instant` can represent.
    deadline: Option<Instant>,
}

/// Groups events into per-destination batches.
///
/// A batch closes when it reaches the maximum batch size, or once the flush interval has elapsed since its first
/// event arrived, whichever comes first.
pub(super) struct Batcher {
    max_batch_size: usize,
    flush_interval: Duration,
    open: HashMap<Destination, OpenBatch>,
}

impl Batcher {
    pub fn new(max_batch_size: usize, flush_interval: Duration) -> Self {
        Batcher { max_batch_size: max_batch_size.max(1), flush_interval, open: HashMap::new() }
    }

    /// Adds an event that arrived at `now`, returning its batch if the event filled it.
    pub fn push(&mut self, event: QueuedEvent, now: Instant) -> Option<Batch> {
        let destination = event.destination.clone();
        let deadline = now.checked_add(self.flush_interval);
        let batch = self
            .open
            .entry(destination.clone())
            .or_insert_with(|| OpenBatch { events: Vec::new(), deadline });
        batch.events.push(event);

        if batch.events.len() < self.max_batch_size {
            return None;
        }

        self.open.remove(&destination).map(|batch| Batch { destination, events: batch.events })
    }

    /// Returns the earliest deadline among open batches.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.open.values().filter_map(|batch| batch.deadline).min()
    }

    /// Closes every batch whose deadline is at or before `now`.
    pub fn take_expired(&mut self, now: Instant) -> Vec<Batch> {
        let expired: Vec<Destination> = self
            .open
            .iter()
            .filter(|(_, batch)| batch.deadline.is_some_and(|deadline| deadline <= now))
            .map(|(destination, _)| destination.clone())
            .collect();

        expired
            .into_iter()
            .filter_map(|destination| {
                self.open.remove(&destination).map(|batch| Batch { destination, events: batch.events })
            })
            .collect()
    }

    /// Closes every open batch.
    pub fn drain(&mut self) -> Vec<Batch> {
        self.open
            .drain()
            .map(|(destination, batch)| Batch { destination, events: batch.events })
            .collect()
    }
}

/// The batching loop.
///
/// A single collector pulls events off the ingestion queue, so all events for a destination share one open batch no
/// matter how many workers there are. Closed batches are handed to the next idle worker; while every worker is busy,
/// the collector waits and events accumulate in the ingestion queue.
pub(super) struct Collector {
    rx: Receiver<QueuedEvent>,
    batches: Sender<Batch>,
    batcher: Batcher,
    responses: Arc<ResponseChannel>,
    telemetry: Telemetry,
}

impl Collector {
    pub fn new(
        rx: Receiver<QueuedEvent>,
        batches: Sender<Batch>,
        batcher: Batcher,
        responses: Arc<ResponseChannel>,
        telemetry: Telemetry,
    ) -> Self {
        Collector { rx, batches, batcher, responses, telemetry }
    }

    /// Runs until the ingestion queue is closed and drained, then hands off any remaining batches.
    ///
    /// Closing the batch queue on return lets the workers exit once they have sent everything.
    pub fn run(mut self) {
        debug!("Batch collector started.");

        while panic::catch_unwind(AssertUnwindSafe(|| self.collect())).is_err() {
            let open = self.batcher.drain();
            error!(batches = open.len(), "Batch collector panicked, failing open batches.");
            for batch in open {
                self.fail(batch);
            }
        }

        let remaining = self.batcher.drain();
        debug!(batches = remaining.len(), "Ingestion queue closed, flushing remaining batches.");
        for batch in remaining {
            self.hand_off(batch);
        }
    }

    fn collect(&mut self) {
        loop {
            // Sleep until either an event arrives or the oldest open batch is due.
            let received = match self.batcher.next_deadline() {
                Some(deadline) => self.rx.recv_deadline(deadline),
                None => self.rx.recv().map_err(|_| RecvTimeoutError::Disconnected),
            };

            match received {
                Ok(event) => {
                    if let Some(batch) = self.batcher.push(event, Instant::now()) {
                        self.hand_off(batch);
                    }
                }
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => return,
            }

            for batch in self.batcher.take_expired(Instant::now()) {
                trace!(batch_size = batch.events.len(), "Flush interval elapsed.");
                self.hand_off(batch);
            }
        }
    }

    fn hand_off(&self, batch: Batch) {
        if let Err(e) = self.batches.send(batch) {
            error!("No transmission worker left to send batch.");
            self.fail(e.into_inner());
        }
    }

    fn fail(&self, batch: Batch) {
        let mut failed = 0;
        for event in batch.events {
            failed += 1;
            self.responses.deliver(Response::new(event.metadata, Err(ResponseError::Internal)));
        }
        self.telemetry.send_errors.increment(failed);
    }
}

/// A transmission worker.
///
/// Each worker takes closed batches from the collector and sends them through the transport itself, so the number of
/// workers bounds the number of batches in flight.
pub(super) struct Worker {
    id: usize,
    rx: Receiver<Batch>,
    transport: Arc<dyn Transport>,
    responses: Arc<ResponseChannel>,
    telemetry: Telemetry,
}

impl Worker {
    pub fn new(
        id: usize,
        rx: Receiver<Batch>,
        transport: Arc<dyn Transport>,
        responses: Arc<ResponseChannel>,
        telemetry: Telemetry,
    ) -> Self {
        Worker { id, rx, transport, responses, telemetry }
    }

    /// Runs the worker until the batch queue is closed and drained.
    pub fn run(self) {
        debug!(worker = self.id, "Transmission worker started.");

        for batch in &self.rx {
            self.dispatch(batch);
        }

        debug!(worker = self.id, "Transmission worker stopped.");
    }

    fn dispatch(&self, batch: Batch) {
        let Batch { destination, events } = batch;
        let (payloads, metadata): (Vec<Payload>, Vec<Metadata>) =
            events.into_iter().map(|event| (event.payload, event.metadata)).unzip();

        debug!(
            worker = self.id,
            dataset = %destination.dataset,
            batch_size = payloads.len(),
            "Dispatching batch."
        );

        let outcomes =
            match panic::catch_unwind(AssertUnwindSafe(|| self.transport.send(&destination, &payloads))) {
                Ok(outcomes) => outcomes,
                Err(_) => {
                    error!(worker = self.id, dataset = %destination.dataset, "Transport panicked while sending batch.");
                    payloads.iter().map(|_| Err(TransportError::Panicked)).collect()
                }
            };

        if outcomes.len() != payloads.len() {
            warn!(
                expected = payloads.len(),
                reported = outcomes.len(),
                "Transport reported the wrong number of outcomes."
            );
        }

        let mut outcomes = outcomes.into_iter();
        let mut succeeded = 0;
        let mut failed = 0;
        for metadata in metadata {
            let outcome = outcomes.next().unwrap_or(Err(TransportError::MissingOutcome));
            if outcome.is_ok() {
                succeeded += 1;
            } else {
                failed += 1;
            }

            self.responses.deliver(Response::new(metadata, outcome.map_err(ResponseError::from)));
        }

        if failed > 0 {
            error!(worker = self.id, dataset = %destination.dataset, failed, "Failed to send events.");
        }
        self.telemetry.track_batch(succeeded, failed);
    }
}

#[cfg(test)]
mod tests {
    use std::{
        collections::HashMap,
        time::{Duration, Instant},
    };

    use chrono::Utc;

    use super::Batcher;
    use crate::{
        response::Metadata,
        transmission::{Destination, Payload, QueuedEvent},
    };

    fn event(dataset: &str, seq: usize) -> QueuedEvent {
        let mut data = HashMap::new();
        data.insert("seq".to_owned(), seq.into());

        QueuedEvent {
            destination: Destination {
                api_host: "http://localhost".to_owned(),
                write_key: "key".to_owned(),
                dataset: dataset.to_owned(),
            },
            payload: Payload { data, timestamp: Utc::now(), sample_rate: 1 },
            metadata: Metadata::new(seq),
        }
    }

    fn seqs(events: &[QueuedEvent]) -> Vec<usize> {
        events.iter().map(|event| *event.metadata.downcast_ref::<usize>().unwrap()).collect()
    }

    #[test]
    fn closes_batch_at_max_size() {
        let mut batcher = Batcher::new(3, Duration::from_secs(1));
        let now = Instant::now();

        assert!(batcher.push(event("a", 0), now).is_none());
        assert!(batcher.push(event("a", 1), now).is_none());
        let batch = batcher.push(event("a", 2), now).expect("batch should be full");
        assert_eq!(batch.destination.dataset, "a");
        assert_eq!(seqs(&batch.events), vec![0, 1, 2]);

        assert!(batcher.push(event("a", 3), now).is_none());
        assert_eq!(batcher.next_deadline(), Some(now + Duration::from_secs(1)));
    }

    #[test]
    fn never_mixes_destinations() {
        let mut batcher = Batcher::new(2, Duration::from_secs(1));
        let now = Instant::now();

        assert!(batcher.push(event("a", 0), now).is_none());
        assert!(batcher.push(event("b", 1), now).is_none());
        let a = batcher.push(event("a", 2), now).expect("batch a should be full");
        assert_eq!(seqs(&a.events), vec![0, 2]);

        let remaining = batcher.drain();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].destination.dataset, "b");
        assert!(batcher.next_deadline().is_none());
    }

    #[test]
    fn deadline_is_set_by_first_event() {
        let mut batcher = Batcher::new(10, Duration::from_millis(100));
        let start = Instant::now();

        batcher.push(event("a", 0), start);
        batcher.push(event("a", 1), start + Duration::from_millis(90));
        batcher.push(event("b", 2), start + Duration::from_millis(50));

        assert_eq!(batcher.next_deadline(), Some(start + Duration::from_millis(100)));
        assert!(batcher.take_expired(start + Duration::from_millis(99)).is_empty());

        let expired = batcher.take_expired(start + Duration::from_millis(100));
        assert_eq!(expired.len(), 1);
        assert_eq!(seqs(&expired[0].events), vec![0, 1]);
        assert_eq!(batcher.next_deadline(), Some(start + Duration::from_millis(150)));
    }

    #[test]
    fn unrepresentable_deadline_waits_for_size_or_drain() {
        let mut batcher = Batcher::new(2, Duration::MAX);
        let now = Instant::now();

        assert!(batcher.push(event("a", 0), now).is_none());
        assert!(batcher.next_deadline().is_none());
        assert!(batcher.take_expired(now + Duration::from_secs(3600)).is_empty());

        let batch = batcher.push(event("a", 1), now).expect("batch should be full");
        assert_eq!(seqs(&batch.events), vec![0, 1]);

        batcher.push(event("b", 2), now);
        let remaining = batcher.drain();
        assert_eq!(remaining.len(), 1);
        assert_eq!(seqs(&remaining[0].events), vec![2]);
    }
}

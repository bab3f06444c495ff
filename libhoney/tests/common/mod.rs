#![allow(dead_code)]

use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use bytes::Bytes;
use crossbeam_channel::{bounded, unbounded, Receiver, Sender};
use libhoney::{Delivery, Destination, Payload, Transport, TransportError};
use parking_lot::Mutex;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

#[derive(Clone, Debug)]
pub struct SentBatch {
    pub destination: Destination,
    pub payloads: Vec<Payload>,
    pub at: Instant,
}

/// Records every batch it is handed and accepts every event.
#[derive(Default)]
pub struct RecordingTransport {
    batches: Mutex<Vec<SentBatch>>,
}

impl RecordingTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn batches(&self) -> Vec<SentBatch> {
        self.batches.lock().clone()
    }

    pub fn event_count(&self) -> usize {
        self.batches.lock().iter().map(|batch| batch.payloads.len()).sum()
    }

    fn record(&self, destination: &Destination, batch: &[Payload]) {
        self.batches.lock().push(SentBatch {
            destination: destination.clone(),
            payloads: batch.to_vec(),
            at: Instant::now(),
        });
    }
}

impl Transport for RecordingTransport {
    fn send(&self, destination: &Destination, batch: &[Payload]) -> Vec<Result<Delivery, TransportError>> {
        self.record(destination, batch);
        batch
            .iter()
            .map(|_| {
                Ok(Delivery { status_code: 202, body: Bytes::from_static(b"{}"), duration: Duration::from_millis(1) })
            })
            .collect()
    }
}

/// Blocks inside `send` until released, signalling each time a batch arrives.
pub struct GatedTransport {
    recorder: RecordingTransport,
    entered: Sender<()>,
    gate: Receiver<()>,
}

/// Handle for a [`GatedTransport`]. Dropping `release` lets every pending and future send through.
pub struct Gate {
    pub release: Sender<()>,
    pub entered: Receiver<()>,
}

impl GatedTransport {
    pub fn new() -> (Arc<Self>, Gate) {
        let (release, gate) = bounded(0);
        let (entered_tx, entered) = unbounded();
        let transport = Arc::new(GatedTransport { recorder: RecordingTransport::default(), entered: entered_tx, gate });
        (transport, Gate { release, entered })
    }

    pub fn event_count(&self) -> usize {
        self.recorder.event_count()
    }
}

impl Transport for GatedTransport {
    fn send(&self, destination: &Destination, batch: &[Payload]) -> Vec<Result<Delivery, TransportError>> {
        let _ = self.entered.send(());
        let _ = self.gate.recv();
        self.recorder.send(destination, batch)
    }
}

/// Rejects every event with the given status code.
pub struct RejectingTransport(pub u16);

impl Transport for RejectingTransport {
    fn send(&self, _: &Destination, batch: &[Payload]) -> Vec<Result<Delivery, TransportError>> {
        batch
            .iter()
            .map(|_| Err(TransportError::Rejected { status_code: self.0, body: Bytes::from_static(b"bad request") }))
            .collect()
    }
}

/// Panics on every batch.
pub struct PanickingTransport;

impl Transport for PanickingTransport {
    fn send(&self, _: &Destination, _: &[Payload]) -> Vec<Result<Delivery, TransportError>> {
        panic!("transport exploded");
    }
}

/// Only ever reports an outcome for the first event of a batch.
pub struct ForgetfulTransport;

impl Transport for ForgetfulTransport {
    fn send(&self, _: &Destination, batch: &[Payload]) -> Vec<Result<Delivery, TransportError>> {
        batch.iter().take(1).map(|_| Ok(Delivery::default())).collect()
    }
}

use std::{collections::HashMap, sync::Arc, time::Duration};

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use tracing::trace;

use crate::{
    config::Config,
    error::{TransmissionError, TransportError},
    response::{Delivery, Metadata},
};

mod engine;
mod worker;

pub(crate) use self::engine::TransmissionEngine;

/// The remote collection an event is sent to.
///
/// Events are only ever batched together with events for the same destination.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Destination {
    /// API host of the collector.
    pub api_host: String,

    /// Write key used to authenticate the events.
    pub write_key: String,

    /// Dataset the events belong to.
    pub dataset: String,
}

/// A single event as presented to a [`Transport`].
///
/// Serializes with the wire names `data`, `time` and `samplerate`, so a batch can be encoded directly as a JSON array.
#[derive(Clone, Debug, Serialize)]
pub struct Payload {
    /// The event's fields.
    pub data: HashMap<String, Value>,

    /// When the event was created.
    #[serde(rename = "time")]
    pub timestamp: DateTime<Utc>,

    /// The sample rate the event was kept at.
    #[serde(rename = "samplerate")]
    pub sample_rate: u32,
}

/// Sends batches of events to a remote collector.
///
/// The transport owns everything about the wire: encoding, connection handling, and any retry or backoff policy.
/// Batches are sent from the transmission's worker threads, so a slow transport only ever stalls the worker that
/// called it.
pub trait Transport: Send + Sync + 'static {
    /// Sends `batch`, which only holds events for `destination`.
    ///
    /// Must return exactly one outcome per payload, in the same order as the batch. Missing outcomes are reported to
    /// the caller as [`TransportError::MissingOutcome`], and a panic fails every event in the batch with
    /// [`TransportError::Panicked`].
    fn send(&self, destination: &Destination, batch: &[Payload]) -> Vec<Result<Delivery, TransportError>>;
}

impl<T> Transport for Arc<T>
where
    T: Transport + ?Sized,
{
    fn send(&self, destination: &Destination, batch: &[Payload]) -> Vec<Result<Delivery, TransportError>> {
        (**self).send(destination, batch)
    }
}

/// An event that passed sampling and validation, ready to be batched.
#[derive(Debug)]
pub(crate) struct QueuedEvent {
    pub destination: Destination,
    pub payload: Payload,
    pub metadata: Metadata,
}

/// Settings fixed when a transmission starts.
#[derive(Clone, Debug)]
pub(crate) struct TransmissionConfiguration {
    pub max_batch_size: usize,
    pub flush_interval: Duration,
    pub max_concurrent_batches: usize,
    pub pending_work_capacity: usize,
    pub block_on_send: bool,
}

impl From<&Config> for TransmissionConfiguration {
    fn from(config: &Config) -> Self {
        TransmissionConfiguration {
            max_batch_size: config.max_batch_size,
            flush_interval: config.send_frequency,
            max_concurrent_batches: config.max_concurrent_batches,
            pending_work_capacity: config.pending_work_capacity,
            block_on_send: config.block_on_send,
        }
    }
}

/// Turns a stream of events into batches handed to a transport.
pub(crate) trait Transmission: Send + Sync {
    /// Starts accepting events.
    fn start(&self) -> Result<(), TransmissionError>;

    /// Queues an event for sending.
    fn add(&self, event: QueuedEvent) -> Result<(), TransmissionError>;

    /// Stops accepting events, waiting until everything queued so far has been sent.
    fn stop(&self);
}

/// A transmission that discards every event.
///
/// Used by the default client so that sending before initialization is harmless.
pub(crate) struct NullTransmission;

impl Transmission for NullTransmission {
    fn start(&self) -> Result<(), TransmissionError> {
        Ok(())
    }

    fn add(&self, event: QueuedEvent) -> Result<(), TransmissionError> {
        trace!(dataset = %event.destination.dataset, "Discarding event sent before initialization.");
        Ok(())
    }

    fn stop(&self) {}
}

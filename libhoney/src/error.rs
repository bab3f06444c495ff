use std::{fmt, io};

use bytes::Bytes;
use thiserror::Error;

/// Errors that could occur while adding structured data to a builder or event.
///
/// Individual values that cannot be serialized are never reported here: they are dropped silently. Only the overall
/// shape of the input to `add` can fail.
#[derive(Debug, Error)]
pub enum FieldError {
    /// The value handed to `add` was neither a record nor a map.
    #[error("couldn't add data of kind {kind}: expected a struct or a map")]
    UnsupportedShape {
        /// The kind of value that was given.
        kind: &'static str,
    },

    /// A map key could not be turned into a field name.
    #[error("failed to add map: key kind {kind} unaccepted")]
    UnsupportedKey {
        /// The kind of key that was given.
        kind: &'static str,
    },

    /// The value's own `Serialize` implementation reported an error.
    #[error("failed to serialize data: {0}")]
    Custom(String),
}

impl serde::ser::Error for FieldError {
    fn custom<T: fmt::Display>(msg: T) -> Self {
        FieldError::Custom(msg.to_string())
    }
}

/// Errors returned synchronously by `Event::send` and the `send_now` conveniences.
///
/// Sampling drops, queue overflows and transport failures are never reported here; they arrive as a [`Response`]
/// on the response channel instead.
///
/// [`Response`]: crate::Response
#[derive(Debug, Error)]
pub enum SendError {
    /// The event had no fields.
    #[error("no metrics added to event, won't send empty event")]
    EmptyEvent,

    /// Neither the event nor the client configuration specified an API host.
    #[error("no API host specified, can't send to the great unknown")]
    MissingApiHost,

    /// Neither the event nor the client configuration specified a write key.
    #[error("no write key specified, can't send event")]
    MissingWriteKey,

    /// Neither the event nor the client configuration specified a dataset.
    #[error("no dataset specified, can't send datasetless")]
    MissingDataset,

    /// The data handed to a `send_now` convenience could not be added.
    #[error(transparent)]
    Fields(#[from] FieldError),

    /// The transmission refused the event.
    #[error(transparent)]
    Transmission(#[from] TransmissionError),
}

/// Errors from the transmission lifecycle.
#[derive(Debug, Error)]
pub enum TransmissionError {
    /// A worker thread could not be spawned while starting.
    #[error("failed to spawn transmission worker thread: {0}")]
    Spawn(#[source] io::Error),

    /// `start` was called on a transmission that is already running.
    #[error("transmission is already running")]
    AlreadyRunning,

    /// An event was added to a transmission that is not running.
    #[error("transmission is not running")]
    NotRunning,
}

/// Errors that could occur while initializing a client.
#[derive(Debug, Error)]
pub enum InitError {
    /// The transmission engine failed to start.
    #[error("failed to start transmission: {0}")]
    Transmission(#[from] TransmissionError),
}

/// Why an event did not reach the remote collector.
#[derive(Debug, Error)]
pub enum ResponseError {
    /// The event was dropped by the sampler.
    #[error("event dropped due to sampling")]
    Sampled,

    /// The ingestion queue was full and the client does not block on send.
    #[error("queue overflow")]
    QueueOverflow,

    /// The transport failed to deliver the event.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The event was lost to a fault inside the transmission before it could be handed to the transport.
    #[error("event dropped after an internal transmission fault")]
    Internal,
}

/// Failures reported by a [`Transport`] for a single event.
///
/// [`Transport`]: crate::Transport
#[derive(Debug, Error)]
pub enum TransportError {
    /// The request could not be completed.
    #[error("request failed: {0}")]
    Request(String),

    /// The remote collector rejected the event.
    #[error("event rejected with status {status_code}")]
    Rejected {
        /// Status code returned by the collector.
        status_code: u16,

        /// Body returned by the collector.
        body: Bytes,
    },

    /// The transport panicked while sending the batch containing the event.
    #[error("transport panicked while sending batch")]
    Panicked,

    /// The transport returned fewer outcomes than there were events in the batch.
    #[error("transport reported no outcome for event")]
    MissingOutcome,
}

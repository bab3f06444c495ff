use std::{any::Any, fmt, sync::Arc, time::Duration};

use bytes::Bytes;
use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use parking_lot::RwLock;
use tracing::debug;

use crate::{error::ResponseError, telemetry::Telemetry};

/// Opaque caller data attached to an event and handed back on its [`Response`].
///
/// Metadata is never sent to the remote collector.
#[derive(Clone, Default)]
pub struct Metadata(Option<Arc<dyn Any + Send + Sync>>);

impl Metadata {
    /// Wraps `value` as metadata.
    pub fn new<T>(value: T) -> Self
    where
        T: Any + Send + Sync,
    {
        Metadata(Some(Arc::new(value)))
    }

    /// Returns `true` if no metadata was attached.
    pub fn is_none(&self) -> bool {
        self.0.is_none()
    }

    /// Returns a reference to the metadata if it is of type `T`.
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.0.as_deref()?.downcast_ref()
    }
}

impl fmt::Debug for Metadata {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.0 {
            Some(_) => f.write_str("Metadata(..)"),
            None => f.write_str("Metadata(None)"),
        }
    }
}

/// Details reported by the transport for an event that was delivered.
#[derive(Clone, Debug, Default)]
pub struct Delivery {
    /// Status code returned by the collector for this event.
    pub status_code: u16,

    /// Body returned by the collector for this event.
    pub body: Bytes,

    /// How long the request carrying this event took.
    pub duration: Duration,
}

/// The outcome of a single event, read from the response channel.
#[derive(Debug)]
pub struct Response {
    /// Metadata attached to the event when it was sent.
    pub metadata: Metadata,

    /// Delivery details on success, or why the event did not reach the collector.
    pub outcome: Result<Delivery, ResponseError>,
}

impl Response {
    pub(crate) fn new(metadata: Metadata, outcome: Result<Delivery, ResponseError>) -> Self {
        Response { metadata, outcome }
    }

    /// Returns `true` if the event was delivered.
    pub fn is_success(&self) -> bool {
        self.outcome.is_ok()
    }

    /// Returns the error, if the event was not delivered.
    pub fn error(&self) -> Option<&ResponseError> {
        self.outcome.as_ref().err()
    }
}

/// The single conduit for every [`Response`].
///
/// The delivery policy is fixed at construction: blocking producers wait for room in the channel, non-blocking
/// producers discard the response when the channel is full.
pub(crate) struct ResponseChannel {
    tx: RwLock<Option<Sender<Response>>>,
    rx: Receiver<Response>,
    block: bool,
    telemetry: Telemetry,
}

impl ResponseChannel {
    pub fn new(capacity: usize, block: bool, telemetry: Telemetry) -> Self {
        let (tx, rx) = bounded(capacity);
        ResponseChannel { tx: RwLock::new(Some(tx)), rx, block, telemetry }
    }

    /// Returns a read handle for the channel.
    pub fn receiver(&self) -> Receiver<Response> {
        self.rx.clone()
    }

    /// Delivers a response according to the channel's policy.
    ///
    /// Responses delivered after the channel was closed are discarded.
    pub fn deliver(&self, response: Response) {
        let Some(tx) = self.tx.read().clone() else {
            debug!("Response channel closed, discarding response.");
            return;
        };

        if self.block {
            // Only fails if every receiver is gone, in which case nobody is listening anyway.
            let _ = tx.send(response);
        } else if let Err(TrySendError::Full(_)) = tx.try_send(response) {
            debug!("Response channel full, discarding response.");
            self.telemetry.responses_dropped.increment(1);
        }
    }

    /// Closes the channel.
    ///
    /// Readers can still drain buffered responses, after which reads report disconnection.
    pub fn close(&self) {
        self.tx.write().take();
    }
}

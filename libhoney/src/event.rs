use std::{any::Any, fmt, sync::Arc};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::{
    client::Shared,
    error::{FieldError, ResponseError, SendError},
    fields::FieldStore,
    response::{Metadata, Response},
    sampler::normalize_rate,
    transmission::{Destination, Payload, QueuedEvent},
};

/// Per-builder or per-event settings that take precedence over the client's configuration.
///
/// Empty strings and a zero sample rate mean "not overridden".
#[derive(Clone, Debug, Default)]
pub(crate) struct Overrides {
    pub write_key: String,
    pub dataset: String,
    pub sample_rate: u32,
    pub api_host: String,
}

fn resolve(value: String, default: &str) -> Option<String> {
    match (value.is_empty(), default.is_empty()) {
        (false, _) => Some(value),
        (true, false) => Some(default.to_owned()),
        (true, true) => None,
    }
}

/// A single telemetry record.
///
/// Events are created from a [`Builder`][crate::Builder] (or the client's root builder), filled in with fields, and
/// then handed off with [`send`][Event::send]. The fields of an event are its own: adding to an event never affects
/// the builder it came from.
pub struct Event {
    overrides: Overrides,
    timestamp: DateTime<Utc>,
    metadata: Metadata,
    fields: FieldStore,
    shared: Arc<Shared>,
}

impl Event {
    pub(crate) fn new(
        overrides: Overrides,
        timestamp: DateTime<Utc>,
        fields: FieldStore,
        shared: Arc<Shared>,
    ) -> Self {
        Event { overrides, timestamp, metadata: Metadata::default(), fields, shared }
    }

    /// Returns the write key override, or an empty string if unset.
    pub fn write_key(&self) -> &str {
        &self.overrides.write_key
    }

    /// Overrides the write key for this event.
    pub fn set_write_key<S: Into<String>>(&mut self, write_key: S) {
        self.overrides.write_key = write_key.into();
    }

    /// Returns the dataset override, or an empty string if unset.
    pub fn dataset(&self) -> &str {
        &self.overrides.dataset
    }

    /// Overrides the dataset for this event.
    pub fn set_dataset<S: Into<String>>(&mut self, dataset: S) {
        self.overrides.dataset = dataset.into();
    }

    /// Returns the sample rate override, or 0 if unset.
    pub fn sample_rate(&self) -> u32 {
        self.overrides.sample_rate
    }

    /// Overrides the sample rate for this event. 0 means "use the client's sample rate".
    pub fn set_sample_rate(&mut self, sample_rate: u32) {
        self.overrides.sample_rate = sample_rate;
    }

    /// Returns the API host override, or an empty string if unset.
    pub fn api_host(&self) -> &str {
        &self.overrides.api_host
    }

    /// Overrides the API host for this event.
    pub fn set_api_host<S: Into<String>>(&mut self, api_host: S) {
        self.overrides.api_host = api_host.into();
    }

    /// Returns when the event was created.
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Sets the event's timestamp.
    pub fn set_timestamp(&mut self, timestamp: DateTime<Utc>) {
        self.timestamp = timestamp;
    }

    /// Returns the metadata attached to this event.
    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    /// Attaches metadata to this event.
    ///
    /// Metadata is never sent. It is handed back untouched on the event's [`Response`], which makes it useful for
    /// correlating responses with the events that produced them.
    pub fn set_metadata<T>(&mut self, metadata: T)
    where
        T: Any + Send + Sync,
    {
        self.metadata = Metadata::new(metadata);
    }

    /// Returns the event's fields.
    pub fn fields(&self) -> &FieldStore {
        &self.fields
    }

    /// Adds a field. See [`FieldStore::add_field`].
    pub fn add_field<K, V>(&self, key: K, value: V)
    where
        K: Into<String>,
        V: Serialize,
    {
        self.fields.add_field(key, value);
    }

    /// Adds every member of a struct or entry of a map as fields. See [`FieldStore::add`].
    ///
    /// # Errors
    ///
    /// If `data` is neither a struct nor a map, or has unsupported map keys, an error is returned.
    pub fn add<T>(&self, data: &T) -> Result<(), FieldError>
    where
        T: ?Sized + Serialize,
    {
        self.fields.add(data)
    }

    /// Adds fields from a generator until it is exhausted. See [`FieldStore::add_func`].
    pub fn add_func<F, K, V>(&self, generator: F)
    where
        F: FnMut() -> Option<(K, V)>,
        K: Into<String>,
        V: Serialize,
    {
        self.fields.add_func(generator);
    }

    /// Sends the event.
    ///
    /// The event is first sampled: if it is dropped, a [`ResponseError::Sampled`] response is delivered and `Ok` is
    /// returned. Otherwise it is checked for fields, an API host, a write key and a dataset, in that order, with unset
    /// overrides resolved against the client's configuration. An event that passes is queued for transmission and its
    /// outcome is reported on the response channel.
    ///
    /// # Errors
    ///
    /// If the event has no fields, or no API host, write key or dataset could be resolved, the matching error is
    /// returned and the event is discarded. If the client has been closed, [`SendError::Transmission`] is returned.
    pub fn send(self) -> Result<(), SendError> {
        let Event { overrides, timestamp, metadata, fields, shared } = self;
        let defaults = &shared.defaults;

        let sample_rate = match overrides.sample_rate {
            0 => defaults.sample_rate,
            rate => normalize_rate(rate),
        };
        if !shared.sampler.keep(sample_rate) {
            shared.telemetry.sampled.increment(1);
            shared.responses.deliver(Response::new(metadata, Err(ResponseError::Sampled)));
            return Ok(());
        }

        let data = fields.into_inner();
        if data.is_empty() {
            return Err(SendError::EmptyEvent);
        }
        let api_host = resolve(overrides.api_host, &defaults.api_host).ok_or(SendError::MissingApiHost)?;
        let write_key = resolve(overrides.write_key, &defaults.write_key).ok_or(SendError::MissingWriteKey)?;
        let dataset = resolve(overrides.dataset, &defaults.dataset).ok_or(SendError::MissingDataset)?;

        shared.transmission.add(QueuedEvent {
            destination: Destination { api_host, write_key, dataset },
            payload: Payload { data, timestamp, sample_rate: sample_rate.get() },
            metadata,
        })?;
        Ok(())
    }
}

impl fmt::Debug for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Event")
            .field("overrides", &self.overrides)
            .field("timestamp", &self.timestamp)
            .field("metadata", &self.metadata)
            .field("fields", &self.fields)
            .finish_non_exhaustive()
    }
}

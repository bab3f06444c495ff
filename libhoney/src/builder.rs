use std::{fmt, sync::Arc};

use chrono::Utc;
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;

use crate::{
    client::Shared,
    error::{FieldError, SendError},
    event::{Event, Overrides},
    fields::{self, FieldStore},
};

type Generator = Arc<dyn Fn() -> Option<Value> + Send + Sync>;

#[derive(Clone)]
struct DynamicField {
    name: String,
    generator: Generator,
}

/// A template for events.
///
/// A builder carries fields that every event it creates starts out with, plus dynamic fields whose values are computed
/// fresh for each event. Builders also carry optional overrides for the write key, dataset, sample rate and API host;
/// unset overrides fall back to the client's configuration when an event is sent.
///
/// Cloning a builder produces a fully independent copy: adding fields or dynamic fields to the clone never affects the
/// original, and vice versa.
pub struct Builder {
    overrides: Overrides,
    fields: FieldStore,
    dynamic_fields: Mutex<Vec<DynamicField>>,
    shared: Arc<Shared>,
}

impl Builder {
    pub(crate) fn new(shared: Arc<Shared>) -> Self {
        Builder {
            overrides: Overrides::default(),
            fields: FieldStore::new(),
            dynamic_fields: Mutex::new(Vec::new()),
            shared,
        }
    }

    /// Returns the write key override, or an empty string if unset.
    pub fn write_key(&self) -> &str {
        &self.overrides.write_key
    }

    /// Overrides the write key for events created by this builder.
    pub fn set_write_key<S: Into<String>>(&mut self, write_key: S) {
        self.overrides.write_key = write_key.into();
    }

    /// Returns the dataset override, or an empty string if unset.
    pub fn dataset(&self) -> &str {
        &self.overrides.dataset
    }

    /// Overrides the dataset for events created by this builder.
    pub fn set_dataset<S: Into<String>>(&mut self, dataset: S) {
        self.overrides.dataset = dataset.into();
    }

    /// Returns the sample rate override, or 0 if unset.
    pub fn sample_rate(&self) -> u32 {
        self.overrides.sample_rate
    }

    /// Overrides the sample rate for events created by this builder. 0 means "use the client's sample rate".
    pub fn set_sample_rate(&mut self, sample_rate: u32) {
        self.overrides.sample_rate = sample_rate;
    }

    /// Returns the API host override, or an empty string if unset.
    pub fn api_host(&self) -> &str {
        &self.overrides.api_host
    }

    /// Overrides the API host for events created by this builder.
    pub fn set_api_host<S: Into<String>>(&mut self, api_host: S) {
        self.overrides.api_host = api_host.into();
    }

    /// Returns the builder's static fields.
    pub fn fields(&self) -> &FieldStore {
        &self.fields
    }

    /// Adds a static field. See [`FieldStore::add_field`].
    pub fn add_field<K, V>(&self, key: K, value: V)
    where
        K: Into<String>,
        V: Serialize,
    {
        self.fields.add_field(key, value);
    }

    /// Adds every member of a struct or entry of a map as static fields. See [`FieldStore::add`].
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

    /// Adds static fields from a generator until it is exhausted. See [`FieldStore::add_func`].
    pub fn add_func<F, K, V>(&self, generator: F)
    where
        F: FnMut() -> Option<(K, V)>,
        K: Into<String>,
        V: Serialize,
    {
        self.fields.add_func(generator);
    }

    /// Adds a dynamic field.
    ///
    /// `generator` is called once for every event created by this builder, in the order dynamic fields were added,
    /// and its value is stored under `name`. Values that would be dropped by [`add_field`][Self::add_field] are
    /// dropped here as well.
    pub fn add_dynamic_field<N, F, V>(&self, name: N, generator: F)
    where
        N: Into<String>,
        F: Fn() -> V + Send + Sync + 'static,
        V: Serialize,
    {
        let generator: Generator = Arc::new(move || fields::validate(&generator()));
        self.dynamic_fields.lock().push(DynamicField { name: name.into(), generator });
    }

    /// Creates an event from this builder.
    ///
    /// The event is timestamped with the current time and starts out with the builder's overrides, a copy of its
    /// static fields, and a freshly computed value for every dynamic field.
    pub fn new_event(&self) -> Event {
        let timestamp = Utc::now();
        let fields = self.fields.clone();

        // Generators run outside the lock so they may themselves use this builder.
        let dynamic_fields = self.dynamic_fields.lock().clone();
        for field in dynamic_fields {
            fields.insert(field.name, (field.generator)());
        }

        Event::new(self.overrides.clone(), timestamp, fields, Arc::clone(&self.shared))
    }

    /// Creates an event, adds `data` to it, and sends it.
    ///
    /// # Errors
    ///
    /// If `data` can't be added, or the event fails validation when sent, an error is returned.
    pub fn send_now<T>(&self, data: &T) -> Result<(), SendError>
    where
        T: ?Sized + Serialize,
    {
        let event = self.new_event();
        event.add(data)?;
        event.send()
    }
}

impl Clone for Builder {
    fn clone(&self) -> Self {
        Builder {
            overrides: self.overrides.clone(),
            fields: self.fields.clone(),
            dynamic_fields: Mutex::new(self.dynamic_fields.lock().clone()),
            shared: Arc::clone(&self.shared),
        }
    }
}

impl fmt::Debug for Builder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let dynamic_fields: Vec<String> =
            self.dynamic_fields.lock().iter().map(|field| field.name.clone()).collect();

        f.debug_struct("Builder")
            .field("overrides", &self.overrides)
            .field("fields", &self.fields)
            .field("dynamic_fields", &dynamic_fields)
            .finish_non_exhaustive()
    }
}

use std::{num::NonZeroU32, sync::Arc};

use crossbeam_channel::Receiver;
use serde::Serialize;
use tracing::debug;

use crate::{
    builder::Builder,
    config::Config,
    error::{FieldError, InitError, SendError},
    event::Event,
    response::{Response, ResponseChannel},
    sampler::{normalize_rate, Sampler},
    telemetry::Telemetry,
    transmission::{NullTransmission, Transmission, TransmissionConfiguration, TransmissionEngine, Transport},
};

/// Client-level defaults that events fall back to when they don't override them.
#[derive(Debug)]
pub(crate) struct Defaults {
    pub write_key: String,
    pub dataset: String,
    pub sample_rate: NonZeroU32,
    pub api_host: String,
}

/// State shared by a client and every builder and event created from it.
pub(crate) struct Shared {
    pub defaults: Defaults,
    pub sampler: Sampler,
    pub transmission: Box<dyn Transmission>,
    pub responses: Arc<ResponseChannel>,
    pub telemetry: Telemetry,
}

/// A handle for sending events.
///
/// The client owns the transmission that batches and sends events, the response channel that outcomes are reported
/// on, and a root [`Builder`] whose fields are inherited by every builder and event created from the client.
///
/// Most applications only need one client, and can use the process-wide one managed by [`init`][crate::init] and
/// friends. Creating clients directly is useful when several independently configured pipelines are needed, or in
/// tests.
pub struct Client {
    root: Builder,
    shared: Arc<Shared>,
}

impl Client {
    /// Creates a client and starts its transmission.
    ///
    /// Zero or empty settings in `config` are replaced with their defaults. Batches are sent through `transport`.
    ///
    /// # Errors
    ///
    /// If the transmission's worker threads cannot be spawned, an error is returned.
    pub fn new<T>(config: Config, transport: T) -> Result<Self, InitError>
    where
        T: Transport,
    {
        let config = config.normalize();
        let telemetry = Telemetry::new();
        let responses = Arc::new(ResponseChannel::new(
            config.pending_work_capacity.saturating_mul(2),
            config.block_on_response,
            telemetry.clone(),
        ));

        let transport: Arc<dyn Transport> = Arc::new(transport);
        let engine = TransmissionEngine::new(
            TransmissionConfiguration::from(&config),
            transport,
            Arc::clone(&responses),
            telemetry.clone(),
        );
        engine.start()?;

        Ok(Self::from_parts(config, Box::new(engine), responses, telemetry))
    }

    /// Creates a client that discards every event it is asked to send.
    ///
    /// Events are still sampled and validated, and sampled events still produce responses.
    pub fn inert() -> Self {
        Self::inert_with(Config::default())
    }

    pub(crate) fn inert_with(config: Config) -> Self {
        let config = config.normalize();
        let telemetry = Telemetry::new();
        let responses = Arc::new(ResponseChannel::new(
            config.pending_work_capacity.saturating_mul(2),
            config.block_on_response,
            telemetry.clone(),
        ));

        Self::from_parts(config, Box::new(NullTransmission), responses, telemetry)
    }

    fn from_parts(
        config: Config,
        transmission: Box<dyn Transmission>,
        responses: Arc<ResponseChannel>,
        telemetry: Telemetry,
    ) -> Self {
        let shared = Arc::new(Shared {
            defaults: Defaults {
                write_key: config.write_key,
                dataset: config.dataset,
                sample_rate: normalize_rate(config.sample_rate),
                api_host: config.api_host,
            },
            sampler: Sampler,
            transmission,
            responses,
            telemetry,
        });

        Client { root: Builder::new(Arc::clone(&shared)), shared }
    }

    /// Returns the root builder.
    pub fn root(&self) -> &Builder {
        &self.root
    }

    /// Returns a read handle for the response channel.
    ///
    /// Every event that is sampled out, dropped on queue overflow, or handed to the transport produces exactly one
    /// [`Response`]. Responses are discarded when the channel is full, unless the client was configured to block on
    /// responses. Once the client is closed and all buffered responses have been read, the channel reports
    /// disconnection.
    pub fn responses(&self) -> Receiver<Response> {
        self.shared.responses.receiver()
    }

    /// Adds a field to the root builder. See [`Builder::add_field`].
    pub fn add_field<K, V>(&self, key: K, value: V)
    where
        K: Into<String>,
        V: Serialize,
    {
        self.root.add_field(key, value);
    }

    /// Adds a struct or map to the root builder. See [`Builder::add`].
    ///
    /// # Errors
    ///
    /// If `data` is neither a struct nor a map, or has unsupported map keys, an error is returned.
    pub fn add<T>(&self, data: &T) -> Result<(), FieldError>
    where
        T: ?Sized + Serialize,
    {
        self.root.add(data)
    }

    /// Adds fields from a generator to the root builder. See [`Builder::add_func`].
    pub fn add_func<F, K, V>(&self, generator: F)
    where
        F: FnMut() -> Option<(K, V)>,
        K: Into<String>,
        V: Serialize,
    {
        self.root.add_func(generator);
    }

    /// Adds a dynamic field to the root builder. See [`Builder::add_dynamic_field`].
    pub fn add_dynamic_field<N, F, V>(&self, name: N, generator: F)
    where
        N: Into<String>,
        F: Fn() -> V + Send + Sync + 'static,
        V: Serialize,
    {
        self.root.add_dynamic_field(name, generator);
    }

    /// Creates a builder that inherits everything from the root builder.
    pub fn new_builder(&self) -> Builder {
        self.root.clone()
    }

    /// Creates an event from the root builder.
    pub fn new_event(&self) -> Event {
        self.root.new_event()
    }

    /// Creates an event from the root builder, adds `data` to it, and sends it. See [`Builder::send_now`].
    ///
    /// # Errors
    ///
    /// If `data` can't be added, or the event fails validation when sent, an error is returned.
    pub fn send_now<T>(&self, data: &T) -> Result<(), SendError>
    where
        T: ?Sized + Serialize,
    {
        self.root.send_now(data)
    }

    /// Closes the client.
    ///
    /// Blocks until every queued event has been sent and its response delivered, then closes the response channel.
    /// Events sent after closing are refused with [`TransmissionError::NotRunning`][crate::TransmissionError::NotRunning].
    pub fn close(&self) {
        debug!("Closing client.");
        self.shared.transmission.stop();
        self.shared.responses.close();
    }
}

impl Default for Client {
    fn default() -> Self {
        Client::inert()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::Client;
    use crate::Config;

    #[test]
    fn config_defaults_are_normalized() {
        let client = Client::inert_with(Config::default().with_sample_rate(0).with_api_host(""));
        assert_eq!(client.shared.defaults.sample_rate.get(), 1);
        assert_eq!(client.shared.defaults.api_host, crate::DEFAULT_API_HOST);
    }

    #[test]
    fn root_fields_are_inherited() {
        let client = Client::default();
        client.add_field("service", "api");
        client.add_dynamic_field("pid", std::process::id);

        let builder = client.new_builder();
        builder.add_field("route", "/health");

        let event = builder.new_event();
        assert_eq!(event.fields().get("service"), Some(json!("api")));
        assert_eq!(event.fields().get("route"), Some(json!("/health")));
        assert_eq!(event.fields().get("pid"), Some(json!(std::process::id())));

        // The builder was cloned before this was added.
        client.add_field("late", true);
        assert!(!builder.new_event().fields().contains_key("late"));
        assert!(client.new_event().fields().contains_key("late"));
    }

    #[test]
    fn close_disconnects_responses() {
        let client = Client::inert();
        let responses = client.responses();
        client.close();
        assert!(responses.recv().is_err());
    }
}

//! A client library for sending structured events to [Honeycomb][honeycomb].
//!
//! [honeycomb]: https://www.honeycomb.io/
//!
//! # Usage
//!
//! Events are built up from fields, sampled, batched by destination and handed to a [`Transport`] from a pool of
//! background worker threads. What happened to each event is reported back on a response channel.
//!
//! ```no_run
//! # use libhoney::{Config, Delivery, Destination, Payload, Transport, TransportError};
//! # struct HttpTransport;
//! # impl Transport for HttpTransport {
//! #     fn send(&self, _: &Destination, batch: &[Payload]) -> Vec<Result<Delivery, TransportError>> {
//! #         batch.iter().map(|_| Ok(Delivery::default())).collect()
//! #     }
//! # }
//! // First, configure the process-wide client.
//! //
//! // The transport is responsible for actually getting batches to the collector: encoding, connection handling, and
//! // any retry policy all live there.
//! let config = Config::default().with_write_key("my-write-key").with_dataset("my-service");
//! libhoney::init(config, HttpTransport).expect("failed to initialize client");
//!
//! // Fields added at the top level are inherited by every event.
//! libhoney::add_field("service", "checkout");
//! libhoney::add_dynamic_field("thread", || format!("{:?}", std::thread::current().id()));
//!
//! // Builders are templates for related events.
//! let builder = libhoney::new_builder();
//! builder.add_field("route", "/cart");
//!
//! let mut event = builder.new_event();
//! event.add_field("duration_ms", 42.5);
//! event.set_metadata("request-1");
//! event.send().expect("event was missing required settings");
//!
//! // Flush everything queued so far before exiting.
//! libhoney::close();
//!
//! for response in libhoney::responses() {
//!     println!("{:?}: {:?}", response.metadata.downcast_ref::<&'static str>(), response.outcome);
//! }
//! ```
//!
//! # Features
//!
//! ## Sampling
//!
//! Every event is subject to a sample rate, configured on the client and overridable per builder or per event. A rate
//! of `N` keeps one event out of every `N` on average. Sampled-out events never reach the transport, and produce a
//! [`ResponseError::Sampled`] response rather than an error.
//!
//! ## Batching
//!
//! Queued events are grouped by [`Destination`], the combination of API host, write key and dataset. A batch is sent
//! as soon as it holds [`Config::with_max_batch_size`] events, or once [`Config::with_send_frequency`] has elapsed
//! since its first event arrived, whichever comes first.
//!
//! ## Backpressure
//!
//! The queue of events waiting to be batched is bounded. By default, events that don't fit are dropped and reported
//! with a [`ResponseError::QueueOverflow`] response, so sending never blocks on a slow collector. Blocking can be
//! enabled with [`Config::with_block_on_send`].
//!
//! ## Telemetry
//!
//! The client reports its own activity through the [`metrics`] facade, under the `libhoney` namespace: events sampled,
//! dropped on overflow, enqueued, sent and failed, batches sent, and responses discarded. If no recorder is installed,
//! these are no-ops.
//!
//! # Clients
//!
//! The functions at the crate root operate on a process-wide [`Client`]. Before [`init`] is called that client is
//! inert, so events can be created and sent safely but go nowhere. A [`Client`] can also be created and passed around
//! explicitly, which allows several independently configured clients in one process.

#![deny(clippy::all)]
#![deny(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::struct_excessive_bools)]
#![deny(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg), deny(rustdoc::broken_intra_doc_links))]

mod builder;
pub use self::builder::Builder;

mod client;
pub use self::client::Client;

mod config;
pub use self::config::{Config, DEFAULT_API_HOST};

mod error;
pub use self::error::{FieldError, InitError, ResponseError, SendError, TransmissionError, TransportError};

mod event;
pub use self::event::Event;

mod fields;
pub use self::fields::FieldStore;

mod global;
pub use self::global::{
    add, add_dynamic_field, add_field, client, close, init, new_builder, new_event, responses, send_now,
};

mod response;
pub use self::response::{Delivery, Metadata, Response};

mod sampler;
pub use self::sampler::Sampler;

mod telemetry;

mod transmission;
pub use self::transmission::{Destination, Payload, Transport};

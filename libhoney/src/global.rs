//! Process-wide convenience layer over a default [`Client`].
//!
//! Before [`init`] is called, the default client is inert: events are sampled and validated as usual, but nothing is
//! ever sent. This makes it safe for libraries to emit events without knowing whether the application has configured
//! a client.
use std::{mem, sync::Arc};

use crossbeam_channel::Receiver;
use once_cell::sync::Lazy;
use parking_lot::RwLock;
use serde::Serialize;

use crate::{
    builder::Builder,
    client::Client,
    config::Config,
    error::{FieldError, InitError, SendError},
    event::Event,
    response::Response,
    transmission::Transport,
};

static CLIENT: Lazy<RwLock<Arc<Client>>> = Lazy::new(|| RwLock::new(Arc::new(Client::inert())));

/// Initializes the process-wide client.
///
/// Replaces the current process-wide client with one built from `config` that sends through `transport`. The client
/// being replaced is closed, which flushes anything it had queued.
///
/// # Errors
///
/// If the transmission's worker threads cannot be spawned, an error is returned and the current client is kept.
pub fn init<T>(config: Config, transport: T) -> Result<(), InitError>
where
    T: Transport,
{
    let client = Arc::new(Client::new(config, transport)?);
    let previous = mem::replace(&mut *CLIENT.write(), client);
    previous.close();
    Ok(())
}

/// Closes the process-wide client. See [`Client::close`].
pub fn close() {
    client().close();
}

/// Returns the process-wide client.
pub fn client() -> Arc<Client> {
    Arc::clone(&*CLIENT.read())
}

/// Returns a read handle for the process-wide client's response channel.
pub fn responses() -> Receiver<Response> {
    client().responses()
}

/// Adds a field to the process-wide root builder.
pub fn add_field<K, V>(key: K, value: V)
where
    K: Into<String>,
    V: Serialize,
{
    client().add_field(key, value);
}

/// Adds a struct or map to the process-wide root builder.
///
/// # Errors
///
/// If `data` is neither a struct nor a map, or has unsupported map keys, an error is returned.
pub fn add<T>(data: &T) -> Result<(), FieldError>
where
    T: ?Sized + Serialize,
{
    client().add(data)
}

/// Adds a dynamic field to the process-wide root builder.
pub fn add_dynamic_field<N, F, V>(name: N, generator: F)
where
    N: Into<String>,
    F: Fn() -> V + Send + Sync + 'static,
    V: Serialize,
{
    client().add_dynamic_field(name, generator);
}

/// Creates a builder from the process-wide root builder.
pub fn new_builder() -> Builder {
    client().new_builder()
}

/// Creates an event from the process-wide root builder.
pub fn new_event() -> Event {
    client().new_event()
}

/// Creates an event from the process-wide root builder, adds `data` to it, and sends it.
///
/// # Errors
///
/// If `data` can't be added, or the event fails validation when sent, an error is returned.
pub fn send_now<T>(data: &T) -> Result<(), SendError>
where
    T: ?Sized + Serialize,
{
    client().send_now(data)
}

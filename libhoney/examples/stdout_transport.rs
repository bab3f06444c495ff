use std::{
    io::Write as _,
    time::{Duration, Instant},
};

use bytes::Bytes;
use libhoney::{Config, Delivery, Destination, Payload, Transport, TransportError};
use rand::Rng as _;

/// Writes every batch to stdout as a JSON array.
struct StdoutTransport;

impl Transport for StdoutTransport {
    fn send(&self, destination: &Destination, batch: &[Payload]) -> Vec<Result<Delivery, TransportError>> {
        let start = Instant::now();
        let encoded = match serde_json::to_vec(batch) {
            Ok(encoded) => encoded,
            Err(e) => return batch.iter().map(|_| Err(TransportError::Request(e.to_string()))).collect(),
        };

        let mut stdout = std::io::stdout().lock();
        let written = writeln!(stdout, "{} {}/{}:", destination.api_host, destination.dataset, batch.len())
            .and_then(|()| stdout.write_all(&encoded))
            .and_then(|()| writeln!(stdout));

        batch
            .iter()
            .map(|_| match &written {
                Ok(()) => Ok(Delivery { status_code: 202, body: Bytes::new(), duration: start.elapsed() }),
                Err(e) => Err(TransportError::Request(e.to_string())),
            })
            .collect()
    }
}

fn main() {
    tracing_subscriber::fmt::init();

    let config = Config::default()
        .with_write_key("example")
        .with_dataset("stdout")
        .with_sample_rate(2)
        .with_max_batch_size(10)
        .with_send_frequency(Duration::from_millis(250));
    libhoney::init(config, StdoutTransport).expect("failed to initialize client");

    libhoney::add_field("example", "stdout_transport");
    libhoney::add_dynamic_field("thread", || format!("{:?}", std::thread::current().id()));

    let mut rng = rand::rng();
    let builder = libhoney::new_builder();
    builder.add_field("component", "worker");

    for i in 0..50 {
        let mut event = builder.new_event();
        event.add_field("iteration", i);
        event.add_field("duration_ms", rng.random_range(0.0..100.0));
        event.set_metadata(i);
        event.send().expect("event was missing required settings");
    }

    libhoney::close();

    let (mut sent, mut sampled, mut failed) = (0, 0, 0);
    for response in libhoney::responses() {
        match response.outcome {
            Ok(_) => sent += 1,
            Err(libhoney::ResponseError::Sampled) => sampled += 1,
            Err(_) => failed += 1,
        }
    }
    eprintln!("sent: {sent}, sampled: {sampled}, failed: {failed}");
}

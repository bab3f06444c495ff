use metrics::{counter, Counter};

/// Client telemetry.
///
/// `Telemetry` tracks what happened to submitted events, and is emitted through the `metrics` facade. The handles are
/// registered with whichever recorder is active when the client is created; if none is installed, the facade's no-op
/// recorder applies and all updates are discarded.
#[derive(Clone)]
pub(crate) struct Telemetry {
    pub sampled: Counter,
    pub queue_overflow: Counter,
    pub events_enqueued: Counter,
    pub batches_sent: Counter,
    pub events_sent: Counter,
    pub send_errors: Counter,
    pub responses_dropped: Counter,
}

impl Telemetry {
    /// Creates a `Telemetry` instance.
    pub fn new() -> Self {
        Self {
            sampled: counter!("libhoney.sampled"),
            queue_overflow: counter!("libhoney.queue_overflow"),
            events_enqueued: counter!("libhoney.events_enqueued"),
            batches_sent: counter!("libhoney.batches_sent"),
            events_sent: counter!("libhoney.events_sent"),
            send_errors: counter!("libhoney.send_errors"),
            responses_dropped: counter!("libhoney.responses_dropped"),
        }
    }

    /// Records the outcome of dispatching a batch.
    pub fn track_batch(&self, succeeded: u64, failed: u64) {
        self.batches_sent.increment(1);
        self.events_sent.increment(succeeded);
        self.send_errors.increment(failed);
    }
}

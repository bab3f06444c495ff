use std::time::Duration;

/// Default API host events are sent to.
pub const DEFAULT_API_HOST: &str = "https://api.honeycomb.io/";

const DEFAULT_SAMPLE_RATE: u32 = 1;
const DEFAULT_MAX_BATCH_SIZE: usize = 50;
const DEFAULT_SEND_FREQUENCY: Duration = Duration::from_millis(100);
const DEFAULT_MAX_CONCURRENT_BATCHES: usize = 80;
const DEFAULT_PENDING_WORK_CAPACITY: usize = 10_000;

/// Client configuration.
///
/// All settings are optional. If the write key and dataset are not set here, they must be set on every builder or
/// event instead. The write key, dataset, sample rate and API host can all be overridden per builder or per event.
///
/// The transmission settings (batch size, send frequency, concurrency and pending work capacity) are fixed once the
/// client is created. It is safe, and recommended, to leave them at their defaults.
#[derive(Clone, Debug)]
pub struct Config {
    pub(crate) write_key: String,
    pub(crate) dataset: String,
    pub(crate) sample_rate: u32,
    pub(crate) api_host: String,
    pub(crate) block_on_send: bool,
    pub(crate) block_on_response: bool,
    pub(crate) max_batch_size: usize,
    pub(crate) send_frequency: Duration,
    pub(crate) max_concurrent_batches: usize,
    pub(crate) pending_work_capacity: usize,
}

impl Config {
    /// Set the default write key used to authenticate events.
    #[must_use]
    pub fn with_write_key<S: Into<String>>(mut self, write_key: S) -> Self {
        self.write_key = write_key.into();
        self
    }

    /// Set the default dataset events are sent to.
    #[must_use]
    pub fn with_dataset<S: Into<String>>(mut self, dataset: S) -> Self {
        self.dataset = dataset.into();
        self
    }

    /// Set the default sample rate.
    ///
    /// A sample rate of `N` sends one event out of every `N` on average. A rate of 0 is treated as 1.
    ///
    /// Defaults to 1, meaning no sampling.
    #[must_use]
    pub fn with_sample_rate(mut self, sample_rate: u32) -> Self {
        self.sample_rate = sample_rate;
        self
    }

    /// Set the default API host events are sent to.
    ///
    /// Defaults to [`DEFAULT_API_HOST`].
    #[must_use]
    pub fn with_api_host<S: Into<String>>(mut self, api_host: S) -> Self {
        self.api_host = api_host.into();
        self
    }

    /// Sets whether sending blocks when the pending work queue is full.
    ///
    /// When disabled, events that don't fit in the queue are dropped and a queue overflow response is delivered
    /// instead.
    ///
    /// Defaults to `false`.
    #[must_use]
    pub fn with_block_on_send(mut self, block: bool) -> Self {
        self.block_on_send = block;
        self
    }

    /// Sets whether handing responses back blocks when the response channel is full.
    ///
    /// When enabled, a caller that stops reading responses will eventually stall the whole pipeline, including
    /// callers sending events. When disabled, responses that don't fit are discarded.
    ///
    /// Defaults to `false`.
    #[must_use]
    pub fn with_block_on_response(mut self, block: bool) -> Self {
        self.block_on_response = block;
        self
    }

    /// Set how many events are collected into a batch before it is sent.
    ///
    /// Defaults to 50.
    #[must_use]
    pub fn with_max_batch_size(mut self, max_batch_size: usize) -> Self {
        self.max_batch_size = max_batch_size;
        self
    }

    /// Set how long a partially filled batch may wait for more events before it is sent anyway.
    ///
    /// An interval too long to be represented as a point in time, such as [`Duration::MAX`], means a partial batch is
    /// only sent once it fills up or the client is closed.
    ///
    /// Defaults to 100 milliseconds.
    #[must_use]
    pub fn with_send_frequency(mut self, send_frequency: Duration) -> Self {
        self.send_frequency = send_frequency;
        self
    }

    /// Set how many batches can be in flight at once.
    ///
    /// This is also the number of worker threads spawned by the transmission.
    ///
    /// Defaults to 80.
    #[must_use]
    pub fn with_max_concurrent_batches(mut self, max_concurrent_batches: usize) -> Self {
        self.max_concurrent_batches = max_concurrent_batches;
        self
    }

    /// Set how many events may be queued for transmission before sends block or overflow.
    ///
    /// The response channel holds twice as many responses.
    ///
    /// Defaults to 10,000.
    #[must_use]
    pub fn with_pending_work_capacity(mut self, pending_work_capacity: usize) -> Self {
        self.pending_work_capacity = pending_work_capacity;
        self
    }

    /// Replaces zero or empty settings with their defaults.
    pub(crate) fn normalize(mut self) -> Self {
        if self.sample_rate == 0 {
            self.sample_rate = DEFAULT_SAMPLE_RATE;
        }
        if self.api_host.is_empty() {
            self.api_host = DEFAULT_API_HOST.to_owned();
        }
        if self.max_batch_size == 0 {
            self.max_batch_size = DEFAULT_MAX_BATCH_SIZE;
        }
        if self.send_frequency.is_zero() {
            self.send_frequency = DEFAULT_SEND_FREQUENCY;
        }
        if self.max_concurrent_batches == 0 {
            self.max_concurrent_batches = DEFAULT_MAX_CONCURRENT_BATCHES;
        }
        if self.pending_work_capacity == 0 {
            self.pending_work_capacity = DEFAULT_PENDING_WORK_CAPACITY;
        }
        self
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            write_key: String::new(),
            dataset: String::new(),
            sample_rate: DEFAULT_SAMPLE_RATE,
            api_host: DEFAULT_API_HOST.to_owned(),
            block_on_send: false,
            block_on_response: false,
            max_batch_size: DEFAULT_MAX_BATCH_SIZE,
            send_frequency: DEFAULT_SEND_FREQUENCY,
            max_concurrent_batches: DEFAULT_MAX_CONCURRENT_BATCHES,
            pending_work_capacity: DEFAULT_PENDING_WORK_CAPACITY,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::{Config, DEFAULT_API_HOST};

    #[test]
    fn normalize_fills_in_zero_values() {
        let config = Config::default()
            .with_sample_rate(0)
            .with_api_host("")
            .with_max_batch_size(0)
            .with_send_frequency(Duration::ZERO)
            .with_max_concurrent_batches(0)
            .with_pending_work_capacity(0)
            .normalize();

        let defaults = Config::default();
        assert_eq!(config.sample_rate, 1);
        assert_eq!(config.api_host, DEFAULT_API_HOST);
        assert_eq!(config.max_batch_size, defaults.max_batch_size);
        assert_eq!(config.send_frequency, defaults.send_frequency);
        assert_eq!(config.max_concurrent_batches, defaults.max_concurrent_batches);
        assert_eq!(config.pending_work_capacity, defaults.pending_work_capacity);
    }

    #[test]
    fn normalize_keeps_explicit_values() {
        let config = Config::default()
            .with_write_key("key")
            .with_dataset("dataset")
            .with_sample_rate(20)
            .with_api_host("http://localhost:8080")
            .with_max_batch_size(3)
            .normalize();

        assert_eq!(config.write_key, "key");
        assert_eq!(config.dataset, "dataset");
        assert_eq!(config.sample_rate, 20);
        assert_eq!(config.api_host, "http://localhost:8080");
        assert_eq!(config.max_batch_size, 3);
    }
}

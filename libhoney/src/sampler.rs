use std::num::NonZeroU32;

use rand::Rng as _;

/// Probabilistic inclusion filter applied to every event before it is queued.
///
/// For a sample rate of `N`, each event is kept with a probability of `1/N`, based on an independent uniform draw
/// from `[0, N)`. A rate of 1 keeps everything.
#[derive(Clone, Debug, Default)]
pub struct Sampler;

impl Sampler {
    /// Returns `true` if an event sampled at `rate` should be kept.
    pub fn keep(&self, rate: NonZeroU32) -> bool {
        let rate = rate.get();
        rate == 1 || rand::rng().random_range(0..rate) == 0
    }
}

/// Converts a configured sample rate into a sampler rate, treating 0 as "no sampling".
pub(crate) fn normalize_rate(rate: u32) -> NonZeroU32 {
    NonZeroU32::new(rate).unwrap_or(NonZeroU32::MIN)
}

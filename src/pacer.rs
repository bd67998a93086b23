use rand::Rng;
use std::time::Duration;

/// Randomized delay between detail fetches: `base + uniform(0..=jitter)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pacer {
    base: Duration,
    jitter: Duration,
}

impl Default for Pacer {
    fn default() -> Self {
        Self::new(Duration::from_millis(2000), Duration::from_millis(3000))
    }
}

impl Pacer {
    pub fn new(base: Duration, jitter: Duration) -> Self {
        Self { base, jitter }
    }

    #[cfg(test)]
    pub fn none() -> Self {
        Self::new(Duration::ZERO, Duration::ZERO)
    }

    pub fn next_delay<R: Rng>(&self, rng: &mut R) -> Duration {
        let jitter_ms = self.jitter.as_millis() as u64;
        let extra = if jitter_ms == 0 {
            0
        } else {
            rng.gen_range(0..=jitter_ms)
        };
        self.base + Duration::from_millis(extra)
    }

    /// Suspend the batch before the next item.
    pub async fn pause(&self) {
        let delay = self.next_delay(&mut rand::thread_rng());
        if delay.is_zero() {
            return;
        }
        tracing::debug!(delay_ms = delay.as_millis() as u64, "pacing before next item");
        tokio::time::sleep(delay).await;
    }
}

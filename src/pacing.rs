//! Jittered delays between requests and attempts.

use std::time::Duration;

use rand::Rng;

/// `base` plus a uniformly random extra in `0..=jitter`.
pub fn jittered(base: Duration, jitter: Duration) -> Duration {
    #[allow(clippy::cast_possible_truncation)]
    let jitter_ms = jitter.as_millis() as u64;
    if jitter_ms == 0 {
        return base;
    }
    base + Duration::from_millis(rand::rng().random_range(0..=jitter_ms))
}

/// Sleep for a jittered delay. Zero delays return without yielding to the
/// timer.
pub async fn pause(base: Duration, jitter: Duration) {
    let delay = jittered(base, jitter);
    if delay.is_zero() {
        return;
    }
    tracing::debug!(delay_ms = delay.as_millis() as u64, "Pausing");
    tokio::time::sleep(delay).await;
}

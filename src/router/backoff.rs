// ABOUTME: Exponential backoff with full jitter for task retries (§4.E)
// ABOUTME: First retry lands near base_ms; later retries saturate at cap_ms

use rand::Rng;
use std::time::Duration;

/// Compute the delay before retry number `attempt` (1-indexed), using full jitter between
/// zero and `min(base_ms * 2^(attempt-1), cap_ms)`.
#[must_use]
pub fn delay(attempt: u32, base_ms: u64, cap_ms: u64) -> Duration {
    let shift = attempt.saturating_sub(1).min(20);
    let exponential = base_ms.saturating_mul(1u64 << shift);
    let capped = exponential.min(cap_ms).max(1);
    let jittered = rand::thread_rng().gen_range(1..=capped);
    Duration::from_millis(jittered)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delay_stays_within_cap() {
        for attempt in 1..10 {
            let d = delay(attempt, 250, 30_000);
            assert!(d.as_millis() <= 30_000);
            assert!(d.as_millis() >= 1);
        }
    }

    #[test]
    fn delay_grows_with_attempt_on_average() {
        let low = delay(1, 250, 30_000).as_millis();
        let high_cap = delay(10, 250, 30_000).as_millis();
        assert!(low <= 250);
        assert!(high_cap <= 30_000);
    }
}

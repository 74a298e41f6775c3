//! Deterministic exponential backoff shared by the instance lifecycle
//! manager's initialize retries and the server-init coordinator's retry
//! loop.
//!
//! Deltas are pinned to exact values (`1s, 2s, 4s` capped at `8s` for the
//! default config) so this helper is plain arithmetic rather than anything
//! jittered — determinism is a testability requirement here, not an
//! afterthought.

use std::time::Duration;

/// Delay before the `attempt`-th retry (1-indexed), `base * 2^(attempt-1)`
/// capped at `max`. `attempt == 0` returns zero delay (no retries made
/// yet).
#[must_use]
pub fn delay_for_attempt(base: Duration, max: Duration, attempt: u32) -> Duration {
    if attempt == 0 {
        return Duration::ZERO;
    }
    let shift = attempt.saturating_sub(1).min(31);
    let scaled = base.as_secs_f64() * 2f64.powi(shift as i32);
    let capped = scaled.min(max.as_secs_f64());
    Duration::from_secs_f64(capped)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_deltas_match_exponential_schedule() {
        // retryBase=1s, retryMax=8s -> deltas 1s, 2s, 4s.
        let base = Duration::from_secs(1);
        let max = Duration::from_secs(8);
        assert_eq!(delay_for_attempt(base, max, 1), Duration::from_secs(1));
        assert_eq!(delay_for_attempt(base, max, 2), Duration::from_secs(2));
        assert_eq!(delay_for_attempt(base, max, 3), Duration::from_secs(4));
    }

    #[test]
    fn delay_is_capped_at_max() {
        let base = Duration::from_secs(1);
        let max = Duration::from_secs(8);
        assert_eq!(delay_for_attempt(base, max, 10), max);
    }

    #[test]
    fn zero_attempts_is_zero_delay() {
        assert_eq!(
            delay_for_attempt(Duration::from_secs(1), Duration::from_secs(8), 0),
            Duration::ZERO
        );
    }
}

//! Delay between retry attempts.

use std::time::Duration;

use rand::Rng;

/// Delay to wait after failed attempt number `attempt` (1-based).
///
/// Doubles from `base_ms` per attempt, capped at `max_ms`, plus up to 10%
/// jitter. A zero `base_ms` means retries fire back to back.
pub fn calculate_backoff(attempt: u32, base_ms: u64, max_ms: u64) -> Duration {
    if attempt == 0 || base_ms == 0 {
        return Duration::ZERO;
    }

    let factor = 1u64.checked_shl(attempt - 1).unwrap_or(u64::MAX);
    let delay_ms = base_ms.saturating_mul(factor).min(max_ms);

    let jitter_ms = match delay_ms / 10 {
        0 => 0,
        spread => rand::thread_rng().gen_range(0..spread),
    };

    Duration::from_millis(delay_ms + jitter_ms)
}

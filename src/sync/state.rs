//! Per-key sync state and retry backoff.

use std::time::Duration;

use chrono::{DateTime, Utc};
use rand::Rng;

/// Lifecycle of one endpoint key.
///
/// `Fresh` serves from the offline store with no network. `Stale` serves
/// the cached value and triggers a refetch. `Fetching` has a request in
/// flight; concurrent callers coalesce onto it. `Degraded` means repeated
/// failures - cache keeps serving until a successful fetch or an explicit
/// forced refresh.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyState {
    Fresh,
    Stale,
    Fetching,
    Degraded,
}

impl KeyState {
    pub fn as_str(&self) -> &'static str {
        match self {
            KeyState::Fresh => "fresh",
            KeyState::Stale => "stale",
            KeyState::Fetching => "fetching",
            KeyState::Degraded => "degraded",
        }
    }
}

/// Retry bookkeeping for a failing key. Ephemeral - never persisted,
/// cleared on the first subsequent success.
#[derive(Debug, Clone)]
pub struct FetchAttempt {
    pub failures: u32,
    pub next_retry_at: DateTime<Utc>,
}

/// Upper bound on the doubling exponent; beyond this the cap always wins
/// and shifting further would overflow.
const MAX_BACKOFF_EXPONENT: u32 = 16;

/// Jitter ceiling added on top of the deterministic delay, to avoid a
/// thundering herd across keys sharing a host.
const JITTER_CEILING_MS: u64 = 250;

/// Deterministic exponential backoff: `base * 2^(failures-1)`, capped.
/// Strictly non-decreasing in `failures`.
pub fn backoff_base(failures: u32, base_ms: u64, cap_ms: u64) -> Duration {
    let exponent = failures.saturating_sub(1).min(MAX_BACKOFF_EXPONENT);
    let delay_ms = base_ms.saturating_mul(1u64 << exponent).min(cap_ms);
    Duration::from_millis(delay_ms)
}

/// Backoff with random jitter on top of the deterministic component.
pub fn backoff_with_jitter(failures: u32, base_ms: u64, cap_ms: u64) -> Duration {
    let jitter = rand::thread_rng().gen_range(0..=JITTER_CEILING_MS);
    backoff_base(failures, base_ms, cap_ms) + Duration::from_millis(jitter)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_doubles_from_base() {
        assert_eq!(backoff_base(1, 1_000, 30_000), Duration::from_millis(1_000));
        assert_eq!(backoff_base(2, 1_000, 30_000), Duration::from_millis(2_000));
        assert_eq!(backoff_base(3, 1_000, 30_000), Duration::from_millis(4_000));
        assert_eq!(backoff_base(4, 1_000, 30_000), Duration::from_millis(8_000));
    }

    #[test]
    fn test_backoff_is_monotonic_and_capped() {
        let mut previous = Duration::ZERO;
        for failures in 1..=20 {
            let delay = backoff_base(failures, 1_000, 30_000);
            assert!(delay >= previous, "delay decreased at attempt {}", failures);
            assert!(delay <= Duration::from_millis(30_000));
            previous = delay;
        }
        assert_eq!(backoff_base(20, 1_000, 30_000), Duration::from_millis(30_000));
    }

    #[test]
    fn test_backoff_survives_extreme_inputs() {
        // Shift overflow would panic in debug builds without the exponent clamp.
        let delay = backoff_base(u32::MAX, u64::MAX, 30_000);
        assert_eq!(delay, Duration::from_millis(30_000));
    }

    #[test]
    fn test_jitter_never_undershoots_base() {
        for failures in 1..=5 {
            let base = backoff_base(failures, 1_000, 30_000);
            let jittered = backoff_with_jitter(failures, 1_000, 30_000);
            assert!(jittered >= base);
            assert!(jittered <= base + Duration::from_millis(JITTER_CEILING_MS));
        }
    }
}

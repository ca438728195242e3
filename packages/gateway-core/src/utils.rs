//! General utilities shared across the gateway.

use std::time::{SystemTime, UNIX_EPOCH};

/// Returns the current Unix timestamp in milliseconds.
///
/// Returns 0 if the system clock is before the Unix epoch (shouldn't happen in practice).
#[must_use]
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Milliseconds elapsed since `start`, wrapped into a `u32` modulo 2^32, as
/// required for the datagram header's `timestamp` field.
#[must_use]
pub fn elapsed_ms_wrapped(start: std::time::Instant) -> u32 {
    (start.elapsed().as_millis() % (u32::MAX as u128 + 1)) as u32
}

/// Generates a random non-zero 32-bit id, suitable for connection ids and
/// MCP request ids that must never be zero.
#[must_use]
pub fn random_nonzero_u32() -> u32 {
    loop {
        let candidate: u32 = rand::random();
        if candidate != 0 {
            return candidate;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn now_millis_is_plausible() {
        let now = now_millis();
        assert!(now > 1_700_000_000_000);
    }

    #[test]
    fn random_nonzero_is_never_zero() {
        for _ in 0..1000 {
            assert_ne!(random_nonzero_u32(), 0);
        }
    }
}

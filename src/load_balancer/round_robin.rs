//! Round-robin rotation cursor.

use std::sync::atomic::{AtomicUsize, Ordering};

/// Shared rotation counter owned by a router.
///
/// Every claim gets a distinct counter value, so concurrent callers never
/// share a slot. The counter wraps on overflow; the only effect is one
/// uneven step of the rotation every `usize::MAX` claims.
#[derive(Debug, Default)]
pub struct RoundRobin {
    counter: AtomicUsize,
}

impl RoundRobin {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub(crate) fn starting_at(value: usize) -> Self {
        Self {
            counter: AtomicUsize::new(value),
        }
    }

    /// Claim the next slot among `len` entries. `len` must be non-zero.
    pub fn claim(&self, len: usize) -> usize {
        // fetch_add wraps on overflow
        self.counter.fetch_add(1, Ordering::Relaxed) % len
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_robin() {
        let rr = RoundRobin::new();
        let claims: Vec<usize> = (0..7).map(|_| rr.claim(3)).collect();
        assert_eq!(claims, vec![0, 1, 2, 0, 1, 2, 0]);
    }

    #[test]
    fn test_wraps_at_counter_overflow() {
        let rr = RoundRobin::starting_at(usize::MAX - 1);
        let claims: Vec<usize> = (0..4).map(|_| rr.claim(4)).collect();
        assert_eq!(claims, vec![2, 3, 0, 1]);
    }
}

// Event sequence tracking
//
// The gateway numbers every push message. Gaps are only logged; there is
// no retransmission, so the tracker resynchronises to what it observed.

use tracing::warn;

pub const SEQUENCE_KEY: &str = "com.prosyst.mbs.services.remote.event.sequence.number";

/// Expected sequence number of the next push message.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SequenceTracker {
    expected: u64,
}

impl SequenceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn expected(self) -> u64 {
        self.expected
    }

    /// Record an observed sequence number. Returns `false` on a gap.
    pub fn observe(&mut self, observed: u64) -> bool {
        let in_order = observed == self.expected;
        if !in_order {
            warn!(
                expected = self.expected,
                observed, "push event sequence mismatch, messages may be lost"
            );
        }
        self.expected = observed.wrapping_add(1);
        in_order
    }

    /// Start over after the socket was lost.
    pub fn reset(&mut self) {
        self.expected = 0;
    }
}

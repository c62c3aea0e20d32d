/// Per-session sequence number source.
///
/// Numbers are pre-incremented, so the first reserved value is 1. A
/// reservation whose send failed can be handed back with
/// [`SequenceCounter::rollback`], and the next reservation reuses it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SequenceCounter {
    last: u64,
}

impl SequenceCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserve the next number.
    pub fn reserve(&mut self) -> u64 {
        self.last = self.last.wrapping_add(1);
        self.last
    }

    /// Release the most recent reservation.
    pub fn rollback(&mut self) {
        self.last = self.last.wrapping_sub(1);
    }

    /// The last reserved number, 0 before the first reservation.
    pub fn last(&self) -> u64 {
        self.last
    }

    pub fn reset(&mut self) {
        self.last = 0;
    }
}

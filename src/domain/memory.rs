use std::collections::VecDeque;

use tracing::debug;

use super::types::Turn;

/// Bounded, ordered log of the dialogue turns belonging to one session.
///
/// Appending past capacity evicts the oldest turns first, so the retained
/// sequence is always a contiguous suffix of the full history. The store has
/// no internal locking: the owning session serializes access by processing at
/// most one job at a time.
#[derive(Debug)]
pub struct ConversationMemory {
    turns: VecDeque<Turn>,
    capacity: usize,
}

impl ConversationMemory {
    /// A capacity of zero is clamped to one so the store always retains at
    /// least the latest turn.
    pub fn new(capacity: usize) -> Self {
        Self {
            turns: VecDeque::new(),
            capacity: capacity.max(1),
        }
    }

    /// Adds turns in order at the tail, evicting from the front once the
    /// capacity is exceeded. Always succeeds.
    pub fn append(&mut self, turns: impl IntoIterator<Item = Turn>) {
        for turn in turns {
            self.turns.push_back(turn);
        }
        let mut evicted = 0usize;
        while self.turns.len() > self.capacity {
            self.turns.pop_front();
            evicted += 1;
        }
        if evicted > 0 {
            debug!(evicted, retained = self.turns.len(), "Evicted oldest turns");
        }
    }

    /// Current ordered history as a read-only slice.
    pub fn all(&mut self) -> &[Turn] {
        self.turns.make_contiguous();
        self.turns.as_slices().0
    }

    pub fn count(&self) -> usize {
        self.turns.len()
    }

    pub fn clear(&mut self) {
        self.turns.clear();
    }
}

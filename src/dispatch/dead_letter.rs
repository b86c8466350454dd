use crate::events::types::DeadLetter;
use dashmap::DashMap;
use std::collections::VecDeque;
use tracing::warn;

/// In-memory dead letters, kept per use case
#[derive(Debug)]
pub struct DeadLetterStore {
    letters: DashMap<String, VecDeque<DeadLetter>>,
    capacity: usize,
}

impl DeadLetterStore {
    pub fn new(capacity: usize) -> Self {
        Self {
            letters: DashMap::new(),
            capacity,
        }
    }

    pub fn push(&self, letter: DeadLetter) {
        if self.capacity == 0 {
            return;
        }

        let mut queue = self.letters.entry(letter.use_case.clone()).or_default();
        if queue.len() >= self.capacity {
            if let Some(evicted) = queue.pop_front() {
                warn!(
                    use_case = %evicted.use_case,
                    event_id = %evicted.event.id,
                    capacity = self.capacity,
                    "Dead letter capacity reached, evicting oldest"
                );
            }
        }
        queue.push_back(letter);
    }

    /// Dead letters for a use case, oldest first
    pub fn get(&self, use_case: &str) -> Vec<DeadLetter> {
        self.letters
            .get(use_case)
            .map(|queue| queue.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Remove and return the dead letters for a use case
    pub fn take(&self, use_case: &str) -> Vec<DeadLetter> {
        self.letters
            .remove(use_case)
            .map(|(_, queue)| queue.into_iter().collect())
            .unwrap_or_default()
    }

    pub fn total(&self) -> usize {
        self.letters.iter().map(|queue| queue.len()).sum()
    }
}

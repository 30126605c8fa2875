//! Per-(protocol, participant) checkpoint numbering.

use std::collections::HashMap;

use crate::types::ParticipantId;

/// Hands out monotonically increasing checkpoint numbers, starting at 0,
/// independently for every (protocol, participant) pair.
///
/// Owned by the single collector task and passed explicitly; there is no
/// process-wide counter.
#[derive(Debug, Default)]
pub struct CheckpointCounter {
    next: HashMap<(String, ParticipantId), u64>,
}

impl CheckpointCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the next checkpoint for the pair and advances it.
    pub fn next(&mut self, protocol: &str, participant: &ParticipantId) -> u64 {
        let slot = self
            .next
            .entry((protocol.to_string(), participant.clone()))
            .or_insert(0);
        let checkpoint = *slot;
        *slot += 1;
        checkpoint
    }

    /// Checkpoints issued so far for the pair.
    pub fn issued(&self, protocol: &str, participant: &ParticipantId) -> u64 {
        self.next
            .get(&(protocol.to_string(), participant.clone()))
            .copied()
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_are_independent() {
        let mut counter = CheckpointCounter::new();
        let p1 = ParticipantId::from("p1");
        let p2 = ParticipantId::from("p2");

        assert_eq!(counter.next("cyclon", &p1), 0);
        assert_eq!(counter.next("cyclon", &p1), 1);
        assert_eq!(counter.next("cyclon", &p2), 0);
        assert_eq!(counter.next("polder", &p1), 0);
        assert_eq!(counter.next("cyclon", &p1), 2);

        assert_eq!(counter.issued("cyclon", &p1), 3);
        assert_eq!(counter.issued("scribe", &p1), 0);
    }
}

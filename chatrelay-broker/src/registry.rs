use std::collections::HashSet;

use chatrelay_core::DestinationId;

/// Destinations known to exist on the broker
///
/// Owned by the [`Provisioner`](crate::Provisioner) and only touched from the
/// return handler task, so it carries no lock. Entries are never removed:
/// queues are durable for the life of the process.
#[derive(Debug, Default)]
pub struct DestinationRegistry {
    known: HashSet<DestinationId>,
}

impl DestinationRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn contains(&self, destination: DestinationId) -> bool {
        self.known.contains(&destination)
    }

    /// Returns `false` if the destination was already recorded
    pub fn insert(&mut self, destination: DestinationId) -> bool {
        self.known.insert(destination)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.known.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.known.is_empty()
    }
}

use chatrelay_core::DestinationId;
use tracing::{debug, info};

use crate::{DestinationRegistry, Error, Publisher, Result};

/// Outcome of [`Provisioner::ensure`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provisioned {
    AlreadyProvisioned,
    NewlyProvisioned,
}

/// Lazily creates destination queues
///
/// Checks the registry first and only declares on a miss. A failed declare
/// leaves the registry untouched, so the next return for that destination
/// tries again from scratch.
pub struct Provisioner {
    registry: DestinationRegistry,
    publisher: Publisher,
}

impl Provisioner {
    #[must_use]
    pub fn new(publisher: Publisher) -> Self {
        Self {
            registry: DestinationRegistry::new(),
            publisher,
        }
    }

    pub async fn ensure(&mut self, destination: DestinationId) -> Result<Provisioned> {
        if self.registry.contains(destination) {
            debug!(destination = %destination, "Destination already provisioned");
            return Ok(Provisioned::AlreadyProvisioned);
        }

        let queue = destination.routing_key();
        self.publisher
            .declare(&queue)
            .await
            .map_err(|e| Error::Provisioning {
                queue: queue.clone(),
                reason: e.to_string(),
            })?;

        self.registry.insert(destination);
        info!(queue = %queue, destination = %destination, "Declared new queue");
        Ok(Provisioned::NewlyProvisioned)
    }

    #[must_use]
    pub const fn registry(&self) -> &DestinationRegistry {
        &self.registry
    }
}

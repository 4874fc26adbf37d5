use serde::{Deserialize, Serialize};

/// Prefix of every per-destination queue name and routing key.
pub const ROUTING_KEY_PREFIX: &str = "chat_";

/// Identifier of a per-recipient destination (a Telegram chat id)
///
/// The broker queue for a destination is named `chat_<id>` and the same
/// string is used as the routing key on the default exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DestinationId(pub i64);

impl DestinationId {
    #[must_use]
    pub const fn new(id: i64) -> Self {
        Self(id)
    }

    #[must_use]
    pub const fn get(self) -> i64 {
        self.0
    }

    /// Queue name / routing key for this destination
    #[must_use]
    pub fn routing_key(self) -> String {
        format!("{ROUTING_KEY_PREFIX}{}", self.0)
    }

    /// Recover the destination from a routing key built by [`Self::routing_key`].
    ///
    /// Returns `None` for keys outside the `chat_<decimal>` convention.
    #[must_use]
    pub fn from_routing_key(routing_key: &str) -> Option<Self> {
        let digits = routing_key.strip_prefix(ROUTING_KEY_PREFIX)?;
        // i64::from_str accepts a leading '+', which routing_key() never produces
        if digits.starts_with('+') {
            return None;
        }
        digits.parse::<i64>().ok().map(Self)
    }
}

impl std::fmt::Display for DestinationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for DestinationId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

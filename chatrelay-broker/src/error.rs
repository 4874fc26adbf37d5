//! Error types for the broker side of the relay

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("AMQP error: {0}")]
    Amqp(#[from] lapin::Error),

    #[error("Broker channel closed")]
    ChannelClosed,

    #[error("Invalid routing key: {0}")]
    InvalidRoutingKey(String),

    #[error("Failed to provision {queue}: {reason}")]
    Provisioning { queue: String, reason: String },

    #[error("Broker error: {0}")]
    Broker(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl From<Error> for chatrelay_core::Error {
    fn from(err: Error) -> Self {
        Self::Publish(err.to_string())
    }
}

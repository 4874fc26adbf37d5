pub mod bootstrap;
pub mod config;
pub mod error;
pub mod logging;
pub mod models;
pub mod relay;

pub use config::Config;
pub use error::{Error, Result};
pub use models::{
    DestinationId, Event, InboundMessage, MessagePayload, PendingMessage, ReturnedMessage,
};
pub use relay::{EventPublisher, Relay, RelayStats, UpdateSource};

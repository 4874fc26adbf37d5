pub mod destination;
pub mod event;
pub mod message;

pub use destination::{DestinationId, ROUTING_KEY_PREFIX};
pub use event::{Event, InboundMessage, MessagePayload};
pub use message::{PendingMessage, ReturnedMessage, CONTENT_TYPE_JSON};

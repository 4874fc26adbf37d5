pub mod amqp;
pub mod channel;
pub mod error;
pub mod memory;
pub mod provisioner;
pub mod publisher;
pub mod registry;
pub mod returns;

pub use amqp::AmqpBroker;
pub use channel::BrokerChannel;
pub use error::{Error, Result};
pub use memory::MemoryBroker;
pub use provisioner::{Provisioned, Provisioner};
pub use publisher::Publisher;
pub use registry::DestinationRegistry;
pub use returns::{ReturnHandler, ReturnStats};

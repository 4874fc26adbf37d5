//! AMQP broker backed by `lapin`
//!
//! Publisher confirms are enabled on the channel so that a mandatory publish
//! the broker cannot route comes back attached to its confirmation. A pump
//! task awaits confirmations in publish order and forwards those returns to
//! the return handler.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use chatrelay_core::config::BrokerConfig;
use chatrelay_core::{PendingMessage, ReturnedMessage};
use lapin::message::BasicReturnMessage;
use lapin::options::{BasicPublishOptions, ConfirmSelectOptions, QueueDeclareOptions};
use lapin::publisher_confirm::PublisherConfirm;
use lapin::types::{AMQPValue, FieldTable};
use lapin::{BasicProperties, Channel, Connection, ConnectionProperties};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::{BrokerChannel, Error, Result};

/// Header carrying [`PendingMessage::attempt`] through a broker return
pub const ATTEMPT_HEADER: &str = "x-relay-attempt";

const CLOSE_REPLY_CODE: u16 = 200;

pub struct AmqpBroker {
    connection: Connection,
    channel: Channel,
    /// Taken on close so the confirm pump, and with it the returns stream,
    /// can finish
    confirms: Mutex<Option<mpsc::UnboundedSender<PublisherConfirm>>>,
}

impl AmqpBroker {
    /// Connect, open a confirm-mode channel and start the confirm pump
    ///
    /// The receiver yields every mandatory publish the broker returned and
    /// closes after [`Self::close`].
    pub async fn connect(
        config: &BrokerConfig,
    ) -> Result<(Arc<Self>, mpsc::UnboundedReceiver<ReturnedMessage>)> {
        let properties =
            ConnectionProperties::default().with_connection_name(config.connection_name.clone().into());
        let connection = Connection::connect(&config.url, properties).await?;
        let channel = connection.create_channel().await?;
        channel.confirm_select(ConfirmSelectOptions::default()).await?;

        let (confirms_tx, confirms_rx) = mpsc::unbounded_channel();
        let (returns_tx, returns_rx) = mpsc::unbounded_channel();
        tokio::spawn(pump_confirms(confirms_rx, returns_tx));

        info!(
            connection_name = %config.connection_name,
            channel_id = channel.id(),
            "Connected to AMQP broker"
        );

        let broker = Self {
            connection,
            channel,
            confirms: Mutex::new(Some(confirms_tx)),
        };
        Ok((Arc::new(broker), returns_rx))
    }

    /// Close channel and connection
    ///
    /// Outstanding confirmations resolve (or fail) as the channel closes,
    /// after which the returns stream ends.
    pub async fn close(&self) -> Result<()> {
        self.confirms.lock().take();
        self.channel
            .close(CLOSE_REPLY_CODE, "relay shutting down")
            .await?;
        self.connection
            .close(CLOSE_REPLY_CODE, "relay shutting down")
            .await?;
        info!("AMQP connection closed");
        Ok(())
    }
}

#[async_trait]
impl BrokerChannel for AmqpBroker {
    async fn publish(&self, message: &PendingMessage) -> Result<()> {
        let confirms = self.confirms.lock().clone().ok_or(Error::ChannelClosed)?;

        let mut headers = FieldTable::default();
        headers.insert(
            ATTEMPT_HEADER.into(),
            AMQPValue::LongLongInt(i64::from(message.attempt)),
        );
        let mut properties = BasicProperties::default().with_headers(headers);
        if let Some(content_type) = &message.content_type {
            properties = properties.with_content_type(content_type.as_str().into());
        }

        let confirm = self
            .channel
            .basic_publish(
                "",
                &message.routing_key,
                BasicPublishOptions {
                    mandatory: true,
                    ..BasicPublishOptions::default()
                },
                &message.body,
                properties,
            )
            .await?;

        if confirms.send(confirm).is_err() {
            debug!(routing_key = %message.routing_key, "Confirm pump gone, return will not be observed");
        }
        Ok(())
    }

    async fn declare_destination(&self, queue: &str) -> Result<()> {
        self.channel
            .queue_declare(
                queue,
                QueueDeclareOptions {
                    durable: true,
                    ..QueueDeclareOptions::default()
                },
                FieldTable::default(),
            )
            .await?;
        Ok(())
    }
}

/// Await confirmations in publish order and forward attached returns
async fn pump_confirms(
    mut confirms: mpsc::UnboundedReceiver<PublisherConfirm>,
    returns: mpsc::UnboundedSender<ReturnedMessage>,
) {
    while let Some(confirm) = confirms.recv().await {
        let confirmation = match confirm.await {
            Ok(confirmation) => confirmation,
            Err(e) => {
                warn!(error = %e, "Publisher confirmation failed");
                continue;
            }
        };

        if confirmation.is_nack() {
            warn!("Broker nacked a publish");
        }

        if let Some(returned) = confirmation.take_message() {
            if returns.send(returned_message(returned)).is_err() {
                debug!("Return handler gone, dropping returned message");
            }
        }
    }
    debug!("Confirm pump stopped");
}

fn returned_message(returned: BasicReturnMessage) -> ReturnedMessage {
    let reply_code = returned.reply_code;
    let reply_text = returned.reply_text.to_string();
    let delivery = returned.delivery;

    ReturnedMessage {
        message: PendingMessage {
            routing_key: delivery.routing_key.to_string(),
            content_type: delivery
                .properties
                .content_type()
                .as_ref()
                .map(ToString::to_string),
            body: Bytes::from(delivery.data),
            attempt: attempt_from_headers(delivery.properties.headers().as_ref()),
        },
        reply_code,
        reply_text,
    }
}

/// Read [`ATTEMPT_HEADER`]; messages without it count as first attempts
fn attempt_from_headers(headers: Option<&FieldTable>) -> u32 {
    let Some(headers) = headers else {
        return 0;
    };

    headers
        .inner()
        .iter()
        .find(|(key, _)| key.as_str() == ATTEMPT_HEADER)
        .and_then(|(_, value)| match value {
            AMQPValue::LongLongInt(n) => u32::try_from(*n).ok(),
            AMQPValue::LongInt(n) => u32::try_from(*n).ok(),
            AMQPValue::LongUInt(n) => Some(*n),
            AMQPValue::ShortInt(n) => u32::try_from(*n).ok(),
            AMQPValue::ShortShortInt(n) => u32::try_from(*n).ok(),
            _ => None,
        })
        .unwrap_or(0)
}

//! Relay lifecycle management
//!
//! Wires the Telegram source, the publisher task and the return handler
//! together, and tears them down in order on shutdown:
//! 1. the signal cancels the relay, which finishes its in-flight batch
//! 2. the broker connection is closed, ending the returns stream
//! 3. the return handler drains what was already returned and exits
//! 4. the publisher task exits once its last handle is gone

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use chatrelay_broker::{AmqpBroker, Provisioner, Publisher, ReturnHandler};
use chatrelay_core::{Config, Relay, ReturnedMessage};
use chatrelay_telegram::TelegramClient;

/// Upper bound on waiting for background tasks after the relay stops
const DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

pub struct RelayServer {
    config: Config,
    source: TelegramClient,
    broker: Arc<AmqpBroker>,
    returns: mpsc::UnboundedReceiver<ReturnedMessage>,
}

impl RelayServer {
    pub async fn connect(config: Config) -> anyhow::Result<Self> {
        let source = TelegramClient::new(&config.telegram.api_url, &config.telegram.bot_token)
            .context("Failed to create Telegram client")?;
        info!("Telegram client initialized");

        let (broker, returns) = AmqpBroker::connect(&config.broker)
            .await
            .context("Failed to connect to AMQP broker")?;

        Ok(Self {
            config,
            source,
            broker,
            returns,
        })
    }

    /// Run the relay until a shutdown signal, then shut down gracefully
    pub async fn run(self) -> anyhow::Result<()> {
        let Self {
            config,
            source,
            broker,
            returns,
        } = self;

        let (publisher, publisher_task) =
            Publisher::spawn(broker.clone(), config.relay.publish_queue_capacity);

        let mut return_handler =
            ReturnHandler::new(Provisioner::new(publisher.clone()), publisher.clone(), returns);
        let return_task = tokio::spawn(async move { return_handler.run().await });

        let cancel = CancellationToken::new();
        let signal_cancel = cancel.clone();
        tokio::spawn(async move {
            shutdown_signal().await;
            info!("Shutdown signal received, finishing in-flight batch...");
            signal_cancel.cancel();
        });

        let mut relay = Relay::new(source, publisher, config.relay.options());
        let result = relay.run(cancel).await;
        info!(cursor = relay.cursor(), "Polling loop ended");
        // Releases the relay's publisher handle
        drop(relay);

        if let Err(e) = broker.close().await {
            warn!(error = %e, "Failed to close AMQP connection cleanly");
        }

        match tokio::time::timeout(DRAIN_TIMEOUT, return_task).await {
            Ok(Ok(stats)) => info!(
                received = stats.received,
                retried = stats.retried,
                dropped = stats.dropped,
                "Return handler finished"
            ),
            Ok(Err(e)) => error!(error = %e, "Return handler task failed"),
            Err(_) => warn!("Return handler did not finish within drain timeout"),
        }

        match tokio::time::timeout(DRAIN_TIMEOUT, publisher_task).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => error!(error = %e, "Publisher task failed"),
            Err(_) => warn!("Publisher task did not finish within drain timeout"),
        }

        result.context("Polling loop ended with error")
    }
}

/// Wait for a shutdown signal (SIGTERM or SIGINT/Ctrl+C)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => { info!("Received Ctrl+C"); }
        () = terminate => { info!("Received SIGTERM"); }
    }
}

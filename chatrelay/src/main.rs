mod server;

use anyhow::Result;
use tracing::info;

use chatrelay_core::{bootstrap::load_config, logging};

use server::RelayServer;

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Load and validate configuration (logs to stderr, logging is not up yet)
    let config = load_config()?;

    // 2. Initialize logging
    logging::init_logging(&config.logging)?;
    info!(
        version = env!("CARGO_PKG_VERSION"),
        api_url = %config.telegram.api_url,
        "chatrelay starting..."
    );

    // 3. Connect to Telegram and the broker
    let server = RelayServer::connect(config).await?;

    // 4. Relay until SIGINT/SIGTERM
    server.run().await?;

    info!("chatrelay shut down");
    Ok(())
}

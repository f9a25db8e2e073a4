//! tf2-roster-relay entry point

use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;

use tf2_roster_relay::{logging, relay, Cli, RelayConfig, SubscriberSlot};

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{}", e);
            eprintln!("Error: {}", e);
            e.exit_code()
        }
    }
}

async fn run() -> tf2_roster_relay::Result<()> {
    let cli = Cli::parse();

    let mut config = RelayConfig::load(cli.config.as_deref())?;
    cli.apply(&mut config);

    let slot = Arc::new(SubscriberSlot::new());
    logging::init(&config.logging.level, Arc::clone(&slot))?;

    tracing::info!("Starting tf2-roster-relay v{}", env!("CARGO_PKG_VERSION"));

    relay::run(config, slot).await
}

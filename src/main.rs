use std::path::PathBuf;

use clap::Parser;

use phrase_exchange::config::load_or_default;
use phrase_exchange::lifecycle;
use phrase_exchange::observability::logging::init_logging;

#[derive(Parser)]
#[command(name = "phrase-exchange", version, about = "Passphrase rendezvous exchange")]
struct Args {
    /// Path to the TOML config file. Watched for rate limit changes.
    #[arg(short, long, env = "EXCHANGE_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let config = load_or_default(args.config.as_deref())?;
    init_logging(&config.observability)?;

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        bind_address = %config.listener.bind_address,
        requests_per_window = config.rate_limit.requests_per_window,
        window_secs = config.rate_limit.window_secs,
        "phrase-exchange starting"
    );

    lifecycle::run(config, args.config.as_deref()).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}

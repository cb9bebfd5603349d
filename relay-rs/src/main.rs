use anyhow::Context;
use clap::Parser;
use relay_rs::config::{Config, LoggingConfig};
use relay_rs::delivery::SendGridClient;
use relay_rs::relay::Relay;
use relay_rs::smtp::RelayServer;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "relay-rs")]
#[command(about = "SMTP to SendGrid relay gateway", long_about = None)]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,
}

fn init_logging(logging: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("relay_rs={}", logging.level).into());
    let registry = tracing_subscriber::registry().with(filter);

    match logging.format.as_str() {
        "json" => registry.with(tracing_subscriber::fmt::layer().json()).init(),
        "compact" => registry.with(tracing_subscriber::fmt::layer().compact()).init(),
        _ => registry.with(tracing_subscriber::fmt::layer().pretty()).init(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let (mut config, loaded) = if cli.config.exists() {
        let config = Config::from_file(&cli.config)
            .with_context(|| format!("loading {}", cli.config.display()))?;
        (config, true)
    } else {
        (Config::default(), false)
    };
    config.apply_env_overrides();

    init_logging(&config.logging);
    info!("Starting relay-rs v{}", env!("CARGO_PKG_VERSION"));
    if loaded {
        info!("Configuration loaded from {}", cli.config.display());
    } else {
        info!("No config file found at {}, using defaults", cli.config.display());
    }

    config.validate()?;

    info!("  SMTP listening on: {}", config.smtp.listen_addr);
    info!("  Delivery endpoint: {}", config.delivery.api_base_url);
    info!("  Transaction timeout: {}s", config.relay.transaction_timeout_secs);

    let client = SendGridClient::from_config(&config.delivery)?;
    let relay = Arc::new(Relay::new(Arc::new(client)));
    let server = RelayServer::bind(&config, relay).await?;

    let shutdown = CancellationToken::new();
    let signal = shutdown.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for shutdown signal: {}", e);
            return;
        }
        info!("Shutdown requested");
        signal.cancel();
    });

    server.run(shutdown).await?;
    info!("relay-rs stopped");

    Ok(())
}

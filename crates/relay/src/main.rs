use clap::Parser;
use tracing_subscriber::EnvFilter;

use plaza_common::config::{load_config, RelayConfig};
use plaza_relay::RelayServer;

#[derive(Parser, Debug)]
#[command(name = "plaza-relay")]
struct Args {
    #[arg(long, default_value = "config/relay.toml")]
    config: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    let config: RelayConfig = load_config(&args.config)?;
    let server = RelayServer::bind(config).await?;
    server.run().await
}

use clap::Parser;
use tracing_subscriber::EnvFilter;

use plaza_common::config::{load_config, ClientConfig};

mod app;
mod devices;
mod net;
mod peer;
mod walk;

#[derive(Parser, Debug)]
#[command(name = "plaza-client")]
struct Args {
    #[arg(long, default_value = "config/client.toml")]
    config: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    let config: ClientConfig = load_config(&args.config)?;
    let connection = net::connect(&config).await?;
    app::run(config, connection).await
}

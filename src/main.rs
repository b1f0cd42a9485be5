use anyhow::Result;
use clap::Parser;
use post_generator::models::Config;
use post_generator::server::{self, AppState};
use std::net::SocketAddr;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(name = "post-generator")]
#[command(about = "Serve the social post generation API")]
struct CliArgs {
    /// Address to listen on.
    #[arg(
        long,
        value_name = "ADDR",
        default_value = "127.0.0.1:3000",
        value_parser = parse_bind_arg
    )]
    bind: SocketAddr,
}

fn parse_bind_arg(input: &str) -> std::result::Result<SocketAddr, String> {
    input
        .parse()
        .map_err(|_| format!("Invalid address '{}'. Expected format: HOST:PORT", input))
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "post_generator=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting post-generator");

    let args = CliArgs::parse();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = server::serve(args.bind, AppState::from_config(&config)).await {
        error!("Server failed: {}", e);
        std::process::exit(1);
    }

    Ok(())
}

use clap::Parser;
use mirage_server::config::ServerConfig;
use mirage_server::server;
use mirage_server::state::StateHandler;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "mirage-server", about = "HTTP/HTTPS service-virtualization server")]
struct Args {
    /// Listener port (overrides the config file)
    #[arg(short, long)]
    port: Option<u16>,
    /// Path to a YAML configuration file
    #[arg(short, long)]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let args = Args::parse();
    let mut config = match &args.config {
        Some(path) => ServerConfig::from_file(path)?,
        None => ServerConfig::default(),
    };
    if let Some(port) = args.port {
        config.port = port;
    }
    config.validate()?;

    let state = Arc::new(StateHandler::new(
        config.max_expectations,
        config.max_log_entries,
    ));

    tokio::select! {
        result = server::serve(config, state) => result,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("shutting down");
            Ok(())
        }
    }
}

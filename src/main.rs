//! HTTP Mockery - CLI Entry Point

use anyhow::{Context, Result};
use clap::builder::BoolishValueParser;
use clap::Parser;
use http_mockery::config::Overrides;
use http_mockery::{Config, MockServer};
use std::path::PathBuf;
use tokio::net::TcpListener;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(
    name = "http-mockery",
    about = "Configurable HTTP stub server with upstream proxy fallback",
    version
)]
struct Args {
    /// Path to configuration file (JSON, or YAML by extension)
    #[arg(short, long, env = "HTTP_MOCKERY_CONFIG", default_value = "config.json")]
    config: PathBuf,

    /// Address to listen on, overrides `listen_ip`
    #[arg(long, env = "HTTP_MOCKERY_LISTEN_IP")]
    listen_ip: Option<String>,

    /// Port to listen on, overrides `listen_port`
    #[arg(long, env = "HTTP_MOCKERY_LISTEN_PORT")]
    listen_port: Option<u16>,

    /// Log JSON request bodies, overrides `logging.request_contents`
    #[arg(long, env = "HTTP_MOCKERY_LOG_REQUEST_CONTENTS", value_parser = BoolishValueParser::new())]
    log_request_contents: Option<bool>,

    /// Log response bodies, overrides `logging.response_contents`
    #[arg(long, env = "HTTP_MOCKERY_LOG_RESPONSE_CONTENTS", value_parser = BoolishValueParser::new())]
    log_response_contents: Option<bool>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short = 'L', long, default_value = "info")]
    log_level: Level,

    /// Validate configuration and exit
    #[arg(long)]
    validate: bool,
}

impl Args {
    fn overrides(&self) -> Overrides {
        Overrides {
            listen_ip: self.listen_ip.clone(),
            listen_port: self.listen_port,
            log_request_contents: self.log_request_contents,
            log_response_contents: self.log_response_contents,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let subscriber = FmtSubscriber::builder()
        .with_max_level(args.log_level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    info!(path = ?args.config, "Loading configuration");
    let mut config = Config::from_file(&args.config)?;
    config.apply_overrides(&args.overrides());
    config
        .validate()
        .context("Config validation failed")?;

    if args.validate {
        println!(
            "Configuration is valid ({} endpoints defined)",
            config.endpoints.len()
        );
        return Ok(());
    }

    let listen_address = config.listen_address();
    let server = MockServer::new(config)?;

    let listener = TcpListener::bind(&listen_address)
        .await
        .with_context(|| format!("Unable to start listener at {}", listen_address))?;

    server.run(listener).await?;

    Ok(())
}

//! Stream Uploadr - streaming multipart uploads into S3

use clap::Parser;
use std::path::PathBuf;
use stream_uploadr::config::ConfigLoader;
use stream_uploadr::logging::{init_logging, LogFormat};
use stream_uploadr::metrics::server::MetricsServer;
use stream_uploadr::server::Server;
use tracing::info;

/// Stream Uploadr - turns live byte streams into S3 objects
#[derive(Parser, Debug)]
#[command(name = "stream-uploadr")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.yaml")]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error); RUST_LOG takes precedence
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Json)]
    log_format: LogFormat,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    init_logging(&args.log_level, args.log_format)?;
    info!("Starting Stream Uploadr v{}", env!("CARGO_PKG_VERSION"));

    let config = ConfigLoader::load(&args.config)?;
    info!("Loaded configuration from {:?}", args.config);

    let mut metrics_server = if config.metrics.enabled {
        let mut server = MetricsServer::from_config(&config.metrics);
        let addr = server.start().await?;
        info!("Metrics available on http://{}/metrics", addr);
        Some(server)
    } else {
        None
    };

    let server = Server::from_config(config).await?;
    server
        .run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to listen for shutdown signal: {}", e);
            }
        })
        .await?;

    if let Some(server) = metrics_server.as_mut() {
        server.shutdown().await;
    }

    Ok(())
}

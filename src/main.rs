use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use std::{fmt::Debug, path::PathBuf};
use tracing::{info, level_filters::LevelFilter, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use salon_mcp_gateway::config::{AppConfig, CliConfig, FileConfig};
use salon_mcp_gateway::handlers::{default_handlers, SalonStore};
use salon_mcp_gateway::security::{SecurityEventLog, TracingAlertSink};
use salon_mcp_gateway::server::{self, run_server, RequestsLoggingLevel, ServerConfig};
use salon_mcp_gateway::{Gateway, InMemoryUserStore};

fn parse_path(s: &str) -> Result<PathBuf> {
    let path_buf = PathBuf::from(s);
    if path_buf.is_absolute() {
        return Ok(path_buf);
    }
    let cwd = std::env::current_dir().context("Error resolving current directory")?;
    Ok(cwd.join(path_buf))
}

#[derive(Parser, Debug)]
#[clap(version = env!("APP_VERSION"))]
struct CliArgs {
    /// The port to listen on.
    #[clap(short, long, default_value_t = 3001)]
    pub port: u16,

    /// The port for the metrics server (Prometheus scraping).
    #[clap(long, default_value_t = 9091)]
    pub metrics_port: u16,

    /// Path to a TOML config file. Its values override the command line.
    #[clap(long, value_parser = parse_path)]
    pub config: Option<PathBuf>,

    /// The level of logging to perform on each HTTP request.
    #[clap(long, default_value = "path")]
    pub logging_level: RequestsLoggingLevel,

    /// Path to a TOML file with `[[users]]` accounts.
    #[clap(long, value_parser = parse_path)]
    pub users_file: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli_args = CliArgs::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .with_env_var("LOG_LEVEL")
                .from_env_lossy(),
        )
        .try_init()
        .context("Failed to initialize logging")?;

    let file_config = match &cli_args.config {
        Some(path) => {
            info!("Loading config from {:?}...", path);
            Some(FileConfig::load(path)?)
        }
        None => None,
    };
    let cli_config = CliConfig {
        port: cli_args.port,
        metrics_port: cli_args.metrics_port,
        logging_level: cli_args.logging_level,
        users_file: cli_args.users_file,
    };
    let config = AppConfig::resolve(&cli_config, file_config)?;

    info!("Initializing metrics...");
    server::metrics::init_metrics();

    if config.users.is_empty() {
        warn!("No users configured, only guest commands will be available");
    } else {
        info!("Loaded {} users", config.users.len());
    }
    let user_store = Arc::new(InMemoryUserStore::new(config.users.clone()));

    let event_log = Arc::new(SecurityEventLog::new(
        config.event_log_capacity,
        Arc::new(TracingAlertSink),
    ));
    let store = Arc::new(SalonStore::with_demo_data());

    let gateway = Gateway::builder(user_store)
        .config(config.gateway.clone())
        .rate_limit(config.rate_limit.clone())
        .classifier(config.security.classifier()?)
        .event_log(event_log.clone())
        .handlers(default_handlers(store, event_log))
        .build()
        .context("Failed to register gateway handlers")?;

    info!("Ready to serve at port {}!", config.port);
    info!("Metrics available at port {}!", config.metrics_port);
    run_server(
        ServerConfig {
            requests_logging_level: config.logging_level,
            port: config.port,
            metrics_port: config.metrics_port,
        },
        Arc::new(gateway),
    )
    .await
}

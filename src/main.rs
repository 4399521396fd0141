//! tailserve: publish HTTPS endpoints on a private network.
//!
//! This is the application entry point. It loads configuration from a TOML
//! file, initializes tracing, brings the node up, provisions the listeners,
//! and serves until SIGTERM/SIGINT.

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tailserve::config::{AppConfig, LoggingConfig, DEFAULT_CONFIG_PATH, DEFAULT_LOG_FILTER};
use tailserve::local::LocalProvider;
use tailserve::routes::create_router;
use tailserve::state::AppState;
use tailserve::Server;

/// tailserve: HTTPS endpoints on a private network
#[derive(Parser, Debug)]
#[command(name = "tailserve", version, about)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    config: String,

    /// Log level filter (e.g., "tailserve=debug,tower_http=info")
    #[arg(short, long)]
    log_level: Option<String>,
}

fn init_tracing(log_level: Option<String>, logging: &LoggingConfig) {
    // Priority: CLI > env > default
    let log_filter = log_level
        .or_else(|| std::env::var("RUST_LOG").ok())
        .unwrap_or_else(|| DEFAULT_LOG_FILTER.to_string());
    let filter = tracing_subscriber::EnvFilter::new(&log_filter);

    if logging.format == "json" {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let config = AppConfig::load(&args.config)?;
    init_tracing(args.log_level, &config.logging);

    tracing::info!(
        hostname = %config.node.hostname,
        state_dir = %config.node.state_dir.display(),
        https_ports = ?config.http.https_ports,
        "Loaded configuration"
    );

    let local = config.local.clone();
    let mut server = Server::with_policy(config.node.clone(), config.bring_up.policy(), |node| {
        LocalProvider::new(node, local)
    })
    .await?;

    let listeners = server.listen(&config.http.https_ports).await?;
    tracing::info!(
        count = listeners.len(),
        redirect = listeners.redirect.is_some(),
        "Provisioned listeners"
    );

    let state = AppState::new(server.identity(), server.fqdn());
    let app = create_router(state).layer(tower_http::trace::TraceLayer::new_for_http());

    let served = tailserve::http::serve(listeners, app).await;
    server.close().await?;
    served?;

    Ok(())
}

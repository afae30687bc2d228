use axum::{
    routing::{delete, get, post},
    Router,
};
use clap::Parser;
use neurosession::config::Config;
use neurosession::handlers::{
    delete_history_item, get_history_item, get_history_result, health_check, list_history,
    session_status, start_session, stop_session,
};
use neurosession::state::AppState;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Parser, Debug)]
#[command(
    name = "neurosession",
    version,
    about = "Bounded-session EEG classification service"
)]
struct Cli {
    /// Override the OSC ingestion bind address
    #[arg(long)]
    osc_bind_addr: Option<String>,

    /// Override the OSC ingestion port
    #[arg(long)]
    osc_port: Option<u16>,

    /// Override the session duration in seconds
    #[arg(long)]
    session_duration: Option<u64>,

    /// Override the HTTP API port
    #[arg(long)]
    http_port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "neurosession=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    let mut config = Config::from_env()?;
    if let Some(addr) = cli.osc_bind_addr {
        config.osc_bind_addr = addr;
    }
    if let Some(port) = cli.osc_port {
        config.osc_port = port;
    }
    if let Some(secs) = cli.session_duration {
        config.session_duration_seconds = secs;
    }
    if let Some(port) = cli.http_port {
        config.http_port = port;
    }

    info!("🚀 Starting NeuroSession v{}", VERSION);
    info!("📋 Configuration loaded:");
    info!("   HTTP API: {}", config.http_bind_address());
    info!(
        "   OSC ingestion: {} ({})",
        config.osc_bind_address(),
        config.osc_address
    );
    info!("   Session duration: {}s", config.session_duration_seconds);
    info!(
        "   Window: buffer {} / batch {}",
        config.buffer_size, config.batch_size
    );
    info!("   History database: {:?}", config.database_path);

    let state = Arc::new(AppState::new(config.clone())?);

    // Build router
    let app = Router::new()
        .route("/health", get(health_check))
        .route("/history", get(list_history))
        .route("/history/{id}", get(get_history_item))
        .route("/history/{id}", delete(delete_history_item))
        .route("/history/{id}/result", get(get_history_result))
        .route("/sessions", post(start_session))
        .route("/sessions/current", get(session_status))
        .route("/sessions/current/stop", post(stop_session))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state);

    // Start server
    let addr: SocketAddr = config.http_bind_address().parse()?;
    info!("🎧 Listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

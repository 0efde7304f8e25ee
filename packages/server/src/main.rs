use std::path::PathBuf;
use std::sync::Arc;

use bus::{
    AmqpBus, BusAdapter, COMPRESSION_RESPONSE_QUEUE, COMPRESSION_RESPONSE_ROUTING_KEY, COMPRESS_REQUEST_QUEUE, COMPRESS_ROUTING_KEY,
    DECOMPRESSION_RESPONSE_ROUTING_KEY, DECOMPRESS_REQUEST_QUEUE, DECOMPRESS_RESPONSE_QUEUE, DECOMPRESS_ROUTING_KEY,
};
use clap::Parser;
use color_eyre::{Result, eyre::Context};
use compression_core::AppConfig;
use tracing::level_filters::LevelFilter;
use tracing_error::ErrorLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use server::AppState;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the YAML config file
    #[arg(long, default_value = "./config/config.yml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(ErrorLayer::default())
        .with(
            tracing_subscriber::fmt::layer()
                .with_level(true)
                .with_file(true)
                .with_line_number(true)
                .with_target(true)
                .with_thread_ids(true)
                .with_thread_names(true)
                .pretty(),
        )
        .with(
            tracing_subscriber::EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .from_env_lossy(),
        )
        .init();

    let config = AppConfig::load(&cli.config).context("load config")?;
    tracing::info!(app = %config.app.name, version = %config.app.version, "starting frontend");

    let bus: Arc<dyn BusAdapter> = Arc::new(AmqpBus::new(config.rabbitmq.url.clone()).context("build amqp bus")?);

    // The frontend only publishes to the two request queues and consumes the
    // decompress reply queue; compress requests never get a reply anyone
    // reads, but the response queue is still declared for parity with the
    // worker's routing table.
    bus.declare(COMPRESS_REQUEST_QUEUE, COMPRESS_ROUTING_KEY).await.context("declare compress request queue")?;
    bus.declare(DECOMPRESS_REQUEST_QUEUE, DECOMPRESS_ROUTING_KEY).await.context("declare decompress request queue")?;
    bus.declare(DECOMPRESS_RESPONSE_QUEUE, DECOMPRESSION_RESPONSE_ROUTING_KEY).await.context("declare decompress response queue")?;
    bus.declare(COMPRESSION_RESPONSE_QUEUE, COMPRESSION_RESPONSE_ROUTING_KEY).await.context("declare compression response queue")?;

    let state = AppState::new(bus.clone());

    let listener_handle = tokio::spawn({
        let bus = bus.clone();
        let registry = state.registry.clone();
        async move {
            if let Err(err) = server::reply_listener::run(bus, registry).await {
                tracing::error!(error = %err, "reply listener exited");
            }
        }
    });

    let router = server::routes::router(state);
    let addr = format!("0.0.0.0:{}", config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await.context("bind http listener")?;
    tracing::info!(%addr, "listening");

    axum::serve(listener, router).with_graceful_shutdown(shutdown_signal()).await.context("serve http")?;

    listener_handle.abort();
    tracing::info!("frontend shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("received SIGINT, starting graceful shutdown"),
        _ = terminate => tracing::info!("received SIGTERM, starting graceful shutdown"),
    }
}

use std::path::PathBuf;
use std::sync::Arc;

use aws_config::BehaviorVersion;
use bus::{AmqpBus, BusAdapter, COMPRESSION_RESPONSE_QUEUE, COMPRESSION_RESPONSE_ROUTING_KEY, COMPRESS_REQUEST_QUEUE, COMPRESS_ROUTING_KEY, DECOMPRESSION_RESPONSE_ROUTING_KEY, DECOMPRESS_REQUEST_QUEUE, DECOMPRESS_RESPONSE_QUEUE, DECOMPRESS_ROUTING_KEY};
use clap::Parser;
use color_eyre::{Result, eyre::Context};
use compression_core::{AppConfig, DecompressionCache, Pipeline, S3BlobStore};
use tracing::level_filters::LevelFilter;
use tracing_error::ErrorLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

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
    tracing::info!(app = %config.app.name, version = %config.app.version, "starting worker");

    let bus: Arc<dyn BusAdapter> = Arc::new(AmqpBus::new(config.rabbitmq.url.clone()).context("build amqp bus")?);

    bus.declare(COMPRESS_REQUEST_QUEUE, COMPRESS_ROUTING_KEY).await.context("declare compress request queue")?;
    bus.declare(DECOMPRESS_REQUEST_QUEUE, DECOMPRESS_ROUTING_KEY).await.context("declare decompress request queue")?;
    bus.declare(DECOMPRESS_RESPONSE_QUEUE, DECOMPRESSION_RESPONSE_ROUTING_KEY).await.context("declare decompress response queue")?;
    bus.declare(COMPRESSION_RESPONSE_QUEUE, COMPRESSION_RESPONSE_ROUTING_KEY).await.context("declare compression response queue")?;

    let aws_config = aws_config::load_defaults(BehaviorVersion::latest()).await;
    let s3_client = aws_sdk_s3::Client::new(&aws_config);
    let pipeline = Arc::new(Pipeline::new(S3BlobStore::new(s3_client)));

    let cache = DecompressionCache::new();
    let reaper = cache.spawn_reaper();

    let health_port = worker::health::port();
    let health_task = tokio::spawn(async move {
        if let Err(err) = worker::health::serve(health_port).await {
            tracing::error!(error = %err, "health endpoint exited");
        }
    });

    let compress_task = tokio::spawn({
        let bus = bus.clone();
        let pipeline = pipeline.clone();
        async move {
            if let Err(err) = worker::run_compress_consumer(bus, pipeline).await {
                tracing::error!(error = %err, "compress consumer exited");
            }
        }
    });

    let decompress_task = tokio::spawn({
        let bus = bus.clone();
        let pipeline = pipeline.clone();
        let cache = cache.clone();
        async move {
            if let Err(err) = worker::run_decompress_consumer(bus, pipeline, cache).await {
                tracing::error!(error = %err, "decompress consumer exited");
            }
        }
    });

    shutdown_signal().await;
    tracing::info!("shutting down, letting in-flight deliveries finish their ack/reject");

    reaper.abort();
    health_task.abort();
    compress_task.abort();
    decompress_task.abort();
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
        _ = ctrl_c => tracing::info!("received SIGINT, starting shutdown"),
        _ = terminate => tracing::info!("received SIGTERM, starting shutdown"),
    }
}

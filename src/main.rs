use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::io::BufReader;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tick_recorder::core::config::StoreBackend;
use tick_recorder::feed::JsonLinesFeed;
use tick_recorder::{connect_store, Pipeline, RecorderConfig, StopSignal};

/// Records quote ticks and one-minute samples from a JSON lines feed
#[derive(Debug, Parser)]
#[command(name = "tick_recorder", version)]
struct Args {
    /// TOML configuration file
    #[arg(short, long, env = "TICK_RECORDER_CONFIG")]
    config: Option<PathBuf>,

    /// Feed topic, e.g. crypto-ticks-binance-futures-quote
    #[arg(short, long, env = "TICK_RECORDER_TOPIC")]
    topic: Option<String>,

    /// Redis URL of the shared store
    #[arg(long, env = "REDIS_URL")]
    redis_url: Option<String>,

    /// Use the in-process store instead of Redis
    #[arg(long)]
    memory_store: bool,

    /// Read feed messages from this file instead of stdin
    #[arg(short, long)]
    input: Option<PathBuf>,
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tick_recorder=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn load_config(args: &Args) -> Result<RecorderConfig> {
    let mut config = match &args.config {
        Some(path) => RecorderConfig::from_file(path)?,
        None => RecorderConfig::default(),
    };
    if let Some(topic) = &args.topic {
        config.topic = topic.clone();
    }
    if let Some(url) = &args.redis_url {
        config.store.url = url.clone();
    }
    if args.memory_store {
        config.store.backend = StoreBackend::Memory;
    }
    config.validate()?;
    Ok(config)
}

fn stop_on_ctrl_c(stop: StopSignal) {
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Shutdown requested"),
            Err(e) => warn!("Cannot listen for Ctrl-C: {}", e),
        }
        stop.stop();
    });
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let args = Args::parse();
    let config = load_config(&args)?;

    if let Some(addr) = config.metrics_listen {
        metrics_exporter_prometheus::PrometheusBuilder::new()
            .with_http_listener(addr)
            .install()
            .context("failed to install Prometheus exporter")?;
        info!(%addr, "Prometheus exporter listening");
    }

    let store = connect_store(&config.store).await?;
    let pipeline = Pipeline::new(config, store).await?;
    stop_on_ctrl_c(pipeline.stop_handle());

    match &args.input {
        Some(path) => {
            let file = tokio::fs::File::open(path)
                .await
                .with_context(|| format!("cannot open feed file {}", path.display()))?;
            pipeline.run(JsonLinesFeed::new(BufReader::new(file))).await
        }
        None => {
            pipeline
                .run(JsonLinesFeed::new(BufReader::new(tokio::io::stdin())))
                .await
        }
    }
}

//! hoard daemon and command-line interface.

use anyhow::{Context, Result};
use bytes::Bytes;
use clap::{Parser, Subcommand, ValueEnum};
use hoard_core::{
    ClientContext, ContentAddress, LocationKind, NetworkType, PreferredMethod, RoutingOptions,
    VerificationType,
};
use hoard_engine::{Engine, ResolveOptions, StoreRequest};
use hoard_server::{AppState, build_engine, create_router, load_config};
use serde::Serialize;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// hoard - content-addressed storage with replication, verification and routing
#[derive(Parser, Debug)]
#[command(name = "hoard")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, env = "HOARD_CONFIG", default_value = "config/hoard.toml")]
    config: PathBuf,

    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Text, global = true)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the engine, its background tasks and the operational endpoint
    Serve,

    /// Store a file and print its record
    Store {
        path: PathBuf,
        #[arg(long)]
        mime_type: Option<String>,
        /// Replication targets (comma separated); defaults to the configured ones
        #[arg(long, value_delimiter = ',')]
        targets: Option<Vec<LocationKind>>,
        /// Run queued replication jobs before exiting
        #[arg(long)]
        replicate: bool,
    },

    /// Fetch content by address
    Resolve {
        hash: ContentAddress,
        /// Write the bytes here instead of printing the resolution
        #[arg(short, long)]
        output: Option<PathBuf>,
        #[arg(long, default_value_t = PreferredMethod::Auto)]
        prefer: PreferredMethod,
        /// Client region, e.g. US
        #[arg(long)]
        region: Option<String>,
        #[arg(long, default_value_t = NetworkType::Unknown)]
        network: NetworkType,
        /// Run a quorum verification before serving
        #[arg(long)]
        verify: bool,
    },

    /// Verify content across its locations
    Verify {
        hash: ContentAddress,
        #[arg(long = "type")]
        verification_type: Option<VerificationType>,
    },

    /// Sign and publish an advertisement for stored content
    Advertise { hash: ContentAddress },

    /// Print the network report with cache and routing statistics
    Stats,
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| "info,tower_http=info".into());
    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Text => registry.with(tracing_subscriber::fmt::layer()).init(),
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json())
            .init(),
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.log_format);
    tracing::debug!("hoard v{}", env!("CARGO_PKG_VERSION"));

    let config = load_config(&args.config)?;
    let engine = build_engine(config).await?;

    match args.command {
        Command::Serve => serve(engine).await,
        Command::Store {
            path,
            mime_type,
            targets,
            replicate,
        } => {
            let data = tokio::fs::read(&path)
                .await
                .with_context(|| format!("failed to read {}", path.display()))?;
            let request = StoreRequest {
                mime_type,
                replication_targets: targets,
                ..StoreRequest::default()
            };
            let record = engine.store(Bytes::from(data), request).await?;
            // The process exits after this command, so publish before returning.
            engine.flush_advertisements().await;
            if replicate {
                let attempts = engine.run_replication_once().await?;
                tracing::info!(attempts, "replication queue drained");
            }
            let record = engine
                .content_record(&record.content_hash)
                .await?
                .unwrap_or(record);
            println!("{}", record.uhrp_url());
            print_json(&record)
        }
        Command::Resolve {
            hash,
            output,
            prefer,
            region,
            network,
            verify,
        } => {
            let client = ClientContext {
                geographic_location: region.clone(),
                network_type: network,
                ..ClientContext::default()
            };
            let options = ResolveOptions {
                routing: RoutingOptions {
                    preferred_method: prefer,
                    geographic_preference: region.into_iter().collect(),
                    ..RoutingOptions::default()
                },
                verify,
                bypass_cache: false,
            };
            let resolution = engine.resolve(&hash, &client, &options).await?;
            match output {
                Some(path) => {
                    tokio::fs::write(&path, &resolution.bytes)
                        .await
                        .with_context(|| format!("failed to write {}", path.display()))?;
                    tracing::info!(
                        path = %path.display(),
                        bytes = resolution.bytes.len(),
                        served_from = ?resolution.served_from,
                        "content written"
                    );
                    Ok(())
                }
                None => print_json(&serde_json::json!({
                    "content_hash": resolution.content_hash,
                    "bytes": resolution.bytes.len(),
                    "served_from": resolution.served_from,
                    "decision": resolution.decision,
                    "integrity_verified": resolution.integrity_verified,
                    "resolution_time_ms": resolution.resolution_time_ms,
                })),
            }
        }
        Command::Verify {
            hash,
            verification_type,
        } => {
            let result = match verification_type {
                Some(t) => engine.verify_with(&hash, t).await?,
                None => engine.verify(&hash).await?,
            };
            print_json(&result)
        }
        Command::Advertise { hash } => print_json(&engine.advertise(&hash).await?),
        Command::Stats => print_json(&serde_json::json!({
            "network": engine.network_report().await?,
            "cache": engine.cache_stats().await,
            "routing": engine.routing_stats().await?,
        })),
    }
}

async fn serve(engine: Engine) -> Result<()> {
    let engine = Arc::new(engine);
    engine.start().await;

    let addr: SocketAddr = engine
        .config()
        .server
        .bind
        .parse()
        .context("invalid bind address")?;
    let app = create_router(AppState::new(Arc::clone(&engine)));

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind to {addr}"))?;
    tracing::info!(%addr, "operational endpoint listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("shutting down background tasks");
    engine.shutdown().await;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
    }
}

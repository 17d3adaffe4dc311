//! Echo RPC server entry point
//!
//! Serves `demo.Echo` and `demo.Add` over TCP or a Unix socket.

mod handlers;

use anyhow::{Context, Result};
use clap::Parser;
use network::{
    ListenAddress, ObservabilitySink, RpcServer, ServerConfig, StatsRegistry, TaskExecutor,
    WorkerPool,
};
use rpc_config::ConfigLoader;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Base configuration file (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Environment override, loads `<config>.<environment>.toml`
    #[arg(short, long)]
    environment: Option<String>,

    /// TCP listen address, overrides the config file
    #[arg(long, conflicts_with = "unix")]
    listen: Option<SocketAddr>,

    /// Unix socket path, overrides the config file
    #[arg(long)]
    unix: Option<PathBuf>,

    /// Emit logs as JSON
    #[arg(long)]
    json_logs: bool,

    /// Print the effective configuration and exit
    #[arg(long)]
    print_config: bool,
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "echo_server=info,network=info,warn".into());
    let registry = tracing_subscriber::registry().with(filter);

    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

fn load_config(args: &Args) -> Result<ServerConfig> {
    let mut loader = ConfigLoader::new().with_environment(args.environment.as_deref());
    if let Some(path) = &args.config {
        loader = loader.with_file(path);
    }
    let mut config: ServerConfig = loader.load()?;

    if let Some(address) = args.listen {
        config.listen = ListenAddress::Tcp { address };
    }
    if let Some(path) = &args.unix {
        config.listen = ListenAddress::Unix { path: path.clone() };
    }
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.json_logs);

    let config = load_config(&args)?;
    if args.print_config {
        print!("{}", rpc_config::to_toml(&config)?);
        return Ok(());
    }

    info!("Starting echo server");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let pool = WorkerPool::new(&config.executor).context("Failed to start worker pool")?;
    let router = handlers::router();
    let registry = router.registry();
    let executor = Arc::new(TaskExecutor::new(
        pool.handle(),
        Arc::new(router),
        config.executor.max_in_flight,
    ));
    let stats = Arc::new(StatsRegistry::new());
    let sink: Arc<dyn ObservabilitySink> = stats.clone();

    let server = RpcServer::bind(config, registry, executor, Some(sink))
        .await
        .context("Failed to bind RPC server")?;
    info!(listen = %server.local_addr()?, "Echo server ready");

    let tracker = server.stats();
    server
        .run_until(async {
            if let Err(err) = tokio::signal::ctrl_c().await {
                warn!(error = %err, "Failed to listen for shutdown signal");
                return;
            }
            info!("Shutdown signal received");
        })
        .await?;

    let final_stats = tracker.snapshot();
    info!(
        stats = %serde_json::to_string(&final_stats).context("Failed to serialize stats")?,
        "Final request statistics"
    );

    pool.shutdown();
    Ok(())
}

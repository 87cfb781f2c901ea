//! GridFS gateway.
//!
//! ```text
//!     Client GET/HEAD <prefix><key>
//!     ──────────────────────────────▶ http::server (request ID, trace, timeout)
//!                                         │
//!                                         ▼
//!                                     routing (longest prefix)
//!                                         │
//!                                         ▼
//!                                     gridfs::key (percent-decode, typed key)
//!                                         │
//!                                         ▼
//!                 resilience::retries ◀── gridfs::metadata (<root>.files)
//!                        │                │
//!                        ▼                ▼
//!                 registry (reconnect) gridfs::stream (<root>.chunks, in order)
//!                                         │
//!     ◀───────────────────────────────────┘  body channel, one chunk at a time
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::net::TcpListener;

use gridfs_gateway::admin::{setup_admin_router, AdminState};
use gridfs_gateway::backend::mongo::MongoConnector;
use gridfs_gateway::config::load_config;
use gridfs_gateway::observability::{logging, metrics};
use gridfs_gateway::{bootstrap, GatewayServer, Shutdown};

#[derive(Parser, Debug)]
#[command(name = "gridfs-gateway", version, about = "Serve GridFS objects over HTTP")]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(short, long, env = "GRIDFS_GATEWAY_CONFIG", default_value = "gridfs-gateway.toml")]
    config: PathBuf,

    /// Validate the configuration and exit.
    #[arg(long)]
    check: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = load_config(&cli.config)?;
    logging::init_logging(&config.observability);

    tracing::info!(
        config = %cli.config.display(),
        bind_address = %config.listener.bind_address,
        connections = config.connections.len(),
        locations = config.locations.len(),
        "Configuration loaded"
    );
    if cli.check {
        tracing::info!("Configuration is valid");
        return Ok(());
    }

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr)?,
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let connector = Arc::new(MongoConnector::new(Duration::from_secs(config.timeouts.connect_secs)));
    let gateway = bootstrap(config, connector).await?;

    let shutdown = Arc::new(Shutdown::new());

    let mut admin_task = None;
    if gateway.config.admin.enabled {
        let admin = setup_admin_router(AdminState {
            registry: gateway.registry.clone(),
            api_key: Arc::from(gateway.config.admin.api_key.as_str()),
        });
        let listener = TcpListener::bind(&gateway.config.admin.bind_address).await?;
        tracing::info!(address = %listener.local_addr()?, "Admin listener started");
        let mut rx = shutdown.subscribe();
        admin_task = Some(tokio::spawn(async move {
            axum::serve(listener, admin)
                .with_graceful_shutdown(async move {
                    let _ = rx.recv().await;
                })
                .await
        }));
    }

    let listener = TcpListener::bind(&gateway.config.listener.bind_address).await?;
    let server = GatewayServer::new(&gateway);
    let server_shutdown = shutdown.subscribe();

    let signal = shutdown.clone();
    tokio::spawn(async move { signal.trigger_on_ctrl_c().await });

    server.run(listener, server_shutdown).await?;
    if let Some(task) = admin_task {
        task.await??;
    }

    tracing::info!("Shutdown complete");
    Ok(())
}

//! Shared utilities for integration tests.

use std::net::SocketAddr;
use std::sync::Arc;

use gridfs_gateway::backend::memory::MemoryStore;
use gridfs_gateway::config::parse_config;
use gridfs_gateway::lifecycle::{bootstrap, Gateway, Shutdown};
use gridfs_gateway::GatewayServer;
use tokio::net::TcpListener;

/// Locations used by most tests: objects keyed by string id under `/files/`,
/// by filename under `/names/`, by ObjectId under `/oid/`.
#[allow(dead_code)]
pub const DEFAULT_CONFIG: &str = r#"
    [retries]
    max_retries = 1
    reconnect_backoff_ms = 0

    [[connections]]
    name = "main"

    [[locations]]
    prefix = "/files/"
    connection = "main"
    database = "media"
    key_type = "string"

    [[locations]]
    prefix = "/names/"
    connection = "main"
    database = "media"
    field = "filename"
    key_type = "string"

    [[locations]]
    prefix = "/oid/"
    connection = "main"
    database = "media"
"#;

pub struct TestGateway {
    pub addr: SocketAddr,
    pub store: MemoryStore,
    pub gateway: Arc<Gateway>,
    pub shutdown: Shutdown,
}

impl TestGateway {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }
}

impl Drop for TestGateway {
    fn drop(&mut self) {
        self.shutdown.trigger();
    }
}

/// Bootstrap `config` over `store` and serve it on an ephemeral port.
pub async fn start_gateway(config: &str, store: MemoryStore) -> TestGateway {
    let config = parse_config(config).unwrap();
    let gateway = bootstrap(config, Arc::new(store.clone())).await.unwrap();

    let shutdown = Shutdown::new();
    let server = GatewayServer::new(&gateway);
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server_shutdown = shutdown.subscribe();

    tokio::spawn(async move {
        let _ = server.run(listener, server_shutdown).await;
    });

    TestGateway {
        addr,
        store,
        gateway: Arc::new(gateway),
        shutdown,
    }
}

/// Client without connection pooling, so every request opens a fresh socket.
pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .no_proxy()
        .build()
        .unwrap()
}

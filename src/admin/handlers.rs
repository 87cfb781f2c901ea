use axum::{extract::State, Json};
use serde::Serialize;

use crate::admin::AdminState;

#[derive(Serialize)]
pub struct SystemStatus {
    pub version: &'static str,
    pub status: &'static str,
}

#[derive(Serialize)]
pub struct ConnectionStatus {
    pub name: String,
    pub target: String,
    pub epoch: u64,
    pub connected: bool,
    pub reconnects: u64,
    pub credentials: usize,
}

pub async fn get_status() -> Json<SystemStatus> {
    Json(SystemStatus {
        version: env!("CARGO_PKG_VERSION"),
        status: "operational",
    })
}

pub async fn get_connections(State(state): State<AdminState>) -> Json<Vec<ConnectionStatus>> {
    let statuses = state
        .registry
        .groups()
        .into_iter()
        .map(|group| ConnectionStatus {
            name: group.name().to_string(),
            target: group.target().to_string(),
            epoch: group.epoch(),
            connected: group.is_connected(),
            reconnects: group.reconnect_count(),
            credentials: group.credentials().len(),
        })
        .collect();

    Json(statuses)
}

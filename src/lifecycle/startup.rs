//! Startup orchestration.
//!
//! # Responsibilities
//! - Build the connection registry from validated configuration
//! - Connect every group, retrying once on a transient fault
//! - Check each credentialed location before it is served
//! - Compile the location router from the survivors
//!
//! # Design Decisions
//! - Fail fast on configuration errors
//! - Groups initialize in name order, not concurrently
//! - Listeners are bound by the caller once this returns

use std::sync::Arc;

use thiserror::Error;

use crate::backend::Connector;
use crate::config::validation::validate_config;
use crate::config::{ConfigError, GatewayConfig, LocationConfig};
use crate::error::GatewayError;
use crate::registry::{ConnectionGroup, ConnectionRegistry};
use crate::resilience::RetryPolicy;
use crate::routing::{Location, LocationRouter};

/// Collection queried by the startup credential check.
pub const AUTH_CHECK_COLLECTION: &str = "__auth_check__";

#[derive(Debug, Error)]
pub enum StartupError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("no location could be served")]
    NoLocations,
}

/// Everything the servers need, built once at startup.
pub struct Gateway {
    pub config: GatewayConfig,
    pub registry: Arc<ConnectionRegistry>,
    pub router: Arc<LocationRouter>,
    pub policy: RetryPolicy,
}

/// Connect, check credentials and compile the gateway described by `config`.
pub async fn bootstrap(
    config: GatewayConfig,
    connector: Arc<dyn Connector>,
) -> Result<Gateway, StartupError> {
    validate_config(&config).map_err(ConfigError::Validation)?;
    let registry = ConnectionRegistry::from_config(&config, connector)
        .map_err(ConfigError::Validation)?;
    let policy = RetryPolicy::from_config(&config.retries);

    for group in registry.groups() {
        match policy.initialize(&group).await {
            Ok(()) => tracing::info!(
                group = %group.name(),
                target = %group.target(),
                credentials = group.credentials().len(),
                "Connection group ready"
            ),
            Err(e) => tracing::warn!(
                group = %group.name(),
                target = %group.target(),
                error = %e,
                "Connection group unavailable at startup, will reconnect on demand"
            ),
        }
    }

    let mut locations = Vec::with_capacity(config.locations.len());
    for location in &config.locations {
        let Some(group) = registry.get(&location.connection) else {
            continue;
        };
        if group.requires_auth() {
            if let Err(e) = check_access(&policy, &group, location).await {
                tracing::error!(
                    location = %location.prefix,
                    group = %group.name(),
                    database = %location.database,
                    error = %e,
                    "Credential check failed, location disabled"
                );
                continue;
            }
        }
        tracing::info!(
            location = %location.prefix,
            group = %group.name(),
            database = %location.database,
            root = %location.root_collection,
            field = location.field.as_str(),
            key_type = %location.key_type,
            "Location enabled"
        );
        locations.push(Location::new(location, group));
    }

    if locations.is_empty() {
        return Err(StartupError::NoLocations);
    }

    Ok(Gateway {
        config,
        registry: Arc::new(registry),
        router: Arc::new(LocationRouter::new(locations)),
        policy,
    })
}

async fn check_access(
    policy: &RetryPolicy,
    group: &ConnectionGroup,
    location: &LocationConfig,
) -> Result<(), GatewayError> {
    let database = location.database.as_str();
    let mut budget = policy.budget();
    policy
        .execute(group, &mut budget, |conn| async move {
            conn.check_access(database, AUTH_CHECK_COLLECTION).await
        })
        .await
}

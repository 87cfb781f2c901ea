//! Backend connection registry.
//!
//! # Data Flow
//! ```text
//! Startup:
//!     ConnectionConfig[] → ConnectTarget per group
//!     LocationConfig[]   → AppliedCredential appended to the named group
//!     → ConnectionRegistry (fixed set of groups, process lifetime)
//!
//! Request time:
//!     location.connection → get(name) → ConnectionGroup
//!     → current() for queries, reconnect(epoch) on transient faults
//! ```
//!
//! # Design Decisions
//! - One group per name; every location naming it shares the same connection
//! - The set of groups never changes after startup, so lookups take no lock
//! - Connection replacement is single-flighted inside each group

pub mod group;

use std::collections::HashMap;
use std::sync::Arc;

pub use group::{AppliedCredential, ConnectionGroup, ConnectionHandle};

use crate::backend::{ConnectTarget, Connector, Endpoint};
use crate::config::schema::{ConnectionConfig, GatewayConfig, DEFAULT_BACKEND_ADDRESS};
use crate::config::validation::{split_endpoint, ValidationError};
use crate::resilience::backoff::Backoff;

#[derive(Debug)]
pub struct ConnectionRegistry {
    groups: HashMap<String, Arc<ConnectionGroup>>,
}

impl ConnectionRegistry {
    /// Build every configured group and attach location credentials.
    ///
    /// Groups are created disconnected; see [`ConnectionGroup::establish`].
    pub fn from_config(
        config: &GatewayConfig,
        connector: Arc<dyn Connector>,
    ) -> Result<Self, Vec<ValidationError>> {
        let backoff = Backoff::from_millis(config.retries.reconnect_backoff_ms);

        let mut errors = Vec::new();
        let mut groups = HashMap::new();
        for connection in &config.connections {
            let target = match connect_target(connection) {
                Ok(target) => target,
                Err(e) => {
                    errors.push(e);
                    continue;
                }
            };

            let mut credentials: Vec<AppliedCredential> = Vec::new();
            let with_credentials = config
                .locations
                .iter()
                .filter(|location| location.connection == connection.name);
            for location in with_credentials {
                let (Some(username), Some(password)) = (&location.username, &location.password)
                else {
                    continue;
                };
                let seen = credentials
                    .iter()
                    .any(|c| c.database == location.database && &c.username == username);
                if !seen {
                    credentials.push(AppliedCredential::new(
                        location.database.clone(),
                        username.clone(),
                        password.clone(),
                    ));
                }
            }

            let group = ConnectionGroup::new(
                connection.name.clone(),
                target,
                credentials,
                connector.clone(),
                backoff,
            );
            groups.insert(connection.name.clone(), Arc::new(group));
        }

        if errors.is_empty() {
            Ok(Self { groups })
        } else {
            Err(errors)
        }
    }

    /// Look up a group by name.
    pub fn get(&self, name: &str) -> Option<Arc<ConnectionGroup>> {
        self.groups.get(name).cloned()
    }

    /// All groups, ordered by name.
    pub fn groups(&self) -> Vec<Arc<ConnectionGroup>> {
        let mut groups: Vec<_> = self.groups.values().cloned().collect();
        groups.sort_by(|a, b| a.name().cmp(b.name()));
        groups
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }
}

/// Resolve the configured topology of a group.
pub fn connect_target(connection: &ConnectionConfig) -> Result<ConnectTarget, ValidationError> {
    let endpoint = |raw: &str| {
        split_endpoint(raw)
            .map(|(host, port)| Endpoint {
                host: host.to_string(),
                port,
            })
            .ok_or_else(|| ValidationError::InvalidEndpoint {
                name: connection.name.clone(),
                endpoint: raw.to_string(),
            })
    };

    match &connection.replica_set {
        Some(name) => Ok(ConnectTarget::ReplicaSet {
            name: name.clone(),
            seeds: connection
                .seeds
                .iter()
                .map(|seed| endpoint(seed))
                .collect::<Result<_, _>>()?,
        }),
        None => {
            let address = connection
                .address
                .as_deref()
                .unwrap_or(DEFAULT_BACKEND_ADDRESS);
            endpoint(address).map(ConnectTarget::Single)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::memory::MemoryStore;
    use crate::config::parse_config;

    fn registry(toml: &str) -> ConnectionRegistry {
        let config = parse_config(toml).unwrap();
        ConnectionRegistry::from_config(&config, Arc::new(MemoryStore::new())).unwrap()
    }

    #[test]
    fn test_locations_share_group_and_credentials() {
        let registry = registry(
            r#"
            [[connections]]
            name = "main"
            address = "db:27017"

            [[locations]]
            prefix = "/a/"
            connection = "main"
            database = "media"
            username = "reader"
            password = "secret"

            [[locations]]
            prefix = "/b/"
            connection = "main"
            database = "media"
            username = "reader"
            password = "secret"

            [[locations]]
            prefix = "/c/"
            connection = "main"
            database = "archive"
            username = "archivist"
            password = "s3"

            [[locations]]
            prefix = "/d/"
            connection = "main"
            database = "public"
            "#,
        );

        assert_eq!(registry.len(), 1);
        let group = registry.get("main").unwrap();
        let credentials: Vec<_> = group
            .credentials()
            .iter()
            .map(|c| (c.database.as_str(), c.username.as_str()))
            .collect();
        assert_eq!(credentials, vec![("media", "reader"), ("archive", "archivist")]);
        assert!(Arc::ptr_eq(&group, &registry.get("main").unwrap()));
        assert!(registry.get("other").is_none());
    }

    #[test]
    fn test_connect_targets() {
        let single = ConnectionConfig {
            name: "a".into(),
            address: None,
            replica_set: None,
            seeds: Vec::new(),
        };
        assert_eq!(connect_target(&single).unwrap().to_string(), "127.0.0.1:27017");

        let rs = ConnectionConfig {
            name: "b".into(),
            address: None,
            replica_set: Some("rs0".into()),
            seeds: vec!["h1:1".into(), "h2:2".into()],
        };
        match connect_target(&rs).unwrap() {
            ConnectTarget::ReplicaSet { name, seeds } => {
                assert_eq!(name, "rs0");
                assert_eq!(seeds.len(), 2);
                assert_eq!(seeds[1].port, 2);
            }
            other => panic!("unexpected target {other:?}"),
        }
    }
}

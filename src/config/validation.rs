//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Check referential integrity (locations reference existing connections)
//! - Validate field/key type pairings and credential shape
//! - Validate replica set seed counts and endpoint syntax
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: GatewayConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::collections::HashSet;

use thiserror::Error;

use crate::config::schema::{
    ConnectionConfig, GatewayConfig, KeyType, LocationConfig, LookupField, MAX_REPLICA_SEEDS,
    MIN_REPLICA_SEEDS,
};

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("connection name must not be empty")]
    EmptyConnectionName,

    #[error("connection '{0}' is declared more than once")]
    DuplicateConnection(String),

    #[error("connection '{0}': address and replica_set are mutually exclusive")]
    AmbiguousTopology(String),

    #[error("connection '{name}': replica set needs {min}..={max} seeds, got {got}")]
    SeedCount {
        name: String,
        got: usize,
        min: usize,
        max: usize,
    },

    #[error("connection '{0}': seeds given without replica_set")]
    SeedsWithoutReplicaSet(String),

    #[error("connection '{name}': invalid endpoint '{endpoint}' (expected host:port)")]
    InvalidEndpoint { name: String, endpoint: String },

    #[error("location '{0}': prefix must start with '/'")]
    InvalidPrefix(String),

    #[error("location '{0}' is declared more than once")]
    DuplicatePrefix(String),

    #[error("location '{0}': unknown connection '{1}'")]
    UnknownConnection(String, String),

    #[error("location '{0}': must provide a database")]
    MissingDatabase(String),

    #[error("location '{0}': root_collection must not be empty")]
    EmptyRootCollection(String),

    #[error("location '{prefix}': field 'filename' requires key_type 'string', got '{key_type}'")]
    FieldKeyTypeMismatch { prefix: String, key_type: KeyType },

    #[error("location '{0}': username and password must be given together")]
    PartialCredentials(String),
}

/// Validate a deserialized configuration.
pub fn validate_config(config: &GatewayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    let mut names = HashSet::new();
    for connection in &config.connections {
        validate_connection(connection, &mut errors);
        if !names.insert(connection.name.as_str()) {
            errors.push(ValidationError::DuplicateConnection(connection.name.clone()));
        }
    }

    let mut prefixes = HashSet::new();
    for location in &config.locations {
        validate_location(location, &names, &mut errors);
        if !prefixes.insert(location.prefix.as_str()) {
            errors.push(ValidationError::DuplicatePrefix(location.prefix.clone()));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn validate_connection(connection: &ConnectionConfig, errors: &mut Vec<ValidationError>) {
    let name = &connection.name;
    if name.is_empty() {
        errors.push(ValidationError::EmptyConnectionName);
    }

    match (&connection.address, &connection.replica_set) {
        (Some(_), Some(_)) => errors.push(ValidationError::AmbiguousTopology(name.clone())),
        (_, Some(_)) => {
            let got = connection.seeds.len();
            if !(MIN_REPLICA_SEEDS..=MAX_REPLICA_SEEDS).contains(&got) {
                errors.push(ValidationError::SeedCount {
                    name: name.clone(),
                    got,
                    min: MIN_REPLICA_SEEDS,
                    max: MAX_REPLICA_SEEDS,
                });
            }
        }
        (_, None) if !connection.seeds.is_empty() => {
            errors.push(ValidationError::SeedsWithoutReplicaSet(name.clone()));
        }
        _ => {}
    }

    let endpoints = connection.address.iter().chain(connection.seeds.iter());
    for endpoint in endpoints {
        if split_endpoint(endpoint).is_none() {
            errors.push(ValidationError::InvalidEndpoint {
                name: name.clone(),
                endpoint: endpoint.clone(),
            });
        }
    }
}

fn validate_location(
    location: &LocationConfig,
    connections: &HashSet<&str>,
    errors: &mut Vec<ValidationError>,
) {
    let prefix = &location.prefix;
    if !prefix.starts_with('/') {
        errors.push(ValidationError::InvalidPrefix(prefix.clone()));
    }
    if !connections.contains(location.connection.as_str()) {
        errors.push(ValidationError::UnknownConnection(
            prefix.clone(),
            location.connection.clone(),
        ));
    }
    if location.database.is_empty() {
        errors.push(ValidationError::MissingDatabase(prefix.clone()));
    }
    if location.root_collection.is_empty() {
        errors.push(ValidationError::EmptyRootCollection(prefix.clone()));
    }
    if location.field == LookupField::Filename && location.key_type != KeyType::String {
        errors.push(ValidationError::FieldKeyTypeMismatch {
            prefix: prefix.clone(),
            key_type: location.key_type,
        });
    }
    if location.username.is_some() != location.password.is_some() {
        errors.push(ValidationError::PartialCredentials(prefix.clone()));
    }
}

/// Split "host:port" into its parts. IPv6 hosts use brackets: "[::1]:27017".
pub fn split_endpoint(endpoint: &str) -> Option<(&str, u16)> {
    let (host, port) = endpoint.rsplit_once(':')?;
    let port: u16 = port.parse().ok()?;
    let host = host
        .strip_prefix('[')
        .and_then(|h| h.strip_suffix(']'))
        .unwrap_or(host);
    if host.is_empty() || port == 0 {
        return None;
    }
    Some((host, port))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn connection(name: &str) -> ConnectionConfig {
        ConnectionConfig {
            name: name.into(),
            address: Some("127.0.0.1:27017".into()),
            replica_set: None,
            seeds: Vec::new(),
        }
    }

    fn location(prefix: &str) -> LocationConfig {
        LocationConfig {
            prefix: prefix.into(),
            connection: "main".into(),
            database: "media".into(),
            root_collection: "fs".into(),
            field: LookupField::Id,
            key_type: KeyType::ObjectId,
            username: None,
            password: None,
        }
    }

    fn config() -> GatewayConfig {
        GatewayConfig {
            connections: vec![connection("main")],
            locations: vec![location("/media/")],
            ..Default::default()
        }
    }

    #[test]
    fn test_valid_config() {
        assert!(validate_config(&config()).is_ok());
    }

    #[test]
    fn test_filename_requires_string_key() {
        let mut cfg = config();
        cfg.locations[0].field = LookupField::Filename;
        cfg.locations[0].key_type = KeyType::ObjectId;

        let errors = validate_config(&cfg).unwrap_err();
        assert_eq!(
            errors,
            vec![ValidationError::FieldKeyTypeMismatch {
                prefix: "/media/".into(),
                key_type: KeyType::ObjectId,
            }]
        );

        cfg.locations[0].key_type = KeyType::String;
        assert!(validate_config(&cfg).is_ok());
    }

    #[test]
    fn test_missing_database_and_partial_credentials() {
        let mut cfg = config();
        cfg.locations[0].database.clear();
        cfg.locations[0].username = Some("reader".into());

        let errors = validate_config(&cfg).unwrap_err();
        assert!(errors.contains(&ValidationError::MissingDatabase("/media/".into())));
        assert!(errors.contains(&ValidationError::PartialCredentials("/media/".into())));
    }

    #[test]
    fn test_replica_seed_limits() {
        let mut cfg = config();
        cfg.connections[0].address = None;
        cfg.connections[0].replica_set = Some("rs0".into());
        cfg.connections[0].seeds = (0..9).map(|i| format!("db{i}:27017")).collect();

        let errors = validate_config(&cfg).unwrap_err();
        assert!(matches!(
            errors[0],
            ValidationError::SeedCount { got: 9, max: 8, .. }
        ));

        cfg.connections[0].seeds.truncate(1);
        assert!(validate_config(&cfg).is_err());

        cfg.connections[0].seeds = vec!["db0:27017".into(), "db1:27017".into()];
        assert!(validate_config(&cfg).is_ok());
    }

    #[test]
    fn test_unknown_and_duplicate_references() {
        let mut cfg = config();
        cfg.connections.push(connection("main"));
        cfg.locations.push(location("/media/"));
        cfg.locations[1].connection = "other".into();

        let errors = validate_config(&cfg).unwrap_err();
        assert!(errors.contains(&ValidationError::DuplicateConnection("main".into())));
        assert!(errors.contains(&ValidationError::DuplicatePrefix("/media/".into())));
        assert!(errors.contains(&ValidationError::UnknownConnection(
            "/media/".into(),
            "other".into()
        )));
    }

    #[test]
    fn test_split_endpoint() {
        assert_eq!(split_endpoint("db.local:27017"), Some(("db.local", 27017)));
        assert_eq!(split_endpoint("[::1]:27018"), Some(("::1", 27018)));
        assert_eq!(split_endpoint("db.local"), None);
        assert_eq!(split_endpoint(":27017"), None);
        assert_eq!(split_endpoint("db:notaport"), None);
    }
}

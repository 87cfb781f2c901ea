//! Location lookup.
//!
//! # Responsibilities
//! - Store compiled locations
//! - Find the location serving a request path
//! - Return the matched location and its key segment, or no match

use std::sync::Arc;

use crate::config::{KeyType, LocationConfig, LookupField};
use crate::gridfs::Bucket;
use crate::registry::ConnectionGroup;
use crate::routing::matcher::PathPrefixMatcher;

/// A compiled location.
#[derive(Debug)]
pub struct Location {
    pub matcher: PathPrefixMatcher,
    pub bucket: Bucket,
    pub field: LookupField,
    pub key_type: KeyType,
    pub group: Arc<ConnectionGroup>,
}

impl Location {
    pub fn new(config: &LocationConfig, group: Arc<ConnectionGroup>) -> Self {
        Self {
            matcher: PathPrefixMatcher::new(config.prefix.clone()),
            bucket: Bucket::new(config.database.clone(), config.root_collection.clone()),
            field: config.field,
            key_type: config.key_type,
            group,
        }
    }

    pub fn prefix(&self) -> &str {
        self.matcher.prefix()
    }
}

#[derive(Debug, Default)]
pub struct LocationRouter {
    locations: Vec<Arc<Location>>,
}

impl LocationRouter {
    pub fn new(mut locations: Vec<Location>) -> Self {
        locations.sort_by(|a, b| b.prefix().len().cmp(&a.prefix().len()));
        Self {
            locations: locations.into_iter().map(Arc::new).collect(),
        }
    }

    /// Find the most specific location for `path`.
    pub fn match_path<'a>(&self, path: &'a str) -> Option<(Arc<Location>, &'a str)> {
        self.locations.iter().find_map(|location| {
            location
                .matcher
                .strip(path)
                .map(|segment| (location.clone(), segment))
        })
    }

    pub fn locations(&self) -> &[Arc<Location>] {
        &self.locations
    }

    pub fn len(&self) -> usize {
        self.locations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locations.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::memory::MemoryStore;
    use crate::backend::{ConnectTarget, Endpoint};
    use crate::resilience::Backoff;

    fn group() -> Arc<ConnectionGroup> {
        Arc::new(ConnectionGroup::new(
            "main",
            ConnectTarget::Single(Endpoint {
                host: "memory".into(),
                port: 27017,
            }),
            Vec::new(),
            Arc::new(MemoryStore::new()),
            Backoff::from_millis(0),
        ))
    }

    fn location(prefix: &str, database: &str) -> Location {
        let config = LocationConfig {
            prefix: prefix.into(),
            connection: "main".into(),
            database: database.into(),
            root_collection: "fs".into(),
            field: LookupField::Id,
            key_type: KeyType::String,
            username: None,
            password: None,
        };
        Location::new(&config, group())
    }

    #[test]
    fn test_longest_prefix_wins() {
        let router = LocationRouter::new(vec![
            location("/files/", "general"),
            location("/files/images/", "images"),
        ]);

        let (matched, segment) = router.match_path("/files/images/logo").unwrap();
        assert_eq!(matched.bucket.database, "images");
        assert_eq!(segment, "logo");

        let (matched, segment) = router.match_path("/files/report.pdf").unwrap();
        assert_eq!(matched.bucket.database, "general");
        assert_eq!(segment, "report.pdf");
    }

    #[test]
    fn test_no_match() {
        let router = LocationRouter::new(vec![location("/files/", "general")]);
        assert!(router.match_path("/other/x").is_none());
        assert!(LocationRouter::default().match_path("/files/x").is_none());
    }
}

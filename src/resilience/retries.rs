//! Retry/failover policy.
//!
//! # State Machine
//! ```text
//! Attempt ──ok──────────────────────────────────────────▶ OK
//!    │
//!    ├─non-transient error─────────────────────────────▶ FAIL (mapped error)
//!    │
//!    └─transient fault─▶ budget left? ──no─────────────▶ FAIL (503)
//!                            │yes
//!                            ▼
//!                  reconnect + reauthenticate ──err────▶ FAIL (503)
//!                            │ok
//!                            └──────────▶ Attempt
//! ```
//!
//! # Design Decisions
//! - One budget per request, shared by the metadata lookup and every chunk fetch
//! - Only transient faults trigger a reconnect; everything else propagates as-is
//! - An empty connection slot counts as a transient fault

use std::future::Future;
use std::sync::Arc;

use crate::backend::{BackendError, BackendResult, Connection};
use crate::config::RetryConfig;
use crate::error::GatewayError;
use crate::registry::ConnectionGroup;

/// Reconnect-and-retry cycles left for one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryBudget {
    remaining: u32,
    used: u32,
}

impl RetryBudget {
    pub fn new(max_retries: u32) -> Self {
        Self {
            remaining: max_retries,
            used: 0,
        }
    }

    /// Take one retry if any is left.
    pub fn try_consume(&mut self) -> bool {
        if self.remaining == 0 {
            return false;
        }
        self.remaining -= 1;
        self.used += 1;
        true
    }

    pub fn remaining(&self) -> u32 {
        self.remaining
    }

    pub fn used(&self) -> u32 {
        self.used
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_retries: u32,
}

impl RetryPolicy {
    pub fn new(max_retries: u32) -> Self {
        Self { max_retries }
    }

    pub fn from_config(config: &RetryConfig) -> Self {
        Self::new(config.max_retries)
    }

    /// Fresh budget for one top-level request.
    pub fn budget(&self) -> RetryBudget {
        RetryBudget::new(self.max_retries)
    }

    /// Run `op` against the group's connection under the retry state machine.
    pub async fn execute<T, F, Fut>(
        &self,
        group: &ConnectionGroup,
        budget: &mut RetryBudget,
        mut op: F,
    ) -> Result<T, GatewayError>
    where
        F: FnMut(Arc<dyn Connection>) -> Fut,
        Fut: Future<Output = BackendResult<T>>,
    {
        loop {
            let handle = group.current();
            let outcome = match handle.connection {
                Some(connection) => op(connection).await,
                None => Err(BackendError::Transient("not connected".into())),
            };

            let fault = match outcome {
                Ok(value) => return Ok(value),
                Err(e) if e.is_transient() => e,
                Err(e) => return Err(e.into()),
            };

            if !budget.try_consume() {
                tracing::warn!(
                    group = %group.name(),
                    epoch = handle.epoch,
                    retries_used = budget.used(),
                    error = %fault,
                    "Retry budget exhausted"
                );
                return Err(GatewayError::Unavailable {
                    group: group.name().to_string(),
                    source: fault,
                });
            }

            tracing::warn!(
                group = %group.name(),
                epoch = handle.epoch,
                error = %fault,
                "Transient backend fault, reconnecting"
            );
            if let Err(e) = group.reconnect(handle.epoch).await {
                return Err(GatewayError::Unavailable {
                    group: group.name().to_string(),
                    source: e,
                });
            }
        }
    }

    /// Establish a group's first connection, recovering once per budget.
    pub async fn initialize(&self, group: &ConnectionGroup) -> Result<(), GatewayError> {
        match group.establish().await {
            Ok(_) => return Ok(()),
            Err(e) if e.is_transient() => {
                tracing::warn!(group = %group.name(), error = %e, "Initial connect failed");
            }
            Err(e) => {
                return Err(GatewayError::Unavailable {
                    group: group.name().to_string(),
                    source: e,
                })
            }
        }

        let mut budget = self.budget();
        self.execute(group, &mut budget, |_| async { Ok(()) }).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::memory::MemoryStore;
    use crate::backend::{ConnectTarget, Endpoint, FileFilter};
    use crate::config::LookupField;
    use crate::gridfs::key::ObjectKey;
    use crate::registry::AppliedCredential;
    use crate::resilience::backoff::Backoff;

    async fn connected_group(store: &MemoryStore) -> ConnectionGroup {
        store.add_user("media", "reader", "secret");
        let group = ConnectionGroup::new(
            "main",
            ConnectTarget::Single(Endpoint {
                host: "memory".into(),
                port: 27017,
            }),
            vec![AppliedCredential::new("media", "reader", "secret")],
            Arc::new(store.clone()),
            Backoff::from_millis(0),
        );
        group.establish().await.unwrap();
        group
    }

    fn filter() -> FileFilter {
        FileFilter {
            field: LookupField::Filename,
            key: ObjectKey::String("missing.txt".into()),
        }
    }

    async fn lookup(
        policy: &RetryPolicy,
        group: &ConnectionGroup,
        budget: &mut RetryBudget,
    ) -> Result<bool, GatewayError> {
        let filter = filter();
        let filter = &filter;
        policy
            .execute(group, budget, |conn| async move {
                conn.find_file("media", "fs.files", filter)
                    .await
                    .map(|found| found.is_some())
            })
            .await
    }

    #[test]
    fn test_budget_consumption() {
        let mut budget = RetryBudget::new(1);
        assert!(budget.try_consume());
        assert!(!budget.try_consume());
        assert_eq!(budget.used(), 1);
        assert_eq!(budget.remaining(), 0);
    }

    #[tokio::test]
    async fn test_success_uses_no_budget() {
        let store = MemoryStore::new();
        let group = connected_group(&store).await;
        let policy = RetryPolicy::new(1);
        let mut budget = policy.budget();

        let found = lookup(&policy, &group, &mut budget).await.unwrap();
        assert!(!found);
        assert_eq!(budget.used(), 0);
        assert_eq!(store.file_queries(), 1);
        assert_eq!(store.connects(), 1);
    }

    #[tokio::test]
    async fn test_one_fault_reconnects_and_reauthenticates_once() {
        let store = MemoryStore::new();
        let group = connected_group(&store).await;
        let policy = RetryPolicy::new(1);
        let mut budget = policy.budget();
        store.fail_next_file_queries(1);

        assert!(lookup(&policy, &group, &mut budget).await.is_ok());
        assert_eq!(budget.used(), 1);
        assert_eq!(store.connects(), 2);
        assert_eq!(store.authentications(), 2);
        assert_eq!(store.file_queries(), 2);
        assert_eq!(group.reconnect_count(), 1);
    }

    #[tokio::test]
    async fn test_two_faults_exhaust_budget() {
        let store = MemoryStore::new();
        let group = connected_group(&store).await;
        let policy = RetryPolicy::new(1);
        let mut budget = policy.budget();
        store.fail_next_file_queries(2);

        let err = lookup(&policy, &group, &mut budget).await.unwrap_err();
        assert!(matches!(err, GatewayError::Unavailable { .. }));
        assert_eq!(store.connects(), 2);
        assert_eq!(store.file_queries(), 2);
    }

    #[tokio::test]
    async fn test_budget_shared_across_operations() {
        let store = MemoryStore::new();
        let group = connected_group(&store).await;
        let policy = RetryPolicy::new(1);
        let mut budget = policy.budget();

        store.fail_next_file_queries(1);
        assert!(lookup(&policy, &group, &mut budget).await.is_ok());

        store.fail_next_file_queries(1);
        let err = lookup(&policy, &group, &mut budget).await.unwrap_err();
        assert!(matches!(err, GatewayError::Unavailable { .. }));
        assert_eq!(store.connects(), 2);
    }

    #[tokio::test]
    async fn test_non_transient_error_is_not_retried() {
        let store = MemoryStore::new();
        let group = connected_group(&store).await;
        let policy = RetryPolicy::new(1);
        let mut budget = policy.budget();

        let err = policy
            .execute(&group, &mut budget, |_| async {
                Err::<(), _>(BackendError::Query("bad filter".into()))
            })
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::Backend(BackendError::Query(_))));
        assert_eq!(budget.used(), 0);
        assert_eq!(store.connects(), 1);
    }

    #[tokio::test]
    async fn test_failed_reconnect_is_unavailable() {
        let store = MemoryStore::new();
        let group = connected_group(&store).await;
        let policy = RetryPolicy::new(1);
        let mut budget = policy.budget();
        store.sever_connections();
        store.fail_next_connects(1);

        let err = lookup(&policy, &group, &mut budget).await.unwrap_err();
        match err {
            GatewayError::Unavailable { source, .. } => {
                assert!(matches!(source, BackendError::Connect(_)))
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_initialize_recovers_from_refused_connect() {
        let store = MemoryStore::new();
        let group = ConnectionGroup::new(
            "main",
            ConnectTarget::Single(Endpoint {
                host: "memory".into(),
                port: 27017,
            }),
            Vec::new(),
            Arc::new(store.clone()),
            Backoff::from_millis(0),
        );
        store.fail_next_connects(1);

        RetryPolicy::new(1).initialize(&group).await.unwrap();
        assert!(group.is_connected());
        assert_eq!(store.connects(), 2);
    }
}

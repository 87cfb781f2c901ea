//! A named connection group.
//!
//! # Responsibilities
//! - Own the live connection shared by every location naming this group
//! - Replay applied credentials, in order, on each fresh connection
//! - Reconnect as one atomic transition observed consistently by all requests
//!
//! # State
//! ```text
//! slot: (epoch, attempt, Option<connection>, last failure)   read lock-free
//!
//! reconnect(observed):
//!     note attempt, lock transition
//!     epoch != observed            → someone already reconnected, reuse
//!     attempt moved while waiting  → share that attempt's failure
//!     else teardown (slot empty)   → backoff → connect → reauthenticate
//!         ok                       → publish (epoch + 1, connection)
//!         err                      → slot stays empty at the same epoch,
//!                                    failure recorded for the waiters
//! ```

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use arc_swap::ArcSwap;
use tokio::sync::Mutex;

use crate::backend::{BackendError, BackendResult, ConnectTarget, Connection, Connector};
use crate::observability::metrics;
use crate::resilience::backoff::Backoff;

/// Credential applied to a group for one database.
#[derive(Clone, PartialEq, Eq)]
pub struct AppliedCredential {
    pub database: String,
    pub username: String,
    password: String,
}

impl AppliedCredential {
    pub fn new(
        database: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            database: database.into(),
            username: username.into(),
            password: password.into(),
        }
    }

    pub fn password(&self) -> &str {
        &self.password
    }
}

impl fmt::Debug for AppliedCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppliedCredential")
            .field("database", &self.database)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

struct Slot {
    epoch: u64,
    /// Bumped by every finished connect attempt, successful or not.
    attempt: u64,
    connection: Option<Arc<dyn Connection>>,
    last_failure: Option<BackendError>,
}

/// The connection a request works with, tagged with the epoch it was read at.
#[derive(Clone)]
pub struct ConnectionHandle {
    pub epoch: u64,
    pub connection: Option<Arc<dyn Connection>>,
}

impl fmt::Debug for ConnectionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionHandle")
            .field("epoch", &self.epoch)
            .field("connected", &self.connection.is_some())
            .finish()
    }
}

pub struct ConnectionGroup {
    name: String,
    target: ConnectTarget,
    credentials: Vec<AppliedCredential>,
    connector: Arc<dyn Connector>,
    backoff: Backoff,
    slot: ArcSwap<Slot>,
    transition: Mutex<()>,
    reconnects: AtomicU64,
}

impl ConnectionGroup {
    pub fn new(
        name: impl Into<String>,
        target: ConnectTarget,
        credentials: Vec<AppliedCredential>,
        connector: Arc<dyn Connector>,
        backoff: Backoff,
    ) -> Self {
        Self {
            name: name.into(),
            target,
            credentials,
            connector,
            backoff,
            slot: ArcSwap::from_pointee(Slot {
                epoch: 0,
                attempt: 0,
                connection: None,
                last_failure: None,
            }),
            transition: Mutex::new(()),
            reconnects: AtomicU64::new(0),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn target(&self) -> &ConnectTarget {
        &self.target
    }

    pub fn credentials(&self) -> &[AppliedCredential] {
        &self.credentials
    }

    pub fn requires_auth(&self) -> bool {
        !self.credentials.is_empty()
    }

    pub fn epoch(&self) -> u64 {
        self.slot.load().epoch
    }

    pub fn is_connected(&self) -> bool {
        self.slot.load().connection.is_some()
    }

    /// Completed reconnects since startup.
    pub fn reconnect_count(&self) -> u64 {
        self.reconnects.load(Ordering::Relaxed)
    }

    /// Snapshot of the live connection.
    pub fn current(&self) -> ConnectionHandle {
        let slot = self.slot.load();
        ConnectionHandle {
            epoch: slot.epoch,
            connection: slot.connection.clone(),
        }
    }

    /// First connection at startup: connect and authenticate, no backoff.
    pub async fn establish(&self) -> BackendResult<ConnectionHandle> {
        let observed = self.epoch();
        self.transition(observed, false).await
    }

    /// Replace the connection that was current at `observed_epoch`.
    ///
    /// Concurrent callers that observed the same epoch share one reconnect
    /// attempt, and its error when it fails.
    pub async fn reconnect(&self, observed_epoch: u64) -> BackendResult<ConnectionHandle> {
        self.transition(observed_epoch, true).await
    }

    /// Replay every credential, in the order applied, on `connection`.
    pub async fn reauthenticate(&self, connection: &dyn Connection) -> BackendResult<()> {
        for credential in &self.credentials {
            connection
                .authenticate(
                    &credential.database,
                    &credential.username,
                    &credential.password,
                )
                .await
                .map_err(|e| match e {
                    auth @ BackendError::Auth { .. } => auth,
                    other if other.is_transient() => other,
                    other => BackendError::Auth {
                        database: credential.database.clone(),
                        username: credential.username.clone(),
                        reason: other.to_string(),
                    },
                })?;
            tracing::debug!(
                group = %self.name,
                database = %credential.database,
                username = %credential.username,
                "Credential applied"
            );
        }
        Ok(())
    }

    async fn transition(&self, observed: u64, teardown: bool) -> BackendResult<ConnectionHandle> {
        let attempt_seen = self.slot.load().attempt;
        let _guard = self.transition.lock().await;

        let slot = self.slot.load_full();
        if slot.epoch != observed && slot.connection.is_some() {
            tracing::debug!(
                group = %self.name,
                observed,
                epoch = slot.epoch,
                "Connection already replaced"
            );
            return Ok(ConnectionHandle {
                epoch: slot.epoch,
                connection: slot.connection.clone(),
            });
        }
        if !teardown && slot.connection.is_some() {
            return Ok(ConnectionHandle {
                epoch: slot.epoch,
                connection: slot.connection.clone(),
            });
        }
        if slot.attempt != attempt_seen {
            if let Some(failure) = &slot.last_failure {
                tracing::debug!(
                    group = %self.name,
                    epoch = slot.epoch,
                    "Sharing failed reconnect attempt"
                );
                return Err(failure.clone());
            }
        }

        if teardown {
            tracing::warn!(group = %self.name, epoch = slot.epoch, "Tearing down connection");
            self.slot.store(Arc::new(Slot {
                epoch: slot.epoch,
                attempt: slot.attempt,
                connection: None,
                last_failure: None,
            }));
            self.backoff.wait().await;
        }

        match self.connect_and_authenticate().await {
            Ok(connection) => {
                let epoch = slot.epoch + 1;
                self.slot.store(Arc::new(Slot {
                    epoch,
                    attempt: slot.attempt + 1,
                    connection: Some(connection.clone()),
                    last_failure: None,
                }));
                if teardown {
                    self.reconnects.fetch_add(1, Ordering::Relaxed);
                    metrics::record_reconnect(&self.name, "ok");
                }
                tracing::info!(group = %self.name, target = %self.target, epoch, "Connection established");

                Ok(ConnectionHandle {
                    epoch,
                    connection: Some(connection),
                })
            }
            Err(e) => {
                self.slot.store(Arc::new(Slot {
                    epoch: slot.epoch,
                    attempt: slot.attempt + 1,
                    connection: None,
                    last_failure: Some(e.clone()),
                }));
                if teardown {
                    metrics::record_reconnect(&self.name, "failed");
                }
                Err(e)
            }
        }
    }

    async fn connect_and_authenticate(&self) -> BackendResult<Arc<dyn Connection>> {
        let connection = self.connector.connect(&self.target).await.map_err(|e| {
            tracing::error!(group = %self.name, target = %self.target, error = %e, "Connect failed");
            e
        })?;
        self.reauthenticate(connection.as_ref()).await.map_err(|e| {
            tracing::error!(group = %self.name, error = %e, "Reauthentication failed");
            e
        })?;
        Ok(connection)
    }
}

impl fmt::Debug for ConnectionGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionGroup")
            .field("name", &self.name)
            .field("target", &self.target)
            .field("credentials", &self.credentials)
            .field("epoch", &self.epoch())
            .field("connected", &self.is_connected())
            .finish()
    }
}

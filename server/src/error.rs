//! Error types surfaced by the engine.
//!
//! Startup failures (`UnsupportedHostVersion`, `NotInitialized`) are fatal and
//! leave nothing behind. Races with the host (a proxy vanishing between passes)
//! never show up here; the loop handles them by unregistering the binding.

use shared::BackendError;
use thiserror::Error;

use crate::host::{EntityKind, HostProxyKey};
use crate::registry::{BodyId, SyncPolicy};

/// Failures reported by the host or by a capability strategy.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum HostError {
    #[error("host proxy {0} is no longer valid")]
    ProxyInvalid(HostProxyKey),
    #[error("host cannot spawn {0:?} entities")]
    UnsupportedEntityKind(EntityKind),
    #[error("host proxy {0} is read-only")]
    ReadOnlyProxy(HostProxyKey),
    #[error("host rejected the request: {0}")]
    Rejected(String),
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum RegistryError {
    #[error("host proxy {0} is already bound")]
    DuplicateBinding(HostProxyKey),
    #[error("invalid shape: {0}")]
    InvalidShape(String),
    #[error("backend out of resources (limit {limit})")]
    BackendOutOfResources { limit: usize },
    #[error("backend rejected the body: {0}")]
    Backend(BackendError),
}

impl From<BackendError> for RegistryError {
    fn from(err: BackendError) -> Self {
        match err {
            BackendError::OutOfResources { limit } => RegistryError::BackendOutOfResources { limit },
            BackendError::InvalidShape(msg) => RegistryError::InvalidShape(msg),
            other => RegistryError::Backend(other),
        }
    }
}

/// No strategy matches the running host revision.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unsupported host version: {marker:?}")]
pub struct UnsupportedHostVersion {
    pub marker: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LoopError {
    #[error("capabilities have not been resolved")]
    NotInitialized,
    #[error("the sync loop is not running")]
    NotRunning,
    #[error("the sync loop is already running")]
    AlreadyRunning,
}

/// Everything the integration façade can return.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EngineError {
    #[error(transparent)]
    UnsupportedHostVersion(#[from] UnsupportedHostVersion),
    #[error(transparent)]
    Loop(#[from] LoopError),
    #[error(transparent)]
    Host(#[from] HostError),
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error("unknown handle {0}")]
    UnknownHandle(BodyId),
    #[error("{policy:?} is not supported for {key}")]
    UnsupportedPolicy {
        key: HostProxyKey,
        policy: SyncPolicy,
    },
    #[error("block {0} has no collision shape")]
    NoCollisionShape(HostProxyKey),
    /// Velocities and impulses only apply to bodies physics moves.
    #[error("{0} is not a dynamic body")]
    NotDynamic(BodyId),
    /// The engine was dropped before answering a remote request.
    #[error("engine is gone")]
    EngineGone,
}

impl EngineError {
    /// Shorthand used by callers and tests for the out-of-resources case.
    pub fn is_out_of_resources(&self) -> bool {
        matches!(
            self,
            EngineError::Registry(RegistryError::BackendOutOfResources { .. })
        )
    }
}

impl From<BackendError> for EngineError {
    fn from(err: BackendError) -> Self {
        EngineError::Registry(err.into())
    }
}

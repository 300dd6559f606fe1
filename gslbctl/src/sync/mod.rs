//! Notifying provider agents that desired state changed.
//!
//! Agents read the desired state from the API; the control plane only tells them *which* domains to
//! re-read. Notifications are best effort: storage is the source of truth and agents also run
//! periodic full resyncs, so a lost notification delays convergence but never loses state.
//!
//! The transport sits behind the [`SyncDispatcher`] trait. [`Notifier`] wraps a dispatcher with the
//! subject naming, payload format and timeout, and swallows (logs) every failure so that a mutation
//! which already committed is never reported as failed.

use crate::config::{DispatcherKind, SyncConfig};
use async_trait::async_trait;
use sqlx::PgPool;
use std::sync::Arc;

pub mod noop;
pub mod notifier;
pub mod pg_notify;

pub use notifier::{Notifier, SyncPayload};

/// Result type for dispatcher operations
pub type Result<T> = std::result::Result<T, DispatchError>;

/// Errors that can occur while handing a notification to the transport
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("Dispatcher did not answer within {0:?}")]
    Timeout(std::time::Duration),

    #[error("Failed to encode notification: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Transport for agent notifications.
#[async_trait]
pub trait SyncDispatcher: Send + Sync {
    /// Publish `payload` (a JSON document) on `subject`.
    async fn notify(&self, subject: &str, payload: &str) -> Result<()>;
}

/// Create the dispatcher selected in configuration.
pub fn create_dispatcher(config: &SyncConfig, pool: PgPool) -> Arc<dyn SyncDispatcher> {
    match config.dispatcher {
        DispatcherKind::PgNotify => Arc::new(pg_notify::PgNotifyDispatcher::new(pool)),
        DispatcherKind::Disabled => Arc::new(noop::NoopDispatcher),
    }
}

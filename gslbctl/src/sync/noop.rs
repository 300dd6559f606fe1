//! Dispatcher that drops every notification.

use async_trait::async_trait;

use crate::sync::{Result, SyncDispatcher};

/// Used when agents rely on their periodic full resync alone.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopDispatcher;

#[async_trait]
impl SyncDispatcher for NoopDispatcher {
    async fn notify(&self, subject: &str, _payload: &str) -> Result<()> {
        tracing::trace!(subject, "Dropping sync notification");
        Ok(())
    }
}

//! PostgreSQL `NOTIFY` transport.
//!
//! The subject is used verbatim as the channel name, so agents subscribe with
//! `LISTEN "gslb.sync"` (quoted, since the name contains a dot). Payloads are limited by PostgreSQL
//! to just under 8000 bytes; larger change sets are collapsed into a resync-all by [`Notifier`].
//!
//! [`Notifier`]: crate::sync::Notifier

use async_trait::async_trait;
use sqlx::PgPool;

use crate::sync::{Result, SyncDispatcher};

/// Largest payload PostgreSQL accepts for `NOTIFY`, with a little headroom.
pub const MAX_PAYLOAD_BYTES: usize = 7900;

#[derive(Debug, Clone)]
pub struct PgNotifyDispatcher {
    pool: PgPool,
}

impl PgNotifyDispatcher {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SyncDispatcher for PgNotifyDispatcher {
    async fn notify(&self, subject: &str, payload: &str) -> Result<()> {
        sqlx::query("SELECT pg_notify($1, $2)")
            .bind(subject)
            .bind(payload)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::postgres::PgListener;

    #[sqlx::test]
    #[test_log::test]
    async fn test_notification_reaches_listener(pool: PgPool) {
        let mut listener = PgListener::connect_with(&pool).await.unwrap();
        listener.listen("gslb.sync").await.unwrap();

        PgNotifyDispatcher::new(pool.clone())
            .notify("gslb.sync", r#"{"domain_ids":null}"#)
            .await
            .unwrap();

        let notification = tokio::time::timeout(std::time::Duration::from_secs(5), listener.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(notification.channel(), "gslb.sync");
        assert_eq!(notification.payload(), r#"{"domain_ids":null}"#);
    }
}

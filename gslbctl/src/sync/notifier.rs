use crate::config::SyncConfig;
use crate::sync::pg_notify::MAX_PAYLOAD_BYTES;
use crate::sync::{DispatchError, SyncDispatcher};
use crate::types::DomainId;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Body of a sync notification. `None` asks agents to re-read every domain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncPayload {
    pub domain_ids: Option<Vec<DomainId>>,
}

/// Sends sync notifications for committed changes.
#[derive(Clone)]
pub struct Notifier {
    dispatcher: Arc<dyn SyncDispatcher>,
    subject: String,
    timeout: Duration,
}

impl std::fmt::Debug for Notifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Notifier")
            .field("subject", &self.subject)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl Notifier {
    pub fn new(dispatcher: Arc<dyn SyncDispatcher>, config: &SyncConfig) -> Self {
        Self {
            dispatcher,
            subject: format!("{}.sync", config.subject_prefix),
            timeout: config.timeout,
        }
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }

    /// Tell agents to re-read the given domains. Nothing is sent for an empty set.
    pub async fn domains_changed(&self, domains: &[DomainId]) {
        if domains.is_empty() {
            return;
        }
        let mut domain_ids = domains.to_vec();
        domain_ids.sort();
        domain_ids.dedup();
        self.send(SyncPayload {
            domain_ids: Some(domain_ids),
        })
        .await;
    }

    /// Tell agents to re-read everything, for changes whose affected domains are not tracked.
    pub async fn resync_all(&self) {
        self.send(SyncPayload { domain_ids: None }).await;
    }

    async fn send(&self, payload: SyncPayload) {
        if let Err(e) = self.try_send(&payload).await {
            metrics::counter!("gslbctl_sync_notifications_failed_total").increment(1);
            warn!(subject = %self.subject, "Failed to notify agents: {}", e);
        }
    }

    async fn try_send(&self, payload: &SyncPayload) -> Result<(), DispatchError> {
        let mut body = serde_json::to_string(payload)?;
        if body.len() > MAX_PAYLOAD_BYTES {
            debug!(bytes = body.len(), "Sync payload too large, asking for a full resync instead");
            body = serde_json::to_string(&SyncPayload { domain_ids: None })?;
        }

        tokio::time::timeout(self.timeout, self.dispatcher.notify(&self.subject, &body))
            .await
            .map_err(|_| DispatchError::Timeout(self.timeout))??;
        metrics::counter!("gslbctl_sync_notifications_total").increment(1);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::Result;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use uuid::Uuid;

    #[derive(Default)]
    struct Recording {
        sent: Mutex<Vec<(String, String)>>,
    }

    #[async_trait]
    impl SyncDispatcher for Recording {
        async fn notify(&self, subject: &str, payload: &str) -> Result<()> {
            self.sent.lock().unwrap().push((subject.to_string(), payload.to_string()));
            Ok(())
        }
    }

    struct Stuck;

    #[async_trait]
    impl SyncDispatcher for Stuck {
        async fn notify(&self, _subject: &str, _payload: &str) -> Result<()> {
            std::future::pending::<()>().await;
            Ok(())
        }
    }

    fn config() -> SyncConfig {
        SyncConfig {
            subject_prefix: "gslb".to_string(),
            timeout: Duration::from_millis(50),
            ..Default::default()
        }
    }

    fn payloads(recording: &Recording) -> Vec<SyncPayload> {
        recording
            .sent
            .lock()
            .unwrap()
            .iter()
            .map(|(_, body)| serde_json::from_str(body).unwrap())
            .collect()
    }

    #[tokio::test]
    async fn test_domains_changed_dedups_and_uses_sync_subject() {
        let recording = Arc::new(Recording::default());
        let notifier = Notifier::new(recording.clone(), &config());
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();

        notifier.domains_changed(&[b, a, b]).await;

        let sent = recording.sent.lock().unwrap().clone();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, "gslb.sync");

        let mut expected = vec![a, b];
        expected.sort();
        assert_eq!(payloads(&recording), vec![SyncPayload { domain_ids: Some(expected) }]);
    }

    #[tokio::test]
    async fn test_empty_change_sends_nothing() {
        let recording = Arc::new(Recording::default());
        let notifier = Notifier::new(recording.clone(), &config());

        notifier.domains_changed(&[]).await;
        assert!(recording.sent.lock().unwrap().is_empty());

        notifier.resync_all().await;
        assert_eq!(payloads(&recording), vec![SyncPayload { domain_ids: None }]);
        assert_eq!(recording.sent.lock().unwrap()[0].1, r#"{"domain_ids":null}"#);
    }

    #[tokio::test]
    async fn test_oversized_change_becomes_resync_all() {
        let recording = Arc::new(Recording::default());
        let notifier = Notifier::new(recording.clone(), &config());
        let many: Vec<Uuid> = (0..500).map(|_| Uuid::new_v4()).collect();

        notifier.domains_changed(&many).await;
        assert_eq!(payloads(&recording), vec![SyncPayload { domain_ids: None }]);
    }

    #[tokio::test]
    async fn test_stuck_dispatcher_times_out_without_error() {
        let notifier = Notifier::new(Arc::new(Stuck), &config());
        let started = std::time::Instant::now();

        notifier.domains_changed(&[Uuid::new_v4()]).await;
        assert!(started.elapsed() < Duration::from_secs(5));
    }
}

use crate::AppState;
use crate::api::models::sync::{SyncAccepted, SyncRequest};
use axum::{Json, extract::State, http::StatusCode};

#[utoipa::path(
    post,
    path = "/sync",
    tag = "sync",
    summary = "Trigger agent resync",
    description = "Asks the agents to re-read the given domains, or everything when no domains are listed.",
    request_body = SyncRequest,
    responses((status = 202, description = "Notification handed to the dispatcher", body = SyncAccepted))
)]
#[tracing::instrument(skip_all)]
pub async fn trigger_sync(State(state): State<AppState>, Json(body): Json<SyncRequest>) -> (StatusCode, Json<SyncAccepted>) {
    match &body.domains {
        Some(domains) => state.notifier.domains_changed(domains).await,
        None => state.notifier.resync_all().await,
    }

    (
        StatusCode::ACCEPTED,
        Json(SyncAccepted {
            subject: state.notifier.subject().to_string(),
            domains: body.domains,
        }),
    )
}

#[cfg(test)]
mod tests {
    use crate::api::models::sync::SyncAccepted;
    use crate::test_utils::create_test_app;
    use axum::http::StatusCode;
    use serde_json::json;
    use sqlx::PgPool;

    #[sqlx::test]
    #[test_log::test]
    async fn test_sync_is_accepted(pool: PgPool) {
        let (app, _bg) = create_test_app(pool.clone()).await;

        let response = app.post("/sync").json(&json!({})).await;
        response.assert_status(StatusCode::ACCEPTED);
        let accepted: SyncAccepted = response.json();
        assert_eq!(accepted.subject, "gslb.sync");
        assert!(accepted.domains.is_none());

        app.post("/sync")
            .json(&json!({"domains": [uuid::Uuid::new_v4()]}))
            .await
            .assert_status(StatusCode::ACCEPTED);
    }
}

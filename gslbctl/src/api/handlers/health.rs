use crate::AppState;
use crate::errors::{Error, Result};
use axum::{Json, extract::State};
use serde::Serialize;
use utoipa::ToSchema;

#[derive(Debug, Serialize, ToSchema)]
pub struct Health {
    pub status: &'static str,
}

#[utoipa::path(
    get,
    path = "/healthz",
    tag = "health",
    summary = "Liveness and database reachability",
    responses(
        (status = 200, description = "Service and database are up", body = Health),
        (status = 500, description = "Database unreachable"),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn healthz(State(state): State<AppState>) -> Result<Json<Health>> {
    sqlx::query("SELECT 1")
        .execute(&state.db)
        .await
        .map_err(|e| Error::Database(e.into()))?;
    Ok(Json(Health { status: "ok" }))
}

//! Request extractors shared by the handlers.

use crate::errors::{Error, Result};
use crate::types::{ProjectId, Tenant};
use crate::AppState;
use axum::extract::{FromRequestParts, OriginalUri};
use axum::http::{header, request::Parts};
use tracing::instrument;
use url::Url;

/// Header the authentication layer in front of the API sets to the caller's project.
pub const PROJECT_HEADER: &str = "x-project-id";

/// The project a request acts on behalf of.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Project(pub ProjectId);

impl Project {
    pub fn tenant(&self) -> Tenant {
        Tenant::Project(self.0.clone())
    }

    pub fn id(&self) -> &str {
        &self.0
    }
}

/// Read the project from request headers, if present and non-empty.
pub fn project_from_parts(parts: &Parts) -> Option<Project> {
    parts
        .headers
        .get(PROJECT_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(|value| Project(value.to_string()))
}

impl<S: Send + Sync> FromRequestParts<S> for Project {
    type Rejection = Error;

    #[instrument(skip_all)]
    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self> {
        project_from_parts(parts).ok_or_else(|| Error::Unauthenticated {
            message: Some("Missing X-Project-Id header".to_string()),
        })
    }
}

/// Absolute URL of the current request, used as the base of pagination links.
///
/// Built from `api.base_url` when configured, otherwise from the `Host` header.
#[derive(Debug, Clone)]
pub struct RequestUrl(pub Url);

impl FromRequestParts<AppState> for RequestUrl {
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self> {
        let uri = parts
            .extensions
            .get::<OriginalUri>()
            .map(|original| original.0.clone())
            .unwrap_or_else(|| parts.uri.clone());
        let path_and_query = uri.path_and_query().map(|pq| pq.as_str()).unwrap_or("/");

        let base = match &state.config.api.base_url {
            Some(base) => base.clone(),
            None => {
                let host = parts
                    .headers
                    .get(header::HOST)
                    .and_then(|value| value.to_str().ok())
                    .unwrap_or("localhost");
                Url::parse(&format!("http://{host}")).map_err(|e| Error::BadRequest {
                    message: format!("Invalid Host header: {e}"),
                })?
            }
        };

        let url = base.join(path_and_query.trim_start_matches('/')).map_err(|e| Error::BadRequest {
            message: format!("Invalid request URL: {e}"),
        })?;
        Ok(RequestUrl(url))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    fn parts(header_value: Option<&str>) -> Parts {
        let mut builder = Request::builder().uri("/pools");
        if let Some(value) = header_value {
            builder = builder.header("X-Project-Id", value);
        }
        builder.body(()).unwrap().into_parts().0
    }

    #[test]
    fn test_project_header_is_required_and_trimmed() {
        assert_eq!(project_from_parts(&parts(Some(" project-a "))), Some(Project("project-a".to_string())));
        assert_eq!(project_from_parts(&parts(Some("  "))), None);
        assert_eq!(project_from_parts(&parts(None)), None);
    }
}

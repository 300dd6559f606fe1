//! API layer for HTTP request handling and data models.
//!
//! - **[`handlers`]**: Axum route handlers for all endpoints
//! - **[`models`]**: Request/response bodies
//! - **[`extractors`]**: Project identity and request URL extraction
//!
//! # API Structure
//!
//! - **Desired state** (`/domains`, `/pools`, `/pools/{pool_id}/members`, `/monitors`,
//!   `/datacenters`, `/geomaps`): CRUD scoped to the caller's project (`X-Project-Id`)
//! - **Quotas** (`/quotas`): operator administration of per-project ceilings
//! - **Sync** (`/sync`): operator triggered agent resyncs
//! - **Agent** (`/agent/*`): provisioning reports and the cross-project domain feed
//!
//! All endpoints are documented with OpenAPI annotations using `utoipa`; the document is served at
//! `/api-docs/openapi.json`.

pub mod extractors;
pub mod handlers;
pub mod models;

//! Repository implementations for database access.
//!
//! Each repository wraps a connection (normally the connection of an open transaction), is scoped
//! to a [`Tenant`], and implements the [`Repository`] trait where the entity has the usual
//! create/read/update/delete surface.
//!
//! # Available Repositories
//!
//! - [`Domains`]: domains and their pool attachments
//! - [`Pools`]: pools, guarded against mutation while attached domains are syncing
//! - [`Members`]: pool members, keyed by `(pool_id, member_id)`
//! - [`Monitors`]: health monitors, at most one per pool
//! - [`Datacenters`]: datacenters, shareable across projects when public
//! - [`GeoMaps`]: geographic maps and their country assignments
//! - [`Quotas`]: per-project ceilings and live usage
//! - [`Provisioning`]: agent status reports
//!
//! # Lifecycle
//!
//! Writes go through the state machine in [`crate::lifecycle::state`] and apply the cascade from
//! [`crate::lifecycle::cascade`] on the same connection:
//!
//! ```ignore
//! let written = state
//!     .transaction(|conn| {
//!         let request = request.clone();
//!         let tenant = tenant.clone();
//!         Box::pin(async move { Ok(Members::new(conn, tenant).create(&request).await?) })
//!     })
//!     .await?;
//! state.notifier.domains_changed(&written.domains).await;
//! ```

pub mod datacenters;
pub mod domains;
pub mod geomaps;
pub mod members;
pub mod monitors;
pub mod pools;
pub mod provisioning;
pub mod quotas;
pub mod repository;

pub use datacenters::Datacenters;
pub use domains::Domains;
pub use geomaps::GeoMaps;
pub use members::Members;
pub use monitors::Monitors;
pub use pools::Pools;
pub use provisioning::Provisioning;
pub use quotas::Quotas;
pub use repository::{Repository, Written};

use crate::pagination::Filter;
use crate::types::Tenant;

/// List filter confining a query to the rows a tenant owns.
pub(crate) fn owned_by(tenant: &Tenant) -> Option<Filter> {
    match tenant {
        Tenant::Project(project) => Some(Filter::Project(project.clone())),
        Tenant::Any => None,
    }
}

/// List filter for shareable kinds: owned rows plus public ones.
pub(crate) fn visible_to(tenant: &Tenant) -> Option<Filter> {
    match tenant {
        Tenant::Project(project) => Some(Filter::ProjectOrPublic(project.clone())),
        Tenant::Any => None,
    }
}

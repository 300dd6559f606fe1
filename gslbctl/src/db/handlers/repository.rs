//! Base repository trait for database operations.

use crate::db::errors::Result;
use crate::pagination::Page;
use crate::types::DomainId;

/// Outcome of a write: the stored entity plus the domains whose desired state it changed.
///
/// Callers hand `domains` to the sync notifier once the transaction has committed.
#[derive(Debug, Clone)]
pub struct Written<T> {
    pub entity: T,
    pub domains: Vec<DomainId>,
}

impl<T> Written<T> {
    pub fn new(entity: T, domains: Vec<DomainId>) -> Self {
        Self { entity, domains }
    }
}

/// Contains the Repository trait.
///
/// A repository is a data access layer over one entity table. Besides plain reads it owns the
/// lifecycle of its rows: writes set the row's provisioning status and cascade `PENDING_UPDATE` to
/// ancestors on the same connection. Repositories that write are therefore always created from a
/// transaction, so the row change and its cascade commit together.
#[async_trait::async_trait]
pub trait Repository {
    /// The request type for creating entities
    type CreateRequest;

    /// The request type for updating entities
    type UpdateRequest;

    /// The response/DTO type returned by operations
    type Response;

    /// The identifier type for lookups
    type Id: Send + Sync;

    /// The filter type for list operations
    type Filter: Send + Sync;

    /// Create a new entity in its initial provisioning status
    async fn create(&mut self, request: &Self::CreateRequest) -> Result<Written<Self::Response>>;

    /// Get an entity by ID. Rows already confirmed deleted are not returned.
    async fn get_by_id(&mut self, id: Self::Id) -> Result<Option<Self::Response>>;

    /// List one page of entities
    async fn list(&mut self, filter: &Self::Filter) -> Result<Page<Self::Response>>;

    /// Update an entity by ID, moving it to `PENDING_UPDATE`
    async fn update(&mut self, id: Self::Id, request: &Self::UpdateRequest) -> Result<Written<Self::Response>>;

    /// Delete an entity by ID: a soft delete into `PENDING_DELETE`, or a hard delete for kinds that
    /// no agent needs to confirm. Returns the row as left behind, if any.
    async fn delete(&mut self, id: Self::Id) -> Result<Written<Option<Self::Response>>>;
}

//! Resource lifecycle: the provisioning state machine and the cascade that keeps ancestors in sync.
//!
//! - [`state`]: statuses, entity kinds and the legal transitions between statuses
//! - [`cascade`]: which ancestors a change touches, and applying that inside a transaction

pub mod cascade;
pub mod state;

pub use cascade::{CascadePlan, CascadeUpdater, Change};
pub use state::{AgentOutcome, EntityKind, ProvisioningStatus, Transition};

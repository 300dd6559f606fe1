//! Provisioning state machine.
//!
//! Every entity row records whether an external agent has applied the latest desired state. User
//! mutations push rows into a `PENDING_*` state; agents report back success or failure, which moves
//! them to `ACTIVE`, `ERROR` or out of the table entirely.
//!
//! ```text
//!   create ──► PENDING_CREATE ──ok──► ACTIVE ◄──ok── PENDING_UPDATE ◄── update (any non-deleting state)
//!                  │                                     │
//!                  └──────────────fail──► ERROR ◄──fail──┘
//!
//!   delete ──► PENDING_DELETE ──ok──► removed | DELETED (domains, garbage collected later)
//! ```
//!
//! There is no `ERROR -> ACTIVE` edge: a failed entity stays failed until a user mutation retries it.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use utoipa::ToSchema;

/// Lifecycle state of an entity with respect to the provider agents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProvisioningStatus {
    PendingCreate,
    PendingUpdate,
    PendingDelete,
    Active,
    Error,
    /// Soft-deleted marker left behind once an agent confirmed a domain removal.
    Deleted,
}

impl ProvisioningStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProvisioningStatus::PendingCreate => "PENDING_CREATE",
            ProvisioningStatus::PendingUpdate => "PENDING_UPDATE",
            ProvisioningStatus::PendingDelete => "PENDING_DELETE",
            ProvisioningStatus::Active => "ACTIVE",
            ProvisioningStatus::Error => "ERROR",
            ProvisioningStatus::Deleted => "DELETED",
        }
    }

    #[inline]
    pub fn is_pending(&self) -> bool {
        matches!(
            self,
            ProvisioningStatus::PendingCreate | ProvisioningStatus::PendingUpdate | ProvisioningStatus::PendingDelete
        )
    }

    /// Whether the row is on its way out (or already gone from the user's point of view).
    #[inline]
    pub fn is_deleting(&self) -> bool {
        matches!(self, ProvisioningStatus::PendingDelete | ProvisioningStatus::Deleted)
    }
}

impl fmt::Display for ProvisioningStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProvisioningStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "PENDING_CREATE" => ProvisioningStatus::PendingCreate,
            "PENDING_UPDATE" => ProvisioningStatus::PendingUpdate,
            "PENDING_DELETE" => ProvisioningStatus::PendingDelete,
            "ACTIVE" => ProvisioningStatus::Active,
            "ERROR" => ProvisioningStatus::Error,
            "DELETED" => ProvisioningStatus::Deleted,
            other => anyhow::bail!("unknown provisioning status '{other}'"),
        })
    }
}

/// The entity kinds that carry a provisioning status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EntityKind {
    Domain,
    Pool,
    Member,
    Monitor,
    Datacenter,
    #[serde(rename = "GEOGRAPHIC_MAP")]
    GeoMap,
}

/// How a user delete request is carried out for an entity kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteStrategy {
    /// Move to `PENDING_DELETE` and wait for an agent.
    Soft,
    /// Remove the row inside the request transaction.
    Hard,
}

/// What happens to a `PENDING_DELETE` row once an agent confirms the removal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfirmedDelete {
    /// Remove the row right away.
    Remove,
    /// Keep a `DELETED` marker which the housekeeper garbage-collects after the retention window.
    MarkDeleted,
}

impl EntityKind {
    /// Table holding rows of this kind.
    pub fn table(&self) -> &'static str {
        match self {
            EntityKind::Domain => "domain",
            EntityKind::Pool => "pool",
            EntityKind::Member => "member",
            EntityKind::Monitor => "monitor",
            EntityKind::Datacenter => "datacenter",
            EntityKind::GeoMap => "geographic_map",
        }
    }

    /// Human readable name used in error messages.
    pub fn display_name(&self) -> &'static str {
        match self {
            EntityKind::Domain => "Domain",
            EntityKind::Pool => "Pool",
            EntityKind::Member => "Member",
            EntityKind::Monitor => "Monitor",
            EntityKind::Datacenter => "Datacenter",
            EntityKind::GeoMap => "Geographic map",
        }
    }

    /// Status a freshly inserted row starts in. Every kind is programmed by an agent, so none skip
    /// straight to `ACTIVE`.
    pub fn initial_status(&self) -> ProvisioningStatus {
        ProvisioningStatus::PendingCreate
    }

    pub fn delete_strategy(&self) -> DeleteStrategy {
        match self {
            // Pools can only be deleted once detached from every domain, at which point no agent
            // holds them any more and nobody would confirm a soft delete.
            EntityKind::Pool => DeleteStrategy::Hard,
            _ => DeleteStrategy::Soft,
        }
    }

    pub fn confirmed_delete(&self) -> ConfirmedDelete {
        match self {
            EntityKind::Domain => ConfirmedDelete::MarkDeleted,
            _ => ConfirmedDelete::Remove,
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

/// Result an agent reports after attempting to apply an entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AgentOutcome {
    Success,
    Failure,
}

/// Effect of a transition on the stored row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Store the given status.
    Set(ProvisioningStatus),
    /// Hard delete the row.
    Remove,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{kind} in state {from} cannot {attempted}")]
pub struct IllegalTransition {
    pub kind: EntityKind,
    pub from: ProvisioningStatus,
    pub attempted: &'static str,
}

/// Status a row moves to when a user updates it.
pub fn on_user_update(kind: EntityKind, current: ProvisioningStatus) -> Result<ProvisioningStatus, IllegalTransition> {
    if current.is_deleting() {
        return Err(IllegalTransition {
            kind,
            from: current,
            attempted: "be updated",
        });
    }
    Ok(ProvisioningStatus::PendingUpdate)
}

/// Transition a row takes when a user deletes it.
pub fn on_user_delete(kind: EntityKind, current: ProvisioningStatus) -> Result<Transition, IllegalTransition> {
    if current.is_deleting() {
        return Err(IllegalTransition {
            kind,
            from: current,
            attempted: "be deleted again",
        });
    }
    Ok(match kind.delete_strategy() {
        DeleteStrategy::Soft => Transition::Set(ProvisioningStatus::PendingDelete),
        DeleteStrategy::Hard => Transition::Remove,
    })
}

/// Transition a row takes when an agent reports back.
///
/// Only pending rows accept reports; anything else means the agent worked from stale state, and
/// in particular an `ERROR` row can never be flipped back to `ACTIVE` by an agent.
pub fn apply_agent_report(
    kind: EntityKind,
    current: ProvisioningStatus,
    outcome: AgentOutcome,
) -> Result<Transition, IllegalTransition> {
    if !current.is_pending() {
        return Err(IllegalTransition {
            kind,
            from: current,
            attempted: "accept an agent report",
        });
    }

    Ok(match (current, outcome) {
        (ProvisioningStatus::PendingDelete, AgentOutcome::Success) => match kind.confirmed_delete() {
            ConfirmedDelete::Remove => Transition::Remove,
            ConfirmedDelete::MarkDeleted => Transition::Set(ProvisioningStatus::Deleted),
        },
        (_, AgentOutcome::Success) => Transition::Set(ProvisioningStatus::Active),
        (_, AgentOutcome::Failure) => Transition::Set(ProvisioningStatus::Error),
    })
}

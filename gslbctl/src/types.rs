//! Common type definitions shared by the database, engine and API layers.
//!
//! # ID Types
//!
//! All entity IDs are UUIDs wrapped in type aliases:
//!
//! - [`DomainId`], [`PoolId`], [`MemberId`], [`MonitorId`], [`DatacenterId`], [`GeoMapId`]
//!
//! Projects are identified by an opaque string handed to us by the authentication layer.
//!
//! # Utility Functions
//!
//! - [`abbrev_uuid`]: Abbreviate UUIDs to first 8 chars for logging

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use utoipa::ToSchema;
use uuid::Uuid;

// Type aliases for IDs
pub type DomainId = Uuid;
pub type PoolId = Uuid;
pub type MemberId = Uuid;
pub type MonitorId = Uuid;
pub type DatacenterId = Uuid;
pub type GeoMapId = Uuid;
pub type ProjectId = String;

/// Abbreviate a UUID to its first 8 characters for more readable logs and traces
/// Example: "550e8400-e29b-41d4-a716-446655440000" -> "550e8400"
pub fn abbrev_uuid(uuid: &Uuid) -> String {
    uuid.to_string().chars().take(8).collect()
}

/// Which rows a repository operates on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Tenant {
    /// Rows owned by the project; shareable kinds also expose `public` rows for reading
    Project(ProjectId),
    /// Every row, for agents and background tasks
    Any,
}

impl Tenant {
    /// The project to filter on, or `None` when unscoped. Bound as a nullable query parameter.
    pub fn project(&self) -> Option<&str> {
        match self {
            Tenant::Project(project) => Some(project.as_str()),
            Tenant::Any => None,
        }
    }
}

/// GSLB provider that programs a domain (and the datacenters/geomaps it references).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Akamai,
    F5,
}

impl Provider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Akamai => "akamai",
            Provider::F5 => "f5",
        }
    }

    /// Whether the provider pins a domain's FQDN once it has been programmed.
    pub fn fqdn_immutable_once_provisioned(&self) -> bool {
        matches!(self, Provider::Akamai)
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Provider {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "akamai" => Ok(Provider::Akamai),
            "f5" => Ok(Provider::F5),
            other => anyhow::bail!("unknown provider '{other}'"),
        }
    }
}

/// Visibility of datacenters and geographic maps.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    Public,
    #[default]
    Private,
}

impl Scope {
    pub fn as_str(&self) -> &'static str {
        match self {
            Scope::Public => "public",
            Scope::Private => "private",
        }
    }
}

impl FromStr for Scope {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "public" => Ok(Scope::Public),
            "private" => Ok(Scope::Private),
            other => anyhow::bail!("unknown scope '{other}'"),
        }
    }
}

/// Declares a text-backed enum with `as_str`, `Display` and `FromStr` matching its database values.
macro_rules! text_enum {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $text:literal),+ $(,)? } default $default:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
        pub enum $name {
            $(
                #[serde(rename = $text)]
                $variant,
            )+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text,)+
                }
            }
        }

        impl Default for $name {
            fn default() -> Self {
                $name::$default
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = anyhow::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok($name::$variant),)+
                    other => anyhow::bail!("unknown {} '{}'", stringify!($name), other),
                }
            }
        }
    };
}

text_enum! {
    /// DNS record type served for a domain.
    RecordType { A => "A", Aaaa => "AAAA", Cname => "CNAME", Mx => "MX" } default A
}

text_enum! {
    /// Load-balancing mode of a domain.
    DomainMode {
        RoundRobin => "ROUND_ROBIN",
        Weighted => "WEIGHTED",
        Geographic => "GEOGRAPHIC",
        Availability => "AVAILABILITY",
    } default RoundRobin
}

text_enum! {
    /// Health check protocol of a monitor.
    MonitorType { Http => "HTTP", Https => "HTTPS", Icmp => "ICMP", Tcp => "TCP", Udp => "UDP" } default Icmp
}

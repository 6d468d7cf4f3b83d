//! Roles of participants in a test topology.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Function of a host within a test topology.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Drives the benchmark and determines its duration.
    Client,
    /// Accepts the connection of the client or the last intermediate.
    Server,
    /// Relays or forwards traffic towards the server.
    Intermediate,
}

impl Role {
    /// All roles in startup order.
    pub const ALL: [Role; 3] = [Role::Server, Role::Intermediate, Role::Client];

    /// Lowercase name of the role.
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Client => "client",
            Role::Server => "server",
            Role::Intermediate => "intermediate",
        }
    }

    /// Whether this role connects to a downstream target.
    pub fn needs_target(self) -> bool {
        matches!(self, Role::Client | Role::Intermediate)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Invalid role name.
#[derive(Debug, Clone, Error)]
#[error("invalid role {0:?}, must be `client`, `server`, or `intermediate`")]
pub struct ParseRoleError(String);

impl FromStr for Role {
    type Err = ParseRoleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "client" => Ok(Role::Client),
            "server" => Ok(Role::Server),
            "intermediate" => Ok(Role::Intermediate),
            _ => Err(ParseRoleError(s.to_owned())),
        }
    }
}

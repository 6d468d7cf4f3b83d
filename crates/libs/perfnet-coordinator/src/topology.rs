//! Test topologies and the chain of hosts they form.

use std::fmt;

use perfnet_params::Role;
use serde::Serialize;

use crate::config::TestScenario;
use crate::error::{ConfigError, ConfigResult};

/// Shape of a test, determined by the intermediates it names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Topology {
    /// Client talks to the server directly.
    TwoNode,
    /// Client, one intermediate, server.
    ThreeNode,
    /// Client, intermediate 1, intermediate 2, server.
    FourNode,
}

impl Topology {
    /// Determine the topology of the given test.
    pub fn classify(scenario: &TestScenario) -> ConfigResult<Self> {
        let invalid = |reason| ConfigError::Topology {
            test: scenario.name.clone(),
            reason,
        };
        match (
            scenario.intermediate(),
            scenario.intermediate1(),
            scenario.intermediate2(),
        ) {
            (None, None, None) => Ok(Self::TwoNode),
            (Some(_), None, None) => Ok(Self::ThreeNode),
            (None, Some(_), Some(_)) => Ok(Self::FourNode),
            (None, _, _) => Err(invalid(
                "`intermediate1` and `intermediate2` must be set together",
            )),
            (Some(_), _, _) => Err(invalid(
                "`intermediate` cannot be combined with `intermediate1` and `intermediate2`",
            )),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::TwoNode => "two-node",
            Self::ThreeNode => "three-node",
            Self::FourNode => "four-node",
        }
    }
}

impl fmt::Display for Topology {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Position of a host within a test.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RoleSlot {
    Client,
    Server,
    Intermediate,
    Intermediate1,
    Intermediate2,
}

impl RoleSlot {
    /// Role played by the host in this slot.
    pub fn role(self) -> Role {
        match self {
            Self::Client => Role::Client,
            Self::Server => Role::Server,
            Self::Intermediate | Self::Intermediate1 | Self::Intermediate2 => Role::Intermediate,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Client => "client",
            Self::Server => "server",
            Self::Intermediate => "intermediate",
            Self::Intermediate1 => "intermediate1",
            Self::Intermediate2 => "intermediate2",
        }
    }
}

impl fmt::Display for RoleSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Host occupying a slot of a test.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Hop<'s> {
    pub slot: RoleSlot,
    /// Identifier of the host in the `hosts` table.
    pub host: &'s str,
}

/// Hosts of a test in startup order.
///
/// The server comes first and the client last. Every hop forwards to, or connects to,
/// the hop preceding it.
pub fn startup_order(scenario: &TestScenario) -> ConfigResult<Vec<Hop<'_>>> {
    let hop = |slot, host| Hop { slot, host };
    let mut hops = vec![hop(RoleSlot::Server, scenario.server.as_str())];
    match Topology::classify(scenario)? {
        Topology::TwoNode => {}
        Topology::ThreeNode => {
            hops.extend(scenario.intermediate().map(|h| hop(RoleSlot::Intermediate, h)));
        }
        Topology::FourNode => {
            hops.extend(scenario.intermediate2().map(|h| hop(RoleSlot::Intermediate2, h)));
            hops.extend(scenario.intermediate1().map(|h| hop(RoleSlot::Intermediate1, h)));
        }
    }
    hops.push(hop(RoleSlot::Client, scenario.client.as_str()));
    Ok(hops)
}

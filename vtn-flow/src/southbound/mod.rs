//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

pub mod memory;

use std::sync::Arc;
use std::time::Duration;

use tracing::warn;
use vtn_utils::cluster::ClusterNodeId;
use vtn_utils::flow::{FlowEntry, SwitchId};

/// Service that programs flow entries into the switches.
///
/// Calls may block; implementations must give up once `timeout` elapses and
/// report [`SouthboundError::Timeout`].
pub trait FlowProgrammer: Send + Sync {
    fn install_entry(
        &self,
        entry: &FlowEntry,
        timeout: Duration,
    ) -> Result<(), SouthboundError>;

    fn uninstall_entry(
        &self,
        entry: &FlowEntry,
        timeout: Duration,
    ) -> Result<(), SouthboundError>;
}

/// Oracle reporting which cluster node owns the connection to a switch.
pub trait ClusterTopology: Send + Sync {
    fn local_node(&self) -> ClusterNodeId;

    fn locality(&self, switch: SwitchId) -> SwitchLocality;

    // Number of other controller instances in the cluster.
    fn remote_nodes(&self) -> usize;
}

/// Handles to the southbound services, shared by all flow tasks.
#[derive(Clone)]
pub struct Southbound {
    pub programmer: Arc<dyn FlowProgrammer>,
    pub topology: Arc<dyn ClusterTopology>,
    // Time given to the switch to program a single flow entry.
    pub timeout: Duration,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SwitchLocality {
    Local,
    Remote,
    Disconnected,
}

// Flow programming errors.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum SouthboundError {
    // An identical entry is already installed.
    Conflict,
    NotFound,
    Timeout,
    Backend(String),
}

// ===== impl Southbound =====

impl Southbound {
    pub fn new(
        programmer: Arc<dyn FlowProgrammer>,
        topology: Arc<dyn ClusterTopology>,
        timeout: Duration,
    ) -> Southbound {
        Southbound {
            programmer,
            topology,
            timeout,
        }
    }

    pub fn locality(&self, switch: SwitchId) -> SwitchLocality {
        self.topology.locality(switch)
    }
}

impl std::fmt::Debug for Southbound {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Southbound")
            .field("local_node", &self.topology.local_node())
            .field("timeout", &self.timeout)
            .finish()
    }
}

// ===== impl SouthboundError =====

impl SouthboundError {
    pub(crate) fn log(&self, entry: &FlowEntry) {
        warn!(name = %entry.name, switch = %entry.switch, "{}", self);
    }
}

impl std::fmt::Display for SouthboundError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SouthboundError::Conflict => {
                write!(f, "flow entry already exists")
            }
            SouthboundError::NotFound => {
                write!(f, "flow entry not found")
            }
            SouthboundError::Timeout => {
                write!(f, "flow programming timed out")
            }
            SouthboundError::Backend(error) => {
                write!(f, "flow programming failed: {error}")
            }
        }
    }
}

impl std::error::Error for SouthboundError {}

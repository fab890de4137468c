//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::collections::{BTreeMap, btree_map};
use std::sync::Mutex;
use std::thread;
use std::time::Duration;

use tracing::debug;
use vtn_utils::cluster::ClusterNodeId;
use vtn_utils::flow::{FlowEntry, FlowKey, SwitchId};

use crate::southbound::{
    ClusterTopology, FlowProgrammer, SouthboundError, SwitchLocality,
};

/// In-memory flow table shared by all the switches of a node.
///
/// A programming delay and a backend error can be injected to emulate slow
/// or failing switches.
#[derive(Debug, Default)]
pub struct MemoryFlowTable {
    entries: Mutex<BTreeMap<FlowKey, FlowEntry>>,
    delay: Mutex<Duration>,
    failure: Mutex<Option<String>>,
}

/// Cluster topology with statically assigned switch owners.
#[derive(Debug)]
pub struct StaticTopology {
    local_node: ClusterNodeId,
    remote_nodes: usize,
    owners: Mutex<BTreeMap<SwitchId, ClusterNodeId>>,
}

// ===== impl MemoryFlowTable =====

impl MemoryFlowTable {
    pub fn new() -> MemoryFlowTable {
        Default::default()
    }

    /// Sets the time every programming call takes to complete.
    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = delay;
    }

    /// Makes every programming call fail with the given backend error.
    pub fn set_failure(&self, failure: Option<String>) {
        *self.failure.lock().unwrap() = failure;
    }

    pub fn contains(&self, entry: &FlowEntry) -> bool {
        self.entries.lock().unwrap().contains_key(&entry.key())
    }

    pub fn entries(&self, switch: SwitchId) -> Vec<FlowEntry> {
        self.entries
            .lock()
            .unwrap()
            .values()
            .filter(|entry| entry.switch == switch)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().unwrap().is_empty()
    }

    // Emulates the switch round trip.
    fn program(&self, timeout: Duration) -> Result<(), SouthboundError> {
        let delay = *self.delay.lock().unwrap();
        if delay > timeout {
            thread::sleep(timeout);
            return Err(SouthboundError::Timeout);
        }
        if !delay.is_zero() {
            thread::sleep(delay);
        }

        match self.failure.lock().unwrap().as_ref() {
            Some(failure) => Err(SouthboundError::Backend(failure.clone())),
            None => Ok(()),
        }
    }
}

impl FlowProgrammer for MemoryFlowTable {
    fn install_entry(
        &self,
        entry: &FlowEntry,
        timeout: Duration,
    ) -> Result<(), SouthboundError> {
        self.program(timeout)?;

        match self.entries.lock().unwrap().entry(entry.key()) {
            btree_map::Entry::Vacant(v) => {
                debug!(name = %entry.name, switch = %entry.switch, "flow entry installed");
                v.insert(entry.clone());
                Ok(())
            }
            btree_map::Entry::Occupied(_) => Err(SouthboundError::Conflict),
        }
    }

    fn uninstall_entry(
        &self,
        entry: &FlowEntry,
        timeout: Duration,
    ) -> Result<(), SouthboundError> {
        self.program(timeout)?;

        match self.entries.lock().unwrap().remove(&entry.key()) {
            Some(_) => {
                debug!(name = %entry.name, switch = %entry.switch, "flow entry uninstalled");
                Ok(())
            }
            None => Err(SouthboundError::NotFound),
        }
    }
}

// ===== impl StaticTopology =====

impl StaticTopology {
    pub fn new(local_node: ClusterNodeId, remote_nodes: usize) -> StaticTopology {
        StaticTopology {
            local_node,
            remote_nodes,
            owners: Default::default(),
        }
    }

    /// Records the node holding the connection to the given switch.
    pub fn set_owner(&self, switch: SwitchId, node: ClusterNodeId) {
        self.owners.lock().unwrap().insert(switch, node);
    }

    pub fn remove_switch(&self, switch: SwitchId) {
        self.owners.lock().unwrap().remove(&switch);
    }
}

impl ClusterTopology for StaticTopology {
    fn local_node(&self) -> ClusterNodeId {
        self.local_node
    }

    fn locality(&self, switch: SwitchId) -> SwitchLocality {
        match self.owners.lock().unwrap().get(&switch) {
            Some(owner) if *owner == self.local_node => SwitchLocality::Local,
            Some(_) => SwitchLocality::Remote,
            None => SwitchLocality::Disconnected,
        }
    }

    fn remote_nodes(&self) -> usize {
        self.remote_nodes
    }
}

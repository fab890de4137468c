//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use vtn_utils::action::ActionList;
use vtn_utils::flow::{FlowEntry, FlowKey, FlowMatch, SwitchId, SwitchPort};

use crate::error::Error;

/// Identifier of a flow within its tenant.
pub type FlowId = u64;

/// Network resource a flow relies on. Flows are uninstalled in bulk when a
/// resource they depend on goes away.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[derive(Deserialize, Serialize)]
pub enum FlowDependency {
    Switch(SwitchId),
    SwitchPort(SwitchPort),
    // Virtual node path, e.g. "vtn1/vbr1".
    VirtualNode(String),
}

/// A logical flow: the ordered set of flow entries forwarding one packet
/// stream across the physical network.
///
/// The first entry is the ingress entry, which matches the packets entering
/// the virtual network.
#[derive(Clone, Debug)]
pub struct VtnFlow {
    tenant: String,
    id: FlowId,
    entries: Vec<FlowEntry>,
    dependencies: BTreeSet<FlowDependency>,
    idle_timeout: u16,
    hard_timeout: u16,
    created: DateTime<Utc>,
}

/// Per-tenant table of the installed logical flows.
#[derive(Debug)]
pub struct FlowDatabase {
    tenant: String,
    next_id: AtomicU64,
    state: Mutex<FlowDbState>,
}

#[derive(Debug, Default)]
struct FlowDbState {
    flows: BTreeMap<FlowId, VtnFlow>,
    // Ingress entries of the stored flows.
    ingress: BTreeMap<FlowKey, FlowId>,
}

// ===== impl VtnFlow =====

impl VtnFlow {
    fn new(tenant: &str, id: FlowId) -> VtnFlow {
        VtnFlow {
            tenant: tenant.to_owned(),
            id,
            entries: Default::default(),
            dependencies: Default::default(),
            idle_timeout: 0,
            hard_timeout: 0,
            created: Utc::now(),
        }
    }

    pub fn tenant(&self) -> &str {
        &self.tenant
    }

    pub fn id(&self) -> FlowId {
        self.id
    }

    pub fn created(&self) -> DateTime<Utc> {
        self.created
    }

    pub fn entries(&self) -> &[FlowEntry] {
        &self.entries
    }

    pub fn entry(&self, name: &str) -> Option<&FlowEntry> {
        self.entries.iter().find(|entry| entry.name == name)
    }

    pub fn ingress(&self) -> Option<&FlowEntry> {
        self.entries.first()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn dependencies(&self) -> impl Iterator<Item = &FlowDependency> {
        self.dependencies.iter()
    }

    pub fn depends_on(&self, dependency: &FlowDependency) -> bool {
        self.dependencies.contains(dependency)
    }

    /// Sets the timeouts of the flow. Only the ingress entry expires, the
    /// rest of the flow is removed along with it.
    pub fn set_timeout(&mut self, idle_timeout: u16, hard_timeout: u16) {
        self.idle_timeout = idle_timeout;
        self.hard_timeout = hard_timeout;
        if let Some(ingress) = self.entries.first_mut() {
            ingress.idle_timeout = idle_timeout;
            ingress.hard_timeout = hard_timeout;
        }
    }

    /// Appends a flow entry forwarding the matched packets with the given
    /// actions. The switch and input port become dependencies of the flow.
    pub fn add_flow(
        &mut self,
        flow_match: FlowMatch,
        actions: ActionList,
        priority: u16,
    ) -> &FlowEntry {
        let index = self.entries.len();
        let name = format!("{}-{}-{}", self.tenant, self.id, index);
        let switch = actions.switch();
        let mut entry = FlowEntry::new(
            name,
            switch,
            priority,
            flow_match,
            actions.into_actions(),
        );
        if index == 0 {
            entry.idle_timeout = self.idle_timeout;
            entry.hard_timeout = self.hard_timeout;
        }

        self.dependencies.insert(FlowDependency::Switch(switch));
        if let Some(port) = entry.flow_match.in_port {
            self.dependencies
                .insert(FlowDependency::SwitchPort(SwitchPort::new(switch, port)));
        }
        self.entries.push(entry);
        &self.entries[index]
    }

    pub fn add_dependency(&mut self, dependency: FlowDependency) {
        self.dependencies.insert(dependency);
    }
}

impl std::fmt::Display for VtnFlow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}/{} [{}]",
            self.tenant,
            self.id,
            self.entries.iter().map(|entry| entry.switch).join(" -> ")
        )
    }
}

// ===== impl FlowDatabase =====

impl FlowDatabase {
    pub fn new(tenant: &str) -> FlowDatabase {
        FlowDatabase {
            tenant: tenant.to_owned(),
            next_id: AtomicU64::new(1),
            state: Default::default(),
        }
    }

    pub fn tenant(&self) -> &str {
        &self.tenant
    }

    /// Returns an empty flow with a fresh identifier. The flow isn't stored
    /// until [`FlowDatabase::insert`] is called.
    pub fn create(&self) -> VtnFlow {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        VtnFlow::new(&self.tenant, id)
    }

    /// Stores a new flow.
    ///
    /// Fails if the flow is empty, if a flow with the same ID is already
    /// stored or if its ingress entry is already used by another flow.
    pub fn insert(&self, flow: VtnFlow) -> Result<(), Error> {
        let Some(ingress) = flow.ingress() else {
            return Err(Error::FlowEmpty(self.tenant.clone(), flow.id));
        };
        let key = ingress.key();

        let mut state = self.state.lock().unwrap();
        if state.flows.contains_key(&flow.id) {
            return Err(Error::FlowExists(self.tenant.clone(), flow.id));
        }
        if let Some(other) = state.ingress.get(&key) {
            return Err(Error::FlowConflict(self.tenant.clone(), *other, key));
        }

        state.ingress.insert(key, flow.id);
        state.flows.insert(flow.id, flow);
        Ok(())
    }

    pub fn get(&self, id: FlowId) -> Option<VtnFlow> {
        self.state.lock().unwrap().flows.get(&id).cloned()
    }

    pub fn contains(&self, id: FlowId) -> bool {
        self.state.lock().unwrap().flows.contains_key(&id)
    }

    /// Looks up the flow whose ingress entry has the given key.
    pub fn find_ingress(&self, key: &FlowKey) -> Option<FlowId> {
        self.state.lock().unwrap().ingress.get(key).copied()
    }

    pub fn remove(&self, id: FlowId) -> Option<VtnFlow> {
        let mut state = self.state.lock().unwrap();
        let flow = state.flows.remove(&id)?;
        state.unindex(&flow);
        Some(flow)
    }

    /// Removes and returns every flow depending on the given resource.
    pub fn remove_by_dependency(
        &self,
        dependency: &FlowDependency,
    ) -> Vec<VtnFlow> {
        let mut state = self.state.lock().unwrap();
        let ids = state
            .flows
            .values()
            .filter(|flow| flow.depends_on(dependency))
            .map(|flow| flow.id)
            .collect::<Vec<_>>();
        ids.into_iter()
            .filter_map(|id| {
                let flow = state.flows.remove(&id)?;
                state.unindex(&flow);
                Some(flow)
            })
            .collect()
    }

    pub fn flow_ids(&self) -> Vec<FlowId> {
        self.state.lock().unwrap().flows.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.state.lock().unwrap().flows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().unwrap().flows.is_empty()
    }

    /// Removes and returns all flows.
    pub fn clear(&self) -> Vec<VtnFlow> {
        let mut state = self.state.lock().unwrap();
        state.ingress.clear();
        std::mem::take(&mut state.flows).into_values().collect()
    }
}

// ===== impl FlowDbState =====

impl FlowDbState {
    fn unindex(&mut self, flow: &VtnFlow) {
        if let Some(ingress) = flow.ingress() {
            let key = ingress.key();
            if self.ingress.get(&key) == Some(&flow.id) {
                self.ingress.remove(&key);
            }
        }
    }
}

// ===== unit tests =====

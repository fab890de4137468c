//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::collections::BTreeMap;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use vtn_flow::cluster::FlowEventMap;
use vtn_flow::flowdb::VtnFlow;
use vtn_flow::southbound::memory::{MemoryFlowTable, StaticTopology};
use vtn_flow::{Config, FlowManager};
use vtn_utils::action::ActionList;
use vtn_utils::cluster::ClusterNodeId;
use vtn_utils::flow::{FlowEntry, FlowMatch, SwitchId, VlanId};
use vtn_utils::sync::Interrupter;

// Upper bound for operations expected to complete.
pub const WAIT: Duration = Duration::from_secs(10);

pub const TENANT: &str = "vtn1";

// A cluster node backed by in-memory southbound services.
pub struct Node {
    pub manager: FlowManager,
    pub table: Arc<MemoryFlowTable>,
    pub topology: Arc<StaticTopology>,
}

//
// Helper functions.
//

pub fn config() -> Config {
    Config {
        workers: 2,
        worker_idle_timeout: 100,
        flow_mod_timeout: 500,
        remote_flow_mod_timeout: 2000,
        remote_bulk_flow_mod_timeout: 2000,
    }
}

// Creates a cluster of `nodes` nodes sharing one event map. Switches are
// owned as described by `owners` (switch DPID to node ID, starting at 1).
pub fn cluster(
    nodes: u32,
    owners: &BTreeMap<u64, u32>,
) -> (Arc<FlowEventMap>, Vec<Node>) {
    cluster_with_config(nodes, owners, config())
}

pub fn cluster_with_config(
    nodes: u32,
    owners: &BTreeMap<u64, u32>,
    config: Config,
) -> (Arc<FlowEventMap>, Vec<Node>) {
    let events = Arc::new(FlowEventMap::new());
    let nodes = (1..=nodes)
        .map(|node_id| {
            let table = Arc::new(MemoryFlowTable::new());
            let topology = Arc::new(StaticTopology::new(
                ClusterNodeId(node_id),
                nodes as usize - 1,
            ));
            for (dpid, owner) in owners {
                topology.set_owner(SwitchId(*dpid), ClusterNodeId(*owner));
            }
            let manager = FlowManager::new(
                config.clone(),
                table.clone(),
                topology.clone(),
                events.clone(),
            )
            .unwrap();
            Node {
                manager,
                table,
                topology,
            }
        })
        .collect();
    (events, nodes)
}

pub fn entry(name: &str, switch: u64, in_port: u32) -> FlowEntry {
    FlowEntry::new(
        name.to_owned(),
        SwitchId(switch),
        10,
        FlowMatch::default().with_in_port(in_port),
        vec![],
    )
}

// Appends an entry forwarding untagged packets from `in_port` to `out_port`.
pub fn add_hop(flow: &mut VtnFlow, switch: u64, in_port: u32, out_port: u32) {
    add_vlan_hop(flow, switch, in_port, out_port, 0);
}

pub fn add_vlan_hop(
    flow: &mut VtnFlow,
    switch: u64,
    in_port: u32,
    out_port: u32,
    vlan: VlanId,
) {
    let mut actions = ActionList::new(SwitchId(switch), 0);
    actions.add_vlan_id(vlan).add_output(out_port);
    flow.add_flow(FlowMatch::default().with_in_port(in_port), actions, 10);
}

// Builds a flow traversing the given (switch, in_port, out_port) hops.
pub fn flow(node: &Node, hops: &[(u64, u32, u32)]) -> VtnFlow {
    let db = node.manager.flow_db(TENANT);
    let mut flow = db.create();
    for (switch, in_port, out_port) in hops {
        add_hop(&mut flow, *switch, *in_port, *out_port);
    }
    flow
}

// Fires the interrupter after the given delay.
pub fn interrupt_after(
    interrupter: &Interrupter,
    delay: Duration,
) -> thread::JoinHandle<()> {
    let interrupter = interrupter.clone();
    thread::spawn(move || {
        thread::sleep(delay);
        interrupter.interrupt();
    })
}

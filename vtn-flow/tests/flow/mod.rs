//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::thread;
use std::time::{Duration, Instant};

use maplit::btreemap;
use vtn_flow::error::Error;
use vtn_flow::flowdb::FlowDependency;
use vtn_utils::cluster::ClusterNodeId;
use vtn_utils::flow::{
    ETHER_TYPE_VLAN, FlowAction, FlowModOp, FlowModResult, SwitchId,
};

use crate::stub::{self, TENANT, WAIT};

#[test]
fn test_install_uninstall() {
    let (_, nodes) = stub::cluster(1, &btreemap! { 1 => 1, 2 => 1 });
    let node = &nodes[0];
    let db = node.manager.flow_db(TENANT);
    let flow = stub::flow(node, &[(1, 1, 2), (2, 1, 2)]);
    let id = flow.id();

    let task = node.manager.install_flow(&db, flow.clone()).unwrap();
    assert_eq!(task.get_result(WAIT), FlowModResult::Succeeded);
    assert!(flow.entries().iter().all(|entry| node.table.contains(entry)));
    assert!(db.contains(id));

    let task = node.manager.uninstall_flow(&db, id).unwrap().unwrap();
    assert_eq!(task.op(), FlowModOp::Remove);
    assert_eq!(task.get_result(WAIT), FlowModResult::Succeeded);
    assert!(node.table.is_empty());
    assert!(db.is_empty());

    assert!(node.manager.uninstall_flow(&db, id).unwrap().is_none());
}

#[test]
fn test_vlan_actions() {
    let (_, nodes) = stub::cluster(1, &btreemap! { 1 => 1 });
    let node = &nodes[0];
    let db = node.manager.flow_db(TENANT);
    let mut flow = db.create();
    stub::add_vlan_hop(&mut flow, 1, 1, 2, 10);

    let task = node.manager.install_flow(&db, flow).unwrap();
    assert_eq!(task.get_result(WAIT), FlowModResult::Succeeded);
    let entries = node.table.entries(SwitchId(1));
    assert_eq!(entries.len(), 1);
    assert_eq!(
        entries[0].actions,
        vec![
            FlowAction::PushVlan {
                ether_type: ETHER_TYPE_VLAN
            },
            FlowAction::SetVlanId(10),
            FlowAction::Output(2),
        ]
    );
}

#[test]
fn test_ingress_conflict() {
    let (_, nodes) = stub::cluster(1, &btreemap! { 1 => 1 });
    let node = &nodes[0];
    let db = node.manager.flow_db(TENANT);

    let flow1 = stub::flow(node, &[(1, 1, 2)]);
    let task = node.manager.install_flow(&db, flow1.clone()).unwrap();
    assert_eq!(task.get_result(WAIT), FlowModResult::Succeeded);

    // Same ingress match, different output.
    let flow2 = stub::flow(node, &[(1, 1, 3)]);
    assert!(matches!(
        node.manager.install_flow(&db, flow2.clone()),
        Err(Error::FlowConflict(_, id, _)) if id == flow1.id()
    ));
    assert_eq!(db.flow_ids(), vec![flow1.id()]);
    assert_eq!(node.table.len(), 1);
}

#[test]
fn test_install_twice() {
    let (_, nodes) = stub::cluster(1, &btreemap! { 1 => 1, 2 => 1 });
    let node = &nodes[0];
    let db = node.manager.flow_db(TENANT);
    let flow = stub::flow(node, &[(1, 1, 2), (2, 1, 2)]);

    let task = node.manager.install_flow(&db, flow.clone()).unwrap();
    assert_eq!(task.get_result(WAIT), FlowModResult::Succeeded);
    assert!(matches!(
        node.manager.install_flow(&db, flow.clone()),
        Err(Error::FlowExists(_, id)) if id == flow.id()
    ));
    assert!(db.contains(flow.id()));
    assert_eq!(node.table.len(), 2);

    // The stored flow still owns its entries.
    let task = node.manager.uninstall_flow(&db, flow.id()).unwrap().unwrap();
    assert_eq!(task.get_result(WAIT), FlowModResult::Succeeded);
    assert!(node.table.is_empty());
}

#[test]
fn test_rollback() {
    let (_, nodes) = stub::cluster(1, &btreemap! { 1 => 1, 2 => 1 });
    let node = &nodes[0];
    let db = node.manager.flow_db(TENANT);

    // Occupy the slot of the second entry.
    let blocker = stub::entry("blocker", 2, 1);
    let task = node
        .manager
        .modify_entry(FlowModOp::Add, blocker.clone())
        .unwrap();
    assert_eq!(task.get_result(WAIT), FlowModResult::Succeeded);

    let flow = stub::flow(node, &[(1, 1, 2), (2, 1, 2)]);
    let task = node.manager.install_flow(&db, flow.clone()).unwrap();
    assert_eq!(task.get_result(WAIT), FlowModResult::Failed);

    // The first entry was removed again.
    assert!(!node.table.contains(&flow.entries()[0]));
    assert!(node.table.contains(&blocker));
    assert_eq!(node.table.len(), 1);
    assert!(!db.contains(flow.id()));
}

#[test]
fn test_disconnected_switch() {
    let (_, nodes) = stub::cluster(1, &btreemap! { 1 => 1, 2 => 1 });
    let node = &nodes[0];
    let db = node.manager.flow_db(TENANT);

    // Nothing is installed if a switch is unreachable.
    let flow = stub::flow(node, &[(1, 1, 2), (5, 1, 2)]);
    let task = node.manager.install_flow(&db, flow.clone()).unwrap();
    assert_eq!(task.get_result(WAIT), FlowModResult::Failed);
    assert!(node.table.is_empty());
    assert!(db.is_empty());
    assert_eq!(db.find_ingress(&flow.entries()[0].key()), None);

    // The failed flow doesn't hold on to its ingress entry.
    node.topology.set_owner(SwitchId(5), ClusterNodeId(1));
    let flow = stub::flow(node, &[(1, 1, 2), (5, 1, 2)]);
    let task = node.manager.install_flow(&db, flow.clone()).unwrap();
    assert_eq!(task.get_result(WAIT), FlowModResult::Succeeded);
    assert_eq!(node.table.len(), 2);
    let task = node.manager.uninstall_flow(&db, flow.id()).unwrap().unwrap();
    assert_eq!(task.get_result(WAIT), FlowModResult::Succeeded);
    assert!(node.table.is_empty());

    // Entries on switches that went away are skipped on removal.
    let flow = stub::flow(node, &[(1, 1, 2), (2, 1, 2)]);
    let task = node.manager.install_flow(&db, flow.clone()).unwrap();
    assert_eq!(task.get_result(WAIT), FlowModResult::Succeeded);
    node.topology.remove_switch(SwitchId(2));
    let task = node.manager.uninstall_flow(&db, flow.id()).unwrap().unwrap();
    assert_eq!(task.get_result(WAIT), FlowModResult::Succeeded);
    assert!(!node.table.contains(&flow.entries()[0]));
    assert!(node.table.contains(&flow.entries()[1]));
}

#[test]
fn test_uninstall_by_dependency() {
    let (_, nodes) = stub::cluster(1, &btreemap! { 1 => 1, 2 => 1 });
    let node = &nodes[0];
    let db1 = node.manager.flow_db(TENANT);
    let db2 = node.manager.flow_db("vtn2");

    let flow1 = stub::flow(node, &[(1, 1, 2), (2, 1, 2)]);
    let flow2 = stub::flow(node, &[(2, 3, 4)]);
    let mut flow3 = db2.create();
    stub::add_hop(&mut flow3, 1, 5, 6);
    for (db, flow) in [(&db1, flow1.clone()), (&db1, flow2.clone()), (&db2, flow3)]
    {
        let task = node.manager.install_flow(db, flow).unwrap();
        assert_eq!(task.get_result(WAIT), FlowModResult::Succeeded);
    }
    assert_eq!(node.table.len(), 4);

    let tasks = node
        .manager
        .uninstall_by_dependency(&FlowDependency::Switch(SwitchId(1)))
        .unwrap();
    assert_eq!(tasks.len(), 2);
    for task in tasks {
        assert_eq!(task.get_result(WAIT), FlowModResult::Succeeded);
    }
    assert_eq!(db1.flow_ids(), vec![flow2.id()]);
    assert!(db2.is_empty());
    assert_eq!(node.table.entries(SwitchId(2)), flow2.entries().to_vec());
    assert!(node.table.entries(SwitchId(1)).is_empty());
}

#[test]
fn test_remove_tenant() {
    let (_, nodes) = stub::cluster(1, &btreemap! { 1 => 1 });
    let node = &nodes[0];
    let db = node.manager.flow_db(TENANT);
    for port in 1..=3 {
        let flow = stub::flow(node, &[(1, port, 9)]);
        let task = node.manager.install_flow(&db, flow).unwrap();
        assert_eq!(task.get_result(WAIT), FlowModResult::Succeeded);
    }

    let tasks = node.manager.remove_tenant(TENANT).unwrap();
    assert_eq!(tasks.len(), 3);
    for task in tasks {
        assert_eq!(task.get_result(WAIT), FlowModResult::Succeeded);
    }
    assert!(node.table.is_empty());
    assert!(node.manager.tenants().is_empty());
    assert!(node.manager.remove_tenant(TENANT).unwrap().is_empty());
}

#[test]
fn test_install_after_shutdown() {
    let (_, nodes) = stub::cluster(1, &btreemap! { 1 => 1 });
    let node = &nodes[0];
    let db = node.manager.flow_db(TENANT);
    assert!(node.manager.shutdown(WAIT));

    let flow = stub::flow(node, &[(1, 1, 2)]);
    assert!(matches!(
        node.manager.install_flow(&db, flow),
        Err(Error::PoolShutdown)
    ));
    assert!(db.is_empty());
}

#[test]
fn test_terminate_interrupts_flow() {
    // Switch 2 belongs to a node that never answers.
    let (_, nodes) = stub::cluster(2, &btreemap! { 1 => 1, 2 => 2 });
    let node = &nodes[0];
    assert!(nodes[1].manager.shutdown(WAIT));
    let db = node.manager.flow_db(TENANT);

    let flow = stub::flow(node, &[(1, 1, 2), (2, 1, 2)]);
    let start = Instant::now();
    let task = node.manager.install_flow(&db, flow).unwrap();
    thread::sleep(Duration::from_millis(100));
    assert!(node.manager.terminate(WAIT));

    assert_eq!(task.get_result(Duration::ZERO), FlowModResult::Failed);
    let timeout = node.manager.config().remote_flow_mod_timeout();
    assert!(start.elapsed() < timeout);
    assert!(node.table.is_empty());
    assert!(db.is_empty());
}

//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::time::{Duration, Instant};

use maplit::btreemap;
use vtn_flow::cluster::FlowEvent;
use vtn_utils::cluster::ClusterNodeId;
use vtn_utils::flow::{FlowModOp, FlowModResult, SwitchId};

use crate::stub::{self, TENANT, WAIT};

#[test]
fn test_flow_across_nodes() {
    let (events, nodes) = stub::cluster(2, &btreemap! { 1 => 1, 2 => 2 });
    let node1 = &nodes[0];
    let node2 = &nodes[1];
    let db = node1.manager.flow_db(TENANT);

    let flow = stub::flow(node1, &[(1, 1, 2), (2, 1, 2)]);
    let task = node1.manager.install_flow(&db, flow.clone()).unwrap();
    assert_eq!(task.get_result(WAIT), FlowModResult::Succeeded);
    assert!(node1.table.contains(&flow.entries()[0]));
    assert!(node2.table.contains(&flow.entries()[1]));
    assert_eq!(node1.table.len(), 1);
    assert_eq!(node2.table.len(), 1);

    // Requests and results don't linger in the event map.
    assert!(events.wait_for_cleared(WAIT));

    let task = node1.manager.uninstall_flow(&db, flow.id()).unwrap().unwrap();
    assert_eq!(task.get_result(WAIT), FlowModResult::Succeeded);
    assert!(node1.table.is_empty());
    assert!(node2.table.is_empty());
    assert!(events.wait_for_cleared(WAIT));
}

#[test]
fn test_exchanged_events() {
    let (events, nodes) = stub::cluster(2, &btreemap! { 1 => 1, 2 => 2 });
    let node1 = &nodes[0];
    let db = node1.manager.flow_db(TENANT);

    let flow = stub::flow(node1, &[(1, 1, 2), (2, 1, 2)]);
    let task = node1.manager.install_flow(&db, flow.clone()).unwrap();
    assert_eq!(task.get_result(WAIT), FlowModResult::Succeeded);

    let posted = events.get_posted_events();
    assert_eq!(posted.len(), 2);

    let (request_id, request) = &posted[0];
    assert_eq!(request_id.origin, ClusterNodeId(1));
    let request = request.as_flow_mod_request().unwrap();
    assert_eq!(request.op, FlowModOp::Add);
    assert_eq!(request.entries, vec![flow.entries()[1].clone()]);

    let (result_id, result) = &posted[1];
    assert_eq!(result_id.origin, ClusterNodeId(2));
    let FlowEvent::FlowModResult(result) = result else {
        panic!("unexpected event: {result:?}");
    };
    assert_eq!(result.request, *request_id);
    assert_eq!(result.responder, ClusterNodeId(2));
    assert_eq!(
        result.results,
        vec![(flow.entries()[1].name.clone(), FlowModResult::Succeeded)]
    );
}

#[test]
fn test_three_nodes() {
    let (events, nodes) =
        stub::cluster(3, &btreemap! { 1 => 1, 2 => 2, 3 => 3 });
    let db = nodes[1].manager.flow_db(TENANT);

    // Installed from node 2, through switches of all three nodes.
    let flow = stub::flow(&nodes[1], &[(1, 1, 2), (2, 1, 2), (3, 1, 2)]);
    let task = nodes[1].manager.install_flow(&db, flow.clone()).unwrap();
    assert_eq!(task.get_result(WAIT), FlowModResult::Succeeded);
    for (node, entry) in nodes.iter().zip(flow.entries()) {
        assert_eq!(node.table.entries(entry.switch), vec![entry.clone()]);
    }
    assert!(events.wait_for_cleared(WAIT));
}

#[test]
fn test_switch_without_owner() {
    // Switch 9 is assigned to a node that isn't part of the cluster.
    let (events, nodes) = stub::cluster(2, &btreemap! { 1 => 1, 9 => 3 });
    let node1 = &nodes[0];
    let db = node1.manager.flow_db(TENANT);

    let flow = stub::flow(node1, &[(1, 1, 2), (9, 1, 2)]);
    let task = node1.manager.install_flow(&db, flow.clone()).unwrap();
    // Node 2 replies IGNORED and nobody else is left to reply.
    assert_eq!(task.get_result(WAIT), FlowModResult::Failed);
    assert!(node1.table.is_empty());
    assert!(nodes[1].table.is_empty());
    assert!(!db.contains(flow.id()));
    assert!(events.wait_for_cleared(WAIT));
}

#[test]
fn test_remote_failure_rolls_back() {
    let (_, nodes) = stub::cluster(2, &btreemap! { 1 => 1, 2 => 2, 3 => 2 });
    let node1 = &nodes[0];
    let node2 = &nodes[1];
    let db = node1.manager.flow_db(TENANT);

    // Switch 3 already holds the last entry of the flow.
    let flow = stub::flow(node1, &[(1, 1, 2), (2, 1, 2), (3, 1, 2)]);
    let blocker = flow.entries()[2].clone();
    let task = node2.manager.modify_entry(FlowModOp::Add, blocker.clone()).unwrap();
    assert_eq!(task.get_result(WAIT), FlowModResult::Succeeded);

    let task = node1.manager.install_flow(&db, flow.clone()).unwrap();
    assert_eq!(task.get_result(WAIT), FlowModResult::Failed);
    assert!(node1.table.is_empty());
    assert!(!db.contains(flow.id()));

    // The rollback request is processed asynchronously by node 2 and
    // removes every remote entry of the flow.
    assert!(node2.manager.shutdown(WAIT));
    assert!(!node2.table.contains(&flow.entries()[1]));
    assert!(node2.table.entries(SwitchId(3)).is_empty());
}

#[test]
fn test_local_failure_rolls_back_remote() {
    let (_, nodes) = stub::cluster(2, &btreemap! { 1 => 1, 2 => 2 });
    let node1 = &nodes[0];
    let node2 = &nodes[1];
    let db = node1.manager.flow_db(TENANT);
    let delay = Duration::from_millis(200);
    node2.table.set_delay(delay);

    // Switch 1 already holds the ingress entry of the flow.
    let flow = stub::flow(node1, &[(1, 1, 2), (2, 1, 2)]);
    let blocker = flow.entries()[0].clone();
    let task = node1.manager.modify_entry(FlowModOp::Add, blocker).unwrap();
    assert_eq!(task.get_result(WAIT), FlowModResult::Succeeded);

    // The rollback waits for node 2 to install its entry before removing it.
    let start = Instant::now();
    let task = node1.manager.install_flow(&db, flow.clone()).unwrap();
    assert_eq!(task.get_result(WAIT), FlowModResult::Failed);
    assert!(start.elapsed() >= delay);
    assert!(!db.contains(flow.id()));

    assert!(node2.manager.shutdown(WAIT));
    assert!(node2.table.is_empty());
    assert_eq!(node1.table.len(), 1);
}

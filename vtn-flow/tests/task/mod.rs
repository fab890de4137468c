//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::time::{Duration, Instant};

use maplit::btreemap;
use vtn_flow::error::Error;
use vtn_utils::flow::{FlowModOp, FlowModResult};
use vtn_utils::sync::Interrupter;

use crate::stub::{self, WAIT};

#[test]
fn test_modify_entry() {
    let (_, nodes) = stub::cluster(1, &btreemap! { 1 => 1 });
    let node = &nodes[0];
    let entry = stub::entry("e1", 1, 1);

    // Install.
    let task = node.manager.modify_entry(FlowModOp::Add, entry.clone()).unwrap();
    assert_eq!(task.get_result(WAIT), FlowModResult::Succeeded);
    assert!(node.table.contains(&entry));

    // Install the same entry again.
    let task = node.manager.modify_entry(FlowModOp::Add, entry.clone()).unwrap();
    assert_eq!(task.get_result(WAIT), FlowModResult::Failed);

    // Uninstall.
    let task = node
        .manager
        .modify_entry(FlowModOp::Remove, entry.clone())
        .unwrap();
    assert_eq!(task.get_result(WAIT), FlowModResult::Succeeded);
    assert!(node.table.is_empty());

    // Uninstall a missing entry.
    let task = node
        .manager
        .modify_entry(FlowModOp::Remove, entry.clone())
        .unwrap();
    assert_eq!(task.get_result(WAIT), FlowModResult::Failed);
}

#[test]
fn test_modify_entry_backend_errors() {
    let (_, nodes) = stub::cluster(1, &btreemap! { 1 => 1 });
    let node = &nodes[0];
    let entry = stub::entry("e1", 1, 1);

    // The switch doesn't answer in time.
    node.table.set_delay(Duration::from_secs(60));
    let start = Instant::now();
    let task = node.manager.modify_entry(FlowModOp::Add, entry.clone()).unwrap();
    assert_eq!(task.get_result(WAIT), FlowModResult::Failed);
    assert!(start.elapsed() < WAIT);
    node.table.set_delay(Duration::ZERO);

    // Same for removals.
    let task = node.manager.modify_entry(FlowModOp::Add, entry.clone()).unwrap();
    assert_eq!(task.get_result(WAIT), FlowModResult::Succeeded);
    node.table.set_delay(Duration::from_secs(60));
    let task = node
        .manager
        .modify_entry(FlowModOp::Remove, entry.clone())
        .unwrap();
    assert_eq!(task.get_result(WAIT), FlowModResult::Failed);
    assert!(node.table.contains(&entry));
    node.table.set_delay(Duration::ZERO);
    let task = node
        .manager
        .modify_entry(FlowModOp::Remove, entry.clone())
        .unwrap();
    assert_eq!(task.get_result(WAIT), FlowModResult::Succeeded);

    node.table.set_failure(Some("connection reset".to_owned()));
    let task = node.manager.modify_entry(FlowModOp::Add, entry.clone()).unwrap();
    assert_eq!(task.get_result(WAIT), FlowModResult::Failed);
    assert!(node.table.is_empty());
}

#[test]
fn test_get_result_timeout() {
    let (_, nodes) = stub::cluster(1, &btreemap! { 1 => 1 });
    let node = &nodes[0];
    node.table.set_delay(Duration::from_millis(300));

    let task = node
        .manager
        .modify_entry(FlowModOp::Add, stub::entry("e1", 1, 1))
        .unwrap();
    let timeout = Duration::from_millis(50);
    let start = Instant::now();
    assert_eq!(task.get_result(timeout), FlowModResult::TimedOut);
    assert!(start.elapsed() >= timeout);

    // Giving up doesn't affect the task.
    assert_eq!(task.get_result(WAIT), FlowModResult::Succeeded);
}

#[test]
fn test_get_result_interrupted() {
    let (_, nodes) = stub::cluster(1, &btreemap! { 1 => 1 });
    let node = &nodes[0];
    node.table.set_delay(Duration::from_millis(300));

    let task = node
        .manager
        .modify_entry(FlowModOp::Add, stub::entry("e1", 1, 1))
        .unwrap();
    let interrupter = Interrupter::new();
    let handle = stub::interrupt_after(&interrupter, Duration::from_millis(20));
    assert_eq!(
        task.get_result_interruptible(WAIT, &interrupter),
        FlowModResult::Interrupted
    );
    handle.join().unwrap();

    assert_eq!(task.get_result(WAIT), FlowModResult::Succeeded);
}

#[test]
fn test_shutdown_rejects_tasks() {
    let (_, nodes) = stub::cluster(1, &btreemap! { 1 => 1 });
    let node = &nodes[0];
    node.table.set_delay(Duration::from_millis(50));

    let tasks = (0..4)
        .map(|port| {
            let entry = stub::entry(&format!("e{port}"), 1, port);
            node.manager.modify_entry(FlowModOp::Add, entry).unwrap()
        })
        .collect::<Vec<_>>();

    // Queued tasks still run to completion.
    assert!(node.manager.shutdown(WAIT));
    for task in tasks {
        assert_eq!(task.get_result(Duration::ZERO), FlowModResult::Succeeded);
    }
    assert_eq!(node.table.len(), 4);

    assert!(matches!(
        node.manager.modify_entry(FlowModOp::Add, stub::entry("e9", 1, 9)),
        Err(Error::PoolShutdown)
    ));
}

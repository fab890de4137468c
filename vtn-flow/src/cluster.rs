//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::sync::Arc;

use derive_new::new;
use enum_as_inner::EnumAsInner;
use serde::{Deserialize, Serialize};
use vtn_utils::cluster::{ClusterEventId, ClusterEventMap, ClusterNodeId};
use vtn_utils::flow::{FlowEntry, FlowModOp, FlowModResult};
use vtn_utils::task::{Job, WorkerContext};

use crate::FlowContext;
use crate::debug::Debug;
use crate::error::Error;
use crate::fmod::{FlowModScope, FlowModTask};

/// Event map shared by the members of a cluster.
pub type FlowEventMap = ClusterEventMap<ClusterEventId, FlowEvent>;

/// Events exchanged between the cluster nodes.
#[derive(Clone, Debug, EnumAsInner)]
#[derive(Deserialize, Serialize)]
pub enum FlowEvent {
    FlowModRequest(FlowModRequestMsg),
    FlowModResult(FlowModResultMsg),
}

/// Asks the other nodes to program flow entries on the switches they own.
#[derive(Clone, Debug, new)]
#[derive(Deserialize, Serialize)]
pub struct FlowModRequestMsg {
    pub op: FlowModOp,
    pub entries: Vec<FlowEntry>,
}

/// Results of a flow modification request, one per requested entry.
#[derive(Clone, Debug, new)]
#[derive(Deserialize, Serialize)]
pub struct FlowModResultMsg {
    pub request: ClusterEventId,
    pub responder: ClusterNodeId,
    pub results: Vec<(String, FlowModResult)>,
}

// Executes a flow modification request received from another node.
#[derive(Debug)]
struct ClusterFlowModJob {
    ctx: Arc<FlowContext>,
    request: ClusterEventId,
    msg: FlowModRequestMsg,
}

// ===== impl ClusterFlowModJob =====

impl Job for ClusterFlowModJob {
    type Error = Error;

    fn run(&self, cx: &WorkerContext) -> Result<(), Error> {
        let mut results = Vec::with_capacity(self.msg.entries.len());
        for entry in &self.msg.entries {
            let task = FlowModTask::new(
                self.msg.op,
                FlowModScope::Cluster,
                Some(entry.clone()),
                self.ctx.southbound.clone(),
            );
            task.run(cx)?;
            let result = task.reply_result().unwrap_or(FlowModResult::Failed);
            results.push((entry.name.clone(), result));
        }

        let reply =
            FlowModResultMsg::new(self.request, self.ctx.local_node(), results);
        let id = self.ctx.next_event_id();
        self.ctx.events.put(id, FlowEvent::FlowModResult(reply))?;
        Ok(())
    }
}

// ===== global functions =====

// Handles an event posted to the cluster event map.
pub(crate) fn process_event(
    ctx: &Arc<FlowContext>,
    id: &ClusterEventId,
    event: &FlowEvent,
) {
    let local_node = ctx.local_node();
    match event {
        FlowEvent::FlowModRequest(msg) => {
            if id.origin == local_node {
                return;
            }

            Debug::RemoteRequestRecv(id, msg.op, msg.entries.len()).log();
            let job = ClusterFlowModJob {
                ctx: ctx.clone(),
                request: *id,
                msg: msg.clone(),
            };
            if !ctx.pool.execute(job) {
                Error::PoolShutdown.log();
            }
        }
        FlowEvent::FlowModResult(msg) => {
            if msg.request.origin != local_node {
                return;
            }

            let request = ctx.requests.lock().unwrap().get(&msg.request).cloned();
            match request {
                Some(request) => {
                    Debug::RemoteResultRecv(&msg.request, msg.responder).log();
                    for (name, result) in &msg.results {
                        request.set_result(name, *result, msg.responder);
                    }
                }
                None => {
                    Debug::RemoteResultStale(&msg.request, msg.responder).log();
                }
            }
            ctx.events.remove(id);
        }
    }
}

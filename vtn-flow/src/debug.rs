//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use chrono::Utc;
use tracing::{debug, debug_span};
use vtn_utils::cluster::{ClusterEventId, ClusterNodeId};
use vtn_utils::flow::{FlowEntry, FlowModOp, FlowModResult};

use crate::flowdb::{FlowDependency, VtnFlow};

// Flow coordination debug messages.
#[derive(Debug)]
pub enum Debug<'a> {
    EntryModStart(FlowModOp, &'a FlowEntry),
    EntryModDone(FlowModOp, &'a FlowEntry, FlowModResult),
    EntryNotOwned(&'a FlowEntry),
    EntryDisconnected(FlowModOp, &'a FlowEntry),
    FlowModStart(FlowModOp, &'a VtnFlow),
    FlowModDone(FlowModOp, &'a VtnFlow, FlowModResult),
    FlowRollback(&'a VtnFlow),
    FlowInvalidate(&'a FlowDependency, usize),
    RemoteRequestPost(&'a ClusterEventId, FlowModOp, usize),
    RemoteRequestRecv(&'a ClusterEventId, FlowModOp, usize),
    RemoteResultRecv(&'a ClusterEventId, ClusterNodeId),
    RemoteResultStale(&'a ClusterEventId, ClusterNodeId),
}

// ===== impl Debug =====

impl Debug<'_> {
    // Log debug message using the tracing API.
    pub(crate) fn log(&self) {
        match self {
            Debug::EntryModStart(op, entry) => {
                debug_span!("entry", name = %entry.name, switch = %entry.switch).in_scope(|| {
                    debug!(%op, "{}", self);
                });
            }
            Debug::EntryModDone(op, entry, result) => {
                debug_span!("entry", name = %entry.name, switch = %entry.switch).in_scope(|| {
                    debug!(%op, %result, "{}", self);
                });
            }
            Debug::EntryNotOwned(entry) => {
                debug_span!("entry", name = %entry.name, switch = %entry.switch).in_scope(|| {
                    debug!("{}", self);
                });
            }
            Debug::EntryDisconnected(op, entry) => {
                debug_span!("entry", name = %entry.name, switch = %entry.switch).in_scope(|| {
                    debug!(%op, "{}", self);
                });
            }
            Debug::FlowModStart(op, flow) => {
                debug!(%op, entries = flow.entries().len(), "{}", self);
            }
            Debug::FlowModDone(op, flow, result) => {
                let age = (Utc::now() - flow.created()).num_milliseconds();
                debug!(%op, %flow, %result, age_ms = %age, "{}", self);
            }
            Debug::FlowRollback(flow) => {
                debug!(entries = flow.entries().len(), "{}", self);
            }
            Debug::FlowInvalidate(dependency, count) => {
                debug!(?dependency, %count, "{}", self);
            }
            Debug::RemoteRequestPost(id, op, count)
            | Debug::RemoteRequestRecv(id, op, count) => {
                debug_span!("cluster", event = %id).in_scope(|| {
                    debug!(%op, entries = %count, "{}", self);
                });
            }
            Debug::RemoteResultRecv(id, node)
            | Debug::RemoteResultStale(id, node) => {
                debug_span!("cluster", event = %id).in_scope(|| {
                    debug!(%node, "{}", self);
                });
            }
        }
    }
}

impl std::fmt::Display for Debug<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Debug::EntryModStart(..) => {
                write!(f, "programming flow entry")
            }
            Debug::EntryModDone(..) => {
                write!(f, "flow entry programmed")
            }
            Debug::EntryNotOwned(..) => {
                write!(f, "switch not owned by this node")
            }
            Debug::EntryDisconnected(..) => {
                write!(f, "switch not connected to the cluster")
            }
            Debug::FlowModStart(..) => {
                write!(f, "flow modification started")
            }
            Debug::FlowModDone(..) => {
                write!(f, "flow modification finished")
            }
            Debug::FlowRollback(..) => {
                write!(f, "rolling back flow")
            }
            Debug::FlowInvalidate(..) => {
                write!(f, "invalidating dependent flows")
            }
            Debug::RemoteRequestPost(..) => {
                write!(f, "posted flow modification request")
            }
            Debug::RemoteRequestRecv(..) => {
                write!(f, "received flow modification request")
            }
            Debug::RemoteResultRecv(..) => {
                write!(f, "received flow modification result")
            }
            Debug::RemoteResultStale(..) => {
                write!(f, "discarding result of unknown request")
            }
        }
    }
}

//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::collections::{BTreeMap, BTreeSet};
use std::time::Instant;

use tracing::debug;
use vtn_utils::cluster::ClusterNodeId;
use vtn_utils::flow::{FlowEntry, FlowModResult};
use vtn_utils::sync::{Interrupter, Monitor, Wait};

/// Collects the results reported by the other cluster nodes for the remote
/// part of a logical flow.
#[derive(Debug)]
pub struct RemoteFlowRequest {
    state: Monitor<RequestState>,
}

#[derive(Debug)]
struct RequestState {
    entries: BTreeMap<String, EntryState>,
    remote_nodes: usize,
    // Outcome, once decided from the received results.
    decided: Option<bool>,
    // Whether every entry got its final result.
    complete: bool,
}

#[derive(Debug, Default)]
struct EntryState {
    // Last result reported by the owner of the switch.
    result: Option<(FlowModResult, ClusterNodeId)>,
    // Nodes that don't own the switch.
    ignored_by: BTreeSet<ClusterNodeId>,
}

// ===== impl RemoteFlowRequest =====

impl RemoteFlowRequest {
    pub fn new<'a>(
        entries: impl IntoIterator<Item = &'a FlowEntry>,
        remote_nodes: usize,
    ) -> RemoteFlowRequest {
        let entries = entries
            .into_iter()
            .map(|entry| (entry.name.clone(), EntryState::default()))
            .collect();
        RemoteFlowRequest {
            state: Monitor::new(RequestState {
                entries,
                remote_nodes,
                decided: None,
                complete: false,
            }),
        }
    }

    /// Records the result reported by `node` for the named entry.
    ///
    /// IGNORED never replaces a result reported by the owner of the switch.
    /// Results for unknown entries are dropped.
    pub fn set_result(
        &self,
        name: &str,
        result: FlowModResult,
        node: ClusterNodeId,
    ) {
        self.state.update(|state| {
            let Some(entry) = state.entries.get_mut(name) else {
                debug!(%name, %node, "ignoring result for unknown flow entry");
                return;
            };
            match result {
                FlowModResult::Ignored => {
                    entry.ignored_by.insert(node);
                }
                _ => entry.result = Some((result, node)),
            }
        });
    }

    /// Returns the last result recorded for the named entry.
    pub fn entry_result(&self, name: &str) -> Option<FlowModResult> {
        let state = self.state.lock();
        let entry = state.entries.get(name)?;
        match entry.result {
            Some((result, _)) => Some(result),
            None if !entry.ignored_by.is_empty() => Some(FlowModResult::Ignored),
            None => None,
        }
    }

    /// Returns the decided outcome, if any.
    pub fn decided(&self) -> Option<bool> {
        self.state.lock().decided
    }

    /// Waits until the outcome of the request is known or `deadline` passes.
    ///
    /// Returns true if every entry was programmed by the owner of its switch.
    /// Unless `wait_for_all` is set, returns false as soon as one entry is
    /// known to have failed.
    pub fn get_result_abs(&self, deadline: Instant, wait_for_all: bool) -> bool {
        self.wait(deadline, wait_for_all, None)
    }

    /// Same as [`RemoteFlowRequest::get_result_abs`], but gives up with false
    /// once the interrupter fires.
    pub fn get_result_abs_interruptible(
        &self,
        deadline: Instant,
        wait_for_all: bool,
        interrupter: &Interrupter,
    ) -> bool {
        self.wait(deadline, wait_for_all, Some(interrupter))
    }

    fn wait(
        &self,
        deadline: Instant,
        wait_for_all: bool,
        interrupter: Option<&Interrupter>,
    ) -> bool {
        match self.state.wait_until(deadline, interrupter, |state| {
            state.evaluate(wait_for_all)
        }) {
            Wait::Ready(succeeded) => succeeded,
            Wait::TimedOut | Wait::Interrupted => false,
        }
    }
}

// ===== impl RequestState =====

impl RequestState {
    // A failure decided early still leaves the request open to waiters that
    // need every result.
    fn evaluate(&mut self, wait_for_all: bool) -> Option<bool> {
        if self.complete || (self.decided.is_some() && !wait_for_all) {
            return self.decided;
        }

        let mut complete = true;
        let mut failed = false;
        for entry in self.entries.values() {
            match entry.resolve(self.remote_nodes) {
                Some(true) => (),
                Some(false) => failed = true,
                None => complete = false,
            }
        }

        if complete {
            self.complete = true;
            self.decided = Some(self.decided.unwrap_or(true) && !failed);
        } else if failed {
            self.decided = Some(false);
        }
        if self.complete || !wait_for_all {
            self.decided
        } else {
            None
        }
    }
}

// ===== impl EntryState =====

impl EntryState {
    // Returns whether the entry succeeded, or None while it's undecided. An
    // entry ignored by every remote node has no owner and counts as failed.
    fn resolve(&self, remote_nodes: usize) -> Option<bool> {
        match self.result {
            Some((result, _)) => Some(result.is_succeeded()),
            None if remote_nodes > 0 && self.ignored_by.len() >= remote_nodes => {
                Some(false)
            }
            None => None,
        }
    }
}

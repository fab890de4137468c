//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use vtn_utils::flow::{FlowEntry, FlowModOp, FlowModResult};
use vtn_utils::sync::{Interrupter, Monitor, Wait, deadline_after};
use vtn_utils::task::{Job, WorkerContext};

use crate::debug::Debug;
use crate::error::Error;
use crate::southbound::{Southbound, SwitchLocality};

/// Write-once result slot of a flow modification task.
///
/// Waiters that give up observe TIMEDOUT or INTERRUPTED, but the stored
/// result is left untouched.
#[derive(Debug, Default)]
pub struct TaskResult(Monitor<Option<FlowModResult>>);

/// Where a flow modification task was requested from.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum FlowModScope {
    // Requested by this node for a switch it owns.
    Local,
    // Requested by another cluster node, for a switch that may or may not be
    // owned by this node.
    Cluster,
}

/// Installs or uninstalls a single flow entry.
#[derive(Debug)]
pub struct FlowModTask {
    op: FlowModOp,
    scope: FlowModScope,
    entry: Option<FlowEntry>,
    southbound: Southbound,
    result: TaskResult,
    // Whether the result was produced by the owner of the switch.
    owned: AtomicBool,
}

// ===== impl TaskResult =====

impl TaskResult {
    pub fn new() -> TaskResult {
        Default::default()
    }

    /// Stores the result unless one was already stored. Returns whether the
    /// result was stored.
    pub fn set(&self, result: FlowModResult) -> bool {
        self.0.update(|slot| {
            if slot.is_some() {
                return false;
            }
            *slot = Some(result);
            true
        })
    }

    /// Returns the stored result without waiting.
    pub fn peek(&self) -> Option<FlowModResult> {
        *self.0.lock()
    }

    /// Waits for the result for at most `timeout`.
    pub fn wait(
        &self,
        timeout: Duration,
        interrupter: Option<&Interrupter>,
    ) -> FlowModResult {
        let deadline = deadline_after(timeout);
        match self.0.wait_until(deadline, interrupter, |slot| *slot) {
            Wait::Ready(result) => result,
            Wait::TimedOut => FlowModResult::TimedOut,
            Wait::Interrupted => FlowModResult::Interrupted,
        }
    }
}

// ===== impl FlowModTask =====

impl FlowModTask {
    pub fn new(
        op: FlowModOp,
        scope: FlowModScope,
        entry: Option<FlowEntry>,
        southbound: Southbound,
    ) -> FlowModTask {
        FlowModTask {
            op,
            scope,
            entry,
            southbound,
            result: TaskResult::new(),
            owned: AtomicBool::new(scope == FlowModScope::Local),
        }
    }

    pub fn op(&self) -> FlowModOp {
        self.op
    }

    pub fn scope(&self) -> FlowModScope {
        self.scope
    }

    pub fn flow_entry(&self) -> Option<&FlowEntry> {
        self.entry.as_ref()
    }

    /// Forces the result of the task. Has no effect once a result is set.
    pub fn set_result(&self, succeeded: bool) -> bool {
        self.result.set(FlowModResult::from_bool(succeeded))
    }

    pub fn get_result(&self, timeout: Duration) -> FlowModResult {
        self.result.wait(timeout, None)
    }

    pub fn get_result_interruptible(
        &self,
        timeout: Duration,
        interrupter: &Interrupter,
    ) -> FlowModResult {
        self.result.wait(timeout, Some(interrupter))
    }

    /// Result to report to the node that requested the modification.
    ///
    /// Nodes that don't own the target switch report IGNORED so that the
    /// requester keeps waiting for the owner.
    pub fn reply_result(&self) -> Option<FlowModResult> {
        let result = self.result.peek()?;
        if self.owned.load(Ordering::Acquire) {
            Some(result)
        } else {
            Some(FlowModResult::Ignored)
        }
    }

    fn program(&self, entry: &FlowEntry) -> FlowModResult {
        let programmer = &self.southbound.programmer;
        let timeout = self.southbound.timeout;

        Debug::EntryModStart(self.op, entry).log();
        let ret = match self.op {
            FlowModOp::Add => programmer.install_entry(entry, timeout),
            FlowModOp::Remove => programmer.uninstall_entry(entry, timeout),
        };
        let result = match ret {
            Ok(()) => FlowModResult::Succeeded,
            Err(error) => {
                error.log(entry);
                FlowModResult::Failed
            }
        };
        Debug::EntryModDone(self.op, entry, result).log();
        result
    }
}

impl Job for FlowModTask {
    type Error = Error;

    fn run(&self, _cx: &WorkerContext) -> Result<(), Error> {
        let Some(entry) = &self.entry else {
            return Ok(());
        };

        if self.scope == FlowModScope::Cluster {
            if self.southbound.locality(entry.switch) != SwitchLocality::Local
            {
                Debug::EntryNotOwned(entry).log();
                self.result.set(FlowModResult::Succeeded);
                return Ok(());
            }
            self.owned.store(true, Ordering::Release);
        }

        let result = self.program(entry);
        self.result.set(result);
        Ok(())
    }
}

// ===== unit tests =====

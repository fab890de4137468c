//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::sync::Arc;
use std::time::Duration;

use tracing::debug_span;
use vtn_utils::cluster::ClusterEventId;
use vtn_utils::flow::{FlowEntry, FlowModOp, FlowModResult};
use vtn_utils::sync::{Interrupter, deadline_after};
use vtn_utils::task::{Job, WorkerContext};

use crate::FlowContext;
use crate::debug::Debug;
use crate::error::Error;
use crate::flowdb::{FlowDatabase, VtnFlow};
use crate::fmod::{FlowModScope, FlowModTask, TaskResult};
use crate::remote::RemoteFlowRequest;
use crate::southbound::SwitchLocality;

/// Installs or uninstalls all the entries of a logical flow across the
/// cluster.
///
/// Entries on switches owned by this node are programmed directly, the others
/// are handed over to their owners through the cluster event map.
#[derive(Debug)]
pub struct FlowTask {
    op: FlowModOp,
    flow: VtnFlow,
    db: Arc<FlowDatabase>,
    // Time given to the other nodes to program their part of the flow.
    timeout: Duration,
    ctx: Arc<FlowContext>,
    result: TaskResult,
}

// Flow entries split by the locality of their switches.
#[derive(Debug, Default)]
struct EntrySplit<'a> {
    local: Vec<&'a FlowEntry>,
    remote: Vec<&'a FlowEntry>,
    disconnected: Vec<&'a FlowEntry>,
}

// Remote part of an in-progress flow modification.
struct PendingRequest {
    id: ClusterEventId,
    request: Arc<RemoteFlowRequest>,
}

// ===== impl FlowTask =====

impl FlowTask {
    pub(crate) fn new(
        op: FlowModOp,
        flow: VtnFlow,
        db: Arc<FlowDatabase>,
        timeout: Duration,
        ctx: Arc<FlowContext>,
    ) -> FlowTask {
        FlowTask {
            op,
            flow,
            db,
            timeout,
            ctx,
            result: TaskResult::new(),
        }
    }

    pub fn op(&self) -> FlowModOp {
        self.op
    }

    pub fn flow(&self) -> &VtnFlow {
        &self.flow
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

    fn split(&self) -> EntrySplit<'_> {
        let mut split = EntrySplit::default();
        for entry in self.flow.entries() {
            match self.ctx.southbound.locality(entry.switch) {
                SwitchLocality::Local => split.local.push(entry),
                SwitchLocality::Remote => split.remote.push(entry),
                SwitchLocality::Disconnected => {
                    Debug::EntryDisconnected(self.op, entry).log();
                    split.disconnected.push(entry);
                }
            }
        }
        split
    }

    // Programs the given entries on the local switches, in order. Returns the
    // entries that were programmed successfully.
    fn modify_local<'a>(
        &self,
        cx: &WorkerContext,
        op: FlowModOp,
        entries: &[&'a FlowEntry],
        stop_on_failure: bool,
    ) -> (bool, Vec<&'a FlowEntry>) {
        let mut succeeded = true;
        let mut done = Vec::with_capacity(entries.len());
        for entry in entries {
            // Running the task inline keeps workers from waiting on each
            // other.
            let task = FlowModTask::new(
                op,
                FlowModScope::Local,
                Some((*entry).clone()),
                self.ctx.southbound.clone(),
            );
            if let Err(error) = task.run(cx) {
                error.log();
            }
            if task.get_result(Duration::ZERO).is_succeeded() {
                done.push(*entry);
            } else {
                succeeded = false;
                if stop_on_failure {
                    break;
                }
            }
        }
        (succeeded, done)
    }

    fn install(&self, cx: &WorkerContext) -> bool {
        let succeeded = self.install_entries(cx);
        if !succeeded {
            // Release the ingress entry of the failed flow.
            self.db.remove(self.flow.id());
        }
        succeeded
    }

    fn install_entries(&self, cx: &WorkerContext) -> bool {
        let split = self.split();
        if !split.disconnected.is_empty() {
            return false;
        }

        // Hand over the remote part first so the other nodes work in
        // parallel.
        let pending = match self.post_request(FlowModOp::Add, &split.remote) {
            Ok(pending) => pending,
            Err(error) => {
                error.log();
                return false;
            }
        };

        let deadline = deadline_after(self.timeout);
        let (mut succeeded, installed) =
            self.modify_local(cx, FlowModOp::Add, &split.local, true);
        if let Some(pending) = &pending {
            if succeeded {
                succeeded = pending.request.get_result_abs_interruptible(
                    deadline,
                    false,
                    cx.interrupter(),
                );
            }
            if !succeeded {
                // The removal of the remote entries must not overtake their
                // installation.
                pending.request.get_result_abs_interruptible(
                    deadline,
                    true,
                    cx.interrupter(),
                );
            }
            self.ctx.finish_request(&pending.id);
        }

        if !succeeded {
            let remote = pending.is_some().then_some(split.remote.as_slice());
            self.rollback(cx, &installed, remote);
        }
        succeeded
    }

    fn uninstall(&self, cx: &WorkerContext) -> bool {
        // Entries on disconnected switches are gone already.
        let split = self.split();

        let pending = match self.post_request(FlowModOp::Remove, &split.remote)
        {
            Ok(pending) => pending,
            Err(error) => {
                error.log();
                None
            }
        };
        let mut succeeded = pending.is_some() || split.remote.is_empty();

        let deadline = deadline_after(self.timeout);
        let (local_succeeded, _) =
            self.modify_local(cx, FlowModOp::Remove, &split.local, false);
        succeeded &= local_succeeded;
        if let Some(pending) = pending {
            succeeded &= pending.request.get_result_abs_interruptible(
                deadline,
                true,
                cx.interrupter(),
            );
            self.ctx.finish_request(&pending.id);
        }
        succeeded
    }

    // Undoes a partially installed flow.
    fn rollback(
        &self,
        cx: &WorkerContext,
        installed: &[&FlowEntry],
        remote: Option<&[&FlowEntry]>,
    ) {
        Debug::FlowRollback(&self.flow).log();
        self.modify_local(cx, FlowModOp::Remove, installed, false);
        if let Some(remote) = remote
            && let Err(error) = self.ctx.notify(FlowModOp::Remove, remote)
        {
            error.log();
        }
    }

    fn post_request(
        &self,
        op: FlowModOp,
        entries: &[&FlowEntry],
    ) -> Result<Option<PendingRequest>, Error> {
        if entries.is_empty() {
            return Ok(None);
        }
        let (id, request) = self.ctx.post_request(op, entries)?;
        Ok(Some(PendingRequest { id, request }))
    }
}

impl Job for FlowTask {
    type Error = Error;

    fn run(&self, cx: &WorkerContext) -> Result<(), Error> {
        let span = debug_span!("flow", tenant = %self.flow.tenant(), id = %self.flow.id());
        let _span_guard = span.enter();

        Debug::FlowModStart(self.op, &self.flow).log();
        let succeeded = match self.op {
            FlowModOp::Add => self.install(cx),
            FlowModOp::Remove => self.uninstall(cx),
        };
        let result = FlowModResult::from_bool(succeeded);
        Debug::FlowModDone(self.op, &self.flow, result).log();
        self.result.set(result);
        Ok(())
    }
}

//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

#![warn(rust_2018_idioms)]

pub mod cluster;
pub mod config;
mod debug;
pub mod error;
pub mod flow_task;
pub mod flowdb;
pub mod fmod;
pub mod remote;
pub mod southbound;

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tracing::debug;
use vtn_utils::cluster::{ClusterEventId, ClusterNodeId, SubscriptionId};
use vtn_utils::flow::{FlowEntry, FlowModOp};
use vtn_utils::task::WorkerPool;

pub use crate::config::Config;
use crate::cluster::{FlowEvent, FlowEventMap, FlowModRequestMsg};
use crate::debug::Debug;
use crate::error::Error;
use crate::flow_task::FlowTask;
use crate::flowdb::{FlowDatabase, FlowDependency, FlowId, VtnFlow};
use crate::fmod::{FlowModScope, FlowModTask};
use crate::remote::RemoteFlowRequest;
use crate::southbound::{ClusterTopology, FlowProgrammer, Southbound};

/// Entry point of the flow coordination subsystem of a cluster node.
#[derive(Debug)]
pub struct FlowManager {
    ctx: Arc<FlowContext>,
    subscription: SubscriptionId,
}

// State shared by the flow manager, its tasks and the cluster event listener.
#[derive(Debug)]
pub(crate) struct FlowContext {
    pub config: Config,
    pub southbound: Southbound,
    // Cluster event map shared with the other nodes.
    pub events: Arc<FlowEventMap>,
    pub pool: WorkerPool,
    // Remote requests awaiting results, keyed by their event ID.
    pub requests: Mutex<BTreeMap<ClusterEventId, Arc<RemoteFlowRequest>>>,
    pub next_seq: AtomicU64,
    // Flow databases, keyed by tenant name.
    pub databases: Mutex<BTreeMap<String, Arc<FlowDatabase>>>,
}

// ===== impl FlowManager =====

impl FlowManager {
    /// Starts the worker pool and subscribes to the cluster event map.
    pub fn new(
        config: Config,
        programmer: Arc<dyn FlowProgrammer>,
        topology: Arc<dyn ClusterTopology>,
        events: Arc<FlowEventMap>,
    ) -> Result<FlowManager, Error> {
        let pool = WorkerPool::new(
            "vtn-flow",
            config.workers,
            config.worker_idle_timeout(),
        )
        .map_err(Error::PoolStart)?;
        let southbound =
            Southbound::new(programmer, topology, config.flow_mod_timeout());
        let ctx = Arc::new(FlowContext {
            config,
            southbound,
            events: events.clone(),
            pool,
            requests: Default::default(),
            next_seq: AtomicU64::new(1),
            databases: Default::default(),
        });

        let child_ctx = Arc::downgrade(&ctx);
        let subscription = events.subscribe(move |id, event| {
            if let Some(ctx) = child_ctx.upgrade() {
                cluster::process_event(&ctx, id, event);
            }
        });

        debug!(node = %ctx.local_node(), "flow manager started");
        Ok(FlowManager { ctx, subscription })
    }

    pub fn config(&self) -> &Config {
        &self.ctx.config
    }

    pub fn local_node(&self) -> ClusterNodeId {
        self.ctx.local_node()
    }

    /// Returns the flow database of the given tenant, creating it if needed.
    pub fn flow_db(&self, tenant: &str) -> Arc<FlowDatabase> {
        self.ctx
            .databases
            .lock()
            .unwrap()
            .entry(tenant.to_owned())
            .or_insert_with(|| Arc::new(FlowDatabase::new(tenant)))
            .clone()
    }

    pub fn tenants(&self) -> Vec<String> {
        self.ctx.databases.lock().unwrap().keys().cloned().collect()
    }

    /// Stores the flow and schedules its installation.
    ///
    /// Fails without scheduling anything if the flow is already stored or if
    /// its ingress entry is used by another flow of the tenant. A flow that
    /// fails to install is dropped from the database.
    pub fn install_flow(
        &self,
        db: &Arc<FlowDatabase>,
        flow: VtnFlow,
    ) -> Result<Arc<FlowTask>, Error> {
        let id = flow.id();
        db.insert(flow.clone())?;
        let timeout = self.ctx.config.remote_flow_mod_timeout();
        self.submit(FlowModOp::Add, flow, db, timeout).inspect_err(|_| {
            db.remove(id);
        })
    }

    /// Removes the flow from the database and schedules its uninstallation.
    /// Returns None if the flow doesn't exist.
    pub fn uninstall_flow(
        &self,
        db: &Arc<FlowDatabase>,
        id: FlowId,
    ) -> Result<Option<Arc<FlowTask>>, Error> {
        let Some(flow) = db.remove(id) else {
            return Ok(None);
        };
        let timeout = self.ctx.config.remote_flow_mod_timeout();
        self.submit(FlowModOp::Remove, flow, db, timeout).map(Some)
    }

    /// Uninstalls every flow, of any tenant, depending on the given resource.
    pub fn uninstall_by_dependency(
        &self,
        dependency: &FlowDependency,
    ) -> Result<Vec<Arc<FlowTask>>, Error> {
        let databases = self
            .ctx
            .databases
            .lock()
            .unwrap()
            .values()
            .cloned()
            .collect::<Vec<_>>();

        let mut tasks = vec![];
        for db in databases {
            let flows = db.remove_by_dependency(dependency);
            if flows.is_empty() {
                continue;
            }
            Debug::FlowInvalidate(dependency, flows.len()).log();
            tasks.extend(self.submit_bulk(&db, flows)?);
        }
        Ok(tasks)
    }

    /// Drops the flow database of a tenant and uninstalls all its flows.
    pub fn remove_tenant(
        &self,
        tenant: &str,
    ) -> Result<Vec<Arc<FlowTask>>, Error> {
        let Some(db) = self.ctx.databases.lock().unwrap().remove(tenant) else {
            return Ok(vec![]);
        };
        let flows = db.clear();
        self.submit_bulk(&db, flows)
    }

    /// Schedules the modification of a single flow entry on a local switch.
    pub fn modify_entry(
        &self,
        op: FlowModOp,
        entry: FlowEntry,
    ) -> Result<Arc<FlowModTask>, Error> {
        let task = Arc::new(FlowModTask::new(
            op,
            FlowModScope::Local,
            Some(entry),
            self.ctx.southbound.clone(),
        ));
        if !self.ctx.pool.execute(task.clone()) {
            return Err(Error::PoolShutdown);
        }
        Ok(task)
    }

    /// Stops accepting work and waits for the scheduled tasks to complete.
    /// Returns false if the timeout expired first.
    pub fn shutdown(&self, timeout: Duration) -> bool {
        // Draining tasks may still be waiting for remote results.
        self.ctx.pool.shutdown();
        let joined = self.ctx.pool.join(timeout);
        self.ctx.events.unsubscribe(self.subscription);
        joined
    }

    /// Stops accepting work, discards the scheduled tasks and interrupts the
    /// running ones. Returns false if the workers didn't exit in time.
    pub fn terminate(&self, timeout: Duration) -> bool {
        self.ctx.pool.terminate();
        let joined = self.ctx.pool.join(timeout);
        self.ctx.events.unsubscribe(self.subscription);
        joined
    }

    fn submit(
        &self,
        op: FlowModOp,
        flow: VtnFlow,
        db: &Arc<FlowDatabase>,
        timeout: Duration,
    ) -> Result<Arc<FlowTask>, Error> {
        let task = Arc::new(FlowTask::new(
            op,
            flow,
            db.clone(),
            timeout,
            self.ctx.clone(),
        ));
        if !self.ctx.pool.execute(task.clone()) {
            return Err(Error::PoolShutdown);
        }
        Ok(task)
    }

    fn submit_bulk(
        &self,
        db: &Arc<FlowDatabase>,
        flows: Vec<VtnFlow>,
    ) -> Result<Vec<Arc<FlowTask>>, Error> {
        let timeout = self.ctx.config.remote_bulk_flow_mod_timeout();
        flows
            .into_iter()
            .map(|flow| self.submit(FlowModOp::Remove, flow, db, timeout))
            .collect()
    }
}

impl Drop for FlowManager {
    fn drop(&mut self) {
        self.ctx.events.unsubscribe(self.subscription);
    }
}

// ===== impl FlowContext =====

impl FlowContext {
    pub(crate) fn local_node(&self) -> ClusterNodeId {
        self.southbound.topology.local_node()
    }

    pub(crate) fn next_event_id(&self) -> ClusterEventId {
        ClusterEventId {
            origin: self.local_node(),
            seq: self.next_seq.fetch_add(1, Ordering::Relaxed),
        }
    }

    // Asks the other nodes to program the given entries. The returned request
    // collects their results until `finish_request` is called.
    pub(crate) fn post_request(
        &self,
        op: FlowModOp,
        entries: &[&FlowEntry],
    ) -> Result<(ClusterEventId, Arc<RemoteFlowRequest>), Error> {
        let id = self.next_event_id();
        let request = Arc::new(RemoteFlowRequest::new(
            entries.iter().copied(),
            self.southbound.topology.remote_nodes(),
        ));

        // Results may arrive before `put` returns.
        self.requests.lock().unwrap().insert(id, request.clone());
        Debug::RemoteRequestPost(&id, op, entries.len()).log();
        if let Err(error) = self.events.put(id, request_event(op, entries)) {
            self.requests.lock().unwrap().remove(&id);
            return Err(error.into());
        }
        Ok((id, request))
    }

    pub(crate) fn finish_request(&self, id: &ClusterEventId) {
        self.requests.lock().unwrap().remove(id);
        self.events.remove(id);
    }

    // Asks the other nodes to program the given entries, without waiting for
    // their results.
    pub(crate) fn notify(
        &self,
        op: FlowModOp,
        entries: &[&FlowEntry],
    ) -> Result<(), Error> {
        let id = self.next_event_id();
        Debug::RemoteRequestPost(&id, op, entries.len()).log();
        self.events.put(id, request_event(op, entries))?;
        // Listeners have seen the event by now.
        self.events.remove(&id);
        Ok(())
    }
}

// ===== helper functions =====

fn request_event(op: FlowModOp, entries: &[&FlowEntry]) -> FlowEvent {
    let entries = entries.iter().map(|entry| (*entry).clone()).collect();
    FlowEvent::FlowModRequest(FlowModRequestMsg::new(op, entries))
}

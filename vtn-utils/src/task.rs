//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use tracing::{debug, debug_span, error};

use crate::sync::{Interrupter, Monitor, Wait, deadline_after};

// Lower bound of the queue polling interval.
const IDLE_TIMEOUT_MIN: Duration = Duration::from_millis(1);

/// A unit of work executed by a [`WorkerPool`].
///
/// Errors returned by [`Job::run`] are logged by the worker and otherwise
/// discarded.
pub trait Job: Send + Sync + 'static {
    type Error: std::fmt::Display;

    fn run(&self, cx: &WorkerContext) -> Result<(), Self::Error>;
}

/// Execution context handed to a running [`Job`].
#[derive(Clone, Debug)]
pub struct WorkerContext {
    id: usize,
    interrupter: Interrupter,
}

/// A fixed-size pool of worker threads consuming jobs from a shared queue.
///
/// Dropping the pool shuts it down without waiting for the workers.
#[derive(Debug)]
pub struct WorkerPool {
    inner: Arc<PoolInner>,
}

#[derive(Debug)]
struct PoolInner {
    name: String,
    idle_timeout: Duration,
    queue_tx: Mutex<Option<Sender<Work>>>,
    terminated: AtomicBool,
    interrupters: Vec<Interrupter>,
    // Number of workers that haven't exited yet.
    running: Monitor<usize>,
    handles: Mutex<Vec<thread::JoinHandle<()>>>,
}

type Work = Box<dyn FnOnce(&WorkerContext) + Send>;

// Accounts for a running worker until dropped.
struct RunningGuard<'a>(&'a PoolInner);

// ===== impl Job =====

impl<J: Job> Job for Arc<J> {
    type Error = J::Error;

    fn run(&self, cx: &WorkerContext) -> Result<(), Self::Error> {
        (**self).run(cx)
    }
}

// ===== impl WorkerContext =====

impl WorkerContext {
    pub fn new(id: usize, interrupter: Interrupter) -> WorkerContext {
        WorkerContext { id, interrupter }
    }

    pub fn id(&self) -> usize {
        self.id
    }

    /// Returns the interrupter fired when the pool is terminated.
    pub fn interrupter(&self) -> &Interrupter {
        &self.interrupter
    }
}

// ===== impl WorkerPool =====

impl WorkerPool {
    /// Spawns `workers` threads named after the pool.
    ///
    /// Idle workers wake up every `idle_timeout` to check whether the pool is
    /// being terminated.
    pub fn new(
        name: &str,
        workers: usize,
        idle_timeout: Duration,
    ) -> std::io::Result<WorkerPool> {
        let (queue_tx, queue_rx) = crossbeam_channel::unbounded();
        let inner = Arc::new(PoolInner {
            name: name.to_owned(),
            idle_timeout: idle_timeout.max(IDLE_TIMEOUT_MIN),
            queue_tx: Mutex::new(Some(queue_tx)),
            terminated: AtomicBool::new(false),
            interrupters: (0..workers).map(|_| Interrupter::new()).collect(),
            running: Monitor::new(0),
            handles: Default::default(),
        });
        let pool = WorkerPool { inner };

        for id in 0..workers {
            let cx = WorkerContext::new(id, pool.inner.interrupters[id].clone());
            let inner = pool.inner.clone();
            let queue_rx = queue_rx.clone();

            pool.inner.running.update(|running| *running += 1);
            let spawned = thread::Builder::new()
                .name(format!("{name}-{id}"))
                .spawn(move || worker_loop(&inner, queue_rx, cx));
            match spawned {
                Ok(handle) => pool.inner.handles.lock().unwrap().push(handle),
                Err(error) => {
                    pool.inner.running.update(|running| *running -= 1);
                    pool.terminate();
                    return Err(error);
                }
            }
        }

        debug!(name = %pool.inner.name, %workers, "worker pool started");
        Ok(pool)
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn workers(&self) -> usize {
        self.inner.interrupters.len()
    }

    /// Returns whether the pool stopped accepting jobs.
    pub fn is_shutdown(&self) -> bool {
        self.inner.queue_tx.lock().unwrap().is_none()
    }

    /// Queues a job for execution. Returns false if the pool was shut down or
    /// terminated, in which case the job is dropped without running.
    pub fn execute<J: Job>(&self, job: J) -> bool {
        let work: Work = Box::new(move |cx| {
            if let Err(error) = job.run(cx) {
                error!(%error, "job failed");
            }
        });

        let queue_tx = self.inner.queue_tx.lock().unwrap();
        match queue_tx.as_ref() {
            Some(queue_tx) => queue_tx.send(work).is_ok(),
            None => {
                debug!(name = %self.inner.name, "pool is shut down, rejecting job");
                false
            }
        }
    }

    /// Stops accepting jobs. Queued and running jobs are still executed.
    pub fn shutdown(&self) {
        if self.inner.queue_tx.lock().unwrap().take().is_some() {
            debug!(name = %self.inner.name, "worker pool shutting down");
        }
    }

    /// Stops accepting jobs, discards the queued ones and interrupts the
    /// running ones.
    pub fn terminate(&self) {
        self.inner.terminated.store(true, Ordering::SeqCst);
        self.inner.queue_tx.lock().unwrap().take();
        for interrupter in &self.inner.interrupters {
            interrupter.interrupt();
        }
        debug!(name = %self.inner.name, "worker pool terminated");
    }

    /// Waits for all workers to exit. Returns false if the timeout expired
    /// first.
    pub fn join(&self, timeout: Duration) -> bool {
        let deadline = deadline_after(timeout);
        let ret = self.inner.running.wait_until(deadline, None, |running| {
            (*running == 0).then_some(())
        });
        if ret != Wait::Ready(()) {
            return false;
        }

        // Reap the exited threads.
        let handles = std::mem::take(&mut *self.inner.handles.lock().unwrap());
        for handle in handles {
            let _ = handle.join();
        }
        true
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

// ===== impl RunningGuard =====

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.running.update(|running| *running -= 1);
    }
}

// ===== helper functions =====

fn worker_loop(inner: &PoolInner, queue_rx: Receiver<Work>, cx: WorkerContext) {
    let _running = RunningGuard(inner);
    let span = debug_span!("worker", pool = %inner.name, id = cx.id);
    let _span_guard = span.enter();

    loop {
        if inner.terminated.load(Ordering::SeqCst) {
            break;
        }

        match queue_rx.recv_timeout(inner.idle_timeout) {
            Ok(work) => {
                if inner.terminated.load(Ordering::SeqCst) {
                    debug!("discarding queued job");
                    break;
                }

                // A panicking job must not take the worker down with it.
                if panic::catch_unwind(AssertUnwindSafe(|| work(&cx))).is_err()
                {
                    error!("job panicked");
                }

                // Interrupts aimed at the finished job are stale.
                cx.interrupter.clear();
            }
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }

    debug!("worker exiting");
}

// ===== unit tests =====

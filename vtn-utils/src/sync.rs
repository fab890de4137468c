//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

/// A handle that can be used to interrupt threads blocked in
/// [`Monitor::wait_until`].
///
/// Interrupting sets a sticky flag and wakes up every monitor a waiter holding
/// this handle is currently blocked on. The flag is consumed by the waiter
/// that observes it.
#[derive(Clone, Default)]
pub struct Interrupter(Arc<InterrupterInner>);

#[derive(Default)]
struct InterrupterInner {
    interrupted: AtomicBool,
    next_id: AtomicU64,
    wakeups: Mutex<Vec<(u64, Wakeup)>>,
}

type Wakeup = Box<dyn Fn() + Send + Sync>;

// Unregisters a wakeup callback when dropped.
struct WakeupGuard<'a> {
    interrupter: &'a Interrupter,
    id: u64,
}

/// A mutex-protected state paired with a condition variable.
#[derive(Debug)]
pub struct Monitor<T>(Arc<MonitorInner<T>>);

#[derive(Debug)]
struct MonitorInner<T> {
    state: Mutex<T>,
    cond: Condvar,
}

/// Outcome of a [`Monitor::wait_until`] call.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Wait<R> {
    Ready(R),
    TimedOut,
    Interrupted,
}

// ===== impl Interrupter =====

impl Interrupter {
    pub fn new() -> Interrupter {
        Default::default()
    }

    /// Sets the interrupt flag and wakes up the current waiters.
    pub fn interrupt(&self) {
        self.0.interrupted.store(true, Ordering::SeqCst);

        let wakeups = self.0.wakeups.lock().unwrap();
        for (_, wakeup) in wakeups.iter() {
            (wakeup)();
        }
    }

    pub fn is_interrupted(&self) -> bool {
        self.0.interrupted.load(Ordering::SeqCst)
    }

    /// Clears the interrupt flag, returning whether it was set.
    pub fn clear(&self) -> bool {
        self.0.interrupted.swap(false, Ordering::SeqCst)
    }

    fn register(&self, wakeup: Wakeup) -> WakeupGuard<'_> {
        let id = self.0.next_id.fetch_add(1, Ordering::Relaxed);
        self.0.wakeups.lock().unwrap().push((id, wakeup));
        WakeupGuard {
            interrupter: self,
            id,
        }
    }
}

impl std::fmt::Debug for Interrupter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Interrupter")
            .field("interrupted", &self.is_interrupted())
            .finish()
    }
}

// ===== impl WakeupGuard =====

impl Drop for WakeupGuard<'_> {
    fn drop(&mut self) {
        let mut wakeups = self.interrupter.0.wakeups.lock().unwrap();
        wakeups.retain(|(id, _)| *id != self.id);
    }
}

// ===== impl Monitor =====

impl<T> Monitor<T> {
    pub fn new(state: T) -> Monitor<T> {
        Monitor(Arc::new(MonitorInner {
            state: Mutex::new(state),
            cond: Condvar::new(),
        }))
    }

    /// Locks the state without notifying waiters.
    pub fn lock(&self) -> MutexGuard<'_, T> {
        self.0.state.lock().unwrap()
    }

    /// Mutates the state and wakes up all waiters while still holding the
    /// lock.
    pub fn update<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        let mut state = self.lock();
        let ret = f(&mut state);
        self.0.cond.notify_all();
        ret
    }

    /// Blocks until `ready` returns a value, the deadline passes, or the
    /// optional interrupter fires.
    ///
    /// `ready` is evaluated under the lock before every sleep and after every
    /// wakeup. The remaining time is recomputed from the absolute deadline on
    /// each iteration, so spurious wakeups only cost another check.
    pub fn wait_until<R, F>(
        &self,
        deadline: Instant,
        interrupter: Option<&Interrupter>,
        mut ready: F,
    ) -> Wait<R>
    where
        T: Send + 'static,
        F: FnMut(&mut T) -> Option<R>,
    {
        // Must be dropped after the state guard below.
        let _wakeup = interrupter.map(|interrupter| {
            let inner = self.0.clone();
            interrupter.register(Box::new(move || {
                let _state = inner.state.lock().unwrap();
                inner.cond.notify_all();
            }))
        });

        let mut state = self.lock();
        loop {
            if let Some(ret) = ready(&mut state) {
                return Wait::Ready(ret);
            }
            if interrupter.is_some_and(|interrupter| interrupter.clear()) {
                return Wait::Interrupted;
            }

            let now = Instant::now();
            if now >= deadline {
                return Wait::TimedOut;
            }
            let (guard, _) =
                self.0.cond.wait_timeout(state, deadline - now).unwrap();
            state = guard;
        }
    }
}

impl<T: Default> Default for Monitor<T> {
    fn default() -> Monitor<T> {
        Monitor::new(T::default())
    }
}

// ===== global functions =====

/// Returns the absolute deadline `timeout` from now, saturating on overflow.
pub fn deadline_after(timeout: Duration) -> Instant {
    let now = Instant::now();
    now.checked_add(timeout)
        .unwrap_or_else(|| now + Duration::from_secs(u32::MAX as u64))
}

// ===== unit tests =====

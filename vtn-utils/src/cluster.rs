//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::sync::{Monitor, Wait, deadline_after};

// Maximum number of events kept in the recently posted buffer.
const POSTED_EVENTS_MAX: usize = 1024;

/// Identifier of a controller instance within the cluster.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[derive(Deserialize, Serialize)]
#[serde(transparent)]
pub struct ClusterNodeId(pub u32);

/// Cluster-wide unique event identifier.
///
/// Events are numbered by the node that posts them.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[derive(Deserialize, Serialize)]
pub struct ClusterEventId {
    pub origin: ClusterNodeId,
    pub seq: u64,
}

/// Handle returned by [`ClusterEventMap::subscribe`].
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct SubscriptionId(usize);

/// Callback invoked for every event posted to a [`ClusterEventMap`].
pub type Listener<K, E> = Arc<dyn Fn(&K, &E) + Send + Sync>;

/// Keyed store of events awaiting delivery to the cluster members.
///
/// Posting an event makes it visible in the map before every subscribed
/// listener is invoked with it. Listeners run on the posting thread, without
/// any internal lock held, so they're free to access the map.
pub struct ClusterEventMap<K, E> {
    state: Monitor<EventMapState<K, E>>,
    listeners: Mutex<BTreeMap<SubscriptionId, Listener<K, E>>>,
    next_subscription: AtomicUsize,
}

struct EventMapState<K, E> {
    active: bool,
    events: BTreeMap<K, E>,
    posted: VecDeque<(K, E)>,
}

/// Error returned when posting to a map that was shut down.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct EventMapClosed;

// ===== impl ClusterNodeId =====

impl std::fmt::Display for ClusterNodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ===== impl ClusterEventId =====

impl std::fmt::Display for ClusterEventId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.origin, self.seq)
    }
}

// ===== impl ClusterEventMap =====

impl<K, E> ClusterEventMap<K, E>
where
    K: Clone + Ord + Send + 'static,
    E: Clone + Send + 'static,
{
    pub fn new() -> ClusterEventMap<K, E> {
        ClusterEventMap {
            state: Monitor::new(EventMapState {
                active: true,
                events: Default::default(),
                posted: Default::default(),
            }),
            listeners: Default::default(),
            next_subscription: AtomicUsize::new(0),
        }
    }

    /// Posts an event, replacing the one stored under the same ID.
    pub fn put(&self, id: K, event: E) -> Result<Option<E>, EventMapClosed> {
        let old = self.state.update(|state| {
            if !state.active {
                return Err(EventMapClosed);
            }
            state.record(&id, &event);
            Ok(state.events.insert(id.clone(), event.clone()))
        })?;

        self.notify(&id, &event);
        Ok(old)
    }

    /// Posts an event unless another one is already stored under the same ID,
    /// in which case the existing event is returned and nobody is notified.
    pub fn put_if_absent(
        &self,
        id: K,
        event: E,
    ) -> Result<Option<E>, EventMapClosed> {
        let existing = self.state.update(|state| {
            if !state.active {
                return Err(EventMapClosed);
            }
            if let Some(existing) = state.events.get(&id) {
                return Ok(Some(existing.clone()));
            }
            state.record(&id, &event);
            state.events.insert(id.clone(), event.clone());
            Ok(None)
        })?;

        if existing.is_none() {
            self.notify(&id, &event);
        }
        Ok(existing)
    }

    pub fn get(&self, id: &K) -> Option<E> {
        self.state.lock().events.get(id).cloned()
    }

    pub fn contains(&self, id: &K) -> bool {
        self.state.lock().events.contains_key(id)
    }

    pub fn remove(&self, id: &K) -> Option<E> {
        self.state.update(|state| state.events.remove(id))
    }

    pub fn clear(&self) {
        self.state.update(|state| state.events.clear());
    }

    pub fn len(&self) -> usize {
        self.state.lock().events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().events.is_empty()
    }

    /// Returns the events posted since the last call, oldest first.
    pub fn get_posted_events(&self) -> Vec<(K, E)> {
        self.state.lock().posted.drain(..).collect()
    }

    pub fn subscribe<F>(&self, listener: F) -> SubscriptionId
    where
        F: Fn(&K, &E) + Send + Sync + 'static,
    {
        let id = SubscriptionId(
            self.next_subscription.fetch_add(1, Ordering::Relaxed),
        );
        self.listeners.lock().unwrap().insert(id, Arc::new(listener));
        id
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.listeners.lock().unwrap().remove(&id).is_some()
    }

    /// Waits until the map is empty. Returns false if the timeout expired
    /// first.
    pub fn wait_for_cleared(&self, timeout: Duration) -> bool {
        let deadline = deadline_after(timeout);
        let ret = self.state.wait_until(deadline, None, |state| {
            state.events.is_empty().then_some(())
        });
        matches!(ret, Wait::Ready(()))
    }

    /// Drops every listener and stored event. Subsequent posts are rejected.
    pub fn shutdown(&self) {
        self.listeners.lock().unwrap().clear();
        self.state.update(|state| {
            state.active = false;
            state.events.clear();
            state.posted.clear();
        });
    }

    fn notify(&self, id: &K, event: &E) {
        let listeners: Vec<_> =
            self.listeners.lock().unwrap().values().cloned().collect();
        for listener in listeners {
            (listener)(id, event);
        }
    }
}

impl<K, E> Default for ClusterEventMap<K, E>
where
    K: Clone + Ord + Send + 'static,
    E: Clone + Send + 'static,
{
    fn default() -> ClusterEventMap<K, E> {
        ClusterEventMap::new()
    }
}

impl<K, E> std::fmt::Debug for ClusterEventMap<K, E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("ClusterEventMap")
            .field("active", &state.active)
            .field("events", &state.events.len())
            .field("posted", &state.posted.len())
            .finish()
    }
}

// ===== impl EventMapState =====

impl<K: Clone, E: Clone> EventMapState<K, E> {
    fn record(&mut self, id: &K, event: &E) {
        if self.posted.len() == POSTED_EVENTS_MAX {
            self.posted.pop_front();
        }
        self.posted.push_back((id.clone(), event.clone()));
    }
}

// ===== impl EventMapClosed =====

impl std::fmt::Display for EventMapClosed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "cluster event map was shut down")
    }
}

impl std::error::Error for EventMapClosed {}

// ===== unit tests =====

//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use tracing::{error, warn};
use vtn_utils::cluster::EventMapClosed;
use vtn_utils::flow::FlowKey;

use crate::flowdb::FlowId;

// Flow coordination errors.
#[derive(Debug)]
pub enum Error {
    // The worker threads couldn't be spawned.
    PoolStart(std::io::Error),
    // The worker pool no longer accepts tasks.
    PoolShutdown,
    // The cluster event map no longer accepts events.
    EventMapClosed(EventMapClosed),
    // A flow with the same ID is already stored.
    FlowExists(String, FlowId),
    // Another flow of the tenant already uses the same ingress entry.
    FlowConflict(String, FlowId, FlowKey),
    // The flow has no entry to install.
    FlowEmpty(String, FlowId),
}

// ===== impl Error =====

impl Error {
    pub(crate) fn log(&self) {
        match self {
            Error::PoolStart(error) => {
                error!(error = %with_source(error), "{}", self);
            }
            Error::PoolShutdown | Error::EventMapClosed(..) => {
                warn!("{}", self);
            }
            Error::FlowConflict(tenant, id, key) => {
                warn!(%tenant, %id, switch = %key.switch, priority = %key.priority, "{}", self);
            }
            Error::FlowExists(tenant, id) | Error::FlowEmpty(tenant, id) => {
                warn!(%tenant, %id, "{}", self);
            }
        }
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::PoolStart(..) => {
                write!(f, "failed to start worker threads")
            }
            Error::PoolShutdown => {
                write!(f, "worker pool is shut down")
            }
            Error::EventMapClosed(..) => {
                write!(f, "failed to post cluster event")
            }
            Error::FlowExists(..) => {
                write!(f, "flow already exists")
            }
            Error::FlowConflict(..) => {
                write!(f, "ingress flow entry already in use")
            }
            Error::FlowEmpty(..) => {
                write!(f, "flow has no entries")
            }
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::PoolStart(error) => Some(error),
            Error::EventMapClosed(error) => Some(error),
            _ => None,
        }
    }
}

impl From<EventMapClosed> for Error {
    fn from(error: EventMapClosed) -> Error {
        Error::EventMapClosed(error)
    }
}

// ===== global functions =====

fn with_source<E: std::error::Error>(error: E) -> String {
    if let Some(source) = error.source() {
        format!("{} ({})", error, with_source(source))
    } else {
        error.to_string()
    }
}

//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::time::Duration;

use serde::Deserialize;

/// Flow coordination settings. Timeouts are expressed in milliseconds.
#[derive(Clone, Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    // Number of threads executing flow modification tasks.
    pub workers: usize,
    // How long an idle worker waits for the queue before re-checking the
    // pool state.
    pub worker_idle_timeout: u64,
    // Time given to the switch to program a single flow entry.
    pub flow_mod_timeout: u64,
    // Time given to the other cluster nodes to program the remote part of a
    // single flow.
    pub remote_flow_mod_timeout: u64,
    // Same as above, for flows removed in bulk.
    pub remote_bulk_flow_mod_timeout: u64,
}

// ===== impl Config =====

impl Config {
    pub fn worker_idle_timeout(&self) -> Duration {
        Duration::from_millis(self.worker_idle_timeout)
    }

    pub fn flow_mod_timeout(&self) -> Duration {
        Duration::from_millis(self.flow_mod_timeout)
    }

    pub fn remote_flow_mod_timeout(&self) -> Duration {
        Duration::from_millis(self.remote_flow_mod_timeout)
    }

    pub fn remote_bulk_flow_mod_timeout(&self) -> Duration {
        Duration::from_millis(self.remote_bulk_flow_mod_timeout)
    }
}

impl Default for Config {
    fn default() -> Config {
        Config {
            workers: 4,
            worker_idle_timeout: 3000,
            flow_mod_timeout: 3000,
            remote_flow_mod_timeout: 5000,
            remote_bulk_flow_mod_timeout: 15000,
        }
    }
}

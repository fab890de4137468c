//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

#![allow(clippy::derivable_impls)]

use serde::Deserialize;
use vtn_utils::flow::{FlowMatch, VLAN_NONE, VlanId};
use vtn_utils::mac_addr::MacAddr;

#[derive(Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub node_id: u32,
    pub cluster: Cluster,
    pub flow: vtn_flow::Config,
    // Flows installed at startup.
    pub flows: Vec<StaticFlow>,
    pub logging: Logging,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Cluster {
    // Number of other controller instances.
    pub remote_nodes: usize,
    pub switches: Vec<Switch>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Switch {
    pub dpid: u64,
    // Node holding the connection to the switch.
    pub owner: u32,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StaticFlow {
    pub tenant: String,
    #[serde(default = "StaticFlow::default_priority")]
    pub priority: u16,
    #[serde(default)]
    pub idle_timeout: u16,
    #[serde(default)]
    pub hard_timeout: u16,
    pub hops: Vec<Hop>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Hop {
    pub dpid: u64,
    pub in_port: u32,
    pub out_port: u32,
    // VLAN of the incoming and outgoing packets.
    #[serde(default)]
    pub in_vlan: VlanId,
    #[serde(default)]
    pub out_vlan: VlanId,
    // Optional L2 match fields.
    #[serde(default)]
    pub dl_src: Option<MacAddr>,
    #[serde(default)]
    pub dl_dst: Option<MacAddr>,
    #[serde(default)]
    pub dl_type: Option<u16>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Logging {
    pub file: LoggingFile,
    pub stdout: LoggingStdout,
}

#[derive(Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingFile {
    pub enabled: bool,
    pub dir: String,
    pub name: String,
    pub rotation: LoggingFileRotation,
    #[serde(flatten)]
    pub fmt: LoggingFmt,
}

#[derive(Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingStdout {
    pub enabled: bool,
    #[serde(flatten)]
    pub fmt: LoggingFmt,
}

#[derive(Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingFmt {
    pub style: LoggingFmtStyle,
    pub colors: bool,
    pub show_thread_id: bool,
    pub show_source: bool,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoggingFileRotation {
    #[default]
    Never,
    Hourly,
    Daily,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoggingFmtStyle {
    Compact,
    Full,
    Json,
    Pretty,
}

// ===== impl Config =====

impl Config {
    const DFLT_FILEPATH: &'static str = "/etc/vtnd.toml";

    pub(crate) fn load(config_file: Option<&str>) -> Result<Config, String> {
        let config_file = config_file.unwrap_or(Config::DFLT_FILEPATH);

        match std::fs::read_to_string(config_file) {
            Ok(config_str) => toml::from_str(&config_str).map_err(|error| {
                format!("failed to parse configuration file: {error}")
            }),
            Err(error) => {
                eprintln!("Failed to load configuration file: {error}");
                eprintln!("Falling back to default configuration...");
                Ok(Config::default())
            }
        }
    }
}

impl Default for Config {
    fn default() -> Config {
        Config {
            node_id: 1,
            cluster: Default::default(),
            flow: Default::default(),
            flows: Default::default(),
            logging: Default::default(),
        }
    }
}

// ===== impl StaticFlow =====

impl StaticFlow {
    fn default_priority() -> u16 {
        10
    }
}

// ===== impl Hop =====

impl Hop {
    // Returns the packets forwarded by this hop.
    pub(crate) fn flow_match(&self) -> Result<FlowMatch, String> {
        let mut flow_match = FlowMatch::default().with_in_port(self.in_port);
        if self.in_vlan != VLAN_NONE {
            flow_match = flow_match.with_dl_vlan(self.in_vlan);
        }
        if let Some(addr) = self.dl_src {
            if !addr.is_unicast() {
                return Err(format!("invalid source MAC address: {addr}"));
            }
            flow_match = flow_match.with_dl_src(addr);
        }
        if let Some(addr) = self.dl_dst {
            flow_match = flow_match.with_dl_dst(addr);
        }
        if let Some(dl_type) = self.dl_type {
            flow_match = flow_match.with_dl_type(dl_type);
        }
        Ok(flow_match)
    }
}

// ===== impl LoggingFile =====

impl Default for LoggingFile {
    fn default() -> LoggingFile {
        LoggingFile {
            enabled: true,
            dir: "/var/log".to_owned(),
            name: "vtnd.log".to_owned(),
            rotation: Default::default(),
            fmt: Default::default(),
        }
    }
}

// ===== impl LoggingStdout =====

impl Default for LoggingStdout {
    fn default() -> LoggingStdout {
        LoggingStdout {
            enabled: false,
            fmt: Default::default(),
        }
    }
}

// ===== impl LoggingFmt =====

impl Default for LoggingFmt {
    fn default() -> LoggingFmt {
        LoggingFmt {
            style: LoggingFmtStyle::Full,
            colors: false,
            show_thread_id: false,
            show_source: false,
        }
    }
}

// ===== unit tests =====

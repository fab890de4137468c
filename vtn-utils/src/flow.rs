//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use derive_new::new;
use serde::{Deserialize, Serialize};

use crate::mac_addr::MacAddr;

// Useful type definition(s).
pub type VlanId = u16;

/// VLAN ID used to represent untagged frames.
pub const VLAN_NONE: VlanId = 0;

/// Ethernet type of IEEE 802.1Q VLAN tags.
pub const ETHER_TYPE_VLAN: u16 = 0x8100;

/// OpenFlow switch, identified by its datapath ID.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[derive(Deserialize, Serialize)]
#[serde(transparent)]
pub struct SwitchId(pub u64);

/// Physical port of an OpenFlow switch.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[derive(Deserialize, Serialize)]
#[derive(new)]
pub struct SwitchPort {
    pub switch: SwitchId,
    pub port: u32,
}

/// Match predicate of a flow entry. Unset fields are wildcarded.
#[derive(Clone, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[derive(Deserialize, Serialize)]
pub struct FlowMatch {
    pub in_port: Option<u32>,
    pub dl_src: Option<MacAddr>,
    pub dl_dst: Option<MacAddr>,
    pub dl_vlan: Option<VlanId>,
    pub dl_type: Option<u16>,
}

/// Forwarding action applied by a flow entry.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[derive(Deserialize, Serialize)]
pub enum FlowAction {
    PopVlan,
    PushVlan { ether_type: u16 },
    SetVlanId(VlanId),
    Output(u32),
}

/// A single forwarding rule installed on one switch.
#[derive(Clone, Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
#[derive(new)]
pub struct FlowEntry {
    // Unique name of the entry within its logical flow.
    pub name: String,
    pub switch: SwitchId,
    pub priority: u16,
    pub flow_match: FlowMatch,
    pub actions: Vec<FlowAction>,
    #[new(default)]
    pub idle_timeout: u16,
    #[new(default)]
    pub hard_timeout: u16,
}

/// Key identifying a flow entry inside a switch flow table.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct FlowKey {
    pub switch: SwitchId,
    pub priority: u16,
    pub flow_match: FlowMatch,
}

/// Flow modification operation.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub enum FlowModOp {
    Add,
    Remove,
}

/// Outcome of a flow modification.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
#[derive(Deserialize, Serialize)]
pub enum FlowModResult {
    Succeeded,
    Failed,
    TimedOut,
    Interrupted,
    // Reported by a node that doesn't own the target switch.
    Ignored,
}

// ===== impl SwitchId =====

impl std::fmt::Display for SwitchId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "openflow:{}", self.0)
    }
}

// ===== impl SwitchPort =====

impl std::fmt::Display for SwitchPort {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.switch, self.port)
    }
}

// ===== impl FlowMatch =====

impl FlowMatch {
    pub fn with_in_port(mut self, port: u32) -> Self {
        self.in_port = Some(port);
        self
    }

    pub fn with_dl_src(mut self, addr: MacAddr) -> Self {
        self.dl_src = Some(addr);
        self
    }

    pub fn with_dl_dst(mut self, addr: MacAddr) -> Self {
        self.dl_dst = Some(addr);
        self
    }

    pub fn with_dl_vlan(mut self, vlan: VlanId) -> Self {
        self.dl_vlan = Some(vlan);
        self
    }

    pub fn with_dl_type(mut self, dl_type: u16) -> Self {
        self.dl_type = Some(dl_type);
        self
    }
}

// ===== impl FlowAction =====

impl std::fmt::Display for FlowAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FlowAction::PopVlan => write!(f, "pop-vlan"),
            FlowAction::PushVlan { ether_type } => {
                write!(f, "push-vlan({ether_type:#06x})")
            }
            FlowAction::SetVlanId(vlan) => write!(f, "set-vlan-id({vlan})"),
            FlowAction::Output(port) => write!(f, "output({port})"),
        }
    }
}

// ===== impl FlowEntry =====

impl FlowEntry {
    pub fn key(&self) -> FlowKey {
        FlowKey {
            switch: self.switch,
            priority: self.priority,
            flow_match: self.flow_match.clone(),
        }
    }
}

// ===== impl FlowModOp =====

impl std::fmt::Display for FlowModOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FlowModOp::Add => write!(f, "add"),
            FlowModOp::Remove => write!(f, "remove"),
        }
    }
}

// ===== impl FlowModResult =====

impl FlowModResult {
    pub fn from_bool(succeeded: bool) -> FlowModResult {
        if succeeded {
            FlowModResult::Succeeded
        } else {
            FlowModResult::Failed
        }
    }

    pub fn is_succeeded(&self) -> bool {
        *self == FlowModResult::Succeeded
    }
}

impl std::fmt::Display for FlowModResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FlowModResult::Succeeded => write!(f, "succeeded"),
            FlowModResult::Failed => write!(f, "failed"),
            FlowModResult::TimedOut => write!(f, "timed out"),
            FlowModResult::Interrupted => write!(f, "interrupted"),
            FlowModResult::Ignored => write!(f, "ignored"),
        }
    }
}

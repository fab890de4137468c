//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use crate::flow::{ETHER_TYPE_VLAN, FlowAction, SwitchId, VLAN_NONE, VlanId};

/// Builder of the ordered action sequence of a flow entry.
///
/// The list is bound to the switch the entry is installed on and to the VLAN
/// ID of the packets the entry matches, which determines how VLAN rewrites
/// are expressed.
#[derive(Clone, Debug)]
pub struct ActionList {
    switch: SwitchId,
    vlan: VlanId,
    actions: Vec<FlowAction>,
}

// ===== impl ActionList =====

impl ActionList {
    pub fn new(switch: SwitchId, vlan: VlanId) -> ActionList {
        ActionList {
            switch,
            vlan,
            actions: Vec::new(),
        }
    }

    pub fn switch(&self) -> SwitchId {
        self.switch
    }

    // VLAN ID of the packets before the actions are applied.
    pub fn vlan(&self) -> VlanId {
        self.vlan
    }

    /// Appends the actions that rewrite the VLAN ID of the packet to `vlan`.
    pub fn add_vlan_id(&mut self, vlan: VlanId) -> &mut Self {
        if vlan == self.vlan {
            // Already tagged as requested.
            return self;
        }

        if vlan == VLAN_NONE {
            self.actions.push(FlowAction::PopVlan);
        } else {
            if self.vlan == VLAN_NONE {
                self.actions.push(FlowAction::PushVlan {
                    ether_type: ETHER_TYPE_VLAN,
                });
            }
            self.actions.push(FlowAction::SetVlanId(vlan));
        }

        self
    }

    /// Appends an output action. Ports are not deduplicated.
    pub fn add_output(&mut self, port: u32) -> &mut Self {
        self.actions.push(FlowAction::Output(port));
        self
    }

    pub fn get(&self) -> &[FlowAction] {
        &self.actions
    }

    pub fn into_actions(self) -> Vec<FlowAction> {
        self.actions
    }
}

// ===== unit tests =====

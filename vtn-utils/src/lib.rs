//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

#![warn(rust_2018_idioms)]

pub mod action;
pub mod cluster;
pub mod flow;
pub mod mac_addr;
pub mod sync;
pub mod task;

// SPDX-License-Identifier: MIT OR Apache-2.0
//! The device model and lifecycle engine (C1-C3): identity, flags, inhibits, the
//! parent/child/proxy graph, the retry/poll scheduler, and the update state machine.

pub mod appstream;
pub mod core;
pub mod events;
pub mod flags;
pub mod graph;
pub mod inhibit;
pub mod instance_id;
pub mod retry;
pub mod version;

pub use core::{DeviceCore, DeviceOps, UpdateState};
pub use graph::{DeviceArena, DeviceHandle};

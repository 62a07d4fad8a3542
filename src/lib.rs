// SPDX-License-Identifier: MIT OR Apache-2.0
//! Device model and HID++ transport engine for Logitech Unifying/Bolt firmware updates.

pub mod config;
pub mod device;
pub mod error;
pub mod hidpp;
pub mod quirks;

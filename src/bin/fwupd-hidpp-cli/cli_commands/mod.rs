// SPDX-License-Identifier: MIT OR Apache-2.0

pub mod quirk;
pub mod receiver;

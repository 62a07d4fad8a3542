// SPDX-License-Identifier: MIT OR Apache-2.0
//! Bootloader entry: `getMemInfo`/`getBlVersion` common setup plus the Nordic and Texas
//! Instruments write algorithms (§4.7).

pub mod common;
pub mod ihex;
pub mod nordic;
pub mod texas;

pub use common::{BlInfo, MemInfo};
pub use ihex::IntelHexImage;

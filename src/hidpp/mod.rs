// SPDX-License-Identifier: MIT OR Apache-2.0
//! HID++1.0/2.0 transport, feature discovery, peripheral and bootloader device logic, and
//! the Unifying/Bolt receiver runtime (§4.4-§4.8).

pub mod bootloader;
pub mod device;
pub mod features;
pub mod message;
pub mod peripheral;
pub mod rdfu;
pub mod receiver;
pub mod transport;

pub use device::HidppPeripheral;
pub use features::{FeatureId, FeatureMap};
pub use message::{Message, ReportId};
pub use transport::{HidTransport, HidapiTransport};

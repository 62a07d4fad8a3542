// SPDX-License-Identifier: MIT OR Apache-2.0
//! Wires the standalone HID++ peripheral/bootloader functions into [DeviceOps] (§3, §4.3,
//! §4.6): one concrete device kind holding a [DeviceCore] plus a live transport.

use std::time::Duration;

use crate::device::core::{DeviceCore, DeviceOps, UpdateState};
use crate::device::flags::DeviceFlags;
use crate::error::{Error, ErrorKind};
use crate::hidpp::features::{FeatureId, FeatureMap};
use crate::hidpp::peripheral::{self, ProtocolVersion};
use crate::hidpp::transport::HidTransport;

/// A HID++ peripheral paired through a receiver (or wired directly), carrying its own
/// `DeviceCore` plus the state `probe`/`setup`/`detach`/`write_firmware`/`attach` need.
pub struct HidppPeripheral
{
    core: DeviceCore,
    transport: Box<dyn HidTransport>,
    device_index: u8,
    features: FeatureMap,
    protocol: Option<ProtocolVersion>,
    firmware_feature: Option<FeatureId>,
    entity: u8,
    timeout: Duration,
}

impl HidppPeripheral
{
    pub fn new(transport: Box<dyn HidTransport>, device_index: u8) -> Self
    {
        Self {
            core: DeviceCore::new(),
            transport,
            device_index,
            features: FeatureMap::new(),
            protocol: None,
            firmware_feature: None,
            entity: 0,
            timeout: peripheral::setup_timeout(),
        }
    }
}

impl DeviceOps for HidppPeripheral
{
    fn core(&self) -> &DeviceCore
    {
        &self.core
    }

    fn core_mut(&mut self) -> &mut DeviceCore
    {
        &mut self.core
    }

    /// `root.ping`: resolves the protocol version and marks the device unreachable (rather
    /// than failing outright) when it doesn't answer.
    fn probe(&mut self) -> Result<(), Error>
    {
        self.protocol = peripheral::ping(self.transport.as_mut(), self.device_index, self.timeout)?;
        if self.protocol.is_none() {
            self.core.add_flag(DeviceFlags::Unreachable)?;
        }
        Ok(())
    }

    /// Resolves `I_FIRMWARE_INFO`, caches the active entity's version, resolves whichever
    /// DFU feature (Rdfu, then DfuControlBolt, then DfuControlSigned, then classic
    /// DfuControl, checked in that preference order) the peripheral exposes, and reads the
    /// battery level into `DeviceCore`.
    fn setup(&mut self) -> Result<(), Error>
    {
        if !matches!(self.protocol, Some(ProtocolVersion::V2(_))) {
            return Ok(());
        }

        if let Some(fw_index) = self.features.resolve(self.transport.as_mut(), self.device_index, FeatureId::IFirmwareInfo, self.timeout)? {
            let entities = peripheral::enumerate_entities(self.transport.as_mut(), self.device_index, fw_index, self.timeout)?;
            if let Some(active) = peripheral::cached_entity(&entities) {
                self.entity = active.index;
                self.core.version = Some(active.version.clone());
            }
            for entity in &entities {
                if entity.kind == crate::hidpp::peripheral::EntityKind::Bootloader {
                    self.core.version_bootloader = Some(entity.version.clone());
                }
            }
        }

        for feature in [FeatureId::Rdfu, FeatureId::DfuControlBolt, FeatureId::DfuControlSigned, FeatureId::DfuControl] {
            if self.features.resolve(self.transport.as_mut(), self.device_index, feature, self.timeout)?.is_some() {
                self.firmware_feature = Some(feature);
                break;
            }
        }
        if self.firmware_feature.is_some() {
            self.core.add_flag(DeviceFlags::Updatable)?;
        }

        if let Some(level) = peripheral::read_battery(self.transport.as_mut(), self.device_index, &self.features, self.timeout)? {
            let percentage = match level {
                crate::hidpp::peripheral::BatteryLevel::Percentage(p) => p,
                crate::hidpp::peripheral::BatteryLevel::Coarse(p) => p,
            };
            self.core.set_battery_level(percentage);
        }

        Ok(())
    }

    fn detach(&mut self) -> Result<(), Error>
    {
        let feature = self
            .firmware_feature
            .ok_or_else(|| ErrorKind::NotSupported(Some("no DFU feature resolved on this peripheral".into())).error())?;
        let feature_index = self
            .features
            .cached(feature)
            .filter(|&i| i != 0)
            .ok_or_else(|| ErrorKind::Internal("firmware_feature resolved without a cached index").error())?;

        match feature {
            FeatureId::DfuControlSigned => {
                peripheral::detach_signed(self.transport.as_mut(), self.device_index, feature_index, self.timeout)
            },
            _ => peripheral::detach_classic(self.transport.as_mut(), self.device_index, feature_index, false, self.timeout).map(|_| ()),
        }
    }

    fn attach(&mut self) -> Result<(), Error>
    {
        let feature = self
            .firmware_feature
            .ok_or_else(|| ErrorKind::NotSupported(Some("no DFU feature resolved on this peripheral".into())).error())?;
        let feature_index = self.features.cached(feature).filter(|&i| i != 0).unwrap_or(0);
        peripheral::attach_dfu(self.transport.as_mut(), self.device_index, feature_index, self.entity, self.timeout)
    }

    /// Dispatches to the RDFU block/pkt state machine or the classic 16-byte-chunk writer
    /// depending on which feature `setup` resolved.
    fn write_firmware(&mut self, image: &[u8]) -> Result<(), Error>
    {
        let feature = self
            .firmware_feature
            .ok_or_else(|| ErrorKind::NotSupported(Some("no DFU feature resolved on this peripheral".into())).error())?;
        let feature_index = self
            .features
            .cached(feature)
            .filter(|&i| i != 0)
            .ok_or_else(|| ErrorKind::Internal("firmware_feature resolved without a cached index").error())?;

        self.core.set_update_state(UpdateState::Pending);
        let result = if feature == FeatureId::Rdfu {
            let document = crate::hidpp::rdfu::RdfuDocument::parse(std::str::from_utf8(image).map_err(|_| {
                ErrorKind::InvalidFile(Some("RDFU document is not valid UTF-8".into())).error()
            })?)?;
            let content = document
                .contents
                .iter()
                .find(|c| c.entity.parse::<u8>() == Ok(self.entity))
                .ok_or_else(|| ErrorKind::NotFound(Some("no RDFU content entry for this entity".into())).error())?;
            let payload = document
                .payloads
                .get(&content.payload)
                .ok_or_else(|| ErrorKind::InvalidFile(Some("RDFU content references an unknown payload".into())).error())?;
            let magic = crate::hidpp::rdfu::RdfuDocument::magic_bytes(content)?;
            let blocks: Result<Vec<Vec<u8>>, Error> = payload.blocks.iter().map(|b| b.decode()).collect();
            peripheral::write_rdfu(self.transport.as_mut(), self.device_index, feature_index, self.entity, &magic, &blocks?, self.timeout)
        } else {
            peripheral::write_classic_dfu(self.transport.as_mut(), self.device_index, feature_index, image, self.timeout)
        };

        self.core.set_update_state(if result.is_ok() { UpdateState::NeedsReboot } else { UpdateState::Failed });
        result
    }
}

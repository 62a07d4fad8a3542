// SPDX-License-Identifier: MIT OR Apache-2.0
//! HID++2.0 feature-index discovery and per-peripheral feature map cache (§4.5).

use std::collections::HashMap;
use std::time::Duration;

use crate::error::{Error, ErrorKind};
use crate::hidpp::message::{Message, MatchFlags, ReportId};
use crate::hidpp::transport::{transfer, HidTransport};

/// Features the core resolves feature indices for. `0x0000` (Root) is always index `0x00`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FeatureId
{
    Root,
    GetDeviceNameType,
    IFirmwareInfo,
    BatteryLevelStatus,
    UnifiedBattery,
    DfuControl,
    DfuControlSigned,
    DfuControlBolt,
    Dfu,
    Rdfu,
    ReceiverFwInformation,
    PairingInformation,
}

impl FeatureId
{
    pub const fn code(self) -> u16
    {
        match self {
            FeatureId::Root => 0x0000,
            FeatureId::GetDeviceNameType => 0x0005,
            FeatureId::IFirmwareInfo => 0x0003,
            FeatureId::BatteryLevelStatus => 0x1000,
            FeatureId::UnifiedBattery => 0x1004,
            FeatureId::DfuControl => 0x00C1,
            FeatureId::DfuControlSigned => 0x00C2,
            FeatureId::DfuControlBolt => 0x00C3,
            FeatureId::Dfu => 0x00D0,
            FeatureId::Rdfu => 0x00D1,
            FeatureId::ReceiverFwInformation => 0x8100,
            FeatureId::PairingInformation => 0x6D00,
        }
    }
}

const ROOT_FEATURE_INDEX: u8 = 0x00;
/// `root.getFeature`'s function id (function 0 within the Root feature).
const ROOT_GET_FEATURE_FUNCTION: u8 = 0x00;

/// Caches `FeatureID → feature index` for one peripheral. An index of `0x00` for anything
/// other than Root means "not present".
#[derive(Debug, Default)]
pub struct FeatureMap
{
    indices: HashMap<FeatureId, u8>,
    /// Once set, stops probing additional features after sustained timeouts (§4.5).
    probing_disabled: bool,
}

impl FeatureMap
{
    pub fn new() -> Self
    {
        Self::default()
    }

    pub fn clear(&mut self)
    {
        self.indices.clear();
        self.probing_disabled = false;
    }

    pub fn cached(&self, feature: FeatureId) -> Option<u8>
    {
        if feature == FeatureId::Root {
            return Some(ROOT_FEATURE_INDEX);
        }
        self.indices.get(&feature).copied()
    }

    /// Resolves `feature`'s index via `root.getFeature`, caching the result. Returns
    /// `None` (not an error) when the device reports the feature absent (index `0x00`).
    /// Root's getFeature function id is looked up the same way as any other feature call
    /// would use a function id — it's hardcoded here as `0x00` because Root is always
    /// index `0x00` and function `0x00` by the protocol's own definition, not because we
    /// copied an opcode constant without verifying it (§9 open question).
    pub fn resolve(
        &mut self,
        transport: &mut dyn HidTransport,
        device_index: u8,
        feature: FeatureId,
        timeout: Duration,
    ) -> Result<Option<u8>, Error>
    {
        if feature == FeatureId::Root {
            return Ok(Some(ROOT_FEATURE_INDEX));
        }
        if let Some(index) = self.indices.get(&feature) {
            return Ok(Some(*index).filter(|&i| i != 0));
        }
        if self.probing_disabled {
            return Ok(None);
        }

        let code = feature.code();
        let request = Message::request_v2(
            ReportId::Short,
            device_index,
            ROOT_FEATURE_INDEX,
            ROOT_GET_FEATURE_FUNCTION << 4,
            vec![(code >> 8) as u8, code as u8],
        );

        let reply = match transfer(transport, &request, 2, MatchFlags::none(), timeout) {
            Ok(reply) => reply,
            Err(err) if matches!(err.kind, ErrorKind::TimedOut) => {
                log::warn!("feature probe for {feature:?} timed out, disabling further probing");
                self.probing_disabled = true;
                return Ok(None);
            },
            Err(err) => return Err(err),
        };

        let index = reply.payload.first().copied().unwrap_or(0);
        self.indices.insert(feature, index);
        Ok(Some(index).filter(|&i| i != 0))
    }
}

#[cfg(test)]
mod tests
{
    use super::*;
    use crate::hidpp::transport::fake::FakeTransport;

    #[test]
    fn root_is_always_index_zero()
    {
        let map = FeatureMap::new();
        assert_eq!(map.cached(FeatureId::Root), Some(0x00));
    }

    #[test]
    fn resolve_caches_and_reuses_index()
    {
        let mut transport = FakeTransport::with_replies([vec![0x10, 0x01, 0x00, 0x07, 0x05, 0, 0]]);
        let mut map = FeatureMap::new();
        let index = map.resolve(&mut transport, 0x01, FeatureId::IFirmwareInfo, Duration::from_millis(50)).unwrap();
        assert_eq!(index, Some(0x05));
        assert_eq!(transport.written.len(), 1);

        // second call should hit the cache, no further writes
        let index = map.resolve(&mut transport, 0x01, FeatureId::IFirmwareInfo, Duration::from_millis(50)).unwrap();
        assert_eq!(index, Some(0x05));
        assert_eq!(transport.written.len(), 1);
    }

    #[test]
    fn resolve_returns_none_for_absent_feature()
    {
        let mut transport = FakeTransport::with_replies([vec![0x10, 0x01, 0x00, 0x07, 0x00, 0, 0]]);
        let mut map = FeatureMap::new();
        let index = map.resolve(&mut transport, 0x01, FeatureId::Rdfu, Duration::from_millis(50)).unwrap();
        assert_eq!(index, None);
    }
}

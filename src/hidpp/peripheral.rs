// SPDX-License-Identifier: MIT OR Apache-2.0
//! HID++ peripheral device: ping/version, setup, battery, detach/attach, DFU and RDFU
//! write paths (§4.6).

use std::time::Duration;

use crate::error::{Error, ErrorKind};
use crate::hidpp::features::{FeatureId, FeatureMap};
use crate::hidpp::message::{Message, MatchFlags, ReportId};
use crate::hidpp::rdfu;
use crate::hidpp::transport::{transfer, HidTransport};

const FUNCTION_PING: u8 = 0x01;
const PING_MARKER: u8 = 0xAA;

const SETUP_TIMEOUT: Duration = Duration::from_millis(2000);
const RECEIVER_GUARD_DELAY: Duration = Duration::from_millis(50);

/// Detected protocol version of a peripheral, resolved by `ping()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolVersion
{
    V1,
    V2(u8),
}

/// One firmware-info entity slot, decoded from a 16-byte `getInfo(i)` record (§6).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entity
{
    pub index: u8,
    pub kind: EntityKind,
    pub version: String,
    pub active: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind
{
    Application,
    Bootloader,
    Hardware,
}

impl EntityKind
{
    fn from_byte(byte: u8) -> Option<Self>
    {
        match byte {
            0 => Some(Self::Application),
            1 => Some(Self::Bootloader),
            2 => Some(Self::Hardware),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatteryLevel
{
    Percentage(u8),
    /// Coarse level mapped to `{5, 20, 55, 90}` when only a level, not a percentage, is
    /// available.
    Coarse(u8),
}

/// Sends `root.ping(0xAA)`. `not-supported` on the reply is treated as HID++1.0; `not-found`
/// marks the device unreachable but still returns success (the poll loop will recover).
pub fn ping(transport: &mut dyn HidTransport, device_index: u8, timeout: Duration) -> Result<Option<ProtocolVersion>, Error>
{
    let request = Message::request_v2(ReportId::Short, device_index, 0x00, FUNCTION_PING << 4, vec![0, 0, PING_MARKER]);
    match transfer(transport, &request, 2, MatchFlags::none(), timeout) {
        Ok(reply) => {
            let major = reply.payload.first().copied().unwrap_or(2);
            Ok(Some(ProtocolVersion::V2(major)))
        },
        Err(err) => match err.kind {
            ErrorKind::NotSupported(_) => Ok(Some(ProtocolVersion::V1)),
            ErrorKind::NotFound(_) => Ok(None),
            _ => Err(err),
        },
    }
}

fn parse_entity(index: u8, payload: &[u8]) -> Result<Entity, Error>
{
    if payload.len() < 8 {
        return Err(ErrorKind::InvalidData(Some("firmware-info entity record shorter than 8 bytes".into())).error());
    }
    let kind = EntityKind::from_byte(payload[0])
        .ok_or_else(|| ErrorKind::InvalidData(Some(format!("unrecognized entity type 0x{:02x}", payload[0]))).error())?;
    let major = payload[4];
    let minor = payload[5];
    let build = u16::from_be_bytes([payload[6], payload[7]]);
    let active = payload.get(8).is_some_and(|b| b & 0x01 != 0);
    Ok(Entity { index, kind, version: format!("{major:02x}.{minor:02x}_B{build:04}"), active })
}

/// `I_FIRMWARE_INFO.getCount` then `getInfo(i)` for each entity.
pub fn enumerate_entities(
    transport: &mut dyn HidTransport,
    device_index: u8,
    feature_index: u8,
    timeout: Duration,
) -> Result<Vec<Entity>, Error>
{
    let count_request = Message::request_v2(ReportId::Short, device_index, feature_index, 0x00, vec![]);
    let count_reply = transfer(transport, &count_request, 2, MatchFlags::none(), timeout)?;
    let count = count_reply.payload.first().copied().unwrap_or(0);

    (0..count)
        .map(|i| {
            let request = Message::request_v2(ReportId::Short, device_index, feature_index, 0x10, vec![i]);
            let reply = transfer(transport, &request, 2, MatchFlags::none(), timeout)?;
            parse_entity(i, &reply.payload)
        })
        .collect()
}

/// The cached firmware entity (§4.6): the single active one if exactly one exists, else the
/// non-active application-typed slot.
pub fn cached_entity(entities: &[Entity]) -> Option<&Entity>
{
    let active: Vec<&Entity> = entities.iter().filter(|e| e.active).collect();
    if active.len() == 1 {
        return Some(active[0]);
    }
    entities.iter().find(|e| e.kind == EntityKind::Application && !e.active)
}

/// `getDeviceInfo`: a 12-hex `model_id` and its first-4-hex `model_pid` prefix.
pub fn get_device_info(transport: &mut dyn HidTransport, device_index: u8, feature_index: u8, timeout: Duration) -> Result<(String, String), Error>
{
    let request = Message::request_v2(ReportId::Short, device_index, feature_index, 0x20, vec![]);
    let reply = transfer(transport, &request, 2, MatchFlags::none(), timeout)?;
    if reply.payload.len() < 6 {
        return Err(ErrorKind::InvalidData(Some("getDeviceInfo reply shorter than 6 bytes".into())).error());
    }
    let model_id: String = reply.payload[0..6].iter().map(|b| format!("{b:02X}")).collect();
    let model_pid = model_id[..4].to_string();
    Ok((model_id, model_pid))
}

/// Maps a coarse battery level byte onto the 4 documented approximate percentages.
fn coarse_percentage(level: u8) -> u8
{
    match level {
        0 => 5,
        1 => 20,
        2 => 55,
        _ => 90,
    }
}

/// Reads battery state, preferring `UNIFIED_BATTERY` (percentage if capability bit `0x02`
/// is set, else a coarse level), then falling back to `BATTERY_LEVEL_STATUS`.
pub fn read_battery(
    transport: &mut dyn HidTransport,
    device_index: u8,
    features: &FeatureMap,
    timeout: Duration,
) -> Result<Option<BatteryLevel>, Error>
{
    if let Some(index) = features.cached(FeatureId::UnifiedBattery).filter(|&i| i != 0) {
        let request = Message::request_v2(ReportId::Short, device_index, index, 0x00, vec![]);
        let reply = transfer(transport, &request, 2, MatchFlags::none(), timeout)?;
        let capabilities = reply.payload.get(2).copied().unwrap_or(0);
        return Ok(Some(if capabilities & 0x02 != 0 {
            BatteryLevel::Percentage(reply.payload.first().copied().unwrap_or(0))
        } else {
            BatteryLevel::Coarse(coarse_percentage(reply.payload.get(1).copied().unwrap_or(0)))
        }));
    }

    if let Some(index) = features.cached(FeatureId::BatteryLevelStatus).filter(|&i| i != 0) {
        let request = Message::request_v2(ReportId::Short, device_index, index, 0x00, vec![]);
        let reply = transfer(transport, &request, 2, MatchFlags::none(), timeout)?;
        return Ok(Some(BatteryLevel::Percentage(reply.payload.first().copied().unwrap_or(0))));
    }

    Ok(None)
}

/// DFU_CONTROL[_BOLT].setDfuControl(enter, 0, "DFU"). Returns whether the caller must emit a
/// `REMOVE_REPLUG` request (device lacks a flag to suppress user prompting).
pub fn detach_classic(
    transport: &mut dyn HidTransport,
    device_index: u8,
    feature_index: u8,
    suppress_prompt_supported: bool,
    timeout: Duration,
) -> Result<bool, Error>
{
    let payload = vec![0x01, 0x00, b'D', b'F', b'U'];
    let request = Message::request_v2(ReportId::Short, device_index, feature_index, 0x10, payload);
    transfer(transport, &request, 2, MatchFlags::none(), timeout)?;
    Ok(!suppress_prompt_supported)
}

/// `DFU_CONTROL_SIGNED.setDfuControl(start, 0, "DFU")`: the device reboots autonomously, so
/// the caller re-runs setup after a 200ms delay.
pub fn detach_signed(transport: &mut dyn HidTransport, device_index: u8, feature_index: u8, timeout: Duration) -> Result<(), Error>
{
    let payload = vec![0x01, 0x00, b'D', b'F', b'U'];
    let request = Message::request_v2(ReportId::Short, device_index, feature_index, 0x10, payload);
    transfer(transport, &request, 2, MatchFlags::none(), timeout)?;
    Ok(())
}

fn decode_dfu_status(code: u8) -> Result<Option<&'static str>, Error>
{
    match code {
        0x01 | 0x02 | 0x05 | 0x06 => Ok(None),
        0x03 => Ok(Some("wait")),
        0x04 | 0x10 => Err(ErrorKind::InvalidData(Some("generic DFU write failure".into())).error()),
        0x11 => Err(ErrorKind::InvalidData(Some("bad voltage".into())).error()),
        0x12 | 0x14 | 0x21 => Err(ErrorKind::InvalidData(Some("unsupported firmware".into())).error()),
        0x13 => Err(ErrorKind::InvalidData(Some("unsupported cryptography".into())).error()),
        0x15 => Err(ErrorKind::InvalidData(Some("flash erase failed".into())).error()),
        0x16 => Err(ErrorKind::InvalidData(Some("DFU not started".into())).error()),
        0x17 => Err(ErrorKind::InvalidData(Some("bad packet sequence".into())).error()),
        0x18 => Err(ErrorKind::InvalidData(Some("unsupported command".into())).error()),
        0x19 => Err(ErrorKind::Busy.error()),
        0x1A | 0x1B => Err(ErrorKind::InvalidData(Some("bad flash address".into())).error()),
        0x1C => Err(ErrorKind::InvalidData(Some("bad packet size".into())).error()),
        0x1D | 0x1E => Err(ErrorKind::InvalidData(Some("missing data".into())).error()),
        0x1F => Err(ErrorKind::InvalidData(Some("flash write failed".into())).error()),
        0x20 => Err(ErrorKind::InvalidData(Some("flash verify failed".into())).error()),
        0x22 => Err(ErrorKind::InvalidData(Some("firmware check failed".into())).error()),
        0x23 => Err(ErrorKind::InvalidData(Some("blocked, restart required".into())).error()),
        other => Err(ErrorKind::InvalidData(Some(format!("unrecognized DFU status 0x{other:02x}"))).error()),
    }
}

/// Classic DFU write: splits `firmware` (its first byte names the target entity) into
/// 16-byte chunks, cycling `cmd ∈ {4,5,6,7}` as a sliding window of 4 across long reports.
pub fn write_classic_dfu(
    transport: &mut dyn HidTransport,
    device_index: u8,
    feature_index: u8,
    firmware: &[u8],
    timeout: Duration,
) -> Result<(), Error>
{
    const CHUNK: usize = 16;
    let mut counter: u32 = 0;

    for chunk in firmware.chunks(CHUNK) {
        let cmd = 4 + (counter % 4) as u8;
        let mut payload = chunk.to_vec();
        payload.resize(CHUNK, 0xFF);
        let request = Message::request_v2(ReportId::Long, device_index, feature_index, cmd << 4, payload);
        let reply = transfer(transport, &request, 2, MatchFlags::none(), timeout)?;

        let reply_counter = u32::from_be_bytes([
            reply.payload.first().copied().unwrap_or(0),
            reply.payload.get(1).copied().unwrap_or(0),
            reply.payload.get(2).copied().unwrap_or(0),
            reply.payload.get(3).copied().unwrap_or(0),
        ]);
        if reply_counter != counter {
            return Err(ErrorKind::InvalidData(Some("DFU reply packet counter mismatch".into())).error());
        }

        let status = reply.payload.get(4).copied().unwrap_or(0);
        if decode_dfu_status(status)?.is_some() {
            return Err(ErrorKind::Busy.error());
        }

        counter += 1;
    }

    Ok(())
}

/// RDFU write for `entity`'s sub-image, delegating the block/pkt state machine to
/// [crate::hidpp::rdfu::write].
pub fn write_rdfu(
    transport: &mut dyn HidTransport,
    device_index: u8,
    feature_index: u8,
    entity: u8,
    magic: &[u8],
    blocks: &[Vec<u8>],
    timeout: Duration,
) -> Result<(), Error>
{
    rdfu::write(transport, device_index, feature_index, entity, magic, blocks, timeout)
}

/// `restart(entity)` with swid-ignoring flags; read/write/not-found on the reply are
/// tolerated because the device resets before it can acknowledge.
pub fn attach_dfu(transport: &mut dyn HidTransport, device_index: u8, feature_index: u8, entity: u8, timeout: Duration) -> Result<(), Error>
{
    let request = Message::request_v2(ReportId::Short, device_index, feature_index, 0x40, vec![entity]);
    match transfer(transport, &request, 2, MatchFlags::IgnoreSwId, timeout) {
        Ok(_) => Ok(()),
        Err(err) => match err.kind {
            ErrorKind::TimedOut | ErrorKind::Io | ErrorKind::NotFound(_) => Ok(()),
            _ => Err(err),
        },
    }
}

pub fn setup_pre_delay(is_ble: bool) -> Duration
{
    if is_ble {
        Duration::from_secs(1)
    } else {
        Duration::ZERO
    }
}

pub fn receiver_guard_delay() -> Duration
{
    RECEIVER_GUARD_DELAY
}

pub fn setup_timeout() -> Duration
{
    SETUP_TIMEOUT
}

#[cfg(test)]
mod tests
{
    use super::*;
    use crate::hidpp::transport::fake::FakeTransport;

    #[test]
    fn ping_reports_v2_major_version()
    {
        let mut transport = FakeTransport::with_replies([vec![0x10, 0x02, 0x00, 0x17, 0x02, 0, 0]]);
        let version = ping(&mut transport, 0x02, Duration::from_millis(50)).unwrap();
        assert_eq!(version, Some(ProtocolVersion::V2(2)));
    }

    #[test]
    fn cached_entity_prefers_single_active()
    {
        let entities = vec![
            Entity { index: 0, kind: EntityKind::Application, version: "01.00_B0000".into(), active: true },
            Entity { index: 1, kind: EntityKind::Bootloader, version: "01.00_B0000".into(), active: false },
        ];
        let cached = cached_entity(&entities).unwrap();
        assert_eq!(cached.index, 0);
    }

    #[test]
    fn write_classic_dfu_cycles_cmd_and_checks_counter()
    {
        let firmware = vec![0x01u8; 64]; // entity byte + 63 bytes of data, 4 chunks of 16
        let reply = |counter: u32, function_id: u8| {
            let bytes = counter.to_be_bytes();
            vec![0x11, 0x02, 0x00, function_id, bytes[0], bytes[1], bytes[2], bytes[3], 0x01]
        };
        let mut transport =
            FakeTransport::with_replies([reply(0, 0x47), reply(1, 0x57), reply(2, 0x67), reply(3, 0x77)]);
        write_classic_dfu(&mut transport, 0x02, 0x00, &firmware, Duration::from_millis(50)).unwrap();
        assert_eq!(transport.written.len(), 4);
    }

    #[test]
    fn decode_dfu_status_maps_wait_to_busy_signal()
    {
        assert_eq!(decode_dfu_status(0x03).unwrap(), Some("wait"));
        assert!(decode_dfu_status(0x01).unwrap().is_none());
        assert!(decode_dfu_status(0x20).is_err());
    }
}

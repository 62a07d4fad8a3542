// SPDX-License-Identifier: MIT OR Apache-2.0
//! Bolt receiver firmware-information and pairing-slot probing (§4.8).

use std::time::Duration;

use crate::error::Error;
use crate::hidpp::message::{Message, MatchFlags, ReportId, DEVICE_INDEX_RECEIVER};
use crate::hidpp::transport::{transfer, HidTransport};

const FEATURE_RECEIVER_FW_INFORMATION: u8 = 0x00;
const FEATURE_PAIRING_INFORMATION: u8 = 0x00;

/// `setLongRegister(0x01, "PRE")`'s function/register pair, used for Bolt detach.
const DFU_CONTROL_SET_LONG_REGISTER: u8 = 0x01;
const DETACH_MAGIC: &[u8] = b"PRE";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoltFirmwareInfo
{
    pub main_version: String,
    pub bootloader_version: String,
    pub pairing_slot_count: u8,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PairingSlot
{
    pub index: u8,
    pub reachable: bool,
    pub pid: u16,
    pub name: String,
}

fn read_fw_entry(transport: &mut dyn HidTransport, feature_index: u8, entry: u8, timeout: Duration) -> Result<Vec<u8>, Error>
{
    let request = Message::request_v2(
        ReportId::Short,
        DEVICE_INDEX_RECEIVER,
        feature_index,
        FEATURE_RECEIVER_FW_INFORMATION << 4,
        vec![entry],
    );
    let reply = transfer(transport, &request, 2, MatchFlags::none(), timeout)?;
    Ok(reply.payload)
}

fn version_string(prefix: &str, payload: &[u8]) -> String
{
    let major = payload.first().copied().unwrap_or(0);
    let minor = payload.get(1).copied().unwrap_or(0);
    let build = u16::from_be_bytes([payload.get(2).copied().unwrap_or(0), payload.get(3).copied().unwrap_or(0)]);
    format!("{prefix}{major:02}.{minor:02}_B{build:04}")
}

/// Reads `RECEIVER_FW_INFORMATION[0..3]`: entry 0 is the main firmware (`MPRxx.yy_Bbbbb`),
/// entry 1 the bootloader (`BOTxx.yy_Bbbbb`), entry 2 the pairing-slot count.
pub fn probe_firmware(transport: &mut dyn HidTransport, feature_index: u8, timeout: Duration) -> Result<BoltFirmwareInfo, Error>
{
    let main = read_fw_entry(transport, feature_index, 0, timeout)?;
    let bootloader = read_fw_entry(transport, feature_index, 1, timeout)?;
    let count_entry = read_fw_entry(transport, feature_index, 2, timeout)?;

    Ok(BoltFirmwareInfo {
        main_version: version_string("MPR", &main),
        bootloader_version: version_string("BOT", &bootloader),
        pairing_slot_count: count_entry.first().copied().unwrap_or(0),
    })
}

/// Reads `PAIRING_INFORMATION[0x50|slot]` (flags/PID) and `[0x60|slot]` (UTF-8 name, a
/// length byte at offset 2) for one pairing slot.
pub fn read_pairing_slot(transport: &mut dyn HidTransport, feature_index: u8, slot: u8, timeout: Duration) -> Result<PairingSlot, Error>
{
    let info_request = Message::request_v2(
        ReportId::Short,
        DEVICE_INDEX_RECEIVER,
        feature_index,
        FEATURE_PAIRING_INFORMATION << 4,
        vec![0x50 | slot],
    );
    let info_reply = transfer(transport, &info_request, 2, MatchFlags::none(), timeout)?;
    let reachable = info_reply.payload.first().is_some_and(|flags| flags & 0x40 == 0);
    let pid = u16::from_be_bytes([info_reply.payload.get(1).copied().unwrap_or(0), info_reply.payload.get(2).copied().unwrap_or(0)]);

    let name_request = Message::request_v2(
        ReportId::Short,
        DEVICE_INDEX_RECEIVER,
        feature_index,
        FEATURE_PAIRING_INFORMATION << 4,
        vec![0x60 | slot],
    );
    let name_reply = transfer(transport, &name_request, 2, MatchFlags::none(), timeout)?;
    let len = name_reply.payload.get(2).copied().unwrap_or(0) as usize;
    let name_bytes = name_reply.payload.get(3..3 + len).unwrap_or(&[]);
    let name = String::from_utf8_lossy(name_bytes).into_owned();

    Ok(PairingSlot { index: slot, reachable, pid, name })
}

/// Enumerates all pairing slots `1..=count`.
pub fn enumerate_slots(transport: &mut dyn HidTransport, feature_index: u8, count: u8, timeout: Duration) -> Result<Vec<PairingSlot>, Error>
{
    (1..=count).map(|slot| read_pairing_slot(transport, feature_index, slot, timeout)).collect()
}

/// Bolt detach: `DFU_CONTROL.setLongRegister(0x01, "PRE")`; read/write/not-found errors on
/// the reply are tolerated because the receiver may reset before acknowledging.
pub fn detach(transport: &mut dyn HidTransport, feature_index: u8, timeout: Duration) -> Result<(), Error>
{
    let request = Message::request_v2(
        ReportId::Long,
        DEVICE_INDEX_RECEIVER,
        feature_index,
        DFU_CONTROL_SET_LONG_REGISTER << 4,
        DETACH_MAGIC.to_vec(),
    );
    match transfer(transport, &request, 2, MatchFlags::none(), timeout) {
        Ok(_) => Ok(()),
        Err(err) => match err.kind {
            crate::error::ErrorKind::TimedOut
            | crate::error::ErrorKind::Io
            | crate::error::ErrorKind::NotFound(_) => Ok(()),
            _ => Err(err),
        },
    }
}

#[cfg(test)]
mod tests
{
    use super::*;
    use crate::hidpp::transport::fake::FakeTransport;

    #[test]
    fn probe_firmware_decodes_versions_and_slot_count()
    {
        let replies = vec![
            vec![0x10, DEVICE_INDEX_RECEIVER, 0x01, 0x07, 1, 2, 0, 3],
            vec![0x10, DEVICE_INDEX_RECEIVER, 0x01, 0x07, 3, 2, 0, 7],
            vec![0x10, DEVICE_INDEX_RECEIVER, 0x01, 0x07, 6, 0, 0, 0],
        ];
        let mut transport = FakeTransport::with_replies(replies);
        let info = probe_firmware(&mut transport, 0x01, Duration::from_millis(50)).unwrap();
        assert_eq!(info.main_version, "MPR01.02_B0003");
        assert_eq!(info.bootloader_version, "BOT03.02_B0007");
        assert_eq!(info.pairing_slot_count, 6);
    }

    #[test]
    fn read_pairing_slot_decodes_reachability_pid_and_name()
    {
        let replies = vec![
            vec![0x10, DEVICE_INDEX_RECEIVER, 0x01, 0x07, 0x00, 0x40, 0x06],
            vec![0x10, DEVICE_INDEX_RECEIVER, 0x01, 0x07, 0, 0, 5, b'M', b'o', b'u', b's', b'e'],
        ];
        let mut transport = FakeTransport::with_replies(replies);
        let slot = read_pairing_slot(&mut transport, 0x01, 2, Duration::from_millis(50)).unwrap();
        assert!(slot.reachable);
        assert_eq!(slot.pid, 0x4006);
        assert_eq!(slot.name, "Mouse");
    }

    #[test]
    fn detach_tolerates_timeout()
    {
        let mut transport = FakeTransport::new();
        detach(&mut transport, 0x01, Duration::from_millis(5)).unwrap();
    }
}

// SPDX-License-Identifier: MIT OR Apache-2.0
//! Unifying receiver firmware-information probing (§4.8).

use std::time::Duration;

use crate::error::Error;
use crate::hidpp::message::{Message, MatchFlags, ReportId, DEVICE_INDEX_RECEIVER};
use crate::hidpp::transport::{transfer, HidTransport};

const SUB_ID_GET_LONG_REGISTER: u8 = 0x83;
const REGISTER_FIRMWARE_INFO: u8 = 0xF1;

/// The firmware-info register's 5 two-byte windows. Index `0x03` is skipped: a known 12.01
/// receiver firmware bug replies with invalid data for that window, so its bytes are left
/// zeroed rather than surfacing a spurious parse error.
const WINDOW_COUNT: u8 = 5;
const SKIPPED_WINDOW: u8 = 0x03;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnifyingFirmwareInfo
{
    pub runtime_version: String,
    pub bootloader_version: String,
    /// Bootloader majors `01>=4` or `03>=2` imply a signed-payload receiver.
    pub signed: bool,
}

fn read_window(transport: &mut dyn HidTransport, index: u8, timeout: Duration) -> Result<[u8; 2], Error>
{
    let request = Message::request_v1(
        ReportId::Short,
        DEVICE_INDEX_RECEIVER,
        SUB_ID_GET_LONG_REGISTER,
        REGISTER_FIRMWARE_INFO,
        vec![index],
    );
    let reply = transfer(transport, &request, 1, MatchFlags::none(), timeout)?;
    Ok([reply.payload.first().copied().unwrap_or(0), reply.payload.get(1).copied().unwrap_or(0)])
}

/// Reads all 10 bytes of the firmware-information register in five 2-byte windows and
/// decodes the runtime (`RQRxx.yy_Bbbbb`) and bootloader (`BOTxx.yy_Bbbbb`) versions.
pub fn probe(transport: &mut dyn HidTransport, timeout: Duration) -> Result<UnifyingFirmwareInfo, Error>
{
    let mut bytes = [0u8; 10];
    for index in 0..WINDOW_COUNT {
        if index == SKIPPED_WINDOW {
            continue;
        }
        let window = read_window(transport, index, timeout)?;
        let offset = index as usize * 2;
        bytes[offset..offset + 2].copy_from_slice(&window);
    }

    let runtime_version = format!("RQR{:02}.{:02}_B{:04}", bytes[0], bytes[1], u16::from_be_bytes([bytes[2], bytes[3]]));
    let bl_major = bytes[4];
    let bl_minor = bytes[5];
    let bootloader_version = format!("BOT{:02}.{:02}_B{:04}", bl_major, bl_minor, u16::from_be_bytes([bytes[8], bytes[9]]));
    let signed = (bl_major == 1 && bl_minor >= 4) || (bl_major == 3 && bl_minor >= 2);

    Ok(UnifyingFirmwareInfo { runtime_version, bootloader_version, signed })
}

#[cfg(test)]
mod tests
{
    use super::*;
    use crate::hidpp::transport::fake::FakeTransport;

    fn reply(index: u8, data: [u8; 2]) -> Vec<u8>
    {
        vec![0x10, DEVICE_INDEX_RECEIVER, SUB_ID_GET_LONG_REGISTER, REGISTER_FIRMWARE_INFO, data[0], data[1], index]
    }

    #[test]
    fn probe_skips_window_three_and_decodes_versions()
    {
        let replies = vec![
            reply(0, [12, 1]),
            reply(1, [0, 234]),
            reply(2, [3, 2]),
            reply(4, [0, 0]),
        ];
        let mut transport = FakeTransport::with_replies(replies);
        let info = probe(&mut transport, Duration::from_millis(50)).unwrap();
        assert_eq!(info.runtime_version, "RQR12.01_B0234");
        assert_eq!(info.bootloader_version, "BOT03.02_B0000");
        assert!(info.signed);
        assert_eq!(transport.written.len(), 4);
    }
}

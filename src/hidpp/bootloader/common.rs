// SPDX-License-Identifier: MIT OR Apache-2.0
//! Shared bootloader setup: `getMemInfo`/`getBlVersion`, opcode constants (§4.7, §6).

use std::time::Duration;

use crate::error::{Error, ErrorKind};
use crate::hidpp::message::{Message, MatchFlags, ReportId};
use crate::hidpp::transport::{transfer, HidTransport};

pub const CMD_REBOOT: u8 = 0xF0;
pub const CMD_GET_MEMINFO: u8 = 0x01;
pub const CMD_GET_BL_VERSION: u8 = 0xF1;
pub const CMD_WRITE: u8 = 0xC0;
pub const CMD_ERASE_PAGE: u8 = 0xF2;
pub const CMD_WRITE_RAM_BUFFER: u8 = 0xC0;
pub const CMD_WRITE_SIGNATURE: u8 = 0xC1;
pub const CMD_FLASH_RAM: u8 = 0xD0;

pub const FLASH_RAM_ERASE_ALL: u8 = 0x00;
pub const FLASH_RAM_BUFFER: u8 = 0x01;
pub const FLASH_RAM_CLEAR_BUFFER: u8 = 0x02;
pub const FLASH_RAM_COMPUTE_CRC: u8 = 0x03;

/// Flash geometry reported by `getMemInfo`: three big-endian 16-bit words.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemInfo
{
    pub flash_lo: u32,
    pub flash_hi: u32,
    pub block_size: u32,
}

impl MemInfo
{
    pub fn from_payload(payload: &[u8]) -> Result<Self, Error>
    {
        if payload.len() < 6 {
            return Err(ErrorKind::InvalidData(Some("getMemInfo reply shorter than 6 bytes".into())).error());
        }
        Ok(Self {
            flash_lo: u16::from_be_bytes([payload[0], payload[1]]) as u32,
            flash_hi: u16::from_be_bytes([payload[2], payload[3]]) as u32,
            block_size: u16::from_be_bytes([payload[4], payload[5]]) as u32,
        })
    }
}

/// Bootloader version string, e.g. `BOT03.02_B0001`, and whether it marks signed firmware.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlInfo
{
    pub major: u8,
    pub minor: u8,
    pub build: u16,
}

impl BlInfo
{
    pub fn from_payload(payload: &[u8]) -> Result<Self, Error>
    {
        if payload.len() < 4 {
            return Err(ErrorKind::InvalidData(Some("getBlVersion reply shorter than 4 bytes".into())).error());
        }
        Ok(Self { major: payload[0], minor: payload[1], build: u16::from_be_bytes([payload[2], payload[3]]) })
    }

    pub fn render(&self) -> String
    {
        format!("BOT{:02}.{:02}_B{:04}", self.major, self.minor, self.build)
    }

    /// BL versions `(1, >=4)` or `(3, >=2)` indicate signed firmware (§4.7).
    pub fn is_signed(&self) -> bool
    {
        (self.major == 1 && self.minor >= 4) || (self.major == 3 && self.minor >= 2)
    }
}

pub fn get_mem_info(transport: &mut dyn HidTransport, device_index: u8, timeout: Duration) -> Result<MemInfo, Error>
{
    let request = Message::request_v1(ReportId::Short, device_index, CMD_GET_MEMINFO, 0x00, vec![]);
    let reply = transfer(transport, &request, 1, MatchFlags::none(), timeout)?;
    MemInfo::from_payload(&reply.payload)
}

pub fn get_bl_version(transport: &mut dyn HidTransport, device_index: u8, timeout: Duration) -> Result<BlInfo, Error>
{
    let request = Message::request_v1(ReportId::Short, device_index, CMD_GET_BL_VERSION, 0x00, vec![]);
    let reply = transfer(transport, &request, 1, MatchFlags::none(), timeout)?;
    BlInfo::from_payload(&reply.payload)
}

/// Issues `REBOOT`; no reply is expected, the device resets before it can acknowledge.
pub fn reboot(transport: &mut dyn HidTransport, device_index: u8) -> Result<(), Error>
{
    let request = Message::request_v1(ReportId::Short, device_index, CMD_REBOOT, 0x00, vec![]);
    transport.write(&request.to_bytes())
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn bl_info_signed_thresholds()
    {
        assert!(BlInfo { major: 1, minor: 4, build: 0 }.is_signed());
        assert!(!BlInfo { major: 1, minor: 3, build: 0 }.is_signed());
        assert!(BlInfo { major: 3, minor: 2, build: 0 }.is_signed());
        assert!(!BlInfo { major: 2, minor: 9, build: 0 }.is_signed());
    }

    #[test]
    fn bl_info_renders_dotted_form()
    {
        let info = BlInfo { major: 3, minor: 2, build: 1 };
        assert_eq!(info.render(), "BOT03.02_B0001");
    }

    #[test]
    fn mem_info_parses_three_be16_words()
    {
        let info = MemInfo::from_payload(&[0x00, 0x10, 0x70, 0x00, 0x00, 0x80]).unwrap();
        assert_eq!(info.flash_lo, 0x0010);
        assert_eq!(info.flash_hi, 0x7000);
        assert_eq!(info.block_size, 0x0080);
    }
}

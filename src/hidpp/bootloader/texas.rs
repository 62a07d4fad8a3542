// SPDX-License-Identifier: MIT OR Apache-2.0
//! Texas Instruments bootloader write algorithm: erase-all, RAM-buffer streaming, CRC (§4.7).

use std::time::Duration;

use crate::error::{Error, ErrorKind};
use crate::hidpp::bootloader::common;
use crate::hidpp::bootloader::ihex::{IntelHexImage, Packet};
use crate::hidpp::message::{Message, MatchFlags, ReportId};
use crate::hidpp::transport::{transfer, HidTransport};

/// Addresses within the 0x80-sized RAM buffer window this packet's write belongs to.
const RAM_BUFFER_WINDOW: u32 = 0x80;
const RAM_BUFFER_BASE_SHIFT: u32 = 7 * 0x10;

fn flash_ram(transport: &mut dyn HidTransport, device_index: u8, sub_cmd: u8, arg: &[u8], timeout: Duration) -> Result<Vec<u8>, Error>
{
    let mut payload = vec![sub_cmd];
    payload.extend_from_slice(arg);
    let request = Message::request_v1(ReportId::Short, device_index, common::CMD_FLASH_RAM, 0x00, payload);
    let reply = transfer(transport, &request, 1, MatchFlags::none(), timeout)?;
    Ok(reply.payload)
}

fn write_packet(transport: &mut dyn HidTransport, device_index: u8, remapped_addr: u32, packet: &Packet, timeout: Duration) -> Result<(), Error>
{
    let cmd = if packet.is_signature { common::CMD_WRITE_SIGNATURE } else { common::CMD_WRITE_RAM_BUFFER };
    let mut payload = vec![(remapped_addr >> 8) as u8, remapped_addr as u8];
    payload.extend_from_slice(&packet.data);
    let request = Message::request_v1(ReportId::Long, device_index, cmd, 0x00, payload);
    transfer(transport, &request, 1, MatchFlags::none(), timeout)?;
    Ok(())
}

/// Erase-all → clear-RAM-buffer → stream packets with their address remapped to
/// `addr mod 0x80` (signature packets keep their original address); every time a packet
/// crosses a `0x80` boundary, flush the previous window with
/// `FLASH_RAM_BUFFER(base = addr - 7*0x10)` before continuing. Finishes with
/// `COMPUTE_AND_TEST_CRC`; a `FLASH_RAM_WRONG_CRC` reply surfaces as `invalid-data`.
pub fn write(transport: &mut dyn HidTransport, device_index: u8, image: &IntelHexImage, timeout: Duration) -> Result<(), Error>
{
    flash_ram(transport, device_index, common::FLASH_RAM_ERASE_ALL, &[], timeout)?;
    flash_ram(transport, device_index, common::FLASH_RAM_CLEAR_BUFFER, &[], timeout)?;

    let mut last_window: Option<u32> = None;

    for packet in &image.packets {
        let remapped = if packet.is_signature { packet.address } else { packet.address % RAM_BUFFER_WINDOW };

        if !packet.is_signature {
            let window = packet.address / RAM_BUFFER_WINDOW;
            if let Some(prev) = last_window {
                if prev != window {
                    let base = prev * RAM_BUFFER_WINDOW + RAM_BUFFER_BASE_SHIFT;
                    flash_ram(
                        transport,
                        device_index,
                        common::FLASH_RAM_BUFFER,
                        &[(base >> 8) as u8, base as u8],
                        timeout,
                    )?;
                }
            }
            last_window = Some(window);
        }

        write_packet(transport, device_index, remapped, packet, timeout)?;
    }

    if let Some(window) = last_window {
        let base = window * RAM_BUFFER_WINDOW + RAM_BUFFER_BASE_SHIFT;
        flash_ram(transport, device_index, common::FLASH_RAM_BUFFER, &[(base >> 8) as u8, base as u8], timeout)?;
    }

    let crc_reply = flash_ram(transport, device_index, common::FLASH_RAM_COMPUTE_CRC, &[], timeout)?;
    let ok = crc_reply.first().copied().unwrap_or(0) == 0x00;
    if !ok {
        return Err(ErrorKind::InvalidData(Some("CRC is incorrect".into())).error());
    }

    Ok(())
}

#[cfg(test)]
mod tests
{
    use super::*;
    use crate::hidpp::transport::fake::FakeTransport;

    #[test]
    fn write_reports_invalid_data_on_crc_mismatch()
    {
        let image = IntelHexImage { packets: vec![Packet { address: 0x10, data: vec![0xAA], is_signature: false }] };

        let flash_ram_reply = |status: u8| vec![0x10, 0x03, common::CMD_FLASH_RAM, 0, status, 0, 0];
        let write_reply = vec![0x10, 0x03, common::CMD_WRITE_RAM_BUFFER, 0, 0x00, 0, 0];
        let replies = vec![
            flash_ram_reply(0x00), // erase all
            flash_ram_reply(0x00), // clear ram buffer
            write_reply,           // packet write
            flash_ram_reply(0x00), // final buffer flush
            flash_ram_reply(0x01), // compute_and_test_crc: mismatch
        ];
        let mut transport = FakeTransport::with_replies(replies);
        let err = write(&mut transport, 0x03, &image, Duration::from_millis(50)).unwrap_err();
        assert!(matches!(err.kind, ErrorKind::InvalidData(_)));
    }

    #[test]
    fn write_flushes_on_window_crossing()
    {
        let image = IntelHexImage {
            packets: vec![
                Packet { address: 0x10, data: vec![0xAA], is_signature: false },
                Packet { address: 0x90, data: vec![0xBB], is_signature: false },
            ],
        };

        let flash_ram_reply = vec![0x10, 0x03, common::CMD_FLASH_RAM, 0, 0x00, 0, 0];
        let write_reply = vec![0x10, 0x03, common::CMD_WRITE_RAM_BUFFER, 0, 0x00, 0, 0];
        let replies = vec![
            flash_ram_reply.clone(), // erase all
            flash_ram_reply.clone(), // clear ram buffer
            write_reply.clone(),     // first packet (window 0)
            flash_ram_reply.clone(), // flush window 0 on crossing into window 1
            write_reply,             // second packet (window 1)
            flash_ram_reply.clone(), // final flush
            flash_ram_reply,         // compute_and_test_crc: ok
        ];
        let mut transport = FakeTransport::with_replies(replies);
        write(&mut transport, 0x03, &image, Duration::from_millis(50)).unwrap();
        assert_eq!(transport.written.len(), 7);
    }
}

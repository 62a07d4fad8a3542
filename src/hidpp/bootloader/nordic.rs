// SPDX-License-Identifier: MIT OR Apache-2.0
//! Nordic bootloader write algorithm: erase-then-write-with-reset-vector-last (§4.7).

use std::time::Duration;

use crate::error::{Error, ErrorKind};
use crate::hidpp::bootloader::common::{self, MemInfo};
use crate::hidpp::bootloader::ihex::{IntelHexImage, Packet};
use crate::hidpp::message::{Message, MatchFlags, ReportId};
use crate::hidpp::transport::{transfer, HidTransport};

fn decode_status(code: u8) -> Result<(), Error>
{
    match code {
        0x00 => Ok(()),
        0x01 => Err(ErrorKind::InvalidData(Some("invalid flash address".into())).error()),
        0x02 => Err(ErrorKind::InvalidData(Some("flash verify failed".into())).error()),
        0x03 => Err(ErrorKind::InvalidData(Some("nonzero reset vector start".into())).error()),
        0x04 => Err(ErrorKind::InvalidData(Some("invalid CRC".into())).error()),
        other => Err(ErrorKind::InvalidData(Some(format!("unrecognized Nordic bootloader status 0x{other:02x}"))).error()),
    }
}

fn erase(transport: &mut dyn HidTransport, device_index: u8, info: &MemInfo, timeout: Duration) -> Result<(), Error>
{
    let mut page = info.flash_lo;
    while page < info.flash_hi {
        let payload = vec![(page >> 8) as u8, page as u8];
        let request = Message::request_v1(ReportId::Short, device_index, common::CMD_ERASE_PAGE, 0x00, payload);
        let reply = transfer(transport, &request, 1, MatchFlags::none(), timeout)?;
        decode_status(reply.payload.first().copied().unwrap_or(0))?;
        page += info.block_size;
    }
    Ok(())
}

fn write_packet(transport: &mut dyn HidTransport, device_index: u8, packet: &Packet, timeout: Duration) -> Result<(), Error>
{
    let cmd = if packet.is_signature { common::CMD_WRITE_SIGNATURE } else { common::CMD_WRITE_RAM_BUFFER };
    let mut payload = vec![(packet.address >> 8) as u8, packet.address as u8];
    payload.extend_from_slice(&packet.data);
    let request = Message::request_v1(ReportId::Long, device_index, cmd, 0x00, payload);
    let reply = transfer(transport, &request, 1, MatchFlags::none(), timeout)?;
    decode_status(reply.payload.first().copied().unwrap_or(0))
}

/// Erases `[flash_lo, flash_hi)` in `block_size` steps, writes every packet except packet 0,
/// writes packet 0's payload from offset 1 onward (the reset vector is withheld), then
/// finally writes the single-byte reset vector at address 0.
pub fn write(
    transport: &mut dyn HidTransport,
    device_index: u8,
    info: &MemInfo,
    image: &IntelHexImage,
    timeout: Duration,
) -> Result<(), Error>
{
    erase(transport, device_index, info, timeout)?;

    let reset_vector_packet = image.packets.iter().position(|p| !p.is_signature && p.address == 0);

    for (idx, packet) in image.packets.iter().enumerate() {
        if Some(idx) == reset_vector_packet {
            continue;
        }
        write_packet(transport, device_index, packet, timeout)?;
    }

    if let Some(idx) = reset_vector_packet {
        let packet0 = &image.packets[idx];
        if packet0.data.len() > 1 {
            let remainder = Packet { address: 1, data: packet0.data[1..].to_vec(), is_signature: false };
            write_packet(transport, device_index, &remainder, timeout)?;
        }
        let reset_byte = Packet { address: 0, data: packet0.data[..1.min(packet0.data.len())].to_vec(), is_signature: false };
        write_packet(transport, device_index, &reset_byte, timeout)?;
    }

    Ok(())
}

#[cfg(test)]
mod tests
{
    use super::*;
    use crate::hidpp::transport::fake::FakeTransport;

    #[test]
    fn decode_status_maps_known_codes()
    {
        assert!(decode_status(0x00).is_ok());
        assert!(matches!(decode_status(0x01).unwrap_err().kind, ErrorKind::InvalidData(_)));
        assert!(matches!(decode_status(0x04).unwrap_err().kind, ErrorKind::InvalidData(_)));
    }

    #[test]
    fn write_erases_then_streams_reset_vector_last()
    {
        let info = MemInfo { flash_lo: 0, flash_hi: 0x20, block_size: 0x10 };
        let image = IntelHexImage {
            packets: vec![
                Packet { address: 0, data: vec![0xAA, 0xBB], is_signature: false },
                Packet { address: 2, data: vec![0xCC], is_signature: false },
            ],
        };

        // 2 erase pages (0x00, 0x10), then: packet@2, packet@1 (remainder of packet0), packet@0 (reset byte)
        let erase_reply = vec![0x10, 0x03, common::CMD_ERASE_PAGE, 0, 0x00, 0, 0];
        let write_reply = vec![0x10, 0x03, common::CMD_WRITE_RAM_BUFFER, 0, 0x00, 0, 0];
        let replies = vec![erase_reply.clone(), erase_reply, write_reply.clone(), write_reply.clone(), write_reply];
        let mut transport = FakeTransport::with_replies(replies);
        write(&mut transport, 0x03, &info, &image, Duration::from_millis(50)).unwrap();

        assert_eq!(transport.written.len(), 5);
    }
}

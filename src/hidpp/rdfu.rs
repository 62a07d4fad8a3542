// SPDX-License-Identifier: MIT OR Apache-2.0
//! RDFU (Resumable DFU) firmware container format and block/pkt state machine (§4.6, §6).

use std::collections::HashMap;
use std::time::Duration;

use serde::Deserialize;

use crate::error::{Error, ErrorKind};
use crate::hidpp::message::{Message, MatchFlags, ReportId};
use crate::hidpp::transport::{transfer, HidTransport};

const FUNCTION_GET_DFU_STATUS: u8 = 0x00;
const FUNCTION_START_DFU: u8 = 0x10;
const FUNCTION_APPLY_DFU: u8 = 0x30;

const REPLY_NOT_STARTED: u8 = 0x00;
const REPLY_DATA_TRANSFER_READY: u8 = 0x01;
const REPLY_DATA_TRANSFER_WAIT: u8 = 0x02;
const REPLY_DFU_TRANSFER_PKT_ACK: u8 = 0x03;
const REPLY_DFU_TRANSFER_COMPLETE: u8 = 0x04;
const REPLY_INVALID_BLOCK: u8 = 0x05;
const REPLY_DFU_STATE_ERROR: u8 = 0x06;
const REPLY_DFU_APPLY_PENDING: u8 = 0x07;

const MAX_RETRIES: u32 = 10;
const BLOCK_PACKET_SIZE: usize = 16;
/// `applyDfu`'s force-DFU-entry parameter.
const FORCE_DFU_BIT: u8 = 0x01;

#[derive(Debug, Deserialize)]
pub struct RdfuDocument
{
    #[serde(rename = "fileVersion")]
    pub file_version: String,
    pub contents: Vec<RdfuContent>,
    pub payloads: HashMap<String, RdfuPayload>,
}

#[derive(Debug, Deserialize)]
pub struct RdfuContent
{
    pub entity: String,
    #[serde(rename = "magicStr")]
    pub magic_str: String,
    pub payload: String,
    #[serde(rename = "modelId")]
    pub model_id: String,
    pub name: String,
    pub revision: String,
    pub build: String,
}

#[derive(Debug, Deserialize)]
pub struct RdfuPayload
{
    pub blocks: Vec<RdfuBlock>,
}

#[derive(Debug, Deserialize)]
pub struct RdfuBlock
{
    pub data: String,
}

impl RdfuDocument
{
    pub fn parse(text: &str) -> Result<Self, Error>
    {
        serde_json::from_str(text)
            .map_err(|err| ErrorKind::InvalidFile(Some(format!("malformed RDFU document: {err}"))).error())
    }

    /// Decodes the hex `magicStr` field (`0x<20 hex chars>`) into its 10 raw bytes.
    pub fn magic_bytes(content: &RdfuContent) -> Result<[u8; 10], Error>
    {
        let hex = content.magic_str.strip_prefix("0x").unwrap_or(&content.magic_str);
        if hex.len() != 20 {
            return Err(ErrorKind::InvalidFile(Some("magicStr must be 20 hex characters".into())).error());
        }
        let mut out = [0u8; 10];
        for (i, byte) in out.iter_mut().enumerate() {
            *byte = u8::from_str_radix(&hex[i * 2..i * 2 + 2], 16)
                .map_err(|_| ErrorKind::InvalidFile(Some("magicStr contains non-hex digits".into())).error())?;
        }
        Ok(out)
    }
}

impl RdfuBlock
{
    pub fn decode(&self) -> Result<Vec<u8>, Error>
    {
        if self.data.len() % 2 != 0 {
            return Err(ErrorKind::InvalidFile(Some("RDFU block data has an odd number of hex digits".into())).error());
        }
        (0..self.data.len())
            .step_by(2)
            .map(|i| {
                u8::from_str_radix(&self.data[i..i + 2], 16)
                    .map_err(|_| ErrorKind::InvalidFile(Some("RDFU block data contains non-hex digits".into())).error())
            })
            .collect()
    }
}

/// Mirrors the device-model's RDFU state field (§3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RdfuState
{
    NotStarted,
    Transfer,
    Wait,
    Apply,
    Resume,
}

fn dfu_request(device_index: u8, feature_index: u8, function: u8, payload: Vec<u8>) -> Message
{
    Message::request_v2(ReportId::Long, device_index, feature_index, function, payload)
}

/// Runs one RDFU transfer to completion for `entity`'s pre-decoded `blocks`, each a 16-byte
/// packet payload. Implements the state machine from §4.6: `getDfuStatus`/`startDfu` on
/// entry, `DATA_TRANSFER_READY`/`WAIT`/`PKT_ACK`/`COMPLETE` during transfer, and a final
/// `applyDfu` with no expected reply.
pub fn write(
    transport: &mut dyn HidTransport,
    device_index: u8,
    feature_index: u8,
    entity: u8,
    magic: &[u8],
    blocks: &[Vec<u8>],
    timeout: Duration,
) -> Result<(), Error>
{
    let mut block_id: u32 = 0;
    let mut pkt: u32 = 0;
    let mut retries = 0u32;

    let status_request = dfu_request(device_index, feature_index, FUNCTION_GET_DFU_STATUS, vec![entity]);
    let status_reply = transfer(transport, &status_request, 2, MatchFlags::none(), timeout)?;
    if status_reply.payload.first().copied().unwrap_or(REPLY_NOT_STARTED) == REPLY_NOT_STARTED {
        let mut payload = vec![entity];
        payload.extend_from_slice(magic);
        let start_request = dfu_request(device_index, feature_index, FUNCTION_START_DFU, payload);
        transfer(transport, &start_request, 2, MatchFlags::none(), timeout)?;
    }
    let mut state = RdfuState::Transfer;

    loop {
        match state {
            RdfuState::Transfer => {
                if block_id as usize >= blocks.len() {
                    break;
                }
                let packet = build_packet(device_index, feature_index, blocks, block_id, pkt)?;
                let reply = transfer(transport, &packet, 2, MatchFlags::none(), timeout)?;
                let code = reply.payload.first().copied().unwrap_or(0);
                match code {
                    REPLY_DATA_TRANSFER_READY => {
                        let reply_block = reply.payload.get(1).copied().unwrap_or(0) as u32;
                        if reply_block <= block_id {
                            state = RdfuState::Resume;
                        } else {
                            block_id = reply_block;
                            pkt = 0;
                        }
                    },
                    REPLY_DATA_TRANSFER_WAIT => {
                        state = RdfuState::Wait;
                    },
                    REPLY_DFU_TRANSFER_PKT_ACK => {
                        let acked_pkt = reply.payload.get(1).copied().unwrap_or(0) as u32;
                        if acked_pkt != pkt + 1 {
                            state = RdfuState::Resume;
                        } else {
                            pkt = acked_pkt;
                        }
                    },
                    REPLY_DFU_TRANSFER_COMPLETE => {
                        state = RdfuState::Apply;
                    },
                    REPLY_INVALID_BLOCK | REPLY_DFU_STATE_ERROR => {
                        state = RdfuState::Resume;
                    },
                    REPLY_DFU_APPLY_PENDING | REPLY_NOT_STARTED => {
                        state = RdfuState::NotStarted;
                    },
                    other => return Err(ErrorKind::InvalidData(Some(format!("unrecognized RDFU reply code 0x{other:02x}"))).error()),
                }
            },
            RdfuState::Wait => {
                retries += 1;
                if retries > MAX_RETRIES {
                    return Err(ErrorKind::TimedOut.error().with_ctx("RDFU wait loop"));
                }
                state = RdfuState::Transfer;
            },
            RdfuState::Resume => {
                retries += 1;
                if retries > MAX_RETRIES {
                    return Err(ErrorKind::InvalidData(Some("RDFU resume retries exhausted".into())).error());
                }
                pkt = 0;
                state = RdfuState::Transfer;
            },
            RdfuState::NotStarted => {
                retries += 1;
                if retries > MAX_RETRIES {
                    return Err(ErrorKind::InvalidData(Some("RDFU restarted too many times".into())).error());
                }
                block_id = 0;
                pkt = 0;
                state = RdfuState::Transfer;
            },
            RdfuState::Apply => break,
        }
    }

    let apply_request = dfu_request(device_index, feature_index, FUNCTION_APPLY_DFU, vec![entity, FORCE_DFU_BIT]);
    // No reply is expected: the device resets as part of applying the update.
    transport.write(&apply_request.to_bytes())?;
    Ok(())
}

fn build_packet(device_index: u8, feature_index: u8, blocks: &[Vec<u8>], block_id: u32, pkt: u32) -> Result<Message, Error>
{
    let block = blocks
        .get(block_id as usize)
        .ok_or_else(|| ErrorKind::Internal("RDFU block index out of range").error())?;
    let mut payload = vec![(pkt >> 24) as u8, (pkt >> 16) as u8, (pkt >> 8) as u8, pkt as u8];
    let chunk = &block[..block.len().min(BLOCK_PACKET_SIZE)];
    payload.extend_from_slice(chunk);
    Ok(Message::request_v2(ReportId::VeryLong, device_index, feature_index, 0x20, payload))
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn parses_document()
    {
        let text = r#"{
            "fileVersion": "1",
            "contents": [{"entity":"0","magicStr":"0x0011223344556677889A","payload":"p1","modelId":"ABC","name":"n","revision":"1","build":"0001"}],
            "payloads": {"p1": {"blocks": [{"data":"AABB"}]}}
        }"#;
        let doc = RdfuDocument::parse(text).unwrap();
        assert_eq!(doc.contents.len(), 1);
        let magic = RdfuDocument::magic_bytes(&doc.contents[0]).unwrap();
        assert_eq!(magic, [0x00, 0x11, 0x22, 0x33, 0x44, 0x55, 0x66, 0x77, 0x88, 0x9A]);
    }

    #[test]
    fn block_decode_hex()
    {
        let block = RdfuBlock { data: "AABB".to_string() };
        assert_eq!(block.decode().unwrap(), vec![0xAA, 0xBB]);
    }
}

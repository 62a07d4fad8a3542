// SPDX-License-Identifier: MIT OR Apache-2.0
//! HID++ wire framing: fixed 32-byte reports, software-ID tagging, error decoding (§4.4).

use crate::error::{Error, ErrorKind};

/// HID++ report kinds and their fixed payload lengths.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportId
{
    Short,
    Long,
    VeryLong,
    Notification,
}

impl ReportId
{
    pub const fn byte(self) -> u8
    {
        match self {
            ReportId::Short => 0x10,
            ReportId::Long => 0x11,
            ReportId::VeryLong => 0x12,
            ReportId::Notification => 0x01,
        }
    }

    pub const fn payload_len(self) -> usize
    {
        match self {
            ReportId::Short => 7,
            ReportId::Long => 20,
            ReportId::VeryLong => 47,
            ReportId::Notification => 8,
        }
    }

    pub fn from_byte(byte: u8) -> Option<Self>
    {
        match byte {
            0x10 => Some(ReportId::Short),
            0x11 => Some(ReportId::Long),
            0x12 => Some(ReportId::VeryLong),
            0x01 => Some(ReportId::Notification),
            _ => None,
        }
    }
}

/// Receiver-local wired/receiver device index.
pub const DEVICE_INDEX_RECEIVER: u8 = 0xFF;

/// The low nibble of `function_id` the core always uses as its software id.
pub const SOFTWARE_ID: u8 = 0x07;

/// HID++1.0 error sub-id.
pub const SUB_ID_ERROR_V1: u8 = 0x8F;
/// HID++2.0 error sub-id.
pub const SUB_ID_ERROR_V2: u8 = 0xFF;

/// HID++1.0 notification sub-ids, filtered out of HID++2.0 reply matching.
pub const NOTIFICATION_SUB_IDS: &[u8] = &[0x40, 0x41, 0x49, 0x4B, 0x8F];

pub const SUB_ID_DEVICE_CONNECTION: u8 = 0x40;
pub const SUB_ID_DEVICE_DISCONNECTION: u8 = 0x41;
pub const SUB_ID_DEVICE_LOCKING_CHANGED: u8 = 0x4B;

/// A decoded or to-be-encoded HID++ frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message
{
    pub report_id: ReportId,
    pub device_index: u8,
    pub sub_id: u8,
    pub function_id: u8,
    pub payload: Vec<u8>,
}

/// Controls matching tolerance in [is_reply].
#[bitmask_enum::bitmask(u8)]
pub enum MatchFlags
{
    IgnoreSubId,
    IgnoreFunctionId,
    IgnoreSwId,
}

impl Message
{
    /// Builds a HID++2.0 request, OR-ing [SOFTWARE_ID] into the low nibble of
    /// `function_id` before transmission.
    pub fn request_v2(report_id: ReportId, device_index: u8, sub_id: u8, function_id: u8, payload: Vec<u8>) -> Self
    {
        Self {
            report_id,
            device_index,
            sub_id,
            function_id: (function_id & 0xF0) | SOFTWARE_ID,
            payload,
        }
    }

    /// Builds a HID++1.0 request, which has no software-id convention.
    pub fn request_v1(report_id: ReportId, device_index: u8, sub_id: u8, function_id: u8, payload: Vec<u8>) -> Self
    {
        Self { report_id, device_index, sub_id, function_id, payload }
    }

    /// Serializes to the fixed 32-byte-capable wire buffer (report id + framed payload,
    /// zero-padded to the report kind's fixed length).
    pub fn to_bytes(&self) -> Vec<u8>
    {
        let mut out = Vec::with_capacity(self.report_id.payload_len());
        out.push(self.report_id.byte());
        out.push(self.device_index);
        out.push(self.sub_id);
        out.push(self.function_id);

        let data_len = self.report_id.payload_len().saturating_sub(4);
        let mut payload = self.payload.clone();
        payload.resize(data_len, 0);
        out.extend_from_slice(&payload);
        out
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, Error>
    {
        if bytes.len() < 4 {
            return Err(ErrorKind::InvalidData(Some("HID++ frame shorter than 4 bytes".into())).error());
        }
        let report_id = ReportId::from_byte(bytes[0])
            .ok_or_else(|| ErrorKind::InvalidData(Some(format!("unknown report id 0x{:02x}", bytes[0]))).error())?;

        Ok(Self {
            report_id,
            device_index: bytes[1],
            sub_id: bytes[2],
            function_id: bytes[3],
            payload: bytes[4..].to_vec(),
        })
    }

    /// The software id embedded in a HID++2.0 reply's `function_id` low nibble.
    pub fn sw_id(&self) -> u8
    {
        self.function_id & 0x0F
    }

    pub fn is_notification(&self) -> bool
    {
        self.report_id == ReportId::Notification || NOTIFICATION_SUB_IDS.contains(&self.sub_id)
    }

    /// Error sub-id check appropriate to `version` (1 or 2).
    pub fn is_error_frame(&self, version: u8) -> bool
    {
        match version {
            1 => self.sub_id == SUB_ID_ERROR_V1,
            _ => self.sub_id == SUB_ID_ERROR_V2,
        }
    }

    /// Decodes a HID++ error frame into a typed [ErrorKind], per §4.4. The error code is
    /// the frame's third data byte: data[0] is the echoed sub-id (v1) or feature index
    /// (v2), data[1] the echoed function id, and data[2] the actual error code.
    pub fn decode_error(&self) -> ErrorKind
    {
        let code = self.payload.get(2).copied().unwrap_or(0);
        match code {
            0x01 | 0x02 => ErrorKind::NotSupported(Some(format!("HID++ error code 0x{code:02x}"))),
            0x03 => ErrorKind::Busy,
            0x04 => ErrorKind::NotFound(Some("unknown device".into())),
            0x05 => ErrorKind::AuthFailed,
            _ => ErrorKind::Internal("unrecognized HID++ error code"),
        }
    }
}

/// A reply matches a request when: device indices are equal (or either is the wired
/// receiver index `0xFF`); sub-ids match unless [MatchFlags::IgnoreSubId]; function-ids
/// match unless [MatchFlags::IgnoreFunctionId]; and for HID++2.0 (`version == 2`), the
/// reply's software id equals [SOFTWARE_ID] unless [MatchFlags::IgnoreSwId].
pub fn is_reply(request: &Message, reply: &Message, version: u8, flags: MatchFlags) -> bool
{
    let index_matches = request.device_index == reply.device_index
        || request.device_index == DEVICE_INDEX_RECEIVER
        || reply.device_index == DEVICE_INDEX_RECEIVER;
    if !index_matches {
        return false;
    }

    if !flags.contains(MatchFlags::IgnoreSubId) && request.sub_id != reply.sub_id {
        return false;
    }

    if !flags.contains(MatchFlags::IgnoreFunctionId) && (request.function_id & 0xF0) != (reply.function_id & 0xF0) {
        return false;
    }

    if version == 2 && !flags.contains(MatchFlags::IgnoreSwId) && reply.sw_id() != SOFTWARE_ID {
        return false;
    }

    true
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn request_v2_ors_software_id_into_function_id()
    {
        let msg = Message::request_v2(ReportId::Short, DEVICE_INDEX_RECEIVER, 0x00, 0x10, vec![0xAA]);
        assert_eq!(msg.function_id, 0x17);
    }

    #[test]
    fn ping_scenario_matches_exact_wire_bytes()
    {
        // Concrete end-to-end scenario 1 from the testable-properties section.
        let request = Message::request_v2(ReportId::Short, DEVICE_INDEX_RECEIVER, 0x00, 0x10, vec![0, 0, 0xAA]);
        let bytes = request.to_bytes();
        assert_eq!(bytes, vec![0x10, 0xFF, 0x00, 0x17, 0, 0, 0xAA]);

        let reply = Message::from_bytes(&[0x10, 0x02, 0x00, 0x17, 0x02, 0, 0]).unwrap();
        assert!(is_reply(&request, &reply, 2, MatchFlags::none()));
        assert_eq!(reply.device_index, 0x02);
        assert_eq!(reply.payload[0], 0x02);
    }

    #[test]
    fn is_reply_accepts_wired_index_on_either_side()
    {
        let request = Message::request_v2(ReportId::Short, 0x03, 0x00, 0x10, vec![]);
        let reply = Message { report_id: ReportId::Short, device_index: DEVICE_INDEX_RECEIVER, sub_id: 0x00, function_id: 0x17, payload: vec![] };
        assert!(is_reply(&request, &reply, 2, MatchFlags::none()));
    }

    #[test]
    fn is_reply_rejects_mismatched_sw_id_on_v2()
    {
        let request = Message::request_v2(ReportId::Short, 0xFF, 0x00, 0x10, vec![]);
        let mut reply = request.clone();
        reply.function_id = 0x10; // sw_id 0x00, not 0x07
        assert!(!is_reply(&request, &reply, 2, MatchFlags::none()));
        assert!(is_reply(&request, &reply, 2, MatchFlags::IgnoreSwId));
    }

    #[test]
    fn decode_error_maps_known_codes()
    {
        let frame = Message { report_id: ReportId::Short, device_index: 0xFF, sub_id: SUB_ID_ERROR_V2, function_id: 0, payload: vec![0x00, 0x00, 0x03] };
        assert!(matches!(frame.decode_error(), ErrorKind::Busy));
    }
}

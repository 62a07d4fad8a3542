// SPDX-License-Identifier: MIT OR Apache-2.0
//! Receiver runtime (C8): Unifying/Bolt firmware probing, pairing-slot enumeration, and the
//! notification-driven hot-plug loop (§4.8).

pub mod bolt;
pub mod unifying;

use std::collections::HashMap;
use std::time::Duration;

use crate::error::Error;
use crate::hidpp::message::{
    Message, ReportId, SUB_ID_DEVICE_CONNECTION, SUB_ID_DEVICE_DISCONNECTION, SUB_ID_DEVICE_LOCKING_CHANGED,
};
use crate::hidpp::transport::HidTransport;

/// Notification sub-ids the hot-plug loop routes to `update_paired_device`; everything else
/// (`LINK_QUALITY`, `ERROR_MSG`, …) is ignored.
fn is_routed(sub_id: u8) -> bool
{
    matches!(sub_id, SUB_ID_DEVICE_CONNECTION | SUB_ID_DEVICE_DISCONNECTION | SUB_ID_DEVICE_LOCKING_CHANGED)
}

/// One hot-plug-relevant notification, with the receiver's `0x40` reachability bit decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PairedDeviceEvent
{
    pub device_index: u8,
    pub sub_id: u8,
    pub reachable: bool,
}

/// Drains up to `max_frames` pending reports with a `1 ms` read timeout each, keeping only
/// the last notification per `(device_index, sub_id)` in this batch (§4.8, §5).
pub fn drain_notifications(transport: &mut dyn HidTransport, max_frames: u32) -> Result<Vec<PairedDeviceEvent>, Error>
{
    let mut last_of_kind: HashMap<(u8, u8), PairedDeviceEvent> = HashMap::new();
    let mut order: Vec<(u8, u8)> = Vec::new();

    for _ in 0..max_frames {
        let Some(bytes) = transport.read(Duration::from_millis(1))? else {
            break;
        };
        let frame = Message::from_bytes(&bytes)?;
        if frame.report_id != ReportId::Short || !is_routed(frame.sub_id) {
            continue;
        }

        let reachable = frame.payload.first().is_some_and(|flags| flags & 0x40 == 0);
        let key = (frame.device_index, frame.sub_id);
        if !last_of_kind.contains_key(&key) {
            order.push(key);
        }
        last_of_kind.insert(key, PairedDeviceEvent { device_index: frame.device_index, sub_id: frame.sub_id, reachable });
    }

    Ok(order.into_iter().filter_map(|key| last_of_kind.get(&key).copied()).collect())
}

#[cfg(test)]
mod tests
{
    use super::*;
    use crate::hidpp::transport::fake::FakeTransport;

    #[test]
    fn collapses_to_last_of_kind_per_device_and_subid()
    {
        let mut transport = FakeTransport::with_replies([
            vec![0x01, 0x02, SUB_ID_DEVICE_CONNECTION, 0x40, 0, 0, 0, 0],
            vec![0x01, 0x02, SUB_ID_DEVICE_CONNECTION, 0x00, 0, 0, 0, 0],
        ]);
        let events = drain_notifications(&mut transport, 50).unwrap();
        assert_eq!(events.len(), 1);
        assert!(events[0].reachable);
    }

    #[test]
    fn ignores_unrouted_sub_ids()
    {
        let mut transport = FakeTransport::with_replies([vec![0x01, 0x02, 0x50, 0x00, 0, 0, 0, 0]]);
        let events = drain_notifications(&mut transport, 50).unwrap();
        assert!(events.is_empty());
    }
}

//! End-to-end exercises of the HID++ transport/feature/peripheral stack against the
//! in-memory fake transport, the way `tests/probe_identity.rs` drove the probe layer
//! against a concrete test double rather than a mock.

use std::time::Duration;

use fwupd_hidpp_core::hidpp::peripheral::{self, EntityKind, ProtocolVersion};
use fwupd_hidpp_core::hidpp::transport::fake::FakeTransport;
use fwupd_hidpp_core::hidpp::{FeatureId, FeatureMap};

const TIMEOUT: Duration = Duration::from_millis(50);
const DEVICE_INDEX: u8 = 0x02;

#[test]
fn ping_probe_enumerate_and_detach_round_trip()
{
    let mut transport = FakeTransport::with_replies([
        // ping
        vec![0x10, DEVICE_INDEX, 0x00, 0x07, 0x02, 0, 0],
        // root.getFeature(I_FIRMWARE_INFO) -> index 0x02
        vec![0x10, DEVICE_INDEX, 0x00, 0x07, 0x02, 0, 0],
        // I_FIRMWARE_INFO.getCount -> 1 entity
        vec![0x10, DEVICE_INDEX, 0x02, 0x07, 0x01, 0, 0],
        // I_FIRMWARE_INFO.getInfo(0) -> active Application, version 01.00_B0000
        vec![0x10, DEVICE_INDEX, 0x02, 0x17, 0, 0, 0, 0, 1, 0, 0, 0, 1],
        // root.getFeature(DFU_CONTROL) -> index 0x03
        vec![0x10, DEVICE_INDEX, 0x00, 0x07, 0x03, 0, 0],
        // DFU_CONTROL.setDfuControl reply
        vec![0x10, DEVICE_INDEX, 0x03, 0x17, 0, 0, 0],
    ]);

    let version = peripheral::ping(&mut transport, DEVICE_INDEX, TIMEOUT).unwrap();
    assert_eq!(version, Some(ProtocolVersion::V2(2)));

    let mut features = FeatureMap::new();
    let fw_info_index = features.resolve(&mut transport, DEVICE_INDEX, FeatureId::IFirmwareInfo, TIMEOUT).unwrap().unwrap();
    assert_eq!(fw_info_index, 0x02);

    let entities = peripheral::enumerate_entities(&mut transport, DEVICE_INDEX, fw_info_index, TIMEOUT).unwrap();
    assert_eq!(entities.len(), 1);
    assert_eq!(entities[0].kind, EntityKind::Application);
    assert!(entities[0].active);
    assert_eq!(entities[0].version, "01.00_B0000");

    let cached = peripheral::cached_entity(&entities).unwrap();
    assert_eq!(cached.index, 0);

    let dfu_control_index = features.resolve(&mut transport, DEVICE_INDEX, FeatureId::DfuControl, TIMEOUT).unwrap().unwrap();
    assert_eq!(dfu_control_index, 0x03);

    let needs_replug = peripheral::detach_classic(&mut transport, DEVICE_INDEX, dfu_control_index, true, TIMEOUT).unwrap();
    assert!(!needs_replug);

    assert_eq!(transport.written.len(), 6);
}

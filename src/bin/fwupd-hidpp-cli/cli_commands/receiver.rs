// SPDX-License-Identifier: MIT OR Apache-2.0
//! `receiver probe`: open a Unifying or Bolt receiver by USB VID/PID and print its firmware
//! information, mirroring the probe half of the update lifecycle without driving a write.

use std::time::Duration;

use clap::{Args, Subcommand, ValueEnum};

use fwupd_hidpp_core::error::Error;
use fwupd_hidpp_core::hidpp::receiver::{bolt, unifying};
use fwupd_hidpp_core::hidpp::transport::HidapiTransport;
use fwupd_hidpp_core::hidpp::{FeatureId, FeatureMap};

#[derive(Args)]
pub struct ReceiverArguments
{
    #[command(subcommand)]
    command: ReceiverCommands,
}

#[derive(Subcommand)]
enum ReceiverCommands
{
    /// Read firmware/bootloader versions (and, for Bolt, pairing slots) from a receiver
    Probe
    {
        #[arg(long, value_parser = parse_hex_u16)]
        vid: u16,
        #[arg(long, value_parser = parse_hex_u16)]
        pid: u16,
        #[arg(long, value_enum, default_value_t = ReceiverKind::Unifying)]
        kind: ReceiverKind,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum ReceiverKind
{
    Unifying,
    Bolt,
}

fn parse_hex_u16(text: &str) -> Result<u16, String>
{
    let text = text.strip_prefix("0x").unwrap_or(text);
    u16::from_str_radix(text, 16).map_err(|err| err.to_string())
}

fn probe_unifying(vid: u16, pid: u16, timeout: Duration) -> Result<(), Error>
{
    let api = hidapi::HidApi::new()?;
    let mut transport = HidapiTransport::open(&api, vid, pid)?;
    let info = unifying::probe(&mut transport, timeout)?;
    println!("runtime:    {}", info.runtime_version);
    println!("bootloader: {}", info.bootloader_version);
    println!("signed:     {}", info.signed);
    Ok(())
}

fn probe_bolt(vid: u16, pid: u16, timeout: Duration) -> Result<(), Error>
{
    let api = hidapi::HidApi::new()?;
    let mut transport = HidapiTransport::open(&api, vid, pid)?;

    let mut features = FeatureMap::new();
    let fw_index = features
        .resolve(&mut transport, fwupd_hidpp_core::hidpp::message::DEVICE_INDEX_RECEIVER, FeatureId::ReceiverFwInformation, timeout)?
        .ok_or_else(|| fwupd_hidpp_core::error::ErrorKind::NotSupported(Some("receiver firmware information".into())).error())?;

    let info = bolt::probe_firmware(&mut transport, fw_index, timeout)?;
    println!("main:       {}", info.main_version);
    println!("bootloader: {}", info.bootloader_version);
    println!("slots:      {}", info.pairing_slot_count);

    let pairing_index = features
        .resolve(&mut transport, fwupd_hidpp_core::hidpp::message::DEVICE_INDEX_RECEIVER, FeatureId::PairingInformation, timeout)?;
    if let Some(pairing_index) = pairing_index {
        for slot in bolt::enumerate_slots(&mut transport, pairing_index, info.pairing_slot_count, timeout)? {
            println!(
                "  slot {}: reachable={} pid=0x{:04x} name={}",
                slot.index, slot.reachable, slot.pid, slot.name
            );
        }
    }

    Ok(())
}

pub fn run(args: &ReceiverArguments, timeout: Duration) -> Result<(), Error>
{
    match &args.command {
        ReceiverCommands::Probe { vid, pid, kind } => match kind {
            ReceiverKind::Unifying => probe_unifying(*vid, *pid, timeout),
            ReceiverKind::Bolt => probe_bolt(*vid, *pid, timeout),
        },
    }
}

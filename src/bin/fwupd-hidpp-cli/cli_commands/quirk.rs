// SPDX-License-Identifier: MIT OR Apache-2.0
//! `quirk lookup` / `quirk dump`: ad-hoc inspection of the quirk store from the command line.

use clap::{Args, Subcommand};
use uuid::Uuid;

use fwupd_hidpp_core::config::Config;
use fwupd_hidpp_core::error::Error;
use fwupd_hidpp_core::quirks::QuirkStore;

#[derive(Args)]
pub struct QuirkArguments
{
    #[command(subcommand)]
    command: QuirkCommands,
}

#[derive(Subcommand)]
enum QuirkCommands
{
    /// Look up a single key for a GUID
    Lookup
    {
        guid: Uuid,
        key: String,
    },
    /// Dump every key/value pair known for a GUID
    Dump
    {
        guid: Uuid,
    },
}

fn open_store(config: &Config) -> Result<QuirkStore, Error>
{
    let mut store = QuirkStore::new();
    store.load_quirk_dirs(&config.quirk_dirs)?;
    if let Err(err) = store.load_vendor_db(&config.vendor_db_path, &config.vendor_id_files) {
        log::warn!("vendor-id cache unavailable, continuing with quirk files only: {err}");
    }
    Ok(store)
}

pub fn run(args: &QuirkArguments, config: &Config) -> Result<(), Error>
{
    let store = open_store(config)?;

    match &args.command {
        QuirkCommands::Lookup { guid, key } => match store.lookup(guid, key) {
            Some(value) => println!("{value}"),
            None => println!("(not found)"),
        },
        QuirkCommands::Dump { guid } => {
            for (source, key, value) in store.iter(guid, None) {
                println!("{source:?}\t{key} = {value}");
            }
        },
    }

    Ok(())
}

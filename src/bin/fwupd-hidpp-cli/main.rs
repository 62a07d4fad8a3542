// SPDX-License-Identifier: MIT OR Apache-2.0

mod cli_commands;

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::{Parser, Subcommand, crate_description, crate_version};
use log::error;

use fwupd_hidpp_core::config::Config;
use fwupd_hidpp_core::error::Error;

use crate::cli_commands::quirk::QuirkArguments;
use crate::cli_commands::receiver::ReceiverArguments;

#[derive(Parser)]
#[command(version, about = format!("{} v{}", crate_description!(), crate_version!()), arg_required_else_help(true))]
struct CliArguments
{
    #[arg(global = true, long = "config")]
    /// Path to a config.toml overriding the compiled-in defaults
    config: Option<PathBuf>,

    #[command(subcommand)]
    subcommand: ToplevelCommands,
}

#[derive(Subcommand)]
enum ToplevelCommands
{
    /// Inspect or print the active configuration
    Config,
    /// Query the quirk store
    Quirk(QuirkArguments),
    /// Probe a Unifying/Bolt receiver over HID++
    Receiver(ReceiverArguments),
}

fn config_command(config: &Config) -> Result<(), Error>
{
    println!("quirk_dirs:");
    for dir in &config.quirk_dirs {
        println!("  {}", dir.display());
    }
    println!("vendor_id_files:");
    for file in &config.vendor_id_files {
        println!("  {}", file.display());
    }
    println!("vendor_db_path: {}", config.vendor_db_path.display());
    println!("peripheral_poll_interval_secs: {}", config.peripheral_poll_interval_secs);
    println!("receiver_poll_interval_secs: {}", config.receiver_poll_interval_secs);
    Ok(())
}

/// HID transfer timeout used by every CLI-driven probe. Not configurable yet: callers doing
/// signed-firmware operations need the raised 30s ceiling from the update engine instead.
const CLI_TIMEOUT: Duration = Duration::from_millis(2000);

fn main() -> ExitCode
{
    env_logger::Builder::new().filter_level(log::LevelFilter::Info).parse_default_env().init();

    let cli_args = CliArguments::parse();

    let result = (|| -> Result<(), Error> {
        let config = Config::load(cli_args.config.as_deref())?;

        match &cli_args.subcommand {
            ToplevelCommands::Config => config_command(&config),
            ToplevelCommands::Quirk(args) => cli_commands::quirk::run(args, &config),
            ToplevelCommands::Receiver(args) => cli_commands::receiver::run(args, CLI_TIMEOUT),
        }
    })();

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{err}");
            ExitCode::FAILURE
        },
    }
}

// SPDX-License-Identifier: MIT OR Apache-2.0
//! Runtime configuration: quirk directories, vendor-id files, cache paths, poll intervals.

use std::fs;
use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use crate::error::{Error, ErrorKind};

const QUALIFIER: &str = "org";
const ORGANIZATION: &str = "freedesktop";
const APPLICATION: &str = "fwupd-hidpp";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config
{
    pub quirk_dirs: Vec<PathBuf>,
    pub vendor_id_files: Vec<PathBuf>,
    pub vendor_db_path: PathBuf,
    pub peripheral_poll_interval_secs: u64,
    pub receiver_poll_interval_secs: u64,
}

impl Default for Config
{
    fn default() -> Self
    {
        let dirs = project_dirs();
        let data_dir = dirs.as_ref().map(|d| d.data_dir().to_path_buf());
        let cache_dir = dirs.as_ref().map(|d| d.cache_dir().to_path_buf());

        Self {
            quirk_dirs: data_dir
                .iter()
                .map(|d| d.join("quirks.d"))
                .chain(std::iter::once(PathBuf::from("/usr/share/fwupd-hidpp/quirks.d")))
                .collect(),
            vendor_id_files: data_dir.iter().map(|d| d.join("vendor-ids")).collect(),
            vendor_db_path: cache_dir.map(|d| d.join("quirks.db")).unwrap_or_else(|| PathBuf::from("quirks.db")),
            peripheral_poll_interval_secs: 30,
            receiver_poll_interval_secs: 5,
        }
    }
}

fn project_dirs() -> Option<ProjectDirs>
{
    ProjectDirs::from(QUALIFIER, ORGANIZATION, APPLICATION)
}

impl Config
{
    /// Default config file path: `$XDG_CONFIG_HOME/fwupd-hidpp/config.toml`.
    pub fn default_path() -> Option<PathBuf>
    {
        project_dirs().map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Loads from `explicit_path` if given, else [Config::default_path] if it exists, else
    /// the compiled-in default.
    pub fn load(explicit_path: Option<&Path>) -> Result<Self, Error>
    {
        let path = match explicit_path {
            Some(path) => Some(path.to_path_buf()),
            None => Self::default_path().filter(|p| p.exists()),
        };

        match path {
            Some(path) => {
                let text = fs::read_to_string(&path)?;
                toml::from_str(&text).map_err(|err| {
                    ErrorKind::InvalidFile(Some(format!("malformed config at {}: {err}", path.display()))).error()
                })
            },
            None => Ok(Self::default()),
        }
    }
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn default_config_has_nonempty_poll_intervals()
    {
        let config = Config::default();
        assert_eq!(config.peripheral_poll_interval_secs, 30);
        assert_eq!(config.receiver_poll_interval_secs, 5);
    }

    #[test]
    fn load_with_no_path_falls_back_to_default()
    {
        let config = Config::load(None).unwrap();
        assert_eq!(config.receiver_poll_interval_secs, 5);
    }

    #[test]
    fn load_parses_explicit_toml_file()
    {
        let dir = std::env::temp_dir().join(format!("fwupd-hidpp-config-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join("config.toml");
        fs::write(&path, "peripheral_poll_interval_secs = 60\nreceiver_poll_interval_secs = 10\n").unwrap();

        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.peripheral_poll_interval_secs, 60);
        assert_eq!(config.receiver_poll_interval_secs, 10);

        let _ = fs::remove_dir_all(&dir);
    }
}

// SPDX-License-Identifier: MIT OR Apache-2.0
//! The quirk store: scans directories of `.quirk` files plus the vendor-id SQL cache,
//! and answers `lookup`/`iter` queries keyed by GUID (§4.1).

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use uuid::Uuid;

use crate::error::Error;
use crate::quirks::ini::{self, QuirkDocument};
use crate::quirks::vendor_db::VendorDb;

/// Where a [QuirkStore::iter] result came from, so callers/tests can distinguish the two
/// backing stores without peeking at implementation details.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuirkSource
{
    IniFile,
    VendorDb,
}

pub struct QuirkStore
{
    doc: QuirkDocument,
    vendor_db: Option<VendorDb>,
    possible_keys: HashSet<&'static str>,
}

/// Every key the core itself reads from quirk files (§6), seeded so
/// `register_possible_key` has a baseline to build on.
pub const CORE_QUIRK_KEYS: &[&str] = &[
    "Plugin",
    "Flags",
    "Name",
    "Summary",
    "Vendor",
    "VendorId",
    "Protocol",
    "GType",
    "ProxyGType",
    "FirmwareGType",
    "Guid",
    "Guid[quirk]",
    "CounterpartGuid",
    "ParentGuid",
    "ProxyGuid",
    "Children",
    "FirmwareSizeMin",
    "FirmwareSizeMax",
    "InstallDuration",
    "Priority",
    "BatteryThreshold",
    "RemoveDelay",
    "AcquiesceDelay",
    "VersionFormat",
    "Inhibit",
    "Issue",
    "UpdateMessage",
    "UpdateImage",
    "Icon",
];

impl QuirkStore
{
    pub fn new() -> Self
    {
        let mut possible_keys = HashSet::new();
        possible_keys.extend(CORE_QUIRK_KEYS.iter().copied());
        Self { doc: QuirkDocument::new(), vendor_db: None, possible_keys }
    }

    pub fn register_possible_key(&mut self, key: &'static str)
    {
        self.possible_keys.insert(key);
    }

    pub fn possible_keys(&self) -> impl Iterator<Item = &str>
    {
        self.possible_keys.iter().copied()
    }

    /// Scans `dirs` for `*.quirk` files, sorted lexicographically within each directory and
    /// processed in the directory order given, folding every file into one document.
    /// Never mutates the files it reads.
    pub fn load_quirk_dirs(&mut self, dirs: &[PathBuf]) -> Result<(), Error>
    {
        for dir in dirs {
            let mut entries: Vec<PathBuf> = match fs::read_dir(dir) {
                Ok(entries) => entries
                    .filter_map(|e| e.ok())
                    .map(|e| e.path())
                    .filter(|p| p.extension().is_some_and(|ext| ext == "quirk"))
                    .collect(),
                Err(_) => {
                    log::debug!("quirk directory {} not present, skipping", dir.display());
                    continue;
                },
            };
            entries.sort();

            for path in entries {
                match fs::read_to_string(&path) {
                    Ok(text) => ini::parse_into(&mut self.doc, &text),
                    Err(err) => log::warn!("failed to read quirk file {}: {err}", path.display()),
                }
            }
        }
        Ok(())
    }

    pub fn load_vendor_db(&mut self, db_path: &Path, source_files: &[PathBuf]) -> Result<(), Error>
    {
        let mut db = VendorDb::open(db_path)?;
        db.refresh(source_files)?;
        self.vendor_db = Some(db);
        Ok(())
    }

    /// SQL cache first, then the indexed quirk document. Invalid-argument/not-found
    /// collapses to `None` rather than an error, per §4.1.
    pub fn lookup(&self, guid: &Uuid, key: &str) -> Option<String>
    {
        if let Some(db) = &self.vendor_db {
            let instance_id = format!("USB\\VID_{}", guid.as_simple());
            if let Some(value) = db.lookup(&instance_id, key) {
                return Some(value);
            }
        }

        self.doc.lookup(guid, key).map(str::to_string)
    }

    /// Emits all matching values from both sources, tagged with their [QuirkSource].
    pub fn iter(&self, guid: &Uuid, key: Option<&str>) -> Vec<(QuirkSource, String, String)>
    {
        let mut out: Vec<(QuirkSource, String, String)> = self
            .doc
            .iter(guid, key)
            .map(|(k, v)| (QuirkSource::IniFile, k.to_string(), v.to_string()))
            .collect();

        if let Some(db) = &self.vendor_db {
            for want_key in ["Vendor", "Name"] {
                if key.is_some_and(|k| k != want_key) {
                    continue;
                }
                let instance_id = format!("USB\\VID_{}", guid.as_simple());
                if let Some(value) = db.lookup(&instance_id, want_key) {
                    out.push((QuirkSource::VendorDb, want_key.to_string(), value));
                }
            }
        }

        out
    }
}

impl Default for QuirkStore
{
    fn default() -> Self
    {
        Self::new()
    }
}

#[cfg(test)]
mod tests
{
    use super::*;
    use crate::device::instance_id::guid_for;
    use std::io::Write;

    #[test]
    fn lookup_unknown_guid_is_none_not_error()
    {
        let store = QuirkStore::new();
        let guid = guid_for("nonexistent");
        assert_eq!(store.lookup(&guid, "Name"), None);
    }

    #[test]
    fn load_quirk_dirs_processes_files_in_sorted_order()
    {
        let dir = std::env::temp_dir().join(format!("fwupd-hidpp-quirks-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();

        let mut a = fs::File::create(dir.join("10-base.quirk")).unwrap();
        writeln!(a, "[X]\nName = First\n").unwrap();
        drop(a);

        let mut b = fs::File::create(dir.join("20-override.quirk")).unwrap();
        writeln!(b, "[X]\nName = Second\n").unwrap();
        drop(b);

        let mut store = QuirkStore::new();
        store.load_quirk_dirs(&[dir.clone()]).unwrap();

        let guid = guid_for("X");
        assert_eq!(store.lookup(&guid, "Name"), Some("Second".to_string()));

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn possible_keys_include_core_keys()
    {
        let store = QuirkStore::new();
        let keys: HashSet<&str> = store.possible_keys().collect();
        assert!(keys.contains("Flags"));
        assert!(keys.contains("VersionFormat"));
    }
}

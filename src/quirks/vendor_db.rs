// SPDX-License-Identifier: MIT OR Apache-2.0
//! Vendor-ID SQL cache: `usb.ids`/`pci.ids`/`pnp.ids`/`oui.txt` ingested into SQLite and
//! keyed by a composite mtime string for invalidation (§4.1).

use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use rusqlite::{Connection, params};

use crate::error::Error;

/// Opens (creating if needed) the vendor-id cache at `db_path`, rebuilding it from
/// `source_files` whenever their concatenated mtime string no longer matches what is
/// recorded in the cache.
pub struct VendorDb
{
    conn: Connection,
}

impl VendorDb
{
    pub fn open(db_path: &Path) -> Result<Self, Error>
    {
        let conn = Connection::open(db_path)?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS meta (key TEXT PRIMARY KEY, value TEXT NOT NULL);
             CREATE TABLE IF NOT EXISTS instance_ids (
                 instance_id TEXT PRIMARY KEY,
                 vendor TEXT,
                 name TEXT
             );",
        )?;
        Ok(Self { conn })
    }

    /// Rebuilds the cache from `source_files` if the recorded mtime fingerprint doesn't
    /// match the files' current mtimes, concatenated in the order given.
    pub fn refresh(&mut self, source_files: &[PathBuf]) -> Result<(), Error>
    {
        let fingerprint = mtime_fingerprint(source_files)?;
        let stored: Option<String> = self
            .conn
            .query_row("SELECT value FROM meta WHERE key = 'mtime'", [], |row| row.get(0))
            .ok();

        if stored.as_deref() == Some(fingerprint.as_str()) {
            return Ok(());
        }

        log::info!("vendor-id cache stale, rebuilding from {} source files", source_files.len());

        let tx = self.conn.transaction()?;
        tx.execute("DELETE FROM instance_ids", [])?;
        for path in source_files {
            if let Ok(text) = fs::read_to_string(path) {
                ingest_vendor_file(&tx, &text)?;
            }
        }
        tx.execute(
            "INSERT INTO meta (key, value) VALUES ('mtime', ?1)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![fingerprint],
        )?;
        tx.commit()?;

        Ok(())
    }

    /// Looks up `Vendor`/`Name` for an instance id like `USB\VID_046D` or
    /// `USB\VID_046D&PID_C52B`.
    pub fn lookup(&self, instance_id: &str, key: &str) -> Option<String>
    {
        let column = match key {
            "Vendor" => "vendor",
            "Name" => "name",
            _ => return None,
        };
        let sql = format!("SELECT {column} FROM instance_ids WHERE instance_id = ?1");
        self.conn.query_row(&sql, params![instance_id], |row| row.get(0)).ok()
    }
}

fn mtime_fingerprint(paths: &[PathBuf]) -> Result<String, Error>
{
    let mut parts = Vec::with_capacity(paths.len());
    for path in paths {
        let mtime = fs::metadata(path).and_then(|m| m.modified()).unwrap_or(SystemTime::UNIX_EPOCH);
        let secs = mtime.duration_since(SystemTime::UNIX_EPOCH).unwrap_or_default().as_secs();
        parts.push(format!("{}:{secs}", path.display()));
    }
    Ok(parts.join(";"))
}

/// Parses a `usb.ids`-style file: top-level `XXXX  Vendor Name` lines, tab-indented
/// `YYYY  Device Name` lines underneath. Produces `USB\VID_XXXX` and
/// `USB\VID_XXXX&PID_YYYY` instance ids bound to `Vendor`/`Name`.
fn ingest_vendor_file(tx: &rusqlite::Transaction, text: &str) -> Result<(), Error>
{
    let mut current_vendor_id: Option<String> = None;
    let mut current_vendor_name = String::new();

    for line in text.lines() {
        if line.starts_with('#') || line.trim().is_empty() {
            continue;
        }

        if !line.starts_with('\t') {
            let Some((id, name)) = line.split_once(char::is_whitespace) else {
                continue;
            };
            let id = id.trim().to_ascii_uppercase();
            if id.len() != 4 || !id.chars().all(|c| c.is_ascii_hexdigit()) {
                continue;
            }
            let name = name.trim();
            current_vendor_id = Some(id.clone());
            current_vendor_name = name.to_string();

            tx.execute(
                "INSERT OR REPLACE INTO instance_ids (instance_id, vendor, name) VALUES (?1, ?2, ?2)",
                params![format!("USB\\VID_{id}"), name],
            )?;
        } else if let Some(vendor_id) = &current_vendor_id {
            let trimmed = line.trim_start_matches('\t');
            let Some((pid, name)) = trimmed.split_once(char::is_whitespace) else {
                continue;
            };
            let pid = pid.trim().to_ascii_uppercase();
            if pid.len() != 4 || !pid.chars().all(|c| c.is_ascii_hexdigit()) {
                continue;
            }
            let name = name.trim();
            tx.execute(
                "INSERT OR REPLACE INTO instance_ids (instance_id, vendor, name) VALUES (?1, ?2, ?3)",
                params![format!("USB\\VID_{vendor_id}&PID_{pid}"), current_vendor_name, name],
            )?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests
{
    use super::*;
    use std::io::Write;

    #[test]
    fn ingest_and_lookup_vendor_and_device_names()
    {
        let mut conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE instance_ids (instance_id TEXT PRIMARY KEY, vendor TEXT, name TEXT);",
        )
        .unwrap();
        let tx = conn.transaction().unwrap();
        ingest_vendor_file(&tx, "046D  Logitech, Inc.\n\tC52B  Unifying Receiver\n").unwrap();
        tx.commit().unwrap();

        let vendor: String = conn
            .query_row("SELECT vendor FROM instance_ids WHERE instance_id = 'USB\\VID_046D'", [], |r| r.get(0))
            .unwrap();
        assert_eq!(vendor, "Logitech, Inc.");

        let name: String = conn
            .query_row(
                "SELECT name FROM instance_ids WHERE instance_id = 'USB\\VID_046D&PID_C52B'",
                [],
                |r| r.get(0),
            )
            .unwrap();
        assert_eq!(name, "Unifying Receiver");
    }

    #[test]
    fn refresh_skips_rebuild_when_fingerprint_unchanged()
    {
        let dir = std::env::temp_dir().join(format!("fwupd-hidpp-test-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        let ids_path = dir.join("usb.ids");
        let mut file = fs::File::create(&ids_path).unwrap();
        writeln!(file, "046D  Logitech, Inc.").unwrap();
        drop(file);

        let db_path = dir.join("cache.db");
        let mut db = VendorDb::open(&db_path).unwrap();
        db.refresh(&[ids_path.clone()]).unwrap();
        assert_eq!(db.lookup("USB\\VID_046D", "Vendor").as_deref(), Some("Logitech, Inc."));

        // second refresh with the same file should be a no-op, not an error
        db.refresh(&[ids_path]).unwrap();

        let _ = fs::remove_dir_all(&dir);
    }
}

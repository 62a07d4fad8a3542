// SPDX-License-Identifier: MIT OR Apache-2.0
//! Instance-ID construction and instance-ID → GUID resolution (C2).

use bitmask_enum::bitmask;
use uuid::Uuid;

use crate::error::{Error, ErrorKind};

/// Namespace fwupd hashes instance-id strings into. Value matches the well-known
/// `fwupd` namespace UUID so GUIDs derived here are stable across implementations.
const FWUPD_GUID_NAMESPACE: Uuid = Uuid::from_bytes([
    0x67, 0x63, 0xb2, 0x5c, 0x10, 0x3b, 0x41, 0xb9, 0x9c, 0x2e, 0x08, 0xc5, 0x31, 0x92, 0xef, 0xb2,
]);

/// Flags controlling what happens to an instance-id once added to a device.
#[bitmask(u8)]
pub enum InstanceIdFlags
{
    /// Exported to the daemon as a matching GUID, unless `no-generic-guids` suppresses
    /// GENERIC-only ids.
    Visible,
    /// Triggers a quirk lookup keyed by the hashed GUID.
    Quirks,
    /// Marks this id as a fallback, suppressed from export when `no-generic-guids` is set.
    Generic,
}

impl Default for InstanceIdFlags
{
    fn default() -> Self
    {
        InstanceIdFlags::Visible | InstanceIdFlags::Quirks
    }
}

/// Hashes `value` into a GUID, unless it already parses as one.
pub fn guid_for(value: &str) -> Uuid
{
    match Uuid::parse_str(value) {
        Ok(uuid) => uuid,
        Err(_) => Uuid::new_v5(&FWUPD_GUID_NAMESPACE, value.as_bytes()),
    }
}

/// Builds typed instance-id key/value fragments the way `fu_device_add_instance_*` does,
/// then assembles them into `SUBSYS\KEY1_VAL1&KEY2_VAL2…` strings via [InstanceIdBuilder::build].
#[derive(Debug, Default)]
pub struct InstanceIdBuilder
{
    keys: std::collections::HashMap<String, String>,
}

impl InstanceIdBuilder
{
    pub fn new() -> Self
    {
        Self::default()
    }

    /// Adds a raw string value verbatim.
    pub fn add_str(&mut self, key: &str, value: &str) -> &mut Self
    {
        self.keys.insert(key.to_string(), value.to_string());
        self
    }

    /// Adds a string value with non-printable and `/\()_-&,` characters collapsed to a single
    /// `-`, with any trailing `-` trimmed.
    pub fn add_strsafe(&mut self, key: &str, value: &str) -> &mut Self
    {
        let mut out = String::with_capacity(value.len());
        let mut last_was_dash = false;
        for c in value.chars() {
            let safe = c.is_ascii_graphic() && !matches!(c, '/' | '\\' | '(' | ')' | '_' | '-' | '&' | ',');
            if safe {
                out.push(c);
                last_was_dash = false;
            } else if !last_was_dash {
                out.push('-');
                last_was_dash = true;
            }
        }
        while out.ends_with('-') {
            out.pop();
        }
        self.keys.insert(key.to_string(), out);
        self
    }

    /// Adds an upper-cased string value.
    pub fn add_strup(&mut self, key: &str, value: &str) -> &mut Self
    {
        self.keys.insert(key.to_string(), value.to_ascii_uppercase());
        self
    }

    pub fn add_u4(&mut self, key: &str, value: u8) -> &mut Self
    {
        self.keys.insert(key.to_string(), format!("{:01X}", value & 0x0F));
        self
    }

    pub fn add_u8(&mut self, key: &str, value: u8) -> &mut Self
    {
        self.keys.insert(key.to_string(), format!("{value:02X}"));
        self
    }

    pub fn add_u16(&mut self, key: &str, value: u16) -> &mut Self
    {
        self.keys.insert(key.to_string(), format!("{value:04X}"));
        self
    }

    pub fn add_u32(&mut self, key: &str, value: u32) -> &mut Self
    {
        self.keys.insert(key.to_string(), format!("{value:08X}"));
        self
    }

    /// Produces `SUBSYS\KEY1_VAL1&KEY2_VAL2…`. A missing key is an error that suppresses
    /// this instance id entirely (the caller should skip adding it, not add a partial one).
    pub fn build(&self, subsystem: &str, keys: &[&str]) -> Result<String, Error>
    {
        let mut out = String::new();
        out.push_str(subsystem);
        out.push('\\');

        for (i, key) in keys.iter().enumerate() {
            let value = self.keys.get(*key).ok_or_else(|| {
                ErrorKind::NotFound(Some(format!("instance-id key {key:?}"))).error()
            })?;
            if i > 0 {
                out.push('&');
            }
            out.push_str(key);
            out.push('_');
            out.push_str(value);
        }

        Ok(out)
    }
}

/// One instance id plus the flags it was added with, as tracked on a device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceId
{
    pub id: String,
    pub flags: InstanceIdFlags,
}

/// The full set of instance ids and derived GUIDs attached to a device. Adding the same
/// `(id, flags)` pair twice is a no-op (idempotence, §8).
#[derive(Debug, Default)]
pub struct InstanceIdSet
{
    ids: Vec<InstanceId>,
    /// Quirk-only ids, retained separately for debug/incorporation per §3.
    quirk_only: Vec<InstanceId>,
}

impl InstanceIdSet
{
    pub fn new() -> Self
    {
        Self::default()
    }

    /// Adds `id` with `flags`. Returns `false` if this exact pair was already present.
    pub fn add(&mut self, id: &str, flags: InstanceIdFlags) -> bool
    {
        let entry = InstanceId { id: id.to_string(), flags };
        if self.ids.contains(&entry) {
            return false;
        }
        if flags.contains(InstanceIdFlags::Quirks) && !flags.contains(InstanceIdFlags::Visible) {
            self.quirk_only.push(entry);
        } else {
            self.ids.push(entry);
        }
        true
    }

    pub fn iter(&self) -> impl Iterator<Item = &InstanceId>
    {
        self.ids.iter().chain(self.quirk_only.iter())
    }

    /// GUIDs for ids flagged `VISIBLE`, honoring `no-generic-guids` by dropping ids whose
    /// *only* flag beyond VISIBLE/QUIRKS is GENERIC.
    pub fn visible_guids(&self, no_generic_guids: bool) -> Vec<uuid::Uuid>
    {
        self.ids
            .iter()
            .filter(|e| e.flags.contains(InstanceIdFlags::Visible))
            .filter(|e| !(no_generic_guids && e.flags.contains(InstanceIdFlags::Generic)))
            .map(|e| guid_for(&e.id))
            .collect()
    }

    /// GUIDs used for quirk lookups: every id flagged `QUIRKS`, visible or not.
    pub fn quirk_guids(&self) -> Vec<uuid::Uuid>
    {
        self.iter()
            .filter(|e| e.flags.contains(InstanceIdFlags::Quirks))
            .map(|e| guid_for(&e.id))
            .collect()
    }
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn u8_instance_id_round_trips()
    {
        let mut builder = InstanceIdBuilder::new();
        builder.add_u8("PID", 0x3E);
        let id = builder.build("USB", &["PID"]).unwrap();
        assert_eq!(id, "USB\\PID_3E");
    }

    #[test]
    fn missing_key_is_an_error()
    {
        let builder = InstanceIdBuilder::new();
        assert!(builder.build("USB", &["PID"]).is_err());
    }

    #[test]
    fn strsafe_collapses_and_trims()
    {
        let mut builder = InstanceIdBuilder::new();
        builder.add_strsafe("NAME", "foo/bar(baz)--");
        let id = builder.build("X", &["NAME"]).unwrap();
        assert_eq!(id, "X\\NAME_foo-bar-baz");
    }

    #[test]
    fn guid_for_passthrough_on_valid_uuid()
    {
        let uuid_str = "f47ac10b-58cc-4372-a567-0e02b2c3d479";
        assert_eq!(guid_for(uuid_str).to_string(), uuid_str);
    }

    #[test]
    fn guid_for_hashes_non_uuid_strings_deterministically()
    {
        let a = guid_for("USB\\VID_046D&PID_C52B");
        let b = guid_for("USB\\VID_046D&PID_C52B");
        assert_eq!(a, b);
    }

    #[test]
    fn adding_same_pair_twice_is_idempotent()
    {
        let mut set = InstanceIdSet::new();
        assert!(set.add("USB\\VID_046D", InstanceIdFlags::default()));
        assert!(!set.add("USB\\VID_046D", InstanceIdFlags::default()));
        assert_eq!(set.iter().count(), 1);
    }
}

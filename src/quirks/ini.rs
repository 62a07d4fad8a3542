// SPDX-License-Identifier: MIT OR Apache-2.0
//! INI-style `.quirk` file parsing (§4.1, §6).

use std::collections::BTreeMap;

use crate::device::instance_id::guid_for;
use uuid::Uuid;

/// One compiled `.quirk` document: `device[id=GUID]` groups, each holding `key=value`
/// children, mirroring the XML-like indexed document the original compiles files into.
#[derive(Debug, Default, Clone)]
pub struct QuirkDocument
{
    pub groups: BTreeMap<Uuid, BTreeMap<String, String>>,
}

/// Characters `Flags=` values are allowed to contain: alphanumeric lowercase, `,`, `~`, `-`.
fn is_valid_flags_char(c: char) -> bool
{
    c.is_ascii_lowercase() || c.is_ascii_digit() || matches!(c, ',' | '~' | '-')
}

/// Validates a `Flags=` value, warning (not failing) on violation, matching `fu-quirks.c`.
pub fn validate_flags_value(value: &str) -> bool
{
    let ok = value.chars().all(is_valid_flags_char);
    if !ok {
        log::warn!("quirk Flags value {value:?} contains characters outside [a-z0-9,~-]");
    }
    ok
}

/// Parses one `.quirk` file's text into `(group_header, key, value)` triples folded onto
/// `doc`. A group header that isn't already a valid GUID is hashed into one. Unknown keys
/// in a group do not prevent other keys in the same group from being applied; a malformed
/// `Flags=` line is warned, not fatal, and is still stored.
pub fn parse_into(doc: &mut QuirkDocument, text: &str)
{
    let mut current: Option<Uuid> = None;

    for raw_line in text.lines() {
        let line = raw_line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        if line.starts_with('[') && line.ends_with(']') {
            let header = &line[1..line.len() - 1];
            current = Some(guid_for(header));
            doc.groups.entry(current.unwrap()).or_default();
            continue;
        }

        let Some(group) = current else {
            log::warn!("quirk line {line:?} found before any [group] header, ignoring");
            continue;
        };

        let Some((key, value)) = line.split_once('=') else {
            log::warn!("quirk line {line:?} is not a Key=Value pair, ignoring");
            continue;
        };
        let key = key.trim();
        let value = value.trim();

        if key.eq_ignore_ascii_case("flags") {
            validate_flags_value(value);
        }

        doc.groups.entry(group).or_default().insert(key.to_string(), value.to_string());
    }
}

impl QuirkDocument
{
    pub fn new() -> Self
    {
        Self::default()
    }

    /// `device[@id=?]/value[@key=?]`: the single-value lookup.
    pub fn lookup(&self, guid: &Uuid, key: &str) -> Option<&str>
    {
        self.groups.get(guid)?.get(key).map(String::as_str)
    }

    /// `device[@id=?]/value`: all key/value pairs for a group, optionally filtered by key.
    pub fn iter<'a>(&'a self, guid: &Uuid, key: Option<&'a str>) -> impl Iterator<Item = (&'a str, &'a str)> + 'a
    {
        self.groups
            .get(guid)
            .into_iter()
            .flat_map(|group| group.iter())
            .filter(move |(k, _)| key.is_none_or(|want| want == k.as_str()))
            .map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn group_header_already_a_guid_is_kept_verbatim()
    {
        let mut doc = QuirkDocument::new();
        let guid_str = "f47ac10b-58cc-4372-a567-0e02b2c3d479";
        parse_into(&mut doc, &format!("[{guid_str}]\nName = Widget\n"));
        let guid: Uuid = guid_str.parse().unwrap();
        assert_eq!(doc.lookup(&guid, "Name"), Some("Widget"));
    }

    #[test]
    fn group_header_string_is_hashed_into_a_guid()
    {
        let mut doc = QuirkDocument::new();
        parse_into(&mut doc, "[USB\\VID_046D&PID_C52B]\nName = Unifying Receiver\n");
        let guid = guid_for("USB\\VID_046D&PID_C52B");
        assert_eq!(doc.lookup(&guid, "Name"), Some("Unifying Receiver"));
    }

    #[test]
    fn unknown_key_does_not_block_sibling_keys()
    {
        let mut doc = QuirkDocument::new();
        parse_into(&mut doc, "[X]\nTotallyUnknownKey = 1\nName = Y\n");
        let guid = guid_for("X");
        assert_eq!(doc.lookup(&guid, "Name"), Some("Y"));
        assert_eq!(doc.lookup(&guid, "TotallyUnknownKey"), Some("1"));
    }

    #[test]
    fn invalid_flags_value_warns_but_is_still_stored()
    {
        let mut doc = QuirkDocument::new();
        parse_into(&mut doc, "[X]\nFlags = Has Spaces!\n");
        let guid = guid_for("X");
        assert_eq!(doc.lookup(&guid, "Flags"), Some("Has Spaces!"));
    }

    #[test]
    fn iter_filters_by_key()
    {
        let mut doc = QuirkDocument::new();
        parse_into(&mut doc, "[X]\nA = 1\nB = 2\n");
        let guid = guid_for("X");
        let all: Vec<_> = doc.iter(&guid, None).collect();
        assert_eq!(all.len(), 2);
        let just_a: Vec<_> = doc.iter(&guid, Some("A")).collect();
        assert_eq!(just_a, vec![("A", "1")]);
    }
}

// SPDX-License-Identifier: MIT OR Apache-2.0
//! Version number rendering/parsing. Restores `fu-device.c`'s full `VersionFormat` table
//! (supplemented from original_source/, §4 of the expanded requirements) rather than the
//! handful of formats the distilled spec names directly.

use std::fmt;

/// How a raw `u64` version is rendered to, and parsed from, a human string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VersionFormat
{
    Plain,
    Hex,
    HexPrefix,
    Pair,
    Triplet,
    Quad,
    Bcd,
    IntelMe,
    IntelMe2,
    SurfaceLegacy,
    Surface,
    DellBios,
}

impl VersionFormat
{
    /// Renders `raw` per this format, mirroring `fu_version_format_from_uint64`.
    pub fn render(self, raw: u64) -> String
    {
        use VersionFormat::*;
        match self {
            Plain => raw.to_string(),
            Hex => format!("{raw:#x}"),
            HexPrefix => format!("0x{raw:08x}"),
            Pair => {
                let major = (raw >> 16) & 0xFFFF;
                let minor = raw & 0xFFFF;
                format!("{major}.{minor}")
            },
            Triplet => {
                let major = (raw >> 16) & 0xFF;
                let minor = (raw >> 8) & 0xFF;
                let micro = raw & 0xFF;
                format!("{major}.{minor}.{micro}")
            },
            Quad => {
                let a = (raw >> 48) & 0xFFFF;
                let b = (raw >> 32) & 0xFFFF;
                let c = (raw >> 16) & 0xFFFF;
                let d = raw & 0xFFFF;
                format!("{a}.{b}.{c}.{d}")
            },
            Bcd => {
                let major = (raw >> 8) & 0xFF;
                let minor = raw & 0xFF;
                format!("{}.{}", bcd_byte(major as u8), bcd_byte(minor as u8))
            },
            IntelMe => {
                let major = (raw >> 28) & 0xF;
                let minor = (raw >> 24) & 0xF;
                let micro = (raw >> 12) & 0xFFF;
                let build = raw & 0xFFF;
                format!("{major}.{minor}.{micro}.{build}")
            },
            IntelMe2 => {
                let major = (raw >> 24) & 0xFF;
                let minor = (raw >> 16) & 0xFF;
                let micro = (raw >> 8) & 0xFF;
                let build = raw & 0xFF;
                format!("{major}.{minor}.{micro}.{build}")
            },
            SurfaceLegacy => {
                let major = (raw >> 16) & 0xFF;
                let minor = (raw >> 8) & 0xFF;
                let micro = raw & 0xFF;
                format!("{major}.{minor}.{micro}")
            },
            Surface => {
                let major = (raw >> 48) & 0xFF;
                let minor = (raw >> 32) & 0xFFFF;
                let build = raw & 0xFFFFFFFF;
                format!("{major}.{minor}.{build}")
            },
            DellBios => {
                let major = (raw >> 24) & 0xFF;
                let minor = (raw >> 16) & 0xFF;
                let build = raw & 0xFFFF;
                format!("{major:02}.{minor:02}.{build:02}")
            },
        }
    }

    /// Parses a rendered string back into the raw `u64`, the inverse of [Self::render] for
    /// the formats that admit a lossless round trip (`Plain`/`Hex`/`HexPrefix`/`Pair`/
    /// `Triplet`/`Quad`). Other formats lose precision on render and return `None`.
    pub fn parse(self, text: &str) -> Option<u64>
    {
        use VersionFormat::*;
        match self {
            Plain => text.parse().ok(),
            Hex => u64::from_str_radix(text.trim_start_matches("0x"), 16).ok(),
            HexPrefix => u64::from_str_radix(text.trim_start_matches("0x"), 16).ok(),
            Pair => {
                let mut parts = text.splitn(2, '.');
                let major: u64 = parts.next()?.parse().ok()?;
                let minor: u64 = parts.next()?.parse().ok()?;
                Some((major << 16) | (minor & 0xFFFF))
            },
            Triplet => {
                let mut parts = text.splitn(3, '.');
                let major: u64 = parts.next()?.parse().ok()?;
                let minor: u64 = parts.next()?.parse().ok()?;
                let micro: u64 = parts.next()?.parse().ok()?;
                Some((major << 16) | ((minor & 0xFF) << 8) | (micro & 0xFF))
            },
            Quad => {
                let mut parts = text.splitn(4, '.');
                let a: u64 = parts.next()?.parse().ok()?;
                let b: u64 = parts.next()?.parse().ok()?;
                let c: u64 = parts.next()?.parse().ok()?;
                let d: u64 = parts.next()?.parse().ok()?;
                Some((a << 48) | ((b & 0xFFFF) << 32) | ((c & 0xFFFF) << 16) | (d & 0xFFFF))
            },
            _ => None,
        }
    }
}

fn bcd_byte(b: u8) -> u8
{
    (b >> 4) * 10 + (b & 0xF)
}

impl fmt::Display for VersionFormat
{
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result
    {
        use VersionFormat::*;
        let name = match self {
            Plain => "plain",
            Hex => "hex",
            HexPrefix => "hex-prefix",
            Pair => "pair",
            Triplet => "triplet",
            Quad => "quad",
            Bcd => "bcd",
            IntelMe => "intel-me",
            IntelMe2 => "intel-me2",
            SurfaceLegacy => "surface-legacy",
            Surface => "surface",
            DellBios => "dell-bios",
        };
        write!(f, "{name}")
    }
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn triplet_render_matches_bcd_style_major_minor_micro()
    {
        let raw = (1u64 << 16) | (2 << 8) | 3;
        assert_eq!(VersionFormat::Triplet.render(raw), "1.2.3");
    }

    #[test]
    fn pair_round_trips()
    {
        let raw = (7u64 << 16) | 42;
        let text = VersionFormat::Pair.render(raw);
        assert_eq!(VersionFormat::Pair.parse(&text), Some(raw));
    }

    #[test]
    fn bcd_renders_decimal_digits_from_nibbles()
    {
        // 0x0102 -> major nibbles 01 -> "1", minor 02 -> "2"
        assert_eq!(VersionFormat::Bcd.render(0x0102), "1.2");
    }

    #[test]
    fn quad_round_trips()
    {
        let raw = (1u64 << 48) | (2 << 32) | (3 << 16) | 4;
        let text = VersionFormat::Quad.render(raw);
        assert_eq!(text, "1.2.3.4");
        assert_eq!(VersionFormat::Quad.parse(&text), Some(raw));
    }
}

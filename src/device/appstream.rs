// SPDX-License-Identifier: MIT OR Apache-2.0
//! AppStream component merge (§4.3 `ensure_from_component`).
//!
//! The AppStream/metadata *ingestion pipeline* (fetching and parsing `.xml.gz` catalogs)
//! is out of scope — that's a daemon-side concern. What the device core still needs is the
//! merge step itself: given an already-parsed component, fold its fields onto a device,
//! each behind the `md-set-*` private flag that requested it, clearing that flag once
//! applied.

use crate::device::core::DeviceCore;
use crate::device::flags::DeviceFlags;
use crate::device::version::VersionFormat;

/// A pre-parsed AppStream `<component>` record. Produced by a caller outside this crate
/// (the daemon's metadata layer); this module only knows how to merge one onto a device.
#[derive(Debug, Clone, Default)]
pub struct Component
{
    pub name: Option<String>,
    pub category_human_name: Option<String>,
    pub developer_name: Option<String>,
    pub icon: Option<String>,
    /// `DeviceIntegrity` → signed/unsigned payload flag.
    pub integrity_signed: Option<bool>,
    /// CSV of flag hints from `DeviceFlags` in the component.
    pub device_flags_csv: Option<String>,
    pub version_format: Option<VersionFormat>,
}

/// Private flags gating which fields `ensure_from_component` is allowed to merge; each is
/// cleared once its field has been applied.
pub mod md_set
{
    pub const NAME: &str = "md-set-name";
    pub const SUMMARY: &str = "md-set-summary";
    pub const ICON: &str = "md-set-icon";
    pub const VERSION_FORMAT: &str = "md-set-version-format";
}

/// Merges `component` onto `device`, honoring the `md-set-*` gates and re-rendering any raw
/// numeric version under a freshly merged `version_format`.
pub fn ensure_from_component(device: &mut DeviceCore, component: &Component)
{
    if device.private_flags.has(md_set::NAME) {
        if let Some(name) = &component.name {
            device.sanitize_and_set_name(name);
        } else if let Some(category) = &component.category_human_name {
            device.sanitize_and_set_name(category);
        }
        device.private_flags.clear(md_set::NAME);
    }

    if let Some(developer) = &component.developer_name {
        device.vendor.get_or_insert_with(|| developer.clone());
    }

    if device.private_flags.has(md_set::ICON) {
        if let Some(icon) = &component.icon {
            device.metadata.insert("icon".to_string(), icon.clone());
        }
        device.private_flags.clear(md_set::ICON);
    }

    if let Some(signed) = component.integrity_signed {
        let _ = device.add_flag(if signed { DeviceFlags::SignedPayload } else { DeviceFlags::UnsignedPayload });
    }

    if let Some(csv) = &component.device_flags_csv {
        for hint in csv.split(',').map(str::trim).filter(|s| !s.is_empty()) {
            apply_flag_hint(device, hint);
        }
    }

    if device.private_flags.has(md_set::VERSION_FORMAT) {
        if let Some(format) = component.version_format {
            device.version_format = format;
            if let Some(raw) = device.version_raw {
                device.version = Some(format.render(raw));
            }
        }
        device.private_flags.clear(md_set::VERSION_FORMAT);
    }
}

fn apply_flag_hint(device: &mut DeviceCore, hint: &str)
{
    let flag = match hint {
        "updatable" => DeviceFlags::Updatable,
        "is-bootloader" => DeviceFlags::IsBootloader,
        "needs-bootloader" => DeviceFlags::NeedsBootloader,
        "needs-activation" => DeviceFlags::NeedsActivation,
        "signed-payload" => DeviceFlags::SignedPayload,
        "unsigned-payload" => DeviceFlags::UnsignedPayload,
        "can-verify" => DeviceFlags::CanVerify,
        "can-verify-image" => DeviceFlags::CanVerifyImage,
        _ => {
            log::debug!("ignoring unknown DeviceFlags hint {hint:?} from AppStream component");
            return;
        },
    };
    if let Err(conflict) = device.flags.try_add(flag) {
        log::warn!("AppStream hint {hint:?} conflicts with existing flags: {conflict:?}");
    }
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn merge_only_applies_name_when_gated()
    {
        let mut device = DeviceCore::new();
        let component = Component { name: Some("Widget".into()), ..Default::default() };

        ensure_from_component(&mut device, &component);
        assert_eq!(device.name, None);

        device.private_flags.register(md_set::NAME);
        device.private_flags.set(md_set::NAME);
        ensure_from_component(&mut device, &component);
        assert_eq!(device.name.as_deref(), Some("Widget"));
        assert!(!device.private_flags.has(md_set::NAME));
    }

    #[test]
    fn merge_applies_flag_hints_csv()
    {
        let mut device = DeviceCore::new();
        let component = Component { device_flags_csv: Some("updatable, is-bootloader".into()), ..Default::default() };
        ensure_from_component(&mut device, &component);
        assert!(device.flags.contains(DeviceFlags::Updatable));
        assert!(device.flags.contains(DeviceFlags::IsBootloader));
    }

    #[test]
    fn merge_rerenders_raw_version_under_new_format()
    {
        let mut device = DeviceCore::new();
        device.private_flags.register(md_set::VERSION_FORMAT);
        device.private_flags.set(md_set::VERSION_FORMAT);
        device.version_raw = Some((1u64 << 16) | 2);

        let component = Component { version_format: Some(VersionFormat::Pair), ..Default::default() };
        ensure_from_component(&mut device, &component);
        assert_eq!(device.version.as_deref(), Some("1.2"));
    }
}

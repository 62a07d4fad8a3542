// SPDX-License-Identifier: MIT OR Apache-2.0
//! Public device flags and the per-subtype private flag registry.

use std::collections::HashSet;

use bitmask_enum::bitmask;

/// Public, exported device state. Mirrors the flag bits a daemon would hand a UI.
#[bitmask(u32)]
#[bitmask_config(vec_debug)]
pub enum DeviceFlags
{
    Updatable,
    UpdatableHidden,
    IsBootloader,
    NeedsBootloader,
    NeedsActivation,
    WaitForReplug,
    SignedPayload,
    UnsignedPayload,
    Emulated,
    Unreachable,
    CanVerify,
    CanVerifyImage,
    InstallAllReleases,
    VersionCheckRequired,
}

/// Errors produced when mutating [DeviceFlags] would violate a mutual-exclusion rule.
#[derive(Debug, PartialEq, Eq)]
pub enum FlagConflict
{
    BootloaderState,
    PayloadSigning,
}

impl DeviceFlags
{
    /// Adds `flag`, refusing combinations that violate §3's mutual exclusions:
    /// `needs-bootloader` ⊕ `is-bootloader`, `signed-payload` ⊕ `unsigned-payload`.
    pub fn try_add(&mut self, flag: DeviceFlags) -> Result<(), FlagConflict>
    {
        if flag == DeviceFlags::IsBootloader && self.contains(DeviceFlags::NeedsBootloader) {
            return Err(FlagConflict::BootloaderState);
        }
        if flag == DeviceFlags::NeedsBootloader && self.contains(DeviceFlags::IsBootloader) {
            return Err(FlagConflict::BootloaderState);
        }
        if flag == DeviceFlags::SignedPayload && self.contains(DeviceFlags::UnsignedPayload) {
            return Err(FlagConflict::PayloadSigning);
        }
        if flag == DeviceFlags::UnsignedPayload && self.contains(DeviceFlags::SignedPayload) {
            return Err(FlagConflict::PayloadSigning);
        }

        *self |= flag;

        // can-verify-image implies can-verify
        if flag == DeviceFlags::CanVerifyImage {
            *self |= DeviceFlags::CanVerify;
        }
        if flag == DeviceFlags::InstallAllReleases {
            *self |= DeviceFlags::VersionCheckRequired;
        }

        Ok(())
    }
}

/// Interned string set for per-subtype private flags. Unlike [DeviceFlags], these are not
/// exported and have no fixed bit layout — each concrete device kind registers the names it
/// understands, and setting an unregistered name is a programmer error.
#[derive(Debug, Default, Clone)]
pub struct PrivateFlags
{
    registered: HashSet<&'static str>,
    set: HashSet<&'static str>,
}

impl PrivateFlags
{
    pub fn new() -> Self
    {
        Self::default()
    }

    /// Registers `name` as a known private flag for this device's concrete type.
    pub fn register(&mut self, name: &'static str)
    {
        self.registered.insert(name);
    }

    pub fn register_all(&mut self, names: &[&'static str])
    {
        for name in names {
            self.register(name);
        }
    }

    /// Sets `name`. Panics in debug builds (and warns in release) if `name` was never
    /// registered, matching the "unregistered name is a programmer error" rule.
    pub fn set(&mut self, name: &'static str)
    {
        if !self.registered.contains(name) {
            if cfg!(debug_assertions) {
                panic!("attempt to set unregistered private flag {name:?}");
            }
            log::warn!("attempt to set unregistered private flag {name:?}");
        }
        self.set.insert(name);
    }

    pub fn clear(&mut self, name: &str)
    {
        self.set.remove(name);
    }

    pub fn has(&self, name: &str) -> bool
    {
        self.set.contains(name)
    }
}

/// Well-known private flag names used by the core itself, matching `fu-device.c`'s constants.
pub mod well_known
{
    pub const RETRY_OPEN: &str = "retry-open";
    pub const REPLUG_MATCH_GUID: &str = "replug-match-guid";
    pub const IS_OPEN: &str = "is-open";
    pub const USE_PARENT_FOR_OPEN: &str = "use-parent-for-open";
    pub const USE_PROXY_FOR_OPEN: &str = "use-proxy-for-open";
    pub const REFCOUNTED_PROXY: &str = "refcounted-proxy";
    pub const INHIBIT_CHILDREN: &str = "inhibit-children";
    pub const AUTO_PAUSE_POLLING: &str = "auto-pause-polling";
    pub const HOST_FIRMWARE: &str = "host-firmware";
    pub const NO_AUTO_INSTANCE_IDS: &str = "no-auto-instance-ids";
    pub const NO_GENERIC_GUIDS: &str = "no-generic-guids";
    pub const USE_PARENT_FOR_BATTERY: &str = "use-parent-for-battery";
    pub const REBIND_ATTACH: &str = "rebind-attach";

    pub const CORE_FLAGS: &[&str] = &[
        RETRY_OPEN,
        REPLUG_MATCH_GUID,
        IS_OPEN,
        USE_PARENT_FOR_OPEN,
        USE_PROXY_FOR_OPEN,
        REFCOUNTED_PROXY,
        INHIBIT_CHILDREN,
        AUTO_PAUSE_POLLING,
        HOST_FIRMWARE,
        NO_AUTO_INSTANCE_IDS,
        NO_GENERIC_GUIDS,
        USE_PARENT_FOR_BATTERY,
        REBIND_ATTACH,
    ];
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn bootloader_flags_are_mutually_exclusive()
    {
        let mut flags = DeviceFlags::none();
        flags.try_add(DeviceFlags::IsBootloader).unwrap();
        assert_eq!(flags.try_add(DeviceFlags::NeedsBootloader), Err(FlagConflict::BootloaderState));
    }

    #[test]
    fn can_verify_image_implies_can_verify()
    {
        let mut flags = DeviceFlags::none();
        flags.try_add(DeviceFlags::CanVerifyImage).unwrap();
        assert!(flags.contains(DeviceFlags::CanVerify));
    }

    #[test]
    fn install_all_releases_implies_version_check()
    {
        let mut flags = DeviceFlags::none();
        flags.try_add(DeviceFlags::InstallAllReleases).unwrap();
        assert!(flags.contains(DeviceFlags::VersionCheckRequired));
    }

    #[test]
    #[should_panic]
    fn unregistered_private_flag_panics_in_debug()
    {
        let mut flags = PrivateFlags::new();
        flags.set("not-registered");
    }

    #[test]
    fn registered_private_flag_round_trips()
    {
        let mut flags = PrivateFlags::new();
        flags.register(well_known::IS_OPEN);
        flags.set(well_known::IS_OPEN);
        assert!(flags.has(well_known::IS_OPEN));
        flags.clear(well_known::IS_OPEN);
        assert!(!flags.has(well_known::IS_OPEN));
    }
}

// SPDX-License-Identifier: MIT OR Apache-2.0
//! The device core: identity, flags, inhibits, metadata, children, events (§3, §4.3, §9).
//!
//! `fwupd`'s `FuDevice → FwupdDevice` class hierarchy is replaced with composition: this
//! `DeviceCore` owns the data, and a [DeviceOps] trait carries the subclass-overridable
//! behavior (`probe`/`setup`/`open`/`close`/...). Concrete device kinds (the HID++
//! peripheral, bootloader, and receiver types) implement `DeviceOps` over a `DeviceCore`
//! they hold, rather than inheriting from it.

use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};

use uuid::Uuid;

use crate::device::events::EventLog;
use crate::device::flags::{DeviceFlags, PrivateFlags};
use crate::device::inhibit::{Inhibits, Problem};
use crate::device::instance_id::{InstanceIdFlags, InstanceIdSet};
use crate::device::version::VersionFormat;
use crate::error::{Error, ErrorKind};

/// Bitmask selecting which fields [DeviceCore::incorporate] copies from a donor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IncorporateFlags
{
    /// Only the baseline identity/context/delay/icon fields named in §4.3.
    Basic,
    /// Everything `Basic` copies, plus private-flags, timestamps, equivalent-id, proxy,
    /// custom-flags, parent-guids/physical-ids/backend-ids, counterpart-guids, metadata,
    /// possible-plugins, and instance-id-quirks — and triggers a quirk-cascade per GUID.
    All,
}

/// `probe → setup → (ready) → usable` lifecycle stage, tracked so each hook runs once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LifecycleStage
{
    Created,
    Probed,
    SetUp,
    Ready,
}

/// Update state machine values (§4.3 state diagram).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateState
{
    Unknown,
    Pending,
    Success,
    Failed,
    NeedsReboot,
}

/// `probe → setup → detach → write → attach → reload` update phase, used for progress
/// reporting and to know which step failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdatePhase
{
    Prepare,
    Detach,
    Write,
    Attach,
    Reload,
}

/// A pending user-facing request, e.g. `org.freedesktop.fwupd.request.remove-replug`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind
{
    Immediate,
    Post,
}

#[derive(Debug, Clone)]
pub struct Request
{
    pub kind: RequestKind,
    pub id: String,
    pub message: String,
    pub image: Option<String>,
    pub device_id: Option<String>,
}

/// The core data every device carries, independent of its concrete protocol.
#[derive(Debug)]
pub struct DeviceCore
{
    pub device_id: String,
    pub physical_id: Option<String>,
    pub logical_id: Option<String>,
    pub backend_id: Option<String>,
    pub equivalent_id: Option<String>,

    pub vid: Option<u16>,
    pub pid: Option<u16>,
    pub name: Option<String>,
    pub vendor: Option<String>,

    pub version: Option<String>,
    pub version_raw: Option<u64>,
    pub version_lowest: Option<String>,
    pub version_bootloader: Option<String>,
    pub version_format: VersionFormat,

    pub created_usec: u64,
    pub modified_usec: u64,

    pub flags: DeviceFlags,
    pub private_flags: PrivateFlags,
    pub custom_flags: Vec<String>,

    pub inhibits: Inhibits,
    pub instance_ids: InstanceIdSet,

    pub remove_delay_ms: u32,
    pub acquiesce_delay_ms: u32,
    pub battery_level: Option<u8>,
    pub battery_threshold: u8,

    pub metadata: HashMap<String, String>,
    pub events: EventLog,

    pub update_state: UpdateState,
    pub update_error: Option<String>,
    pub update_message: Option<String>,
    pub update_image: Option<String>,

    pub request_cnts: HashMap<&'static str, u32>,
    pub open_refcount: u32,
    pub poll_locker_cnt: u32,
    pub poll_interval_ms: Option<u32>,

    pub lifecycle: LifecycleStage,

    /// Set by `add_instance_id` once `setup` has completed, so GUIDs are emitted
    /// immediately for any instance id added afterward (§4.3).
    pub setup_complete: bool,
}

/// The default request id for a user-visible replug request.
pub const REQUEST_ID_REMOVE_REPLUG: &str = "org.freedesktop.fwupd.request.remove-replug";

impl Default for DeviceCore
{
    fn default() -> Self
    {
        let now = now_usec();
        let mut private_flags = PrivateFlags::new();
        private_flags.register_all(crate::device::flags::well_known::CORE_FLAGS);

        Self {
            device_id: String::new(),
            physical_id: None,
            logical_id: None,
            backend_id: None,
            equivalent_id: None,
            vid: None,
            pid: None,
            name: None,
            vendor: None,
            version: None,
            version_raw: None,
            version_lowest: None,
            version_bootloader: None,
            version_format: VersionFormat::Plain,
            created_usec: now,
            modified_usec: now,
            flags: DeviceFlags::none(),
            private_flags,
            custom_flags: Vec::new(),
            inhibits: Inhibits::new(),
            instance_ids: InstanceIdSet::new(),
            remove_delay_ms: 0,
            acquiesce_delay_ms: 0,
            battery_level: None,
            battery_threshold: 20,
            metadata: HashMap::new(),
            events: EventLog::new(),
            update_state: UpdateState::Unknown,
            update_error: None,
            update_message: None,
            update_image: None,
            request_cnts: HashMap::new(),
            open_refcount: 0,
            poll_locker_cnt: 0,
            poll_interval_ms: None,
            lifecycle: LifecycleStage::Created,
            setup_complete: false,
        }
    }
}

fn now_usec() -> u64
{
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_micros() as u64
}

/// Sanitizes `raw` per `fu-device.c`'s name cleanup: printable-only, single spaces,
/// trimmed trailing whitespace, `(TM)` → `™`, `(R)` → nothing, and (if `vendor` is given
/// and its upper-cased form prefixes the name) the vendor prefix stripped.
pub fn sanitize_name(raw: &str, vendor: Option<&str>) -> String
{
    let mut out = String::with_capacity(raw.len());
    let mut last_was_space = false;
    for c in raw.chars() {
        if c.is_control() {
            continue;
        }
        if c.is_whitespace() {
            if !last_was_space && !out.is_empty() {
                out.push(' ');
            }
            last_was_space = true;
        } else {
            out.push(c);
            last_was_space = false;
        }
    }
    let trimmed = out.trim_end().to_string();

    let trimmed = trimmed.replace("(TM)", "\u{2122}").replace("(R)", "");
    let trimmed = trimmed.split_whitespace().collect::<Vec<_>>().join(" ");

    if let Some(vendor) = vendor {
        let prefix = format!("{} ", vendor.to_ascii_uppercase());
        if trimmed.to_ascii_uppercase().starts_with(&prefix) {
            return trimmed[prefix.len()..].to_string();
        }
    }

    trimmed
}

impl DeviceCore
{
    pub fn new() -> Self
    {
        Self::default()
    }

    /// Sets the device id. If `s` already looks like a valid id (40-hex SHA1, or any
    /// string the caller has pre-validated), it is used verbatim; otherwise it is hashed.
    /// A device id is "valid" here when it is exactly 40 lowercase hex characters.
    pub fn set_id(&mut self, s: &str)
    {
        self.device_id = if is_valid_device_id(s) {
            s.to_string()
        } else {
            sha1_hex(s.as_bytes())
        };
    }

    /// `physical_id:logical_id` hashed into a 40-hex SHA1 device id, matching §3.
    pub fn set_id_from_physical_logical(&mut self)
    {
        let physical = self.physical_id.clone().unwrap_or_default();
        let logical = self.logical_id.clone().unwrap_or_default();
        let composite = format!("{physical}:{logical}");
        self.set_id(&composite);
    }

    /// Forbidden after setup completes (the caller should check `lifecycle` first); this
    /// helper just performs the mutation the way `fu_device_set_physical_id` does once
    /// that precondition has been checked, logging and ignoring otherwise.
    pub fn set_physical_id(&mut self, id: &str) -> Result<(), Error>
    {
        if self.lifecycle >= LifecycleStage::SetUp {
            log::warn!("ignoring set_physical_id after setup for {}", self.device_id);
            return Ok(());
        }
        self.physical_id = Some(id.to_string());
        Ok(())
    }

    pub fn set_logical_id(&mut self, id: &str) -> Result<(), Error>
    {
        if self.lifecycle >= LifecycleStage::SetUp {
            log::warn!("ignoring set_logical_id after setup for {}", self.device_id);
            return Ok(());
        }
        self.logical_id = Some(id.to_string());
        Ok(())
    }

    pub fn set_backend_id(&mut self, id: &str) -> Result<(), Error>
    {
        if self.lifecycle >= LifecycleStage::SetUp {
            log::warn!("ignoring set_backend_id after setup for {}", self.device_id);
            return Ok(());
        }
        self.backend_id = Some(id.to_string());
        Ok(())
    }

    /// Adds an instance id with `flags`. After setup has completed, the corresponding GUID
    /// is returned immediately so the caller can emit it without waiting for a future
    /// `setup()` pass.
    pub fn add_instance_id(&mut self, id: &str, flags: InstanceIdFlags) -> Option<Uuid>
    {
        let added = self.instance_ids.add(id, flags);
        if added && self.setup_complete && flags.contains(InstanceIdFlags::Visible) {
            return Some(crate::device::instance_id::guid_for(id));
        }
        None
    }

    /// Adds a public flag, enforcing mutual exclusions and the `needs-activation`/
    /// `unreachable` side effects named in §4.3.
    pub fn add_flag(&mut self, flag: DeviceFlags) -> Result<(), Error>
    {
        self.flags.try_add(flag).map_err(|_| {
            ErrorKind::Internal("device flag violates a mutual-exclusion invariant").error()
        })?;

        if flag == DeviceFlags::NeedsActivation {
            self.inhibit("needs-activation", "Pending activation");
        }
        if flag == DeviceFlags::Unreachable {
            self.add_problem(Problem::Unreachable);
        }

        Ok(())
    }

    pub fn remove_flag(&mut self, flag: DeviceFlags)
    {
        self.flags &= !flag;
        if flag == DeviceFlags::Unreachable {
            self.remove_problem(Problem::Unreachable);
        }
    }

    /// Mutates the inhibit map and recomputes `updatable`/`updatable-hidden` plus
    /// `update_error`. Reentrancy during the recompute is not a concern here since this
    /// crate runs the scheduler single-threaded and flag notification has no observers to
    /// re-enter through (unlike the GObject original's signal-blocking guard).
    pub fn inhibit(&mut self, id: &str, reason: &str)
    {
        let became_inhibited = self.inhibits.inhibit(id, reason);
        self.recompute_updatable(became_inhibited, false);
    }

    pub fn uninhibit(&mut self, id: &str)
    {
        let became_clear = self.inhibits.uninhibit(id);
        self.recompute_updatable(false, became_clear);
    }

    fn recompute_updatable(&mut self, became_inhibited: bool, became_clear: bool)
    {
        if became_inhibited && self.flags.contains(DeviceFlags::Updatable) {
            self.flags &= !DeviceFlags::Updatable;
            self.flags |= DeviceFlags::UpdatableHidden;
        }
        if became_clear && self.flags.contains(DeviceFlags::UpdatableHidden) {
            self.flags &= !DeviceFlags::UpdatableHidden;
            self.flags |= DeviceFlags::Updatable;
        }
        self.update_error = self.inhibits.update_error();
    }

    pub fn add_problem(&mut self, problem: Problem)
    {
        let became_inhibited = self.inhibits.add_problem(problem, self.battery_level, Some(self.battery_threshold));
        self.recompute_updatable(became_inhibited, false);
    }

    pub fn remove_problem(&mut self, problem: Problem)
    {
        let became_clear = self.inhibits.remove_problem(problem);
        self.recompute_updatable(false, became_clear);
    }

    pub fn has_problem(&self, problem: Problem) -> bool
    {
        self.inhibits.has_problem(problem)
    }

    /// Drives the `POWER_TOO_LOW` inhibit from a fresh battery reading.
    pub fn set_battery_level(&mut self, level: u8)
    {
        self.battery_level = Some(level);
        if level < self.battery_threshold {
            self.add_problem(Problem::PowerTooLow);
        } else {
            self.remove_problem(Problem::PowerTooLow);
        }
    }

    pub fn set_battery_threshold(&mut self, threshold: u8)
    {
        self.battery_threshold = threshold;
        if let Some(level) = self.battery_level {
            self.set_battery_level(level);
        }
    }

    /// `set_update_state`: clears `update_error` for success/pending/needs-reboot;
    /// `NeedsReboot` also adds the `update-in-progress` problem (removed for all other
    /// states).
    pub fn set_update_state(&mut self, state: UpdateState)
    {
        self.update_state = state;
        match state {
            UpdateState::Success | UpdateState::Pending | UpdateState::NeedsReboot => {
                self.update_error = None;
            },
            _ => (),
        }
        if state == UpdateState::NeedsReboot {
            self.add_problem(Problem::UpdateInProgress);
        } else {
            self.remove_problem(Problem::UpdateInProgress);
        }
    }

    /// Validates and builds a [Request], bumping `request_cnts`. If `emulated`, the
    /// request is logged and dropped (counted) rather than actually emitted.
    pub fn emit_request(&mut self, kind: RequestKind, id: &str, message: &str, image: Option<&str>) -> Option<Request>
    {
        let counter_key: &'static str = match kind {
            RequestKind::Immediate => "immediate",
            RequestKind::Post => "post",
        };
        *self.request_cnts.entry(counter_key).or_insert(0) += 1;

        if kind == RequestKind::Post {
            self.update_message = Some(message.to_string());
            self.update_image = image.map(str::to_string);
        }

        if self.flags.contains(DeviceFlags::Emulated) {
            log::info!("emulated device {}, suppressing request {id}", self.device_id);
            return None;
        }

        Some(Request {
            kind,
            id: id.to_string(),
            message: message.to_string(),
            image: image.map(str::to_string),
            device_id: Some(self.device_id.clone()),
        })
    }

    /// Copies fields from `donor` per `incorporate()`'s bitmask rules (§4.3). Only fields
    /// currently unset on `self` are overwritten for [IncorporateFlags::Basic]; `All` also
    /// force-copies the extended field set and private flags regardless of whether they
    /// were already set, matching the "incorporate everything" semantics of a full merge.
    pub fn incorporate(&mut self, donor: &DeviceCore, flags: IncorporateFlags)
    {
        if self.vendor.is_none() {
            self.vendor = donor.vendor.clone();
        }
        if self.backend_id.is_none() {
            self.backend_id = donor.backend_id.clone();
        }
        if self.physical_id.is_none() {
            self.physical_id = donor.physical_id.clone();
        }
        if self.logical_id.is_none() {
            self.logical_id = donor.logical_id.clone();
        }
        if self.vid.is_none() {
            self.vid = donor.vid;
        }
        if self.pid.is_none() {
            self.pid = donor.pid;
        }
        self.remove_delay_ms = self.remove_delay_ms.max(donor.remove_delay_ms);
        self.acquiesce_delay_ms = self.acquiesce_delay_ms.max(donor.acquiesce_delay_ms);
        if self.update_error.is_none() {
            self.update_error = donor.update_error.clone();
        }
        self.update_state = donor.update_state;
        if self.update_message.is_none() {
            self.update_message = donor.update_message.clone();
        }
        if self.update_image.is_none() {
            self.update_image = donor.update_image.clone();
        }

        if flags == IncorporateFlags::All {
            self.custom_flags = donor.custom_flags.clone();
            self.created_usec = donor.created_usec;
            self.modified_usec = donor.modified_usec;
            self.equivalent_id = donor.equivalent_id.clone();
            for (key, value) in donor.metadata.iter() {
                self.metadata.entry(key.clone()).or_insert_with(|| value.clone());
            }
        }
    }

    pub fn sanitize_and_set_name(&mut self, raw: &str)
    {
        self.name = Some(sanitize_name(raw, self.vendor.as_deref()));
    }
}

fn is_valid_device_id(s: &str) -> bool
{
    s.len() == 40 && s.chars().all(|c| c.is_ascii_hexdigit())
}

fn sha1_hex(data: &[u8]) -> String
{
    use crypto_hash::{Algorithm, hex_digest};
    hex_digest(Algorithm::SHA1, data)
}

/// Subclass-overridable behavior, replacing the `FuDevice`/`FwupdDevice` inheritance chain.
/// A concrete device kind holds a `DeviceCore` and implements whichever of these hooks its
/// protocol needs; default bodies are no-ops so implementers only override what they use.
pub trait DeviceOps
{
    fn core(&self) -> &DeviceCore;
    fn core_mut(&mut self) -> &mut DeviceCore;

    fn probe(&mut self) -> Result<(), Error>
    {
        Ok(())
    }

    fn setup(&mut self) -> Result<(), Error>
    {
        Ok(())
    }

    fn open(&mut self) -> Result<(), Error>
    {
        Ok(())
    }

    fn close(&mut self) -> Result<(), Error>
    {
        Ok(())
    }

    fn ready(&mut self) -> Result<(), Error>
    {
        Ok(())
    }

    fn reload(&mut self) -> Result<(), Error>
    {
        Ok(())
    }

    fn detach(&mut self) -> Result<(), Error>
    {
        Err(ErrorKind::NotSupported(Some("detach".into())).error())
    }

    fn attach(&mut self) -> Result<(), Error>
    {
        Err(ErrorKind::NotSupported(Some("attach".into())).error())
    }

    fn write_firmware(&mut self, image: &[u8]) -> Result<(), Error>;

    fn poll(&mut self) -> Result<(), Error>
    {
        Ok(())
    }

    /// Runs `probe` and `setup` exactly once each, per the "each runs exactly once per
    /// invalidate" invariant, then the `ready` hook, then marks setup complete so
    /// subsequent `add_instance_id` calls emit GUIDs immediately.
    fn ensure_setup(&mut self) -> Result<(), Error>
    {
        if self.core().lifecycle < LifecycleStage::Probed {
            self.probe()?;
            self.core_mut().lifecycle = LifecycleStage::Probed;
        }
        if self.core().lifecycle < LifecycleStage::SetUp {
            self.setup()?;
            self.core_mut().lifecycle = LifecycleStage::SetUp;
            self.core_mut().setup_complete = true;
        }
        if self.core().lifecycle < LifecycleStage::Ready {
            self.ready()?;
            self.core_mut().lifecycle = LifecycleStage::Ready;
        }
        Ok(())
    }

    /// Resets lifecycle so the next `ensure_setup` re-runs `probe`/`setup`/`ready`.
    fn invalidate(&mut self)
    {
        self.core_mut().lifecycle = LifecycleStage::Created;
        self.core_mut().setup_complete = false;
    }

    /// `open()`/`close()` refcounting: first open runs probe → subclass open → setup;
    /// `retry-open` retries the subclass open 5 times at 500ms.
    fn open_refcounted(&mut self) -> Result<(), Error>
    {
        if self.core().open_refcount == 0 {
            self.ensure_setup_through_probe_only()?;

            let retry_open = self.core().private_flags.has(crate::device::flags::well_known::RETRY_OPEN);
            if retry_open {
                crate::device::retry::retry(|_| self.open(), 5, 500)?;
            } else {
                self.open()?;
            }

            self.core_mut().private_flags.set(crate::device::flags::well_known::IS_OPEN);
            self.setup()?;
            self.core_mut().lifecycle = LifecycleStage::SetUp;
            self.core_mut().setup_complete = true;
        }
        self.core_mut().open_refcount += 1;
        Ok(())
    }

    fn ensure_setup_through_probe_only(&mut self) -> Result<(), Error>
    {
        if self.core().lifecycle < LifecycleStage::Probed {
            self.probe()?;
            self.core_mut().lifecycle = LifecycleStage::Probed;
        }
        Ok(())
    }

    fn close_refcounted(&mut self) -> Result<(), Error>
    {
        if self.core().open_refcount == 0 {
            return Ok(());
        }
        self.core_mut().open_refcount -= 1;
        if self.core().open_refcount == 0 {
            self.close()?;
            self.core_mut().private_flags.clear(crate::device::flags::well_known::IS_OPEN);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn sanitize_name_collapses_whitespace_and_trademark()
    {
        let name = sanitize_name("  Foo   Bar(TM)   Baz(R)  ", None);
        assert_eq!(name, "Foo Bar\u{2122} Baz");
    }

    #[test]
    fn sanitize_name_strips_duplicated_vendor_prefix()
    {
        let name = sanitize_name("ACME Widget 3000", Some("acme"));
        assert_eq!(name, "Widget 3000");
    }

    #[test]
    fn set_id_hashes_non_device_id_strings()
    {
        let mut dev = DeviceCore::new();
        dev.set_id("usb:1-2:0");
        assert_eq!(dev.device_id.len(), 40);
        assert!(dev.device_id.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn set_id_keeps_already_valid_ids_verbatim()
    {
        let mut dev = DeviceCore::new();
        let id = "a".repeat(40);
        dev.set_id(&id);
        assert_eq!(dev.device_id, id);
    }

    #[test]
    fn inhibit_flips_updatable_to_updatable_hidden()
    {
        let mut dev = DeviceCore::new();
        dev.flags.try_add(DeviceFlags::Updatable).unwrap();
        dev.inhibit("test", "reason");
        assert!(dev.flags.contains(DeviceFlags::UpdatableHidden));
        assert!(!dev.flags.contains(DeviceFlags::Updatable));
        assert_eq!(dev.update_error.as_deref(), Some("reason"));

        dev.uninhibit("test");
        assert!(dev.flags.contains(DeviceFlags::Updatable));
        assert!(dev.update_error.is_none());
    }

    #[test]
    fn needs_reboot_adds_update_in_progress_problem()
    {
        let mut dev = DeviceCore::new();
        dev.set_update_state(UpdateState::NeedsReboot);
        assert!(dev.has_problem(Problem::UpdateInProgress));
        dev.set_update_state(UpdateState::Success);
        assert!(!dev.has_problem(Problem::UpdateInProgress));
    }

    #[test]
    fn battery_below_threshold_inhibits()
    {
        let mut dev = DeviceCore::new();
        dev.set_battery_threshold(20);
        dev.set_battery_level(5);
        assert!(dev.has_problem(Problem::PowerTooLow));
        dev.set_battery_level(90);
        assert!(!dev.has_problem(Problem::PowerTooLow));
    }

    #[test]
    fn emit_request_is_suppressed_for_emulated_devices()
    {
        let mut dev = DeviceCore::new();
        dev.flags.try_add(DeviceFlags::Emulated).unwrap();
        let request = dev.emit_request(RequestKind::Immediate, REQUEST_ID_REMOVE_REPLUG, "replug me", None);
        assert!(request.is_none());
        assert_eq!(dev.request_cnts.get("immediate"), Some(&1));
    }
}

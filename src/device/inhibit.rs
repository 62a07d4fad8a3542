// SPDX-License-Identifier: MIT OR Apache-2.0
//! The inhibit map: reasons a device must not be updated right now (§3, §4.3).

use std::collections::BTreeMap;
use std::fmt;

/// Known inhibit problem kinds, each with a default human reason template.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Problem
{
    Unreachable,
    UpdatePending,
    RequireAcPower,
    LidIsClosed,
    IsEmulated,
    UpdateInProgress,
    InUse,
    DisplayRequired,
    LowerPriority,
    MissingLicense,
    SystemPowerTooLow,
    PowerTooLow,
}

impl Problem
{
    /// Stable string id used as the inhibit map key for built-in problems.
    pub fn id(self) -> &'static str
    {
        use Problem::*;
        match self {
            Unreachable => "unreachable",
            UpdatePending => "update-pending",
            RequireAcPower => "require-ac-power",
            LidIsClosed => "lid-is-closed",
            IsEmulated => "is-emulated",
            UpdateInProgress => "update-in-progress",
            InUse => "in-use",
            DisplayRequired => "display-required",
            LowerPriority => "lower-priority",
            MissingLicense => "missing-license",
            SystemPowerTooLow => "system-power-too-low",
            PowerTooLow => "power-too-low",
        }
    }

    /// Default human reason, with `PowerTooLow`/`SystemPowerTooLow` optionally decorated
    /// with `"(%u%%, requires %u%%)"` when both the device and threshold levels are known.
    pub fn default_reason(self, level: Option<u8>, threshold: Option<u8>) -> String
    {
        use Problem::*;
        let base = match self {
            Unreachable => "Device is unreachable",
            UpdatePending => "An update is already pending",
            RequireAcPower => "Not plugged into AC power",
            LidIsClosed => "Device lid is closed",
            IsEmulated => "Device is emulated",
            UpdateInProgress => "An update is in progress",
            InUse => "Device is in use",
            DisplayRequired => "A display is required",
            LowerPriority => "Another device takes priority",
            MissingLicense => "A required license is missing",
            SystemPowerTooLow => "System power is too low",
            PowerTooLow => "Device battery level is too low",
        };

        match (self, level, threshold) {
            (PowerTooLow | SystemPowerTooLow, Some(level), Some(threshold)) => {
                format!("{base} ({level}%, requires {threshold}%)")
            },
            _ => base.to_string(),
        }
    }
}

impl fmt::Display for Problem
{
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result
    {
        write!(f, "{}", self.id())
    }
}

/// `inhibit_id → reason`, keyed by either a [Problem]'s stable id or an arbitrary caller id.
#[derive(Debug, Default, Clone)]
pub struct Inhibits
{
    reasons: BTreeMap<String, String>,
}

impl Inhibits
{
    pub fn new() -> Self
    {
        Self::default()
    }

    /// Adds or replaces the reason for `id`. Returns whether the map transitioned from
    /// empty to non-empty (the caller uses this to flip `updatable` → `updatable-hidden`).
    pub fn inhibit(&mut self, id: &str, reason: &str) -> bool
    {
        let was_empty = self.reasons.is_empty();
        self.reasons.insert(id.to_string(), reason.to_string());
        was_empty && !self.reasons.is_empty()
    }

    /// Removes `id`. Returns whether the map transitioned from non-empty to empty.
    pub fn uninhibit(&mut self, id: &str) -> bool
    {
        let was_nonempty = !self.reasons.is_empty();
        self.reasons.remove(id);
        was_nonempty && self.reasons.is_empty()
    }

    pub fn add_problem(&mut self, problem: Problem, level: Option<u8>, threshold: Option<u8>) -> bool
    {
        self.inhibit(problem.id(), &problem.default_reason(level, threshold))
    }

    pub fn remove_problem(&mut self, problem: Problem) -> bool
    {
        self.uninhibit(problem.id())
    }

    pub fn has_problem(&self, problem: Problem) -> bool
    {
        self.reasons.contains_key(problem.id())
    }

    pub fn is_empty(&self) -> bool
    {
        self.reasons.is_empty()
    }

    /// The joined `update_error` string: all reasons separated by `", "`, in id order.
    pub fn update_error(&self) -> Option<String>
    {
        if self.reasons.is_empty() {
            return None;
        }
        Some(self.reasons.values().cloned().collect::<Vec<_>>().join(", "))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)>
    {
        self.reasons.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn inhibit_then_uninhibit_round_trips_emptiness()
    {
        let mut inhibits = Inhibits::new();
        assert!(inhibits.inhibit("x", "reason"));
        assert!(!inhibits.inhibit("y", "other"));
        assert!(!inhibits.uninhibit("x"));
        assert!(inhibits.uninhibit("y"));
        assert!(inhibits.is_empty());
    }

    #[test]
    fn update_error_joins_with_comma_space()
    {
        let mut inhibits = Inhibits::new();
        inhibits.inhibit("a", "Reason A");
        inhibits.inhibit("b", "Reason B");
        assert_eq!(inhibits.update_error(), Some("Reason A, Reason B".to_string()));
    }

    #[test]
    fn power_too_low_decorates_with_percentages()
    {
        let reason = Problem::PowerTooLow.default_reason(Some(5), Some(20));
        assert_eq!(reason, "Device battery level is too low (5%, requires 20%)");
    }
}

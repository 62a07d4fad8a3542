// SPDX-License-Identifier: MIT OR Apache-2.0
//! Arena-allocated device graph keyed by stable [DeviceHandle]s (§9 redesign note).
//!
//! Replaces the GObject weak-pointer parent/proxy pattern: instead of a `Weak<Device>`
//! that silently becomes `None` out from under a holder, a [DeviceHandle] is a plain index
//! that is only ever resolved against the arena at the point of use, so a stale handle
//! (device removed) is a normal, checked `None` rather than a race.

use std::collections::HashMap;

use uuid::Uuid;

use crate::device::core::DeviceCore;

/// A stable reference to a device stored in a [DeviceArena]. Cheap to copy and store on
/// other devices (as `parent`/`proxy`/deferred claims) without borrow-checker entanglement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DeviceHandle(u64);

/// Owns every live [DeviceCore] and the parent/child/proxy edges between them.
#[derive(Debug, Default)]
pub struct DeviceArena
{
    next_id: u64,
    devices: HashMap<DeviceHandle, DeviceCore>,
    children: HashMap<DeviceHandle, Vec<DeviceHandle>>,
    parent: HashMap<DeviceHandle, DeviceHandle>,
    proxy: HashMap<DeviceHandle, DeviceHandle>,

    /// Deferred claims the runtime resolves when matching devices later appear.
    parent_guids: HashMap<DeviceHandle, Vec<Uuid>>,
    parent_physical_ids: HashMap<DeviceHandle, Vec<String>>,
    parent_backend_ids: HashMap<DeviceHandle, Vec<String>>,

    /// Counterpart GUIDs (bootloader ↔ runtime pairing). Stored alongside the graph because
    /// matching them is a graph-wide search, but they never influence parent/child edges or
    /// trigger a quirk cascade (§4.2).
    counterpart_guids: HashMap<DeviceHandle, Vec<Uuid>>,
}

impl DeviceArena
{
    pub fn new() -> Self
    {
        Self::default()
    }

    pub fn insert(&mut self, device: DeviceCore) -> DeviceHandle
    {
        let handle = DeviceHandle(self.next_id);
        self.next_id += 1;
        self.devices.insert(handle, device);
        handle
    }

    /// Removes a device and its edges. Does not recursively remove children — callers
    /// walk `children_of` first if a whole subtree should go.
    pub fn remove(&mut self, handle: DeviceHandle) -> Option<DeviceCore>
    {
        if let Some(parent) = self.parent.remove(&handle) {
            if let Some(siblings) = self.children.get_mut(&parent) {
                siblings.retain(|&h| h != handle);
            }
        }
        self.proxy.remove(&handle);
        self.children.remove(&handle);
        self.parent_guids.remove(&handle);
        self.parent_physical_ids.remove(&handle);
        self.parent_backend_ids.remove(&handle);
        self.counterpart_guids.remove(&handle);
        self.devices.remove(&handle)
    }

    pub fn get(&self, handle: DeviceHandle) -> Option<&DeviceCore>
    {
        self.devices.get(&handle)
    }

    pub fn get_mut(&mut self, handle: DeviceHandle) -> Option<&mut DeviceCore>
    {
        self.devices.get_mut(&handle)
    }

    pub fn exists(&self, handle: DeviceHandle) -> bool
    {
        self.devices.contains_key(&handle)
    }

    /// Adds `child` under `parent`, propagating `physical_id`/`backend_id`/delays/vendor
    /// fields per §3's "adding a child" rule. Inhibits replay onto the child iff the parent
    /// has `inhibit-children` set.
    pub fn add_child(&mut self, parent: DeviceHandle, child: DeviceHandle)
    {
        self.parent.insert(child, parent);
        self.children.entry(parent).or_default().push(child);

        let (physical_id, backend_id, remove_delay, replay_inhibits) = {
            let parent_dev = self.devices.get(&parent).expect("parent exists");
            (
                parent_dev.physical_id.clone(),
                parent_dev.backend_id.clone(),
                parent_dev.remove_delay_ms,
                parent_dev.private_flags.has(crate::device::flags::well_known::INHIBIT_CHILDREN),
            )
        };

        let parent_inhibits = self.devices.get(&parent).map(|p| p.inhibits.clone());

        if let Some(child_dev) = self.devices.get_mut(&child) {
            if child_dev.physical_id.is_none() {
                child_dev.physical_id = physical_id;
            }
            if child_dev.backend_id.is_none() {
                child_dev.backend_id = backend_id;
            }
            child_dev.remove_delay_ms = child_dev.remove_delay_ms.max(remove_delay);

            if replay_inhibits {
                if let Some(inhibits) = parent_inhibits {
                    for (id, reason) in inhibits.iter() {
                        child_dev.inhibits.inhibit(id, reason);
                    }
                }
            }
        }

        // parent takes the MAX of children's remove/acquiesce delay, propagated back down.
        let max_child_remove_delay = self
            .children
            .get(&parent)
            .into_iter()
            .flatten()
            .filter_map(|h| self.devices.get(h))
            .map(|d| d.remove_delay_ms)
            .max()
            .unwrap_or(0);
        let max_child_acquiesce_delay = self
            .children
            .get(&parent)
            .into_iter()
            .flatten()
            .filter_map(|h| self.devices.get(h))
            .map(|d| d.acquiesce_delay_ms)
            .max()
            .unwrap_or(0);

        if let Some(parent_dev) = self.devices.get_mut(&parent) {
            parent_dev.remove_delay_ms = parent_dev.remove_delay_ms.max(max_child_remove_delay);
            parent_dev.acquiesce_delay_ms = parent_dev.acquiesce_delay_ms.max(max_child_acquiesce_delay);
        }

        let acquiesce = self.devices.get(&parent).map(|d| d.acquiesce_delay_ms).unwrap_or(0);
        for sibling in self.children.get(&parent).cloned().unwrap_or_default() {
            if let Some(sibling_dev) = self.devices.get_mut(&sibling) {
                sibling_dev.acquiesce_delay_ms = sibling_dev.acquiesce_delay_ms.max(acquiesce);
            }
        }
    }

    pub fn remove_child(&mut self, parent: DeviceHandle, child: DeviceHandle)
    {
        if let Some(children) = self.children.get_mut(&parent) {
            children.retain(|&h| h != child);
        }
        self.parent.remove(&child);
    }

    pub fn children_of(&self, parent: DeviceHandle) -> &[DeviceHandle]
    {
        self.children.get(&parent).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn parent_of(&self, handle: DeviceHandle) -> Option<DeviceHandle>
    {
        self.parent.get(&handle).copied()
    }

    /// Sets `proxy` as sideways-related to `handle`. `refcounted_proxy` governs whether
    /// closing `handle` decrements the proxy's own open refcount (handled by the caller in
    /// `DeviceOps::close`); the arena itself does not special-case the strength of the edge.
    pub fn set_proxy(&mut self, handle: DeviceHandle, proxy: DeviceHandle)
    {
        self.proxy.insert(handle, proxy);
    }

    pub fn proxy_of(&self, handle: DeviceHandle) -> Option<DeviceHandle>
    {
        self.proxy.get(&handle).copied()
    }

    /// Propagates a proxy's `emulated`/`unreachable` flag to every device proxying through
    /// it, as the spec's "on proxy's flag changes, the current device mirrors them" rule.
    pub fn mirror_proxy_flags(&mut self, proxy: DeviceHandle)
    {
        let (emulated, unreachable) = match self.devices.get(&proxy) {
            Some(d) => (
                d.flags.contains(crate::device::flags::DeviceFlags::Emulated),
                d.flags.contains(crate::device::flags::DeviceFlags::Unreachable),
            ),
            None => return,
        };

        let dependants: Vec<DeviceHandle> =
            self.proxy.iter().filter(|(_, &p)| p == proxy).map(|(&h, _)| h).collect();

        for handle in dependants {
            if let Some(dev) = self.devices.get_mut(&handle) {
                if emulated {
                    dev.flags |= crate::device::flags::DeviceFlags::Emulated;
                } else {
                    dev.flags &= !crate::device::flags::DeviceFlags::Emulated;
                }
                if unreachable {
                    dev.flags |= crate::device::flags::DeviceFlags::Unreachable;
                } else {
                    dev.flags &= !crate::device::flags::DeviceFlags::Unreachable;
                }
            }
        }
    }

    pub fn add_parent_guid(&mut self, handle: DeviceHandle, guid: Uuid)
    {
        self.parent_guids.entry(handle).or_default().push(guid);
    }

    pub fn add_parent_physical_id(&mut self, handle: DeviceHandle, id: String)
    {
        self.parent_physical_ids.entry(handle).or_default().push(id);
    }

    pub fn add_parent_backend_id(&mut self, handle: DeviceHandle, id: String)
    {
        self.parent_backend_ids.entry(handle).or_default().push(id);
    }

    /// Adds a counterpart GUID (bootloader ↔ runtime pairing). Counterparts never trigger
    /// a quirk cascade and are kept completely separate from `parent_guids`.
    pub fn add_counterpart_guid(&mut self, handle: DeviceHandle, guid: Uuid)
    {
        self.counterpart_guids.entry(handle).or_default().push(guid);
    }

    pub fn counterpart_guids(&self, handle: DeviceHandle) -> &[Uuid]
    {
        self.counterpart_guids.get(&handle).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Scans unresolved deferred parent claims (GUID/physical-id/backend-id) against
    /// `candidate` and wires up the parent/child edge on the first match, as the runtime
    /// does when a previously claimed device appears.
    pub fn resolve_deferred_parent_claims(&mut self, candidate: DeviceHandle, candidate_guids: &[Uuid])
    {
        let candidate_physical_id = self.devices.get(&candidate).and_then(|d| d.physical_id.clone());
        let candidate_backend_id = self.devices.get(&candidate).and_then(|d| d.backend_id.clone());

        let mut matched_children: Vec<DeviceHandle> = Vec::new();

        for (&child, guids) in self.parent_guids.iter() {
            if guids.iter().any(|g| candidate_guids.contains(g)) {
                matched_children.push(child);
                continue;
            }
        }
        for (&child, ids) in self.parent_physical_ids.iter() {
            if let Some(pid) = &candidate_physical_id {
                if ids.contains(pid) {
                    matched_children.push(child);
                }
            }
        }
        for (&child, ids) in self.parent_backend_ids.iter() {
            if let Some(bid) = &candidate_backend_id {
                if ids.contains(bid) {
                    matched_children.push(child);
                }
            }
        }

        matched_children.sort_unstable();
        matched_children.dedup();

        for child in matched_children {
            if self.parent.contains_key(&child) {
                continue;
            }
            self.add_child(candidate, child);
        }
    }

    /// `composite_id` per §3/§8: always the nearest ancestor's `device_id`, or `None` at
    /// the root. Computed on demand rather than cached, since the arena is the only owner
    /// of parent edges and recomputing is O(depth).
    pub fn composite_id(&self, handle: DeviceHandle) -> Option<String>
    {
        let parent = self.parent_of(handle)?;
        self.devices.get(&parent).map(|d| d.device_id.clone())
    }
}

#[cfg(test)]
mod tests
{
    use super::*;
    use crate::device::core::DeviceCore;

    fn new_device(id: &str) -> DeviceCore
    {
        let mut d = DeviceCore::new();
        d.set_id(id);
        d
    }

    #[test]
    fn composite_id_is_parents_device_id()
    {
        let mut arena = DeviceArena::new();
        let parent = arena.insert(new_device("parent-device"));
        let child = arena.insert(new_device("child-device"));
        arena.add_child(parent, child);

        assert_eq!(arena.composite_id(child), Some("parent-device".to_string()));
        assert_eq!(arena.composite_id(parent), None);
    }

    #[test]
    fn stale_handle_resolves_to_none_after_removal()
    {
        let mut arena = DeviceArena::new();
        let handle = arena.insert(new_device("gone"));
        arena.remove(handle);
        assert!(arena.get(handle).is_none());
        assert!(!arena.exists(handle));
    }

    #[test]
    fn child_inherits_parent_physical_and_backend_id()
    {
        let mut arena = DeviceArena::new();
        let mut parent = new_device("parent");
        parent.physical_id = Some("usb:1-2".into());
        parent.backend_id = Some("/sys/dev/1".into());
        let parent = arena.insert(parent);
        let child = arena.insert(new_device("child"));
        arena.add_child(parent, child);

        let child_dev = arena.get(child).unwrap();
        assert_eq!(child_dev.physical_id.as_deref(), Some("usb:1-2"));
        assert_eq!(child_dev.backend_id.as_deref(), Some("/sys/dev/1"));
    }
}

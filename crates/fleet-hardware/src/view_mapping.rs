//! Display slot to device assignments.
//!
//! Six fixed slots each show at most one device, and a device is shown in at
//! most one slot. The persisted mapping can violate that (hand edits, an old
//! version of the file); it is repaired on load, first slot wins.

use fleet_core::error::{FleetError, FleetResult};
use fleet_storage::{ConfigStore, RunMode, ViewMappingSettings, SLOT_COUNT};
use parking_lot::RwLock;
use std::collections::HashSet;
use std::fmt;

/// A display slot, 1 through 6.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ViewSlot(u8);

impl ViewSlot {
    pub fn new(number: u8) -> FleetResult<Self> {
        if (1..=SLOT_COUNT as u8).contains(&number) {
            Ok(Self(number))
        } else {
            Err(FleetError::InvalidSlot(number))
        }
    }

    /// All slots in ascending order.
    pub fn all() -> impl Iterator<Item = ViewSlot> {
        (1..=SLOT_COUNT as u8).map(ViewSlot)
    }

    pub fn number(self) -> u8 {
        self.0
    }

    /// 0-based index into the persisted `views` array.
    pub fn index(self) -> usize {
        usize::from(self.0 - 1)
    }
}

impl fmt::Display for ViewSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "View{}", self.0)
    }
}

type Slots = [Option<String>; SLOT_COUNT];

/// Injective slot → device-name mapping.
///
/// Interior locking lets the resolver be shared between the status display
/// and the settings editor.
#[derive(Debug, Default)]
pub struct ViewMappingResolver {
    slots: RwLock<Slots>,
}

impl ViewMappingResolver {
    /// Resolver over a settings document, as-is (not yet healed).
    ///
    /// Blank names become unbound; entries past slot 6 are dropped.
    pub fn from_settings(settings: &ViewMappingSettings) -> Self {
        let mut slots: Slots = Default::default();
        for (slot, view) in slots.iter_mut().zip(settings.views.iter()) {
            *slot = view
                .as_deref()
                .map(str::trim)
                .filter(|name| !name.is_empty())
                .map(str::to_string);
        }
        Self {
            slots: RwLock::new(slots),
        }
    }

    pub fn load(store: &ConfigStore) -> Self {
        Self::from_settings(&store.load_view_mapping())
    }

    /// Load and repair. When the repair changed anything and `mode` allows
    /// writes, the repaired mapping is persisted right away so the same
    /// conflict is not rediscovered on every start.
    ///
    /// # Returns
    ///
    /// The resolver and whether the repair changed anything.
    pub fn load_healed(store: &ConfigStore, mode: RunMode) -> (Self, bool) {
        let resolver = Self::load(store);
        let changed = resolver.validate_and_self_heal();
        if changed {
            tracing::warn!("View mapping had duplicate assignments; repaired");
            if !mode.is_locked() {
                if let Err(e) = resolver.save(store, mode) {
                    tracing::warn!(error = %e, "Failed to persist repaired view mapping");
                }
            }
        }
        (resolver, changed)
    }

    /// Clear every slot that repeats a name already bound to a lower slot.
    ///
    /// Idempotent. Returns whether anything changed.
    pub fn validate_and_self_heal(&self) -> bool {
        let mut slots = self.slots.write();
        let mut seen = HashSet::new();
        let mut changed = false;
        for (i, slot) in slots.iter_mut().enumerate() {
            let Some(name) = slot.as_deref() else {
                continue;
            };
            if !seen.insert(name.to_string()) {
                tracing::debug!(slot = i + 1, device = %name, "Duplicate view assignment cleared");
                *slot = None;
                changed = true;
            }
        }
        changed
    }

    pub fn resolve_device_for_slot(&self, slot: ViewSlot) -> Option<String> {
        self.slots.read()[slot.index()].clone()
    }

    pub fn resolve_slot_for_device(&self, name: &str) -> Option<ViewSlot> {
        self.slots
            .read()
            .iter()
            .position(|s| s.as_deref() == Some(name))
            .and_then(|i| ViewSlot::new(i as u8 + 1).ok())
    }

    pub fn is_mapped(&self, slot: ViewSlot) -> bool {
        self.slots.read()[slot.index()].is_some()
    }

    /// Bind `name` to `slot`, or unbind the slot with `None`.
    ///
    /// A device already shown in another slot is moved: that slot is cleared
    /// and returned.
    pub fn assign(&self, slot: ViewSlot, name: Option<&str>) -> Option<ViewSlot> {
        let name = name.map(str::trim).filter(|n| !n.is_empty());
        let mut slots = self.slots.write();
        let mut cleared = None;
        if let Some(name) = name {
            for (i, other) in slots.iter_mut().enumerate() {
                if i != slot.index() && other.as_deref() == Some(name) {
                    *other = None;
                    cleared = ViewSlot::new(i as u8 + 1).ok();
                }
            }
        }
        slots[slot.index()] = name.map(str::to_string);
        cleared
    }

    /// Bound slots whose device is not in `known`.
    pub fn unknown_assignments(&self, known: &[String]) -> Vec<(ViewSlot, String)> {
        ViewSlot::all()
            .filter_map(|slot| self.resolve_device_for_slot(slot).map(|name| (slot, name)))
            .filter(|(_, name)| !known.iter().any(|k| k == name))
            .collect()
    }

    pub fn to_settings(&self) -> ViewMappingSettings {
        ViewMappingSettings {
            views: self.slots.read().to_vec(),
        }
    }

    pub fn save(&self, store: &ConfigStore, mode: RunMode) -> FleetResult<()> {
        store.save_view_mapping(&self.to_settings(), mode)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolver(views: &[Option<&str>]) -> ViewMappingResolver {
        ViewMappingResolver::from_settings(&ViewMappingSettings {
            views: views.iter().map(|v| v.map(str::to_string)).collect(),
        })
    }

    fn slot(n: u8) -> ViewSlot {
        ViewSlot::new(n).unwrap()
    }

    #[test]
    fn test_slot_bounds() {
        assert!(matches!(ViewSlot::new(0), Err(FleetError::InvalidSlot(0))));
        assert!(matches!(ViewSlot::new(7), Err(FleetError::InvalidSlot(7))));
        assert_eq!(slot(6).index(), 5);
        assert_eq!(ViewSlot::all().count(), 6);
    }

    #[test]
    fn test_first_slot_wins() {
        let r = resolver(&[Some("CamX"), Some("CamX"), None, None, None, None]);
        assert!(r.validate_and_self_heal());
        assert_eq!(r.resolve_device_for_slot(slot(1)).as_deref(), Some("CamX"));
        assert_eq!(r.resolve_device_for_slot(slot(2)), None);
        assert!(!r.validate_and_self_heal());
    }

    #[test]
    fn test_blank_names_unbound() {
        let r = resolver(&[Some("  "), Some("Cam2")]);
        assert!(!r.is_mapped(slot(1)));
        assert_eq!(r.resolve_slot_for_device("Cam2"), Some(slot(2)));
        assert!(!r.is_mapped(slot(6)));
    }

    #[test]
    fn test_heal_leaves_valid_mapping_alone() {
        let r = ViewMappingResolver::from_settings(&ViewMappingSettings::default());
        assert!(!r.validate_and_self_heal());
        assert_eq!(r.resolve_slot_for_device("Cam4"), Some(slot(4)));
    }

    #[test]
    fn test_assign_moves_device() {
        let r = ViewMappingResolver::from_settings(&ViewMappingSettings::default());
        let cleared = r.assign(slot(1), Some("Cam3"));
        assert_eq!(cleared, Some(slot(3)));
        assert_eq!(r.resolve_slot_for_device("Cam3"), Some(slot(1)));
        assert!(!r.is_mapped(slot(3)));

        assert_eq!(r.assign(slot(1), Some("Cam3")), None);
        assert_eq!(r.assign(slot(2), None), None);
        assert!(!r.is_mapped(slot(2)));
    }

    #[test]
    fn test_unknown_assignments() {
        let r = resolver(&[Some("Cam1"), Some("Ghost")]);
        let known = vec!["Cam1".to_string()];
        assert_eq!(r.unknown_assignments(&known), vec![(slot(2), "Ghost".to_string())]);
    }
}

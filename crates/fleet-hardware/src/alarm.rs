//! Offline alarm linkage.
//!
//! Each trigger group has a PLC alarm register. The register is asserted
//! while at least one device of the group is offline:
//!
//! | Group | PLC | Register |
//! |-------|-----|----------|
//! | Group1 | PLC A | `plc_a.alarm_register` |
//! | Group2 | PLC B | `plc_b.alarm_register` |
//!
//! Writes are level-triggered: the current level is written after every
//! change to a group's offline set, even if it did not flip.

use crate::registry::WeakRegistry;
use fleet_core::device::TriggerGroup;
use fleet_core::events::DeviceObserver;
use fleet_storage::PlcSettings;
use parking_lot::Mutex;
use std::collections::BTreeSet;
use std::sync::Arc;

/// Sink for alarm register writes, typically a Modbus client.
///
/// Calls must not block; delivery failures are the implementation's
/// concern.
pub trait AlarmActuator: Send + Sync {
    fn set_alarm_register(&self, address: u16, asserted: bool);

    /// Link state for status displays. Unknown counts as connected.
    fn is_connected(&self) -> bool {
        true
    }
}

/// An actuator and the register it drives for one group.
#[derive(Clone)]
pub struct AlarmChannel {
    pub actuator: Arc<dyn AlarmActuator>,
    pub register: u16,
}

struct GroupAlarm {
    channel: AlarmChannel,
    offline: Mutex<BTreeSet<String>>,
}

impl GroupAlarm {
    fn new(channel: AlarmChannel) -> Self {
        Self {
            channel,
            offline: Mutex::new(BTreeSet::new()),
        }
    }
}

/// Drives one alarm register per group from device online transitions.
pub struct AlarmLinkage {
    registry: WeakRegistry,
    groups: [GroupAlarm; 2],
}

fn slot(group: TriggerGroup) -> usize {
    match group {
        TriggerGroup::Group1 => 0,
        TriggerGroup::Group2 => 1,
    }
}

impl AlarmLinkage {
    pub fn new(registry: WeakRegistry, group1: AlarmChannel, group2: AlarmChannel) -> Self {
        Self {
            registry,
            groups: [GroupAlarm::new(group1), GroupAlarm::new(group2)],
        }
    }

    /// PLC A drives group 1, PLC B drives group 2, registers from `plc`.
    pub fn from_settings(
        registry: WeakRegistry,
        plc: &PlcSettings,
        plc_a: Arc<dyn AlarmActuator>,
        plc_b: Arc<dyn AlarmActuator>,
    ) -> Self {
        Self::new(
            registry,
            AlarmChannel {
                actuator: plc_a,
                register: plc.endpoint(TriggerGroup::Group1).alarm_register,
            },
            AlarmChannel {
                actuator: plc_b,
                register: plc.endpoint(TriggerGroup::Group2).alarm_register,
            },
        )
    }

    /// Offline devices of `group`, sorted.
    pub fn offline_devices(&self, group: TriggerGroup) -> Vec<String> {
        self.groups[slot(group)]
            .offline
            .lock()
            .iter()
            .cloned()
            .collect()
    }

    pub fn is_asserted(&self, group: TriggerGroup) -> bool {
        !self.groups[slot(group)].offline.lock().is_empty()
    }

    /// PLC link state per group.
    pub fn plc_links(&self) -> Vec<(TriggerGroup, bool)> {
        TriggerGroup::ALL
            .iter()
            .map(|g| (*g, self.groups[slot(*g)].channel.actuator.is_connected()))
            .collect()
    }

    /// Forget all offline devices and release both registers. Used when the
    /// fleet is rebuilt.
    pub fn reset(&self) {
        for alarm in &self.groups {
            let mut offline = alarm.offline.lock();
            offline.clear();
            alarm
                .channel
                .actuator
                .set_alarm_register(alarm.channel.register, false);
        }
    }
}

impl DeviceObserver for AlarmLinkage {
    fn on_online_changed(&self, device: &str, online: bool) {
        let Some(group) = self.registry.upgrade().and_then(|r| r.group_of(device)) else {
            return;
        };
        let alarm = &self.groups[slot(group)];

        let mut offline = alarm.offline.lock();
        if online {
            offline.remove(device);
        } else {
            offline.insert(device.to_string());
        }
        let asserted = !offline.is_empty();
        tracing::debug!(%group, register = alarm.channel.register, asserted, offline = offline.len(), "Alarm level");
        alarm
            .channel
            .actuator
            .set_alarm_register(alarm.channel.register, asserted);
    }

    fn name(&self) -> &'static str {
        "alarm_linkage"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::DeviceRegistry;

    #[derive(Default)]
    struct Recorder {
        writes: Mutex<Vec<(u16, bool)>>,
    }

    impl AlarmActuator for Recorder {
        fn set_alarm_register(&self, address: u16, asserted: bool) {
            self.writes.lock().push((address, asserted));
        }
    }

    fn linkage() -> (DeviceRegistry, AlarmLinkage, Arc<Recorder>, Arc<Recorder>) {
        let registry = DeviceRegistry::new();
        let a = Arc::new(Recorder::default());
        let b = Arc::new(Recorder::default());
        let plc = PlcSettings {
            plc_a: fleet_storage::PlcEndpoint::new("10.0.0.1", 4),
            plc_b: fleet_storage::PlcEndpoint::new("10.0.0.2", 9),
            ..Default::default()
        };
        let linkage = AlarmLinkage::from_settings(registry.downgrade(), &plc, a.clone(), b.clone());
        (registry, linkage, a, b)
    }

    #[test]
    fn test_unknown_device_ignored() {
        let (_registry, linkage, a, b) = linkage();
        linkage.on_online_changed("Ghost", false);
        assert!(a.writes.lock().is_empty());
        assert!(b.writes.lock().is_empty());
    }

    #[test]
    fn test_reset_releases_registers() {
        let (_registry, linkage, a, b) = linkage();
        linkage.reset();
        assert_eq!(*a.writes.lock(), vec![(4, false)]);
        assert_eq!(*b.writes.lock(), vec![(9, false)]);
        assert_eq!(linkage.plc_links(), vec![(TriggerGroup::Group1, true), (TriggerGroup::Group2, true)]);
    }
}

//! Alarm actuator that records register writes in the log.
//!
//! Stands in for a Modbus link: the daemon has no PLC transport of its own,
//! so each write is traced with the endpoint it would have gone to.

use fleet_hardware::AlarmActuator;
use fleet_storage::PlcEndpoint;
use parking_lot::Mutex;

pub struct LoggedPlc {
    label: &'static str,
    ip: String,
    slave_id: u8,
    level: Mutex<Option<bool>>,
}

impl LoggedPlc {
    pub fn new(label: &'static str, endpoint: &PlcEndpoint, slave_id: u8) -> Self {
        Self {
            label,
            ip: endpoint.ip.clone(),
            slave_id,
            level: Mutex::new(None),
        }
    }
}

#[cfg(test)]
impl LoggedPlc {
    /// Last written level, `None` before the first write.
    pub fn level(&self) -> Option<bool> {
        *self.level.lock()
    }
}

impl AlarmActuator for LoggedPlc {
    fn set_alarm_register(&self, address: u16, asserted: bool) {
        let previous = self.level.lock().replace(asserted);
        if previous == Some(asserted) {
            tracing::debug!(plc = self.label, address, asserted, "Alarm register rewritten");
        } else if asserted {
            tracing::warn!(plc = self.label, ip = %self.ip, slave = self.slave_id, address, "Alarm register asserted");
        } else {
            tracing::info!(plc = self.label, ip = %self.ip, slave = self.slave_id, address, "Alarm register released");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tracks_level() {
        let plc = LoggedPlc::new("PLC A", &PlcEndpoint::new("192.168.0.10", 3), 1);
        assert_eq!(plc.level(), None);
        plc.set_alarm_register(3, true);
        plc.set_alarm_register(3, true);
        assert_eq!(plc.level(), Some(true));
        plc.set_alarm_register(3, false);
        assert_eq!(plc.level(), Some(false));
        assert!(plc.is_connected());
    }
}

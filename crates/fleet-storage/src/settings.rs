//! Persisted settings documents.
//!
//! Each document has a fixed JSON shape and a repair step run on load:
//!
//! | File | Shape | Repair |
//! |------|-------|--------|
//! | `camera_settings.json` | `{"cameras": [6 × CameraConfig]}` | one physical device per slot |
//! | `plc_settings.json` | `{"plc_a": .., "plc_b": .., "slave_id": 1}` | none (validated) |
//! | `view_mapping.json` | `{"views": [6 × string\|null]}` | done by the view mapping resolver |

use fleet_core::device::TriggerGroup;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::net::IpAddr;

/// Number of camera slots and display views.
pub const SLOT_COUNT: usize = 6;

/// Device identifier meaning "not configured".
pub const DEFAULT_DEVICE: &str = "default";

// =============================================================================
// Interface Kind
// =============================================================================

/// Acquisition interface a camera is attached through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum InterfaceKind {
    #[default]
    GigEVision2,
    USB3Vision,
    DirectShow,
}

impl InterfaceKind {
    /// Interface name as the framegrabber SDK spells it.
    pub fn sdk_name(self) -> &'static str {
        match self {
            InterfaceKind::GigEVision2 => "GigEVision2",
            InterfaceKind::USB3Vision => "USB3Vision",
            InterfaceKind::DirectShow => "DirectShow",
        }
    }

    /// SDK interface names to try, preferred first.
    pub fn fallbacks(self) -> &'static [&'static str] {
        match self {
            InterfaceKind::GigEVision2 => &["GigEVision2", "GigEVision"],
            InterfaceKind::USB3Vision => &["USB3Vision", "DirectShow"],
            InterfaceKind::DirectShow => &["DirectShow"],
        }
    }

    /// Parse an SDK interface name; unknown names map to GigE.
    pub fn from_sdk_name(name: &str) -> Self {
        let name = name.trim();
        if name.eq_ignore_ascii_case("USB3Vision") {
            InterfaceKind::USB3Vision
        } else if name.eq_ignore_ascii_case("DirectShow") {
            InterfaceKind::DirectShow
        } else {
            InterfaceKind::GigEVision2
        }
    }
}

impl std::fmt::Display for InterfaceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.sdk_name())
    }
}

// =============================================================================
// Camera Settings
// =============================================================================

/// Configuration of one camera slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    /// Registry name (Cam1..Cam6)
    pub name: String,
    pub display_name: String,
    pub interface: InterfaceKind,
    /// SDK device identifier; blank or `default` means not configured
    pub device: String,
    /// SDK port; 0 selects the interface default
    pub port: i32,
    /// Tuning parameters applied best-effort after open, e.g. `Consumer|exposure`
    pub params: BTreeMap<String, String>,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            display_name: String::new(),
            interface: InterfaceKind::GigEVision2,
            device: DEFAULT_DEVICE.to_string(),
            port: 0,
            params: BTreeMap::new(),
        }
    }
}

impl CameraConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Whether this slot names a concrete physical device.
    pub fn has_device(&self) -> bool {
        let device = self.device.trim();
        !device.is_empty() && !device.eq_ignore_ascii_case(DEFAULT_DEVICE)
    }

    /// Identity of the physical device, `interface::device` (lowercase), or
    /// `None` for an unconfigured slot.
    pub fn device_key(&self) -> Option<String> {
        if !self.has_device() {
            return None;
        }
        Some(format!("{}::{}", self.interface.sdk_name(), self.device.trim()).to_lowercase())
    }

    /// Name shown to operators, falling back to the registry name.
    pub fn label(&self) -> &str {
        if self.display_name.trim().is_empty() {
            &self.name
        } else {
            &self.display_name
        }
    }
}

/// The six camera slots.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CameraSettings {
    #[serde(default)]
    pub cameras: Vec<CameraConfig>,
}

impl Default for CameraSettings {
    fn default() -> Self {
        Self {
            cameras: (1..=SLOT_COUNT)
                .map(|i| CameraConfig::new(format!("Cam{}", i)))
                .collect(),
        }
    }
}

impl CameraSettings {
    /// Force exactly six slots with non-blank names. Returns whether anything
    /// changed.
    pub fn normalize(&mut self) -> bool {
        let mut changed = false;
        if self.cameras.len() != SLOT_COUNT {
            self.cameras.resize_with(SLOT_COUNT, CameraConfig::default);
            changed = true;
        }
        for (i, cam) in self.cameras.iter_mut().enumerate() {
            if cam.name.trim().is_empty() {
                cam.name = format!("Cam{}", i + 1);
                changed = true;
            }
        }
        changed
    }

    /// Keep each physical device in its first slot only.
    ///
    /// Later slots claiming an already-seen `interface::device` have their
    /// device cleared. Returns whether anything changed.
    pub fn ensure_unique_devices(&mut self) -> bool {
        let mut seen = HashSet::new();
        let mut changed = false;
        for cam in &mut self.cameras {
            let Some(key) = cam.device_key() else {
                continue;
            };
            if !seen.insert(key) {
                tracing::warn!(
                    slot = %cam.name,
                    device = %cam.device,
                    "Physical device already assigned to an earlier slot; clearing"
                );
                cam.device.clear();
                changed = true;
            }
        }
        changed
    }

    /// Slots whose device key collides with an earlier slot.
    pub fn duplicate_devices(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        self.cameras
            .iter()
            .filter_map(|cam| cam.device_key().map(|key| (cam, key)))
            .filter(|(_, key)| !seen.insert(key.clone()))
            .map(|(cam, _)| cam.name.clone())
            .collect()
    }

    pub fn get(&self, name: &str) -> Option<&CameraConfig> {
        self.cameras.iter().find(|c| c.name == name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut CameraConfig> {
        self.cameras.iter_mut().find(|c| c.name == name)
    }
}

// =============================================================================
// PLC Settings
// =============================================================================

/// One Modbus PLC that carries a group's alarm bit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlcEndpoint {
    pub ip: String,
    /// Holding register, 0-based
    #[serde(default)]
    pub alarm_register: u16,
}

impl PlcEndpoint {
    pub fn new(ip: impl Into<String>, alarm_register: u16) -> Self {
        Self {
            ip: ip.into(),
            alarm_register,
        }
    }
}

/// PLC A serves trigger group 1, PLC B serves group 2.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlcSettings {
    pub plc_a: PlcEndpoint,
    pub plc_b: PlcEndpoint,
    /// Modbus unit id, usually 1
    pub slave_id: u8,
    pub port: u16,
}

impl Default for PlcSettings {
    fn default() -> Self {
        Self {
            plc_a: PlcEndpoint::new("192.168.0.10", 0),
            plc_b: PlcEndpoint::new("192.168.0.11", 0),
            slave_id: 1,
            port: 502,
        }
    }
}

impl PlcSettings {
    /// The PLC that carries `group`'s alarm bit.
    pub fn endpoint(&self, group: TriggerGroup) -> &PlcEndpoint {
        match group {
            TriggerGroup::Group1 => &self.plc_a,
            TriggerGroup::Group2 => &self.plc_b,
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        for (label, endpoint) in [("plc_a", &self.plc_a), ("plc_b", &self.plc_b)] {
            if endpoint.ip.trim().parse::<IpAddr>().is_err() {
                return Err(format!("Invalid {} address '{}'", label, endpoint.ip));
            }
        }
        if self.slave_id == 0 {
            return Err("slave_id must be 1..=247".to_string());
        }
        if self.slave_id > 247 {
            return Err(format!("slave_id {} out of range 1..=247", self.slave_id));
        }
        Ok(())
    }
}

// =============================================================================
// View Mapping Settings
// =============================================================================

/// Display slot assignments; index 0 is view 1.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewMappingSettings {
    #[serde(default)]
    pub views: Vec<Option<String>>,
}

impl Default for ViewMappingSettings {
    /// View N shows CamN.
    fn default() -> Self {
        Self {
            views: (1..=SLOT_COUNT).map(|i| Some(format!("Cam{}", i))).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cam(name: &str, interface: InterfaceKind, device: &str) -> CameraConfig {
        CameraConfig {
            name: name.to_string(),
            interface,
            device: device.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_default_camera_settings() {
        let settings = CameraSettings::default();
        assert_eq!(settings.cameras.len(), SLOT_COUNT);
        assert_eq!(settings.cameras[0].name, "Cam1");
        assert_eq!(settings.cameras[5].name, "Cam6");
        assert!(settings.cameras.iter().all(|c| !c.has_device()));
    }

    #[test]
    fn test_device_key() {
        assert_eq!(cam("Cam1", InterfaceKind::GigEVision2, "default").device_key(), None);
        assert_eq!(cam("Cam1", InterfaceKind::GigEVision2, "  ").device_key(), None);
        assert_eq!(
            cam("Cam1", InterfaceKind::USB3Vision, "SN-42").device_key(),
            Some("usb3vision::sn-42".to_string())
        );
    }

    #[test]
    fn test_ensure_unique_devices_keeps_first() {
        let mut settings = CameraSettings {
            cameras: vec![
                cam("Cam1", InterfaceKind::GigEVision2, "A"),
                cam("Cam2", InterfaceKind::GigEVision2, "a"),
                cam("Cam3", InterfaceKind::USB3Vision, "A"),
                cam("Cam4", InterfaceKind::GigEVision2, "default"),
                cam("Cam5", InterfaceKind::GigEVision2, "default"),
                cam("Cam6", InterfaceKind::GigEVision2, "A"),
            ],
        };
        assert_eq!(settings.duplicate_devices(), vec!["Cam2", "Cam6"]);

        assert!(settings.ensure_unique_devices());
        assert_eq!(settings.cameras[0].device, "A");
        assert_eq!(settings.cameras[1].device, "");
        // Same serial on another interface is a different device
        assert_eq!(settings.cameras[2].device, "A");
        // Unconfigured slots never collide
        assert_eq!(settings.cameras[4].device, "default");
        assert_eq!(settings.cameras[5].device, "");

        assert!(!settings.ensure_unique_devices());
        assert!(settings.duplicate_devices().is_empty());
    }

    #[test]
    fn test_normalize_pads_and_names() {
        let mut settings = CameraSettings {
            cameras: vec![cam("", InterfaceKind::GigEVision2, "default")],
        };
        assert!(settings.normalize());
        assert_eq!(settings.cameras.len(), SLOT_COUNT);
        assert_eq!(settings.cameras[0].name, "Cam1");
        assert_eq!(settings.cameras[3].name, "Cam4");
        assert!(!settings.normalize());
    }

    #[test]
    fn test_interface_names() {
        assert_eq!(InterfaceKind::from_sdk_name("usb3vision"), InterfaceKind::USB3Vision);
        assert_eq!(InterfaceKind::from_sdk_name("GenTL"), InterfaceKind::GigEVision2);
        assert_eq!(InterfaceKind::USB3Vision.fallbacks(), &["USB3Vision", "DirectShow"]);
    }

    #[test]
    fn test_plc_defaults_and_validation() {
        let plc = PlcSettings::default();
        assert_eq!(plc.endpoint(TriggerGroup::Group1).ip, "192.168.0.10");
        assert_eq!(plc.endpoint(TriggerGroup::Group2).ip, "192.168.0.11");
        assert!(plc.validate().is_ok());

        let bad = PlcSettings {
            plc_b: PlcEndpoint::new("plc-b.local", 3),
            ..Default::default()
        };
        assert!(bad.validate().unwrap_err().contains("plc_b"));
    }

    #[test]
    fn test_json_shapes() {
        let json = serde_json::to_value(ViewMappingSettings {
            views: vec![Some("CamX".into()), None],
        })
        .unwrap();
        assert_eq!(json, serde_json::json!({"views": ["CamX", null]}));

        let parsed: CameraConfig =
            serde_json::from_str(r#"{"name":"Cam2","interface":"USB3Vision"}"#).unwrap();
        assert_eq!(parsed.device, "default");
        assert_eq!(parsed.interface, InterfaceKind::USB3Vision);
    }

    #[test]
    fn test_label_falls_back_to_name() {
        let mut c = CameraConfig::new("Cam3");
        assert_eq!(c.label(), "Cam3");
        c.display_name = "Left station".into();
        assert_eq!(c.label(), "Left station");
    }
}

//! Directory-backed settings store.

use crate::atomic::write_atomic;
use crate::mode::RunMode;
use crate::settings::{CameraSettings, PlcSettings, ViewMappingSettings};
use fleet_core::error::FleetResult;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::{Path, PathBuf};

pub const CAMERA_SETTINGS_FILE: &str = "camera_settings.json";
pub const PLC_SETTINGS_FILE: &str = "plc_settings.json";
pub const VIEW_MAPPING_FILE: &str = "view_mapping.json";

/// Loads and saves the settings documents kept in one directory.
///
/// Every save goes through [`RunMode::ensure_writable`], so a production
/// fleet never touches its files.
#[derive(Debug, Clone)]
pub struct ConfigStore {
    dir: PathBuf,
}

impl ConfigStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_of(&self, file: &str) -> PathBuf {
        self.dir.join(file)
    }

    // =========================================================================
    // Camera settings
    // =========================================================================

    /// Load the camera slots, repaired.
    ///
    /// A missing or unreadable file yields the defaults. When the repair
    /// changed anything and `mode` allows writes, the repaired document is
    /// written back; a failed write is logged and otherwise ignored.
    pub fn load_camera_settings(&self, mode: RunMode) -> CameraSettings {
        let mut settings: CameraSettings = self
            .read_json(CAMERA_SETTINGS_FILE)
            .unwrap_or_default();

        let normalized = settings.normalize();
        let deduplicated = settings.ensure_unique_devices();

        if (normalized || deduplicated) && !mode.is_locked() {
            if let Err(e) = self.save_camera_settings(&settings, mode) {
                tracing::warn!(error = %e, "Failed to persist repaired camera settings");
            }
        }
        settings
    }

    pub fn save_camera_settings(&self, settings: &CameraSettings, mode: RunMode) -> FleetResult<()> {
        mode.ensure_writable()?;
        self.write_json(CAMERA_SETTINGS_FILE, settings)
    }

    // =========================================================================
    // PLC settings
    // =========================================================================

    /// Load PLC endpoints.
    ///
    /// A missing file is created with the defaults (when writable). A file
    /// that fails to parse or validate falls back to the defaults.
    pub fn load_plc_settings(&self, mode: RunMode) -> PlcSettings {
        let path = self.path_of(PLC_SETTINGS_FILE);
        if !path.exists() {
            let defaults = PlcSettings::default();
            if !mode.is_locked() {
                if let Err(e) = self.save_plc_settings(&defaults, mode) {
                    tracing::warn!(error = %e, "Failed to write default PLC settings");
                }
            }
            return defaults;
        }

        match self.read_json::<PlcSettings>(PLC_SETTINGS_FILE) {
            Some(settings) => match settings.validate() {
                Ok(()) => settings,
                Err(e) => {
                    tracing::warn!(error = %e, "Invalid PLC settings, using defaults");
                    PlcSettings::default()
                }
            },
            None => PlcSettings::default(),
        }
    }

    pub fn save_plc_settings(&self, settings: &PlcSettings, mode: RunMode) -> FleetResult<()> {
        mode.ensure_writable()?;
        self.write_json(PLC_SETTINGS_FILE, settings)
    }

    // =========================================================================
    // View mapping
    // =========================================================================

    /// Load the raw view mapping; repair happens in the resolver, which knows
    /// the registered device names.
    pub fn load_view_mapping(&self) -> ViewMappingSettings {
        self.read_json(VIEW_MAPPING_FILE).unwrap_or_default()
    }

    pub fn save_view_mapping(&self, settings: &ViewMappingSettings, mode: RunMode) -> FleetResult<()> {
        mode.ensure_writable()?;
        self.write_json(VIEW_MAPPING_FILE, settings)
    }

    // =========================================================================
    // Helpers
    // =========================================================================

    fn read_json<T: DeserializeOwned>(&self, file: &str) -> Option<T> {
        let path = self.path_of(file);
        let text = match std::fs::read_to_string(&path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Failed to read settings");
                return None;
            }
        };
        match serde_json::from_str(&text) {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Malformed settings, using defaults");
                None
            }
        }
    }

    fn write_json<T: Serialize>(&self, file: &str, value: &T) -> FleetResult<()> {
        let path = self.path_of(file);
        let json = serde_json::to_vec_pretty(value)?;
        write_atomic(&path, &json)?;
        tracing::debug!(path = %path.display(), "Settings saved");
        Ok(())
    }
}

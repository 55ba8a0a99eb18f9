//! Run mode and the persistence lock it implies.

use fleet_core::error::{FleetError, FleetResult};
use serde::{Deserialize, Serialize};

/// Whether the fleet runs against simulated or real cameras.
///
/// Production locks every settings file: configuration is frozen while the
/// line is running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunMode {
    #[default]
    Simulation,
    Production,
}

impl RunMode {
    #[must_use]
    pub fn is_locked(self) -> bool {
        matches!(self, RunMode::Production)
    }

    /// Save precondition shared by every store method.
    pub fn ensure_writable(self) -> FleetResult<()> {
        if self.is_locked() {
            return Err(FleetError::ProductionLocked);
        }
        Ok(())
    }
}

impl std::fmt::Display for RunMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunMode::Simulation => write!(f, "simulation"),
            RunMode::Production => write!(f, "production"),
        }
    }
}

impl std::str::FromStr for RunMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "simulation" | "mock" => Ok(RunMode::Simulation),
            "production" | "real" => Ok(RunMode::Production),
            other => Err(format!(
                "Invalid run mode '{}'. Must be one of: simulation, production",
                other
            )),
        }
    }
}

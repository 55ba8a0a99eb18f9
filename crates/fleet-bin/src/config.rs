//! Daemon configuration.
//!
//! Loaded in increasing precedence from:
//! 1. built-in defaults
//! 2. `camfleet.toml` (or the file given with `--config`)
//! 3. environment variables prefixed with `CAMFLEET_`, `__` separating
//!    nested keys, e.g. `CAMFLEET_LOGGING__LEVEL=debug`
//!
//! The per-station settings documents (cameras, PLC, view mapping) are not
//! part of this file; they live as JSON in `settings_dir`.

use crate::logging::{parse_log_level, OutputFormat};
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use fleet_core::retry::RetryPolicy;
use fleet_hardware::{SimulationOptions, MIN_CYCLE};
use fleet_storage::RunMode;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_CONFIG_FILE: &str = "camfleet.toml";
pub const ENV_PREFIX: &str = "CAMFLEET_";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
    pub mode: RunMode,
    /// Directory holding camera, PLC and view mapping JSON files
    pub settings_dir: PathBuf,
    pub logging: LoggingConfig,
    pub trigger: TriggerConfig,
    pub retry: RetryConfig,
    pub simulation: SimulationConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// trace, debug, info, warn or error. `RUST_LOG` wins when set.
    pub level: String,
    /// pretty, compact or json
    pub format: String,
    /// Log span open and close
    pub span_events: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TriggerConfig {
    /// Trigger both groups periodically
    pub auto: bool,
    pub cycle_ms: u64,
    /// How often `run` logs a fleet status line; 0 disables it
    pub status_interval_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub floor_ms: u64,
    pub ceiling_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Probability that a simulated grab fails, 0.0 to 1.0
    pub fault_rate: f64,
    pub recovery_ms: u64,
    pub seed: Option<u64>,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            mode: RunMode::Simulation,
            settings_dir: PathBuf::from("settings"),
            logging: LoggingConfig::default(),
            trigger: TriggerConfig::default(),
            retry: RetryConfig::default(),
            simulation: SimulationConfig::default(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
            span_events: false,
        }
    }
}

impl Default for TriggerConfig {
    fn default() -> Self {
        Self {
            auto: true,
            cycle_ms: 1000,
            status_interval_secs: 5,
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            floor_ms: 1000,
            ceiling_ms: 30_000,
        }
    }
}

impl Default for SimulationConfig {
    fn default() -> Self {
        let defaults = SimulationOptions::default();
        Self {
            fault_rate: defaults.fault_rate,
            recovery_ms: defaults.recovery.as_millis() as u64,
            seed: None,
        }
    }
}

impl DaemonConfig {
    /// Load from `camfleet.toml` in the working directory plus the environment.
    pub fn load() -> Result<Self, figment::Error> {
        Self::load_from(DEFAULT_CONFIG_FILE)
    }

    /// Load from a specific file plus the environment. A missing file is not
    /// an error; defaults apply.
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self, figment::Error> {
        Self::figment(path.as_ref()).extract()
    }

    fn figment(path: &Path) -> Figment {
        Figment::from(Serialized::defaults(DaemonConfig::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> Result<(), String> {
        parse_log_level(&self.logging.level)?;
        self.logging.format.parse::<OutputFormat>()?;

        if self.trigger.cycle_ms < MIN_CYCLE.as_millis() as u64 {
            return Err(format!(
                "trigger.cycle_ms must be at least {} (got {})",
                MIN_CYCLE.as_millis(),
                self.trigger.cycle_ms
            ));
        }

        if self.retry.floor_ms == 0 {
            return Err("retry.floor_ms must be positive".to_string());
        }
        if self.retry.ceiling_ms < self.retry.floor_ms {
            return Err(format!(
                "retry.ceiling_ms ({}) must not be below retry.floor_ms ({})",
                self.retry.ceiling_ms, self.retry.floor_ms
            ));
        }

        if !(0.0..=1.0).contains(&self.simulation.fault_rate) {
            return Err(format!(
                "simulation.fault_rate must be between 0.0 and 1.0 (got {})",
                self.simulation.fault_rate
            ));
        }

        Ok(())
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            Duration::from_millis(self.retry.floor_ms),
            Duration::from_millis(self.retry.ceiling_ms),
        )
    }

    pub fn simulation_options(&self) -> SimulationOptions {
        SimulationOptions {
            fault_rate: self.simulation.fault_rate,
            recovery: Duration::from_millis(self.simulation.recovery_ms),
            seed: self.simulation.seed,
            ..Default::default()
        }
    }

    pub fn cycle(&self) -> Duration {
        fleet_hardware::cycle_interval(self.trigger.cycle_ms)
    }

    /// `None` when periodic status lines are off.
    pub fn status_interval(&self) -> Option<Duration> {
        (self.trigger.status_interval_secs > 0)
            .then(|| Duration::from_secs(self.trigger.status_interval_secs))
    }
}

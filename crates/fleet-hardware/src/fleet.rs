//! Fleet assembly and the automatic trigger cycle.
//!
//! ```text
//!   CameraSettings ──▶ FleetBuilder ──▶ DeviceRegistry ──▶ FleetStatusAggregator
//!                                             │                   │
//!                                             ▼                   ▼
//!                                       AlarmLinkage        SlotRateMonitor
//!                                                                 │
//!                                                     ViewMappingResolver
//! ```

use crate::aggregator::FleetStatusAggregator;
use crate::alarm::{AlarmActuator, AlarmLinkage};
use crate::fps::SlotRateMonitor;
use crate::registry::DeviceRegistry;
use crate::view_mapping::ViewMappingResolver;
use fleet_core::device::{AcquisitionBackend, Device, TriggerGroup};
use fleet_core::error::{FleetError, FleetResult};
use fleet_core::events::ObserverHandle;
use fleet_core::retry::RetryPolicy;
use fleet_driver_framegrabber::{FramegrabberCamera, FramegrabberSdk};
use fleet_driver_mock::{MockMode, SimulatedCamera, DEFAULT_FAULT_RATE, DEFAULT_RECOVERY};
use fleet_storage::{CameraConfig, CameraSettings, PlcSettings, RunMode};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

/// Shortest allowed auto-trigger period.
pub const MIN_CYCLE: Duration = Duration::from_millis(50);
pub const DEFAULT_CYCLE: Duration = Duration::from_millis(1000);

// =============================================================================
// Builder
// =============================================================================

/// Knobs for simulated cameras.
#[derive(Debug, Clone)]
pub struct SimulationOptions {
    pub fault_rate: f64,
    pub recovery: Duration,
    pub mode: MockMode,
    /// Base RNG seed; slot `i` uses `seed + i`
    pub seed: Option<u64>,
}

impl Default for SimulationOptions {
    fn default() -> Self {
        Self {
            fault_rate: DEFAULT_FAULT_RATE,
            recovery: DEFAULT_RECOVERY,
            mode: MockMode::Instant,
            seed: None,
        }
    }
}

/// Turns camera settings into registered devices.
///
/// Slots 1-3 join [`TriggerGroup::Group1`], slots 4-6 join
/// [`TriggerGroup::Group2`].
pub struct FleetBuilder {
    mode: RunMode,
    sdk: Option<Arc<dyn FramegrabberSdk>>,
    retry: RetryPolicy,
    simulation: SimulationOptions,
}

impl FleetBuilder {
    pub fn new(mode: RunMode) -> Self {
        Self {
            mode,
            sdk: None,
            retry: RetryPolicy::default(),
            simulation: SimulationOptions::default(),
        }
    }

    pub fn sdk(mut self, sdk: Arc<dyn FramegrabberSdk>) -> Self {
        self.sdk = Some(sdk);
        self
    }

    pub fn retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn simulation(mut self, options: SimulationOptions) -> Self {
        self.simulation = options;
        self
    }

    pub fn mode(&self) -> RunMode {
        self.mode
    }

    /// Backend for one slot.
    ///
    /// # Errors
    ///
    /// `Configuration` in production without an SDK.
    fn backend_for(&self, index: usize, config: &CameraConfig) -> FleetResult<Box<dyn AcquisitionBackend>> {
        match (self.mode, &self.sdk) {
            (RunMode::Production, None) => Err(FleetError::Configuration(
                "production mode requires a framegrabber SDK".to_string(),
            )),
            (RunMode::Production, Some(sdk)) => {
                Ok(Box::new(FramegrabberCamera::new(sdk.clone(), config.clone())))
            }
            (RunMode::Simulation, Some(sdk)) if config.has_device() => {
                Ok(Box::new(FramegrabberCamera::new(sdk.clone(), config.clone())))
            }
            (RunMode::Simulation, _) => {
                let sim = &self.simulation;
                let mut builder = SimulatedCamera::builder()
                    .mode(sim.mode)
                    .fault_rate(sim.fault_rate)
                    .recovery(sim.recovery);
                if let Some(seed) = sim.seed {
                    builder = builder.seed(seed.wrapping_add(index as u64));
                }
                Ok(Box::new(builder.build()))
            }
        }
    }

    /// Build every slot's device and register it.
    ///
    /// Names and backends are checked before anything is registered, so a
    /// configuration error leaves `registry` untouched.
    ///
    /// # Errors
    ///
    /// `Configuration` when two slots share a name, when a name is already
    /// registered, or when a backend cannot be built.
    pub fn populate(&self, settings: &CameraSettings, registry: &DeviceRegistry) -> FleetResult<()> {
        let mut names = HashSet::with_capacity(settings.cameras.len());
        for config in &settings.cameras {
            if !names.insert(config.name.as_str()) {
                return Err(FleetError::Configuration(format!(
                    "camera name '{}' is used by more than one slot",
                    config.name
                )));
            }
            if registry.device(&config.name).is_some() {
                return Err(FleetError::Configuration(format!(
                    "Device name already registered: {}",
                    config.name
                )));
            }
        }

        let mut devices = Vec::with_capacity(settings.cameras.len());
        for (index, config) in settings.cameras.iter().enumerate() {
            let backend = self.backend_for(index, config)?;
            let device = Device::with_retry_policy(config.name.clone(), backend, self.retry.clone());
            devices.push((device, TriggerGroup::for_slot_index(index)));
        }
        for (device, group) in devices {
            registry.add(device, group)?;
        }
        tracing::info!(mode = %self.mode, devices = registry.len(), "Fleet populated");
        Ok(())
    }
}

// =============================================================================
// Fleet
// =============================================================================

/// Registry plus the consumers wired to it.
pub struct Fleet {
    registry: DeviceRegistry,
    aggregator: Arc<FleetStatusAggregator>,
    resolver: Arc<ViewMappingResolver>,
    slot_rates: Arc<SlotRateMonitor>,
    alarm: Arc<AlarmLinkage>,
    alarm_handle: ObserverHandle,
}

impl Fleet {
    pub fn new(
        resolver: Arc<ViewMappingResolver>,
        plc: &PlcSettings,
        plc_a: Arc<dyn AlarmActuator>,
        plc_b: Arc<dyn AlarmActuator>,
    ) -> Self {
        let registry = DeviceRegistry::new();
        let aggregator = FleetStatusAggregator::attach(&registry);
        let slot_rates = Arc::new(SlotRateMonitor::new(resolver.clone()));
        aggregator.set_slot_rates(slot_rates.clone());

        let alarm = Arc::new(AlarmLinkage::from_settings(registry.downgrade(), plc, plc_a, plc_b));
        let alarm_handle = registry.subscribe(alarm.clone());

        Self {
            registry,
            aggregator,
            resolver,
            slot_rates,
            alarm,
            alarm_handle,
        }
    }

    /// Replace every device with a fresh set built from `settings`.
    pub async fn rebuild(&self, builder: &FleetBuilder, settings: &CameraSettings) -> FleetResult<()> {
        self.registry.clear().await;
        self.alarm.reset();
        builder.populate(settings, &self.registry)
    }

    pub async fn start(&self) {
        self.registry.start_all().await;
    }

    pub async fn shutdown(&self) {
        self.registry.stop_all();
        self.registry.clear().await;
        self.registry.unsubscribe(self.alarm_handle);
        self.aggregator.detach();
    }

    pub fn registry(&self) -> &DeviceRegistry {
        &self.registry
    }

    pub fn aggregator(&self) -> &Arc<FleetStatusAggregator> {
        &self.aggregator
    }

    pub fn resolver(&self) -> &Arc<ViewMappingResolver> {
        &self.resolver
    }

    pub fn slot_rates(&self) -> &Arc<SlotRateMonitor> {
        &self.slot_rates
    }

    pub fn alarm(&self) -> &Arc<AlarmLinkage> {
        &self.alarm
    }
}

// =============================================================================
// Auto trigger cycle
// =============================================================================

/// Trigger period for a configured value in milliseconds, never below
/// [`MIN_CYCLE`].
pub fn cycle_interval(cycle_ms: u64) -> Duration {
    Duration::from_millis(cycle_ms).max(MIN_CYCLE)
}

/// Trigger group 1 then group 2 every `period` until `shutdown` turns true
/// or its sender is dropped.
///
/// # Returns
///
/// Number of completed cycles.
pub async fn run_trigger_cycle(
    registry: DeviceRegistry,
    period: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> u64 {
    let period = period.max(MIN_CYCLE);
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    let mut cycles = 0u64;

    tracing::info!(period_ms = period.as_millis() as u64, "Trigger cycle started");
    loop {
        if *shutdown.borrow() {
            break;
        }
        tokio::select! {
            _ = ticker.tick() => {
                registry.trigger_group(TriggerGroup::Group1).await;
                registry.trigger_group(TriggerGroup::Group2).await;
                cycles += 1;
            }
            changed = shutdown.changed() => {
                if changed.is_err() {
                    break;
                }
            }
        }
    }
    tracing::info!(cycles, "Trigger cycle stopped");
    cycles
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cycle_interval_floor() {
        assert_eq!(cycle_interval(10), MIN_CYCLE);
        assert_eq!(cycle_interval(1000), DEFAULT_CYCLE);
    }

    #[test]
    fn test_production_without_sdk_is_rejected() {
        let registry = DeviceRegistry::new();
        let err = FleetBuilder::new(RunMode::Production)
            .populate(&CameraSettings::default(), &registry)
            .unwrap_err();
        assert!(matches!(err, FleetError::Configuration(_)));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_duplicate_slot_names_register_nothing() {
        let registry = DeviceRegistry::new();
        let mut settings = CameraSettings::default();
        settings.cameras[3] = CameraConfig::new("Cam1");

        let err = FleetBuilder::new(RunMode::Simulation)
            .populate(&settings, &registry)
            .unwrap_err();
        assert!(matches!(err, FleetError::Configuration(ref m) if m.contains("Cam1")));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_simulation_groups_by_slot() {
        let registry = DeviceRegistry::new();
        FleetBuilder::new(RunMode::Simulation)
            .populate(&CameraSettings::default(), &registry)
            .unwrap();
        assert_eq!(registry.len(), 6);
        assert_eq!(registry.group_of("Cam3"), Some(TriggerGroup::Group1));
        assert_eq!(registry.group_of("Cam4"), Some(TriggerGroup::Group2));
        assert_eq!(
            registry.device("Cam1").map(|d| d.driver_type()),
            Some("simulated_camera")
        );
    }
}

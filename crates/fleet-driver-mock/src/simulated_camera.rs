//! Simulated camera backend with fault injection and auto-recovery.

use crate::common::{ErrorConfig, MockMode, MockRng, Operation, TimingConfig};
use crate::pattern::{block_intensity, moving_block};
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use fleet_core::data::Frame;
use fleet_core::device::AcquisitionBackend;
use fleet_core::error::{DriverError, DriverErrorKind};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, Instant};

const DRIVER_TYPE: &str = "simulated_camera";

/// Probability that any single grab drops the link.
pub const DEFAULT_FAULT_RATE: f64 = 0.05;

/// How long a simulated disconnect lasts.
pub const DEFAULT_RECOVERY: Duration = Duration::from_millis(1500);

pub const DEFAULT_WIDTH: u32 = 640;
pub const DEFAULT_HEIGHT: u32 = 480;

/// Parameter names accepted by [`SimulatedCamera`], in display order.
pub const SUPPORTED_PARAMS: [&str; 4] = ["exposure_auto", "exposure", "gain_auto", "gain"];

// =============================================================================
// FaultSwitch - External fault control
// =============================================================================

/// Shared switch that forces a simulated camera offline until cleared.
///
/// Lets tests and operators pull the virtual cable deterministically instead
/// of waiting for a random fault.
#[derive(Debug, Clone, Default)]
pub struct FaultSwitch(Arc<AtomicBool>);

impl FaultSwitch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn trip(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn clear(&self) {
        self.0.store(false, Ordering::SeqCst);
    }

    pub fn is_tripped(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

// =============================================================================
// Tuning parameters
// =============================================================================

/// Tuning values a simulated camera exposes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraParams {
    /// Exposure time in microseconds
    pub exposure_us: i64,
    pub exposure_auto: bool,
    pub gain: f64,
    pub gain_auto: bool,
}

impl Default for CameraParams {
    fn default() -> Self {
        Self {
            exposure_us: 8000,
            exposure_auto: false,
            gain: 1.0,
            gain_auto: false,
        }
    }
}

fn parse_switch(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "on" | "true" | "1" => Some(true),
        "off" | "false" | "0" => Some(false),
        other => other.parse::<i64>().ok().map(|v| v != 0),
    }
}

fn invalid_param(name: &str, value: &str) -> anyhow::Error {
    DriverError::new(
        DRIVER_TYPE,
        DriverErrorKind::InvalidParameter,
        format!("Invalid value '{}' for parameter '{}'", value, name),
    )
    .into()
}

// =============================================================================
// SimulatedCameraBuilder - Builder Pattern
// =============================================================================

/// Builder for SimulatedCamera with advanced configuration
pub struct SimulatedCameraBuilder {
    width: u32,
    height: u32,
    mode: MockMode,
    fault_rate: f64,
    recovery: Duration,
    error_config: ErrorConfig,
    timing_config: TimingConfig,
    seed: Option<u64>,
    fault_switch: FaultSwitch,
}

impl SimulatedCameraBuilder {
    pub fn new() -> Self {
        Self {
            width: DEFAULT_WIDTH,
            height: DEFAULT_HEIGHT,
            mode: MockMode::Instant,
            fault_rate: DEFAULT_FAULT_RATE,
            recovery: DEFAULT_RECOVERY,
            error_config: ErrorConfig::none(),
            timing_config: TimingConfig::gige_camera(),
            seed: None,
            fault_switch: FaultSwitch::new(),
        }
    }

    pub fn resolution(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    pub fn mode(mut self, mode: MockMode) -> Self {
        self.mode = mode;
        self
    }

    /// Probability that a grab drops the link (clamped to 0..=1).
    pub fn fault_rate(mut self, rate: f64) -> Self {
        self.fault_rate = rate.clamp(0.0, 1.0);
        self
    }

    /// How long the link stays down after a random fault.
    pub fn recovery(mut self, recovery: Duration) -> Self {
        self.recovery = recovery;
        self
    }

    pub fn error_config(mut self, config: ErrorConfig) -> Self {
        self.error_config = config;
        self
    }

    pub fn timing_config(mut self, config: TimingConfig) -> Self {
        self.timing_config = config;
        self
    }

    /// Seed the fault RNG for reproducible runs.
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn fault_switch(mut self, switch: FaultSwitch) -> Self {
        self.fault_switch = switch;
        self
    }

    pub fn build(self) -> SimulatedCamera {
        SimulatedCamera {
            width: self.width,
            height: self.height,
            mode: self.mode,
            fault_rate: self.fault_rate,
            recovery: self.recovery,
            error_config: self.error_config,
            timing: self.timing_config,
            rng: MockRng::new(self.seed),
            fault_switch: self.fault_switch,
            open: false,
            faulted_until: None,
            frame_count: 0,
            params: CameraParams::default(),
        }
    }
}

impl Default for SimulatedCameraBuilder {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// SimulatedCamera
// =============================================================================

/// Camera backend that needs no hardware.
///
/// Simulates:
/// - Random link drops (`fault_rate` per grab) that heal after `recovery`
/// - Forced disconnects through a shared [`FaultSwitch`]
/// - Scripted failures through [`ErrorConfig`]
/// - Exposure and gain that change the brightness of the output
///
/// # Example
///
/// ```rust,ignore
/// let camera = SimulatedCamera::builder().fault_rate(0.0).build();
/// let device = Device::new("Cam1", Box::new(camera));
/// ```
pub struct SimulatedCamera {
    width: u32,
    height: u32,
    mode: MockMode,
    fault_rate: f64,
    recovery: Duration,
    error_config: ErrorConfig,
    timing: TimingConfig,
    rng: MockRng,
    fault_switch: FaultSwitch,
    open: bool,
    faulted_until: Option<Instant>,
    frame_count: u64,
    params: CameraParams,
}

impl SimulatedCamera {
    /// Camera with default resolution and fault model.
    pub fn new() -> Self {
        SimulatedCameraBuilder::new().build()
    }

    pub fn builder() -> SimulatedCameraBuilder {
        SimulatedCameraBuilder::new()
    }

    pub fn params(&self) -> CameraParams {
        self.params
    }

    pub fn resolution(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn disconnected(&self, message: &str) -> anyhow::Error {
        DriverError::new(DRIVER_TYPE, DriverErrorKind::Communication, message).into()
    }

    /// Error if the virtual link is currently down.
    fn check_link(&mut self) -> Result<()> {
        if self.fault_switch.is_tripped() {
            return Err(self.disconnected("simulated disconnect"));
        }
        if let Some(until) = self.faulted_until {
            if Instant::now() < until {
                return Err(self.disconnected("camera is faulted"));
            }
            self.faulted_until = None;
        }
        Ok(())
    }
}

impl Default for SimulatedCamera {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AcquisitionBackend for SimulatedCamera {
    fn driver_type(&self) -> &'static str {
        DRIVER_TYPE
    }

    async fn open(&mut self) -> Result<()> {
        if self.mode.simulates_latency() {
            sleep(self.timing.open_delay()).await;
        }
        self.check_link()?;
        self.error_config.check(DRIVER_TYPE, Operation::Open)?;

        self.open = true;
        self.frame_count = 0;
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.open
    }

    async fn grab(&mut self) -> Result<Frame> {
        if !self.open {
            return Err(anyhow!("{} is not open", DRIVER_TYPE));
        }
        self.check_link()?;
        self.error_config.check(DRIVER_TYPE, Operation::Grab)?;

        if self.rng.should_fail(self.mode.effective_fault_rate(self.fault_rate)) {
            self.faulted_until = Some(Instant::now() + self.recovery);
            tracing::debug!(recovery_ms = self.recovery.as_millis() as u64, "Simulated disconnect");
            return Err(self.disconnected("simulated disconnect"));
        }

        if self.mode.simulates_latency() {
            sleep(self.timing.readout()).await;
        }

        self.frame_count += 1;
        let intensity = block_intensity(self.params.exposure_us, self.params.gain);
        let pixels = moving_block(self.width, self.height, self.frame_count, intensity);
        Ok(Frame::from_u8(self.width, self.height, pixels).with_frame_number(self.frame_count))
    }

    async fn close(&mut self) {
        self.open = false;
    }

    async fn set_param(&mut self, name: &str, value: &str) -> Result<()> {
        self.error_config.check(DRIVER_TYPE, Operation::SetParam)?;

        let key = name.trim();
        let key = key.strip_prefix("Consumer|").unwrap_or(key).to_ascii_lowercase();
        match key.as_str() {
            "exposure" => {
                let v = value.trim();
                self.params.exposure_us = v
                    .parse::<i64>()
                    .ok()
                    .or_else(|| v.parse::<f64>().ok().map(|f| f as i64))
                    .ok_or_else(|| invalid_param(name, value))?;
            }
            "gain" => {
                self.params.gain = value
                    .trim()
                    .parse::<f64>()
                    .map_err(|_| invalid_param(name, value))?;
            }
            "exposure_auto" => {
                self.params.exposure_auto =
                    parse_switch(value).ok_or_else(|| invalid_param(name, value))?;
            }
            "gain_auto" => {
                self.params.gain_auto =
                    parse_switch(value).ok_or_else(|| invalid_param(name, value))?;
            }
            _ => {
                return Err(DriverError::new(
                    DRIVER_TYPE,
                    DriverErrorKind::InvalidParameter,
                    format!("Unsupported simulated parameter '{}'", name),
                )
                .into())
            }
        }
        Ok(())
    }
}

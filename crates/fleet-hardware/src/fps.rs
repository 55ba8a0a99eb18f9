//! Frame rate estimation.
//!
//! Two estimators with different purposes:
//!
//! - [`WindowFpsCounter`]: frames per whole one-second window. Coarse, kept
//!   fleet-wide and per device.
//! - [`EmaFpsMeter`]: smoothed instantaneous rate from inter-frame intervals,
//!   used per device and per display slot.
//!
//! Both drop to zero when frames stop.

use crate::view_mapping::{ViewMappingResolver, ViewSlot};
use fleet_storage::SLOT_COUNT;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// Weight of the newest sample.
pub const EMA_ALPHA: f64 = 0.2;

/// Without a frame for this long a meter reads zero.
pub const FPS_TIMEOUT: Duration = Duration::from_millis(1200);

/// Intervals outside (MIN, MAX) are not rate samples.
const MIN_INTERVAL: Duration = Duration::from_micros(1);
const MAX_INTERVAL: Duration = Duration::from_secs(5);

const WINDOW: Duration = Duration::from_secs(1);

// =============================================================================
// Window counter
// =============================================================================

#[derive(Debug, Clone)]
pub struct WindowFpsCounter {
    window_start: Instant,
    frames: u64,
    fps: f64,
}

impl WindowFpsCounter {
    pub fn new(now: Instant) -> Self {
        Self {
            window_start: now,
            frames: 0,
            fps: 0.0,
        }
    }

    /// Count one frame; closes the window once a second has passed.
    pub fn record(&mut self, now: Instant) {
        self.frames += 1;
        let elapsed = now.saturating_duration_since(self.window_start);
        if elapsed >= WINDOW {
            self.fps = self.frames as f64 * 1000.0 / elapsed.as_millis() as f64;
            self.frames = 0;
            self.window_start = now;
        }
    }

    /// Rate of the last completed window, as a once-a-second timer would see
    /// it.
    ///
    /// Frames pending in a window nothing closed all fall within its first
    /// second, so they are that window's rate. A further second without
    /// frames reads zero.
    pub fn fps(&self, now: Instant) -> f64 {
        let elapsed = now.saturating_duration_since(self.window_start);
        if elapsed < WINDOW {
            self.fps
        } else if elapsed < WINDOW * 2 {
            self.frames as f64 / WINDOW.as_secs_f64()
        } else {
            0.0
        }
    }
}

// =============================================================================
// EMA meter
// =============================================================================

#[derive(Debug, Clone, Default)]
pub struct EmaFpsMeter {
    ema: f64,
    last_frame: Option<Instant>,
}

impl EmaFpsMeter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, at: Instant) {
        if let Some(prev) = self.last_frame {
            let dt = at.saturating_duration_since(prev);
            if dt > FPS_TIMEOUT {
                self.ema = 0.0;
            }
            if dt > MIN_INTERVAL && dt < MAX_INTERVAL {
                let inst = 1.0 / dt.as_secs_f64();
                self.ema = if self.ema <= 0.0 {
                    inst
                } else {
                    EMA_ALPHA * inst + (1.0 - EMA_ALPHA) * self.ema
                };
            }
        }
        self.last_frame = Some(at);
    }

    /// Whether a frame arrived within [`FPS_TIMEOUT`] of `now`.
    pub fn is_running(&self, now: Instant) -> bool {
        self.last_frame
            .is_some_and(|last| now.saturating_duration_since(last) <= FPS_TIMEOUT)
    }

    pub fn fps(&self, now: Instant) -> f64 {
        if self.is_running(now) {
            self.ema
        } else {
            0.0
        }
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

// =============================================================================
// Per-slot rates
// =============================================================================

/// EMA frame rate per display slot.
///
/// Frames are attributed to the slot currently showing their device; frames
/// of unmapped devices are not counted and unmapped slots read zero.
#[derive(Debug)]
pub struct SlotRateMonitor {
    resolver: Arc<ViewMappingResolver>,
    meters: Mutex<[EmaFpsMeter; SLOT_COUNT]>,
}

impl SlotRateMonitor {
    pub fn new(resolver: Arc<ViewMappingResolver>) -> Self {
        Self {
            resolver,
            meters: Mutex::new(Default::default()),
        }
    }

    pub fn record_frame(&self, device: &str, at: Instant) {
        if let Some(slot) = self.resolver.resolve_slot_for_device(device) {
            self.meters.lock()[slot.index()].record(at);
        }
    }

    pub fn slot_fps(&self, slot: ViewSlot, now: Instant) -> f64 {
        if !self.resolver.is_mapped(slot) {
            return 0.0;
        }
        self.meters.lock()[slot.index()].fps(now)
    }

    pub fn all(&self, now: Instant) -> [f64; SLOT_COUNT] {
        let mut out = [0.0; SLOT_COUNT];
        for slot in ViewSlot::all() {
            out[slot.index()] = self.slot_fps(slot, now);
        }
        out
    }

    /// Zero unmapped and stalled slots so a remapped slot starts fresh.
    pub fn refresh(&self, now: Instant) {
        let mut meters = self.meters.lock();
        for slot in ViewSlot::all() {
            let meter = &mut meters[slot.index()];
            if !self.resolver.is_mapped(slot) || !meter.is_running(now) {
                meter.reset();
            }
        }
    }
}

#[derive(Debug)]
struct DeviceRates {
    ema: EmaFpsMeter,
    window: WindowFpsCounter,
}

/// Smoothed and windowed frame rates per device name.
#[derive(Debug, Default)]
pub struct DeviceRateMonitor {
    meters: Mutex<HashMap<String, DeviceRates>>,
}

impl DeviceRateMonitor {
    pub fn record_frame(&self, device: &str, at: Instant) {
        let mut meters = self.meters.lock();
        let rates = meters
            .entry(device.to_string())
            .or_insert_with(|| DeviceRates {
                ema: EmaFpsMeter::new(),
                window: WindowFpsCounter::new(at),
            });
        rates.ema.record(at);
        rates.window.record(at);
    }

    /// Smoothed rate.
    pub fn fps(&self, device: &str, now: Instant) -> f64 {
        self.meters
            .lock()
            .get(device)
            .map(|r| r.ema.fps(now))
            .unwrap_or(0.0)
    }

    /// Frames in the last one-second window.
    pub fn window_fps(&self, device: &str, now: Instant) -> f64 {
        self.meters
            .lock()
            .get(device)
            .map(|r| r.window.fps(now))
            .unwrap_or(0.0)
    }

    pub fn clear(&self) {
        self.meters.lock().clear();
    }
}

//! Fleet-level status: frame rates, online counts and simplified events.

use crate::alarm::AlarmLinkage;
use crate::fps::{DeviceRateMonitor, SlotRateMonitor, WindowFpsCounter};
use crate::registry::DeviceRegistry;
use fleet_core::device::{DeviceState, DeviceStatus, TriggerGroup};
use fleet_core::events::{DeviceObserver, ObserverHandle, ObserverList};
use fleet_core::Frame;
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use std::sync::{Arc, Weak};
use tokio::time::Instant;

/// Consumer of the aggregator's republished events.
///
/// The frame passed to [`on_image_ready`](Self::on_image_ready) is only
/// borrowed for the call.
pub trait FleetObserver: Send + Sync {
    fn on_image_ready(&self, _device: &str, _frame: &Frame) {}

    fn on_camera_online_changed(&self, _device: &str, _online: bool) {}

    fn on_camera_error(&self, _device: &str, _message: &str) {}

    fn on_status_changed(&self, _device: &str, _status: &DeviceStatus) {}
}

#[derive(Debug, Clone, Serialize)]
pub struct DeviceSnapshot {
    pub name: String,
    pub group: TriggerGroup,
    pub state: DeviceState,
    pub online: bool,
    /// Smoothed frames per second
    pub fps: f64,
    /// Frames in the last one-second window
    pub window_fps: f64,
    /// Whole seconds until the next reconnect attempt, rounded up
    pub retry_in_secs: Option<u64>,
    pub label: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct FleetSnapshot {
    pub devices: Vec<DeviceSnapshot>,
    /// Fleet-wide frames in the last one-second window
    pub fps: f64,
}

impl FleetSnapshot {
    pub fn online_count(&self) -> usize {
        self.devices.iter().filter(|d| d.online).count()
    }

    pub fn offline_count(&self) -> usize {
        self.devices.len() - self.online_count()
    }

    /// `CAM: online/total`, or `CAM: -` for an empty fleet.
    pub fn overview_label(&self) -> String {
        if self.devices.is_empty() {
            "CAM: -".to_string()
        } else {
            format!("CAM: {}/{}", self.online_count(), self.devices.len())
        }
    }

    /// `ALARM: -` when all is well, otherwise the active conditions joined
    /// with ` | `, e.g. `ALARM: CAM_OFFLINE(2) | PLC1_OFFLINE`.
    pub fn alarm_summary(&self, plc_links: &[(TriggerGroup, bool)]) -> String {
        let mut parts = Vec::new();
        let offline = self.offline_count();
        if offline > 0 {
            parts.push(format!("CAM_OFFLINE({})", offline));
        }
        for (group, connected) in plc_links {
            if !connected {
                let plc = match group {
                    TriggerGroup::Group1 => "PLC1",
                    TriggerGroup::Group2 => "PLC2",
                };
                parts.push(format!("{}_OFFLINE", plc));
            }
        }
        if parts.is_empty() {
            "ALARM: -".to_string()
        } else {
            format!("ALARM: {}", parts.join(" | "))
        }
    }
}

/// Wraps a [`DeviceRegistry`]: measures frame rates and republishes device
/// events to [`FleetObserver`]s.
///
/// Frames are never retained; only their arrival times are.
pub struct FleetStatusAggregator {
    registry: DeviceRegistry,
    observers: ObserverList<dyn FleetObserver>,
    window: Mutex<WindowFpsCounter>,
    device_rates: DeviceRateMonitor,
    slot_rates: RwLock<Option<Arc<SlotRateMonitor>>>,
    subscription: Mutex<Option<ObserverHandle>>,
}

/// Registry-side observer. Weak so the registry does not keep the
/// aggregator alive.
struct Bridge(Weak<FleetStatusAggregator>);

impl DeviceObserver for Bridge {
    fn on_frame(&self, device: &str, frame: &Frame) {
        if let Some(agg) = self.0.upgrade() {
            agg.frame_arrived(device, frame);
        }
    }

    fn on_error(&self, device: &str, message: &str) {
        if let Some(agg) = self.0.upgrade() {
            agg.observers.for_each(|o| o.on_camera_error(device, message));
        }
    }

    fn on_online_changed(&self, device: &str, online: bool) {
        if let Some(agg) = self.0.upgrade() {
            agg.observers
                .for_each(|o| o.on_camera_online_changed(device, online));
        }
    }

    fn on_status(&self, device: &str, status: &DeviceStatus) {
        if let Some(agg) = self.0.upgrade() {
            agg.observers.for_each(|o| o.on_status_changed(device, status));
        }
    }

    fn name(&self) -> &'static str {
        "fleet_status_aggregator"
    }
}

impl FleetStatusAggregator {
    /// Create an aggregator subscribed to `registry`.
    pub fn attach(registry: &DeviceRegistry) -> Arc<Self> {
        let aggregator = Arc::new(Self {
            registry: registry.clone(),
            observers: ObserverList::new(),
            window: Mutex::new(WindowFpsCounter::new(Instant::now())),
            device_rates: DeviceRateMonitor::default(),
            slot_rates: RwLock::new(None),
            subscription: Mutex::new(None),
        });
        let handle = registry.subscribe(Arc::new(Bridge(Arc::downgrade(&aggregator))));
        *aggregator.subscription.lock() = Some(handle);
        aggregator
    }

    /// Also feed per-slot rates.
    pub fn set_slot_rates(&self, monitor: Arc<SlotRateMonitor>) {
        *self.slot_rates.write() = Some(monitor);
    }

    pub fn registry(&self) -> &DeviceRegistry {
        &self.registry
    }

    pub fn subscribe(&self, observer: Arc<dyn FleetObserver>) -> ObserverHandle {
        self.observers.register(observer)
    }

    pub fn unsubscribe(&self, handle: ObserverHandle) -> bool {
        self.observers.unregister(handle)
    }

    /// Stop listening to the registry. Idempotent.
    pub fn detach(&self) {
        if let Some(handle) = self.subscription.lock().take() {
            self.registry.unsubscribe(handle);
        }
    }

    /// Fleet-wide frames in the last one-second window. Zero once a whole
    /// window passes without frames.
    pub fn fps(&self) -> f64 {
        self.window.lock().fps(Instant::now())
    }

    pub fn device_fps(&self, device: &str) -> f64 {
        self.device_rates.fps(device, Instant::now())
    }

    pub fn device_window_fps(&self, device: &str) -> f64 {
        self.device_rates.window_fps(device, Instant::now())
    }

    pub fn snapshot(&self) -> FleetSnapshot {
        let now = Instant::now();
        let devices = self
            .registry
            .statuses()
            .into_iter()
            .map(|s| DeviceSnapshot {
                fps: self.device_rates.fps(&s.name, now),
                window_fps: self.device_rates.window_fps(&s.name, now),
                retry_in_secs: s
                    .status
                    .retry_countdown(now)
                    .map(|left| (left.as_millis() as u64).div_ceil(1000)),
                label: s.status.display_label(now),
                state: s.status.state,
                online: s.online,
                group: s.group,
                name: s.name,
            })
            .collect();
        FleetSnapshot {
            devices,
            fps: self.window.lock().fps(now),
        }
    }

    /// Alarm label for the current snapshot.
    pub fn alarm_summary(&self, alarm: Option<&AlarmLinkage>) -> String {
        let links = alarm.map(|a| a.plc_links()).unwrap_or_default();
        self.snapshot().alarm_summary(&links)
    }

    fn frame_arrived(&self, device: &str, frame: &Frame) {
        let now = Instant::now();
        self.window.lock().record(now);
        self.device_rates.record_frame(device, now);
        let slot_rates = self.slot_rates.read().clone();
        if let Some(slots) = slot_rates {
            slots.record_frame(device, now);
        }
        self.observers.for_each(|o| o.on_image_ready(device, frame));
    }
}

impl Drop for FleetStatusAggregator {
    fn drop(&mut self) {
        self.detach();
    }
}

impl std::fmt::Debug for FleetStatusAggregator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FleetStatusAggregator")
            .field("fps", &self.fps())
            .field("observers", &self.observers.len())
            .finish()
    }
}

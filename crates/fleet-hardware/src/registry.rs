//! Device registry and trigger orchestration.
//!
//! ```text
//! ┌──────────┐  DeviceEvent   ┌────────────────┐  on_frame / on_error   ┌───────────────┐
//! │ Device A │ ─────────────▶ │                │ ─────────────────────▶ │  observers    │
//! ├──────────┤                │ DeviceRegistry │  on_online_changed     │ (aggregator,  │
//! │ Device B │ ─────────────▶ │  online dedup  │  on_status             │  alarm, ...)  │
//! ├──────────┤                │                │                        └───────────────┘
//! │   ...    │                │                │  FrameDelivery         ┌───────────────┐
//! └──────────┘                └────────────────┘ ─────────────────────▶ │ primary output│
//!                                                                       └───────────────┘
//! ```
//!
//! Devices are registered once under a unique name and a fixed
//! [`TriggerGroup`]. The registry keeps one online flag per device and only
//! reports real transitions: a frame, an `Online` status and a successful
//! start all mean "online" and are collapsed into a single
//! `on_online_changed(name, true)`.
//!
//! Observers borrow each frame during their callback. The frame is then
//! moved into the primary output channel if one is set, or dropped.

use fleet_core::device::{Device, DeviceEvent, DeviceEventSink, DeviceState, DeviceStatus, TriggerGroup};
use fleet_core::error::{FleetError, FleetResult};
use fleet_core::events::{DeviceObserver, ObserverHandle, ObserverList};
use fleet_core::throttle::LogThrottle;
use fleet_core::Frame;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use tokio::sync::mpsc;

/// A frame handed to the primary output, with its source device.
#[derive(Debug, Clone)]
pub struct FrameDelivery {
    pub device: String,
    pub frame: Frame,
}

/// Point-in-time view of one registered device.
#[derive(Debug, Clone)]
pub struct DeviceSummary {
    pub name: String,
    pub group: TriggerGroup,
    pub online: bool,
    pub status: DeviceStatus,
}

struct Entry {
    device: Arc<Device>,
    group: TriggerGroup,
}

struct Inner {
    /// Registration order
    entries: RwLock<Vec<Entry>>,
    online: Mutex<HashMap<String, bool>>,
    observers: ObserverList<dyn DeviceObserver>,
    output: RwLock<Option<mpsc::Sender<FrameDelivery>>>,
    throttle: LogThrottle,
}

/// Owns the fleet's devices and fans their events out.
///
/// Cheap to clone; clones share the same registry.
#[derive(Clone)]
pub struct DeviceRegistry {
    inner: Arc<Inner>,
}

/// Non-owning registry handle for observers the registry itself holds.
#[derive(Clone)]
pub struct WeakRegistry(Weak<Inner>);

impl WeakRegistry {
    pub fn upgrade(&self) -> Option<DeviceRegistry> {
        self.0.upgrade().map(|inner| DeviceRegistry { inner })
    }
}

/// Event sink installed on each device. Holds the registry weakly so a
/// device never keeps its owner alive.
struct RegistrySink(Weak<Inner>);

impl DeviceEventSink for RegistrySink {
    fn on_device_event(&self, device: &str, event: DeviceEvent) {
        if let Some(inner) = self.0.upgrade() {
            inner.handle_event(device, event);
        }
    }
}

impl Default for DeviceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self::with_log_throttle(LogThrottle::default())
    }

    pub fn with_log_throttle(throttle: LogThrottle) -> Self {
        Self {
            inner: Arc::new(Inner {
                entries: RwLock::new(Vec::new()),
                online: Mutex::new(HashMap::new()),
                observers: ObserverList::new(),
                output: RwLock::new(None),
                throttle,
            }),
        }
    }

    pub fn downgrade(&self) -> WeakRegistry {
        WeakRegistry(Arc::downgrade(&self.inner))
    }

    // =========================================================================
    // Registration
    // =========================================================================

    /// Register `device` in `group`.
    ///
    /// # Errors
    ///
    /// `FleetError::Configuration` if the name is taken; existing
    /// registrations are left untouched.
    pub fn add(&self, device: Device, group: TriggerGroup) -> FleetResult<Arc<Device>> {
        let name = device.name().to_string();
        let device = Arc::new(device);
        {
            let mut entries = self.inner.entries.write();
            if entries.iter().any(|e| e.device.name() == name) {
                return Err(FleetError::Configuration(format!(
                    "Device name already registered: {}",
                    name
                )));
            }
            entries.push(Entry {
                device: device.clone(),
                group,
            });
        }

        device.attach_sink(Arc::new(RegistrySink(Arc::downgrade(&self.inner))));
        tracing::info!(device = %name, %group, driver = device.driver_type(), "Device registered");

        // First report is always a transition: devices start offline.
        let first = self.inner.online.lock().insert(name.clone(), false).is_none();
        if first {
            self.inner
                .observers
                .for_each(|o| o.on_online_changed(&name, false));
        }
        Ok(device)
    }

    /// Stop and dispose every device and forget all registrations.
    ///
    /// Events still in flight from disposed devices are ignored.
    pub async fn clear(&self) {
        let devices: Vec<Arc<Device>> = {
            let mut entries = self.inner.entries.write();
            entries.drain(..).map(|e| e.device).collect()
        };
        self.inner.online.lock().clear();

        for device in &devices {
            device.dispose().await;
        }
        tracing::info!(count = devices.len(), "Registry cleared");
    }

    // =========================================================================
    // Lookup
    // =========================================================================

    pub fn device(&self, name: &str) -> Option<Arc<Device>> {
        self.inner
            .entries
            .read()
            .iter()
            .find(|e| e.device.name() == name)
            .map(|e| e.device.clone())
    }

    /// Names in registration order.
    pub fn names(&self) -> Vec<String> {
        self.inner
            .entries
            .read()
            .iter()
            .map(|e| e.device.name().to_string())
            .collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.inner.contains(name)
    }

    pub fn len(&self) -> usize {
        self.inner.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn group_of(&self, name: &str) -> Option<TriggerGroup> {
        self.inner
            .entries
            .read()
            .iter()
            .find(|e| e.device.name() == name)
            .map(|e| e.group)
    }

    /// Devices of `group` in registration order.
    pub fn devices_in_group(&self, group: TriggerGroup) -> Vec<Arc<Device>> {
        self.inner
            .entries
            .read()
            .iter()
            .filter(|e| e.group == group)
            .map(|e| e.device.clone())
            .collect()
    }

    pub fn is_online(&self, name: &str) -> bool {
        self.inner.online.lock().get(name).copied().unwrap_or(false)
    }

    pub fn online_count(&self) -> usize {
        self.inner.online.lock().values().filter(|v| **v).count()
    }

    pub fn statuses(&self) -> Vec<DeviceSummary> {
        let entries: Vec<(Arc<Device>, TriggerGroup)> = self
            .inner
            .entries
            .read()
            .iter()
            .map(|e| (e.device.clone(), e.group))
            .collect();
        entries
            .into_iter()
            .map(|(device, group)| DeviceSummary {
                name: device.name().to_string(),
                group,
                online: self.is_online(device.name()),
                status: device.status(),
            })
            .collect()
    }

    // =========================================================================
    // Lifecycle and triggering
    // =========================================================================

    /// Open and start every device.
    ///
    /// A failed open is reported as an error event and an offline mark; the
    /// device is still started so its scheduled retry can reconnect it.
    pub async fn start_all(&self) {
        for device in self.all_devices() {
            let name = device.name().to_string();
            match device.open().await {
                Ok(()) => {
                    device.start();
                    self.inner.mark_online(&name, true);
                }
                Err(e) => {
                    device.start();
                    self.inner.mark_online(&name, false);
                    let message = format!("[{}] start failed: {}", name, e);
                    tracing::warn!(device = %name, "{}", message);
                    self.inner.observers.for_each(|o| o.on_error(&name, &message));
                }
            }
        }
    }

    pub fn stop_all(&self) {
        for device in self.all_devices() {
            device.stop();
        }
    }

    /// Trigger every device of `group`, one after another in registration
    /// order.
    pub async fn trigger_group(&self, group: TriggerGroup) {
        for device in self.devices_in_group(group) {
            device.software_trigger().await;
        }
    }

    /// Trigger every device concurrently.
    pub async fn trigger_all(&self) {
        let devices = self.all_devices();
        futures::future::join_all(devices.iter().map(|d| d.software_trigger())).await;
    }

    fn all_devices(&self) -> Vec<Arc<Device>> {
        self.inner
            .entries
            .read()
            .iter()
            .map(|e| e.device.clone())
            .collect()
    }

    // =========================================================================
    // Outputs
    // =========================================================================

    pub fn subscribe(&self, observer: Arc<dyn DeviceObserver>) -> ObserverHandle {
        tracing::debug!(observer = observer.name(), "Registry observer added");
        self.inner.observers.register(observer)
    }

    pub fn unsubscribe(&self, handle: ObserverHandle) -> bool {
        self.inner.observers.unregister(handle)
    }

    /// Route frames to `sender` once observers have seen them.
    ///
    /// Frames are dropped when the channel is full or closed.
    pub fn set_primary_output(&self, sender: mpsc::Sender<FrameDelivery>) {
        *self.inner.output.write() = Some(sender);
    }

    pub fn clear_primary_output(&self) {
        *self.inner.output.write() = None;
    }
}

impl std::fmt::Debug for DeviceRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceRegistry")
            .field("devices", &self.names())
            .field("observers", &self.inner.observers.len())
            .finish()
    }
}

impl Inner {
    fn contains(&self, name: &str) -> bool {
        self.entries.read().iter().any(|e| e.device.name() == name)
    }

    /// Record `online` for `name` and notify observers if it changed.
    /// Unknown names are ignored.
    fn mark_online(&self, name: &str, online: bool) {
        let changed = {
            let mut map = self.online.lock();
            match map.get_mut(name) {
                Some(current) if *current != online => {
                    *current = online;
                    true
                }
                _ => false,
            }
        };
        if changed {
            tracing::info!(device = %name, online, "Online state changed");
            self.observers.for_each(|o| o.on_online_changed(name, online));
        }
    }

    fn handle_event(&self, name: &str, event: DeviceEvent) {
        if !self.contains(name) {
            tracing::trace!(device = %name, "Event from unregistered device ignored");
            return;
        }

        match event {
            DeviceEvent::Frame(frame) => {
                self.mark_online(name, true);
                self.observers.for_each(|o| o.on_frame(name, &frame));
                self.deliver(name, frame);
            }
            DeviceEvent::Error(message) => {
                self.mark_online(name, false);
                if self.throttle.should_log(name) {
                    tracing::warn!(device = %name, "{}", message);
                }
                self.observers.for_each(|o| o.on_error(name, &message));
            }
            DeviceEvent::Status(status) => {
                match status.state {
                    DeviceState::Online => self.mark_online(name, true),
                    DeviceState::Disconnected => self.mark_online(name, false),
                    DeviceState::Connecting => {}
                }
                self.observers.for_each(|o| o.on_status(name, &status));
            }
        }
    }

    fn deliver(&self, name: &str, frame: Frame) {
        let sender = self.output.read().clone();
        let Some(sender) = sender else {
            return;
        };
        let delivery = FrameDelivery {
            device: name.to_string(),
            frame,
        };
        if let Err(e) = sender.try_send(delivery) {
            let key = format!("{}::output", name);
            if self.throttle.should_log(&key) {
                tracing::debug!(device = %name, "Primary output rejected frame: {}", e);
            }
        }
    }
}

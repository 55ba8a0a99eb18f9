//! Device state machine and the backend capability contract.
//!
//! A [`Device`] wraps one [`AcquisitionBackend`] and owns the rules every
//! backend shares: the connection state machine, reconnect backoff and
//! conversion of hardware faults into events. Backends only know how to open,
//! grab one frame and close.
//!
//! ```text
//! Disconnected ──open──▶ Connecting ──ok──▶ Online
//!      ▲                     │                 │
//!      └────────fail─────────┘◀──grab fault────┘
//! ```
//!
//! Faults never escape `software_trigger()`. They close the backend, schedule
//! the next attempt on the device's [`RetryPolicy`] and are reported through
//! the attached [`DeviceEventSink`].

use crate::data::Frame;
use crate::error::{FleetError, FleetResult};
use crate::retry::RetryPolicy;
use anyhow::Result;
use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// Error text recorded by [`Device::force_reconnect`].
pub const MANUAL_RECONNECT: &str = "manual reconnect";

/// Longest error excerpt shown in a status label.
const STATUS_ERROR_MAX_CHARS: usize = 40;

// =============================================================================
// State, Group, Status
// =============================================================================

/// Connection state of a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DeviceState {
    #[default]
    Disconnected,
    Connecting,
    Online,
}

impl std::fmt::Display for DeviceState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            DeviceState::Disconnected => "disconnected",
            DeviceState::Connecting => "connecting",
            DeviceState::Online => "online",
        };
        write!(f, "{}", label)
    }
}

/// Trigger domain a device belongs to. Fixed at registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum TriggerGroup {
    Group1,
    Group2,
}

impl TriggerGroup {
    pub const ALL: [TriggerGroup; 2] = [TriggerGroup::Group1, TriggerGroup::Group2];

    /// Slots 0..=2 trigger together, the rest form the second group.
    #[must_use]
    pub fn for_slot_index(index: usize) -> Self {
        if index < 3 {
            TriggerGroup::Group1
        } else {
            TriggerGroup::Group2
        }
    }
}

impl std::fmt::Display for TriggerGroup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TriggerGroup::Group1 => write!(f, "group1"),
            TriggerGroup::Group2 => write!(f, "group2"),
        }
    }
}

/// Snapshot of a device's connection bookkeeping.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceStatus {
    pub state: DeviceState,
    /// Last fault text, empty once the device is online again.
    pub last_error: String,
    /// Delay charged by the most recent failure (the floor after a success).
    pub retry_delay: Duration,
    /// Triggers before this instant are suppressed.
    pub next_retry_at: Option<Instant>,
}

impl DeviceStatus {
    /// Time left until the next reconnect attempt, if one is pending.
    pub fn retry_countdown(&self, now: Instant) -> Option<Duration> {
        self.next_retry_at
            .and_then(|at| at.checked_duration_since(now))
            .filter(|left| !left.is_zero())
    }

    /// Short label for status displays.
    ///
    /// `ONLINE`, `CONNECTING...` or `OFFLINE (retry 4s) | <error>`.
    pub fn display_label(&self, now: Instant) -> String {
        match self.state {
            DeviceState::Online => "ONLINE".to_string(),
            DeviceState::Connecting => "CONNECTING...".to_string(),
            DeviceState::Disconnected => {
                let mut label = String::from("OFFLINE");
                if let Some(left) = self.retry_countdown(now) {
                    let secs = (left.as_millis() + 999) / 1000;
                    label.push_str(&format!(" (retry {}s)", secs));
                }
                if !self.last_error.is_empty() {
                    label.push_str(" | ");
                    label.push_str(&truncate_chars(&self.last_error, STATUS_ERROR_MAX_CHARS));
                }
                label
            }
        }
    }
}

fn truncate_chars(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let mut out: String = text.chars().take(max).collect();
    out.push_str("...");
    out
}

// =============================================================================
// Backend Capability
// =============================================================================

/// Capability: single-frame acquisition.
///
/// Implemented by every device backend (framegrabber hardware, simulation).
/// The [`Device`] serializes all calls, so implementations may keep plain
/// mutable state.
///
/// # Contract
/// - `open()` acquires the underlying resource; calling it while open must
///   not leak the previous handle
/// - `grab()` requests exactly one frame and must not block indefinitely
/// - `close()` is best-effort and infallible; it must be safe to call twice
#[async_trait]
pub trait AcquisitionBackend: Send + Sync {
    /// Stable identifier used in logs and `DriverError`s.
    fn driver_type(&self) -> &'static str;

    async fn open(&mut self) -> Result<()>;

    fn is_open(&self) -> bool;

    async fn grab(&mut self) -> Result<Frame>;

    async fn close(&mut self);

    /// Write a tuning parameter.
    ///
    /// # Default Implementation
    /// Returns an error indicating parameters are not supported.
    async fn set_param(&mut self, name: &str, _value: &str) -> Result<()> {
        anyhow::bail!(
            "Parameter '{}' not supported by {}",
            name,
            self.driver_type()
        )
    }
}

// =============================================================================
// Device Events
// =============================================================================

/// Event raised by a device towards its owner.
#[derive(Debug)]
pub enum DeviceEvent {
    /// A frame, handed over by value.
    Frame(Frame),
    /// Acquisition fault text.
    Error(String),
    /// State or retry bookkeeping changed.
    Status(DeviceStatus),
}

/// Owner-side receiver of device events.
///
/// Called on the task that drove the device, never while the device's status
/// bookkeeping is locked. The backend may still be held during an inline open.
pub trait DeviceEventSink: Send + Sync {
    fn on_device_event(&self, device: &str, event: DeviceEvent);
}

// =============================================================================
// Device
// =============================================================================

struct Connection {
    state: DeviceState,
    last_error: String,
    retry: RetryPolicy,
    retry_delay: Duration,
    next_retry_at: Option<Instant>,
}

impl Connection {
    fn new(retry: RetryPolicy) -> Self {
        Self {
            state: DeviceState::Disconnected,
            last_error: String::new(),
            retry_delay: retry.floor(),
            retry,
            next_retry_at: None,
        }
    }

    fn snapshot(&self) -> DeviceStatus {
        DeviceStatus {
            state: self.state,
            last_error: self.last_error.clone(),
            retry_delay: self.retry_delay,
            next_retry_at: self.next_retry_at,
        }
    }

    fn reset_backoff(&mut self) {
        self.retry.reset();
        self.retry_delay = self.retry.floor();
        self.next_retry_at = None;
    }

    fn fail(&mut self, message: String) -> Duration {
        let delay = self.retry.next_delay();
        self.state = DeviceState::Disconnected;
        self.last_error = message;
        self.retry_delay = delay;
        self.next_retry_at = Some(Instant::now() + delay);
        delay
    }
}

/// A named acquisition unit.
///
/// # Example
///
/// ```rust,ignore
/// let device = Arc::new(Device::new("Cam1", Box::new(SimulatedCamera::builder().build())));
/// device.open().await?;
/// device.start();
/// device.software_trigger().await; // frame or fault goes to the sink
/// ```
pub struct Device {
    name: String,
    driver_type: &'static str,
    backend: tokio::sync::Mutex<Box<dyn AcquisitionBackend>>,
    conn: Mutex<Connection>,
    running: AtomicBool,
    sink: RwLock<Option<Arc<dyn DeviceEventSink>>>,
}

impl Device {
    /// Create a device with the default backoff (1s floor, 30s ceiling).
    pub fn new(name: impl Into<String>, backend: Box<dyn AcquisitionBackend>) -> Self {
        Self::with_retry_policy(name, backend, RetryPolicy::default())
    }

    pub fn with_retry_policy(
        name: impl Into<String>,
        backend: Box<dyn AcquisitionBackend>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            name: name.into(),
            driver_type: backend.driver_type(),
            backend: tokio::sync::Mutex::new(backend),
            conn: Mutex::new(Connection::new(retry)),
            running: AtomicBool::new(false),
            sink: RwLock::new(None),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn driver_type(&self) -> &'static str {
        self.driver_type
    }

    pub fn state(&self) -> DeviceState {
        self.conn.lock().state
    }

    pub fn status(&self) -> DeviceStatus {
        self.conn.lock().snapshot()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Route this device's events to `sink`, replacing any previous owner.
    pub fn attach_sink(&self, sink: Arc<dyn DeviceEventSink>) {
        *self.sink.write() = Some(sink);
    }

    pub fn detach_sink(&self) {
        *self.sink.write() = None;
    }

    // -------------------------------------------------------------------------
    // Lifecycle
    // -------------------------------------------------------------------------

    /// Acquire the backend resource.
    ///
    /// Emits `Connecting`, then `Online` on success (backoff reset) or
    /// `Disconnected` with a scheduled retry on failure. The failure is
    /// returned to the caller and is not raised as an error event.
    pub async fn open(&self) -> FleetResult<()> {
        let mut backend = self.backend.lock().await;
        self.open_locked(&mut **backend).await
    }

    async fn open_locked(&self, backend: &mut dyn AcquisitionBackend) -> FleetResult<()> {
        self.update(|conn| conn.state = DeviceState::Connecting);

        backend.close().await;
        match backend.open().await {
            Ok(()) => {
                self.update(|conn| {
                    conn.reset_backoff();
                    conn.state = DeviceState::Online;
                    conn.last_error.clear();
                });
                tracing::info!(device = %self.name, driver = self.driver_type, "Device online");
                Ok(())
            }
            Err(e) => {
                let message = format!("open failed: {:#}", e);
                let mut delay = Duration::ZERO;
                self.update(|conn| delay = conn.fail(message.clone()));
                tracing::warn!(
                    device = %self.name,
                    retry_ms = delay.as_millis() as u64,
                    "Open failed: {:#}",
                    e
                );
                Err(FleetError::Acquisition {
                    device: self.name.clone(),
                    message,
                })
            }
        }
    }

    /// Allow triggers. Does not open the backend.
    pub fn start(&self) {
        self.running.store(true, Ordering::SeqCst);
    }

    /// Refuse new triggers. A trigger already in flight completes.
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    /// Request one frame.
    ///
    /// No-op while stopped or before the scheduled retry time. Opens the
    /// backend inline if it is closed. Every fault is converted into
    /// `Disconnected` + scheduled retry + error event; nothing propagates.
    pub async fn software_trigger(&self) {
        if !self.is_running() {
            return;
        }

        let mut backend = self.backend.lock().await;

        let next_retry_at = self.conn.lock().next_retry_at;
        if let Some(at) = next_retry_at {
            if Instant::now() < at {
                tracing::trace!(device = %self.name, "Trigger suppressed until retry time");
                return;
            }
        }

        if !backend.is_open() {
            if let Err(e) = self.open_locked(&mut **backend).await {
                drop(backend);
                self.emit(DeviceEvent::Error(e.to_string()));
                return;
            }
        }

        match backend.grab().await {
            Ok(frame) => {
                drop(backend);
                self.emit(DeviceEvent::Frame(frame));
            }
            Err(e) => {
                backend.close().await;
                let message = format!("[{}] grab failed: {:#}", self.name, e);
                let mut delay = Duration::ZERO;
                // recorded before the backend is released so a concurrent
                // trigger sees the retry time
                self.update(|conn| delay = conn.fail(message.clone()));
                drop(backend);
                tracing::debug!(
                    device = %self.name,
                    retry_ms = delay.as_millis() as u64,
                    "Grab fault, reconnect scheduled"
                );
                self.emit(DeviceEvent::Error(message));
            }
        }
    }

    /// Drop the connection and clear backoff so the next trigger reconnects
    /// immediately.
    pub async fn force_reconnect(&self) {
        let mut backend = self.backend.lock().await;
        backend.close().await;
        drop(backend);
        self.update(|conn| {
            conn.reset_backoff();
            conn.state = DeviceState::Disconnected;
            conn.last_error = MANUAL_RECONNECT.to_string();
        });
        tracing::info!(device = %self.name, "Manual reconnect requested");
    }

    /// Write a tuning parameter through to the backend.
    ///
    /// Failures are returned as-is and do not change connection state.
    pub async fn set_param(&self, name: &str, value: &str) -> Result<()> {
        self.backend.lock().await.set_param(name, value).await
    }

    /// Stop, detach from the owner and release the backend. Idempotent.
    pub async fn dispose(&self) {
        self.stop();
        self.detach_sink();
        self.backend.lock().await.close().await;
    }

    // -------------------------------------------------------------------------
    // Internals
    // -------------------------------------------------------------------------

    /// Mutate connection bookkeeping, then publish the new status with the
    /// lock released.
    fn update(&self, f: impl FnOnce(&mut Connection)) {
        let status = {
            let mut conn = self.conn.lock();
            f(&mut conn);
            conn.snapshot()
        };
        self.emit(DeviceEvent::Status(status));
    }

    fn emit(&self, event: DeviceEvent) {
        let sink = self.sink.read().clone();
        if let Some(sink) = sink {
            sink.on_device_event(&self.name, event);
        }
    }
}

impl std::fmt::Debug for Device {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Device")
            .field("name", &self.name)
            .field("driver_type", &self.driver_type)
            .field("state", &self.state())
            .field("running", &self.is_running())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    /// Backend driven by a script of open/grab outcomes.
    #[derive(Default)]
    struct ScriptedBackend {
        open: bool,
        opens: Arc<Mutex<VecDeque<bool>>>,
        grabs: Arc<Mutex<VecDeque<bool>>>,
        closes: Arc<Mutex<u32>>,
    }

    #[async_trait]
    impl AcquisitionBackend for ScriptedBackend {
        fn driver_type(&self) -> &'static str {
            "scripted"
        }

        async fn open(&mut self) -> Result<()> {
            if self.opens.lock().pop_front().unwrap_or(true) {
                self.open = true;
                Ok(())
            } else {
                anyhow::bail!("no such device")
            }
        }

        fn is_open(&self) -> bool {
            self.open
        }

        async fn grab(&mut self) -> Result<Frame> {
            if self.grabs.lock().pop_front().unwrap_or(true) {
                Ok(Frame::from_u8(1, 1, vec![7]))
            } else {
                anyhow::bail!("cable pulled")
            }
        }

        async fn close(&mut self) {
            self.open = false;
            *self.closes.lock() += 1;
        }
    }

    #[derive(Default)]
    struct EventLog {
        events: Mutex<Vec<String>>,
        statuses: Mutex<Vec<DeviceState>>,
    }

    impl DeviceEventSink for EventLog {
        fn on_device_event(&self, _device: &str, event: DeviceEvent) {
            match event {
                DeviceEvent::Frame(_) => self.events.lock().push("frame".into()),
                DeviceEvent::Error(msg) => self.events.lock().push(format!("error:{}", msg)),
                DeviceEvent::Status(status) => self.statuses.lock().push(status.state),
            }
        }
    }

    fn scripted(opens: &[bool], grabs: &[bool]) -> ScriptedBackend {
        ScriptedBackend {
            opens: Arc::new(Mutex::new(opens.iter().copied().collect())),
            grabs: Arc::new(Mutex::new(grabs.iter().copied().collect())),
            ..Default::default()
        }
    }

    fn device_with_log(backend: ScriptedBackend) -> (Device, Arc<EventLog>) {
        let device = Device::new("Cam1", Box::new(backend));
        let log = Arc::new(EventLog::default());
        device.attach_sink(log.clone());
        (device, log)
    }

    #[tokio::test(start_paused = true)]
    async fn test_open_success_goes_online() {
        let (device, log) = device_with_log(scripted(&[true], &[]));
        device.open().await.unwrap();

        assert_eq!(device.state(), DeviceState::Online);
        assert_eq!(
            log.statuses.lock().as_slice(),
            &[DeviceState::Connecting, DeviceState::Online]
        );
        assert!(device.status().next_retry_at.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_consecutive_open_failures_back_off() {
        let (device, log) = device_with_log(scripted(&[false; 6], &[]));

        let mut delays = Vec::new();
        for _ in 0..6 {
            let err = device.open().await.unwrap_err();
            assert!(matches!(err, FleetError::Acquisition { .. }));
            delays.push(device.status().retry_delay.as_millis());
        }

        assert_eq!(delays, vec![1000, 2000, 4000, 8000, 16000, 30000]);
        assert_eq!(device.state(), DeviceState::Disconnected);
        // open() failures surface to the caller only
        assert!(log.events.lock().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_open_success_resets_backoff() {
        let (device, _log) = device_with_log(scripted(&[false, false, true], &[]));
        let _ = device.open().await;
        let _ = device.open().await;
        assert_eq!(device.status().retry_delay, Duration::from_millis(2000));

        device.open().await.unwrap();
        let status = device.status();
        assert_eq!(status.retry_delay, Duration::from_millis(1000));
        assert!(status.next_retry_at.is_none());
        assert!(status.last_error.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_trigger_ignored_when_stopped() {
        let (device, log) = device_with_log(scripted(&[], &[]));
        device.software_trigger().await;
        assert!(log.events.lock().is_empty());
        assert_eq!(device.state(), DeviceState::Disconnected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_trigger_opens_inline_and_delivers_frame() {
        let (device, log) = device_with_log(scripted(&[true], &[true]));
        device.start();
        device.software_trigger().await;

        assert_eq!(device.state(), DeviceState::Online);
        assert_eq!(log.events.lock().as_slice(), &["frame".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_grab_fault_disconnects_and_schedules_retry() {
        let backend = scripted(&[true, true], &[false, true]);
        let closes = backend.closes.clone();
        let (device, log) = device_with_log(backend);
        device.open().await.unwrap();
        device.start();
        let closes_after_open = *closes.lock();

        device.software_trigger().await;
        let status = device.status();
        assert_eq!(status.state, DeviceState::Disconnected);
        assert!(status.last_error.contains("cable pulled"));
        assert!(status.next_retry_at.is_some());
        assert_eq!(*closes.lock(), closes_after_open + 1);
        assert_eq!(log.events.lock().len(), 1);
        assert!(log.events.lock()[0].starts_with("error:"));

        // Suppressed until the retry time passes
        device.software_trigger().await;
        assert_eq!(log.events.lock().len(), 1);

        tokio::time::advance(Duration::from_millis(1001)).await;
        device.software_trigger().await;
        assert_eq!(device.state(), DeviceState::Online);
        assert_eq!(log.events.lock().last().map(String::as_str), Some("frame"));
    }

    /// Records whether the backend was still locked when `Disconnected` was
    /// published.
    struct BackendLockWatch {
        device: std::sync::Weak<Device>,
        locked_on_disconnect: Mutex<Vec<bool>>,
    }

    impl DeviceEventSink for BackendLockWatch {
        fn on_device_event(&self, _device: &str, event: DeviceEvent) {
            if let DeviceEvent::Status(status) = event {
                if status.state == DeviceState::Disconnected {
                    if let Some(device) = self.device.upgrade() {
                        let locked = device.backend.try_lock().is_err();
                        self.locked_on_disconnect.lock().push(locked);
                    }
                }
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_grab_fault_recorded_before_backend_released() {
        let device = Arc::new(Device::new("Cam1", Box::new(scripted(&[true], &[false]))));
        let sink = Arc::new(BackendLockWatch {
            device: Arc::downgrade(&device),
            locked_on_disconnect: Mutex::new(Vec::new()),
        });
        device.attach_sink(sink.clone());
        device.open().await.unwrap();
        device.start();

        device.software_trigger().await;
        assert_eq!(device.state(), DeviceState::Disconnected);
        assert_eq!(sink.locked_on_disconnect.lock().as_slice(), &[true]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_inline_open_failure_emits_error() {
        let (device, log) = device_with_log(scripted(&[false], &[]));
        device.start();
        device.software_trigger().await;

        assert_eq!(device.state(), DeviceState::Disconnected);
        let events = log.events.lock();
        assert_eq!(events.len(), 1);
        assert!(events[0].contains("open failed"));
        assert_eq!(device.status().retry_delay, Duration::from_millis(1000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_force_reconnect_clears_backoff() {
        let (device, _log) = device_with_log(scripted(&[false, false], &[]));
        let _ = device.open().await;
        let _ = device.open().await;

        device.force_reconnect().await;
        let status = device.status();
        assert_eq!(status.state, DeviceState::Disconnected);
        assert_eq!(status.last_error, MANUAL_RECONNECT);
        assert_eq!(status.retry_delay, Duration::from_millis(1000));
        assert!(status.next_retry_at.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_dispose_detaches_and_stops() {
        let (device, log) = device_with_log(scripted(&[true], &[true]));
        device.start();
        device.dispose().await;
        device.dispose().await;
        assert!(!device.is_running());

        device.start();
        device.software_trigger().await;
        assert!(log.events.lock().is_empty());
    }

    #[tokio::test]
    async fn test_set_param_default_is_unsupported() {
        let device = Device::new("Cam1", Box::new(scripted(&[], &[])));
        let err = device.set_param("gain", "2").await.unwrap_err();
        assert!(err.to_string().contains("not supported"));
    }

    #[test]
    fn test_display_labels() {
        let now = Instant::now();
        let mut status = DeviceStatus {
            state: DeviceState::Online,
            last_error: String::new(),
            retry_delay: Duration::from_secs(1),
            next_retry_at: None,
        };
        assert_eq!(status.display_label(now), "ONLINE");

        status.state = DeviceState::Connecting;
        assert_eq!(status.display_label(now), "CONNECTING...");

        status.state = DeviceState::Disconnected;
        status.next_retry_at = Some(now + Duration::from_millis(3500));
        status.last_error = "x".repeat(50);
        let label = status.display_label(now);
        assert!(label.starts_with("OFFLINE (retry 4s) | "));
        assert!(label.ends_with("..."));
    }

    #[test]
    fn test_group_for_slot_index() {
        assert_eq!(TriggerGroup::for_slot_index(0), TriggerGroup::Group1);
        assert_eq!(TriggerGroup::for_slot_index(2), TriggerGroup::Group1);
        assert_eq!(TriggerGroup::for_slot_index(3), TriggerGroup::Group2);
        assert_eq!(TriggerGroup::for_slot_index(5), TriggerGroup::Group2);
    }
}

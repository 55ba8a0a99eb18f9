//! Observer plumbing for device events.
//!
//! Observers are synchronous: each callback runs on the task that produced the
//! event and must return quickly. Delivery to one observer follows the order
//! of the source events. Order across observers is unspecified.

use crate::data::Frame;
use crate::device::DeviceStatus;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

// =============================================================================
// Observer Handle
// =============================================================================

/// Handle returned when registering an observer, used for unregistration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverHandle(pub u64);

impl ObserverHandle {
    #[must_use]
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Get the internal ID (for debugging/logging).
    #[must_use]
    pub fn id(&self) -> u64 {
        self.0
    }
}

// =============================================================================
// Device Observer
// =============================================================================

/// Receives the events a device registry raises.
///
/// # Contract
///
/// - Callbacks MUST NOT block; push work to a channel if it is slow
/// - The frame reference is only valid for the duration of `on_frame()`. Copy
///   what you need; the registry moves the frame on afterwards
/// - `on_online_changed()` fires once per actual transition, never for a
///   repeated report of the same state
///
/// All methods default to no-ops so observers implement only what they need.
pub trait DeviceObserver: Send + Sync {
    /// A device delivered a frame.
    fn on_frame(&self, device: &str, frame: &Frame) {
        let _ = (device, frame);
    }

    /// A device reported an acquisition fault.
    fn on_error(&self, device: &str, message: &str) {
        let _ = (device, message);
    }

    /// A device went online or offline.
    fn on_online_changed(&self, device: &str, online: bool) {
        let _ = (device, online);
    }

    /// A device changed state or scheduled a retry.
    fn on_status(&self, device: &str, status: &DeviceStatus) {
        let _ = (device, status);
    }

    /// Optional: a descriptive name for logging.
    fn name(&self) -> &'static str {
        "unnamed_observer"
    }
}

// =============================================================================
// Observer List
// =============================================================================

/// Registry of observers keyed by handle.
///
/// Dispatch iterates over a snapshot taken under a short read lock, so an
/// observer may unregister itself (or others) from inside a callback without
/// deadlocking.
pub struct ObserverList<T: ?Sized> {
    next_id: AtomicU64,
    entries: RwLock<Vec<(u64, Arc<T>)>>,
}

impl<T: ?Sized + Send + Sync> ObserverList<T> {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            entries: RwLock::new(Vec::new()),
        }
    }

    /// Add an observer; it receives events raised after this call returns.
    pub fn register(&self, observer: Arc<T>) -> ObserverHandle {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.entries.write().push((id, observer));
        ObserverHandle::new(id)
    }

    /// Remove an observer. Returns `false` if the handle is unknown.
    pub fn unregister(&self, handle: ObserverHandle) -> bool {
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|(id, _)| *id != handle.id());
        entries.len() != before
    }

    /// Observers in registration order.
    pub fn snapshot(&self) -> Vec<Arc<T>> {
        self.entries
            .read()
            .iter()
            .map(|(_, observer)| Arc::clone(observer))
            .collect()
    }

    /// Invoke `f` on every observer, outside the registry lock.
    pub fn for_each(&self, mut f: impl FnMut(&T)) {
        for observer in self.snapshot() {
            f(&observer);
        }
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    pub fn clear(&self) {
        self.entries.write().clear();
    }
}

impl<T: ?Sized + Send + Sync> Default for ObserverList<T> {
    fn default() -> Self {
        Self::new()
    }
}

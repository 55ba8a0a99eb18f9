//! Core types and traits for camfleet.
//!
//! This crate holds everything a single acquisition unit needs, independent of
//! how devices are grouped or displayed:
//!
//! - [`data::Frame`]: one captured image
//! - [`error`]: `DriverError` for backend faults and `FleetError` for everything else
//! - [`retry::RetryPolicy`]: exponential reconnect backoff
//! - [`device`]: the `Device` state machine and the `AcquisitionBackend` capability trait
//! - [`events`]: observer plumbing used to fan device events out to consumers
//! - [`throttle::LogThrottle`]: per-key rate limiting for noisy log lines

pub mod data;
pub mod device;
pub mod error;
pub mod events;
pub mod retry;
pub mod throttle;

pub use data::Frame;
pub use device::{
    AcquisitionBackend, Device, DeviceEvent, DeviceEventSink, DeviceState, DeviceStatus,
    TriggerGroup,
};
pub use error::{DriverError, DriverErrorKind, FleetError, FleetResult};
pub use events::{DeviceObserver, ObserverHandle, ObserverList};
pub use retry::RetryPolicy;
pub use throttle::LogThrottle;

//! Framegrabber-backed camera backend for camfleet.
//!
//! The vision SDK is abstracted behind [`FramegrabberSdk`], a blocking,
//! handle-based interface. [`FramegrabberCamera`] adapts it to the async
//! [`AcquisitionBackend`](fleet_core::AcquisitionBackend) contract, running
//! every SDK call on tokio's blocking pool.
//!
//! Opening a camera is forgiving about how the device is named: the
//! configured identifier is expanded into several candidate spellings
//! (see [`naming::device_candidates`]) and each is tried in turn. Persisted
//! tuning parameters are applied best-effort after a successful open.

pub mod camera;
pub mod naming;
pub mod sdk;

pub use camera::{FramegrabberCamera, DEFAULT_GRAB_TIMEOUT};
pub use naming::{device_candidates, param_name_candidates, port_for};
pub use sdk::{FramegrabberSdk, ParamValue, PortSpec, SdkHandle};

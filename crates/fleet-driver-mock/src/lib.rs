//! Simulated camera backend for camfleet.
//!
//! Provides [`SimulatedCamera`], an [`AcquisitionBackend`](fleet_core::AcquisitionBackend)
//! that needs no hardware. It drops its link at a configurable rate, heals
//! after a recovery window and produces frames whose brightness follows the
//! exposure and gain parameters. Useful for exercising reconnect backoff,
//! alarm linkage and FPS display end to end.
//!
//! # Fault Model
//!
//! - Random: each grab fails with probability `fault_rate` (default 5%); the
//!   link then stays down for `recovery` (default 1.5 s)
//! - Forced: a shared [`FaultSwitch`] holds the camera offline until cleared
//! - Scripted: an [`ErrorConfig`] injects categorized driver errors
//!
//! ```rust,ignore
//! use fleet_driver_mock::{SimulatedCamera, MockMode};
//!
//! let camera = SimulatedCamera::builder()
//!     .mode(MockMode::Realistic)
//!     .fault_rate(0.05)
//!     .build();
//! ```

pub mod common;
mod pattern;
mod simulated_camera;

pub use common::{ErrorConfig, ErrorScenario, MockMode, MockRng, Operation, TimingConfig};
pub use pattern::{block_intensity, moving_block};
pub use simulated_camera::{
    CameraParams, FaultSwitch, SimulatedCamera, SimulatedCameraBuilder, DEFAULT_FAULT_RATE,
    DEFAULT_HEIGHT, DEFAULT_RECOVERY, DEFAULT_WIDTH, SUPPORTED_PARAMS,
};

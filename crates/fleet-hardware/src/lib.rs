//! Camera fleet management for camfleet.
//!
//! # Architecture
//!
//! - [`registry::DeviceRegistry`]: owns the devices, trigger groups, online
//!   dedup and event fan-out
//! - [`view_mapping::ViewMappingResolver`]: six display slots, one device each
//! - [`aggregator::FleetStatusAggregator`]: frame rates, fleet snapshot and
//!   simplified events
//! - [`fps`]: window and EMA frame rate estimators
//! - [`alarm::AlarmLinkage`]: per-group offline alarm registers
//! - [`fleet`]: building the fleet from settings and the auto trigger cycle
//! - [`self_check`]: startup diagnostics

pub mod aggregator;
pub mod alarm;
pub mod fleet;
pub mod fps;
pub mod registry;
pub mod self_check;
pub mod view_mapping;

pub use aggregator::{DeviceSnapshot, FleetObserver, FleetSnapshot, FleetStatusAggregator};
pub use alarm::{AlarmActuator, AlarmChannel, AlarmLinkage};
pub use fleet::{
    cycle_interval, run_trigger_cycle, Fleet, FleetBuilder, SimulationOptions, DEFAULT_CYCLE,
    MIN_CYCLE,
};
pub use fps::{EmaFpsMeter, SlotRateMonitor, WindowFpsCounter};
pub use registry::{DeviceRegistry, DeviceSummary, FrameDelivery, WeakRegistry};
pub use self_check::{run_self_check, SelfCheckInput, SelfCheckItem};
pub use view_mapping::{ViewMappingResolver, ViewSlot};

//! Settings persistence for camfleet.
//!
//! - [`atomic`]: crash-safe file replacement
//! - [`mode::RunMode`]: simulation vs production; production refuses writes
//! - [`settings`]: camera, PLC and view-mapping documents and their repairs
//! - [`store::ConfigStore`]: loads and saves the documents in one directory

pub mod atomic;
pub mod mode;
pub mod settings;
pub mod store;

pub use mode::RunMode;
pub use settings::{
    CameraConfig, CameraSettings, InterfaceKind, PlcEndpoint, PlcSettings, ViewMappingSettings,
    SLOT_COUNT,
};
pub use store::ConfigStore;

//! Error types for camfleet.
//!
//! Two layers:
//!
//! - **`DriverError`**: a categorized fault raised by an acquisition backend
//!   (open, grab, parameter write). Backends return these wrapped in
//!   `anyhow::Error`; the device state machine turns them into state
//!   transitions and events.
//! - **`FleetError`**: the error type of every fleet-level API. Only
//!   `Configuration` stops the calling path; acquisition faults degrade to an
//!   observable status change and are surfaced as values only from a direct
//!   `Device::open()`.

use thiserror::Error;

// =============================================================================
// Driver Errors
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverErrorKind {
    Initialization,
    Configuration,
    Communication,
    Hardware,
    Timeout,
    InvalidParameter,
    Unknown,
}

impl std::fmt::Display for DriverErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            DriverErrorKind::Initialization => "initialization",
            DriverErrorKind::Configuration => "configuration",
            DriverErrorKind::Communication => "communication",
            DriverErrorKind::Hardware => "hardware",
            DriverErrorKind::Timeout => "timeout",
            DriverErrorKind::InvalidParameter => "invalid_parameter",
            DriverErrorKind::Unknown => "unknown",
        };
        write!(f, "{}", label)
    }
}

#[derive(Error, Debug, Clone)]
#[error("Driver '{driver_type}' {kind} error: {message}")]
pub struct DriverError {
    pub driver_type: String,
    pub kind: DriverErrorKind,
    pub message: String,
}

impl DriverError {
    pub fn new(
        driver_type: impl Into<String>,
        kind: DriverErrorKind,
        message: impl Into<String>,
    ) -> Self {
        Self {
            driver_type: driver_type.into(),
            kind,
            message: message.into(),
        }
    }
}

// =============================================================================
// Fleet Errors
// =============================================================================

/// Convenience alias for results using the fleet error type.
pub type FleetResult<T> = std::result::Result<T, FleetError>;

/// Primary error type for fleet operations.
///
/// # Error Categories
///
/// 1. **Configuration** - duplicate device names, invalid settings, missing SDK
///    in production mode. Fatal for the call that raised it.
/// 2. **Acquisition** - open or grab failures. Recovered automatically by the
///    device state machine; only a direct `open()` returns it.
/// 3. **Persistence** - `ProductionLocked`, `Io`, `Serialization`. Raised by the
///    settings store.
#[derive(Error, Debug)]
pub enum FleetError {
    /// Semantic configuration error (duplicate name, invalid value).
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Acquisition failure on a named device.
    #[error("[{device}] {message}")]
    Acquisition { device: String, message: String },

    /// Structured backend error with category.
    #[error("{0}")]
    Driver(#[from] DriverError),

    /// Settings writes are refused while running in production mode.
    #[error("Settings are locked in production mode")]
    ProductionLocked,

    /// View slot outside `1..=6`.
    #[error("Invalid view slot {0}: expected 1..=6")]
    InvalidSlot(u8),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl FleetError {
    /// Whether this error is recovered by the reconnect loop rather than
    /// requiring operator action.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, FleetError::Acquisition { .. } | FleetError::Driver(_))
    }
}

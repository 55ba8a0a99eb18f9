//! Vision SDK collaborator interface.

use anyhow::Result;
use fleet_core::data::Frame;
use std::fmt;
use std::time::Duration;

/// Opaque acquisition handle issued by [`FramegrabberSdk::open`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SdkHandle(pub u64);

/// Port argument for [`FramegrabberSdk::open`].
///
/// Some interfaces want a number, others reject `0` and expect the literal
/// `default`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortSpec {
    Number(i32),
    Default,
}

impl fmt::Display for PortSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PortSpec::Number(n) => write!(f, "{}", n),
            PortSpec::Default => f.write_str("default"),
        }
    }
}

/// Typed parameter value for [`FramegrabberSdk::set_param`].
#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    Int(i64),
    Float(f64),
    Text(String),
}

impl ParamValue {
    /// Interpret a persisted string: integer, then float, otherwise text.
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        if let Ok(i) = trimmed.parse::<i64>() {
            ParamValue::Int(i)
        } else if let Ok(f) = trimmed.parse::<f64>() {
            ParamValue::Float(f)
        } else {
            ParamValue::Text(raw.to_string())
        }
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Int(i) => write!(f, "{}", i),
            ParamValue::Float(x) => write!(f, "{}", x),
            ParamValue::Text(s) => f.write_str(s),
        }
    }
}

/// Blocking, handle-based access to a vendor framegrabber SDK.
///
/// Implementations wrap the vendor library; every method may block and is
/// only ever called from tokio's blocking pool.
pub trait FramegrabberSdk: Send + Sync + 'static {
    /// Whether the SDK has a loadable interface module with this name.
    fn interface_available(&self, interface: &str) -> bool;

    /// First available interface among `candidates`.
    fn resolve_interface(&self, candidates: &[&str]) -> Option<String> {
        candidates
            .iter()
            .find(|name| self.interface_available(name))
            .map(|name| name.to_string())
    }

    /// Device identifiers the interface currently sees.
    fn enumerate_devices(&self, interface: &str) -> Result<Vec<String>>;

    fn open(&self, interface: &str, device: &str, port: PortSpec) -> Result<SdkHandle>;

    /// Acquire exactly one frame, failing after `timeout`.
    fn grab(&self, handle: SdkHandle, timeout: Duration) -> Result<Frame>;

    fn set_param(&self, handle: SdkHandle, name: &str, value: &ParamValue) -> Result<()>;

    /// Release the handle. Never fails; errors are the SDK's to swallow.
    fn close(&self, handle: SdkHandle);
}

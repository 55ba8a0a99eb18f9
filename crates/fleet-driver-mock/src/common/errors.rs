//! Scripted fault injection for simulated cameras.
//!
//! Sits on top of the camera's own disconnect model and produces
//! `DriverError`s with the categories a real framegrabber would report.

use super::rng::MockRng;
use fleet_core::error::{DriverError, DriverErrorKind};
use parking_lot::Mutex;
use std::sync::Arc;

/// Backend call an injected fault can target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Open,
    Grab,
    SetParam,
}

impl Operation {
    fn index(self) -> usize {
        match self {
            Operation::Open => 0,
            Operation::Grab => 1,
            Operation::SetParam => 2,
        }
    }
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Operation::Open => write!(f, "open"),
            Operation::Grab => write!(f, "grab"),
            Operation::SetParam => write!(f, "set_param"),
        }
    }
}

#[derive(Debug, Clone)]
pub enum ErrorScenario {
    /// `operation` succeeds `successes` times, then always fails
    FailAfter {
        operation: Operation,
        successes: u32,
    },
    /// `operation` always times out
    Timeout { operation: Operation },
    /// Link drops on the first call and stays down until `reset()`
    LinkLoss,
    /// Latching device fault with a vendor code
    DeviceFault { code: u32 },
}

#[derive(Debug, Default)]
struct Latch {
    calls: [u32; 3],
    link_lost: bool,
    fault_code: Option<u32>,
}

/// Fault injection settings. Clones share counters and latches.
#[derive(Clone, Debug)]
pub struct ErrorConfig {
    /// Random failure probability per operation
    rates: [f64; 3],
    scenarios: Arc<Vec<ErrorScenario>>,
    rng: Arc<MockRng>,
    latch: Arc<Mutex<Latch>>,
}

impl ErrorConfig {
    /// Nothing injected.
    pub fn none() -> Self {
        Self::scenarios(Vec::new())
    }

    /// Every operation fails with probability `rate`.
    pub fn random(rate: f64, seed: Option<u64>) -> Self {
        let mut config = Self::none();
        config.rates = [rate; 3];
        config.rng = Arc::new(MockRng::new(seed));
        config
    }

    pub fn scenario(scenario: ErrorScenario) -> Self {
        Self::scenarios(vec![scenario])
    }

    pub fn scenarios(scenarios: Vec<ErrorScenario>) -> Self {
        Self {
            rates: [0.0; 3],
            scenarios: Arc::new(scenarios),
            rng: Arc::new(MockRng::new(None)),
            latch: Arc::new(Mutex::new(Latch::default())),
        }
    }

    /// Override the random failure rate of one operation.
    pub fn with_rate(mut self, operation: Operation, rate: f64) -> Self {
        self.rates[operation.index()] = rate;
        self
    }

    /// Fail `operation` if a latch, scenario or the random rate says so.
    pub fn check(&self, driver_type: &str, operation: Operation) -> Result<(), DriverError> {
        let fail = |kind, message: String| Err(DriverError::new(driver_type, kind, message));
        let mut latch = self.latch.lock();

        if latch.link_lost {
            return fail(DriverErrorKind::Communication, "link lost".to_string());
        }
        if let Some(code) = latch.fault_code {
            return fail(DriverErrorKind::Hardware, format!("device fault 0x{:04X}", code));
        }

        let calls = &mut latch.calls[operation.index()];
        *calls += 1;
        let call = *calls;

        for scenario in self.scenarios.iter() {
            match *scenario {
                ErrorScenario::FailAfter {
                    operation: target,
                    successes,
                } if target == operation && call > successes => {
                    return fail(
                        DriverErrorKind::Hardware,
                        format!("{} failed after {} successes", operation, successes),
                    );
                }
                ErrorScenario::Timeout { operation: target } if target == operation => {
                    return fail(DriverErrorKind::Timeout, format!("{} timed out", operation));
                }
                ErrorScenario::LinkLoss => {
                    latch.link_lost = true;
                    return fail(DriverErrorKind::Communication, "link lost".to_string());
                }
                ErrorScenario::DeviceFault { code } => {
                    latch.fault_code = Some(code);
                    return fail(DriverErrorKind::Hardware, format!("device fault 0x{:04X}", code));
                }
                _ => {}
            }
        }

        if self.rng.should_fail(self.rates[operation.index()]) {
            return fail(
                DriverErrorKind::Hardware,
                format!("injected random {} failure", operation),
            );
        }
        Ok(())
    }

    /// Clear call counters and latched faults.
    pub fn reset(&self) {
        *self.latch.lock() = Latch::default();
    }
}

impl Default for ErrorConfig {
    fn default() -> Self {
        Self::none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DRIVER: &str = "simulated_camera";

    #[test]
    fn test_none_never_fails() {
        let config = ErrorConfig::none();
        assert!((0..100).all(|_| config.check(DRIVER, Operation::Grab).is_ok()));
    }

    #[test]
    fn test_random_rate_is_seeded() {
        let count = |seed| {
            let config = ErrorConfig::random(0.5, Some(seed));
            (0..1000)
                .filter(|_| config.check(DRIVER, Operation::Grab).is_err())
                .count()
        };
        let failures = count(42);
        assert_eq!(failures, count(42));
        assert!(failures > 400 && failures < 600, "got {} failures", failures);
    }

    #[test]
    fn test_fail_after_successes() {
        let config = ErrorConfig::scenario(ErrorScenario::FailAfter {
            operation: Operation::Grab,
            successes: 3,
        });
        for _ in 0..3 {
            assert!(config.check(DRIVER, Operation::Grab).is_ok());
        }
        assert!(config.check(DRIVER, Operation::Grab).is_err());
        assert!(config.check(DRIVER, Operation::Open).is_ok());

        config.reset();
        assert!(config.check(DRIVER, Operation::Grab).is_ok());
    }

    #[test]
    fn test_timeout_targets_one_operation() {
        let config = ErrorConfig::scenario(ErrorScenario::Timeout {
            operation: Operation::Open,
        });
        let err = config.check(DRIVER, Operation::Open).unwrap_err();
        assert_eq!(err.kind, DriverErrorKind::Timeout);
        assert!(config.check(DRIVER, Operation::Grab).is_ok());
    }

    #[test]
    fn test_link_loss_latches() {
        let config = ErrorConfig::scenario(ErrorScenario::LinkLoss);
        let err = config.check(DRIVER, Operation::Grab).unwrap_err();
        assert_eq!(err.kind, DriverErrorKind::Communication);
        // latched for every operation, including through a clone
        assert!(config.clone().check(DRIVER, Operation::SetParam).is_err());
    }

    #[test]
    fn test_device_fault_code_in_message() {
        let config = ErrorConfig::scenario(ErrorScenario::DeviceFault { code: 0x42 });
        let err = config.check(DRIVER, Operation::Grab).unwrap_err();
        assert_eq!(err.kind, DriverErrorKind::Hardware);
        assert!(err.message.contains("0x0042"));
    }

    #[test]
    fn test_per_operation_rate() {
        let config = ErrorConfig::none().with_rate(Operation::Open, 1.0);
        assert!(config.check(DRIVER, Operation::Open).is_err());
        assert!(config.check(DRIVER, Operation::Grab).is_ok());
    }
}

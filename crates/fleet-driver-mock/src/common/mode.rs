//! Operational modes for simulated devices.

/// How a simulated camera spends time and fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MockMode {
    /// Zero delays - for unit tests
    #[default]
    Instant,
    /// Sleeps for the configured open/readout times - for soak runs
    Realistic,
    /// Realistic timing and the random fault rate doubled
    Chaos,
}

impl MockMode {
    /// Whether this mode sleeps to emulate hardware latency.
    #[must_use]
    pub fn simulates_latency(self) -> bool {
        !matches!(self, MockMode::Instant)
    }

    /// Scale a configured fault rate for this mode, capped at 1.0.
    #[must_use]
    pub fn effective_fault_rate(self, rate: f64) -> f64 {
        match self {
            MockMode::Chaos => (rate * 2.0).min(1.0),
            _ => rate,
        }
    }
}

impl std::str::FromStr for MockMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "instant" => Ok(MockMode::Instant),
            "realistic" => Ok(MockMode::Realistic),
            "chaos" => Ok(MockMode::Chaos),
            other => Err(format!(
                "Invalid mock mode '{}'. Must be one of: instant, realistic, chaos",
                other
            )),
        }
    }
}

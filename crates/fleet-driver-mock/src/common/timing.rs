//! Timing configuration for realistic mode.

use std::time::Duration;

/// Hardware-like delays applied when the mode simulates latency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TimingConfig {
    /// Time to bring the device up (framegrabber open)
    pub open_delay_ms: u64,
    /// Frame readout time in milliseconds
    pub frame_readout_ms: u64,
}

impl TimingConfig {
    /// Typical GigE area-scan camera: slow open, ~30 fps readout.
    pub fn gige_camera() -> Self {
        Self {
            open_delay_ms: 250,
            frame_readout_ms: 33,
        }
    }

    /// USB3 cameras enumerate faster than GigE.
    pub fn usb3_camera() -> Self {
        Self {
            open_delay_ms: 80,
            frame_readout_ms: 16,
        }
    }

    pub fn open_delay(&self) -> Duration {
        Duration::from_millis(self.open_delay_ms)
    }

    pub fn readout(&self) -> Duration {
        Duration::from_millis(self.frame_readout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_timing_is_zero() {
        let config = TimingConfig::default();
        assert_eq!(config.open_delay(), Duration::ZERO);
        assert_eq!(config.readout(), Duration::ZERO);
    }

    #[test]
    fn test_camera_profiles() {
        assert_eq!(TimingConfig::gige_camera().frame_readout_ms, 33);
        assert!(TimingConfig::usb3_camera().open_delay_ms < TimingConfig::gige_camera().open_delay_ms);
    }
}

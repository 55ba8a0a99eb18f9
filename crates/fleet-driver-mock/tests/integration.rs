//! Integration tests for the simulated camera driven through the device
//! state machine.

use fleet_core::{Device, DeviceEvent, DeviceEventSink, DeviceState};
use fleet_driver_mock::*;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

#[derive(Default)]
struct Counter {
    frames: Mutex<u32>,
    errors: Mutex<Vec<String>>,
}

impl DeviceEventSink for Counter {
    fn on_device_event(&self, _device: &str, event: DeviceEvent) {
        match event {
            DeviceEvent::Frame(_) => *self.frames.lock() += 1,
            DeviceEvent::Error(msg) => self.errors.lock().push(msg),
            DeviceEvent::Status(_) => {}
        }
    }
}

/// A healthy simulated camera delivers one frame per trigger.
#[tokio::test]
async fn test_device_streams_frames() {
    let device = Device::new("Cam1", Box::new(SimulatedCamera::builder().fault_rate(0.0).build()));
    let sink = Arc::new(Counter::default());
    device.attach_sink(sink.clone());
    device.start();

    for _ in 0..10 {
        device.software_trigger().await;
    }

    assert_eq!(*sink.frames.lock(), 10);
    assert_eq!(device.state(), DeviceState::Online);
}

/// Pulling the virtual cable disconnects the device; clearing it lets the
/// scheduled retry reconnect.
#[tokio::test(start_paused = true)]
async fn test_fault_switch_drives_reconnect_cycle() {
    let switch = FaultSwitch::new();
    let camera = SimulatedCamera::builder()
        .fault_rate(0.0)
        .fault_switch(switch.clone())
        .build();
    let device = Device::new("Cam2", Box::new(camera));
    let sink = Arc::new(Counter::default());
    device.attach_sink(sink.clone());
    device.start();

    device.software_trigger().await;
    assert_eq!(device.state(), DeviceState::Online);

    switch.trip();
    device.software_trigger().await;
    assert_eq!(device.state(), DeviceState::Disconnected);
    assert_eq!(sink.errors.lock().len(), 1);

    // Retry at 1s fails again and backs off to 2s
    tokio::time::advance(Duration::from_millis(1000)).await;
    device.software_trigger().await;
    assert_eq!(device.status().retry_delay, Duration::from_millis(2000));

    switch.clear();
    tokio::time::advance(Duration::from_millis(2000)).await;
    device.software_trigger().await;
    assert_eq!(device.state(), DeviceState::Online);
    assert_eq!(device.status().retry_delay, Duration::from_millis(1000));
    assert_eq!(*sink.frames.lock(), 2);
}

/// Chaos mode with a seeded RNG produces faults but the device never panics
/// and always ends in a defined state.
#[tokio::test(start_paused = true)]
async fn test_chaos_soak() {
    let camera = SimulatedCamera::builder()
        .mode(MockMode::Chaos)
        .timing_config(TimingConfig::usb3_camera())
        .fault_rate(0.2)
        .seed(1234)
        .build();
    let device = Device::new("Cam3", Box::new(camera));
    let sink = Arc::new(Counter::default());
    device.attach_sink(sink.clone());
    device.start();

    for _ in 0..200 {
        device.software_trigger().await;
        tokio::time::advance(Duration::from_millis(100)).await;
    }

    assert!(*sink.frames.lock() > 0);
    assert!(!sink.errors.lock().is_empty());
    assert_ne!(device.state(), DeviceState::Connecting);
}

/// Parameter writes pass through the device to the backend.
#[tokio::test]
async fn test_set_param_through_device() {
    let device = Device::new("Cam4", Box::new(SimulatedCamera::builder().fault_rate(0.0).build()));
    device.set_param("Consumer|gain", "2.5").await.unwrap();
    assert!(device.set_param("Consumer|black_level", "1").await.is_err());
}

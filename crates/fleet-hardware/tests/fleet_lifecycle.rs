//! End-to-end fleet behavior with simulated cameras.

use fleet_core::{Device, DeviceObserver, Frame, TriggerGroup};
use fleet_driver_mock::{FaultSwitch, SimulatedCamera};
use fleet_hardware::*;
use fleet_storage::{CameraSettings, ConfigStore, PlcSettings, RunMode, ViewMappingSettings};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

#[derive(Default)]
struct Recorder {
    writes: Mutex<Vec<(u16, bool)>>,
}

impl AlarmActuator for Recorder {
    fn set_alarm_register(&self, address: u16, asserted: bool) {
        self.writes.lock().push((address, asserted));
    }
}

impl Recorder {
    fn last(&self) -> Option<(u16, bool)> {
        self.writes.lock().last().copied()
    }
}

#[derive(Default)]
struct FrameCounts(Mutex<HashMap<String, usize>>);

impl DeviceObserver for FrameCounts {
    fn on_frame(&self, device: &str, _frame: &Frame) {
        *self.0.lock().entry(device.to_string()).or_default() += 1;
    }
}

impl FrameCounts {
    fn get(&self, device: &str) -> usize {
        self.0.lock().get(device).copied().unwrap_or(0)
    }
}

fn switched_camera(name: &str) -> (Device, FaultSwitch) {
    let switch = FaultSwitch::new();
    let camera = SimulatedCamera::builder()
        .fault_rate(0.0)
        .fault_switch(switch.clone())
        .build();
    (Device::new(name, Box::new(camera)), switch)
}

#[tokio::test(start_paused = true)]
async fn offline_set_drives_group_alarm() {
    let registry = DeviceRegistry::new();
    let plc_a = Arc::new(Recorder::default());
    let plc_b = Arc::new(Recorder::default());
    let alarm = Arc::new(AlarmLinkage::from_settings(
        registry.downgrade(),
        &PlcSettings::default(),
        plc_a.clone(),
        plc_b.clone(),
    ));
    registry.subscribe(alarm.clone());

    let mut switches = HashMap::new();
    for name in ["A", "B", "C"] {
        let (device, switch) = switched_camera(name);
        registry.add(device, TriggerGroup::Group1).unwrap();
        switches.insert(name, switch);
    }
    registry.start_all().await;
    assert!(alarm.offline_devices(TriggerGroup::Group1).is_empty());
    assert_eq!(plc_a.last(), Some((0, false)));

    switches["A"].trip();
    registry.trigger_group(TriggerGroup::Group1).await;
    assert_eq!(alarm.offline_devices(TriggerGroup::Group1), vec!["A"]);
    assert_eq!(plc_a.last(), Some((0, true)));

    switches["B"].trip();
    registry.trigger_group(TriggerGroup::Group1).await;
    assert_eq!(alarm.offline_devices(TriggerGroup::Group1), vec!["A", "B"]);
    assert_eq!(plc_a.last(), Some((0, true)));

    switches["A"].clear();
    switches["B"].clear();
    tokio::time::advance(Duration::from_millis(1001)).await;
    registry.trigger_group(TriggerGroup::Group1).await;

    assert!(alarm.offline_devices(TriggerGroup::Group1).is_empty());
    assert_eq!(plc_a.last(), Some((0, false)));
    // Group 2 never had a device
    assert!(plc_b.writes.lock().is_empty());
}

#[tokio::test]
async fn trigger_group_only_touches_its_group() {
    let registry = DeviceRegistry::new();
    let counts = Arc::new(FrameCounts::default());
    registry.subscribe(counts.clone());
    FleetBuilder::new(RunMode::Simulation)
        .simulation(SimulationOptions {
            fault_rate: 0.0,
            ..Default::default()
        })
        .populate(&CameraSettings::default(), &registry)
        .unwrap();
    registry.start_all().await;

    registry.trigger_group(TriggerGroup::Group2).await;
    for name in ["Cam1", "Cam2", "Cam3"] {
        assert_eq!(counts.get(name), 0, "{}", name);
    }
    for name in ["Cam4", "Cam5", "Cam6"] {
        assert_eq!(counts.get(name), 1, "{}", name);
    }

    registry.trigger_all().await;
    assert_eq!(counts.get("Cam1"), 1);
    assert_eq!(counts.get("Cam6"), 2);
}

#[tokio::test(start_paused = true)]
async fn trigger_cycle_runs_until_shutdown() {
    let registry = DeviceRegistry::new();
    let counts = Arc::new(FrameCounts::default());
    registry.subscribe(counts.clone());
    FleetBuilder::new(RunMode::Simulation)
        .simulation(SimulationOptions {
            fault_rate: 0.0,
            ..Default::default()
        })
        .populate(&CameraSettings::default(), &registry)
        .unwrap();
    registry.start_all().await;

    let (tx, rx) = watch::channel(false);
    let task = tokio::spawn(run_trigger_cycle(
        registry.clone(),
        Duration::from_millis(100),
        rx,
    ));
    tokio::time::sleep(Duration::from_millis(350)).await;
    tx.send(true).unwrap();
    let cycles = task.await.unwrap();

    assert!(cycles >= 3, "cycles = {}", cycles);
    assert_eq!(counts.get("Cam1") as u64, cycles);
    assert_eq!(counts.get("Cam6") as u64, cycles);
}

#[tokio::test]
async fn aggregator_republishes_and_counts() {
    #[derive(Default)]
    struct Seen {
        images: Mutex<usize>,
        online: Mutex<Vec<(String, bool)>>,
    }
    impl FleetObserver for Seen {
        fn on_image_ready(&self, _device: &str, _frame: &Frame) {
            *self.images.lock() += 1;
        }
        fn on_camera_online_changed(&self, device: &str, online: bool) {
            self.online.lock().push((device.to_string(), online));
        }
    }

    let registry = DeviceRegistry::new();
    let aggregator = FleetStatusAggregator::attach(&registry);
    let seen = Arc::new(Seen::default());
    aggregator.subscribe(seen.clone());

    let (device, _switch) = switched_camera("Cam1");
    registry.add(device, TriggerGroup::Group1).unwrap();
    registry.start_all().await;
    registry.trigger_all().await;
    registry.trigger_all().await;

    assert_eq!(*seen.images.lock(), 2);
    assert_eq!(
        *seen.online.lock(),
        vec![("Cam1".to_string(), false), ("Cam1".to_string(), true)]
    );

    let snapshot = aggregator.snapshot();
    assert_eq!(snapshot.overview_label(), "CAM: 1/1");
    assert_eq!(snapshot.devices[0].label, "ONLINE");
    assert_eq!(aggregator.alarm_summary(None), "ALARM: -");
}

#[tokio::test(start_paused = true)]
async fn window_rates_per_device_and_after_stall() {
    let registry = DeviceRegistry::new();
    let aggregator = FleetStatusAggregator::attach(&registry);
    for name in ["Cam1", "Cam2"] {
        let (device, _switch) = switched_camera(name);
        registry.add(device, TriggerGroup::Group1).unwrap();
    }
    registry.start_all().await;

    for i in 0..30 {
        if i > 0 {
            tokio::time::advance(Duration::from_millis(100)).await;
        }
        registry.trigger_all().await;
    }

    let snapshot = aggregator.snapshot();
    assert!((snapshot.fps - 20.0).abs() < 1e-9, "fleet fps = {}", snapshot.fps);
    for device in &snapshot.devices {
        assert!((device.window_fps - 10.0).abs() < 1e-9, "{}: {}", device.name, device.window_fps);
        assert!((device.fps - 10.0).abs() < 0.01, "{}: {}", device.name, device.fps);
    }

    tokio::time::advance(Duration::from_secs(10)).await;
    let snapshot = aggregator.snapshot();
    assert_eq!(snapshot.fps, 0.0);
    assert_eq!(aggregator.fps(), 0.0);
    for device in &snapshot.devices {
        assert_eq!(device.window_fps, 0.0);
        assert_eq!(device.fps, 0.0);
    }
    assert_eq!(aggregator.device_window_fps("Cam1"), 0.0);
}

/// Counts `on_online_changed` calls per device and direction.
#[derive(Default)]
struct Transitions(Mutex<HashMap<(String, bool), usize>>);

impl DeviceObserver for Transitions {
    fn on_online_changed(&self, device: &str, online: bool) {
        *self.0.lock().entry((device.to_string(), online)).or_default() += 1;
    }
}

impl Transitions {
    fn count(&self, device: &str, online: bool) -> usize {
        self.0
            .lock()
            .get(&(device.to_string(), online))
            .copied()
            .unwrap_or(0)
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_transitions_keep_alarm_consistent() {
    const ROUNDS: usize = 200;

    let registry = DeviceRegistry::new();
    let plc_a = Arc::new(Recorder::default());
    let alarm = Arc::new(AlarmLinkage::from_settings(
        registry.downgrade(),
        &PlcSettings::default(),
        plc_a.clone(),
        Arc::new(Recorder::default()),
    ));
    registry.subscribe(alarm.clone());
    let transitions = Arc::new(Transitions::default());
    registry.subscribe(transitions.clone());

    let mut cameras = Vec::new();
    for name in ["A", "B", "C"] {
        let (device, switch) = switched_camera(name);
        let device = registry.add(device, TriggerGroup::Group1).unwrap();
        cameras.push((device, switch));
    }
    registry.start_all().await;

    let tasks: Vec<_> = cameras
        .into_iter()
        .map(|(device, switch)| {
            tokio::spawn(async move {
                for _ in 0..ROUNDS {
                    switch.trip();
                    device.software_trigger().await;
                    switch.clear();
                    device.force_reconnect().await;
                    device.software_trigger().await;
                }
                // C finishes offline
                if device.name() == "C" {
                    switch.trip();
                    device.software_trigger().await;
                }
            })
        })
        .collect();
    for task in tasks {
        task.await.unwrap();
    }

    assert_eq!(alarm.offline_devices(TriggerGroup::Group1), vec!["C"]);
    assert!(alarm.is_asserted(TriggerGroup::Group1));
    assert_eq!(plc_a.last(), Some((0, true)));
    assert!(registry.is_online("A") && registry.is_online("B"));
    assert!(!registry.is_online("C"));

    // registration and start_all add one transition each way
    for name in ["A", "B"] {
        assert_eq!(transitions.count(name, false), ROUNDS + 1, "{}", name);
        assert_eq!(transitions.count(name, true), ROUNDS + 1, "{}", name);
    }
    assert_eq!(transitions.count("C", false), ROUNDS + 2);
    assert_eq!(transitions.count("C", true), ROUNDS + 1);
}

#[tokio::test]
async fn fleet_rebuild_replaces_devices() {
    let resolver = Arc::new(ViewMappingResolver::from_settings(&ViewMappingSettings::default()));
    let fleet = Fleet::new(
        resolver,
        &PlcSettings::default(),
        Arc::new(Recorder::default()),
        Arc::new(Recorder::default()),
    );
    let builder = FleetBuilder::new(RunMode::Simulation).simulation(SimulationOptions {
        fault_rate: 0.0,
        ..Default::default()
    });

    fleet.rebuild(&builder, &CameraSettings::default()).await.unwrap();
    fleet.start().await;
    assert_eq!(fleet.registry().online_count(), 6);

    fleet.rebuild(&builder, &CameraSettings::default()).await.unwrap();
    assert_eq!(fleet.registry().len(), 6);
    assert_eq!(fleet.registry().online_count(), 0);
    assert_eq!(
        fleet.alarm().offline_devices(TriggerGroup::Group2),
        vec!["Cam4", "Cam5", "Cam6"]
    );

    fleet.shutdown().await;
    assert!(fleet.registry().is_empty());
}

#[test]
fn healed_mapping_is_persisted_outside_production() {
    let dir = tempfile::tempdir().unwrap();
    let store = ConfigStore::new(dir.path());
    let duplicated = ViewMappingSettings {
        views: vec![Some("CamX".into()), Some("CamX".into()), None, None, None, None],
    };
    store.save_view_mapping(&duplicated, RunMode::Simulation).unwrap();

    let (resolver, changed) = ViewMappingResolver::load_healed(&store, RunMode::Production);
    assert!(changed);
    assert_eq!(store.load_view_mapping(), duplicated);
    assert_eq!(resolver.resolve_slot_for_device("CamX"), ViewSlot::new(1).ok());

    let (_resolver, changed) = ViewMappingResolver::load_healed(&store, RunMode::Simulation);
    assert!(changed);
    assert_eq!(store.load_view_mapping().views[1], None);

    let (_resolver, changed) = ViewMappingResolver::load_healed(&store, RunMode::Simulation);
    assert!(!changed);
}

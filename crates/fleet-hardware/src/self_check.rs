//! Startup self-check.
//!
//! Informational only: a failed item is reported, never enforced.

use crate::view_mapping::ViewMappingResolver;
use fleet_core::retry::RetryPolicy;
use fleet_driver_framegrabber::FramegrabberSdk;
use fleet_storage::{CameraSettings, InterfaceKind, PlcSettings};
use serde::Serialize;
use std::collections::HashSet;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SelfCheckItem {
    pub name: String,
    pub passed: bool,
    pub detail: String,
    /// What to do about a failure
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
}

impl SelfCheckItem {
    fn pass(name: &str, detail: impl Into<String>) -> Self {
        Self {
            name: name.to_string(),
            passed: true,
            detail: detail.into(),
            suggestion: None,
        }
    }

    fn fail(name: &str, detail: impl Into<String>, suggestion: &str) -> Self {
        Self {
            name: name.to_string(),
            passed: false,
            detail: detail.into(),
            suggestion: Some(suggestion.to_string()),
        }
    }

    fn check(passed: bool, name: &str, ok: impl Into<String>, bad: impl Into<String>, suggestion: &str) -> Self {
        if passed {
            Self::pass(name, ok)
        } else {
            Self::fail(name, bad, suggestion)
        }
    }
}

/// Everything the self-check looks at.
pub struct SelfCheckInput<'a> {
    pub cameras: &'a CameraSettings,
    pub mapping: &'a ViewMappingResolver,
    pub plc: &'a PlcSettings,
    pub retry: &'a RetryPolicy,
    /// Hardware checks are skipped without an SDK
    pub sdk: Option<&'a dyn FramegrabberSdk>,
}

pub fn run_self_check(input: &SelfCheckInput<'_>) -> Vec<SelfCheckItem> {
    let mut items = vec![
        check_camera_devices(input.cameras),
        check_mapping_duplicates(input.mapping),
        check_mapping_names(input.mapping, input.cameras),
        check_plc(input.plc),
        check_retry(input.retry),
    ];
    if let Some(sdk) = input.sdk {
        items.extend(check_interfaces(sdk, input.cameras));
        items.push(check_enumeration(sdk, input.cameras));
    }

    let failed = items.iter().filter(|i| !i.passed).count();
    if failed > 0 {
        tracing::warn!(failed, total = items.len(), "Self-check found problems");
    } else {
        tracing::info!(total = items.len(), "Self-check passed");
    }
    items
}

fn check_camera_devices(cameras: &CameraSettings) -> SelfCheckItem {
    let dupes = cameras.duplicate_devices();
    SelfCheckItem::check(
        dupes.is_empty(),
        "Camera devices unique",
        "each physical device is assigned to one slot",
        format!("device reused by {}", dupes.join(", ")),
        "assign each physical camera to a single slot",
    )
}

fn check_mapping_duplicates(mapping: &ViewMappingResolver) -> SelfCheckItem {
    let mut seen = HashSet::new();
    let dupes: Vec<String> = mapping
        .to_settings()
        .views
        .into_iter()
        .flatten()
        .filter(|name| !seen.insert(name.clone()))
        .collect();
    SelfCheckItem::check(
        dupes.is_empty(),
        "View mapping unique",
        "each device is shown in at most one view",
        format!("shown twice: {}", dupes.join(", ")),
        "run heal-mapping or reassign the views",
    )
}

fn check_mapping_names(mapping: &ViewMappingResolver, cameras: &CameraSettings) -> SelfCheckItem {
    let known: Vec<String> = cameras.cameras.iter().map(|c| c.name.clone()).collect();
    let unknown = mapping.unknown_assignments(&known);
    let listed: Vec<String> = unknown
        .iter()
        .map(|(slot, name)| format!("{}={}", slot, name))
        .collect();
    SelfCheckItem::check(
        unknown.is_empty(),
        "View mapping names",
        "every mapped view names a configured camera",
        format!("unknown cameras: {}", listed.join(", ")),
        "remap these views to configured cameras",
    )
}

fn check_plc(plc: &PlcSettings) -> SelfCheckItem {
    match plc.validate() {
        Ok(()) => SelfCheckItem::pass(
            "PLC settings",
            format!("PLC A {}, PLC B {}, slave {}", plc.plc_a.ip, plc.plc_b.ip, plc.slave_id),
        ),
        Err(e) => SelfCheckItem::fail("PLC settings", e, "fix plc_settings.json"),
    }
}

fn check_retry(retry: &RetryPolicy) -> SelfCheckItem {
    SelfCheckItem::check(
        retry.floor() <= retry.ceiling() && !retry.floor().is_zero(),
        "Reconnect backoff",
        format!(
            "floor {} ms, ceiling {} ms",
            retry.floor().as_millis(),
            retry.ceiling().as_millis()
        ),
        "floor exceeds ceiling",
        "set retry floor below ceiling",
    )
}

fn check_interfaces(sdk: &dyn FramegrabberSdk, cameras: &CameraSettings) -> Vec<SelfCheckItem> {
    let mut kinds: Vec<InterfaceKind> = Vec::new();
    for cam in &cameras.cameras {
        if !kinds.contains(&cam.interface) {
            kinds.push(cam.interface);
        }
    }
    kinds
        .into_iter()
        .map(|kind| {
            let name = format!("Interface {}", kind);
            match sdk.resolve_interface(kind.fallbacks()) {
                Some(found) => SelfCheckItem::pass(&name, format!("using {}", found)),
                None => SelfCheckItem::fail(
                    &name,
                    format!("none of {} available", kind.fallbacks().join(", ")),
                    "install the interface module for this camera type",
                ),
            }
        })
        .collect()
}

fn check_enumeration(sdk: &dyn FramegrabberSdk, cameras: &CameraSettings) -> SelfCheckItem {
    let mut missing = Vec::new();
    for cam in cameras.cameras.iter().filter(|c| c.has_device()) {
        let Some(interface) = sdk.resolve_interface(cam.interface.fallbacks()) else {
            missing.push(cam.name.clone());
            continue;
        };
        let found = sdk.enumerate_devices(&interface).unwrap_or_default();
        let wanted = cam.device.trim();
        if !found.iter().any(|d| d.contains(wanted)) {
            missing.push(cam.name.clone());
        }
    }
    SelfCheckItem::check(
        missing.is_empty(),
        "Configured cameras present",
        "all configured devices enumerated",
        format!("not found: {}", missing.join(", ")),
        "check cabling and device identifiers",
    )
}

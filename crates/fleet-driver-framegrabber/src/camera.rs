//! [`AcquisitionBackend`] over a [`FramegrabberSdk`].

use crate::naming::{device_candidates, is_skipped_param, param_name_candidates, port_for};
use crate::sdk::{FramegrabberSdk, ParamValue, SdkHandle};
use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use fleet_core::data::Frame;
use fleet_core::device::AcquisitionBackend;
use fleet_storage::CameraConfig;
use std::sync::Arc;
use std::time::Duration;

const DRIVER_TYPE: &str = "framegrabber";

/// How long one grab may block inside the SDK.
pub const DEFAULT_GRAB_TIMEOUT: Duration = Duration::from_millis(2000);

/// Camera driven through a vendor framegrabber SDK.
///
/// # Open sequence
///
/// 1. Resolve the interface, walking [`InterfaceKind::fallbacks`](fleet_storage::InterfaceKind::fallbacks)
/// 2. Try every [`device_candidates`] spelling of the configured device; for
///    an unconfigured slot also try every enumerated device
/// 3. Replay persisted parameters, ignoring individual failures
pub struct FramegrabberCamera {
    sdk: Arc<dyn FramegrabberSdk>,
    config: CameraConfig,
    handle: Option<SdkHandle>,
    interface: Option<String>,
    grab_timeout: Duration,
}

impl FramegrabberCamera {
    pub fn new(sdk: Arc<dyn FramegrabberSdk>, config: CameraConfig) -> Self {
        Self {
            sdk,
            config,
            handle: None,
            interface: None,
            grab_timeout: DEFAULT_GRAB_TIMEOUT,
        }
    }

    pub fn with_grab_timeout(mut self, timeout: Duration) -> Self {
        self.grab_timeout = timeout;
        self
    }

    pub fn config(&self) -> &CameraConfig {
        &self.config
    }

    /// Interface name the last successful open resolved to.
    pub fn interface(&self) -> Option<&str> {
        self.interface.as_deref()
    }

    fn open_blocking(
        sdk: &dyn FramegrabberSdk,
        config: &CameraConfig,
    ) -> Result<(String, SdkHandle)> {
        let fallbacks = config.interface.fallbacks();
        let interface = sdk.resolve_interface(fallbacks).ok_or_else(|| {
            anyhow!(
                "interface {} unavailable (tried {})",
                config.interface,
                fallbacks.join(", ")
            )
        })?;

        let port = port_for(&interface, config.port);
        let mut candidates = device_candidates(&config.device);
        if !config.has_device() {
            match sdk.enumerate_devices(&interface) {
                Ok(found) => candidates.extend(found),
                Err(e) => tracing::debug!(interface = %interface, error = %e, "Device enumeration failed"),
            }
        }

        let mut last_err = None;
        for device in &candidates {
            match sdk.open(&interface, device, port) {
                Ok(handle) => {
                    tracing::info!(
                        camera = %config.name,
                        interface = %interface,
                        device = %device,
                        port = %port,
                        "Framegrabber opened"
                    );
                    Self::apply_params(sdk, handle, config);
                    return Ok((interface, handle));
                }
                Err(e) => {
                    tracing::debug!(device = %device, error = %e, "Open candidate rejected");
                    last_err = Some(e);
                }
            }
        }

        Err(last_err
            .unwrap_or_else(|| anyhow!("no device candidates"))
            .context(format!("open {} on {}", config.device, interface)))
    }

    fn apply_params(sdk: &dyn FramegrabberSdk, handle: SdkHandle, config: &CameraConfig) {
        for (name, raw) in &config.params {
            if is_skipped_param(name) {
                continue;
            }
            let value = ParamValue::parse(raw);
            if let Err(e) = Self::set_param_blocking(sdk, handle, name, &value) {
                tracing::warn!(camera = %config.name, param = %name, error = %e, "Persisted parameter not applied");
            }
        }
    }

    fn set_param_blocking(
        sdk: &dyn FramegrabberSdk,
        handle: SdkHandle,
        name: &str,
        value: &ParamValue,
    ) -> Result<()> {
        let mut last_err = None;
        for candidate in param_name_candidates(name) {
            match sdk.set_param(handle, &candidate, value) {
                Ok(()) => return Ok(()),
                Err(e) => last_err = Some(e),
            }
        }
        Err(last_err.unwrap_or_else(|| anyhow!("parameter name is empty")))
    }
}

#[async_trait]
impl AcquisitionBackend for FramegrabberCamera {
    fn driver_type(&self) -> &'static str {
        DRIVER_TYPE
    }

    async fn open(&mut self) -> Result<()> {
        self.close().await;

        let sdk = self.sdk.clone();
        let config = self.config.clone();
        let (interface, handle) =
            tokio::task::spawn_blocking(move || Self::open_blocking(sdk.as_ref(), &config))
                .await
                .context("open task panicked")??;

        self.interface = Some(interface);
        self.handle = Some(handle);
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.handle.is_some()
    }

    async fn grab(&mut self) -> Result<Frame> {
        let Some(handle) = self.handle else {
            bail!("framegrabber not open");
        };
        let sdk = self.sdk.clone();
        let timeout = self.grab_timeout;
        tokio::task::spawn_blocking(move || sdk.grab(handle, timeout))
            .await
            .context("grab task panicked")?
    }

    async fn close(&mut self) {
        let Some(handle) = self.handle.take() else {
            return;
        };
        let sdk = self.sdk.clone();
        if let Err(e) = tokio::task::spawn_blocking(move || sdk.close(handle)).await {
            tracing::warn!(camera = %self.config.name, error = %e, "Close task panicked");
        }
    }

    async fn set_param(&mut self, name: &str, value: &str) -> Result<()> {
        let Some(handle) = self.handle else {
            bail!("Cannot set '{}' on {}: framegrabber not open", name, self.config.name);
        };
        let sdk = self.sdk.clone();
        let name = name.to_string();
        let value = ParamValue::parse(value);
        tokio::task::spawn_blocking(move || {
            Self::set_param_blocking(sdk.as_ref(), handle, &name, &value)
                .with_context(|| format!("set {} = {}", name, value))
        })
        .await
        .context("set_param task panicked")?
    }
}

impl std::fmt::Debug for FramegrabberCamera {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FramegrabberCamera")
            .field("name", &self.config.name)
            .field("interface", &self.interface)
            .field("handle", &self.handle)
            .finish()
    }
}

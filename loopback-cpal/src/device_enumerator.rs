//! Audio device enumeration via the cpal default host.

use cpal::traits::{DeviceTrait, HostTrait};

use loopback_core::models::audio_models::{DeviceDirection, DeviceInfo};
use loopback_core::models::error::LoopbackError;

/// Audio device enumerator over the platform's default cpal host.
pub struct DeviceEnumerator {
    host: cpal::Host,
}

impl DeviceEnumerator {
    pub fn new() -> Self {
        Self {
            host: cpal::default_host(),
        }
    }

    /// List input (microphone) devices.
    pub fn list_input_devices(&self) -> Result<Vec<DeviceInfo>, LoopbackError> {
        let default_name = self.host.default_input_device().and_then(|d| d.name().ok());
        let devices = self
            .host
            .input_devices()
            .map_err(|e| LoopbackError::DeviceUnavailable(format!("failed to enumerate inputs: {}", e)))?;
        Ok(collect_devices(devices, DeviceDirection::Input, default_name))
    }

    /// List output (speaker/headphone) devices.
    pub fn list_output_devices(&self) -> Result<Vec<DeviceInfo>, LoopbackError> {
        let default_name = self.host.default_output_device().and_then(|d| d.name().ok());
        let devices = self
            .host
            .output_devices()
            .map_err(|e| LoopbackError::DeviceUnavailable(format!("failed to enumerate outputs: {}", e)))?;
        Ok(collect_devices(devices, DeviceDirection::Output, default_name))
    }

    /// Input device by name, or the default input when `name` is None.
    pub fn input_device(&self, name: Option<&str>) -> Result<cpal::Device, LoopbackError> {
        match name {
            Some(wanted) => {
                let devices = self.host.input_devices().map_err(|e| {
                    LoopbackError::DeviceUnavailable(format!("failed to enumerate inputs: {}", e))
                })?;
                find_by_name(devices, wanted)
            }
            None => self
                .host
                .default_input_device()
                .ok_or_else(|| LoopbackError::DeviceUnavailable("no default input device".into())),
        }
    }

    /// Output device by name, or the default output when `name` is None.
    pub fn output_device(&self, name: Option<&str>) -> Result<cpal::Device, LoopbackError> {
        match name {
            Some(wanted) => {
                let devices = self.host.output_devices().map_err(|e| {
                    LoopbackError::DeviceUnavailable(format!("failed to enumerate outputs: {}", e))
                })?;
                find_by_name(devices, wanted)
            }
            None => self
                .host
                .default_output_device()
                .ok_or_else(|| LoopbackError::DeviceUnavailable("no default output device".into())),
        }
    }
}

impl Default for DeviceEnumerator {
    fn default() -> Self {
        Self::new()
    }
}

fn collect_devices(
    devices: impl Iterator<Item = cpal::Device>,
    direction: DeviceDirection,
    default_name: Option<String>,
) -> Vec<DeviceInfo> {
    devices
        .filter_map(|device| device.name().ok())
        .map(|name| DeviceInfo {
            is_default: Some(&name) == default_name.as_ref(),
            id: name.clone(),
            name,
            direction,
        })
        .collect()
}

fn find_by_name(
    mut devices: impl Iterator<Item = cpal::Device>,
    wanted: &str,
) -> Result<cpal::Device, LoopbackError> {
    devices
        .find(|device| device.name().map(|n| n == wanted).unwrap_or(false))
        .ok_or_else(|| LoopbackError::DeviceUnavailable(format!("device '{}' not found", wanted)))
}

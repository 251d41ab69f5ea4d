use cpal::traits::{DeviceTrait, HostTrait};
use cpal::{Device, Host, SampleFormat};
use std::collections::BTreeMap;

use crate::error::PlaybackError;

/// What the `devices` listing shows for one output device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    pub name: String,
    pub default_sample_rate: u32,
    pub default_channels: u16,
    pub sample_format: String,
    pub max_channels: u16,
    pub is_default: bool,
}

/// Enumerates output devices and resolves the configured one
pub struct DeviceManager {
    host: Host,
    devices: BTreeMap<String, Device>,
    infos: Vec<DeviceInfo>,
}

impl DeviceManager {
    pub fn new() -> Result<Self, PlaybackError> {
        let mut manager = DeviceManager {
            host: cpal::default_host(),
            devices: BTreeMap::new(),
            infos: Vec::new(),
        };
        manager.refresh_devices()?;
        Ok(manager)
    }

    /// Re-scan the host's output devices
    pub fn refresh_devices(&mut self) -> Result<(), PlaybackError> {
        self.devices.clear();
        self.infos.clear();

        let default_name = self
            .host
            .default_output_device()
            .and_then(|d| d.name().ok());

        let devices = self
            .host
            .output_devices()
            .map_err(|e| PlaybackError::Output(format!("Failed to enumerate devices: {}", e)))?;

        for device in devices {
            let name = match device.name() {
                Ok(name) => name,
                Err(e) => {
                    log::debug!("Skipping unnamed output device: {}", e);
                    continue;
                }
            };
            match Self::describe(&device, &name, default_name.as_deref() == Some(name.as_str())) {
                Some(info) => self.infos.push(info),
                None => {
                    log::debug!("Skipping output device without a usable config: {}", name);
                    continue;
                }
            }
            self.devices.insert(name, device);
        }
        self.infos.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(())
    }

    /// Names of all usable output devices, sorted
    pub fn list_devices(&self) -> Vec<String> {
        self.devices.keys().cloned().collect()
    }

    pub fn device_infos(&self) -> &[DeviceInfo] {
        &self.infos
    }

    /// Resolve a device by name, or the host default when `name` is `None`
    pub fn select_device(&self, name: Option<&str>) -> Result<Device, PlaybackError> {
        match name {
            Some(name) => self
                .devices
                .get(name)
                .cloned()
                .ok_or_else(|| PlaybackError::DeviceNotFound {
                    device: name.to_string(),
                }),
            None => self.default_device(),
        }
    }

    /// Like [`select_device`](Self::select_device) but falls back to the default device
    pub fn select_device_with_fallback(&self, name: Option<&str>) -> Result<Device, PlaybackError> {
        match self.select_device(name) {
            Ok(device) => Ok(device),
            Err(PlaybackError::DeviceNotFound { device }) => {
                log::warn!("Output device '{}' not found, using the default device", device);
                self.default_device()
            }
            Err(e) => Err(e),
        }
    }

    pub fn default_device(&self) -> Result<Device, PlaybackError> {
        self.host
            .default_output_device()
            .ok_or_else(|| PlaybackError::Output("No default output device available".to_string()))
    }

    fn describe(device: &Device, name: &str, is_default: bool) -> Option<DeviceInfo> {
        let default_config = device.default_output_config().ok()?;
        let max_channels = device
            .supported_output_configs()
            .map(|configs| configs.map(|range| range.channels()).max().unwrap_or(0))
            .unwrap_or(0)
            .max(default_config.channels());

        Some(DeviceInfo {
            name: name.to_string(),
            default_sample_rate: default_config.sample_rate().0,
            default_channels: default_config.channels(),
            sample_format: sample_format_name(default_config.sample_format()).to_string(),
            max_channels,
            is_default,
        })
    }
}

fn sample_format_name(format: SampleFormat) -> &'static str {
    match format {
        SampleFormat::I8 => "i8",
        SampleFormat::I16 => "i16",
        SampleFormat::I32 => "i32",
        SampleFormat::I64 => "i64",
        SampleFormat::U8 => "u8",
        SampleFormat::U16 => "u16",
        SampleFormat::U32 => "u32",
        SampleFormat::U64 => "u64",
        SampleFormat::F32 => "f32",
        SampleFormat::F64 => "f64",
        _ => "unknown",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Machines without audio hardware (CI) cannot enumerate; those tests return early.

    #[test]
    fn test_unknown_device_is_reported_by_name() {
        let Ok(manager) = DeviceManager::new() else {
            return;
        };
        match manager.select_device(Some("NonExistentDevice")) {
            Err(PlaybackError::DeviceNotFound { device }) => assert_eq!(device, "NonExistentDevice"),
            other => panic!("Expected DeviceNotFound, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_listing_matches_infos() {
        let Ok(manager) = DeviceManager::new() else {
            return;
        };
        let names = manager.list_devices();
        let info_names: Vec<String> = manager.device_infos().iter().map(|i| i.name.clone()).collect();
        assert_eq!(names, info_names);
        for info in manager.device_infos() {
            assert!(info.default_channels > 0);
            assert!(info.max_channels >= info.default_channels);
        }
    }

    #[test]
    fn test_sample_format_names() {
        assert_eq!(sample_format_name(SampleFormat::F32), "f32");
        assert_eq!(sample_format_name(SampleFormat::I16), "i16");
        assert_eq!(sample_format_name(SampleFormat::U16), "u16");
    }
}

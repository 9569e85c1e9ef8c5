//! Device enumeration via cpal's default host.

use cpal::traits::{DeviceTrait, HostTrait};

use voice_processor_core::models::device::{DeviceInfo, DeviceKind};
use voice_processor_core::models::error::EngineError;

/// Rates checked against each device's supported ranges.
pub const COMMON_SAMPLE_RATES: [u32; 9] = [8000, 11025, 16000, 22050, 32000, 44100, 48000, 88200, 96000];

/// Lists and resolves input devices on the default host.
pub struct DeviceEnumerator {
    host: cpal::Host,
}

impl DeviceEnumerator {
    pub fn new() -> Self {
        Self {
            host: cpal::default_host(),
        }
    }

    /// All input devices with the common rates each supports natively.
    pub fn list_input_devices(&self) -> Result<Vec<DeviceInfo>, EngineError> {
        let default_name = self.default_input_device_name();
        let devices = self
            .host
            .input_devices()
            .map_err(|e| EngineError::DeviceUnavailable(format!("failed to list input devices: {}", e)))?;

        Ok(devices
            .map(|device| {
                let name = device.name().unwrap_or_else(|_| "Unknown".to_string());
                let is_default = default_name.as_deref() == Some(name.as_str());
                describe(&name, is_default, supported_rates(&device))
            })
            .collect())
    }

    pub fn default_input_device_name(&self) -> Option<String> {
        self.host.default_input_device().and_then(|d| d.name().ok())
    }

    /// The named input device, or the host default when `name` is `None`.
    pub fn find_input_device(&self, name: Option<&str>) -> Option<cpal::Device> {
        match name {
            Some(name) => self
                .host
                .input_devices()
                .ok()?
                .find(|d| d.name().map(|n| n == name).unwrap_or(false)),
            None => self.host.default_input_device(),
        }
    }

    pub fn default_output_device_name(&self) -> Option<String> {
        self.host.default_output_device().and_then(|d| d.name().ok())
    }

    /// The named output device, or the host default when `name` is `None`.
    pub fn find_output_device(&self, name: Option<&str>) -> Option<cpal::Device> {
        match name {
            Some(name) => self
                .host
                .output_devices()
                .ok()?
                .find(|d| d.name().map(|n| n == name).unwrap_or(false)),
            None => self.host.default_output_device(),
        }
    }
}

impl Default for DeviceEnumerator {
    fn default() -> Self {
        Self::new()
    }
}

pub(crate) fn describe(name: &str, is_default: bool, supported_sample_rates: Vec<u32>) -> DeviceInfo {
    DeviceInfo {
        id: format!("cpal:{}", name),
        name: name.to_string(),
        kind: DeviceKind::Hardware,
        is_default,
        supported_sample_rates,
    }
}

/// Common rates that fall inside any of the device's input config ranges.
pub fn supported_rates(device: &cpal::Device) -> Vec<u32> {
    match device.supported_input_configs() {
        Ok(configs) => rates_within(configs.map(|r| (r.min_sample_rate().0, r.max_sample_rate().0))),
        Err(_) => Vec::new(),
    }
}

/// Common rates that fall inside any of the device's output config ranges.
pub fn supported_output_rates(device: &cpal::Device) -> Vec<u32> {
    match device.supported_output_configs() {
        Ok(configs) => rates_within(configs.map(|r| (r.min_sample_rate().0, r.max_sample_rate().0))),
        Err(_) => Vec::new(),
    }
}

fn rates_within(ranges: impl Iterator<Item = (u32, u32)>) -> Vec<u32> {
    let ranges: Vec<(u32, u32)> = ranges.collect();
    COMMON_SAMPLE_RATES
        .iter()
        .copied()
        .filter(|rate| ranges.iter().any(|(min, max)| min <= rate && rate <= max))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rates_within_filters_common_rates() {
        let rates = rates_within([(16000, 16000), (44100, 48000)].into_iter());
        assert_eq!(rates, vec![16000, 44100, 48000]);
        assert!(rates_within(std::iter::empty()).is_empty());
    }

    #[test]
    fn describe_marks_hardware_device() {
        let info = describe("USB Mic", true, vec![48000]);
        assert_eq!(info.id, "cpal:USB Mic");
        assert_eq!(info.kind, DeviceKind::Hardware);
        assert!(info.is_default);
    }
}

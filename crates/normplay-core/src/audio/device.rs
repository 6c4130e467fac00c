//! Output device enumeration
//!
//! Devices are collected from every available cpal host (ALSA, JACK,
//! PulseAudio, CoreAudio, WASAPI, ...) and identified by name plus host.

use cpal::traits::{DeviceTrait, HostTrait};
use cpal::{Host, HostId};

use super::config::DeviceId;
use super::error::{AudioError, AudioResult};

/// Common rates probed against each device's supported ranges
const PROBED_SAMPLE_RATES: [u32; 8] = [22050, 32000, 44100, 48000, 88200, 96000, 176400, 192000];

/// Human-readable name for a host ID
pub(crate) fn host_name(host_id: HostId) -> String {
    let name = format!("{:?}", host_id);
    match name.as_str() {
        "Alsa" => "ALSA".to_string(),
        "Jack" => "JACK".to_string(),
        "Wasapi" => "WASAPI".to_string(),
        _ => name,
    }
}

fn host_by_name(name: &str) -> Option<Host> {
    cpal::available_hosts()
        .into_iter()
        .find(|&id| host_name(id) == name)
        .and_then(|id| cpal::host_from_id(id).ok())
}

/// An output device as offered to the user
#[derive(Debug, Clone, PartialEq)]
pub struct OutputDevice {
    /// Identifier for configuration and `set_output_device`
    pub id: DeviceId,
    /// Whether this is the system default device for its host
    pub is_default: bool,
    /// Common sample rates the device accepts
    pub sample_rates: Vec<u32>,
    /// Maximum output channels
    pub max_channels: u16,
}

impl std::fmt::Display for OutputDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.id)?;
        if self.is_default {
            write!(f, " (default)")?;
        }
        Ok(())
    }
}

/// All output devices from all hosts, default devices first
pub fn list_output_devices() -> AudioResult<Vec<OutputDevice>> {
    let mut devices: Vec<OutputDevice> = Vec::new();
    let hosts = cpal::available_hosts();

    for &host_id in &hosts {
        let host = match cpal::host_from_id(host_id) {
            Ok(h) => h,
            Err(e) => {
                log::debug!("Could not initialize host {:?}: {}", host_id, e);
                continue;
            }
        };

        let host_label = host_name(host_id);
        let default_name = host.default_output_device().and_then(|d| d.name().ok());

        let outputs = match host.output_devices() {
            Ok(d) => d,
            Err(e) => {
                log::debug!("Could not enumerate devices for {:?}: {}", host_id, e);
                continue;
            }
        };

        for device in outputs {
            let Ok(name) = device.name() else { continue };
            let Ok(configs) = device.supported_output_configs() else { continue };
            let configs: Vec<_> = configs.collect();
            if configs.is_empty() {
                continue;
            }

            let mut sample_rates: Vec<u32> = PROBED_SAMPLE_RATES
                .into_iter()
                .filter(|&rate| {
                    configs
                        .iter()
                        .any(|c| rate >= c.min_sample_rate().0 && rate <= c.max_sample_rate().0)
                })
                .collect();
            sample_rates.dedup();

            devices.push(OutputDevice {
                is_default: default_name.as_ref() == Some(&name),
                id: DeviceId::with_host(&name, &host_label),
                sample_rates,
                max_channels: configs.iter().map(|c| c.channels()).max().unwrap_or(0),
            });
        }
    }

    if devices.is_empty() {
        return Err(AudioError::NoDevices);
    }

    devices.sort_by(|a, b| {
        b.is_default
            .cmp(&a.is_default)
            .then_with(|| a.id.host.cmp(&b.id.host))
            .then_with(|| a.id.name.cmp(&b.id.name))
    });

    log::info!("Enumerated {} output devices from {} hosts", devices.len(), hosts.len());
    Ok(devices)
}

/// Default output device of the default host
pub fn default_output_device() -> AudioResult<DeviceId> {
    let host = cpal::default_host();
    let device = host
        .default_output_device()
        .ok_or_else(|| AudioError::NoDefaultDevice("No default output device".to_string()))?;
    let name = device
        .name()
        .map_err(|e| AudioError::NoDefaultDevice(e.to_string()))?;
    Ok(DeviceId::with_host(&name, &host_name(host.id())))
}

/// Resolve a device ID to a cpal device
///
/// Searches the named host when the ID carries one, otherwise every host.
pub(crate) fn find_device_by_id(id: &DeviceId) -> AudioResult<cpal::Device> {
    if let Some(host) = id.host.as_deref().and_then(host_by_name) {
        return host
            .output_devices()
            .map_err(|e| AudioError::ConfigError(e.to_string()))?
            .find(|d| d.name().ok().as_ref() == Some(&id.name))
            .ok_or_else(|| AudioError::DeviceNotFound(id.display_label()));
    }

    cpal::available_hosts()
        .into_iter()
        .filter_map(|host_id| cpal::host_from_id(host_id).ok())
        .filter_map(|host| host.output_devices().ok())
        .flatten()
        .find(|d| d.name().ok().as_ref() == Some(&id.name))
        .ok_or_else(|| AudioError::DeviceNotFound(id.display_label()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_enumeration() {
        // Machines without audio hardware (CI) have no devices
        match list_output_devices() {
            Ok(devices) => {
                for device in &devices {
                    assert!(device.id.host.is_some());
                    println!("  - {} ({} ch, {:?})", device, device.max_channels, device.sample_rates);
                }
                // Default devices sort first
                let first_plain = devices.iter().position(|d| !d.is_default).unwrap_or(devices.len());
                assert!(devices[first_plain..].iter().all(|d| !d.is_default));
            }
            Err(AudioError::NoDevices) => println!("No audio devices available"),
            Err(e) => println!("Error enumerating devices: {}", e),
        }
    }

    #[test]
    fn test_unknown_device_is_not_found() {
        let id = DeviceId::new("normplay-test-device-that-does-not-exist");
        assert!(find_device_by_id(&id).is_err());
    }
}

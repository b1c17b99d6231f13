//! Audio device enumeration and selection

use cpal::traits::{DeviceTrait, HostTrait};
use cpal::{SampleFormat, SampleRate, StreamConfig, SupportedStreamConfigRange};

use crate::config::SessionConfig;
use crate::error::AudioError;

/// Stream direction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Input,
    Output,
}

impl Direction {
    fn label(self) -> &'static str {
        match self {
            Self::Input => "input",
            Self::Output => "output",
        }
    }
}

/// Device summary for `--list-devices`
#[derive(Debug, Clone)]
pub struct AudioDeviceInfo {
    pub name: String,
    pub is_input: bool,
    pub is_output: bool,
    pub is_default: bool,
    pub sample_rates: Vec<u32>,
    pub channels: Vec<u16>,
}

/// List all available audio devices
pub fn list_devices() -> Vec<AudioDeviceInfo> {
    let host = cpal::default_host();
    let mut devices: Vec<AudioDeviceInfo> = Vec::new();

    let default_input_name = host.default_input_device().and_then(|d| d.name().ok());
    let default_output_name = host.default_output_device().and_then(|d| d.name().ok());

    if let Ok(input_devices) = host.input_devices() {
        for device in input_devices {
            if let Ok(name) = device.name() {
                let (sample_rates, channels) = device_capabilities(&device, Direction::Input);
                devices.push(AudioDeviceInfo {
                    is_default: default_input_name.as_ref() == Some(&name),
                    name,
                    is_input: true,
                    is_output: false,
                    sample_rates,
                    channels,
                });
            }
        }
    }

    if let Ok(output_devices) = host.output_devices() {
        for device in output_devices {
            if let Ok(name) = device.name() {
                let is_default = default_output_name.as_ref() == Some(&name);

                // Duplex devices show up once
                if let Some(existing) = devices.iter_mut().find(|d| d.name == name) {
                    existing.is_output = true;
                    existing.is_default |= is_default;
                    continue;
                }

                let (sample_rates, channels) = device_capabilities(&device, Direction::Output);
                devices.push(AudioDeviceInfo {
                    name,
                    is_input: false,
                    is_output: true,
                    is_default,
                    sample_rates,
                    channels,
                });
            }
        }
    }

    devices
}

fn supported_configs(
    device: &cpal::Device,
    direction: Direction,
) -> Result<Vec<SupportedStreamConfigRange>, AudioError> {
    let configs = match direction {
        Direction::Input => device.supported_input_configs().map(|iter| iter.collect()),
        Direction::Output => device.supported_output_configs().map(|iter| iter.collect()),
    };
    configs.map_err(|e| AudioError::CpalError(e.to_string()))
}

/// Common sample rates and channel counts a device accepts
fn device_capabilities(device: &cpal::Device, direction: Direction) -> (Vec<u32>, Vec<u16>) {
    let mut sample_rates = Vec::new();
    let mut channels = Vec::new();

    for config in supported_configs(device, direction).unwrap_or_default() {
        for rate_val in [8000u32, 16000, 22050, 32000, 44100, 48000, 96000] {
            let rate = SampleRate(rate_val);
            if rate >= config.min_sample_rate()
                && rate <= config.max_sample_rate()
                && !sample_rates.contains(&rate_val)
            {
                sample_rates.push(rate_val);
            }
        }
        if !channels.contains(&config.channels()) {
            channels.push(config.channels());
        }
    }

    sample_rates.sort_unstable();
    channels.sort_unstable();
    (sample_rates, channels)
}

/// Named device, or the host default when `name` is `None`
pub fn find_device(direction: Direction, name: Option<&str>) -> Result<cpal::Device, AudioError> {
    let host = cpal::default_host();

    let Some(name) = name else {
        let device = match direction {
            Direction::Input => host.default_input_device(),
            Direction::Output => host.default_output_device(),
        };
        return device.ok_or_else(|| {
            AudioError::DeviceNotFound(format!("No default {} device", direction.label()))
        });
    };

    let devices = match direction {
        Direction::Input => host.input_devices(),
        Direction::Output => host.output_devices(),
    }
    .map_err(|e| AudioError::CpalError(e.to_string()))?;

    for device in devices {
        if device.name().map(|n| n == name).unwrap_or(false) {
            return Ok(device);
        }
    }

    Err(AudioError::DeviceNotFound(format!("{} device '{}'", direction.label(), name)))
}

/// Prefer native PCM16 when the device offers it at the session's format,
/// otherwise take what the device supports.
pub fn pick_sample_format(
    device: &cpal::Device,
    direction: Direction,
    config: &SessionConfig,
) -> Result<SampleFormat, AudioError> {
    let rate = SampleRate(config.sample_rate);
    let ranges = supported_configs(device, direction)?;
    let fits = |range: &SupportedStreamConfigRange| {
        range.channels() == config.channels
            && range.min_sample_rate() <= rate
            && rate <= range.max_sample_rate()
    };

    if ranges
        .iter()
        .any(|r| fits(r) && r.sample_format() == SampleFormat::I16)
    {
        return Ok(SampleFormat::I16);
    }
    if let Some(range) = ranges.iter().find(|r| fits(r)) {
        return Ok(range.sample_format());
    }

    let default = match direction {
        Direction::Input => device.default_input_config(),
        Direction::Output => device.default_output_config(),
    }
    .map_err(|e| AudioError::CpalError(e.to_string()))?;
    tracing::warn!(
        "{} device has no {} Hz / {} channel config, trying its default format {:?}",
        direction.label(),
        config.sample_rate,
        config.channels,
        default.sample_format()
    );
    Ok(default.sample_format())
}

/// cpal stream settings for the session; `fixed` requests the exact block size
pub fn stream_config(config: &SessionConfig, fixed: bool) -> StreamConfig {
    StreamConfig {
        channels: config.channels,
        sample_rate: SampleRate(config.sample_rate),
        buffer_size: if fixed {
            cpal::BufferSize::Fixed(config.block_size)
        } else {
            cpal::BufferSize::Default
        },
    }
}

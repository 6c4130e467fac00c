//! CPAL output backend
//!
//! One f32 stream per bound track rate. The stream's data callback owns the
//! [`Transport`] and calls [`Transport::render`] once per device period.

use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::{BufferSize as CpalBufferSize, SampleFormat, SampleRate, Stream, StreamConfig};

use super::backend::{AudioBackend, OutputStream, StreamSpec};
use super::config::{BufferSize, DeviceId};
use super::device::{default_output_device, find_device_by_id, list_output_devices, OutputDevice};
use super::error::{AudioError, AudioResult};
use crate::engine::Transport;

/// Backend over the system's cpal hosts
#[derive(Debug, Default)]
pub struct CpalBackend;

impl CpalBackend {
    pub fn new() -> Self {
        Self
    }
}

/// A running (or paused) cpal stream
struct CpalStream {
    stream: Stream,
    sample_rate: u32,
}

impl OutputStream for CpalStream {
    fn play(&mut self) -> AudioResult<()> {
        self.stream
            .play()
            .map_err(|e| AudioError::StreamPlayError(e.to_string()))
    }

    fn pause(&mut self) -> AudioResult<()> {
        self.stream
            .pause()
            .map_err(|e| AudioError::StreamPauseError(e.to_string()))
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }
}

fn buffer_size_to_cpal(size: BufferSize) -> CpalBufferSize {
    match size.as_frames() {
        Some(frames) => CpalBufferSize::Fixed(frames),
        None => CpalBufferSize::Default,
    }
}

/// Pick an f32 output channel count that runs at exactly `spec.sample_rate`
///
/// Prefers the track's channel count, then stereo or wider, then anything.
/// The rate is never substituted: playing a track at another rate would
/// change its speed and pitch.
fn select_channels(device: &cpal::Device, device_name: &str, spec: &StreamSpec) -> AudioResult<u16> {
    let supported: Vec<_> = device
        .supported_output_configs()
        .map_err(|e| AudioError::ConfigError(e.to_string()))?
        .collect();

    if supported.is_empty() {
        return Err(AudioError::ConfigError("No supported output configurations".to_string()));
    }

    let f32_configs: Vec<_> = supported
        .iter()
        .filter(|c| c.sample_format() == SampleFormat::F32)
        .collect();
    if f32_configs.is_empty() {
        return Err(AudioError::UnsupportedFormat(format!("{} has no f32 output", device_name)));
    }

    let at_rate: Vec<_> = f32_configs
        .into_iter()
        .filter(|c| spec.sample_rate >= c.min_sample_rate().0 && spec.sample_rate <= c.max_sample_rate().0)
        .collect();

    at_rate
        .iter()
        .find(|c| c.channels() == spec.channels)
        .or_else(|| at_rate.iter().find(|c| c.channels() >= 2))
        .or_else(|| at_rate.first())
        .map(|c| c.channels())
        .ok_or_else(|| AudioError::UnsupportedSampleRate {
            device: device_name.to_string(),
            sample_rate: spec.sample_rate,
        })
}

impl AudioBackend for CpalBackend {
    fn default_device(&self) -> AudioResult<DeviceId> {
        default_output_device()
    }

    fn output_devices(&self) -> AudioResult<Vec<OutputDevice>> {
        list_output_devices()
    }

    fn open(
        &mut self,
        device_id: &DeviceId,
        spec: StreamSpec,
        mut transport: Transport,
    ) -> AudioResult<Box<dyn OutputStream>> {
        let device = find_device_by_id(device_id)?;
        let device_name = device.name().unwrap_or_else(|_| device_id.name.clone());

        let channels = select_channels(&device, &device_name, &spec)?;
        let config = StreamConfig {
            channels,
            sample_rate: SampleRate(spec.sample_rate),
            buffer_size: buffer_size_to_cpal(spec.buffer_size),
        };

        let out_channels = channels as usize;
        let stream = device
            .build_output_stream(
                &config,
                move |data: &mut [f32], _info: &cpal::OutputCallbackInfo| {
                    transport.render(data, out_channels);
                },
                move |err| {
                    log::error!("Output stream error: {}", err);
                },
                None,
            )
            .map_err(|e| AudioError::StreamBuildError(e.to_string()))?;

        // Some hosts start streams on creation
        stream
            .pause()
            .map_err(|e| AudioError::StreamPauseError(e.to_string()))?;

        match spec.buffer_size.latency_ms(spec.sample_rate) {
            Some(latency) => log::info!(
                "Opened output on {}: {} ch @ {}Hz, ~{:.1}ms buffer",
                device_name,
                channels,
                spec.sample_rate,
                latency
            ),
            None => log::info!(
                "Opened output on {}: {} ch @ {}Hz, host buffer",
                device_name,
                channels,
                spec.sample_rate
            ),
        }

        Ok(Box::new(CpalStream {
            stream,
            sample_rate: spec.sample_rate,
        }))
    }
}

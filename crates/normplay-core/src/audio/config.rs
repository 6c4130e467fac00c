//! Output device selection and buffer settings

use serde::{Deserialize, Serialize};

/// Smallest fixed buffer accepted (frames)
pub const MIN_BUFFER_SIZE: u32 = 64;

/// Largest fixed buffer accepted (frames)
pub const MAX_BUFFER_SIZE: u32 = 8192;

/// Preferred buffer size for output streams
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BufferSize {
    /// Let the host choose
    #[default]
    Default,
    /// Request a specific size in frames, clamped to
    /// `MIN_BUFFER_SIZE..=MAX_BUFFER_SIZE`
    Fixed(u32),
}

impl BufferSize {
    /// Requested size in frames, or None for the host default
    pub fn as_frames(&self) -> Option<u32> {
        match self {
            BufferSize::Default => None,
            BufferSize::Fixed(frames) => Some((*frames).clamp(MIN_BUFFER_SIZE, MAX_BUFFER_SIZE)),
        }
    }

    /// Callback period in milliseconds at the given rate
    pub fn latency_ms(&self, sample_rate: u32) -> Option<f32> {
        self.as_frames()
            .map(|frames| (frames as f32 / sample_rate as f32) * 1000.0)
    }
}

/// Audio device identifier
///
/// A device name plus the host backend it belongs to (ALSA, JACK,
/// CoreAudio, ...), since the same name may appear under several hosts.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeviceId {
    /// Device name as reported by the system
    pub name: String,
    /// Host backend; None matches the name on any host
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
}

impl DeviceId {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            host: None,
        }
    }

    pub fn with_host(name: &str, host: &str) -> Self {
        Self {
            name: name.to_string(),
            host: Some(host.to_string()),
        }
    }

    /// Whether `other` names the same device
    ///
    /// A missing host on either side matches any host.
    pub fn matches(&self, other: &DeviceId) -> bool {
        self.name == other.name
            && match (&self.host, &other.host) {
                (Some(a), Some(b)) => a == b,
                _ => true,
            }
    }

    /// Display label including the host when known
    pub fn display_label(&self) -> String {
        match &self.host {
            Some(host) => format!("[{}] {}", host, self.name),
            None => self.name.clone(),
        }
    }
}

impl std::fmt::Display for DeviceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.display_label())
    }
}

/// Output settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Output device (None = system default)
    pub output_device: Option<DeviceId>,

    /// Preferred buffer size
    pub buffer_size: BufferSize,
}

impl AudioConfig {
    /// Pin output to `device` instead of the system default
    pub fn with_output_device(mut self, device: DeviceId) -> Self {
        self.output_device = Some(device);
        self
    }

    /// Request a fixed period of `frames` (clamped when the stream opens)
    pub fn with_buffer_frames(mut self, frames: u32) -> Self {
        self.buffer_size = BufferSize::Fixed(frames);
        self
    }
}

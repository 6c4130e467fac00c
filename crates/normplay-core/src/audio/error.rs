//! Output device error types

use thiserror::Error;

/// Errors opening or driving an output stream
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AudioError {
    /// No audio devices available
    #[error("No audio output devices found")]
    NoDevices,

    /// Failed to get default device
    #[error("Failed to get default audio device: {0}")]
    NoDefaultDevice(String),

    /// Device not found
    #[error("Audio device not found: {0}")]
    DeviceNotFound(String),

    /// Failed to query device configuration
    #[error("Failed to get device config: {0}")]
    ConfigError(String),

    /// Device cannot run at the track's sample rate
    #[error("Device '{device}' does not support {sample_rate}Hz output")]
    UnsupportedSampleRate { device: String, sample_rate: u32 },

    /// Device offers no f32 output
    #[error("Unsupported sample format: {0}")]
    UnsupportedFormat(String),

    /// Failed to build audio stream
    #[error("Failed to build audio stream: {0}")]
    StreamBuildError(String),

    /// Failed to start stream
    #[error("Failed to start audio stream: {0}")]
    StreamPlayError(String),

    /// Failed to pause stream
    #[error("Failed to pause audio stream: {0}")]
    StreamPauseError(String),
}

/// Result type for audio operations
pub type AudioResult<T> = Result<T, AudioError>;

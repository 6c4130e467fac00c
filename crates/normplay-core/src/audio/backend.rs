//! Output backend abstraction
//!
//! The engine never talks to cpal directly. It asks an [`AudioBackend`] for
//! a stream at a given rate and hands over the [`Transport`] that the
//! stream's callback drives. Dropping the returned [`OutputStream`] closes
//! the stream; once `drop` returns, the callback no longer runs.

use super::config::{BufferSize, DeviceId};
use super::device::OutputDevice;
use super::error::AudioResult;
use crate::engine::Transport;

/// Parameters of an output stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamSpec {
    /// Must equal the bound track's sample rate
    pub sample_rate: u32,
    /// Preferred channel count (the track's); the device may differ
    pub channels: u16,
    pub buffer_size: BufferSize,
}

/// An open output stream
///
/// Streams are created paused.
pub trait OutputStream {
    /// Start (or resume) invoking the callback
    fn play(&mut self) -> AudioResult<()>;

    /// Stop invoking the callback
    fn pause(&mut self) -> AudioResult<()>;

    /// Rate the stream was opened at
    fn sample_rate(&self) -> u32;
}

/// Source of output devices and streams
pub trait AudioBackend {
    /// Device used when none is configured
    fn default_device(&self) -> AudioResult<DeviceId>;

    /// Devices a user may switch to
    fn output_devices(&self) -> AudioResult<Vec<OutputDevice>>;

    /// Open a paused stream on `device` whose callback renders `transport`
    fn open(
        &mut self,
        device: &DeviceId,
        spec: StreamSpec,
        transport: Transport,
    ) -> AudioResult<Box<dyn OutputStream>>;
}

//! Audio output
//!
//! - **Backend trait**: [`AudioBackend`] opens paused [`OutputStream`]s at a
//!   requested rate; the engine is generic over it
//! - **CPAL**: [`CpalBackend`], devices from every available host
//! - **Devices**: enumeration and [`DeviceId`] matching
//!
//! The callback side of a stream is [`crate::engine::Transport`], which the
//! backend moves into the stream's data callback.

mod backend;
mod config;
mod cpal_backend;
mod device;
mod error;

#[cfg(test)]
pub(crate) mod scripted;

pub use backend::{AudioBackend, OutputStream, StreamSpec};
pub use config::{AudioConfig, BufferSize, DeviceId, MAX_BUFFER_SIZE, MIN_BUFFER_SIZE};
pub use cpal_backend::CpalBackend;
pub use device::{default_output_device, list_output_devices, OutputDevice};
pub use error::{AudioError, AudioResult};

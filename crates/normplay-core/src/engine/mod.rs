//! Playback engine - transport, command queue, control thread
//!
//! - Transport: the real-time half, moved into the output stream callback
//! - Commands: lock-free queue carrying track views to the callback
//! - PlaybackEngine: the control-thread API tying tracks to the device

mod command;
mod engine;
mod gc;
mod transport;

pub use command::{command_channel, CommandSender, TransportCommand, COMMAND_QUEUE_CAPACITY};
pub use engine::*;
pub use gc::gc_handle;
pub use transport::{PlayCursor, Transport, TransportAtomics};

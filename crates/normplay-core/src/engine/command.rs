//! Lock-free command queue from the control thread to the audio callback
//!
//! Only track binding travels through the queue; cursor, mode and transport
//! state are plain atomics (see [`super::TransportAtomics`]). The queue is
//! an `rtrb` SPSC ringbuffer allocated once per stream, so pushing and
//! popping never allocate or block.

use crate::track::TrackViews;

/// Capacity of the per-stream command queue
///
/// When it is full (e.g. many track switches while paused) the engine
/// rebuilds the stream instead of waiting.
pub const COMMAND_QUEUE_CAPACITY: usize = 32;

/// Commands consumed by the callback at the start of each period
pub enum TransportCommand {
    /// Stream a different track from now on
    ///
    /// `binding` identifies this bind; the callback only renders while the
    /// shared cursor carries the same id.
    Bind { views: TrackViews, binding: u8 },

    /// Replace the views of the current binding (its mixing view changed)
    ///
    /// Ignored if `binding` is no longer current.
    Refresh { views: TrackViews, binding: u8 },
}

impl std::fmt::Debug for TransportCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransportCommand::Bind { binding, .. } => write!(f, "Bind({})", binding),
            TransportCommand::Refresh { binding, .. } => write!(f, "Refresh({})", binding),
        }
    }
}

/// Control-side end of a command queue
pub struct CommandSender {
    producer: rtrb::Producer<TransportCommand>,
}

impl CommandSender {
    /// Queue a command without blocking
    ///
    /// Returns the command back if the queue is full.
    pub fn send(&mut self, cmd: TransportCommand) -> Result<(), TransportCommand> {
        self.producer.push(cmd).map_err(|e| match e {
            rtrb::PushError::Full(value) => value,
        })
    }

    /// Whether the next `send` will succeed
    ///
    /// Only this sender pushes, so the answer holds until it sends.
    pub fn has_room(&self) -> bool {
        self.producer.slots() > 0
    }
}

/// Create a command queue
pub fn command_channel() -> (CommandSender, rtrb::Consumer<TransportCommand>) {
    let (producer, consumer) = rtrb::RingBuffer::new(COMMAND_QUEUE_CAPACITY);
    (CommandSender { producer }, consumer)
}

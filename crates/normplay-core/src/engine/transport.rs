//! Transport state shared between the control thread and the audio callback
//!
//! ```text
//! ┌──────────────────┐   Bind / Refresh    ┌─────────────────────┐
//! │  PlaybackEngine  │───(rtrb SPSC)──────►│     Transport       │
//! │ (control thread) │                     │  (audio callback)   │
//! └────────┬─────────┘                     └──────────┬──────────┘
//!          │ store / fetch_update                     │ compare_exchange
//!          ▼                                          ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │ TransportAtomics: cursor, state, mode, length, fade, end flag   │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The cursor packs the frame index with the id of the binding it belongs
//! to and a generation counter bumped on every control-side write. The
//! callback only commits an advance if the cursor is still the value it
//! read, so a seek or stop issued mid-period is never overwritten.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;

use super::command::TransportCommand;
use crate::track::TrackViews;
use crate::types::{LoudnessMode, PlayState, Sample};

const FRAME_BITS: u32 = 48;
const FRAME_MASK: u64 = (1 << FRAME_BITS) - 1;
const GENERATION_SHIFT: u32 = FRAME_BITS;
const BINDING_SHIFT: u32 = FRAME_BITS + 8;

/// Snapshot of the packed play cursor: `[binding:8][generation:8][frame:48]`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlayCursor(u64);

impl PlayCursor {
    fn new(binding: u8, generation: u8, frame: u64) -> Self {
        Self(
            ((binding as u64) << BINDING_SHIFT)
                | ((generation as u64) << GENERATION_SHIFT)
                | (frame & FRAME_MASK),
        )
    }

    /// Id of the track binding this position refers to
    #[inline]
    pub fn binding(self) -> u8 {
        (self.0 >> BINDING_SHIFT) as u8
    }

    #[inline]
    pub fn generation(self) -> u8 {
        (self.0 >> GENERATION_SHIFT) as u8
    }

    /// Frame index into the bound track
    #[inline]
    pub fn frame(self) -> u64 {
        self.0 & FRAME_MASK
    }

    fn with_frame(self, frame: u64) -> Self {
        Self::new(self.binding(), self.generation(), frame)
    }
}

/// Lock-free playback state
///
/// The UI reads everything here without locks. The control thread owns
/// every write except cursor advances and the end-of-track transition,
/// which come from the callback.
pub struct TransportAtomics {
    cursor: AtomicU64,
    /// Frames in the bound track
    length: AtomicU64,
    /// Sample rate of the bound track
    sample_rate: AtomicU32,
    state: AtomicU8,
    mode: AtomicU8,
    fade_request: AtomicBool,
    ended: AtomicBool,
}

impl TransportAtomics {
    pub fn new(mode: LoudnessMode) -> Self {
        Self {
            cursor: AtomicU64::new(0),
            length: AtomicU64::new(0),
            sample_rate: AtomicU32::new(0),
            state: AtomicU8::new(PlayState::Stopped as u8),
            mode: AtomicU8::new(mode as u8),
            fade_request: AtomicBool::new(false),
            ended: AtomicBool::new(false),
        }
    }

    /// Current frame position
    #[inline]
    pub fn position(&self) -> u64 {
        self.cursor().frame()
    }

    #[inline]
    pub fn length(&self) -> u64 {
        self.length.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn state(&self) -> PlayState {
        PlayState::from_u8(self.state.load(Ordering::Acquire))
    }

    #[inline]
    pub fn is_playing(&self) -> bool {
        self.state() == PlayState::Playing
    }

    #[inline]
    pub fn mode(&self) -> LoudnessMode {
        LoudnessMode::from_u8(self.mode.load(Ordering::Relaxed))
    }

    /// Position as a fraction of the track, 0.0 when nothing is bound
    pub fn playhead_ratio(&self) -> f64 {
        let length = self.length();
        if length == 0 {
            return 0.0;
        }
        (self.position() as f64 / length as f64).clamp(0.0, 1.0)
    }

    /// Position in seconds, 0.0 when nothing is bound
    pub fn playhead_secs(&self) -> f64 {
        match self.sample_rate() {
            0 => 0.0,
            rate => self.position() as f64 / rate as f64,
        }
    }

    #[inline]
    pub(crate) fn cursor(&self) -> PlayCursor {
        PlayCursor(self.cursor.load(Ordering::Acquire))
    }

    /// Point the cursor at `frame` of `binding` (control thread)
    ///
    /// Returns the cursor as stored, with its generation bumped.
    pub(crate) fn set_cursor(&self, binding: u8, frame: u64) -> PlayCursor {
        self.update_cursor(|current| PlayCursor::new(binding, current.generation().wrapping_add(1), frame))
    }

    /// Move the cursor within the current binding (control thread)
    pub(crate) fn reposition(&self, frame: u64) -> PlayCursor {
        self.update_cursor(|current| {
            PlayCursor::new(current.binding(), current.generation().wrapping_add(1), frame)
        })
    }

    /// Replace the cursor, retrying over concurrent callback advances
    fn update_cursor(&self, update: impl Fn(PlayCursor) -> PlayCursor) -> PlayCursor {
        // The closure never declines, so both arms carry the value it replaced
        let previous = match self
            .cursor
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |raw| Some(update(PlayCursor(raw)).0))
        {
            Ok(raw) | Err(raw) => raw,
        };
        update(PlayCursor(previous))
    }

    /// Commit a callback advance; fails if the control thread moved the cursor
    #[inline]
    fn advance(&self, observed: PlayCursor, frame: u64) -> bool {
        self.cursor
            .compare_exchange(
                observed.0,
                observed.with_frame(frame).0,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }

    pub(crate) fn set_track(&self, length: u64, sample_rate: u32) {
        self.length.store(length, Ordering::Relaxed);
        self.sample_rate.store(sample_rate, Ordering::Relaxed);
    }

    pub(crate) fn set_state(&self, state: PlayState) {
        self.state.store(state as u8, Ordering::Release);
    }

    pub(crate) fn set_mode(&self, mode: LoudnessMode) {
        self.mode.store(mode as u8, Ordering::Relaxed);
    }

    /// Ask the callback to restart its fade-in
    pub(crate) fn request_fade(&self) {
        self.fade_request.store(true, Ordering::Release);
    }

    fn take_fade_request(&self) -> bool {
        self.fade_request.swap(false, Ordering::AcqRel)
    }

    /// Callback-side end of track: Playing -> Stopped
    fn end_of_track(&self) {
        if self
            .state
            .compare_exchange(
                PlayState::Playing as u8,
                PlayState::Stopped as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
        {
            self.ended.store(true, Ordering::Release);
        }
    }

    /// Whether the callback stopped at end of track since the last call
    pub(crate) fn take_ended(&self) -> bool {
        self.ended.swap(false, Ordering::AcqRel)
    }
}

/// Audio-thread half of a stream
///
/// Owned by the output callback. Never allocates, locks or logs.
pub struct Transport {
    atomics: Arc<TransportAtomics>,
    commands: rtrb::Consumer<TransportCommand>,
    views: TrackViews,
    binding: u8,
    fade_in_frames: usize,
    fade_pos: usize,
}

impl Transport {
    pub(crate) fn new(
        atomics: Arc<TransportAtomics>,
        commands: rtrb::Consumer<TransportCommand>,
        views: TrackViews,
        binding: u8,
        fade_in_frames: usize,
    ) -> Self {
        Self {
            atomics,
            commands,
            views,
            binding,
            fade_in_frames,
            fade_pos: 0,
        }
    }

    #[cfg(test)]
    pub(crate) fn atomics(&self) -> &TransportAtomics {
        &self.atomics
    }

    /// Channel count of the bound track
    pub fn track_channels(&self) -> usize {
        self.views.channels()
    }

    /// Fill one device period
    ///
    /// `out` is interleaved with `out_channels` channels. Every sample of
    /// `out` is written on every call.
    pub fn render(&mut self, out: &mut [Sample], out_channels: usize) {
        self.process_commands();
        if self.atomics.take_fade_request() {
            self.fade_pos = 0;
        }

        let out_channels = out_channels.max(1);
        let requested = out.len() / out_channels;

        if self.atomics.state() != PlayState::Playing {
            out.fill(0.0);
            return;
        }

        let observed = self.atomics.cursor();
        if observed.binding() != self.binding {
            // A newer bind is still in the queue
            out.fill(0.0);
            return;
        }

        let mode = self.atomics.mode();
        let start = observed.frame() as usize;
        let track_channels = self.views.channels();
        let total = self.views.frames();
        let slice = self.views.slice(mode, start, start.saturating_add(requested));

        if slice.is_empty() {
            out.fill(0.0);
            if self.atomics.advance(observed, 0) {
                self.atomics.end_of_track();
            }
            return;
        }

        let frames = slice.len() / track_channels;
        let (written, rest) = out.split_at_mut(frames * out_channels);
        map_channels(slice, track_channels, written, out_channels);
        rest.fill(0.0);
        apply_fade(written, out_channels, &mut self.fade_pos, self.fade_in_frames);

        let next = start.saturating_add(requested).min(total);
        self.atomics.advance(observed, next as u64);
    }

    fn process_commands(&mut self) {
        while let Ok(cmd) = self.commands.pop() {
            match cmd {
                // Replaced views are handed to the collector thread on drop
                TransportCommand::Bind { views, binding } => {
                    self.views = views;
                    self.binding = binding;
                    self.fade_pos = 0;
                }
                TransportCommand::Refresh { views, binding } => {
                    if binding == self.binding {
                        self.views = views;
                    }
                }
            }
        }
    }
}

/// Copy whole frames from the track layout to the device layout
fn map_channels(src: &[Sample], src_channels: usize, dst: &mut [Sample], dst_channels: usize) {
    if src_channels == dst_channels {
        dst.copy_from_slice(src);
        return;
    }

    let shared = src_channels.min(dst_channels);
    for (in_frame, out_frame) in src
        .chunks_exact(src_channels)
        .zip(dst.chunks_exact_mut(dst_channels))
    {
        if src_channels == 1 {
            out_frame.fill(in_frame[0]);
        } else {
            out_frame[..shared].copy_from_slice(&in_frame[..shared]);
            out_frame[shared..].fill(0.0);
        }
    }
}

/// Linear 0..=1 ramp over the first `length` frames after a resume point
fn apply_fade(out: &mut [Sample], channels: usize, pos: &mut usize, length: usize) {
    if *pos >= length {
        return;
    }
    let span = length.saturating_sub(1).max(1) as Sample;
    for frame in out.chunks_exact_mut(channels) {
        if *pos >= length {
            break;
        }
        let gain = *pos as Sample / span;
        for sample in frame.iter_mut() {
            *sample *= gain;
        }
        *pos += 1;
    }
}

//! Playback engine - control-thread half of the player
//!
//! Owns the track set, the output stream and the current selection. All
//! methods run on the control thread; the audio callback only sees the
//! [`Transport`] moved into the stream and the shared [`TransportAtomics`].
//!
//! Streams are opened at the bound track's sample rate. Binding a track at
//! another rate (or switching device) pauses and drops the old stream
//! before the new one is built, so two callbacks never coexist.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use rayon::prelude::*;
use thiserror::Error;

use super::command::{command_channel, CommandSender, TransportCommand};
use super::transport::{Transport, TransportAtomics};
use crate::audio::{AudioBackend, AudioError, CpalBackend, DeviceId, OutputDevice, OutputStream, StreamSpec};
use crate::config::EngineConfig;
use crate::track::{DecodeError, Track, TrackSet, TrackViews};
use crate::types::{LoudnessMode, PlayState};

/// Engine operation errors
#[derive(Error, Debug)]
pub enum EngineError {
    /// Operation needs a track but none are loaded
    #[error("No tracks loaded")]
    EmptyTrackSet,

    /// Operation needs a selected track
    #[error("No track selected")]
    NoActiveTrack,

    #[error("Track index {index} out of range ({len} tracks)")]
    TrackIndexOutOfRange { index: usize, len: usize },

    /// Output device failed to open or reconfigure
    #[error("Output device error: {0}")]
    Device(#[from] AudioError),
}

pub type EngineResult<T> = Result<T, EngineError>;

/// Result of [`PlaybackEngine::select_track`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectOutcome {
    Changed,
    /// The track was already selected
    Unchanged,
}

/// Result of [`PlaybackEngine::set_output_device`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceOutcome {
    Switched,
    /// The device was already in use
    Unchanged,
}

/// Outcome of a batch load
#[derive(Debug, Default)]
pub struct LoadReport {
    /// Number of tracks added
    pub loaded: usize,
    /// Files that were skipped, with the reason
    pub failed: Vec<(PathBuf, DecodeError)>,
}

struct ActiveStream {
    handle: Box<dyn OutputStream>,
    commands: CommandSender,
}

/// Single-track player with three loudness views
pub struct PlaybackEngine<B: AudioBackend = CpalBackend> {
    backend: B,
    config: EngineConfig,
    tracks: TrackSet,
    active: Option<usize>,
    atomics: Arc<TransportAtomics>,
    stream: Option<ActiveStream>,
    output_device: DeviceId,
    clipping: bool,
    /// Id of the most recent bind, mirrored into the cursor
    binding: u8,
}

impl PlaybackEngine<CpalBackend> {
    /// Engine on the system's audio hosts
    pub fn new(config: EngineConfig) -> EngineResult<Self> {
        Self::with_backend(CpalBackend::new(), config)
    }
}

impl<B: AudioBackend> PlaybackEngine<B> {
    pub fn with_backend(backend: B, config: EngineConfig) -> EngineResult<Self> {
        let output_device = match config.audio.output_device.clone() {
            Some(id) => id,
            None => backend.default_device()?,
        };
        log::info!("Output device: {}", output_device);

        let mode = config.playback.default_mode;
        Ok(Self {
            tracks: TrackSet::new(config.loudness.mixing_step_lu),
            atomics: Arc::new(TransportAtomics::new(mode)),
            backend,
            config,
            active: None,
            stream: None,
            output_device,
            clipping: false,
            binding: 0,
        })
    }

    // ─────────────────────────────────────────────────────────────────────
    // Track set
    // ─────────────────────────────────────────────────────────────────────

    /// Decode and add files in parallel
    ///
    /// Files that fail to decode or measure are skipped and reported.
    /// Added tracks keep the input order; mixing convergence runs once.
    pub fn load_files<P>(&mut self, paths: &[P]) -> LoadReport
    where
        P: AsRef<Path> + Sync,
    {
        let target = self.config.loudness.mastering_target_lufs;
        let results: Vec<(PathBuf, Result<Track, DecodeError>)> = paths
            .par_iter()
            .map(|path| {
                let path = path.as_ref();
                (path.to_path_buf(), Track::load(path, target))
            })
            .collect();

        let mut report = LoadReport::default();
        let mut loaded = Vec::with_capacity(results.len());
        for (path, result) in results {
            match result {
                Ok(track) => loaded.push(track),
                Err(e) => {
                    log::warn!("Skipping {}: {}", path.display(), e);
                    report.failed.push((path, e));
                }
            }
        }

        report.loaded = loaded.len();
        if report.loaded > 0 {
            self.tracks.extend(loaded);
            self.refresh_active();
        }
        log::info!("Loaded {} of {} files", report.loaded, paths.len());
        report
    }

    /// Add an already built track
    pub fn add_track(&mut self, track: Track) {
        self.tracks.push(track);
        self.refresh_active();
    }

    /// Remove a track; stops playback first if it is the active one
    pub fn remove_track(&mut self, index: usize) -> EngineResult<Track> {
        self.check_index(index)?;

        match self.active {
            Some(active) if active == index => {
                self.halt();
                self.active = None;
                self.atomics.set_track(0, 0);
            }
            Some(active) if active > index => self.active = Some(active - 1),
            _ => {}
        }

        let track = self
            .tracks
            .remove(index)
            .ok_or(EngineError::TrackIndexOutOfRange { index, len: self.tracks.len() })?;
        self.refresh_active();

        log::info!("Removed '{}' ({} tracks left)", track.name(), self.tracks.len());
        Ok(track)
    }

    // ─────────────────────────────────────────────────────────────────────
    // Transport
    // ─────────────────────────────────────────────────────────────────────

    /// Bind the track at `index` at the same playhead time
    ///
    /// The position carries over in seconds, clamped to the new track's
    /// length. Keeps the transport state: a playing engine plays the new track.
    pub fn select_track(&mut self, index: usize) -> EngineResult<SelectOutcome> {
        self.check_index(index)?;
        if self.active == Some(index) {
            return Ok(SelectOutcome::Unchanged);
        }

        let sample_rate = self.tracks.get(index).map(Track::sample_rate).unwrap_or(0);
        if !self.can_rebind(sample_rate) {
            // Stop the old callback so the position read below is final
            self.close_stream();
        }
        let previous = self.active.map(|i| (i, self.atomics.position()));
        let frame = (self.current_playhead_secs() * sample_rate as f64).round() as u64;
        if let Err(e) = self.bind(index, frame, false) {
            log::error!("Failed to bind track {}: {}", index, e);
            self.restore(previous);
            return Err(e);
        }

        self.active = Some(index);
        self.update_clipping();
        if let Some(track) = self.tracks.get(index) {
            log::info!(
                "Selected '{}' ({}Hz, {:.1}s)",
                track.name(),
                track.sample_rate(),
                track.length_secs()
            );
        }
        Ok(SelectOutcome::Changed)
    }

    /// Start or resume playback from the current position
    pub fn play(&mut self) -> EngineResult<()> {
        let index = self.require_active()?;
        if self.atomics.is_playing() && self.stream.is_some() {
            return Ok(());
        }

        // A stale end-of-track must not pause the stream we are starting
        self.atomics.take_ended();
        if self.stream.is_none() {
            self.bind(index, self.atomics.position(), true)?;
        }

        let prior = self.atomics.state();
        self.atomics.request_fade();
        self.atomics.set_state(PlayState::Playing);
        if let Some(stream) = self.stream.as_mut() {
            if let Err(e) = stream.handle.play() {
                self.atomics.set_state(prior);
                return Err(e.into());
            }
        }

        log::info!("Playing from {:.2}s", self.atomics.playhead_secs());
        Ok(())
    }

    /// Pause, keeping the position
    pub fn pause(&mut self) -> EngineResult<()> {
        self.require_active()?;
        if !self.atomics.is_playing() {
            return Ok(());
        }

        self.atomics.set_state(PlayState::Paused);
        if let Some(stream) = self.stream.as_mut() {
            stream.handle.pause()?;
        }

        log::info!("Paused at {:.2}s", self.atomics.playhead_secs());
        Ok(())
    }

    /// Stop and rewind to the first frame
    pub fn stop(&mut self) -> EngineResult<()> {
        self.atomics.set_state(PlayState::Stopped);
        self.atomics.take_ended();
        let paused = match self.stream.as_mut() {
            Some(stream) => stream.handle.pause(),
            None => Ok(()),
        };
        self.atomics.reposition(0);
        paused?;

        log::debug!("Stopped");
        Ok(())
    }

    /// Jump to `ratio` (0.0..=1.0) of the active track
    ///
    /// Out-of-range ratios are clamped and NaN means the start. The
    /// transport state is unchanged.
    pub fn seek(&mut self, ratio: f64) -> EngineResult<()> {
        let index = self.require_active()?;
        let ratio = if ratio.is_nan() { 0.0 } else { ratio.clamp(0.0, 1.0) };
        let length = self.tracks.get(index).map_or(0, Track::length_frames);
        let frame = (ratio * length as f64).round() as u64;

        self.atomics.reposition(frame);
        if self.atomics.is_playing() {
            self.atomics.request_fade();
        }

        log::debug!("Seek to frame {} of {}", frame, length);
        Ok(())
    }

    /// Switch the view streamed from the next period on
    pub fn set_loudness_mode(&mut self, mode: LoudnessMode) {
        self.atomics.set_mode(mode);
        self.update_clipping();
        log::info!("Loudness mode: {}", mode);
    }

    /// Move output to another device, keeping position and play state
    pub fn set_output_device(&mut self, device: DeviceId) -> EngineResult<DeviceOutcome> {
        if device == self.output_device {
            return Ok(DeviceOutcome::Unchanged);
        }

        let resolved = self
            .backend
            .output_devices()?
            .into_iter()
            .map(|d| d.id)
            .find(|id| device.matches(id))
            .ok_or_else(|| AudioError::DeviceNotFound(device.display_label()))?;
        if resolved == self.output_device {
            return Ok(DeviceOutcome::Unchanged);
        }

        let previous = std::mem::replace(&mut self.output_device, resolved);
        if let (Some(index), true) = (self.active, self.stream.is_some()) {
            self.close_stream();
            let frame = self.atomics.position();
            if let Err(e) = self.bind(index, frame, true) {
                log::error!("Failed to open {}: {}", self.output_device, e);
                self.output_device = previous;
                self.restore(Some((index, frame)));
                return Err(e);
            }
        }

        log::info!("Output device: {}", self.output_device);
        Ok(DeviceOutcome::Switched)
    }

    /// Housekeeping for the control thread's timer tick
    ///
    /// Returns true if the track ended since the last call; the device
    /// stream is paused so no further callbacks run until `play`.
    pub fn poll(&mut self) -> bool {
        if !self.atomics.take_ended() {
            return false;
        }
        if let Some(stream) = self.stream.as_mut() {
            if let Err(e) = stream.handle.pause() {
                log::warn!("Failed to pause stream after end of track: {}", e);
            }
        }
        log::info!("End of track");
        true
    }

    // ─────────────────────────────────────────────────────────────────────
    // Queries
    // ─────────────────────────────────────────────────────────────────────

    /// Position as a fraction of the active track (0.0 with no track)
    pub fn current_playhead_ratio(&self) -> f64 {
        if self.active.is_none() {
            return 0.0;
        }
        self.atomics.playhead_ratio()
    }

    /// Position in seconds (0.0 with no track)
    pub fn current_playhead_secs(&self) -> f64 {
        if self.active.is_none() {
            return 0.0;
        }
        self.atomics.playhead_secs()
    }

    pub fn is_playing(&self) -> bool {
        self.atomics.is_playing()
    }

    /// Whether the active track clips in the current mode
    pub fn is_clipping(&self) -> bool {
        self.clipping
    }

    pub fn track_display_strings(&self) -> Vec<String> {
        self.tracks.display_strings()
    }

    pub fn state(&self) -> PlayState {
        self.atomics.state()
    }

    pub fn loudness_mode(&self) -> LoudnessMode {
        self.atomics.mode()
    }

    pub fn active_track_index(&self) -> Option<usize> {
        self.active
    }

    pub fn active_track(&self) -> Option<&Track> {
        self.active.and_then(|i| self.tracks.get(i))
    }

    pub fn tracks(&self) -> &TrackSet {
        &self.tracks
    }

    /// Rate of the open stream, if any
    pub fn output_sample_rate(&self) -> Option<u32> {
        self.stream.as_ref().map(|s| s.handle.sample_rate())
    }

    pub fn output_device(&self) -> &DeviceId {
        &self.output_device
    }

    pub fn output_devices(&self) -> EngineResult<Vec<OutputDevice>> {
        Ok(self.backend.output_devices()?)
    }

    /// Shared state for lock-free reads from other threads
    pub fn atomics(&self) -> Arc<TransportAtomics> {
        Arc::clone(&self.atomics)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    // ─────────────────────────────────────────────────────────────────────
    // Internals
    // ─────────────────────────────────────────────────────────────────────

    fn check_index(&self, index: usize) -> EngineResult<()> {
        if self.tracks.is_empty() {
            return Err(EngineError::EmptyTrackSet);
        }
        if index >= self.tracks.len() {
            return Err(EngineError::TrackIndexOutOfRange {
                index,
                len: self.tracks.len(),
            });
        }
        Ok(())
    }

    fn require_active(&self) -> EngineResult<usize> {
        if self.tracks.is_empty() {
            return Err(EngineError::EmptyTrackSet);
        }
        self.active.ok_or(EngineError::NoActiveTrack)
    }

    /// Point the transport at track `index`, frame `frame`
    ///
    /// Reuses the open stream when it can take the track (unless `reopen`),
    /// otherwise closes it before the new track is published.
    fn bind(&mut self, index: usize, frame: u64, reopen: bool) -> EngineResult<()> {
        let track = self.tracks.get(index).ok_or(EngineError::TrackIndexOutOfRange {
            index,
            len: self.tracks.len(),
        })?;
        let views = track.views();
        let sample_rate = track.sample_rate();
        let channels = u16::try_from(track.channels()).unwrap_or(u16::MAX);
        let length = track.length_frames() as u64;

        let reuse = !reopen && self.can_rebind(sample_rate);
        if !reuse {
            // The old callback must never see the new length or rate
            self.close_stream();
        }

        self.binding = self.binding.wrapping_add(1);
        let binding = self.binding;
        self.atomics.set_track(length, sample_rate);
        self.atomics.set_cursor(binding, frame.min(length));

        if let Some(stream) = self.stream.as_mut().filter(|_| reuse) {
            match stream.commands.send(TransportCommand::Bind {
                views: views.clone(),
                binding,
            }) {
                Ok(()) => return Ok(()),
                Err(_) => log::debug!("Command queue full, rebuilding output stream"),
            }
        }

        self.open_stream(views, binding, sample_rate, channels)
    }

    /// Whether the open stream can switch to a track at `sample_rate` in place
    fn can_rebind(&self, sample_rate: u32) -> bool {
        self.stream
            .as_ref()
            .is_some_and(|s| s.handle.sample_rate() == sample_rate && s.commands.has_room())
    }

    fn open_stream(&mut self, views: TrackViews, binding: u8, sample_rate: u32, channels: u16) -> EngineResult<()> {
        self.close_stream();

        let (commands, consumer) = command_channel();
        let transport = Transport::new(
            Arc::clone(&self.atomics),
            consumer,
            views,
            binding,
            self.config.playback.fade_in_frames,
        );
        let spec = StreamSpec {
            sample_rate,
            channels,
            buffer_size: self.config.audio.buffer_size,
        };

        let mut handle = self.backend.open(&self.output_device, spec, transport)?;
        if self.atomics.is_playing() {
            handle.play()?;
        }
        self.stream = Some(ActiveStream { handle, commands });
        Ok(())
    }

    /// Pause and drop the stream; its callback is gone once this returns
    fn close_stream(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            if let Err(e) = stream.handle.pause() {
                log::warn!("Failed to pause stream before closing: {}", e);
            }
            let rate = stream.handle.sample_rate();
            drop(stream);
            log::debug!("Closed {}Hz output stream", rate);
        }
    }

    /// After a failed bind: rebind the previous track, or stop
    fn restore(&mut self, previous: Option<(usize, u64)>) {
        match previous {
            Some((index, frame)) => {
                if let Err(e) = self.bind(index, frame, true) {
                    log::error!("Failed to restore track {}: {}", index, e);
                    self.halt();
                }
            }
            None => {
                self.halt();
                self.atomics.set_track(0, 0);
            }
        }
    }

    /// Stop with no stream open
    fn halt(&mut self) {
        self.atomics.set_state(PlayState::Stopped);
        self.close_stream();
        self.atomics.reposition(0);
        self.atomics.take_ended();
    }

    /// Hand the active track's current views to the callback
    ///
    /// Called after membership changes, which may have changed the mixing view.
    fn refresh_active(&mut self) {
        if let Some(index) = self.active {
            let views = self.tracks.get(index).map(Track::views);
            let binding = self.binding;
            let queued = match (self.stream.as_mut(), views) {
                (Some(stream), Some(views)) => stream
                    .commands
                    .send(TransportCommand::Refresh { views, binding })
                    .is_ok(),
                // A stream opened later binds the current views
                _ => true,
            };
            if !queued {
                let frame = self.atomics.position();
                if let Err(e) = self.bind(index, frame, true) {
                    log::error!("Failed to rebuild output stream: {}", e);
                    self.halt();
                }
            }
        }
        self.update_clipping();
    }

    fn update_clipping(&mut self) {
        let mode = self.atomics.mode();
        self.clipping = self
            .active
            .and_then(|i| self.tracks.get(i))
            .is_some_and(|t| t.is_clipping(mode));
    }
}

//! Tracks: one decoded file and its three loudness views
//!
//! The raw samples are decoded and measured once. The mastering view is
//! derived at load time; the mixing view follows the shared target handed
//! down by [`crate::mixing::converge_mixing_target`]. All three views are
//! `basedrop::Shared` so the audio thread can hold them without owning the
//! deallocation.

mod decode;
mod set;

pub use decode::{decode, DecodeError, DecodedAudio};
pub use set::TrackSet;

use std::path::{Path, PathBuf};

use basedrop::Shared;

use crate::engine::gc_handle;
use crate::loudness::{self, LoudnessError};
use crate::types::{InterleavedBuffer, LoudnessMode, Sample, FULL_SCALE};

/// Handles to the three views of a track
///
/// Cloning only bumps reference counts, so a `TrackViews` is cheap to send
/// to the audio thread.
#[derive(Clone)]
pub struct TrackViews {
    raw: Shared<InterleavedBuffer>,
    mixing: Shared<InterleavedBuffer>,
    mastering: Shared<InterleavedBuffer>,
}

impl TrackViews {
    fn new(raw: Shared<InterleavedBuffer>, mastering: Shared<InterleavedBuffer>) -> Self {
        Self {
            mixing: raw.clone(),
            raw,
            mastering,
        }
    }

    /// The buffer streamed in the given mode
    #[inline]
    pub fn view(&self, mode: LoudnessMode) -> &InterleavedBuffer {
        match mode {
            LoudnessMode::Raw => &self.raw,
            LoudnessMode::Mixing => &self.mixing,
            LoudnessMode::Mastering => &self.mastering,
        }
    }

    /// Interleaved samples of `view(mode)` for frames `start..end`
    ///
    /// Empty once `start` reaches the end of the track.
    #[inline]
    pub fn slice(&self, mode: LoudnessMode, start: usize, end: usize) -> &[Sample] {
        self.view(mode).frame_range(start, end)
    }

    #[inline]
    pub fn frames(&self) -> usize {
        self.raw.frames()
    }

    #[inline]
    pub fn channels(&self) -> usize {
        self.raw.channels()
    }
}

/// A loaded track
pub struct Track {
    path: PathBuf,
    name: String,
    sample_rate: u32,
    integrated_loudness: f64,
    views: TrackViews,
    /// Peak of each view, indexed by `LoudnessMode::index`
    peaks: [Sample; 3],
    mixing_target: Option<f64>,
}

impl Track {
    /// Decode a file and build its views
    pub fn load(path: &Path, mastering_target: f64) -> Result<Self, DecodeError> {
        let decoded = decode(path)?;
        let mut track = Self::from_buffer(decoded.buffer, decoded.sample_rate, mastering_target)?;
        track.name = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        track.path = path.to_path_buf();

        log::info!(
            "Loaded '{}': {:.1} LUFS, {:.1}s @ {}Hz",
            track.name,
            track.integrated_loudness,
            track.length_secs(),
            track.sample_rate
        );
        Ok(track)
    }

    /// Build a track from already decoded samples
    pub fn from_buffer(
        buffer: InterleavedBuffer,
        sample_rate: u32,
        mastering_target: f64,
    ) -> Result<Self, LoudnessError> {
        let lufs = loudness::measure(&buffer, sample_rate)?;
        Ok(Self::with_measured(String::new(), buffer, sample_rate, lufs, mastering_target))
    }

    fn with_measured(
        name: String,
        buffer: InterleavedBuffer,
        sample_rate: u32,
        integrated_loudness: f64,
        mastering_target: f64,
    ) -> Self {
        let handle = gc_handle();
        let raw_peak = buffer.peak();

        // Mastering only ever turns loud material down
        let (mastering, mastering_peak) = if integrated_loudness > mastering_target {
            let normalized = loudness::normalize(&buffer, integrated_loudness, mastering_target);
            let peak = normalized.peak();
            (Some(normalized), peak)
        } else {
            (None, raw_peak)
        };

        let raw = Shared::new(&handle, buffer);
        let mastering = match mastering {
            Some(view) => Shared::new(&handle, view),
            None => raw.clone(),
        };

        Self {
            path: PathBuf::new(),
            name,
            sample_rate,
            integrated_loudness,
            views: TrackViews::new(raw, mastering),
            peaks: [raw_peak, raw_peak, mastering_peak],
            mixing_target: None,
        }
    }

    /// Track with a given loudness, skipping measurement
    #[cfg(test)]
    pub(crate) fn with_loudness(name: &str, buffer: InterleavedBuffer, sample_rate: u32, lufs: f64) -> Self {
        Self::with_measured(
            name.to_string(),
            buffer,
            sample_rate,
            lufs,
            crate::config::DEFAULT_MASTERING_TARGET_LUFS,
        )
    }

    /// Renormalize the mixing view to a new shared target
    ///
    /// Returns false (and does no work) if the target is unchanged.
    pub fn set_mixing_target(&mut self, target_lufs: f64) -> bool {
        if self.mixing_target == Some(target_lufs) {
            return false;
        }

        let gain = loudness::gain_for(self.integrated_loudness, target_lufs);
        if gain == 1.0 {
            self.views.mixing = self.views.raw.clone();
            self.peaks[LoudnessMode::Mixing.index()] = self.peaks[LoudnessMode::Raw.index()];
        } else {
            let view = self.views.raw.scaled(gain);
            self.peaks[LoudnessMode::Mixing.index()] = view.peak();
            self.views.mixing = Shared::new(&gc_handle(), view);
        }
        self.mixing_target = Some(target_lufs);
        true
    }

    /// Whether the view for `mode` reaches full scale
    #[inline]
    pub fn is_clipping(&self, mode: LoudnessMode) -> bool {
        self.peak(mode) >= FULL_SCALE
    }

    /// Peak absolute amplitude of the view for `mode`
    #[inline]
    pub fn peak(&self, mode: LoudnessMode) -> Sample {
        self.peaks[mode.index()]
    }

    #[inline]
    pub fn view(&self, mode: LoudnessMode) -> &InterleavedBuffer {
        self.views.view(mode)
    }

    #[inline]
    pub fn slice(&self, mode: LoudnessMode, start: usize, end: usize) -> &[Sample] {
        self.views.slice(mode, start, end)
    }

    /// Shared handles for the audio thread
    pub fn views(&self) -> TrackViews {
        self.views.clone()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn integrated_loudness(&self) -> f64 {
        self.integrated_loudness
    }

    /// Target the mixing view is currently normalized to, if any
    pub fn mixing_target(&self) -> Option<f64> {
        self.mixing_target
    }

    pub fn length_frames(&self) -> usize {
        self.views.frames()
    }

    pub fn length_secs(&self) -> f64 {
        self.views.raw.duration_seconds(self.sample_rate)
    }

    pub fn channels(&self) -> usize {
        self.views.channels()
    }

    /// One line for the track list: loudness, name and a clipping marker
    pub fn display_string(&self) -> String {
        let mut line = format!("{:.1}   {}", self.integrated_loudness, self.name);
        if self.is_clipping(LoudnessMode::Raw) {
            line.push_str("  [clipping]");
        }
        line
    }
}

impl std::fmt::Debug for Track {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Track")
            .field("name", &self.name)
            .field("sample_rate", &self.sample_rate)
            .field("integrated_loudness", &self.integrated_loudness)
            .field("frames", &self.length_frames())
            .field("peaks", &self.peaks)
            .field("mixing_target", &self.mixing_target)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loudness::tests::sine;
    use tempfile::TempDir;

    fn ramp(frames: usize, peak: f32) -> InterleavedBuffer {
        let samples = (0..frames)
            .flat_map(|i| {
                let s = peak * i as f32 / (frames - 1) as f32;
                [s, -s]
            })
            .collect();
        InterleavedBuffer::from_interleaved(samples, 2)
    }

    #[test]
    fn test_views_share_shape() {
        let mut track = Track::with_loudness("a", ramp(1000, 0.5), 44100, -8.0);
        track.set_mixing_target(-20.0);
        for mode in LoudnessMode::ALL {
            assert_eq!(track.view(mode).frames(), 1000);
            assert_eq!(track.view(mode).channels(), 2);
        }
    }

    #[test]
    fn test_mastering_turns_loud_tracks_down() {
        let track = Track::with_loudness("loud", ramp(100, 0.8), 44100, -8.0);
        // -8 -> -14 is -6 dB
        let expected = 0.8 * loudness::db_to_linear(-6.0) as f32;
        assert!((track.peak(LoudnessMode::Mastering) - expected).abs() < 1e-5);
        assert_eq!(track.view(LoudnessMode::Raw).peak(), 0.8);
    }

    #[test]
    fn test_mastering_never_boosts() {
        let track = Track::with_loudness("quiet", ramp(100, 0.2), 44100, -23.0);
        assert_eq!(track.view(LoudnessMode::Mastering), track.view(LoudnessMode::Raw));
        assert_eq!(track.peak(LoudnessMode::Mastering), 0.2);
    }

    #[test]
    fn test_mixing_view_starts_as_raw() {
        let track = Track::with_loudness("a", ramp(100, 0.3), 48000, -12.0);
        assert_eq!(track.mixing_target(), None);
        assert_eq!(track.view(LoudnessMode::Mixing), track.view(LoudnessMode::Raw));
    }

    #[test]
    fn test_set_mixing_target_short_circuits() {
        let mut track = Track::with_loudness("a", ramp(100, 0.3), 48000, -12.0);
        assert!(track.set_mixing_target(-18.0));
        assert!(!track.set_mixing_target(-18.0));
        assert!(track.set_mixing_target(-19.0));
        assert_eq!(track.mixing_target(), Some(-19.0));
    }

    #[test]
    fn test_mixing_to_own_loudness_is_identity() {
        let mut track = Track::with_loudness("a", ramp(100, 0.3), 48000, -12.0);
        track.set_mixing_target(-12.0);
        assert_eq!(track.view(LoudnessMode::Mixing), track.view(LoudnessMode::Raw));
    }

    #[test]
    fn test_clipping_per_mode() {
        let mut track = Track::with_loudness("hot", ramp(100, 1.0), 48000, -6.0);
        assert!(track.is_clipping(LoudnessMode::Raw));
        assert!(!track.is_clipping(LoudnessMode::Mastering));

        track.set_mixing_target(0.0);
        assert!(track.is_clipping(LoudnessMode::Mixing));
        track.set_mixing_target(-7.0);
        assert!(!track.is_clipping(LoudnessMode::Mixing));
        assert_eq!(track.peak(LoudnessMode::Mixing), track.view(LoudnessMode::Mixing).peak());
    }

    #[test]
    fn test_slice_past_end_is_empty() {
        let track = Track::with_loudness("a", ramp(10, 0.5), 48000, -12.0);
        assert_eq!(track.slice(LoudnessMode::Raw, 8, 20).len(), 4);
        assert!(track.slice(LoudnessMode::Raw, 10, 20).is_empty());
        assert!(track.slice(LoudnessMode::Mastering, 11, 20).is_empty());
    }

    #[test]
    fn test_display_string() {
        let quiet = Track::with_loudness("intro", ramp(10, 0.5), 48000, -12.34);
        assert_eq!(quiet.display_string(), "-12.3   intro");

        let hot = Track::with_loudness("drop", ramp(10, 1.0), 48000, -5.0);
        assert_eq!(hot.display_string(), "-5.0   drop  [clipping]");
    }

    #[test]
    fn test_from_buffer_measures_loudness() {
        let buffer = sine(1000.0, 0.25, 2.0, 48000);
        let expected = loudness::measure(&buffer, 48000).unwrap();
        let track = Track::from_buffer(buffer, 48000, -14.0).unwrap();
        assert_eq!(track.integrated_loudness(), expected);
        assert!((track.length_secs() - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_from_buffer_rejects_silence() {
        assert!(Track::from_buffer(InterleavedBuffer::silence(48000, 2), 48000, -14.0).is_err());
    }

    #[test]
    fn test_load_names_track_after_file_stem() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("first song.wav");
        decode::tests::write_sine_wav(&path, 0.5, 1.0, 44100);

        let track = Track::load(&path, -14.0).unwrap();
        assert_eq!(track.name(), "first song");
        assert_eq!(track.path(), path.as_path());
        assert_eq!(track.sample_rate(), 44100);
        assert_eq!(track.length_frames(), 44100);
    }
}

//! Shared mixing-loudness target
//!
//! Every track's mixing view is normalized to one common loudness so that
//! switching tracks causes no jump in perceived volume. The target starts
//! at the quietest track's loudness and steps down until no mixing view
//! reaches full scale.

use rayon::prelude::*;

use crate::loudness::normalized_peak;
use crate::track::Track;
use crate::types::{LoudnessMode, FULL_SCALE};

/// Default decrement applied per clipping iteration, in LU
pub const DEFAULT_STEP_LU: f64 = 1.0;

/// Find the shared mixing target for `tracks` and apply it
///
/// Returns the target, or `None` for an empty set. After this returns,
/// no track clips in [`LoudnessMode::Mixing`].
///
/// Candidate targets are checked against each track's raw peak. Scaling by
/// a positive gain is monotonic in magnitude, so the predicted peak is the
/// peak the materialized view will have, and only the final target needs
/// renormalizing.
pub fn converge_mixing_target(tracks: &mut [Track], step_lu: f64) -> Option<f64> {
    let step = if step_lu.is_finite() && step_lu > 0.0 {
        step_lu
    } else {
        log::warn!("Invalid mixing step {} LU, using {}", step_lu, DEFAULT_STEP_LU);
        DEFAULT_STEP_LU
    };

    let mut target = tracks
        .iter()
        .map(Track::integrated_loudness)
        .min_by(|a, b| a.total_cmp(b))?;
    let start = target;

    let clips = |target: f64| {
        tracks.iter().any(|t| {
            normalized_peak(t.peak(LoudnessMode::Raw), t.integrated_loudness(), target) >= FULL_SCALE
        })
    };

    let mut iterations = 0usize;
    while clips(target) {
        target -= step;
        iterations += 1;
    }

    let renormalized = tracks
        .par_iter_mut()
        .map(|t| t.set_mixing_target(target))
        .filter(|&changed| changed)
        .count();

    debug_assert!(tracks.iter().all(|t| !t.is_clipping(LoudnessMode::Mixing)));

    log::info!(
        "Mixing target {:.1} LUFS ({} tracks, {} step(s) below quietest {:.1}, {} renormalized)",
        target,
        tracks.len(),
        iterations,
        start,
        renormalized
    );

    Some(target)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::InterleavedBuffer;

    /// Stereo buffer whose absolute peak is `peak`
    fn with_peak(peak: f32) -> InterleavedBuffer {
        InterleavedBuffer::from_interleaved(vec![0.0, 0.0, peak * 0.5, -peak, peak * 0.25, 0.1], 2)
    }

    fn track(name: &str, lufs: f64, peak: f32) -> Track {
        Track::with_loudness(name, with_peak(peak), 44100, lufs)
    }

    #[test]
    fn test_empty_set_has_no_target() {
        assert_eq!(converge_mixing_target(&mut [], 1.0), None);
    }

    #[test]
    fn test_quietest_track_is_target_when_nothing_clips() {
        let mut tracks = vec![
            track("loud", -10.0, 0.9),
            track("mid", -20.0, 0.5),
            track("quiet", -30.0, 0.2),
        ];
        let target = converge_mixing_target(&mut tracks, 1.0).unwrap();
        assert_eq!(target, -30.0);
        for t in &tracks {
            assert_eq!(t.mixing_target(), Some(-30.0));
            assert!(!t.is_clipping(LoudnessMode::Mixing));
        }
        // Quietest track is untouched
        assert_eq!(tracks[2].view(LoudnessMode::Mixing), tracks[2].view(LoudnessMode::Raw));
    }

    #[test]
    fn test_never_picks_loudest_track() {
        let mut tracks = vec![
            track("a", -10.0, 0.5),
            track("b", -20.0, 0.5),
            track("c", -30.0, 0.5),
        ];
        let target = converge_mixing_target(&mut tracks, 1.0).unwrap();
        assert!(target <= -20.0);
        assert!(target <= -30.0);
    }

    #[test]
    fn test_steps_down_while_clipping() {
        // The quietest track already peaks at full scale, so its own loudness clips
        let mut tracks = vec![
            track("a", -10.0, 0.3),
            track("b", -20.0, 0.5),
            track("c", -30.0, 1.0),
        ];
        let target = converge_mixing_target(&mut tracks, 1.0).unwrap();
        assert_eq!(target, -31.0);
        assert!(tracks.iter().all(|t| !t.is_clipping(LoudnessMode::Mixing)));
    }

    #[test]
    fn test_float_overs_force_lower_target() {
        // Float sources can exceed full scale. b needs 4 * 10^((t + 12) / 20) < 1,
        // i.e. t < -24.04, so the target steps from -20 down to -25
        let mut tracks = vec![
            track("a", -20.0, 0.5),
            track("b", -12.0, 4.0),
            track("c", -10.0, 1.5),
        ];
        let target = converge_mixing_target(&mut tracks, 1.0).unwrap();
        assert_eq!(target, -25.0);
        assert!(tracks.iter().all(|t| !t.is_clipping(LoudnessMode::Mixing)));
        assert!(tracks[1].is_clipping(LoudnessMode::Raw));
    }

    #[test]
    fn test_single_track_is_its_own_target() {
        let mut tracks = vec![track("solo", -12.0, 0.7)];
        assert_eq!(converge_mixing_target(&mut tracks, 1.0), Some(-12.0));
        assert_eq!(tracks[0].view(LoudnessMode::Mixing), tracks[0].view(LoudnessMode::Raw));
    }

    #[test]
    fn test_single_clipping_track_is_turned_down() {
        let mut tracks = vec![track("solo", -8.0, 1.0)];
        let target = converge_mixing_target(&mut tracks, 1.0).unwrap();
        assert_eq!(target, -9.0);
        assert!(!tracks[0].is_clipping(LoudnessMode::Mixing));
        assert!(tracks[0].is_clipping(LoudnessMode::Raw));
    }

    #[test]
    fn test_converged_views_never_clip() {
        let mut tracks: Vec<Track> = (0..8)
            .map(|i| track(&i.to_string(), -6.0 - 3.0 * i as f64, 0.3 + 0.1 * i as f32))
            .collect();
        converge_mixing_target(&mut tracks, 1.0).unwrap();
        for t in &tracks {
            assert!(t.view(LoudnessMode::Mixing).peak() < FULL_SCALE, "{:?}", t);
        }
    }

    #[test]
    fn test_invalid_step_falls_back_to_default() {
        let mut tracks = vec![track("solo", -8.0, 1.0)];
        assert_eq!(converge_mixing_target(&mut tracks, 0.0), Some(-9.0));
        assert_eq!(converge_mixing_target(&mut tracks, f64::NAN), Some(-9.0));
    }
}

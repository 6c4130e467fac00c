//! Ordered collection of loaded tracks
//!
//! Any change in membership reruns mixing convergence, so the mixing views
//! of every member are always clip-free before anyone can stream them.

use super::Track;
use crate::mixing::converge_mixing_target;

/// Loaded tracks in display order
#[derive(Debug)]
pub struct TrackSet {
    tracks: Vec<Track>,
    mixing_step_lu: f64,
    mixing_target: Option<f64>,
}

impl TrackSet {
    pub fn new(mixing_step_lu: f64) -> Self {
        Self {
            tracks: Vec::new(),
            mixing_step_lu,
            mixing_target: None,
        }
    }

    /// Append one track and reconverge
    pub fn push(&mut self, track: Track) {
        self.tracks.push(track);
        self.reconverge();
    }

    /// Append a batch of tracks, converging once for the whole batch
    pub fn extend<I: IntoIterator<Item = Track>>(&mut self, tracks: I) {
        let before = self.tracks.len();
        self.tracks.extend(tracks);
        if self.tracks.len() != before {
            self.reconverge();
        }
    }

    /// Remove and return the track at `index`, reconverging the rest
    pub fn remove(&mut self, index: usize) -> Option<Track> {
        if index >= self.tracks.len() {
            return None;
        }
        let track = self.tracks.remove(index);
        self.reconverge();
        Some(track)
    }

    fn reconverge(&mut self) {
        self.mixing_target = converge_mixing_target(&mut self.tracks, self.mixing_step_lu);
    }

    pub fn get(&self, index: usize) -> Option<&Track> {
        self.tracks.get(index)
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Track> {
        self.tracks.iter()
    }

    /// Current shared mixing target (`None` while empty)
    pub fn mixing_target(&self) -> Option<f64> {
        self.mixing_target
    }

    /// One display line per track, in order
    pub fn display_strings(&self) -> Vec<String> {
        self.tracks.iter().map(Track::display_string).collect()
    }
}

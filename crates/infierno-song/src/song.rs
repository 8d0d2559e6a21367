//! Playback manager for whole songs.

use infierno_core::{Module, Result, Sample, Stereo};
use infierno_spu::PatchBank;

use crate::options::ExtractOptions;
use crate::records::{Score, Song};
use crate::track::TrackPlayer;

/// Plays every track of a song in parallel and sums their output.
pub struct SongPlayer<'a> {
    tracks: Vec<TrackPlayer<'a>>,
}

impl<'a> SongPlayer<'a> {
    /// Construct players for all tracks of a song.
    pub fn new(
        song: &'a Song,
        score: &'a Score,
        patches: &'a PatchBank,
        options: &ExtractOptions,
    ) -> Result<Self> {
        let mut tracks = Vec::with_capacity(song.tracks.len());
        for track in &song.tracks {
            let instrument = score.instrument(track.instrument as usize)?;
            tracks.push(TrackPlayer::new(track, instrument, patches, options)?);
        }
        Ok(Self { tracks })
    }

    /// Whether any track failed to honor a requested repeat.
    pub fn failed_to_repeat(&self) -> bool {
        self.tracks.iter().any(TrackPlayer::failed_to_repeat)
    }

    /// Number of tracks in the song.
    pub fn track_count(&self) -> usize {
        self.tracks.len()
    }
}

impl<'a> Module<Stereo> for SongPlayer<'a> {
    fn next(&mut self, out: &mut Stereo) -> Result<bool> {
        *out = Stereo::ZERO;
        let mut live = false;
        let mut sample = Stereo::ZERO;
        for track in &mut self.tracks {
            live |= track.next(&mut sample)?;
            *out += sample;
        }
        Ok(live)
    }

    fn is_running(&mut self) -> bool {
        self.tracks.iter_mut().any(|track| track.is_running())
    }
}

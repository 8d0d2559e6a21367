//! Parsed music data records.
//!
//! The engine consumes songs in already-parsed form; reading them out of
//! their container files is the host's job. A [`Song`] is a set of
//! [`Track`]s, each tied to one [`Instrument`], which covers the note range
//! with one or more [`SubInstrument`]s pointing at patches.

use infierno_core::{EngineError, Result};

/// The note range and playback parameters for part of an instrument.
#[derive(Clone, Debug)]
pub struct SubInstrument {
    /// First note this sub-instrument applies to (inclusive).
    pub first_note: u8,
    /// Last note this sub-instrument applies to (inclusive).
    pub last_note: u8,

    /// Patch id holding the audio data.
    pub patch: u16,

    /// Volume adjustment, 0x00 to 0x7f.
    pub volume: u8,

    /// Note number that maps to the natural playback frequency of 44 100 Hz.
    pub tuning: u8,
    /// Fractional tuning, in 1/256ths of a note.
    pub fine_tuning: u8,

    /// Panning: full left is 0x00, centre 0x40, full right 0x7f.
    pub pan: u8,

    /// Notes a full pitch-bend deflection shifts the pitch by. Zero means
    /// pitch bending has no effect on this sub-instrument.
    pub bend_sensitivity: u8,

    /// SPU attack/decay/sustain register setting.
    pub spu_ads: u16,
    /// SPU sustain/release register setting.
    pub spu_sr: u16,
}

/// A collection of sub-instruments covering some or all of the note range.
#[derive(Clone, Debug, Default)]
pub struct Instrument {
    /// Sub-instruments in lookup order; each note should be covered by
    /// exactly one.
    pub sub_instruments: Vec<SubInstrument>,
}

impl Instrument {
    /// Find the sub-instrument covering a note. A note no sub-instrument
    /// covers is fatal: the song data references audio that does not exist.
    pub fn sub_instrument(&self, note: u8) -> Result<&SubInstrument> {
        debug_assert!(note < 0x80);
        self.sub_instruments
            .iter()
            .find(|sub| note >= sub.first_note && note <= sub.last_note)
            .ok_or_else(|| {
                EngineError::MissingResource(format!(
                    "no sub-instrument covers note ${note:02x}"
                ))
            })
    }

    /// Map a note to a playback frequency in Hz, taking tuning and the
    /// current pitch bend into account.
    ///
    /// `unit_pitch_bend` is the bend normalized to a sensitivity of one
    /// note: `raw / 0x2000 / 12`.
    pub fn note_to_frequency(&self, note: u8, unit_pitch_bend: f32) -> Result<u32> {
        let sub = self.sub_instrument(note)?;
        let tuning = sub.tuning as f64 + sub.fine_tuning as f64 / 256.0;
        let adjusted_note =
            (note as f64 - tuning) / 12.0 + sub.bend_sensitivity as f64 * unit_pitch_bend as f64;
        let frequency = (44_100.0 * libm::pow(2.0, adjusted_note) + 0.5) as i32;
        Ok(frequency.max(1) as u32)
    }
}

/// Song data for a single instrument.
#[derive(Clone, Debug)]
pub struct Track {
    /// Index of the instrument the track plays.
    pub instrument: u16,

    /// Tempo of the track.
    pub beats_per_minute: u16,
    /// Track ticks per beat.
    pub ticks_per_beat: u16,

    /// Whether the track repeats. Music does (with two exceptions in Final
    /// Doom); sound effects don't.
    pub repeat: bool,
    /// Byte offset of the start of the repeating part of the track.
    pub repeat_start: u32,

    /// Music events in their MIDI-like byte encoding.
    pub data: Vec<u8>,
}

/// One or more tracks played in parallel.
#[derive(Clone, Debug, Default)]
pub struct Song {
    /// Tracks of the song.
    pub tracks: Vec<Track>,
}

/// Everything parsed out of a music description file: the instruments and
/// the songs that index into them.
#[derive(Clone, Debug, Default)]
pub struct Score {
    /// Instrument definitions.
    pub instruments: Vec<Instrument>,
    /// Songs, each a set of tracks.
    pub songs: Vec<Song>,
}

impl Score {
    /// Get a song by index.
    pub fn song(&self, index: usize) -> Result<&Song> {
        self.songs.get(index).ok_or_else(|| {
            EngineError::MissingResource(format!("no song with index {index}"))
        })
    }

    /// Get an instrument by index.
    pub fn instrument(&self, index: usize) -> Result<&Instrument> {
        self.instruments.get(index).ok_or_else(|| {
            EngineError::MissingResource(format!("no instrument with index {index}"))
        })
    }
}

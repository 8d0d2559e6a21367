//! Parsing of MIDI-style music events from song tracks.
//!
//! A track's data is a byte stream of variable-length tick deltas and
//! events. [`MusicStream`] turns it into a lazy sequence of events scheduled
//! against the caller's tick rate: the caller ticks the stream once per
//! output sample and drains whatever events have come due.

use infierno_core::{EngineError, Result};

use crate::records::Track;

/// A music stream event.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MusicEvent {
    /// Start a note at a velocity. Both range over 0x00 to 0x7f.
    NoteOn {
        /// Note number.
        note: u8,
        /// Note volume.
        velocity: u8,
    },

    /// Release a note.
    NoteOff {
        /// Note number.
        note: u8,
    },

    /// Set the instrument. Also specified in the track header, so the
    /// player ignores it.
    SetInstrument(u16),

    /// Bend every playing note, -0x2000 to +0x2000.
    PitchBend(i16),

    /// Set the track master volume, 0x00 to 0x7f.
    Volume(u8),

    /// Set the pan offset applied to all notes in the track, 0x00 to 0x7f.
    PanOffset(u8),

    /// Mark a stream position. Carries the offset of the marker code. The
    /// track header's repeat point is what the player actually uses; the
    /// marker is parsed for completeness.
    SetMarker(usize),

    /// Jump back to a marker. Carries the marker number.
    JumpToMarker(u16),

    /// Unknown 0x0b code. Used once, in song 111; no audible effect has
    /// been identified, so it is treated as a no-op.
    Unknown0b(u8),

    /// Unknown 0x0e code. Used in songs 90, 92, 110, 111, and 112, always
    /// in pairs (0x7f then 0x00); no audible effect has been identified, so
    /// it is treated as a no-op.
    Unknown0e(u8),

    /// End of the stream.
    EndOfStream,
}

/// Streaming parser for a track's music data.
pub struct MusicStream<'a> {
    track: &'a Track,

    // Current byte position within the track data.
    position: usize,

    // Tick rates: the caller's (output samples per minute) and the track's
    // (beats per minute times ticks per beat).
    caller_ticks_per_minute: u32,
    track_ticks_per_minute: u32,

    // Position within the track in track ticks. The whole ticks are in
    // `tick_position`; `tick_fraction` counts caller ticks toward the next
    // whole tick, accumulating `track_ticks_per_minute` per caller tick out
    // of `caller_ticks_per_minute`.
    tick_position: u32,
    tick_fraction: u32,

    // Track time of the next event in the stream.
    next_event_time: u32,
}

impl<'a> MusicStream<'a> {
    /// Construct a parser over a track. `ticks_per_minute` is the caller's
    /// tick rate, normally the output sample rate times 60.
    pub fn new(track: &'a Track, ticks_per_minute: u32) -> Result<Self> {
        let mut stream = Self {
            track,
            position: 0,
            caller_ticks_per_minute: ticks_per_minute,
            track_ticks_per_minute: track.ticks_per_beat as u32 * track.beats_per_minute as u32,
            tick_position: 0,
            tick_fraction: 0,
            next_event_time: 0,
        };
        stream.next_event_time = stream.get_delta()?;
        Ok(stream)
    }

    /// Whether more events remain. Once an end-of-stream event has been
    /// extracted (or the data is exhausted) this returns false.
    pub fn is_running(&self) -> bool {
        self.position < self.track.data.len()
    }

    /// Advance the stream by one caller tick.
    pub fn tick(&mut self) {
        self.tick_fraction += self.track_ticks_per_minute;
        while self.tick_fraction >= self.caller_ticks_per_minute {
            self.tick_fraction -= self.caller_ticks_per_minute;
            self.tick_position += 1;
        }
    }

    /// Test if one or more events are due for extraction.
    pub fn have_event(&self) -> bool {
        self.position < self.track.data.len() && self.next_event_time <= self.tick_position
    }

    /// Extract the next event due at the current time, or `None` when
    /// nothing further is due yet. Multiple events can share a tick, so
    /// call this repeatedly until it returns `None`.
    pub fn get_event(&mut self) -> Result<Option<MusicEvent>> {
        if !self.have_event() {
            return Ok(None);
        }

        let code = self.get_byte()?;
        let event = match code {
            0x11 => MusicEvent::NoteOn {
                note: self.get_byte()?,
                velocity: self.get_byte()?,
            },
            0x12 => MusicEvent::NoteOff {
                note: self.get_byte()?,
            },
            0x07 => MusicEvent::SetInstrument(self.get_word()?),
            0x09 => MusicEvent::PitchBend(self.get_word()? as i16),
            0x0c => MusicEvent::Volume(self.get_byte()?),
            0x0d => MusicEvent::PanOffset(self.get_byte()?),
            0x23 => MusicEvent::SetMarker(self.position - 1),
            0x20 => MusicEvent::JumpToMarker(self.get_word()?),
            0x0b => MusicEvent::Unknown0b(self.get_byte()?),
            0x0e => MusicEvent::Unknown0e(self.get_byte()?),
            0x22 => {
                // Force the position to the end of the data.
                self.position = self.track.data.len();
                MusicEvent::EndOfStream
            }
            _ => {
                return Err(EngineError::CorruptStream(format!(
                    "unsupported music stream event code ${code:02x}"
                )));
            }
        };

        // Read the delta to the following event unless at the end.
        if self.position < self.track.data.len() {
            self.next_event_time += self.get_delta()?;
        }
        Ok(Some(event))
    }

    /// Set the current position in the stream. Used to handle repeats; the
    /// only valid targets are the repeat start and the end.
    pub fn seek(&mut self, position: usize) -> Result<()> {
        if position > self.track.data.len() {
            return Err(EngineError::MissingResource(
                "seek past the end of the music stream".into(),
            ));
        }
        self.position = position;
        Ok(())
    }

    fn get_byte(&mut self) -> Result<u8> {
        let byte = self.track.data.get(self.position).copied().ok_or_else(|| {
            EngineError::CorruptStream(
                "corrupt music data: read beyond the end of the stream".into(),
            )
        })?;
        self.position += 1;
        Ok(byte)
    }

    fn get_word(&mut self) -> Result<u16> {
        let low = self.get_byte()? as u16;
        let high = self.get_byte()? as u16;
        Ok(low | (high << 8))
    }

    /// Read a variable length tick delta: seven payload bits per byte, high
    /// bit set while more bytes follow.
    fn get_delta(&mut self) -> Result<u32> {
        let mut delta = 0u32;
        loop {
            let byte = self.get_byte()?;
            delta = (delta << 7) | (byte & 0x7f) as u32;
            if byte & 0x80 == 0 {
                return Ok(delta);
            }
        }
    }
}

//! Playback manager for a single track.

use infierno_core::{EngineError, Module, Result, Sample, Stereo};
use infierno_spu::{Channel, PatchBank};

use crate::music::{MusicEvent, MusicStream};
use crate::options::ExtractOptions;
use crate::records::{Instrument, Track};

/// Plays one track: drives the music stream, allocates a voice per note-on,
/// and mixes every sounding voice into the output.
///
/// The output sample is the unscaled sum of all currently playing notes;
/// the final output level is the composition graph's business.
pub struct TrackPlayer<'a> {
    instrument: &'a Instrument,
    patches: &'a PatchBank,

    sample_rate: u32,
    sinc_window: u32,
    limit_frequency: bool,
    repair_patches: bool,

    // Remaining number of times to play the track. 0 repeats indefinitely;
    // other values play exactly that many times.
    play_count: u32,

    // Repeat details from the track header.
    repeat: bool,
    repeat_start: usize,

    stream: MusicStream<'a>,

    // Master track volume, set by volume events ahead of the notes.
    track_volume: f32,

    // Pan offset applied to every note that starts in this track.
    pan_offset: i32,

    // Stereo width adjustment, -1.0 to 1.0.
    stereo_width: f32,

    // Current pitch bend at a sensitivity of 1.
    unit_pitch_bend: f32,

    // Sounding voices.
    channels: Vec<Channel<'a>>,
}

impl<'a> TrackPlayer<'a> {
    /// Construct a player for one track.
    ///
    /// The instrument records and patch bank must outlive the player; the
    /// voices it spawns borrow patch data directly.
    pub fn new(
        track: &'a Track,
        instrument: &'a Instrument,
        patches: &'a PatchBank,
        options: &ExtractOptions,
    ) -> Result<Self> {
        debug_assert!(options.sample_rate > 0);
        debug_assert!((-1.0..=1.0).contains(&options.stereo_width));
        Ok(Self {
            instrument,
            patches,
            sample_rate: options.sample_rate,
            sinc_window: options.sinc_window,
            limit_frequency: !options.unlimited_frequency,
            repair_patches: options.repair_patches,
            play_count: options.play_count,
            repeat: track.repeat,
            repeat_start: track.repeat_start as usize,
            stream: MusicStream::new(track, options.sample_rate * 60)?,
            track_volume: 1.0,
            pan_offset: 0,
            stereo_width: options.stereo_width,
            unit_pitch_bend: 0.0,
            channels: Vec::new(),
        })
    }

    /// Whether the track failed to honor a requested repeat: the stream ran
    /// dry with plays outstanding because the header never flagged a repeat.
    pub fn failed_to_repeat(&self) -> bool {
        self.play_count > 1
    }

    /// Start a voice playing a note.
    fn start_note(&mut self, note: u8, velocity: u8) -> Result<()> {
        debug_assert!(note <= 0x7f && velocity <= 0x7f);
        let sub = self.instrument.sub_instrument(note)?;

        // Fold the track, sub-instrument, and note volumes together.
        let combined_volume =
            self.track_volume * sub.volume as f32 / 0x7f as f32 * velocity as f32 / 0x7f as f32;

        let patch = self.patches.patch_by_id(sub.patch).ok_or_else(|| {
            EngineError::MissingResource(format!("no patch with id {}", sub.patch))
        })?;

        let frequency = self.instrument.note_to_frequency(note, self.unit_pitch_bend)?;
        let pan = (sub.pan as i32 + self.pan_offset).clamp(0x00, 0x7f) as u8;
        let pan = adjust_stereo_width(pan, self.stereo_width);

        let mut channel = Channel::new(
            patch,
            frequency,
            combined_volume,
            pan,
            sub.spu_ads,
            sub.spu_sr,
            self.sample_rate,
            self.sinc_window,
            self.limit_frequency,
            self.repair_patches,
        )?;
        channel.set_user_tag(note as u32);
        self.channels.push(channel);
        Ok(())
    }

    fn handle_event(&mut self, event: MusicEvent) -> Result<()> {
        match event {
            MusicEvent::NoteOn { note, velocity } => {
                if note > 0x7f {
                    return Err(EngineError::CorruptStream(
                        "invalid note number in note on event".into(),
                    ));
                }
                if velocity > 0x7f {
                    return Err(EngineError::CorruptStream(
                        "invalid volume in note on event".into(),
                    ));
                }
                self.start_note(note, velocity)?;
            }

            MusicEvent::NoteOff { note } => {
                if note > 0x7f {
                    return Err(EngineError::CorruptStream(
                        "invalid note number in note off event".into(),
                    ));
                }
                // Several voices can be playing the same note: releases
                // linger until their envelopes finish. Release all of them.
                for channel in &mut self.channels {
                    if channel.user_tag() == note as u32 {
                        channel.release();
                    }
                }
            }

            MusicEvent::PitchBend(bend) => {
                if !(-0x2000..=0x2000).contains(&(bend as i32)) {
                    return Err(EngineError::CorruptStream(
                        "invalid bend in pitch bend event".into(),
                    ));
                }
                self.unit_pitch_bend = bend as f32 / 0x2000 as f32 / 12.0;
                for channel in &mut self.channels {
                    let note = channel.user_tag() as u8;
                    let frequency =
                        self.instrument.note_to_frequency(note, self.unit_pitch_bend)?;
                    channel.set_frequency(frequency);
                }
            }

            MusicEvent::Volume(volume) => {
                if volume > 0x7f {
                    return Err(EngineError::CorruptStream(
                        "invalid volume in track volume event".into(),
                    ));
                }
                // Applies to future notes only. In the shipped songs the
                // volume is always set before any notes play, so nothing is
                // lost by not retrofitting it onto live voices.
                self.track_volume = volume as f32 / 0x7f as f32;
            }

            MusicEvent::PanOffset(pan) => {
                if pan > 0x7f {
                    return Err(EngineError::CorruptStream(
                        "invalid pan in track pan event".into(),
                    ));
                }
                self.pan_offset = pan as i32 - 0x40;
            }

            MusicEvent::JumpToMarker(_) => {
                // Honor the jump unless the requested plays are used up.
                if self.play_count != 1 {
                    if self.play_count > 0 {
                        self.play_count -= 1;
                    }
                    if self.repeat {
                        self.stream.seek(self.repeat_start)?;
                    }
                }
            }

            // The instrument is fixed by the track header, and the repeat
            // point comes from there too; markers and the unknown codes
            // have no observable effect.
            MusicEvent::SetInstrument(_)
            | MusicEvent::SetMarker(_)
            | MusicEvent::Unknown0b(_)
            | MusicEvent::Unknown0e(_)
            | MusicEvent::EndOfStream => {}
        }
        Ok(())
    }
}

impl<'a> Module<Stereo> for TrackPlayer<'a> {
    fn next(&mut self, out: &mut Stereo) -> Result<bool> {
        // Apply every event due at the current tick before generating the
        // sample for it.
        let mut live = !self.channels.is_empty() || self.stream.is_running();
        while let Some(event) = self.stream.get_event()? {
            live = true;
            self.handle_event(event)?;
        }

        if self.stream.is_running() {
            self.stream.tick();
        }

        // Mix all sounding voices, dropping the ones that have finished.
        *out = Stereo::ZERO;
        let mut index = 0;
        while index < self.channels.len() {
            let mut sample = Stereo::ZERO;
            if self.channels[index].next(&mut sample)? {
                *out += sample;
                index += 1;
            } else {
                self.channels.remove(index);
            }
        }
        Ok(live)
    }

    fn is_running(&mut self) -> bool {
        !self.channels.is_empty()
            || (self.repeat && (self.play_count == 0 || self.play_count > 1))
            || self.stream.is_running()
    }
}

/// Adjust a pan position for stereo width expansion or contraction.
///
/// The pan is remapped to [-1, +1], raised to a power derived from the
/// width, and remapped back. Although the halfway point of 0x00..0x7f lies
/// between 0x3f and 0x40, the songs use 0x40 for centre, so the remapping
/// is skewed to keep 0x40 fixed.
///
/// A width of zero changes nothing. Negative widths pull sounds toward the
/// centre (-1.0 is near mono, apart from sounds already hard left or
/// right); positive widths push off-centre sounds outward.
pub fn adjust_stereo_width(pan: u8, width: f32) -> u8 {
    debug_assert!(pan <= 0x7f);
    if width == 0.0 {
        return pan;
    }

    const CENTRE: f32 = 64.0;
    const LEFT_RANGE: f32 = CENTRE;
    const RIGHT_RANGE: f32 = 127.0 - CENTRE;
    let range = if (pan as f32) < CENTRE {
        LEFT_RANGE
    } else {
        RIGHT_RANGE
    };
    let remapped = (pan as f32 - CENTRE) / range;

    let strength = libm::powf(4.0, -width);
    let mut adjusted = remapped.signum() * libm::powf(remapped.abs(), strength);
    if adjusted.is_nan() {
        adjusted = 0.0;
    }

    let back_range = if adjusted < 0.0 { LEFT_RANGE } else { RIGHT_RANGE };
    let new_pan = libm::floorf(adjusted * back_range + CENTRE + 0.5) as i32;
    new_pan.clamp(0x00, 0x7f) as u8
}

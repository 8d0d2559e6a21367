//! SPU channel (voice) emulation.

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::atomic::{AtomicUsize, Ordering};

use infierno_core::{
    BoxedModule, Filter, FilterKind, LinearResampler, Module, Mono, Result, Sample, SincResampler,
    Stereo,
};

use crate::adpcm::Adpcm;
use crate::envelope::{Envelope, ENVELOPE_SAMPLE_RATE};
use crate::patches::Patch;

// Filter cutoff applied to patches as they are decoded from ADPCM.
const ADPCM_FILTER_CUTOFF: f64 = 0.33;

/// Filtering fix for a noisy patch.
struct FilterFix {
    id: u16,
    cutoff: f64,
}

// Replacement cutoffs for patches with audible high-pitched noise.
const FILTER_FIXES: [FilterFix; 4] = [
    FilterFix {
        id: 104,
        cutoff: 0.15,
    }, // Song 98.
    FilterFix {
        id: 112,
        cutoff: 0.15,
    }, // Song 102. Duplicates of this patch appear in other songs, but the
       // noise isn't apparent there so they are left alone.
    FilterFix {
        id: 128,
        cutoff: 0.20,
    }, // Song 113.
    FilterFix {
        id: 130,
        cutoff: 0.20,
    }, // Song 114.
];

// Current and high-water counts of simultaneously live channels.
static CURRENT_CHANNELS: AtomicUsize = AtomicUsize::new(0);
static MAXIMUM_CHANNELS: AtomicUsize = AtomicUsize::new(0);

/// Adapter that lets the channel keep a handle on its envelope for release
/// and pitch control while the envelope also feeds the resampling chain.
struct SharedEnvelope(Rc<RefCell<Envelope>>);

impl Module<Mono> for SharedEnvelope {
    fn next(&mut self, out: &mut Mono) -> Result<bool> {
        self.0.borrow_mut().next(out)
    }

    fn is_running(&mut self) -> bool {
        self.0.borrow_mut().is_running()
    }
}

/// One sounding note.
///
/// The channel resamples the patch waveform to the output rate, shapes it
/// with the ADSR envelope, and spreads it across the stereo field by its pan
/// position. It starts playing on construction and runs until either the
/// envelope finishes (after being released) or a non-repeating patch runs
/// out of data; either one stopping makes their product permanently zero, so
/// the waveform chain is dropped at that point.
pub struct Channel<'a> {
    // Patch decode chain: ADPCM -> low-pass -> sinc resampler. Dropped when
    // the channel stops.
    resampler: Option<SincResampler<'a, Mono>>,

    envelope: Rc<RefCell<Envelope>>,

    // The envelope itself at 44.1 kHz output, or a linear resampler around
    // it at any other rate.
    envelope_chain: BoxedModule<'a, Mono>,

    // Panning: full left is 0x00, centre 0x40, full right 0x7f.
    pan: u8,

    // Left and right volumes derived from the master volume and pan.
    volume: Stereo,

    // Whether to enforce the maximum playback frequency of a real PSX.
    limit_frequency: bool,

    // Value slot for the owner; the track player stores the note number
    // here so note-off events can find the right voices.
    user_tag: u32,
}

impl<'a> Channel<'a> {
    /// Start a note playing.
    ///
    /// `frequency` is the playback frequency of the patch in Hz, `volume` is
    /// 0.0 to 1.0, and `pan` is 0x00 (left) to 0x7f (right). The two
    /// register words configure the ADSR envelope. When `repair` is set, the
    /// known-noisy patches get a tighter low-pass than the standard decode
    /// filter.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        patch: &'a Patch,
        frequency: u32,
        volume: f32,
        pan: u8,
        spu_ads: u16,
        spu_sr: u16,
        sample_rate: u32,
        sinc_window: u32,
        apply_psx_limit: bool,
        repair: bool,
    ) -> Result<Self> {
        debug_assert!(frequency > 0);
        debug_assert!(pan <= 0x7f);

        let current = CURRENT_CHANNELS.fetch_add(1, Ordering::Relaxed) + 1;
        MAXIMUM_CHANNELS.fetch_max(current, Ordering::Relaxed);

        // The decoder output is filtered before resampling to reduce
        // artifacts from low quality patches; filtering at the patch rate
        // gives better results than filtering after resampling.
        let mut cutoff = ADPCM_FILTER_CUTOFF;
        if repair {
            if let Some(fix) = FILTER_FIXES.iter().find(|fix| fix.id == patch.id) {
                cutoff = fix.cutoff;
            }
        }
        let decoder: BoxedModule<'a, Mono> = Box::new(Adpcm::new(&patch.adpcm, 0));
        let filtered: BoxedModule<'a, Mono> =
            Box::new(Filter::new(decoder, FilterKind::LowPass, cutoff)?);
        let limited = limit_frequency(frequency, apply_psx_limit);
        let resampler = SincResampler::new(filtered, sinc_window, limited, sample_rate)?;

        // Resample the envelope when its fixed rate does not match ours. A
        // linear resampler is wrong for real audio but fine here: the
        // envelope is close to piecewise linear and never overshoots.
        let envelope = Rc::new(RefCell::new(Envelope::new(spu_ads, spu_sr)));
        let envelope_chain: BoxedModule<'a, Mono> = if sample_rate != ENVELOPE_SAMPLE_RATE {
            Box::new(LinearResampler::new(
                Box::new(SharedEnvelope(Rc::clone(&envelope))),
                ENVELOPE_SAMPLE_RATE,
                sample_rate,
            )?)
        } else {
            Box::new(SharedEnvelope(Rc::clone(&envelope)))
        };

        let mut channel = Self {
            resampler: Some(resampler),
            envelope,
            envelope_chain,
            pan,
            volume: Stereo::ZERO,
            limit_frequency: apply_psx_limit,
            user_tag: 0,
        };
        channel.set_master_volume(volume);
        Ok(channel)
    }

    /// Maximum playback frequency of the PSX SPU.
    pub fn spu_max_frequency() -> u32 {
        4 * 44_100
    }

    /// High-water mark of simultaneously live channels.
    pub fn maximum_channels() -> usize {
        MAXIMUM_CHANNELS.load(Ordering::Relaxed)
    }

    /// Reset the high-water mark to the current live count.
    pub fn reset_maximum_channels() {
        MAXIMUM_CHANNELS.store(CURRENT_CHANNELS.load(Ordering::Relaxed), Ordering::Relaxed);
    }

    /// Set the master volume (0.0 to 1.0) and derive the per-side volumes.
    ///
    /// MIDI pans with cosine and sine curves to keep the apparent volume
    /// constant as a sound moves (Recommended Practice RP-036); the sound
    /// player in PSX Doom uses a simple linear blend instead, and so does
    /// this.
    pub fn set_master_volume(&mut self, volume: f32) {
        self.volume = Stereo::new(
            volume * (128 - self.pan as i32) as f32 / 128.0,
            volume * (self.pan as i32 + 1) as f32 / 128.0,
        );
    }

    /// Start the release phase of the envelope.
    pub fn release(&mut self) {
        self.envelope.borrow_mut().release();
    }

    /// Alter the playback frequency of the patch currently playing. Used for
    /// pitch bends; the resampler window is kept, so there is no glitch.
    pub fn set_frequency(&mut self, frequency: u32) {
        let limited = limit_frequency(frequency, self.limit_frequency);
        if let Some(resampler) = self.resampler.as_mut() {
            resampler.set_rate_in(limited);
        }
    }

    /// Value slot for the owner of the channel.
    pub fn user_tag(&self) -> u32 {
        self.user_tag
    }

    /// Store a value in the owner's slot.
    pub fn set_user_tag(&mut self, value: u32) {
        self.user_tag = value;
    }
}

impl<'a> Drop for Channel<'a> {
    fn drop(&mut self) {
        CURRENT_CHANNELS.fetch_sub(1, Ordering::Relaxed);
    }
}

impl<'a> Module<Stereo> for Channel<'a> {
    fn next(&mut self, out: &mut Stereo) -> Result<bool> {
        let Some(resampler) = self.resampler.as_mut() else {
            *out = Stereo::ZERO;
            return Ok(false);
        };

        let mut waveform = 0.0;
        let mut envelope = 0.0;
        let resampler_live = resampler.next(&mut waveform)?;
        let envelope_live = self.envelope_chain.next(&mut envelope)?;
        *out = self.volume * (waveform * envelope);
        debug_assert!(out.is_finite());

        // Once either the waveform or the envelope stops their product is
        // guaranteed to stay zero, so the channel stops for good.
        if !resampler_live || !envelope_live {
            self.resampler = None;
        }
        Ok(true)
    }

    fn is_running(&mut self) -> bool {
        self.resampler.is_some()
    }
}

/// Limit a playback frequency to the allowed range: never below 1 Hz, and
/// never above the SPU maximum unless the limit is lifted.
fn limit_frequency(frequency: u32, apply_psx_limit: bool) -> u32 {
    if frequency == 0 {
        1
    } else if apply_psx_limit && frequency > Channel::spu_max_frequency() {
        Channel::spu_max_frequency()
    } else {
        frequency
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adpcm::BLOCK_SIZE;
    use crate::patches::PATCH_SAMPLE_RATE;

    /// A short non-repeating patch with an audible ramp.
    fn test_patch(id: u16, blocks: usize) -> Patch {
        let mut data = Vec::new();
        for index in 0..blocks {
            let mut block = vec![0x04u8, 0x00];
            block.resize(BLOCK_SIZE, 0x37);
            if index + 1 == blocks {
                block[1] = 0x01;
            }
            data.extend(block);
        }
        Patch::new(id, data)
    }

    fn drain(channel: &mut Channel<'_>) -> Vec<Stereo> {
        let mut output = Vec::new();
        let mut s = Stereo::ZERO;
        while channel.next(&mut s).unwrap() {
            output.push(s);
            assert!(output.len() < 1_000_000, "channel never stopped");
        }
        output
    }

    #[test]
    fn limits_frequency_to_the_spu_range() {
        assert_eq!(limit_frequency(0, true), 1);
        assert_eq!(limit_frequency(0, false), 1);
        assert_eq!(limit_frequency(44_100, true), 44_100);
        assert_eq!(limit_frequency(10_000_000, true), 4 * 44_100);
        assert_eq!(limit_frequency(10_000_000, false), 10_000_000);
    }

    #[test]
    fn non_repeating_patch_stops_the_channel() {
        let patch = test_patch(1, 4);
        let mut channel = Channel::new(
            &patch,
            PATCH_SAMPLE_RATE,
            1.0,
            0x40,
            0x0000,
            0x0000,
            PATCH_SAMPLE_RATE,
            3,
            true,
            false,
        )
        .unwrap();

        let output = drain(&mut channel);
        // Four blocks of 28 samples, plus the resampler ringing out.
        assert!(output.len() >= 4 * 28);
        assert!(output.len() < 4 * 28 + 64);
        assert!(!channel.is_running());

        // Stopped channels report stopped forever.
        let mut s = Stereo::ZERO;
        assert!(!channel.next(&mut s).unwrap());
        assert_eq!(s, Stereo::ZERO);
    }

    #[test]
    fn centre_pan_spreads_almost_evenly() {
        let patch = test_patch(1, 8);
        let mut channel = Channel::new(
            &patch,
            PATCH_SAMPLE_RATE,
            1.0,
            0x40,
            0x0000,
            0x0000,
            PATCH_SAMPLE_RATE,
            3,
            true,
            false,
        )
        .unwrap();
        let output = drain(&mut channel);
        let loud = output
            .iter()
            .find(|s| s.magnitude() > 0.01)
            .expect("patch produced no audio");
        // Linear pan law: left = 64/128, right = 65/128 of the master.
        let ratio = loud.left / loud.right;
        assert!((ratio - 64.0 / 65.0).abs() < 1e-3, "ratio {ratio}");
    }

    #[test]
    fn hard_left_pan_silences_the_right_channel() {
        let patch = test_patch(1, 8);
        let mut channel = Channel::new(
            &patch,
            PATCH_SAMPLE_RATE,
            1.0,
            0x00,
            0x0000,
            0x0000,
            PATCH_SAMPLE_RATE,
            3,
            true,
            false,
        )
        .unwrap();
        let output = drain(&mut channel);
        let peak_left = output.iter().map(|s| s.left.abs()).fold(0.0f32, f32::max);
        let peak_right = output.iter().map(|s| s.right.abs()).fold(0.0f32, f32::max);
        assert!(peak_left > 0.01);
        // Full left still leaks 1/128th to the right under the linear law.
        assert!(peak_right < peak_left / 64.0);
    }

    #[test]
    fn release_ends_a_looping_patch() {
        // A looping patch never exhausts its data, so only the envelope can
        // end the channel.
        let mut data = vec![0x04u8, 0x04];
        data.resize(BLOCK_SIZE, 0x55);
        data.extend_from_slice(&[0x04, 0x03]);
        data.resize(2 * BLOCK_SIZE, 0x22);
        let patch = Patch::new(2, data);

        let mut channel = Channel::new(
            &patch,
            PATCH_SAMPLE_RATE,
            0.5,
            0x40,
            0x0000,
            0x0000,
            PATCH_SAMPLE_RATE,
            3,
            true,
            false,
        )
        .unwrap();

        let mut s = Stereo::ZERO;
        for _ in 0..1000 {
            assert!(channel.next(&mut s).unwrap());
        }
        channel.release();
        let mut remaining = 0u32;
        while channel.next(&mut s).unwrap() {
            remaining += 1;
            assert!(remaining < 100_000, "release never ended the channel");
        }
    }

    #[test]
    fn user_tag_round_trips() {
        let patch = test_patch(1, 1);
        let mut channel = Channel::new(
            &patch,
            PATCH_SAMPLE_RATE,
            1.0,
            0x40,
            0x0000,
            0x0000,
            44_100,
            3,
            true,
            false,
        )
        .unwrap();
        assert_eq!(channel.user_tag(), 0);
        channel.set_user_tag(60);
        assert_eq!(channel.user_tag(), 60);
    }

    #[test]
    fn channel_count_high_water_mark_tracks_live_channels() {
        let patch = test_patch(1, 1);
        Channel::reset_maximum_channels();
        let before = Channel::maximum_channels();
        {
            let _a = Channel::new(
                &patch,
                PATCH_SAMPLE_RATE,
                1.0,
                0x40,
                0,
                0,
                44_100,
                3,
                true,
                false,
            )
            .unwrap();
            let _b = Channel::new(
                &patch,
                PATCH_SAMPLE_RATE,
                1.0,
                0x40,
                0,
                0,
                44_100,
                3,
                true,
                false,
            )
            .unwrap();
            assert!(Channel::maximum_channels() >= before.max(2));
        }
    }
}

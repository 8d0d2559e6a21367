//! Silence adjustment: lead-in, lead-out, and gaps.

use crate::error::{EngineError, Result};
use crate::module::{BoxedModule, Module};
use crate::sample::Sample;

/// Audio processing states.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum State {
    LeadIn,
    Gaps,
    LeadOut,
    Finished,
}

/// Adjusts the lead-in, lead-out, and silent gaps of an audio stream.
///
/// The module buffers runs of silence (as a counter, not samples) together
/// with the next non-silent sample, then replays them with the configured
/// adjustments: a fixed amount of silence before the first audible sample, a
/// cap on the length of silent runs inside the audio, and a fixed amount of
/// silence after the source has finished.
pub struct Silencer<'a, S: Sample> {
    source: BoxedModule<'a, S>,

    // Number of silent samples to enforce at the start and end of audio.
    // Negative values deactivate the setting.
    lead_in: i64,
    lead_out: i64,

    // Maximum length allowed for silent runs between non-silent audio. A
    // negative value deactivates the setting.
    gap: i64,

    state: State,

    // Silent samples awaiting output, followed by at most one buffered
    // non-silent sample.
    buffered_silence: u64,
    pending: Option<S>,

    // Error raised while probing from is_running, delivered by the next
    // next() call.
    deferred_error: Option<EngineError>,
}

impl<'a, S: Sample> Silencer<'a, S> {
    /// Construct a silencer.
    ///
    /// All three settings are sample counts; negative values disable them.
    /// When set, `gap` must be at least 1, otherwise every zero crossing
    /// would be treated as a silent run.
    pub fn new(source: BoxedModule<'a, S>, lead_in: i64, lead_out: i64, gap: i64) -> Result<Self> {
        if gap == 0 {
            return Err(EngineError::InvalidConfig(
                "maximum gap must be at least one sample".into(),
            ));
        }
        Ok(Self {
            source,
            lead_in,
            lead_out,
            gap,
            state: State::LeadIn,
            buffered_silence: 0,
            pending: None,
            deferred_error: None,
        })
    }

    fn buffers_empty(&self) -> bool {
        self.buffered_silence == 0 && self.pending.is_none()
    }

    /// Pull from the source until a non-silent sample or the end of stream,
    /// then apply the state machine to what was buffered. Must only be called
    /// with empty buffers.
    fn process_audio(&mut self) -> Result<()> {
        debug_assert!(self.buffers_empty());
        let mut sample = S::ZERO;
        while self.pending.is_none() {
            if !self.source.next(&mut sample)? {
                break;
            }
            if sample.is_silent() {
                self.buffered_silence += 1;
            } else {
                self.pending = Some(sample);
            }
        }

        // Gaps: whenever a non-silent sample follows buffered silence, limit
        // the run to the maximum gap. When none follows, lead-out begins.
        if self.state == State::Gaps {
            if self.pending.is_some() {
                if self.gap >= 0 && self.buffered_silence > self.gap as u64 {
                    self.buffered_silence = self.gap as u64;
                }
            } else {
                self.state = State::LeadOut;
            }
        }

        // Lead-out: replace whatever silence the source ended with.
        if self.state == State::LeadOut {
            if self.lead_out >= 0 {
                self.buffered_silence = self.lead_out as u64;
            }
            self.state = State::Finished;
        }

        // Lead-in: happens only on the first pass, before any non-silent
        // sample has been seen.
        if self.state == State::LeadIn {
            if self.lead_in >= 0 {
                self.buffered_silence = self.lead_in as u64;
            }
            self.state = if self.pending.is_some() {
                State::Gaps
            } else {
                State::LeadOut
            };
        }
        Ok(())
    }
}

impl<'a, S: Sample> Module<S> for Silencer<'a, S> {
    fn next(&mut self, out: &mut S) -> Result<bool> {
        if let Some(err) = self.deferred_error.take() {
            return Err(err);
        }
        if self.buffers_empty() && self.state != State::Finished {
            self.process_audio()?;
        }

        // Buffered silence is always output first.
        if self.buffered_silence > 0 {
            self.buffered_silence -= 1;
            *out = S::ZERO;
            return Ok(true);
        }
        if let Some(sample) = self.pending.take() {
            *out = sample;
            return Ok(true);
        }

        debug_assert_eq!(self.state, State::Finished);
        *out = S::ZERO;
        Ok(false)
    }

    fn is_running(&mut self) -> bool {
        if self.deferred_error.is_some() {
            return true;
        }
        if self.buffers_empty() && self.state != State::Finished {
            if let Err(err) = self.process_audio() {
                self.deferred_error = Some(err);
                return true;
            }
        }
        !self.buffers_empty()
    }
}

//! Audio statistics collection.

use std::time::Instant;

use crate::error::Result;
use crate::math::amplitude_to_decibels;
use crate::module::{BoxedModule, Module};
use crate::sample::Sample;

/// Statistics collection modes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StatisticsMode {
    /// Measure only the progress of audio generation.
    Progress,
    /// Track level statistics as well.
    Detailed,
}

/// Callback used to report progress.
///
/// Receives the amount of audio generated in whole seconds, the rate of
/// extraction (stream time relative to wall time; 0 until enough data exists
/// for a proper estimate), and the label supplied at construction.
pub type ProgressFn<'a> = &'a dyn Fn(u32, f64, &str);

/// Transparent pass-through that records what flows through it.
///
/// Counts samples, optionally tracks the maximum magnitude and the RMS
/// level, and fires the progress callback once per emitted second of audio.
pub struct Statistics<'a, S: Sample> {
    source: BoxedModule<'a, S>,
    mode: StatisticsMode,
    rate: u32,
    callback: Option<ProgressFn<'a>>,
    label: String,

    // Wall time of the first sample.
    start_time: Option<Instant>,

    // Elapsed half seconds when the extraction rate was last recalculated.
    last_rate_time: u32,
    extraction_rate: f64,

    samples: u64,
    samples_until_next_second: u32,

    maximum: f32,

    // Sum of the squares of all sample magnitudes. Despite accumulating a
    // huge number of small values, an f64 carries far more precision than
    // the result needs.
    rms_total: f64,
}

impl<'a, S: Sample> Statistics<'a, S> {
    /// Construct a statistics module. `rate` is the stream's sample rate.
    pub fn new(
        source: BoxedModule<'a, S>,
        mode: StatisticsMode,
        rate: u32,
        callback: Option<ProgressFn<'a>>,
        label: impl Into<String>,
    ) -> Self {
        debug_assert!(rate > 0);
        Self {
            source,
            mode,
            rate,
            callback,
            label: label.into(),
            start_time: None,
            last_rate_time: 0,
            extraction_rate: 0.0,
            samples: 0,
            samples_until_next_second: rate,
            maximum: 0.0,
            rms_total: 0.0,
        }
    }

    /// Last calculated extraction rate. Remains 0 until enough audio has
    /// been generated to give a proper estimate.
    pub fn extraction_rate(&self) -> f64 {
        self.extraction_rate
    }

    /// Number of samples that have passed through.
    pub fn samples(&self) -> u64 {
        self.samples
    }

    /// Maximum sample magnitude seen. Only meaningful in detailed mode.
    pub fn maximum_amplitude(&self) -> f32 {
        debug_assert_eq!(self.mode, StatisticsMode::Detailed);
        self.maximum
    }

    /// Maximum level in dB. Only meaningful in detailed mode.
    pub fn maximum_db(&self) -> f64 {
        amplitude_to_decibels(self.maximum_amplitude() as f64)
    }

    /// RMS level in dB. Only meaningful in detailed mode.
    pub fn rms_db(&self) -> f64 {
        debug_assert_eq!(self.mode, StatisticsMode::Detailed);
        if self.samples > 0 {
            amplitude_to_decibels(libm::sqrt(self.rms_total / self.samples as f64))
        } else {
            0.0
        }
    }
}

impl<'a, S: Sample> Module<S> for Statistics<'a, S> {
    fn next(&mut self, out: &mut S) -> Result<bool> {
        // Start the wall clock on the first extraction.
        if self.samples == 0 {
            self.start_time = Some(Instant::now());
        }
        self.samples += 1;
        let live = self.source.next(out)?;

        if self.mode == StatisticsMode::Detailed {
            self.maximum = self.maximum.max(out.magnitude());
            self.rms_total += (out.magnitude() as f64) * (out.magnitude() as f64);
        }

        // Report progress once per second of extracted audio, refreshing the
        // rate estimate every half wall second.
        self.samples_until_next_second -= 1;
        if self.samples_until_next_second == 0 {
            self.samples_until_next_second = self.rate;
            let stream_seconds = (self.samples / self.rate as u64) as u32;
            let elapsed = self
                .start_time
                .map(|t| t.elapsed().as_secs_f64())
                .unwrap_or(0.0);
            let elapsed_half_seconds = (2.0 * elapsed) as u32;
            if elapsed_half_seconds != self.last_rate_time {
                self.extraction_rate = (stream_seconds as f64 / elapsed).clamp(0.0, 1_000_000.0);
                self.last_rate_time = elapsed_half_seconds;
            }
            if let Some(callback) = self.callback {
                callback(stream_seconds, self.extraction_rate, &self.label);
            }
        }
        Ok(live)
    }

    fn is_running(&mut self) -> bool {
        self.source.is_running()
    }
}

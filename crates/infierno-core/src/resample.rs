//! Resampling of audio to arbitrary rates.
//!
//! Two resamplers are provided. [`LinearResampler`] interpolates between two
//! buffered samples; its quality is poor for real audio but fine for signals
//! that are close to piecewise linear, such as envelope curves.
//! [`SincResampler`] interpolates with a Lanczos windowed sinc kernel and is
//! the one used on waveform data.
//!
//! Both take a `rate_in` and a `rate_out`. The actual values are irrelevant;
//! all that matters is their ratio. Audio with a pitch correct at `rate_in`
//! keeps that pitch when the output is played at `rate_out`. The input rate
//! can be changed while running, which is how pitch bends are applied.

use std::sync::{Arc, Mutex, OnceLock};

use crate::error::Result;
use crate::module::{BoxedModule, Module};
use crate::sample::Sample;

/// Linear interpolation between source samples.
///
/// Keeps a two-sample window over the source and a fractional position with
/// `rate_out` steps per source sample. The resampler keeps running until the
/// last real source sample has moved out of the window.
pub struct LinearResampler<'a, S: Sample> {
    source: BoxedModule<'a, S>,
    rate_in: u32,
    rate_out: u32,

    // Buffered samples. The buffer is always filled.
    buffer: [S; 2],

    // Fractional position between the buffered samples.
    fractional_position: u32,

    // Window index of the last real source sample.
    last_live_sample: i32,
}

impl<'a, S: Sample> LinearResampler<'a, S> {
    /// Construct a linear resampler and prime its window from the source.
    pub fn new(mut source: BoxedModule<'a, S>, rate_in: u32, rate_out: u32) -> Result<Self> {
        debug_assert!(rate_in > 0 && rate_out > 0);
        let mut buffer = [S::ZERO; 2];
        source.next(&mut buffer[0])?;
        source.next(&mut buffer[1])?;
        Ok(Self {
            source,
            rate_in,
            rate_out,
            buffer,
            fractional_position: 0,
            last_live_sample: 1,
        })
    }

    /// Input sample rate.
    pub fn rate_in(&self) -> u32 {
        self.rate_in
    }

    /// Change the input sample rate.
    pub fn set_rate_in(&mut self, rate: u32) {
        debug_assert!(rate > 0);
        self.rate_in = rate;
    }
}

impl<'a, S: Sample> Module<S> for LinearResampler<'a, S> {
    fn next(&mut self, out: &mut S) -> Result<bool> {
        if self.last_live_sample < 0 {
            *out = S::ZERO;
            return Ok(false);
        }

        // Interpolate at the current position; a position of zero lands
        // exactly on the first buffered sample.
        let step = self.rate_out;
        *out = if self.fractional_position == 0 {
            self.buffer[0]
        } else {
            let pos = self.fractional_position as f32 / step as f32;
            self.buffer[0] * (1.0 - pos) + self.buffer[1] * pos
        };

        // Advance through the data and replenish the window as needed. When
        // the source dries up, count the last real sample out of the window.
        self.fractional_position += self.rate_in;
        while self.fractional_position >= step && self.last_live_sample >= 0 {
            self.fractional_position -= step;
            self.buffer[0] = self.buffer[1];
            if !self.source.next(&mut self.buffer[1])? {
                self.last_live_sample -= 1;
            }
        }
        Ok(true)
    }

    fn is_running(&mut self) -> bool {
        self.last_live_sample >= 0
    }
}

/// Pre-computed table of Lanczos windowed sinc values.
///
/// Tables are expensive to prepare, so they are cached process-wide keyed by
/// `(window, rate_out)` and never evicted. In practice at most two tables
/// exist at once: one for the output rate and one for the reverb rate.
pub struct SincTable {
    window: u32,
    rate_out: u32,
    table: Vec<f32>,
}

impl SincTable {
    /// Obtain a table, building it on first use.
    pub fn obtain(window: u32, rate_out: u32) -> Arc<SincTable> {
        static CACHE: OnceLock<Mutex<Vec<Arc<SincTable>>>> = OnceLock::new();
        let cache = CACHE.get_or_init(|| Mutex::new(Vec::new()));
        let mut cache = cache.lock().unwrap_or_else(|poison| poison.into_inner());
        if let Some(table) = cache
            .iter()
            .find(|t| t.window == window && t.rate_out == rate_out)
        {
            return Arc::clone(table);
        }
        let table = Arc::new(SincTable::build(window, rate_out));
        cache.push(Arc::clone(&table));
        table
    }

    /// Compute the table values, covering the range (-pi * window, pi * window].
    ///
    /// It would be natural to organize the values linearly, but they are read
    /// by striding through them (by `rate_out`), which would disperse the
    /// memory accesses and miss the CPU cache. Instead the values are grouped
    /// by starting offset, so the `2 * window` values used for one
    /// interpolation are contiguous.
    ///
    /// The value at position 0 is 1.0, and the rest are given by
    /// `sinc(x) * sinc(x / w)`, which expands to
    /// `w * sin(pi x) * sin(pi x / w) / (pi^2 x^2)`.
    fn build(window: u32, rate_out: u32) -> SincTable {
        assert!(window >= 1);
        assert!(rate_out > 0);
        let taps = (window * 2) as usize;
        let mut table = vec![0.0f32; rate_out as usize * taps];
        let base_pos = -((window as i64 - 1) * rate_out as i64);
        let scale = std::f64::consts::PI / rate_out as f64;
        let mut index = 0;
        for offset in 0..rate_out as i64 {
            let mut pos = base_pos - offset;
            let end_pos = pos + rate_out as i64 * taps as i64;
            while pos < end_pos {
                table[index] = if pos != 0 {
                    let pi_x = scale * pos as f64;
                    let value = window as f64 * libm::sin(pi_x) * libm::sin(pi_x / window as f64)
                        / (pi_x * pi_x);
                    (value as f32).flush_denorm()
                } else {
                    1.0
                };
                index += 1;
                pos += rate_out as i64;
            }
        }
        debug_assert_eq!(index, table.len());
        SincTable {
            window,
            rate_out,
            table,
        }
    }

    /// Window size the table was built for.
    pub fn window(&self) -> u32 {
        self.window
    }

    /// Output rate the table was built for.
    pub fn rate_out(&self) -> u32 {
        self.rate_out
    }

    /// The flat table of values. Use [`SincTable::index_for_offset`] to find
    /// the starting index, where `2 * window` values follow.
    pub fn table(&self) -> &[f32] {
        &self.table
    }

    /// Starting table index for an offset in `[0, rate_out)`.
    pub fn index_for_offset(&self, offset: u32) -> usize {
        debug_assert!(offset < self.rate_out);
        offset as usize * (self.window * 2) as usize
    }
}

/// Resample with a Lanczos windowed sinc filter.
///
/// A window size of 7 gives high quality results; 3 is generally
/// satisfactory though some artifacts can be audible. The cost per output
/// sample is proportional to the window size.
///
/// When resampling to a lower rate the source should ideally be pre-filtered
/// to remove frequencies above the Nyquist limit of the output.
pub struct SincResampler<'a, S: Sample> {
    source: BoxedModule<'a, S>,
    rate_in: u32,
    rate_out: u32,

    // Buffered samples. The buffer is twice the window size, always filled,
    // and circular: the sample at `head` is just under a window to the left
    // of the interpolation position.
    buffer: Vec<S>,
    head: usize,

    // Offset of the first buffered sample relative to the interpolation
    // position, in fractions of a sample with `rate_out` steps per sample.
    offset: i64,

    // Number of live samples left in the buffer. The resampler stops when no
    // real samples remain.
    live_samples: i32,

    table: Arc<SincTable>,
}

impl<'a, S: Sample> SincResampler<'a, S> {
    /// Construct a sinc resampler. The window size must be at least 1.
    ///
    /// The buffer is primed by repeating the first source sample up to where
    /// the position reaches 0, then pulling real samples. This places the
    /// zero-phase position on the very first sample, so the resampler has no
    /// start-up delay.
    pub fn new(
        mut source: BoxedModule<'a, S>,
        window: u32,
        rate_in: u32,
        rate_out: u32,
    ) -> Result<Self> {
        debug_assert!(window >= 1);
        debug_assert!(rate_in > 0 && rate_out > 0);
        let size = (window * 2) as usize;
        let mut buffer = vec![S::ZERO; size];
        source.next(&mut buffer[0])?;
        let mut pos = -(rate_out as i64) * (window as i64 - 1);
        for index in 1..size {
            if pos <= 0 {
                buffer[index] = buffer[0];
            } else {
                source.next(&mut buffer[index])?;
            }
            pos += rate_out as i64;
        }
        Ok(Self {
            source,
            rate_in,
            rate_out,
            buffer,
            head: 0,
            offset: 0,
            live_samples: size as i32,
            table: SincTable::obtain(window, rate_out),
        })
    }

    /// Input sample rate.
    pub fn rate_in(&self) -> u32 {
        self.rate_in
    }

    /// Change the input sample rate. The buffered window is kept, so the
    /// pitch changes without any re-priming glitch.
    pub fn set_rate_in(&mut self, rate: u32) {
        debug_assert!(rate > 0);
        self.rate_in = rate;
    }

    /// Output sample rate.
    pub fn rate_out(&self) -> u32 {
        self.rate_out
    }
}

impl<'a, S: Sample> Module<S> for SincResampler<'a, S> {
    fn next(&mut self, out: &mut S) -> Result<bool> {
        *out = S::ZERO;
        if self.live_samples <= 0 {
            return Ok(false);
        }

        // Interpolate at the current position: the dot product of the buffer
        // window with one contiguous row of the sinc table.
        debug_assert!(self.offset >= 0 && self.offset < self.rate_out as i64);
        let table = self.table.table();
        let mut acc = S::ZERO;
        let mut buffer_index = self.head;
        let table_index = self.table.index_for_offset(self.offset as u32);
        for &weight in &table[table_index..table_index + self.buffer.len()] {
            acc += self.buffer[buffer_index] * weight;
            buffer_index += 1;
            if buffer_index >= self.buffer.len() {
                buffer_index = 0;
            }
        }
        *out = acc.flush_denorm();
        debug_assert!(out.is_finite());

        // Advance the filter. When the source has finished, repeat the
        // previous sample and count down the live samples left.
        self.offset += self.rate_in as i64;
        let limit = self.rate_out as i64;
        while self.offset >= limit {
            self.offset -= limit;
            if !self.source.next(&mut self.buffer[self.head])? {
                let previous = if self.head > 0 {
                    self.head - 1
                } else {
                    self.buffer.len() - 1
                };
                self.buffer[self.head] = self.buffer[previous];
                self.live_samples -= 1;
            }
            self.head += 1;
            if self.head >= self.buffer.len() {
                self.head = 0;
            }
        }
        Ok(true)
    }

    fn is_running(&mut self) -> bool {
        self.live_samples > 0
    }
}

//! Butterworth IIR filtering (second order).

use crate::error::{EngineError, Result};
use crate::module::{BoxedModule, Module};
use crate::sample::Sample;

/// Filter response types.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FilterKind {
    /// Attenuate above the cutoff.
    LowPass,
    /// Attenuate below the cutoff.
    HighPass,
}

/// Second-order Butterworth filter.
///
/// The filter reduces the amplitude of the source by -3.01 dB at the cutoff
/// frequency, which equates to a reduction to 0.7071. The response of the
/// low-pass form around the cutoff is as follows (invert the octave offset
/// for the high-pass form):
///
/// | Octave     | Reduction (dB : amplitude) |
/// |------------|----------------------------|
/// | cutoff - 1 | -0.25 dB : 0.9716          |
/// | cutoff     | -3.01 dB : 0.7071          |
/// | cutoff + 1 | -12 dB   : 0.2512          |
/// | cutoff + 2 | -24 dB   : 0.0631          |
/// | cutoff + 3 | -36 dB   : 0.0158          |
///
/// Stereo filtering processes the two channels independently with shared
/// coefficients.
pub struct Filter<'a, S: Sample> {
    source: BoxedModule<'a, S>,
    kind: FilterKind,

    // Coefficients of x.
    a0: f32,
    a1: f32,
    a2: f32,

    // Coefficients of y.
    b1: f32,
    b2: f32,

    // Previous inputs and outputs.
    x1: S,
    x2: S,
    y1: S,
    y2: S,
}

impl<'a, S: Sample> Filter<'a, S> {
    /// Construct a filter over a source stream.
    ///
    /// The cutoff is the frequency, as a fraction of the sample rate, where
    /// the filter reduces the amplitude by -3 dB. It must lie in [0.0, 0.5).
    pub fn new(source: BoxedModule<'a, S>, kind: FilterKind, cut_off: f64) -> Result<Self> {
        let mut filter = Self {
            source,
            kind,
            a0: 0.0,
            a1: 0.0,
            a2: 0.0,
            b1: 0.0,
            b2: 0.0,
            x1: S::ZERO,
            x2: S::ZERO,
            y1: S::ZERO,
            y2: S::ZERO,
        };
        filter.adjust(cut_off)?;
        Ok(filter)
    }

    /// Set a new cutoff without clearing the filter state.
    pub fn adjust(&mut self, cut_off: f64) -> Result<()> {
        if !(0.0..0.5).contains(&cut_off) {
            return Err(EngineError::InvalidConfig(format!(
                "filter cutoff {cut_off} is outside [0.0, 0.5)"
            )));
        }

        // Raw coefficients for a second order Butterworth.
        let w0 = 2.0 * std::f64::consts::PI * cut_off;
        let cos_w0 = libm::cos(w0);
        let alpha = libm::sin(w0) / std::f64::consts::SQRT_2;
        let b0 = 1.0 + alpha;
        let b1 = -2.0 * cos_w0;
        let b2 = 1.0 - alpha;
        let (a0, a1) = match self.kind {
            FilterKind::LowPass => (0.5 * (1.0 - cos_w0), 1.0 - cos_w0),
            FilterKind::HighPass => (0.5 * (1.0 + cos_w0), -1.0 - cos_w0),
        };

        // Normalize so the filter has 0 dB gain in the passband. After this
        // a0 + a1 + a2 + b1 + b2 equals 1.0.
        self.a0 = (a0 / b0) as f32;
        self.a1 = (a1 / b0) as f32;
        self.a2 = (a0 / b0) as f32;
        self.b1 = (b1 / b0) as f32;
        self.b2 = (b2 / b0) as f32;
        Ok(())
    }

    fn history_is_silent(&self) -> bool {
        self.x1.is_silent() && self.x2.is_silent() && self.y1.is_silent() && self.y2.is_silent()
    }
}

impl<'a, S: Sample> Module<S> for Filter<'a, S> {
    fn next(&mut self, out: &mut S) -> Result<bool> {
        let mut x = S::ZERO;
        let source_live = self.source.next(&mut x)?;
        let y = (x * self.a0 + self.x1 * self.a1 + self.x2 * self.a2
            - self.y1 * self.b1
            - self.y2 * self.b2)
            .flush_denorm();
        debug_assert!(y.is_finite());
        *out = y;

        // Shift the stored previous values along by one.
        self.x2 = self.x1;
        self.x1 = x;
        self.y2 = self.y1;
        self.y1 = y;
        Ok(source_live || !self.history_is_silent())
    }

    fn is_running(&mut self) -> bool {
        // Run while the filter still holds audible energy or the source does.
        !self.history_is_silent() || self.source.is_running()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Mono;

    /// Endless sine wave source.
    struct Sine {
        frequency: f64,
        n: u64,
    }

    impl Module<Mono> for Sine {
        fn next(&mut self, out: &mut Mono) -> Result<bool> {
            *out = libm::sin(2.0 * std::f64::consts::PI * self.frequency * self.n as f64) as f32;
            self.n += 1;
            Ok(true)
        }

        fn is_running(&mut self) -> bool {
            true
        }
    }

    fn rms(samples: &[f32]) -> f64 {
        let sum: f64 = samples.iter().map(|&s| (s as f64) * (s as f64)).sum();
        libm::sqrt(sum / samples.len() as f64)
    }

    fn response_at(kind: FilterKind, cut_off: f64, frequency: f64) -> f64 {
        let source = Box::new(Sine { frequency, n: 0 });
        let mut filter = Filter::new(source, kind, cut_off).unwrap();
        let mut output = vec![0.0f32; 10_000];
        let mut s = 0.0;
        for value in output.iter_mut() {
            filter.next(&mut s).unwrap();
            *value = s;
        }
        // Measure the settled half and compare against the input RMS of a
        // unit sine (1/sqrt(2)).
        rms(&output[5_000..]) / std::f64::consts::FRAC_1_SQRT_2
    }

    #[test]
    fn rejects_out_of_range_cutoff() {
        let source = Box::new(Sine {
            frequency: 0.1,
            n: 0,
        });
        assert!(matches!(
            Filter::<Mono>::new(source, FilterKind::LowPass, 0.5),
            Err(EngineError::InvalidConfig(_))
        ));
    }

    #[test]
    fn low_pass_attenuation_at_cutoff() {
        // -3.01 dB at the cutoff frequency.
        let gain = response_at(FilterKind::LowPass, 0.1, 0.1);
        assert!((gain - std::f64::consts::FRAC_1_SQRT_2).abs() < 0.035, "gain {gain}");
    }

    #[test]
    fn low_pass_rolls_off_above_cutoff() {
        let octave_above = response_at(FilterKind::LowPass, 0.05, 0.1);
        assert!(octave_above < 0.3, "gain {octave_above}");
        let passband = response_at(FilterKind::LowPass, 0.2, 0.01);
        assert!(passband > 0.95, "gain {passband}");
    }

    #[test]
    fn high_pass_mirrors_low_pass() {
        let gain = response_at(FilterKind::HighPass, 0.1, 0.1);
        assert!((gain - std::f64::consts::FRAC_1_SQRT_2).abs() < 0.035, "gain {gain}");
        let below = response_at(FilterKind::HighPass, 0.1, 0.025);
        assert!(below < 0.15, "gain {below}");
    }

    #[test]
    fn runs_on_while_history_rings() {
        // A one-sample impulse leaves energy in the filter after the source
        // has stopped.
        struct Impulse(bool);
        impl Module<Mono> for Impulse {
            fn next(&mut self, out: &mut Mono) -> Result<bool> {
                *out = if self.0 { 1.0 } else { 0.0 };
                let live = self.0;
                self.0 = false;
                Ok(live)
            }
            fn is_running(&mut self) -> bool {
                self.0
            }
        }

        let mut filter = Filter::new(Box::new(Impulse(true)), FilterKind::LowPass, 0.1).unwrap();
        let mut s = 0.0;
        assert!(filter.next(&mut s).unwrap());
        assert!(filter.is_running());

        // The ringing decays below the silence threshold eventually.
        let mut remaining = 10_000;
        while filter.next(&mut s).unwrap() {
            remaining -= 1;
            assert!(remaining > 0, "filter never stopped");
        }
        assert!(s.abs() < crate::SILENCE);
        assert!(!filter.is_running());
    }
}

//! Property-based tests for the core module graph.
//!
//! Uses proptest to hammer the DSP plumbing with randomized inputs:
//! filters must stay finite, the silencer must preserve the audible
//! samples, the splitter must hand every child the same sequence, and the
//! normalizer must land the peak exactly on unity.

use proptest::prelude::*;

use infierno_core::{
    BoxedModule, Filter, FilterKind, LinearResampler, Module, Mono, Normalizer, Result, Silencer,
    SincResampler, Splitter, SILENCE,
};

/// Finite source backed by a vector of samples.
struct VecSource(std::vec::IntoIter<f32>);

impl VecSource {
    fn boxed(samples: Vec<f32>) -> BoxedModule<'static, Mono> {
        Box::new(VecSource(samples.into_iter()))
    }
}

impl Module<Mono> for VecSource {
    fn next(&mut self, out: &mut Mono) -> Result<bool> {
        match self.0.next() {
            Some(s) => {
                *out = s;
                Ok(true)
            }
            None => {
                *out = 0.0;
                Ok(false)
            }
        }
    }

    fn is_running(&mut self) -> bool {
        self.0.len() > 0
    }
}

fn drain(module: &mut dyn Module<Mono>) -> Vec<f32> {
    let mut output = Vec::new();
    let mut s = 0.0;
    while module.next(&mut s).unwrap() {
        output.push(s);
        assert!(output.len() < 1_000_000, "module never stopped");
    }
    output
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    /// Both filter kinds produce finite output for any valid cutoff and any
    /// bounded input.
    #[test]
    fn filter_stays_finite(
        cutoff in 0.001f64..0.499f64,
        high_pass in any::<bool>(),
        input in prop::collection::vec(-1.0f32..=1.0f32, 1..256),
    ) {
        let kind = if high_pass { FilterKind::HighPass } else { FilterKind::LowPass };
        let mut filter = Filter::new(VecSource::boxed(input), kind, cutoff).unwrap();
        for s in drain(&mut filter) {
            prop_assert!(s.is_finite());
        }
    }

    /// The silencer emits exactly the requested lead-in and lead-out, and
    /// everything in between comes from the source.
    #[test]
    fn silencer_bounds_are_exact(
        lead_in in 0i64..32,
        lead_out in 0i64..32,
        input in prop::collection::vec(-1.0f32..=1.0f32, 0..64),
    ) {
        let mut silencer =
            Silencer::new(VecSource::boxed(input.clone()), lead_in, lead_out, -1).unwrap();
        let output = drain(&mut silencer);

        let lead_in = lead_in as usize;
        let lead_out = lead_out as usize;
        prop_assert!(output.len() >= lead_in + lead_out);
        for &s in &output[..lead_in] {
            prop_assert_eq!(s, 0.0);
        }
        for &s in &output[output.len() - lead_out..] {
            prop_assert_eq!(s, 0.0);
        }

        // The audible samples survive unchanged and in order.
        let audible_in: Vec<f32> =
            input.iter().copied().filter(|s| s.abs() >= SILENCE).collect();
        let audible_out: Vec<f32> = output
            .iter()
            .copied()
            .filter(|s| s.abs() >= SILENCE)
            .collect();
        prop_assert_eq!(audible_in, audible_out);
    }

    /// A gap setting never lengthens silent runs, and a disabled gap setting
    /// never changes the stream at all.
    #[test]
    fn gap_truncation_only_shortens(
        gap in 1i64..8,
        input in prop::collection::vec(prop_oneof![Just(0.0f32), 0.1f32..1.0f32], 0..64),
    ) {
        let mut gapped =
            Silencer::new(VecSource::boxed(input.clone()), -1, -1, gap).unwrap();
        let output = drain(&mut gapped);
        prop_assert!(output.len() <= input.len());

        let mut untouched =
            Silencer::new(VecSource::boxed(input.clone()), -1, -1, -1).unwrap();
        prop_assert_eq!(drain(&mut untouched), input);
    }

    /// All splitter children observe the same sequence regardless of the
    /// order they are drained in.
    #[test]
    fn splitter_children_agree(
        input in prop::collection::vec(-1.0f32..=1.0f32, 0..64),
        children in 1usize..5,
    ) {
        let first = Splitter::new(VecSource::boxed(input.clone()));
        let mut siblings: Vec<Splitter<'_, Mono>> =
            (1..children).map(|_| first.split()).collect();
        let mut all = vec![first];
        all.append(&mut siblings);

        for child in &mut all {
            prop_assert_eq!(drain(child), input.clone());
        }
    }

    /// Normalization brings the peak of any non-degenerate stream to unity.
    #[test]
    fn normalizer_lands_on_unity(
        input in prop::collection::vec(-1.0f32..=1.0f32, 1..128),
        peak_index in 0usize..128,
    ) {
        // Plant a guaranteed peak above the gain floor.
        let mut input = input;
        let index = peak_index % input.len();
        input[index] = 0.5;

        let dir = tempfile::tempdir().unwrap();
        let mut normalizer = Normalizer::new(
            VecSource::boxed(input.clone()),
            dir.path().join("spill.tmp"),
            Normalizer::<Mono>::DEFAULT_MAX_GAIN_DB,
        );
        let output = drain(&mut normalizer);
        prop_assert_eq!(output.len(), input.len());

        let peak = output.iter().fold(0.0f32, |m, s| m.max(s.abs()));
        prop_assert!((peak - 1.0).abs() < 1e-6, "peak {}", peak);
    }

    /// Resamplers produce finite, bounded output for arbitrary rate ratios.
    #[test]
    fn resamplers_stay_bounded(
        rate_in in 1u32..200_000,
        rate_out in 1u32..4_000,
        window in 1u32..5,
        input in prop::collection::vec(-1.0f32..=1.0f32, 1..64),
    ) {
        let mut linear =
            LinearResampler::new(VecSource::boxed(input.clone()), rate_in, rate_out).unwrap();
        for s in drain(&mut linear) {
            prop_assert!(s.is_finite());
            prop_assert!(s.abs() <= 1.0 + 1e-5);
        }

        let mut sinc =
            SincResampler::new(VecSource::boxed(input), window, rate_in, rate_out).unwrap();
        for s in drain(&mut sinc) {
            prop_assert!(s.is_finite());
            // A windowed sinc can overshoot, but not unboundedly.
            prop_assert!(s.abs() < 4.0);
        }
    }
}

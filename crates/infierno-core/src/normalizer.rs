//! Two-pass level normalization.

use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::PathBuf;

use crate::error::Result;
use crate::math::{amplitude_to_decibels, decibels_to_amplitude};
use crate::module::{BoxedModule, Module};
use crate::sample::Sample;

/// Remaps the highest amplitude of a stream to unity.
///
/// The first call to [`next`](Module::next) drains the entire source into a
/// temporary spill file while tracking the peak level; subsequent calls
/// replay the spilled samples scaled so the peak becomes 1.0. The gain is
/// capped (30 dB by default) so near-silent sources are not blown up into
/// noise. The spill file needs as much space again as the final output.
///
/// The spill file is removed when the normalizer is dropped, whether the
/// stream completed, errored, or was abandoned.
pub struct Normalizer<'a, S: Sample> {
    source: BoxedModule<'a, S>,
    spill_path: PathBuf,
    spill_created: bool,
    reader: Option<BufReader<File>>,
    normalization: f32,
    samples: u64,
    current_sample: u64,
}

impl<'a, S: Sample> Normalizer<'a, S> {
    /// Construct a normalizer spilling to `spill_path`.
    ///
    /// `max_gain_db` bounds how much gain normalization may apply.
    pub fn new(
        source: BoxedModule<'a, S>,
        spill_path: impl Into<PathBuf>,
        max_gain_db: f64,
    ) -> Self {
        Self {
            source,
            spill_path: spill_path.into(),
            spill_created: false,
            reader: None,
            normalization: decibels_to_amplitude(max_gain_db) as f32,
            samples: 0,
            current_sample: 0,
        }
    }

    /// Default cap on the gain normalization may apply, in dB.
    pub const DEFAULT_MAX_GAIN_DB: f64 = 30.0;

    /// The gain that was applied, in dB. Only meaningful once the analysis
    /// pass has run.
    pub fn adjustment_db(&self) -> f64 {
        amplitude_to_decibels(self.normalization as f64)
    }

    /// Drain the source into the spill file and compute the scale factor.
    fn analyze(&mut self) -> Result<()> {
        debug_assert!(!self.spill_created);
        let mut max_level = 1.0 / self.normalization;
        let file = File::create(&self.spill_path)?;
        self.spill_created = true;
        let mut writer = BufWriter::new(file);
        let mut sample = S::ZERO;
        while self.source.next(&mut sample)? {
            sample.write_le(&mut writer)?;
            self.samples += 1;
            max_level = max_level.max(sample.magnitude());
        }
        writer.flush()?;
        drop(writer);

        self.normalization = 1.0 / max_level;
        self.reader = Some(BufReader::new(File::open(&self.spill_path)?));
        Ok(())
    }
}

impl<'a, S: Sample> Drop for Normalizer<'a, S> {
    fn drop(&mut self) {
        self.reader = None;
        if self.spill_created {
            let _ = std::fs::remove_file(&self.spill_path);
        }
    }
}

impl<'a, S: Sample> Module<S> for Normalizer<'a, S> {
    fn next(&mut self, out: &mut S) -> Result<bool> {
        if self.reader.is_none() {
            self.analyze()?;
        }

        if self.current_sample >= self.samples {
            *out = S::ZERO;
            return Ok(false);
        }
        self.current_sample += 1;
        let reader = self.reader.as_mut().expect("spill reader opened above");
        *out = S::read_le(reader)?;
        *out *= self.normalization;
        Ok(true)
    }

    fn is_running(&mut self) -> bool {
        self.current_sample < self.samples || self.source.is_running()
    }
}

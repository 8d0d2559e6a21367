//! Extraction options.

use infierno_core::{EngineError, Result};
use infierno_spu::ReverbPreset;
use serde::{Deserialize, Serialize};

/// Reverb selection for an extraction.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReverbSetting {
    /// No reverb at all.
    Off,
    /// Use the preset and depth the caller resolves per song. The game sets
    /// these per level, so they live outside the audio data files.
    #[default]
    Auto,
    Room,
    StudioSmall,
    StudioMedium,
    StudioLarge,
    Hall,
    HalfEcho,
    SpaceEcho,
}

impl ReverbSetting {
    /// The core preset this setting names, if it names one directly.
    pub fn preset(self) -> Option<ReverbPreset> {
        match self {
            ReverbSetting::Off | ReverbSetting::Auto => None,
            ReverbSetting::Room => Some(ReverbPreset::Room),
            ReverbSetting::StudioSmall => Some(ReverbPreset::StudioSmall),
            ReverbSetting::StudioMedium => Some(ReverbPreset::StudioMedium),
            ReverbSetting::StudioLarge => Some(ReverbPreset::StudioLarge),
            ReverbSetting::Hall => Some(ReverbPreset::Hall),
            ReverbSetting::HalfEcho => Some(ReverbPreset::HalfEcho),
            ReverbSetting::SpaceEcho => Some(ReverbPreset::SpaceEcho),
        }
    }
}

/// Options controlling an extraction.
///
/// Every field has a default; a host can deserialize a partial TOML table
/// and get the documented behavior for everything it leaves out.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ExtractOptions {
    /// Final linear scale on the output.
    pub volume: f32,

    /// Remap the peak amplitude to unity with a two-pass normalizer.
    pub normalize: bool,

    /// Reverb selection.
    pub reverb: ReverbSetting,

    /// Wet gain of the reverb, linear.
    pub reverb_volume: f32,

    /// Number of times to play repeating material. 0 plays indefinitely;
    /// any other value plays exactly that many times.
    pub play_count: u32,

    /// Exact leading silence in seconds. Negative leaves the lead-in alone.
    pub lead_in: f64,

    /// Exact trailing silence in seconds. Negative leaves the lead-out
    /// alone.
    pub lead_out: f64,

    /// Maximum silent gap within the audio in seconds. Negative disables
    /// gap truncation.
    pub maximum_gap: f64,

    /// Stereo width adjustment, -1.0 (near mono) to 1.0 (expanded).
    pub stereo_width: f32,

    /// Apply the static repair table to known-defective patches, plus the
    /// tighter per-voice decode filters for the known-noisy ones.
    pub repair_patches: bool,

    /// Lift the SPU's maximum playback frequency.
    pub unlimited_frequency: bool,

    /// Output sample rate in Hz.
    pub sample_rate: u32,

    /// Output high-pass filter frequency in Hz; 0 disables it.
    pub high_pass: u32,

    /// Output low-pass filter frequency in Hz; 0 disables it.
    pub low_pass: u32,

    /// Window size for sinc resampling. 7 gives high quality results; 3 is
    /// acceptable and faster.
    pub sinc_window: u32,
}

impl Default for ExtractOptions {
    fn default() -> Self {
        Self {
            volume: 1.0,
            normalize: false,
            reverb: ReverbSetting::Auto,
            reverb_volume: 0.5,
            play_count: 1,
            lead_in: -1.0,
            lead_out: -1.0,
            maximum_gap: -1.0,
            stereo_width: 0.0,
            repair_patches: false,
            unlimited_frequency: false,
            sample_rate: 44_100,
            high_pass: 30,
            low_pass: 15_000,
            sinc_window: 7,
        }
    }
}

impl ExtractOptions {
    /// Load options from a TOML document. Missing fields take defaults.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let options: ExtractOptions = toml::from_str(text)
            .map_err(|err| EngineError::InvalidConfig(err.to_string()))?;
        options.validate()?;
        Ok(options)
    }

    /// Check the options for internal consistency.
    pub fn validate(&self) -> Result<()> {
        if self.sample_rate == 0 {
            return Err(EngineError::InvalidConfig(
                "sample rate must be non-zero".into(),
            ));
        }
        if self.sinc_window == 0 {
            return Err(EngineError::InvalidConfig(
                "sinc window must be at least 1".into(),
            ));
        }
        if !(-1.0..=1.0).contains(&self.stereo_width) {
            return Err(EngineError::InvalidConfig(
                "stereo width must be between -1.0 and 1.0".into(),
            ));
        }
        if !(0.0..=1_000_000.0).contains(&(self.volume as f64)) {
            return Err(EngineError::InvalidConfig(
                "volume must be non-negative".into(),
            ));
        }
        if self.reverb_volume < 0.0 {
            return Err(EngineError::InvalidConfig(
                "reverb volume must be non-negative".into(),
            ));
        }

        // The output filters must sit below the Nyquist limit, and the
        // high-pass below the low-pass when both are active.
        let nyquist = self.sample_rate / 2;
        if self.high_pass != 0 && self.high_pass >= nyquist {
            return Err(EngineError::InvalidConfig(format!(
                "high-pass frequency {} must be below the Nyquist limit {}",
                self.high_pass, nyquist
            )));
        }
        if self.low_pass != 0 && self.low_pass >= nyquist {
            return Err(EngineError::InvalidConfig(format!(
                "low-pass frequency {} must be below the Nyquist limit {}",
                self.low_pass, nyquist
            )));
        }
        if self.high_pass != 0 && self.low_pass != 0 && self.high_pass >= self.low_pass {
            return Err(EngineError::InvalidConfig(
                "high-pass frequency must be below the low-pass frequency".into(),
            ));
        }
        Ok(())
    }
}

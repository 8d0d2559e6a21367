//! Composition of the extraction graph.
//!
//! Takes a raw song or track stream and wraps it in the processing stages
//! the options ask for. The order is not arbitrary: gap truncation must
//! happen before reverb (truncating afterwards would chop echoes), the
//! lead-in/lead-out silencer must follow reverb (an exact lead-out must not
//! cut the tail), and normalization happens after filtering so the final
//! peak really is the peak.

use std::path::Path;

use infierno_core::{
    BoxedModule, Filter, FilterKind, Normalizer, ProgressFn, Result, Silencer, Statistics,
    StatisticsMode, Stereo, Volume,
};
use infierno_spu::{Reverb, ReverbPreset};

use crate::options::{ExtractOptions, ReverbSetting};

/// Resolve the reverb the graph should use.
///
/// `auto` supplies the preset and wet gain for [`ReverbSetting::Auto`]; the
/// game configures reverb per level, outside the audio data, so the caller
/// has to bring that mapping.
pub fn resolve_reverb(
    options: &ExtractOptions,
    auto: Option<(ReverbPreset, f32)>,
) -> Option<(ReverbPreset, f32)> {
    match options.reverb {
        ReverbSetting::Off => None,
        ReverbSetting::Auto => auto,
        named => named.preset().map(|preset| (preset, options.reverb_volume)),
    }
}

/// Wrap a stereo stream in the full extraction graph.
///
/// The returned statistics node is the root of the graph; drive it to
/// exhaustion and then read the level figures off it. `auto_reverb` is the
/// per-song preset and depth used when the options say
/// [`ReverbSetting::Auto`]. The spill path is only touched when
/// normalization is on.
pub fn compose<'a>(
    source: BoxedModule<'a, Stereo>,
    options: &ExtractOptions,
    auto_reverb: Option<(ReverbPreset, f32)>,
    spill_path: &Path,
    mode: StatisticsMode,
    progress: Option<ProgressFn<'a>>,
) -> Result<Statistics<'a, Stereo>> {
    options.validate()?;
    let rate = options.sample_rate;
    let mut module = source;

    // Gap processing, ahead of the reverb so echoes aren't truncated.
    if options.maximum_gap >= 0.0 {
        let gap = ((options.maximum_gap * rate as f64) as i64).max(1);
        module = Box::new(Silencer::new(module, -1, -1, gap)?);
    }

    if let Some((preset, wet_gain)) = resolve_reverb(options, auto_reverb) {
        module = Box::new(Reverb::new(
            module,
            rate,
            preset,
            Stereo::splat(wet_gain),
            options.sinc_window,
        )?);
    }

    // Exact lead-in and lead-out, after the reverb tail. When set they are
    // at least one sample so the audio starts and ends on silence.
    if options.lead_in >= 0.0 || options.lead_out >= 0.0 {
        let lead_in = if options.lead_in >= 0.0 {
            ((options.lead_in * rate as f64) as i64).max(1)
        } else {
            -1
        };
        let lead_out = if options.lead_out >= 0.0 {
            ((options.lead_out * rate as f64) as i64).max(1)
        } else {
            -1
        };
        module = Box::new(Silencer::new(module, lead_in, lead_out, -1)?);
    }

    if options.high_pass != 0 {
        module = Box::new(Filter::new(
            module,
            FilterKind::HighPass,
            options.high_pass as f64 / rate as f64,
        )?);
    }
    if options.low_pass != 0 {
        module = Box::new(Filter::new(
            module,
            FilterKind::LowPass,
            options.low_pass as f64 / rate as f64,
        )?);
    }

    if options.normalize {
        // The normalizer swallows the whole stream on its first pull, so
        // progress for the analysis pass has to be reported upstream of it.
        if let Some(callback) = progress {
            module = Box::new(Statistics::new(
                module,
                StatisticsMode::Progress,
                rate,
                Some(callback),
                "extracted",
            ));
        }
        module = Box::new(Normalizer::new(
            module,
            spill_path,
            Normalizer::<Stereo>::DEFAULT_MAX_GAIN_DB,
        ));
    }

    if options.volume != 1.0 {
        module = Box::new(Volume::new(module, options.volume));
    }

    let label = if options.normalize {
        "normalized"
    } else {
        "extracted"
    };
    Ok(Statistics::new(module, mode, rate, progress, label))
}

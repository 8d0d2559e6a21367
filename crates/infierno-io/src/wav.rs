//! Draining module graphs into WAV files.

use std::path::Path;

use hound::{SampleFormat, WavSpec, WavWriter};
use infierno_core::{sample_to_i16, Module, Mono, Sample, Stereo};

fn spec(channels: u16, sample_rate: u32) -> WavSpec {
    WavSpec {
        channels,
        sample_rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    }
}

/// Drain a module graph of samples into a 16-bit PCM WAV file.
///
/// Returns the number of sample frames written. On any failure the partial
/// output file is removed before the error is returned; an aborted
/// extraction must not leave a half-written file that looks complete.
fn render<S, M>(module: &mut M, path: &Path, sample_rate: u32) -> crate::Result<u64>
where
    S: Sample,
    M: Module<S> + ?Sized,
{
    let result = write_module(module, path, sample_rate);
    if result.is_err() {
        let _ = std::fs::remove_file(path);
    }
    result
}

fn write_module<S, M>(module: &mut M, path: &Path, sample_rate: u32) -> crate::Result<u64>
where
    S: Sample,
    M: Module<S> + ?Sized,
{
    let mut writer = WavWriter::create(path, spec(S::CHANNELS as u16, sample_rate))?;
    let mut frames = 0u64;
    let mut sample = S::ZERO;
    while module.next(&mut sample)? {
        for channel in 0..S::CHANNELS {
            writer.write_sample(sample_to_i16(sample.channel(channel)))?;
        }
        frames += 1;
    }
    writer.finalize()?;
    Ok(frames)
}

/// Render a mono graph (a decoded patch, for instance) to a WAV file.
pub fn render_mono<M>(module: &mut M, path: impl AsRef<Path>, sample_rate: u32) -> crate::Result<u64>
where
    M: Module<Mono> + ?Sized,
{
    render(module, path.as_ref(), sample_rate)
}

/// Render a stereo graph (a composed song extraction) to a WAV file.
pub fn render_stereo<M>(
    module: &mut M,
    path: impl AsRef<Path>,
    sample_rate: u32,
) -> crate::Result<u64>
where
    M: Module<Stereo> + ?Sized,
{
    render(module, path.as_ref(), sample_rate)
}

/// Write raw 16-bit frames to a WAV file. Mostly useful to tests comparing
/// engine output against a round-tripped file.
pub fn write_i16_frames(
    path: impl AsRef<Path>,
    frames: &[(i16, i16)],
    sample_rate: u32,
) -> crate::Result<()> {
    let mut writer = WavWriter::create(path.as_ref(), spec(2, sample_rate))?;
    for &(left, right) in frames {
        writer.write_sample(left)?;
        writer.write_sample(right)?;
    }
    writer.finalize()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use hound::WavReader;
    use infierno_core::{EngineError, Result};

    struct Ramp {
        produced: u32,
        limit: u32,
        fail_at: Option<u32>,
    }

    impl Module<Stereo> for Ramp {
        fn next(&mut self, out: &mut Stereo) -> Result<bool> {
            if Some(self.produced) == self.fail_at {
                return Err(EngineError::CorruptStream("synthetic failure".into()));
            }
            if self.produced >= self.limit {
                *out = Stereo::ZERO;
                return Ok(false);
            }
            self.produced += 1;
            let level = self.produced as f32 / self.limit as f32;
            *out = Stereo::new(level, -level);
            Ok(true)
        }

        fn is_running(&mut self) -> bool {
            self.produced < self.limit
        }
    }

    #[test]
    fn renders_every_frame_until_the_graph_stops() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.wav");
        let mut module = Ramp {
            produced: 0,
            limit: 100,
            fail_at: None,
        };
        let frames = render_stereo(&mut module, &path, 44_100).unwrap();
        assert_eq!(frames, 100);

        let reader = WavReader::open(&path).unwrap();
        assert_eq!(reader.spec().channels, 2);
        assert_eq!(reader.spec().sample_rate, 44_100);
        assert_eq!(reader.spec().bits_per_sample, 16);
        assert_eq!(reader.len(), 200);
    }

    #[test]
    fn engine_errors_remove_the_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.wav");
        let mut module = Ramp {
            produced: 0,
            limit: 100,
            fail_at: Some(50),
        };
        let result = render_stereo(&mut module, &path, 44_100);
        assert!(matches!(result, Err(crate::Error::Engine(_))));
        assert!(!path.exists());
    }

    #[test]
    fn round_trip_matches_to_one_lsb() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.wav");
        let mut module = Ramp {
            produced: 0,
            limit: 1000,
            fail_at: None,
        };
        render_stereo(&mut module, &path, 44_100).unwrap();

        let reader = WavReader::open(&path).unwrap();
        let samples: Vec<i16> = reader
            .into_samples::<i16>()
            .collect::<std::result::Result<_, _>>()
            .unwrap();

        // Regenerate the same stream and compare against the file.
        let mut reference = Ramp {
            produced: 0,
            limit: 1000,
            fail_at: None,
        };
        let mut s = Stereo::ZERO;
        for frame in samples.chunks(2) {
            assert!(reference.next(&mut s).unwrap());
            assert!((frame[0] as i32 - sample_to_i16(s.left) as i32).abs() <= 1);
            assert!((frame[1] as i32 - sample_to_i16(s.right) as i32).abs() <= 1);
        }
        assert!(!reference.next(&mut s).unwrap());
    }

    #[test]
    fn mono_graphs_render_single_channel_files() {
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

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("patch.wav");
        let frames = render_mono(&mut Impulse(true), &path, 11_025).unwrap();
        assert_eq!(frames, 1);

        let reader = WavReader::open(&path).unwrap();
        assert_eq!(reader.spec().channels, 1);
        assert_eq!(reader.spec().sample_rate, 11_025);
    }
}

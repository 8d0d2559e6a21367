//! Mono and stereo sample types.
//!
//! The engine processes audio one sample at a time. Modules are generic over
//! the [`Sample`] type so the same filter, resampler, or silencer code runs
//! on mono or stereo streams. The canonical amplitude range is [-1.0, +1.0];
//! clipping only happens on the final conversion to 16-bit integers.

use std::io::{Read, Write};
use std::ops::{Add, AddAssign, Mul, MulAssign, Sub};

/// Sample magnitude for the threshold of silence.
pub const SILENCE: f32 = 1.0 / 32767.0;

/// Sample magnitude below which values are zeroed to prevent denormals.
pub const DENORM_LIMIT: f32 = 1e-9;

/// Mono audio sample.
pub type Mono = f32;

/// Stereo pair of audio samples.
///
/// Behaves like [`Mono`] arithmetically so that code generic over [`Sample`]
/// works with either channel layout.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Stereo {
    /// Left channel sample.
    pub left: f32,
    /// Right channel sample.
    pub right: f32,
}

impl Stereo {
    /// Construct a stereo sample from left and right values.
    pub fn new(left: f32, right: f32) -> Self {
        Self { left, right }
    }

    /// Construct a stereo sample with the same value in both channels.
    pub fn splat(v: f32) -> Self {
        Self { left: v, right: v }
    }
}

/// Operations every sample type supports.
///
/// Beyond the arithmetic operator bounds, a sample knows its magnitude (for
/// stereo, the larger of the two channel magnitudes), whether it falls below
/// the threshold of silence, and how to clamp denormal-range values to zero.
/// Denormals must never enter filter or reverb state: underflowed values can
/// slow floating-point arithmetic by orders of magnitude.
pub trait Sample:
    Copy
    + Default
    + PartialEq
    + std::fmt::Debug
    + Add<Output = Self>
    + AddAssign
    + Sub<Output = Self>
    + Mul<Output = Self>
    + Mul<f32, Output = Self>
    + MulAssign<f32>
{
    /// The all-zero sample.
    const ZERO: Self;

    /// Number of interleaved channels the sample carries.
    const CHANNELS: usize;

    /// Duplicate a mono value across all channels.
    fn from_mono(v: f32) -> Self;

    /// Magnitude of the sample. For stereo this is the larger channel.
    fn magnitude(self) -> f32;

    /// Access one channel of the sample.
    fn channel(self, index: usize) -> f32;

    /// Whether every channel is finite (no NaNs or infinities).
    fn is_finite(self) -> bool;

    /// Clamp near-zero values to zero to prevent denormals.
    fn flush_denorm(self) -> Self;

    /// Test the sample against the threshold of silence.
    fn is_silent(self) -> bool {
        self.magnitude() < SILENCE
    }

    /// Write the sample to a stream as little-endian 32-bit floats.
    fn write_le<W: Write>(self, writer: &mut W) -> std::io::Result<()>;

    /// Read a sample written by [`Sample::write_le`].
    fn read_le<R: Read>(reader: &mut R) -> std::io::Result<Self>;
}

impl Sample for Mono {
    const ZERO: Self = 0.0;
    const CHANNELS: usize = 1;

    fn from_mono(v: f32) -> Self {
        v
    }

    fn magnitude(self) -> f32 {
        self.abs()
    }

    fn channel(self, _index: usize) -> f32 {
        self
    }

    fn is_finite(self) -> bool {
        f32::is_finite(self)
    }

    fn flush_denorm(self) -> Self {
        if self.abs() < DENORM_LIMIT {
            0.0
        } else {
            self
        }
    }

    fn write_le<W: Write>(self, writer: &mut W) -> std::io::Result<()> {
        writer.write_all(&self.to_le_bytes())
    }

    fn read_le<R: Read>(reader: &mut R) -> std::io::Result<Self> {
        let mut bytes = [0u8; 4];
        reader.read_exact(&mut bytes)?;
        Ok(f32::from_le_bytes(bytes))
    }
}

impl Sample for Stereo {
    const ZERO: Self = Stereo {
        left: 0.0,
        right: 0.0,
    };
    const CHANNELS: usize = 2;

    fn from_mono(v: f32) -> Self {
        Stereo::splat(v)
    }

    fn magnitude(self) -> f32 {
        self.left.abs().max(self.right.abs())
    }

    fn channel(self, index: usize) -> f32 {
        if index == 0 {
            self.left
        } else {
            self.right
        }
    }

    fn is_finite(self) -> bool {
        self.left.is_finite() && self.right.is_finite()
    }

    fn flush_denorm(self) -> Self {
        Stereo {
            left: self.left.flush_denorm(),
            right: self.right.flush_denorm(),
        }
    }

    fn is_silent(self) -> bool {
        self.left.abs() < SILENCE && self.right.abs() < SILENCE
    }

    fn write_le<W: Write>(self, writer: &mut W) -> std::io::Result<()> {
        writer.write_all(&self.left.to_le_bytes())?;
        writer.write_all(&self.right.to_le_bytes())
    }

    fn read_le<R: Read>(reader: &mut R) -> std::io::Result<Self> {
        let mut bytes = [0u8; 8];
        reader.read_exact(&mut bytes)?;
        Ok(Stereo {
            left: f32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]),
            right: f32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]),
        })
    }
}

impl Add for Stereo {
    type Output = Stereo;

    fn add(self, rhs: Stereo) -> Stereo {
        Stereo {
            left: self.left + rhs.left,
            right: self.right + rhs.right,
        }
    }
}

impl AddAssign for Stereo {
    fn add_assign(&mut self, rhs: Stereo) {
        self.left += rhs.left;
        self.right += rhs.right;
    }
}

impl Sub for Stereo {
    type Output = Stereo;

    fn sub(self, rhs: Stereo) -> Stereo {
        Stereo {
            left: self.left - rhs.left,
            right: self.right - rhs.right,
        }
    }
}

impl Mul for Stereo {
    type Output = Stereo;

    fn mul(self, rhs: Stereo) -> Stereo {
        Stereo {
            left: self.left * rhs.left,
            right: self.right * rhs.right,
        }
    }
}

impl Mul<f32> for Stereo {
    type Output = Stereo;

    fn mul(self, rhs: f32) -> Stereo {
        Stereo {
            left: self.left * rhs,
            right: self.right * rhs,
        }
    }
}

impl MulAssign<f32> for Stereo {
    fn mul_assign(&mut self, rhs: f32) {
        self.left *= rhs;
        self.right *= rhs;
    }
}

/// Convert a floating point sample value to a 16-bit integer, clipping to the
/// representable range.
pub fn sample_to_i16(s: f32) -> i16 {
    ((s * 32767.0 + 0.5) as i32).clamp(i16::MIN as i32, i16::MAX as i32) as i16
}

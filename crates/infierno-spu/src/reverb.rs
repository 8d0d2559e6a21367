//! SPU reverb emulation.
//!
//! The SPU implements reverb as a fixed-topology network of taps into a
//! circular work buffer, configured entirely by a bank of 32 registers per
//! preset. [`ReverbCore`] reproduces that network bit-for-bit at the
//! hardware's 22.05 kHz processing rate; [`Reverb`] wraps it with the
//! splitting, resampling, and mixing needed to run inside a graph at any
//! output rate.

use infierno_core::{
    BoxedModule, Filter, FilterKind, Module, Result, Sample, SincResampler, Splitter, Stereo,
    SILENCE,
};

/// Sample rate of the reverb core.
pub const REVERB_RATE: u32 = 22_050;

/// Reverb presets, matching the configurations the PSX BIOS ships.
///
/// There is deliberately no "off" variant: a disabled reverb is expressed by
/// not building a reverb node at all.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ReverbPreset {
    Room,
    StudioSmall,
    StudioMedium,
    StudioLarge,
    Hall,
    HalfEcho,
    SpaceEcho,
}

impl ReverbPreset {
    /// All presets, in register bank order.
    pub const ALL: [ReverbPreset; 7] = [
        ReverbPreset::Room,
        ReverbPreset::StudioSmall,
        ReverbPreset::StudioMedium,
        ReverbPreset::StudioLarge,
        ReverbPreset::Hall,
        ReverbPreset::HalfEcho,
        ReverbPreset::SpaceEcho,
    ];

    fn index(self) -> usize {
        match self {
            ReverbPreset::Room => 0,
            ReverbPreset::StudioSmall => 1,
            ReverbPreset::StudioMedium => 2,
            ReverbPreset::StudioLarge => 3,
            ReverbPreset::Hall => 4,
            ReverbPreset::HalfEcho => 5,
            ReverbPreset::SpaceEcho => 6,
        }
    }

    /// Name of the preset.
    pub fn name(self) -> &'static str {
        match self {
            ReverbPreset::Room => "room",
            ReverbPreset::StudioSmall => "studio-small",
            ReverbPreset::StudioMedium => "studio-medium",
            ReverbPreset::StudioLarge => "studio-large",
            ReverbPreset::Hall => "hall",
            ReverbPreset::HalfEcho => "half-echo",
            ReverbPreset::SpaceEcho => "space-echo",
        }
    }
}

impl std::fmt::Display for ReverbPreset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

// Register banks for each preset. These are the values the hardware was
// programmed with and must be reproduced bit-for-bit.
#[rustfmt::skip]
const REGISTERS: [[u16; 32]; 7] = [
    // Room.
    [
        0x007d, 0x005b, 0x6d80, 0x54b8, 0xbed0, 0x0000, 0x0000, 0xba80,
        0x5800, 0x5300, 0x04d6, 0x0333, 0x03f0, 0x0227, 0x0374, 0x01ef,
        0x0334, 0x01b5, 0x0000, 0x0000, 0x0000, 0x0000, 0x0000, 0x0000,
        0x0000, 0x0000, 0x01b4, 0x0136, 0x00b8, 0x005c, 0x8000, 0x8000,
    ],
    // Studio Small.
    [
        0x0033, 0x0025, 0x70f0, 0x4fa8, 0xbce0, 0x4410, 0xc0f0, 0x9c00,
        0x5280, 0x4ec0, 0x03e4, 0x031b, 0x03a4, 0x02af, 0x0372, 0x0266,
        0x031c, 0x025d, 0x025c, 0x018e, 0x022f, 0x0135, 0x01d2, 0x00b7,
        0x018f, 0x00b5, 0x00b4, 0x0080, 0x004c, 0x0026, 0x8000, 0x8000,
    ],
    // Studio Medium.
    [
        0x00b1, 0x007f, 0x70f0, 0x4fa8, 0xbce0, 0x4510, 0xbef0, 0xb4c0,
        0x5280, 0x4ec0, 0x0904, 0x076b, 0x0824, 0x065f, 0x07a2, 0x0616,
        0x076c, 0x05ed, 0x05ec, 0x042e, 0x050f, 0x0305, 0x0462, 0x02b7,
        0x042f, 0x0265, 0x0264, 0x01b2, 0x0100, 0x0080, 0x8000, 0x8000,
    ],
    // Studio Large.
    [
        0x00e3, 0x00a9, 0x6f60, 0x4fa8, 0xbce0, 0x4510, 0xbef0, 0xa680,
        0x5680, 0x52c0, 0x0dfb, 0x0b58, 0x0d09, 0x0a3c, 0x0bd9, 0x0973,
        0x0b59, 0x08da, 0x08d9, 0x05e9, 0x07ec, 0x04b0, 0x06ef, 0x03d2,
        0x05ea, 0x031d, 0x031c, 0x0238, 0x0154, 0x00aa, 0x8000, 0x8000,
    ],
    // Hall.
    [
        0x01a5, 0x0139, 0x6000, 0x5000, 0x4c00, 0xb800, 0xbc00, 0xc000,
        0x6000, 0x5c00, 0x15ba, 0x11bb, 0x14c2, 0x10bd, 0x11bc, 0x0dc1,
        0x11c0, 0x0dc3, 0x0dc0, 0x09c1, 0x0bc4, 0x07c1, 0x0a00, 0x06cd,
        0x09c2, 0x05c1, 0x05c0, 0x041a, 0x0274, 0x013a, 0x8000, 0x8000,
    ],
    // Half Echo.
    [
        0x0017, 0x0013, 0x70f0, 0x4fa8, 0xbce0, 0x4510, 0xbef0, 0x8500,
        0x5f80, 0x54c0, 0x0371, 0x02af, 0x02e5, 0x01df, 0x02b0, 0x01d7,
        0x0358, 0x026a, 0x01d6, 0x011e, 0x012d, 0x00b1, 0x011f, 0x0059,
        0x01a0, 0x00e3, 0x0058, 0x0040, 0x0028, 0x0014, 0x8000, 0x8000,
    ],
    // Space Echo.
    [
        0x033d, 0x0231, 0x7e00, 0x5000, 0xb400, 0xb000, 0x4c00, 0xb000,
        0x6000, 0x5400, 0x1ed6, 0x1a31, 0x1d14, 0x183b, 0x1bc2, 0x16b2,
        0x1a32, 0x15ef, 0x15ee, 0x1055, 0x1334, 0x0f2d, 0x11f6, 0x0c5d,
        0x1056, 0x0ae1, 0x0ae0, 0x07a2, 0x0464, 0x0232, 0x8000, 0x8000,
    ],
];

// Work buffer sizes in samples, from the hardware memory map (byte sizes
// over 16-bit words).
const BUFFER_SIZES: [usize; 7] = [
    0x026c0 / 2, // Room.
    0x01f40 / 2, // Studio Small.
    0x04840 / 2, // Studio Medium.
    0x06fe0 / 2, // Studio Large.
    0x0ade0 / 2, // Hall.
    0x03c00 / 2, // Half Echo.
    0x0f6c0 / 2, // Space Echo.
];

/// Convert a register value into a volume coefficient (signed reinterpret).
fn reg_to_volume(v: u16) -> f32 {
    (v as i16) as f32 / 32768.0
}

/// Convert a register value from bytes/8 units into a buffer offset.
fn reg_to_offset(v: u16) -> usize {
    debug_assert!(v <= 0x7fff);
    v as usize * 8 / 2
}

/// The fixed-topology reverb network, running strictly at 22.05 kHz.
///
/// Per input sample the network writes four reflections (same-side and
/// cross-side for each channel) into the work buffer, drains four comb taps
/// per side for the early echo, and runs the result through two all-pass
/// stages. After the source stops, the core keeps running until everything
/// left in the buffer has decayed below the threshold of silence.
pub struct ReverbCore<'a> {
    source: BoxedModule<'a, Stereo>,
    volume: Stereo,

    buffer: Vec<f32>,
    current: usize,

    // Register-derived offsets and coefficients.
    viir: f32,
    vcomb1: f32,
    vcomb2: f32,
    vcomb3: f32,
    vcomb4: f32,
    vwall: f32,
    vapf1: f32,
    vapf2: f32,
    mlsame: usize,
    mrsame: usize,
    mlcomb1: usize,
    mrcomb1: usize,
    mlcomb2: usize,
    mrcomb2: usize,
    dlsame: usize,
    drsame: usize,
    mldiff: usize,
    mrdiff: usize,
    mlcomb3: usize,
    mrcomb3: usize,
    mlcomb4: usize,
    mrcomb4: usize,
    dldiff: usize,
    drdiff: usize,
    mlapf1: usize,
    mrapf1: usize,
    mlapf2: usize,
    mrapf2: usize,
    vlin: f32,
    vrin: f32,

    // Offsets pre-combined from the registers.
    mlsame_1: usize,
    mrsame_1: usize,
    mldiff_1: usize,
    mrdiff_1: usize,
    mlapf1_dapf1: usize,
    mrapf1_dapf1: usize,
    mlapf2_dapf2: usize,
    mrapf2_dapf2: usize,

    // Magnitude representing silence at this unit's output volume.
    silence: f32,

    // Latched once a full scan finds nothing above the silence threshold,
    // so is_running stays cheap after the tail has died out.
    buffer_is_silent: bool,
    last_unsilent_sample: usize,
}

impl<'a> ReverbCore<'a> {
    /// Construct the core over a 22.05 kHz stereo source.
    pub fn new(source: BoxedModule<'a, Stereo>, preset: ReverbPreset, volume: Stereo) -> Self {
        let registers = &REGISTERS[preset.index()];
        let size = BUFFER_SIZES[preset.index()];

        let dapf1 = reg_to_offset(registers[0x00]);
        let dapf2 = reg_to_offset(registers[0x01]);
        let mlsame = reg_to_offset(registers[0x0a]);
        let mrsame = reg_to_offset(registers[0x0b]);
        let mldiff = reg_to_offset(registers[0x12]);
        let mrdiff = reg_to_offset(registers[0x13]);
        let mlapf1 = reg_to_offset(registers[0x1a]);
        let mrapf1 = reg_to_offset(registers[0x1b]);
        let mlapf2 = reg_to_offset(registers[0x1c]);
        let mrapf2 = reg_to_offset(registers[0x1d]);

        let wrap = |offset: usize| -> usize {
            debug_assert!(offset < 2 * size);
            if offset < size {
                offset
            } else {
                offset - size
            }
        };

        let max_volume = volume.left.max(volume.right);
        Self {
            source,
            volume,
            buffer: vec![0.0; size],
            current: 0,
            viir: reg_to_volume(registers[0x02]),
            vcomb1: reg_to_volume(registers[0x03]),
            vcomb2: reg_to_volume(registers[0x04]),
            vcomb3: reg_to_volume(registers[0x05]),
            vcomb4: reg_to_volume(registers[0x06]),
            vwall: reg_to_volume(registers[0x07]),
            vapf1: reg_to_volume(registers[0x08]),
            vapf2: reg_to_volume(registers[0x09]),
            mlsame,
            mrsame,
            mlcomb1: reg_to_offset(registers[0x0c]),
            mrcomb1: reg_to_offset(registers[0x0d]),
            mlcomb2: reg_to_offset(registers[0x0e]),
            mrcomb2: reg_to_offset(registers[0x0f]),
            dlsame: reg_to_offset(registers[0x10]),
            drsame: reg_to_offset(registers[0x11]),
            mldiff,
            mrdiff,
            mlcomb3: reg_to_offset(registers[0x14]),
            mrcomb3: reg_to_offset(registers[0x15]),
            mlcomb4: reg_to_offset(registers[0x16]),
            mrcomb4: reg_to_offset(registers[0x17]),
            dldiff: reg_to_offset(registers[0x18]),
            drdiff: reg_to_offset(registers[0x19]),
            mlapf1,
            mrapf1,
            mlapf2,
            mrapf2,
            vlin: reg_to_volume(registers[0x1e]),
            vrin: reg_to_volume(registers[0x1f]),
            mlsame_1: wrap(mlsame + size - 1),
            mrsame_1: wrap(mrsame + size - 1),
            mldiff_1: wrap(mldiff + size - 1),
            mrdiff_1: wrap(mrdiff + size - 1),
            mlapf1_dapf1: wrap(mlapf1 + size - dapf1),
            mrapf1_dapf1: wrap(mrapf1 + size - dapf1),
            mlapf2_dapf2: wrap(mlapf2 + size - dapf2),
            mrapf2_dapf2: wrap(mrapf2 + size - dapf2),
            silence: SILENCE / max_volume.max(0.001),
            buffer_is_silent: false,
            last_unsilent_sample: 0,
        }
    }

    fn wrap_offset(&self, offset: usize) -> usize {
        debug_assert!(offset < 2 * self.buffer.len());
        if offset < self.buffer.len() {
            offset
        } else {
            offset - self.buffer.len()
        }
    }

    fn read_buffer(&self, offset: usize) -> f32 {
        self.buffer[self.wrap_offset(self.current + offset)]
    }

    fn write_buffer(&mut self, offset: usize, value: f32) {
        let index = self.wrap_offset(self.current + offset);
        self.buffer[index] = value.flush_denorm();
    }

    /// Whether audible energy remains in the work buffer. Resumes the scan
    /// where the last one left off, so once the tail is silent repeated
    /// calls cost almost nothing.
    fn tail_running(&mut self) -> bool {
        if self.buffer_is_silent {
            return false;
        }
        let start = self.last_unsilent_sample;
        loop {
            if self.buffer[self.last_unsilent_sample].abs() > self.silence {
                break;
            }
            self.last_unsilent_sample += 1;
            if self.last_unsilent_sample >= self.buffer.len() {
                self.last_unsilent_sample = 0;
            }
            if self.last_unsilent_sample == start {
                break;
            }
        }
        self.buffer_is_silent = self.buffer[self.last_unsilent_sample].abs() <= self.silence;
        !self.buffer_is_silent
    }
}

impl<'a> Module<Stereo> for ReverbCore<'a> {
    fn next(&mut self, out: &mut Stereo) -> Result<bool> {
        let mut s = Stereo::ZERO;
        let live = self.source.next(&mut s)? || self.tail_running();
        if !live {
            *out = Stereo::ZERO;
            return Ok(false);
        }

        let lin = self.vlin * s.left;
        let rin = self.vrin * s.right;

        // Same side reflection.
        let prev_mlsame = self.read_buffer(self.mlsame_1);
        let prev_mrsame = self.read_buffer(self.mrsame_1);
        let value = (lin + self.read_buffer(self.dlsame) * self.vwall - prev_mlsame) * self.viir
            + prev_mlsame;
        self.write_buffer(self.mlsame, value);
        let value = (rin + self.read_buffer(self.drsame) * self.vwall - prev_mrsame) * self.viir
            + prev_mrsame;
        self.write_buffer(self.mrsame, value);

        // Different side reflection.
        let prev_mldiff = self.read_buffer(self.mldiff_1);
        let prev_mrdiff = self.read_buffer(self.mrdiff_1);
        let value = (lin + self.read_buffer(self.drdiff) * self.vwall - prev_mldiff) * self.viir
            + prev_mldiff;
        self.write_buffer(self.mldiff, value);
        let value = (rin + self.read_buffer(self.dldiff) * self.vwall - prev_mrdiff) * self.viir
            + prev_mrdiff;
        self.write_buffer(self.mrdiff, value);

        // Early echo.
        let mut lout = self.vcomb1 * self.read_buffer(self.mlcomb1)
            + self.vcomb2 * self.read_buffer(self.mlcomb2)
            + self.vcomb3 * self.read_buffer(self.mlcomb3)
            + self.vcomb4 * self.read_buffer(self.mlcomb4);
        let mut rout = self.vcomb1 * self.read_buffer(self.mrcomb1)
            + self.vcomb2 * self.read_buffer(self.mrcomb2)
            + self.vcomb3 * self.read_buffer(self.mrcomb3)
            + self.vcomb4 * self.read_buffer(self.mrcomb4);

        // Late reverb all pass filter 1.
        lout -= self.vapf1 * self.read_buffer(self.mlapf1_dapf1);
        self.write_buffer(self.mlapf1, lout);
        lout = lout * self.vapf1 + self.read_buffer(self.mlapf1_dapf1);
        rout -= self.vapf1 * self.read_buffer(self.mrapf1_dapf1);
        self.write_buffer(self.mrapf1, rout);
        rout = rout * self.vapf1 + self.read_buffer(self.mrapf1_dapf1);

        // Late reverb all pass filter 2.
        lout -= self.vapf2 * self.read_buffer(self.mlapf2_dapf2);
        self.write_buffer(self.mlapf2, lout);
        lout = lout * self.vapf2 + self.read_buffer(self.mlapf2_dapf2);
        rout -= self.vapf2 * self.read_buffer(self.mrapf2_dapf2);
        self.write_buffer(self.mrapf2, rout);
        rout = rout * self.vapf2 + self.read_buffer(self.mrapf2_dapf2);

        *out = (self.volume * Stereo::new(lout, rout)).flush_denorm();
        debug_assert!(out.is_finite());

        self.current += 1;
        if self.current >= self.buffer.len() {
            self.current = 0;
        }
        Ok(true)
    }

    fn is_running(&mut self) -> bool {
        self.source.is_running() || self.tail_running()
    }
}

/// Reverb effect at an arbitrary sample rate.
///
/// Splits the incoming stream into a dry branch and a wet branch, runs the
/// wet branch through the core at 22.05 kHz (resampling on the way in and
/// out when the stream rate differs), and mixes the two back together. The
/// down-conversion is preceded by a low-pass to keep high frequencies from
/// aliasing into the reverb.
pub struct Reverb<'a> {
    original: Splitter<'a, Stereo>,
    wet: BoxedModule<'a, Stereo>,
}

impl<'a> Reverb<'a> {
    /// Construct a reverb over a stereo source running at `sample_rate`.
    ///
    /// `volume` is the wet gain applied to the core's output; the dry branch
    /// passes through unscaled.
    pub fn new(
        source: BoxedModule<'a, Stereo>,
        sample_rate: u32,
        preset: ReverbPreset,
        volume: Stereo,
        sinc_window: u32,
    ) -> Result<Self> {
        debug_assert!(sample_rate > 0);
        const MAX_CUT_OFF: f64 = 0.45;

        let original = Splitter::new(source);
        let mut wet: BoxedModule<'a, Stereo> = Box::new(original.split());
        if sample_rate != REVERB_RATE {
            if sample_rate > REVERB_RATE {
                let cut_off = (REVERB_RATE as f64 / sample_rate as f64).min(MAX_CUT_OFF);
                wet = Box::new(Filter::new(wet, FilterKind::LowPass, cut_off)?);
            }
            wet = Box::new(SincResampler::new(
                wet,
                sinc_window,
                sample_rate,
                REVERB_RATE,
            )?);
        }
        wet = Box::new(ReverbCore::new(wet, preset, volume));
        if sample_rate != REVERB_RATE {
            if sample_rate < REVERB_RATE {
                let cut_off = (sample_rate as f64 / REVERB_RATE as f64).min(MAX_CUT_OFF);
                wet = Box::new(Filter::new(wet, FilterKind::LowPass, cut_off)?);
            }
            wet = Box::new(SincResampler::new(
                wet,
                sinc_window,
                REVERB_RATE,
                sample_rate,
            )?);
        }
        Ok(Self { original, wet })
    }
}

impl<'a> Module<Stereo> for Reverb<'a> {
    fn next(&mut self, out: &mut Stereo) -> Result<bool> {
        // Mix the wet branch back into the original audio.
        let original_live = self.original.next(out)?;
        let mut wet = Stereo::ZERO;
        let wet_live = self.wet.next(&mut wet)?;
        *out += wet;
        Ok(original_live || wet_live)
    }

    fn is_running(&mut self) -> bool {
        self.original.is_running() || self.wet.is_running()
    }
}

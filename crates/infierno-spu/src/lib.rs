//! Infierno SPU: emulation of the PlayStation sound hardware.
//!
//! The pieces of the pipeline that exist because the source data targets the
//! PSX sound processing unit:
//!
//! - [`Adpcm`]: the 16-byte-block ADPCM decoder, with the stream editing
//!   helpers patch repair is built on
//! - [`PatchBank`]: parsed patch records, lookup by id, and the static
//!   repair table for the handful of shipped patches with defects
//! - [`Envelope`]: the register-driven ADSR volume generator
//! - [`Channel`]: one sounding note, resampled patch audio shaped by an
//!   envelope and a pan position
//! - [`Reverb`] / [`ReverbCore`]: the fixed-topology reverb network with
//!   its per-preset register banks
//!
//! Everything here plugs into the [`infierno_core`] module graph.

pub mod adpcm;
pub mod channel;
pub mod envelope;
pub mod patches;
pub mod reverb;

pub use adpcm::Adpcm;
pub use channel::Channel;
pub use envelope::{Envelope, ENVELOPE_SAMPLE_RATE};
pub use patches::{Patch, PatchBank, PATCH_SAMPLE_RATE};
pub use reverb::{Reverb, ReverbCore, ReverbPreset, REVERB_RATE};

//! Infierno core: the streaming module graph and its DSP plumbing.
//!
//! The engine reconstructs audio as a pull-based graph of [`Module`] nodes:
//! every node produces one sample per call and reports whether it can still
//! produce non-zero output. A sink drives the root node to exhaustion. This
//! crate provides the graph contract and the nodes that are not specific to
//! the PlayStation SPU:
//!
//! - [`Module`] and the [`Mono`] / [`Stereo`] sample types
//! - [`Filter`] second-order Butterworth low/high-pass
//! - [`LinearResampler`] and [`SincResampler`] with a cached [`SincTable`]
//! - [`Volume`], [`Silencer`], [`Splitter`], [`Statistics`], [`Normalizer`]
//! - [`EngineError`], the single error type the whole engine reports with
//!
//! ## Example
//!
//! ```rust,ignore
//! // Wrap a source in a low-pass filter and a volume scaler, then drain it.
//! let graph = Volume::new(
//!     Box::new(Filter::new(source, FilterKind::LowPass, 0.33)?),
//!     0.5,
//! );
//! let mut s = Stereo::ZERO;
//! while graph.next(&mut s)? {
//!     sink.write(s);
//! }
//! ```

pub mod error;
pub mod filter;
pub mod math;
pub mod module;
pub mod normalizer;
pub mod resample;
pub mod sample;
pub mod silencer;
pub mod splitter;
pub mod statistics;
pub mod volume;

pub use error::{EngineError, Result};
pub use filter::{Filter, FilterKind};
pub use math::{amplitude_to_decibels, decibels_to_amplitude};
pub use module::{BoxedModule, Module};
pub use normalizer::Normalizer;
pub use resample::{LinearResampler, SincResampler, SincTable};
pub use sample::{sample_to_i16, Mono, Sample, Stereo, DENORM_LIMIT, SILENCE};
pub use silencer::Silencer;
pub use splitter::Splitter;
pub use statistics::{ProgressFn, Statistics, StatisticsMode};
pub use volume::Volume;

//! Infierno song: music data model, sequencing, and extraction graphs.
//!
//! Sits on top of [`infierno_core`] (the module graph) and [`infierno_spu`]
//! (the sound hardware emulation) and turns parsed song records into audio:
//!
//! - [`Score`], [`Song`], [`Track`], [`Instrument`], [`SubInstrument`]: the
//!   records the host's file parsers produce
//! - [`MusicStream`]: the MIDI-like event stream parser
//! - [`TrackPlayer`] / [`SongPlayer`]: the sequencer that turns events into
//!   voices and mixes them
//! - [`ExtractOptions`] and [`compose`]: the options table and the
//!   composition of the full output-processing graph
//!
//! ## Example
//!
//! ```rust,ignore
//! let player = SongPlayer::new(score.song(index)?, &score, &patches, &options)?;
//! let mut graph = compose(
//!     Box::new(player),
//!     &options,
//!     auto_reverb_for(index),
//!     &spill_path,
//!     StatisticsMode::Detailed,
//!     None,
//! )?;
//! let mut s = Stereo::ZERO;
//! while graph.next(&mut s)? {
//!     sink.write(s);
//! }
//! ```

pub mod extract;
pub mod music;
pub mod options;
pub mod records;
pub mod song;
pub mod track;

pub use extract::{compose, resolve_reverb};
pub use music::{MusicEvent, MusicStream};
pub use options::{ExtractOptions, ReverbSetting};
pub use records::{Instrument, Score, Song, SubInstrument, Track};
pub use song::SongPlayer;
pub use track::TrackPlayer;

//! Infierno io: rendering module graphs to WAV files.
//!
//! The engine itself only knows the per-sample sink contract; this crate
//! supplies the one sink hosts actually want, a 16-bit PCM WAV file. The
//! container framing is delegated to `hound`.

mod wav;

pub use wav::{render_mono, render_stereo, write_i16_frames};

/// Errors from rendering audio to disk.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// WAV encoding or container error.
    #[error("WAV file error: {0}")]
    Wav(#[from] hound::Error),

    /// The module graph failed while being drained.
    #[error(transparent)]
    Engine(#[from] infierno_core::EngineError),

    /// Filesystem error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result alias for rendering operations.
pub type Result<T> = std::result::Result<T, Error>;

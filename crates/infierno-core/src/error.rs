//! Error type shared by the whole engine.

use thiserror::Error;

/// Errors surfaced by the audio engine.
///
/// All failures inside the module graph are reported through this one type.
/// They surface from [`Module::next`](crate::Module::next) at the nearest
/// opportunity; no node attempts local recovery, and the host is expected to
/// drop the graph after an error (destructors release spill files and other
/// held resources).
#[derive(Debug, Error)]
pub enum EngineError {
    /// Malformed input data: a corrupt ADPCM block, an unknown music event
    /// code, a read past the end of a music stream, or an out-of-range event
    /// parameter.
    #[error("corrupt stream: {0}")]
    CorruptStream(String),

    /// A referenced resource is absent: no sub-instrument covers a note, no
    /// patch matches a sub-instrument's patch id, or a seek target lies past
    /// the end of a stream.
    #[error("missing resource: {0}")]
    MissingResource(String),

    /// A configuration value is out of its required range.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// A patch slated for repair does not match the expected layout.
    #[error("patch {id} cannot be repaired: it does not match the expected layout")]
    PatchRepairMismatch {
        /// Id of the patch that failed validation.
        id: u16,
    },

    /// A spill file read or write failed in the normalizer.
    #[error("i/o failure: {0}")]
    IoFailure(String),

    /// The host requested termination.
    #[error("aborted")]
    Aborted,
}

impl From<std::io::Error> for EngineError {
    fn from(err: std::io::Error) -> Self {
        EngineError::IoFailure(err.to_string())
    }
}

/// Result alias used throughout the engine.
pub type Result<T> = std::result::Result<T, EngineError>;

//! Error types for mixer control-plane operations.

use thiserror::Error;

/// Errors surfaced by [`Mixer`](crate::Mixer) operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MixerError {
    /// The audio device/clock could not be acquired.
    ///
    /// Fatal at construction: no partially-built mixer is ever returned.
    #[error("audio context unavailable: {0}")]
    ContextUnavailable(String),

    /// Operation attempted after [`Mixer::dispose`](crate::Mixer::dispose).
    #[error("mixer has been disposed")]
    Disposed,
}

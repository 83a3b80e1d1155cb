//! Typed failures surfaced by player operations.
//!
//! `open`/`play` report setup failures instead of continuing with a
//! half-initialized session; streaming-loop failures terminate the session
//! with a reported cause.

use thiserror::Error;

/// Errors surfaced by source resolution, decoding setup, line acquisition,
/// and the streaming copy loop.
#[derive(Debug, Error)]
pub enum PlayerError {
    /// `play` was called before any source was opened.
    #[error("no source has been opened")]
    NoSource,

    /// A byte-stream source was already consumed by a previous session.
    #[error("stream source already consumed; open a fresh stream to replay")]
    SourceConsumed,

    /// The platform decoder could not recognize or set up the source.
    #[error("unsupported audio format: {0}")]
    UnsupportedFormat(String),

    /// No usable output device or line for the negotiated format.
    #[error("output device unavailable: {0}")]
    DeviceUnavailable(String),

    /// I/O failure while reading the source.
    #[error("i/o failure: {0}")]
    Io(#[from] std::io::Error),
}

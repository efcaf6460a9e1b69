use thiserror::Error;

use crate::{engine::EngineError, track::MediaKind};

pub type Result<T> = std::result::Result<T, MuxError>;

/// Errors surfaced by sessions and the handle arena.
#[derive(Debug, Error)]
pub enum MuxError {
    /// The engine could not allocate or open an output for the destination.
    #[error("cannot stream to '{destination}' as '{format}': {reason}")]
    SinkUnavailable {
        destination: String,
        format: String,
        reason: String,
    },

    #[error("unable to set muxer option '{key}': {reason}")]
    OptionConfiguration { key: String, reason: String },

    #[error("{0} track already registered")]
    TrackLimitExceeded(MediaKind),

    #[error("unsupported codec: {0}")]
    UnsupportedCodec(String),

    #[error("failed to create {kind} stream: {reason}")]
    StreamCreation { kind: MediaKind, reason: String },

    #[error("no {0} track registered")]
    TrackNotFound(MediaKind),

    #[error("tracks cannot be added after the header is written")]
    HeaderAlreadyWritten,

    /// Fatal: the session is torn down and accepts no further writes.
    #[error("error occurred when writing header: {0}")]
    HeaderWrite(String),

    /// Per packet: the session stays usable.
    #[error("error while writing packet: {0}")]
    PacketWrite(String),

    #[error("invalid sample: {0}")]
    InvalidSample(String),

    #[error("session is closed")]
    SessionClosed,
}

impl MuxError {
    pub(crate) fn sink_unavailable(destination: &str, format: &str, err: EngineError) -> Self {
        MuxError::SinkUnavailable {
            destination: destination.to_string(),
            format: format.to_string(),
            reason: err.to_string(),
        }
    }

    /// True for errors after which the session still accepts samples.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, MuxError::PacketWrite(_) | MuxError::InvalidSample(_))
    }
}

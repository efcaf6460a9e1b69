//! Boundary between sessions and the container muxer that serializes them.

use thiserror::Error;

use crate::{options::MuxOptions, packet::PendingPacket, track::CodecParams};

/// Diagnostic reported by the muxer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct EngineError(pub String);

impl EngineError {
    pub fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }
}

impl From<ffmpeg_next::Error> for EngineError {
    fn from(err: ffmpeg_next::Error) -> Self {
        Self(err.to_string())
    }
}

/// Option that the muxer refused.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("option '{key}': {reason}")]
pub struct OptionError {
    pub key: String,
    pub reason: String,
}

/// Allocates output contexts.
pub trait MuxEngine {
    type Context: OutputContext;

    /// Allocates a context for `format` writing to `destination`, opening the
    /// destination for writing when the format does its own I/O.
    fn open(&self, destination: &str, format: &str) -> Result<Self::Context, EngineError>;
}

/// One open output. Dropping it releases every resource it holds.
pub trait OutputContext {
    /// Stores options to be used by `write_header`.
    fn apply_options(&mut self, options: &MuxOptions) -> Result<(), OptionError>;

    /// Creates a stream and returns its index.
    fn add_stream(&mut self, params: &CodecParams) -> Result<usize, EngineError>;

    /// Replaces the initialization data of a stream.
    fn set_extradata(&mut self, stream_index: usize, data: &[u8]) -> Result<(), EngineError>;

    fn write_header(&mut self) -> Result<(), EngineError>;

    /// Serializes one packet whose payload is `data`.
    fn write_packet(&mut self, packet: &PendingPacket, data: &[u8]) -> Result<(), EngineError>;

    fn write_trailer(&mut self) -> Result<(), EngineError>;
}

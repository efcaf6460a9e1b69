/// Registers FFmpeg components (formats, network protocols). Call once at
/// startup before opening any session or input.
pub fn init() -> anyhow::Result<()> {
    ffmpeg_next::init().map_err(|e| anyhow::anyhow!("ffmpeg_next init: {}", e))?;
    unsafe {
        ffmpeg_next::ffi::avformat_network_init();
    }
    Ok(())
}

pub mod arena;
pub mod bus;
pub mod engine;
pub mod error;
pub mod input;
pub mod options;
pub mod output;
pub mod packet;
pub mod session;
pub mod stream;
pub mod timestamp;
pub mod track;

#[cfg(test)]
mod mock;

pub use arena::{SessionArena, SessionHandle};
pub use bus::SessionTask;
pub use error::{MuxError, Result};
pub use output::FfmpegEngine;
pub use packet::SampleFlags;
pub use session::Session;
pub use track::{AudioCodec, AudioParams, MediaKind, VideoCodec, VideoParams};

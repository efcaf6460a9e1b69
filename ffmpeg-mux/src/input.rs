use std::collections::HashMap;
use std::path::Path;

use bytes::Bytes;

use crate::{
    stream::AvStream,
    timestamp::{self, MICROSECONDS, NOPTS},
    track::MediaKind,
};

/// One encoded sample read from a source, timestamped in microseconds.
#[derive(Debug, Clone)]
pub struct Sample {
    pub stream_index: usize,
    pub kind: MediaKind,
    pub data: Bytes,
    pub timestamp_us: i64,
    pub keyframe: bool,
}

/// Synchronous demuxer over a recorded media file or URL.
pub struct AvInput {
    inner: ffmpeg_next::format::context::Input,
    streams: HashMap<usize, AvStream>,
}

impl AvInput {
    pub fn new(url: &str) -> anyhow::Result<Self> {
        let input = ffmpeg_next::format::input(Path::new(url))
            .map_err(|e| anyhow::anyhow!("open input {}: {}", url, e))?;

        let mut streams = HashMap::new();
        for stream in input.streams() {
            streams.insert(stream.index(), AvStream::from(stream));
        }
        log::debug!("input {} opened with {} streams", url, streams.len());

        Ok(Self {
            inner: input,
            streams,
        })
    }

    pub fn streams(&self) -> &HashMap<usize, AvStream> {
        &self.streams
    }

    /// First stream of `kind`, if any.
    pub fn best_stream(&self, kind: MediaKind) -> Option<&AvStream> {
        let mut candidates: Vec<&AvStream> = self
            .streams
            .values()
            .filter(|s| s.kind() == Some(kind))
            .collect();
        candidates.sort_by_key(|s| s.index());
        candidates.into_iter().next()
    }

    /// Next audio or video sample, `None` at end of stream. Packets of other
    /// media types are skipped.
    pub fn read_sample(&mut self) -> Option<Sample> {
        for (stream, packet) in self.inner.packets() {
            let Some(kind) = self.streams.get(&stream.index()).and_then(|s| s.kind()) else {
                continue;
            };
            let Some(data) = packet.data() else {
                continue;
            };

            let ts = packet.pts().or(packet.dts()).unwrap_or(NOPTS);
            let timestamp_us = timestamp::rescale(ts, stream.time_base(), MICROSECONDS);
            return Some(Sample {
                stream_index: stream.index(),
                kind,
                data: Bytes::copy_from_slice(data),
                timestamp_us,
                keyframe: packet.is_key(),
            });
        }
        None
    }
}

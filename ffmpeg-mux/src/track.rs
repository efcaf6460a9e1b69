use std::fmt;

use bytes::Bytes;
use ffmpeg_next::{Rational, codec::Id};

use crate::{
    error::{MuxError, Result},
    timestamp::MILLISECONDS,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaKind {
    Video,
    Audio,
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MediaKind::Video => write!(f, "video"),
            MediaKind::Audio => write!(f, "audio"),
        }
    }
}

/// Video codecs selectable by type code: `0` is H.264, `1` is HEVC.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VideoCodec {
    H264,
    Hevc,
}

impl VideoCodec {
    pub fn from_type_code(code: i32) -> Result<Self> {
        match code {
            0 => Ok(VideoCodec::H264),
            1 => Ok(VideoCodec::Hevc),
            other => Err(MuxError::UnsupportedCodec(format!(
                "video codec type {}",
                other
            ))),
        }
    }

    pub fn id(&self) -> Id {
        match self {
            VideoCodec::H264 => Id::H264,
            VideoCodec::Hevc => Id::HEVC,
        }
    }
}

/// Audio codecs selectable by type code: `0` is AAC.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioCodec {
    Aac,
}

impl AudioCodec {
    pub fn from_type_code(code: i32) -> Result<Self> {
        match code {
            0 => Ok(AudioCodec::Aac),
            other => Err(MuxError::UnsupportedCodec(format!(
                "audio codec type {}",
                other
            ))),
        }
    }

    pub fn id(&self) -> Id {
        match self {
            AudioCodec::Aac => Id::AAC,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelLayout {
    Stereo,
}

impl ChannelLayout {
    pub fn channels(&self) -> u32 {
        match self {
            ChannelLayout::Stereo => 2,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoParams {
    pub codec: VideoCodec,
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    /// Frames between keyframes.
    pub gop: u32,
    pub bitrate: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioParams {
    pub codec: AudioCodec,
    pub sample_rate: u32,
    pub channel_layout: ChannelLayout,
    pub bitrate: i64,
}

impl AudioParams {
    /// Stereo is the only supported layout.
    pub fn new(codec: AudioCodec, sample_rate: u32, bitrate: i64) -> Self {
        Self {
            codec,
            sample_rate,
            channel_layout: ChannelLayout::Stereo,
            bitrate,
        }
    }

    pub fn channels(&self) -> u32 {
        self.channel_layout.channels()
    }
}

/// Codec parameters record handed to the engine when a stream is created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CodecParams {
    Video(VideoParams),
    Audio(AudioParams),
}

impl CodecParams {
    pub fn kind(&self) -> MediaKind {
        match self {
            CodecParams::Video(_) => MediaKind::Video,
            CodecParams::Audio(_) => MediaKind::Audio,
        }
    }

    pub fn codec_id(&self) -> Id {
        match self {
            CodecParams::Video(v) => v.codec.id(),
            CodecParams::Audio(a) => a.codec.id(),
        }
    }
}

/// One elementary stream of a session.
#[derive(Debug, Clone)]
pub struct Track {
    index: usize,
    params: CodecParams,
    time_base: Rational,
    extradata: Bytes,
}

impl Track {
    pub(crate) fn new(index: usize, params: CodecParams) -> Self {
        Self {
            index,
            params,
            time_base: MILLISECONDS,
            extradata: Bytes::new(),
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn kind(&self) -> MediaKind {
        self.params.kind()
    }

    pub fn params(&self) -> &CodecParams {
        &self.params
    }

    pub fn time_base(&self) -> Rational {
        self.time_base
    }

    /// Codec initialization data (parameter sets, AudioSpecificConfig).
    pub fn extradata(&self) -> &[u8] {
        &self.extradata
    }

    pub(crate) fn set_extradata(&mut self, data: &[u8]) {
        self.extradata = Bytes::copy_from_slice(data);
    }
}

/// The session's track slots: at most one video and one audio track.
#[derive(Debug, Default)]
pub struct TrackRegistry {
    video: Option<Track>,
    audio: Option<Track>,
}

impl TrackRegistry {
    pub fn len(&self) -> usize {
        self.video.is_some() as usize + self.audio.is_some() as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, kind: MediaKind) -> Option<&Track> {
        match kind {
            MediaKind::Video => self.video.as_ref(),
            MediaKind::Audio => self.audio.as_ref(),
        }
    }

    pub(crate) fn get_mut(&mut self, kind: MediaKind) -> Option<&mut Track> {
        match kind {
            MediaKind::Video => self.video.as_mut(),
            MediaKind::Audio => self.audio.as_mut(),
        }
    }

    /// Fails if a track of the same kind is already registered.
    pub(crate) fn ensure_vacant(&self, kind: MediaKind) -> Result<()> {
        match self.get(kind) {
            Some(_) => Err(MuxError::TrackLimitExceeded(kind)),
            None => Ok(()),
        }
    }

    pub(crate) fn insert(&mut self, track: Track) {
        match track.kind() {
            MediaKind::Video => self.video = Some(track),
            MediaKind::Audio => self.audio = Some(track),
        }
    }

    /// Tracks in registration (index) order.
    pub fn iter(&self) -> impl Iterator<Item = &Track> {
        let mut tracks: Vec<&Track> = self.video.iter().chain(self.audio.iter()).collect();
        tracks.sort_by_key(|t| t.index());
        tracks.into_iter()
    }
}

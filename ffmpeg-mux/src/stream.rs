use ffmpeg_next::{Rational, codec::Id, codec::Parameters, ffi::AVCodecParameters, format::stream};

use crate::{
    error::{MuxError, Result},
    track::{AudioCodec, AudioParams, CodecParams, MediaKind, VideoCodec, VideoParams},
};

unsafe impl Send for AvStream {}
unsafe impl Sync for AvStream {}

/// Stream of a demuxed source, described in terms a session track accepts.
pub struct AvStream {
    index: usize,
    parameters: Parameters,
    time_base: Rational,
    rate: Rational,
}

impl AvStream {
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn time_base(&self) -> Rational {
        self.time_base
    }

    pub fn rate(&self) -> Rational {
        self.rate
    }

    pub fn codec_id(&self) -> Id {
        self.parameters.id()
    }

    pub fn kind(&self) -> Option<MediaKind> {
        match self.parameters.medium() {
            ffmpeg_next::media::Type::Video => Some(MediaKind::Video),
            ffmpeg_next::media::Type::Audio => Some(MediaKind::Audio),
            _ => None,
        }
    }

    fn raw(&self) -> &AVCodecParameters {
        unsafe { &*(self.parameters.as_ptr() as *const AVCodecParameters) }
    }

    pub fn width(&self) -> u32 {
        self.raw().width.max(0) as u32
    }

    pub fn height(&self) -> u32 {
        self.raw().height.max(0) as u32
    }

    /// Whole frames per second, 0 when the source does not say.
    pub fn fps(&self) -> u32 {
        if self.rate.denominator() == 0 {
            return 0;
        }
        (self.rate.numerator() / self.rate.denominator()).max(0) as u32
    }

    pub fn bitrate(&self) -> i64 {
        self.raw().bit_rate
    }

    pub fn sample_rate(&self) -> u32 {
        self.raw().sample_rate.max(0) as u32
    }

    /// Codec initialization data carried by the container, empty if none.
    pub fn extradata(&self) -> &[u8] {
        let raw = self.raw();
        if raw.extradata.is_null() || raw.extradata_size <= 0 {
            return &[];
        }
        unsafe { std::slice::from_raw_parts(raw.extradata, raw.extradata_size as usize) }
    }

    /// Track parameters for this stream. Fails for codecs a session cannot carry.
    pub fn codec_params(&self) -> Result<CodecParams> {
        match self.kind() {
            Some(MediaKind::Video) => {
                let fps = self.fps();
                Ok(CodecParams::Video(VideoParams {
                    codec: video_codec(self.codec_id())?,
                    width: self.width(),
                    height: self.height(),
                    fps,
                    // containers do not record the GOP, assume one second
                    gop: fps,
                    bitrate: self.bitrate(),
                }))
            }
            Some(MediaKind::Audio) => Ok(CodecParams::Audio(AudioParams::new(
                audio_codec(self.codec_id())?,
                self.sample_rate(),
                self.bitrate(),
            ))),
            None => Err(MuxError::UnsupportedCodec(format!(
                "stream {} is neither audio nor video",
                self.index
            ))),
        }
    }
}

pub fn video_codec(id: Id) -> Result<VideoCodec> {
    match id {
        Id::H264 => Ok(VideoCodec::H264),
        Id::HEVC => Ok(VideoCodec::Hevc),
        other => Err(MuxError::UnsupportedCodec(format!("video codec {:?}", other))),
    }
}

pub fn audio_codec(id: Id) -> Result<AudioCodec> {
    match id {
        Id::AAC => Ok(AudioCodec::Aac),
        other => Err(MuxError::UnsupportedCodec(format!("audio codec {:?}", other))),
    }
}

impl From<stream::Stream<'_>> for AvStream {
    fn from(stream: stream::Stream<'_>) -> Self {
        Self {
            index: stream.index(),
            parameters: stream.parameters(),
            time_base: stream.time_base(),
            rate: stream.avg_frame_rate(),
        }
    }
}

use crate::timestamp::NOPTS;

/// Per-sample flags as passed by the encoder pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleFlags {
    Ordinary,
    Keyframe,
    /// Codec initialization data. Only meaningful before the header is written.
    CodecConfig,
}

impl SampleFlags {
    pub const ORDINARY: i32 = 0;
    pub const KEYFRAME: i32 = 1;
    pub const CODEC_CONFIG: i32 = 2;

    pub fn raw(&self) -> i32 {
        match self {
            SampleFlags::Ordinary => Self::ORDINARY,
            SampleFlags::Keyframe => Self::KEYFRAME,
            SampleFlags::CodecConfig => Self::CODEC_CONFIG,
        }
    }
}

/// Unknown values are treated as ordinary samples.
impl From<i32> for SampleFlags {
    fn from(flags: i32) -> Self {
        match flags {
            Self::KEYFRAME => SampleFlags::Keyframe,
            Self::CODEC_CONFIG => SampleFlags::CodecConfig,
            _ => SampleFlags::Ordinary,
        }
    }
}

/// Packet record reused for every sample once the header is written.
///
/// The payload is never stored here; it is borrowed from the caller for the
/// duration of a single write.
#[derive(Debug, Clone)]
pub struct PendingPacket {
    stream_index: usize,
    pts: i64,
    dts: i64,
    duration: i64,
    position: i64,
    keyframe: bool,
    written: u64,
}

impl PendingPacket {
    pub(crate) fn new() -> Self {
        Self {
            stream_index: 0,
            pts: NOPTS,
            dts: NOPTS,
            duration: 0,
            position: -1,
            keyframe: false,
            written: 0,
        }
    }

    /// Resets the record for the next sample. Duration and position are left
    /// for the muxer to work out.
    pub(crate) fn prepare(&mut self, stream_index: usize, pts: i64, flags: SampleFlags) {
        self.stream_index = stream_index;
        self.pts = pts;
        self.dts = pts;
        self.duration = 0;
        self.position = -1;
        self.keyframe = flags == SampleFlags::Keyframe;
    }

    pub(crate) fn mark_written(&mut self) {
        self.written += 1;
    }

    pub fn stream_index(&self) -> usize {
        self.stream_index
    }

    pub fn pts(&self) -> i64 {
        self.pts
    }

    pub fn dts(&self) -> i64 {
        self.dts
    }

    pub fn duration(&self) -> i64 {
        self.duration
    }

    /// Byte position in the output, `-1` when unknown.
    pub fn position(&self) -> i64 {
        self.position
    }

    pub fn is_key(&self) -> bool {
        self.keyframe
    }

    /// Packets successfully handed to the muxer so far.
    pub fn written(&self) -> u64 {
        self.written
    }
}

//! Session lifecycle and per-sample writing.
//!
//! ```text
//!  open ──► NoHeader ──(audio extradata present)──► HeaderWritten ──close──► Closed
//!              │                                        (trailer)
//!              └──────────────close / header failure──────────────────────► Closed
//! ```
//!
//! Samples that arrive before the header are never muxed. Samples flagged as
//! codec configuration are stored as the track's extradata instead.

use crate::{
    engine::{MuxEngine, OutputContext},
    error::{MuxError, Result},
    options::{self, MuxOptions},
    packet::{PendingPacket, SampleFlags},
    timestamp,
    track::{
        AudioParams, CodecParams, MediaKind, Track, TrackRegistry, VideoCodec, VideoParams,
    },
};

enum State<C> {
    NoHeader(C),
    HeaderWritten { context: C, packet: PendingPacket },
    Closed,
}

/// A single muxing operation writing to one destination.
///
/// Not internally synchronized: every call takes `&mut self`. Separate
/// sessions can live on separate threads.
pub struct Session<C: OutputContext> {
    destination: String,
    format: String,
    options: MuxOptions,
    tracks: TrackRegistry,
    state: State<C>,
    warned_gate_closed: bool,
}

impl<C: OutputContext> Session<C> {
    /// Opens `destination` as `format`. Anything acquired is released again
    /// if a later step fails.
    pub fn open<E>(engine: &E, destination: &str, format: &str) -> Result<Self>
    where
        E: MuxEngine<Context = C>,
    {
        let mut context = engine.open(destination, format).map_err(|e| {
            log::error!(
                "error allocating streaming context for '{}' with output format '{}': {}",
                destination,
                format,
                e
            );
            MuxError::sink_unavailable(destination, format, e)
        })?;

        let options = options::resolve(format);
        if !options.is_empty() {
            context.apply_options(&options).map_err(|e| {
                log::error!("unable to set streaming options: {}", e);
                MuxError::OptionConfiguration {
                    key: e.key,
                    reason: e.reason,
                }
            })?;
        }

        log::info!(
            "session opened: {} as {} ({} options)",
            destination,
            format,
            options.len()
        );
        Ok(Self {
            destination: destination.to_string(),
            format: format.to_string(),
            options,
            tracks: TrackRegistry::default(),
            state: State::NoHeader(context),
            warned_gate_closed: false,
        })
    }

    pub fn add_video_track(&mut self, params: VideoParams) -> Result<usize> {
        self.add_track(CodecParams::Video(params))
    }

    pub fn add_audio_track(&mut self, params: AudioParams) -> Result<usize> {
        self.add_track(CodecParams::Audio(params))
    }

    fn add_track(&mut self, params: CodecParams) -> Result<usize> {
        let kind = params.kind();
        let context = match &mut self.state {
            State::NoHeader(context) => context,
            State::HeaderWritten { .. } => return Err(MuxError::HeaderAlreadyWritten),
            State::Closed => return Err(MuxError::SessionClosed),
        };
        if let CodecParams::Video(video) = &params {
            if video.codec == VideoCodec::Hevc && self.format == options::FLV {
                return Err(MuxError::UnsupportedCodec(
                    "HEVC video cannot be carried in FLV".to_string(),
                ));
            }
        }
        self.tracks.ensure_vacant(kind)?;

        let index = context.add_stream(&params).map_err(|e| {
            log::error!("could not add {} stream: {}", kind, e);
            MuxError::StreamCreation {
                kind,
                reason: e.to_string(),
            }
        })?;
        log::debug!(
            "{} track {} registered on {}: {:?}",
            kind,
            index,
            self.destination,
            params
        );
        self.tracks.insert(Track::new(index, params));
        Ok(index)
    }

    pub fn write_video_sample(
        &mut self,
        data: &[u8],
        timestamp_us: i64,
        flags: SampleFlags,
    ) -> Result<()> {
        self.write_sample(MediaKind::Video, data, timestamp_us, flags)
    }

    pub fn write_audio_sample(
        &mut self,
        data: &[u8],
        timestamp_us: i64,
        flags: SampleFlags,
    ) -> Result<()> {
        self.write_sample(MediaKind::Audio, data, timestamp_us, flags)
    }

    /// Writes one encoded sample of the `kind` track.
    ///
    /// `data` is only borrowed for the duration of the call.
    pub fn write_sample(
        &mut self,
        kind: MediaKind,
        data: &[u8],
        timestamp_us: i64,
        flags: SampleFlags,
    ) -> Result<()> {
        if matches!(self.state, State::NoHeader(_)) {
            return self.write_before_header(kind, data, flags);
        }

        let (context, packet) = match &mut self.state {
            State::HeaderWritten { context, packet } => (context, packet),
            _ => return Err(MuxError::SessionClosed),
        };
        let track = self.tracks.get(kind).ok_or(MuxError::TrackNotFound(kind))?;
        let pts = timestamp::normalize(timestamp_us, track.time_base());
        packet.prepare(track.index(), pts, flags);
        log::trace!(
            "pts:{} dts:{} duration:{} stream_index:{} key_frame:{} payload:{}",
            packet.pts(),
            packet.dts(),
            packet.duration(),
            packet.stream_index(),
            packet.is_key(),
            data.len()
        );

        match context.write_packet(packet, data) {
            Ok(()) => {
                packet.mark_written();
                Ok(())
            }
            Err(e) => {
                log::error!("error while writing packet: {}", e);
                Err(MuxError::PacketWrite(e.0))
            }
        }
    }

    fn write_before_header(&mut self, kind: MediaKind, data: &[u8], flags: SampleFlags) -> Result<()> {
        let track = self
            .tracks
            .get_mut(kind)
            .ok_or(MuxError::TrackNotFound(kind))?;
        if flags == SampleFlags::CodecConfig {
            track.set_extradata(data);
            log::debug!("{} extradata captured: {} bytes", kind, data.len());
        }

        if !self.header_gate_open() {
            self.warn_gate_closed(flags);
            return Ok(());
        }
        self.write_header()
    }

    /// Logged once per session: the header cannot go out yet and samples
    /// are being dropped.
    fn warn_gate_closed(&mut self, flags: SampleFlags) {
        if self.warned_gate_closed {
            return;
        }
        if self.tracks.get(MediaKind::Audio).is_none() {
            log::warn!(
                "{}: no audio track registered, the header will not be written",
                self.destination
            );
        } else if flags != SampleFlags::CodecConfig {
            log::warn!(
                "{}: audio codec config not received, dropping samples until it arrives",
                self.destination
            );
        } else {
            return;
        }
        self.warned_gate_closed = true;
    }

    /// The header waits for the audio extradata only.
    // TODO: gate on video extradata as well once upstream confirms it is required.
    fn header_gate_open(&self) -> bool {
        self.tracks
            .get(MediaKind::Audio)
            .is_some_and(|track| !track.extradata().is_empty())
    }

    fn write_header(&mut self) -> Result<()> {
        let mut context = match std::mem::replace(&mut self.state, State::Closed) {
            State::NoHeader(context) => context,
            other => {
                self.state = other;
                return Ok(());
            }
        };

        let result = self
            .tracks
            .iter()
            .filter(|track| !track.extradata().is_empty())
            .try_for_each(|track| context.set_extradata(track.index(), track.extradata()))
            .and_then(|()| context.write_header());

        match result {
            Ok(()) => {
                log::info!(
                    "header written: {} ({} tracks)",
                    self.destination,
                    self.tracks.len()
                );
                self.state = State::HeaderWritten {
                    context,
                    packet: PendingPacket::new(),
                };
                Ok(())
            }
            Err(e) => {
                // the session is aborted, release the output right away
                log::error!("error occurred when writing header: {}", e);
                drop(context);
                Err(MuxError::HeaderWrite(e.0))
            }
        }
    }

    /// Writes the trailer if the header went out, then releases the output.
    /// Trailer failures are logged only. Calling this again does nothing.
    pub fn close(&mut self) {
        match std::mem::replace(&mut self.state, State::Closed) {
            State::NoHeader(context) => {
                drop(context);
                log::info!("session closed before header: {}", self.destination);
            }
            State::HeaderWritten {
                mut context,
                packet,
            } => {
                if let Err(e) = context.write_trailer() {
                    log::error!("error writing trailer for {}: {}", self.destination, e);
                }
                drop(context);
                log::info!(
                    "session closed: {}, {} packets written",
                    self.destination,
                    packet.written()
                );
            }
            State::Closed => {}
        }
    }

    pub fn destination(&self) -> &str {
        &self.destination
    }

    pub fn format(&self) -> &str {
        &self.format
    }

    pub fn options(&self) -> &MuxOptions {
        &self.options
    }

    pub fn track(&self, kind: MediaKind) -> Option<&Track> {
        self.tracks.get(kind)
    }

    pub fn tracks(&self) -> &TrackRegistry {
        &self.tracks
    }

    pub fn is_header_written(&self) -> bool {
        matches!(self.state, State::HeaderWritten { .. })
    }

    pub fn is_closed(&self) -> bool {
        matches!(self.state, State::Closed)
    }

    pub fn packets_written(&self) -> u64 {
        match &self.state {
            State::HeaderWritten { packet, .. } => packet.written(),
            _ => 0,
        }
    }
}

impl<C: OutputContext> Drop for Session<C> {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
#[path = "session_test.rs"]
mod session_test;

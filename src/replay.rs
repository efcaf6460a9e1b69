use std::time::Duration;

use bytes::Bytes;
use ffmpeg_mux::{
    FfmpegEngine, MediaKind, MuxError, SampleFlags, SessionTask,
    input::{AvInput, Sample},
    timestamp::NOPTS,
    track::CodecParams,
};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::config::RelayConfig;

/// Gap inserted between the last sample of one pass and the first of the next.
const LOOP_GAP_US: i64 = 40_000;

#[derive(Debug, Clone)]
struct TrackSource {
    stream_index: usize,
    params: CodecParams,
    extradata: Bytes,
}

enum ReplayEvent {
    Tracks {
        video: Option<TrackSource>,
        audio: Option<TrackSource>,
    },
    Sample(Sample),
}

/// Shifts the timestamps of each pass so the output keeps increasing.
#[derive(Debug, Default)]
struct LoopClock {
    offset: i64,
    first: Option<i64>,
    last: i64,
}

impl LoopClock {
    fn map(&mut self, timestamp_us: i64) -> i64 {
        if timestamp_us == NOPTS {
            return NOPTS;
        }
        let first = *self.first.get_or_insert(timestamp_us);
        let ts = self.offset + (timestamp_us - first).max(0);
        self.last = self.last.max(ts);
        ts
    }

    fn next_pass(&mut self) {
        if self.first.is_some() {
            self.offset = self.last + LOOP_GAP_US;
        }
        self.first = None;
    }
}

fn track_source(input: &AvInput, kind: MediaKind) -> Option<TrackSource> {
    let stream = input.best_stream(kind)?;
    match stream.codec_params() {
        Ok(params) => Some(TrackSource {
            stream_index: stream.index(),
            params,
            extradata: Bytes::copy_from_slice(stream.extradata()),
        }),
        Err(e) => {
            log::warn!("skipping {} stream {}: {}", kind, stream.index(), e);
            None
        }
    }
}

fn read_input(
    url: &str,
    loop_count: u32,
    tx: mpsc::Sender<ReplayEvent>,
    cancel: CancellationToken,
) -> anyhow::Result<()> {
    let mut clock = LoopClock::default();
    for pass in 0..loop_count.max(1) {
        let mut input = AvInput::new(url)?;
        let video = track_source(&input, MediaKind::Video);
        let audio = track_source(&input, MediaKind::Audio);
        let selected = [
            video.as_ref().map(|t| t.stream_index),
            audio.as_ref().map(|t| t.stream_index),
        ];
        if pass == 0 && tx.blocking_send(ReplayEvent::Tracks { video, audio }).is_err() {
            return Ok(());
        }

        clock.next_pass();
        while let Some(mut sample) = input.read_sample() {
            if cancel.is_cancelled() {
                return Ok(());
            }
            if !selected.contains(&Some(sample.stream_index)) {
                continue;
            }
            sample.timestamp_us = clock.map(sample.timestamp_us);
            if tx.blocking_send(ReplayEvent::Sample(sample)).is_err() {
                return Ok(());
            }
        }
        log::info!("end of input {} (pass {}/{})", url, pass + 1, loop_count);
    }
    Ok(())
}

async fn add_tracks(
    session: &SessionTask,
    video: Option<TrackSource>,
    audio: Option<TrackSource>,
) -> anyhow::Result<()> {
    let mut config = Vec::new();
    for source in [video, audio].into_iter().flatten() {
        let kind = source.params.kind();
        match source.params {
            CodecParams::Video(params) => session.add_video_track(params).await?,
            CodecParams::Audio(params) => session.add_audio_track(params).await?,
        };
        if !source.extradata.is_empty() {
            config.push((kind, source.extradata));
        } else if kind == MediaKind::Audio {
            log::warn!(
                "input audio stream {} carries no codec config, the header cannot be written",
                source.stream_index
            );
        }
    }
    // codec configuration goes out after every track exists so the header
    // carries both
    for (kind, extradata) in config {
        session
            .write_sample(kind, extradata, 0, SampleFlags::CodecConfig)
            .await?;
    }
    Ok(())
}

pub async fn run(config: &RelayConfig, cancel: CancellationToken) -> anyhow::Result<()> {
    let format = config.format().to_string();
    let session = SessionTask::open(FfmpegEngine, &config.destination, &format).await?;
    log::info!("relaying {} to {} as {}", config.input, session.id(), format);

    let (tx, mut rx) = mpsc::channel(256);
    let url = config.input.clone();
    let loop_count = config.loop_count;
    let reader_cancel = cancel.clone();
    let reader =
        tokio::task::spawn_blocking(move || read_input(&url, loop_count, tx, reader_cancel));

    let result = relay(&session, &mut rx, config.realtime, &cancel).await;
    session.close().await;
    drop(rx);
    cancel.cancel();

    reader.await??;
    result
}

async fn relay(
    session: &SessionTask,
    rx: &mut mpsc::Receiver<ReplayEvent>,
    realtime: bool,
    cancel: &CancellationToken,
) -> anyhow::Result<()> {
    let started = Instant::now();
    let mut written = 0u64;
    loop {
        let event = tokio::select! {
            _ = cancel.cancelled() => break,
            event = rx.recv() => match event {
                Some(event) => event,
                None => break,
            },
        };

        match event {
            ReplayEvent::Tracks { video, audio } => {
                if video.is_none() && audio.is_none() {
                    anyhow::bail!("input has no usable audio or video stream");
                }
                add_tracks(session, video, audio).await?;
            }
            ReplayEvent::Sample(sample) => {
                if realtime && sample.timestamp_us != NOPTS && sample.timestamp_us > 0 {
                    let due = started + Duration::from_micros(sample.timestamp_us as u64);
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        _ = tokio::time::sleep_until(due) => {}
                    }
                }

                let flags = if sample.keyframe {
                    SampleFlags::Keyframe
                } else {
                    SampleFlags::Ordinary
                };
                match session
                    .write_sample(sample.kind, sample.data, sample.timestamp_us, flags)
                    .await
                {
                    Ok(()) => written += 1,
                    Err(e) if e.is_recoverable() => {
                        log::warn!("dropping {} sample: {}", sample.kind, e);
                    }
                    Err(MuxError::SessionClosed) => break,
                    Err(e) => return Err(e.into()),
                }
            }
        }
    }
    log::info!("relay finished, {} samples submitted", written);
    Ok(())
}

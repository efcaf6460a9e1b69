use crate::error::MuxError;
use crate::mock::{RecordingEngine, RecordingOutput};
use crate::packet::SampleFlags;
use crate::session::Session;
use crate::timestamp::NOPTS;
use crate::track::{AudioCodec, AudioParams, MediaKind, VideoCodec, VideoParams};

const AUDIO_CONFIG: &[u8] = &[0x12, 0x10];
const VIDEO_CONFIG: &[u8] = &[0x01, 0x64, 0x00, 0x1f, 0xff, 0xe1];

fn video_params() -> VideoParams {
    VideoParams {
        codec: VideoCodec::H264,
        width: 1280,
        height: 720,
        fps: 30,
        gop: 60,
        bitrate: 2_500_000,
    }
}

fn audio_params() -> AudioParams {
    AudioParams::new(AudioCodec::Aac, 44_100, 128_000)
}

fn open(engine: &RecordingEngine, format: &str) -> Session<RecordingOutput> {
    Session::open(engine, "rtmp://localhost/live/test", format).unwrap()
}

/// Opens a session with both tracks and pushes both configs, so the header is out.
fn open_streaming(engine: &RecordingEngine) -> anyhow::Result<Session<RecordingOutput>> {
    let mut session = open(engine, "flv");
    session.add_video_track(video_params())?;
    session.add_audio_track(audio_params())?;
    session.write_video_sample(VIDEO_CONFIG, 0, SampleFlags::CodecConfig)?;
    session.write_audio_sample(AUDIO_CONFIG, 0, SampleFlags::CodecConfig)?;
    assert!(session.is_header_written());
    Ok(session)
}

#[test]
fn test_open_stores_options() {
    let engine = RecordingEngine::new();
    let session = open(&engine, "dash");
    assert_eq!(session.options().len(), 13);
    assert_eq!(session.options().get("window_size"), Some("5"));
    assert_eq!(engine.probe().options.as_ref(), Some(session.options()));

    let session = open(&engine, "flv");
    assert!(session.options().is_empty());
}

#[test]
fn test_open_sink_unavailable() {
    let engine = RecordingEngine::new();
    engine.probe().fail_open = true;
    let result = Session::open(&engine, "rtmp://nowhere", "flv");
    assert!(matches!(result, Err(MuxError::SinkUnavailable { .. })));
    assert!(engine.probe().opened.is_empty());
}

#[test]
fn test_open_option_failure_releases_context() {
    let engine = RecordingEngine::new();
    engine.probe().reject_option = Some("utc_timing_url".to_string());
    let result = Session::open(&engine, "http://localhost/live.mpd", "dash");
    match result {
        Err(MuxError::OptionConfiguration { key, .. }) => assert_eq!(key, "utc_timing_url"),
        Err(e) => panic!("unexpected error: {e}"),
        Ok(_) => panic!("open should fail"),
    }
    assert_eq!(engine.probe().opened.len(), 1);
    assert_eq!(engine.probe().released, 1);
}

#[test]
fn test_add_tracks_assigns_indices() -> anyhow::Result<()> {
    let engine = RecordingEngine::new();
    let mut session = open(&engine, "flv");
    assert_eq!(session.add_video_track(video_params())?, 0);
    assert_eq!(session.add_audio_track(audio_params())?, 1);

    let audio = session.track(MediaKind::Audio).unwrap();
    assert_eq!(audio.index(), 1);
    assert_eq!(audio.time_base(), ffmpeg_next::Rational(1, 1000));
    assert_eq!(engine.probe().streams.len(), 2);
    Ok(())
}

#[test]
fn test_second_video_track_exceeds_limit() {
    let engine = RecordingEngine::new();
    for (width, height, fps, gop, bitrate) in [
        (1920, 1080, 30, 60, 4_000_000),
        (640, 360, 15, 15, 500_000),
        (1, 1, 1, 1, 1),
    ] {
        let mut session = open(&engine, "mp4");
        let params = VideoParams {
            codec: VideoCodec::H264,
            width,
            height,
            fps,
            gop,
            bitrate,
        };
        session.add_video_track(params.clone()).unwrap();
        assert!(matches!(
            session.add_video_track(params),
            Err(MuxError::TrackLimitExceeded(MediaKind::Video))
        ));
    }
}

#[test]
fn test_second_audio_track_exceeds_limit() {
    let engine = RecordingEngine::new();
    let mut session = open(&engine, "mp4");
    session.add_audio_track(audio_params()).unwrap();
    assert!(matches!(
        session.add_audio_track(audio_params()),
        Err(MuxError::TrackLimitExceeded(MediaKind::Audio))
    ));
    assert_eq!(engine.probe().streams.len(), 1);
}

#[test]
fn test_hevc_rejected_for_flv() {
    let engine = RecordingEngine::new();
    let params = VideoParams {
        codec: VideoCodec::Hevc,
        ..video_params()
    };

    let mut session = open(&engine, "flv");
    assert!(matches!(
        session.add_video_track(params.clone()),
        Err(MuxError::UnsupportedCodec(_))
    ));

    let mut session = open(&engine, "dash");
    assert_eq!(session.add_video_track(params).unwrap(), 0);
}

#[test]
fn test_header_waits_for_audio_config() -> anyhow::Result<()> {
    let engine = RecordingEngine::new();
    let mut session = open(&engine, "flv");
    session.add_video_track(video_params())?;
    session.add_audio_track(audio_params())?;

    // video config and ordinary samples do not open the gate
    session.write_video_sample(VIDEO_CONFIG, 0, SampleFlags::CodecConfig)?;
    session.write_video_sample(&[0x65, 0x88], 0, SampleFlags::Keyframe)?;
    session.write_audio_sample(&[0x21, 0x00], 0, SampleFlags::Ordinary)?;
    assert_eq!(engine.probe().headers, 0);
    assert!(!session.is_header_written());

    session.write_audio_sample(AUDIO_CONFIG, 0, SampleFlags::CodecConfig)?;
    assert_eq!(engine.probe().headers, 1);
    assert!(session.is_header_written());
    // nothing written before the header reaches the muxer
    assert!(engine.probe().packets.is_empty());

    session.write_audio_sample(&[0x21, 0x01], 23_000, SampleFlags::Ordinary)?;
    assert_eq!(engine.probe().headers, 1);
    assert_eq!(engine.probe().packets.len(), 1);

    // a late config sample is muxed as data, not a second header
    session.write_audio_sample(AUDIO_CONFIG, 46_000, SampleFlags::CodecConfig)?;
    assert_eq!(engine.probe().headers, 1);
    assert_eq!(engine.probe().packets.len(), 2);
    assert!(!engine.probe().packets[1].key);
    Ok(())
}

#[test]
fn test_header_carries_extradata() -> anyhow::Result<()> {
    let engine = RecordingEngine::new();
    let _session = open_streaming(&engine)?;
    let probe = engine.probe();
    assert_eq!(
        probe.header_extradata,
        vec![(0, VIDEO_CONFIG.to_vec()), (1, AUDIO_CONFIG.to_vec())]
    );
    Ok(())
}

#[test]
fn test_hevc_on_flv_reports_session_state_first() -> anyhow::Result<()> {
    let engine = RecordingEngine::new();
    let hevc = VideoParams {
        codec: VideoCodec::Hevc,
        ..video_params()
    };

    let mut session = open(&engine, "flv");
    session.add_audio_track(audio_params())?;
    session.write_audio_sample(AUDIO_CONFIG, 0, SampleFlags::CodecConfig)?;
    assert!(matches!(
        session.add_video_track(hevc.clone()),
        Err(MuxError::HeaderAlreadyWritten)
    ));

    session.close();
    assert!(matches!(
        session.add_video_track(hevc),
        Err(MuxError::SessionClosed)
    ));
    Ok(())
}

#[test]
fn test_missing_audio_config_is_reported() -> anyhow::Result<()> {
    let engine = RecordingEngine::new();
    let mut session = open(&engine, "flv");
    session.add_video_track(video_params())?;
    session.add_audio_track(audio_params())?;

    // configs alone are the normal start-up order, nothing to report
    session.write_video_sample(VIDEO_CONFIG, 0, SampleFlags::CodecConfig)?;
    assert!(!session.warned_gate_closed);

    // media while the audio track still has no extradata is dropped
    session.write_video_sample(&[0x65, 0x01], 0, SampleFlags::Keyframe)?;
    session.write_audio_sample(&[0x21, 0x00], 0, SampleFlags::Ordinary)?;
    assert!(session.warned_gate_closed);
    assert_eq!(engine.probe().headers, 0);
    assert!(engine.probe().packets.is_empty());

    session.write_audio_sample(AUDIO_CONFIG, 0, SampleFlags::CodecConfig)?;
    assert!(session.is_header_written());
    Ok(())
}

#[test]
fn test_video_only_session_never_writes_header() -> anyhow::Result<()> {
    let engine = RecordingEngine::new();
    let mut session = open(&engine, "mp4");
    session.add_video_track(video_params())?;
    session.write_video_sample(VIDEO_CONFIG, 0, SampleFlags::CodecConfig)?;
    for i in 0..10 {
        session.write_video_sample(&[0x41, i], i as i64 * 33_333, SampleFlags::Ordinary)?;
    }
    assert_eq!(engine.probe().headers, 0);
    assert!(engine.probe().packets.is_empty());
    assert!(session.warned_gate_closed);
    Ok(())
}

#[test]
fn test_packet_fields() -> anyhow::Result<()> {
    let engine = RecordingEngine::new();
    let mut session = open_streaming(&engine)?;

    session.write_video_sample(&[0x65, 0x01], 1_000_000, SampleFlags::Keyframe)?;
    session.write_video_sample(&[0x41, 0x02], 1_033_333, SampleFlags::Ordinary)?;
    session.write_audio_sample(&[0x21, 0x03], NOPTS, SampleFlags::Ordinary)?;

    let probe = engine.probe();
    let key = &probe.packets[0];
    assert_eq!(key.stream_index, 0);
    assert_eq!(key.pts, 1000);
    assert_eq!(key.dts, 1000);
    assert_eq!(key.duration, 0);
    assert_eq!(key.position, -1);
    assert!(key.key);
    assert_eq!(key.data, vec![0x65, 0x01]);

    let delta = &probe.packets[1];
    assert_eq!(delta.pts, 1033);
    assert!(!delta.key);

    let audio = &probe.packets[2];
    assert_eq!(audio.stream_index, 1);
    assert_eq!(audio.pts, NOPTS);
    assert_eq!(audio.dts, NOPTS);
    drop(probe);

    assert_eq!(session.packets_written(), 3);
    Ok(())
}

#[test]
fn test_extradata_replaced_before_header() -> anyhow::Result<()> {
    let engine = RecordingEngine::new();
    let mut session = open(&engine, "flv");
    session.add_video_track(video_params())?;
    session.add_audio_track(audio_params())?;
    session.write_video_sample(&[0xaa, 0xbb, 0xcc], 0, SampleFlags::CodecConfig)?;
    session.write_video_sample(VIDEO_CONFIG, 0, SampleFlags::CodecConfig)?;
    assert_eq!(
        session.track(MediaKind::Video).unwrap().extradata(),
        VIDEO_CONFIG
    );
    Ok(())
}

#[test]
fn test_packet_failure_is_recoverable() -> anyhow::Result<()> {
    let engine = RecordingEngine::new();
    let mut session = open_streaming(&engine)?;

    engine.probe().fail_packets = true;
    let err = session
        .write_video_sample(&[0x65], 0, SampleFlags::Keyframe)
        .unwrap_err();
    assert!(matches!(err, MuxError::PacketWrite(ref msg) if msg == "Broken pipe"));
    assert!(err.is_recoverable());

    engine.probe().fail_packets = false;
    session.write_video_sample(&[0x65], 40_000, SampleFlags::Keyframe)?;
    assert_eq!(engine.probe().packets.len(), 1);
    assert_eq!(session.packets_written(), 1);
    Ok(())
}

#[test]
fn test_header_failure_aborts_session() -> anyhow::Result<()> {
    let engine = RecordingEngine::new();
    engine.probe().fail_header = true;
    let mut session = open(&engine, "flv");
    session.add_audio_track(audio_params())?;

    let err = session
        .write_audio_sample(AUDIO_CONFIG, 0, SampleFlags::CodecConfig)
        .unwrap_err();
    assert!(matches!(err, MuxError::HeaderWrite(_)));
    assert!(session.is_closed());
    assert_eq!(engine.probe().released, 1);

    assert!(matches!(
        session.write_audio_sample(&[0x21], 0, SampleFlags::Ordinary),
        Err(MuxError::SessionClosed)
    ));
    session.close();
    assert_eq!(engine.probe().trailers, 0);
    assert_eq!(engine.probe().released, 1);
    Ok(())
}

#[test]
fn test_write_without_track() {
    let engine = RecordingEngine::new();
    let mut session = open(&engine, "flv");
    session.add_audio_track(audio_params()).unwrap();
    assert!(matches!(
        session.write_video_sample(&[0x65], 0, SampleFlags::Keyframe),
        Err(MuxError::TrackNotFound(MediaKind::Video))
    ));
}

#[test]
fn test_no_tracks_after_header() -> anyhow::Result<()> {
    let engine = RecordingEngine::new();
    let mut session = open(&engine, "flv");
    session.add_audio_track(audio_params())?;
    session.write_audio_sample(AUDIO_CONFIG, 0, SampleFlags::CodecConfig)?;
    assert!(matches!(
        session.add_video_track(video_params()),
        Err(MuxError::HeaderAlreadyWritten)
    ));
    Ok(())
}

#[test]
fn test_close_before_header() {
    let engine = RecordingEngine::new();
    let mut session = open(&engine, "flv");
    session.add_video_track(video_params()).unwrap();
    session.add_audio_track(audio_params()).unwrap();
    session.close();

    let probe = engine.probe();
    assert_eq!(probe.headers, 0);
    assert_eq!(probe.trailers, 0);
    assert_eq!(probe.released, 1);
}

#[test]
fn test_close_writes_trailer_once() -> anyhow::Result<()> {
    let engine = RecordingEngine::new();
    let mut session = open_streaming(&engine)?;
    session.write_video_sample(&[0x65], 0, SampleFlags::Keyframe)?;
    session.close();
    session.close();
    drop(session);

    let probe = engine.probe();
    assert_eq!(probe.trailers, 1);
    assert_eq!(probe.released, 1);
    Ok(())
}

#[test]
fn test_trailer_failure_still_releases() -> anyhow::Result<()> {
    let engine = RecordingEngine::new();
    let mut session = open_streaming(&engine)?;
    engine.probe().fail_trailer = true;
    session.close();
    assert!(session.is_closed());
    assert_eq!(engine.probe().trailers, 1);
    assert_eq!(engine.probe().released, 1);
    Ok(())
}

#[test]
fn test_drop_closes() -> anyhow::Result<()> {
    let engine = RecordingEngine::new();
    {
        let _session = open_streaming(&engine)?;
    }
    assert_eq!(engine.probe().trailers, 1);
    assert_eq!(engine.probe().released, 1);
    Ok(())
}

#[test]
fn test_write_after_close() -> anyhow::Result<()> {
    let engine = RecordingEngine::new();
    let mut session = open_streaming(&engine)?;
    session.close();

    let before = engine.probe().packets.len();
    for flags in [
        SampleFlags::Ordinary,
        SampleFlags::Keyframe,
        SampleFlags::CodecConfig,
    ] {
        assert!(matches!(
            session.write_video_sample(&[0x65], 0, flags),
            Err(MuxError::SessionClosed)
        ));
    }
    assert!(matches!(
        session.add_audio_track(audio_params()),
        Err(MuxError::SessionClosed)
    ));
    let probe = engine.probe();
    assert_eq!(probe.packets.len(), before);
    assert_eq!(probe.headers, 1);
    assert_eq!(probe.trailers, 1);
    Ok(())
}

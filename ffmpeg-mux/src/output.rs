use std::{ffi::CString, ptr};

use ffmpeg_next::{
    Dictionary, ffi,
    format::context::Output,
    packet::{Flags, Mut},
};

use crate::{
    engine::{EngineError, MuxEngine, OptionError, OutputContext},
    options::MuxOptions,
    packet::PendingPacket,
    timestamp::{self, MILLISECONDS},
    track::CodecParams,
};

/// Engine backed by libavformat.
#[derive(Debug, Default, Clone, Copy)]
pub struct FfmpegEngine;

impl FfmpegEngine {
    pub fn new() -> Self {
        Self
    }
}

impl MuxEngine for FfmpegEngine {
    type Context = AvOutput;

    fn open(&self, destination: &str, format: &str) -> Result<AvOutput, EngineError> {
        AvOutput::new(destination, format)
    }
}

pub struct AvOutput {
    inner: Output,
    options: MuxOptions,
    // allocated once the header is out, reused for every packet
    packet: Option<ffmpeg_next::Packet>,
    have_written_header: bool,
    have_written_trailer: bool,
}

impl AvOutput {
    pub fn new(url: &str, format: &str) -> Result<Self, EngineError> {
        let c_url = CString::new(url)
            .map_err(|e| EngineError::new(format!("invalid url {:?}: {}", url, e)))?;
        let c_format = CString::new(format)
            .map_err(|e| EngineError::new(format!("invalid format {:?}: {}", format, e)))?;

        unsafe {
            let mut ctx: *mut ffi::AVFormatContext = ptr::null_mut();
            let ret = ffi::avformat_alloc_output_context2(
                &mut ctx,
                ptr::null(),
                c_format.as_ptr(),
                c_url.as_ptr(),
            );
            if ret < 0 {
                return Err(ffmpeg_next::Error::from(ret).into());
            }
            if ctx.is_null() {
                return Err(EngineError::new(format!("no output context for '{}'", url)));
            }
            // owns ctx from here, dropping it frees the context and closes pb
            let output = Output::wrap(ctx);

            let nofile = ((*(*ctx).oformat).flags & ffi::AVFMT_NOFILE as i32) != 0;
            if !nofile {
                let ret = ffi::avio_open(
                    &mut (*ctx).pb,
                    c_url.as_ptr(),
                    ffi::AVIO_FLAG_WRITE as i32,
                );
                if ret < 0 {
                    log::error!(
                        "could not open '{}': {}",
                        url,
                        ffmpeg_next::Error::from(ret)
                    );
                    return Err(ffmpeg_next::Error::from(ret).into());
                }
            }

            Ok(Self {
                inner: output,
                options: MuxOptions::new(),
                packet: None,
                have_written_header: false,
                have_written_trailer: false,
            })
        }
    }

    pub fn format_name(&self) -> String {
        self.inner.format().name().to_string()
    }
}

impl OutputContext for AvOutput {
    fn apply_options(&mut self, options: &MuxOptions) -> Result<(), OptionError> {
        for (key, value) in options.iter() {
            if key.is_empty() {
                return Err(OptionError {
                    key: key.to_string(),
                    reason: "empty option name".to_string(),
                });
            }
            if key.contains('\0') || value.contains('\0') {
                return Err(OptionError {
                    key: key.to_string(),
                    reason: "contains a nul byte".to_string(),
                });
            }
            self.options.set(key, value);
        }
        Ok(())
    }

    fn add_stream(&mut self, params: &CodecParams) -> Result<usize, EngineError> {
        let mut stream = self
            .inner
            .add_stream(ffmpeg_next::encoder::find(params.codec_id()))?;
        stream.set_time_base(MILLISECONDS);
        let index = stream.index();

        unsafe {
            let st = stream.as_mut_ptr();
            (*st).id = index as i32;
            let par = (*st).codecpar;
            (*par).codec_id = params.codec_id().into();
            match params {
                CodecParams::Video(video) => {
                    (*st).avg_frame_rate = ffi::AVRational {
                        num: video.fps as i32,
                        den: 1,
                    };
                    (*par).codec_type = ffi::AVMediaType::AVMEDIA_TYPE_VIDEO;
                    (*par).bit_rate = video.bitrate;
                    (*par).width = video.width as i32;
                    (*par).height = video.height as i32;
                    (*par).format = ffi::AVPixelFormat::AV_PIX_FMT_YUV420P as i32;
                }
                CodecParams::Audio(audio) => {
                    (*par).codec_type = ffi::AVMediaType::AVMEDIA_TYPE_AUDIO;
                    (*par).format = ffi::AVSampleFormat::AV_SAMPLE_FMT_S16 as i32;
                    (*par).bit_rate = audio.bitrate;
                    (*par).sample_rate = audio.sample_rate as i32;
                    ffi::av_channel_layout_uninit(&mut (*par).ch_layout);
                    ffi::av_channel_layout_default(&mut (*par).ch_layout, audio.channels() as i32);
                }
            }
        }

        Ok(index)
    }

    fn set_extradata(&mut self, stream_index: usize, data: &[u8]) -> Result<(), EngineError> {
        let mut stream = self
            .inner
            .stream_mut(stream_index)
            .ok_or_else(|| EngineError::new(format!("stream {} not found", stream_index)))?;

        unsafe {
            let par = (*stream.as_mut_ptr()).codecpar;
            if !(*par).extradata.is_null() {
                ffi::av_freep(&mut (*par).extradata as *mut *mut u8 as *mut std::ffi::c_void);
            }
            (*par).extradata_size = 0;
            if data.is_empty() {
                return Ok(());
            }

            // FFmpeg requires zeroed padding after extradata
            let size = data.len() + ffi::AV_INPUT_BUFFER_PADDING_SIZE as usize;
            let buf = ffi::av_mallocz(size) as *mut u8;
            if buf.is_null() {
                return Err(EngineError::new("extradata allocation failed"));
            }
            ptr::copy_nonoverlapping(data.as_ptr(), buf, data.len());
            (*par).extradata = buf;
            (*par).extradata_size = data.len() as i32;
        }
        Ok(())
    }

    fn write_header(&mut self) -> Result<(), EngineError> {
        let mut options = Dictionary::new();
        for (key, value) in self.options.iter() {
            options.set(key, value);
        }

        let unused = self.inner.write_header_with(options)?;
        for (key, value) in unused.iter() {
            log::warn!("muxer {} ignored option {}={}", self.format_name(), key, value);
        }
        self.have_written_header = true;
        self.packet = Some(ffmpeg_next::Packet::empty());
        Ok(())
    }

    fn write_packet(&mut self, packet: &PendingPacket, data: &[u8]) -> Result<(), EngineError> {
        if data.is_empty() {
            return Err(EngineError::new("empty packet"));
        }
        // the muxer may have replaced the stream time base while writing the header
        let time_base = self
            .inner
            .stream(packet.stream_index())
            .map(|stream| stream.time_base())
            .ok_or_else(|| EngineError::new(format!("stream {} not found", packet.stream_index())))?;
        let out = self
            .packet
            .as_mut()
            .ok_or_else(|| EngineError::new("header not written"))?;

        // borrow the caller's bytes for this call only
        unsafe {
            let p = out.as_mut_ptr();
            (*p).data = data.as_ptr() as *mut u8;
            (*p).size = data.len() as i32;
        }
        out.set_stream(packet.stream_index());
        out.set_pts(Some(timestamp::rescale(packet.pts(), MILLISECONDS, time_base)));
        out.set_dts(Some(timestamp::rescale(packet.dts(), MILLISECONDS, time_base)));
        out.set_duration(timestamp::rescale(packet.duration(), MILLISECONDS, time_base));
        out.set_position(packet.position() as isize);
        out.set_flags(if packet.is_key() {
            Flags::KEY
        } else {
            Flags::empty()
        });

        let result = out.write(&mut self.inner);

        unsafe {
            let p = out.as_mut_ptr();
            (*p).data = ptr::null_mut();
            (*p).size = 0;
        }
        result.map(|_| ()).map_err(Into::into)
    }

    fn write_trailer(&mut self) -> Result<(), EngineError> {
        if self.have_written_header && !self.have_written_trailer {
            self.have_written_trailer = true;
            self.inner.write_trailer()?;
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "output_test.rs"]
mod output_test;

//! Sessions addressed by generation-checked handles.
//!
//! A handle that outlives its session (closed, or never issued) is rejected
//! with [`MuxError::SessionClosed`] instead of touching freed state. Handles
//! round-trip through a `u64` for bindings that can only carry an integer.

use crate::{
    engine::MuxEngine,
    error::{MuxError, Result},
    packet::SampleFlags,
    session::Session,
    track::{AudioCodec, AudioParams, MediaKind, VideoCodec, VideoParams},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionHandle {
    index: u32,
    generation: u32,
}

impl SessionHandle {
    /// Never zero, so `0` can mean "no session" on the other side.
    pub fn to_raw(self) -> u64 {
        (u64::from(self.generation) << 32) | u64::from(self.index)
    }

    pub fn from_raw(raw: u64) -> Self {
        Self {
            index: raw as u32,
            generation: (raw >> 32) as u32,
        }
    }
}

struct Slot<S> {
    generation: u32,
    session: Option<S>,
}

pub struct SessionArena<E: MuxEngine> {
    engine: E,
    slots: Vec<Slot<Session<E::Context>>>,
    free: Vec<u32>,
}

impl<E: MuxEngine> SessionArena<E> {
    pub fn new(engine: E) -> Self {
        Self {
            engine,
            slots: Vec::new(),
            free: Vec::new(),
        }
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn open(&mut self, destination: &str, format: &str) -> Result<SessionHandle> {
        let session = Session::open(&self.engine, destination, format)?;

        let index = match self.free.pop() {
            Some(index) => index,
            None => {
                self.slots.push(Slot {
                    generation: 1,
                    session: None,
                });
                (self.slots.len() - 1) as u32
            }
        };
        let slot = &mut self.slots[index as usize];
        slot.session = Some(session);
        Ok(SessionHandle {
            index,
            generation: slot.generation,
        })
    }

    pub fn session(&self, handle: SessionHandle) -> Result<&Session<E::Context>> {
        self.slots
            .get(handle.index as usize)
            .filter(|slot| slot.generation == handle.generation)
            .and_then(|slot| slot.session.as_ref())
            .ok_or(MuxError::SessionClosed)
    }

    pub fn session_mut(&mut self, handle: SessionHandle) -> Result<&mut Session<E::Context>> {
        self.slots
            .get_mut(handle.index as usize)
            .filter(|slot| slot.generation == handle.generation)
            .and_then(|slot| slot.session.as_mut())
            .ok_or(MuxError::SessionClosed)
    }

    #[allow(clippy::too_many_arguments)]
    pub fn add_video_track(
        &mut self,
        handle: SessionHandle,
        codec_type: i32,
        width: u32,
        height: u32,
        fps: u32,
        gop: u32,
        bitrate: i64,
    ) -> Result<usize> {
        let session = self.session_mut(handle)?;
        let codec = VideoCodec::from_type_code(codec_type)?;
        session.add_video_track(VideoParams {
            codec,
            width,
            height,
            fps,
            gop,
            bitrate,
        })
    }

    pub fn add_audio_track(
        &mut self,
        handle: SessionHandle,
        codec_type: i32,
        sample_rate: u32,
        bitrate: i64,
    ) -> Result<usize> {
        let session = self.session_mut(handle)?;
        let codec = AudioCodec::from_type_code(codec_type)?;
        session.add_audio_track(AudioParams::new(codec, sample_rate, bitrate))
    }

    pub fn write_video_sample(
        &mut self,
        handle: SessionHandle,
        buffer: &[u8],
        length: usize,
        timestamp_us: i64,
        flags: i32,
    ) -> Result<()> {
        self.write_sample(handle, MediaKind::Video, buffer, length, timestamp_us, flags)
    }

    pub fn write_audio_sample(
        &mut self,
        handle: SessionHandle,
        buffer: &[u8],
        length: usize,
        timestamp_us: i64,
        flags: i32,
    ) -> Result<()> {
        self.write_sample(handle, MediaKind::Audio, buffer, length, timestamp_us, flags)
    }

    fn write_sample(
        &mut self,
        handle: SessionHandle,
        kind: MediaKind,
        buffer: &[u8],
        length: usize,
        timestamp_us: i64,
        flags: i32,
    ) -> Result<()> {
        let session = self.session_mut(handle)?;
        let data = buffer.get(..length).ok_or_else(|| {
            MuxError::InvalidSample(format!(
                "length {} exceeds buffer of {} bytes",
                length,
                buffer.len()
            ))
        })?;
        session.write_sample(kind, data, timestamp_us, SampleFlags::from(flags))
    }

    /// Closes the session and retires the handle. Stale handles are ignored.
    pub fn close(&mut self, handle: SessionHandle) {
        let slot = match self.slots.get_mut(handle.index as usize) {
            Some(slot) if slot.generation == handle.generation && slot.session.is_some() => slot,
            _ => {
                log::warn!("close on stale session handle {:?}", handle);
                return;
            }
        };

        if let Some(mut session) = slot.session.take() {
            session.close();
        }
        slot.generation = slot.generation.wrapping_add(1).max(1);
        self.free.push(handle.index);
    }

    /// Number of open sessions.
    pub fn len(&self) -> usize {
        self.slots.iter().filter(|slot| slot.session.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
